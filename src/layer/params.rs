use crate::error::ConfigError;
use crate::geometry::ConvParams;
use crate::kernels::activations::ActivationFunction;
use crate::kernels::regularization::Regularization;
use crate::kernels::trans_conv::TransConvAlgorithm;
use crate::layer::init::Initialization;
use serde::{Deserialize, Serialize};

/// Hyper parameters of a convolution-family layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub batch_size: usize,
    pub input_depth: usize,
    pub input_height: usize,
    pub input_width: usize,
    /// Number of filters, i.e. the output depth.
    pub number_filters: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    #[serde(default = "LayerConfig::default_stride")]
    pub stride_rows: usize,
    #[serde(default = "LayerConfig::default_stride")]
    pub stride_cols: usize,
    #[serde(default)]
    pub padding_height: usize,
    #[serde(default)]
    pub padding_width: usize,
    #[serde(default)]
    pub activation: ActivationFunction,
    #[serde(default)]
    pub regularization: Regularization,
    #[serde(default)]
    pub weight_decay: f64,
    /// Probability of keeping an input value when dropout is applied.
    #[serde(default = "LayerConfig::default_dropout_probability")]
    pub dropout_probability: f64,
    #[serde(default)]
    pub initialization: Initialization,
    /// Seed for weight initialisation and dropout; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub algorithm: TransConvAlgorithm,
}

impl LayerConfig {
    fn default_stride() -> usize {
        1
    }

    fn default_dropout_probability() -> f64 {
        1.0
    }

    /// Minimal configuration; everything else takes its default.
    pub fn new(
        batch_size: usize,
        input_depth: usize,
        input_height: usize,
        input_width: usize,
        number_filters: usize,
        filter_height: usize,
        filter_width: usize,
    ) -> Self {
        Self {
            batch_size,
            input_depth,
            input_height,
            input_width,
            number_filters,
            filter_height,
            filter_width,
            stride_rows: Self::default_stride(),
            stride_cols: Self::default_stride(),
            padding_height: 0,
            padding_width: 0,
            activation: ActivationFunction::default(),
            regularization: Regularization::default(),
            weight_decay: 0.0,
            dropout_probability: Self::default_dropout_probability(),
            initialization: Initialization::default(),
            seed: None,
            algorithm: TransConvAlgorithm::default(),
        }
    }

    pub fn with_stride(mut self, rows: usize, cols: usize) -> Self {
        self.stride_rows = rows;
        self.stride_cols = cols;
        self
    }

    pub fn with_padding(mut self, height: usize, width: usize) -> Self {
        self.padding_height = height;
        self.padding_width = width;
        self
    }

    pub fn with_activation(mut self, activation: ActivationFunction) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_regularization(mut self, regularization: Regularization, weight_decay: f64) -> Self {
        self.regularization = regularization;
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout_probability = probability;
        self
    }

    pub fn with_initialization(mut self, initialization: Initialization) -> Self {
        self.initialization = initialization;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_algorithm(mut self, algorithm: TransConvAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Checks everything that does not depend on the layer kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("batch size", self.batch_size),
            ("input depth", self.input_depth),
            ("input height", self.input_height),
            ("input width", self.input_width),
            ("number of filters", self.number_filters),
            ("filter height", self.filter_height),
            ("filter width", self.filter_width),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::EmptyDimension(*name));
        }
        if self.stride_rows == 0 || self.stride_cols == 0 {
            return Err(ConfigError::ZeroStride);
        }
        if !(self.dropout_probability > 0.0 && self.dropout_probability <= 1.0) {
            return Err(ConfigError::InvalidDropout(self.dropout_probability));
        }
        if !(self.weight_decay >= 0.0) {
            return Err(ConfigError::NegativeWeightDecay(self.weight_decay));
        }
        Ok(())
    }

    pub fn params(&self) -> ConvParams {
        ConvParams {
            batch_size: self.batch_size,
            input_depth: self.input_depth,
            input_height: self.input_height,
            input_width: self.input_width,
            number_filters: self.number_filters,
            filter_height: self.filter_height,
            filter_width: self.filter_width,
            stride_rows: self.stride_rows,
            stride_cols: self.stride_cols,
            padding_height: self.padding_height,
            padding_width: self.padding_width,
        }
    }
}
