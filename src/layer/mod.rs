pub mod conv;
pub mod init;
pub mod params;
pub mod persist;
pub mod trans_conv;

pub use conv::ConvLayer;
pub use init::{initialize, Initialization};
pub use params::LayerConfig;
pub use persist::{LayerKind, LayerRecord, MatrixRecord};
pub use trans_conv::TransConvLayer;

use crate::error::PersistError;
use crate::geometry::{ConvParams, ImageShape};
use crate::kernels::gemm::OnesVector;
use crate::kernels::regularization::{add_regularization_gradients, dropout, regularization};
use crate::tensor::{Matrix, Scalar};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Buffers and trainable parameters shared by the convolution-family layers.
///
/// The per-batch buffers are sized once here so a forward call never
/// allocates them.
#[derive(Debug)]
pub struct LayerState<T> {
    config: LayerConfig,
    params: ConvParams,
    output_shape: ImageShape,
    scratch_shape: (usize, usize),
    weights: Matrix<T>,
    biases: Matrix<T>,
    weight_gradients: Matrix<T>,
    bias_gradients: Matrix<T>,
    output: Vec<Matrix<T>>,
    activation_gradients: Vec<Matrix<T>>,
    derivatives: Vec<Matrix<T>>,
    forward_matrices: Vec<Matrix<T>>,
    ones: OnesVector<T>,
    rng: StdRng,
}

impl<T: Scalar> LayerState<T> {
    /// `config` must already be validated; `scratch_shape` is the shape of one
    /// forward scratch matrix.
    pub(crate) fn new(config: LayerConfig, output_shape: ImageShape, scratch_shape: (usize, usize)) -> Self {
        let params = config.params();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut weights = Matrix::new(params.number_filters, params.local_view_pixels());
        initialize(&mut weights, config.initialization, &mut rng);

        let mut state = Self {
            params,
            output_shape,
            scratch_shape,
            weights,
            biases: Matrix::new(params.number_filters, 1),
            weight_gradients: Matrix::new(params.number_filters, params.local_view_pixels()),
            bias_gradients: Matrix::new(params.number_filters, 1),
            output: Vec::new(),
            activation_gradients: Vec::new(),
            derivatives: Vec::new(),
            forward_matrices: Vec::new(),
            // sized before any parallel region borrows it
            ones: OnesVector::new(output_shape.spatial()),
            rng,
            config,
        };
        state.allocate_buffers();
        debug!(
            depth = output_shape.depth,
            height = output_shape.height,
            width = output_shape.width,
            "layer buffers allocated"
        );
        state
    }

    fn allocate_buffers(&mut self) {
        let batch = self.config.batch_size;
        let out = Matrix::new(self.output_shape.depth, self.output_shape.spatial());
        self.output = vec![out.clone(); batch];
        self.activation_gradients = vec![out.clone(); batch];
        self.derivatives = vec![out; batch];
        self.forward_matrices = vec![Matrix::new(self.scratch_shape.0, self.scratch_shape.1); batch];
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn input_shape(&self) -> ImageShape {
        self.params.input_shape()
    }

    pub fn output_shape(&self) -> ImageShape {
        self.output_shape
    }

    pub fn weights(&self) -> &Matrix<T> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Matrix<T> {
        &mut self.weights
    }

    pub fn biases(&self) -> &Matrix<T> {
        &self.biases
    }

    pub fn biases_mut(&mut self) -> &mut Matrix<T> {
        &mut self.biases
    }

    pub fn weight_gradients(&self) -> &Matrix<T> {
        &self.weight_gradients
    }

    pub fn bias_gradients(&self) -> &Matrix<T> {
        &self.bias_gradients
    }

    pub fn output(&self) -> &[Matrix<T>] {
        &self.output
    }

    pub fn derivatives(&self) -> &[Matrix<T>] {
        &self.derivatives
    }

    pub fn forward_matrices(&self) -> &[Matrix<T>] {
        &self.forward_matrices
    }

    /// Gradient of the loss with respect to this layer's output, filled in by
    /// the caller before [`Layer::backward`].
    pub fn activation_gradients(&self) -> &[Matrix<T>] {
        &self.activation_gradients
    }

    pub fn activation_gradients_mut(&mut self) -> &mut [Matrix<T>] {
        &mut self.activation_gradients
    }

    /// Applies inverted dropout to `input` unless the keep probability is 1.
    pub fn apply_dropout(&mut self, input: &mut [Matrix<T>]) {
        let keep = self.config.dropout_probability;
        if keep >= 1.0 {
            return;
        }
        for m in input {
            dropout(m, keep, &mut self.rng);
        }
    }

    /// Regularisation penalty of the current weights, scaled by the decay.
    pub fn regularization_term(&self) -> T {
        T::from_f64(self.config.weight_decay) * regularization(&self.weights, self.config.regularization)
    }

    fn add_regularization_gradients(&mut self) {
        add_regularization_gradients(
            &mut self.weight_gradients,
            &self.weights,
            T::from_f64(self.config.weight_decay),
            self.config.regularization,
        );
    }

    /// One-line summary: output extent, filter extent, output batch shape and activation.
    pub(crate) fn describe(&self, f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
        let out = self.output_shape;
        write!(f, " {title}: \t")?;
        write!(f, "( W = {} ,  H = {} ,  D = {} ) ", out.width, out.height, out.depth)?;
        write!(
            f,
            "\t Filter ( W = {} ,  H = {} ) ",
            self.config.filter_width, self.config.filter_height
        )?;
        if let Some(first) = self.output.first() {
            write!(
                f,
                "\tOutput = ( {} , {} , {} ) ",
                self.output.len(),
                first.nrows(),
                first.ncols()
            )?;
        }
        write!(f, "\t Activation Function = {}", self.config.activation.name())
    }

    fn load(&mut self, kind: LayerKind, record: &LayerRecord<T>) -> Result<(), PersistError> {
        let (weights, biases) = record.check_against(kind, self)?;
        self.weights = weights;
        self.biases = biases;
        Ok(())
    }
}

impl<T: Scalar> Clone for LayerState<T> {
    /// Copies hyper parameters, weights and biases; gradients and per-batch
    /// buffers start out zeroed.
    fn clone(&self) -> Self {
        let mut state = Self {
            config: self.config.clone(),
            params: self.params,
            output_shape: self.output_shape,
            scratch_shape: self.scratch_shape,
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            weight_gradients: Matrix::new(self.weights.nrows(), self.weights.ncols()),
            bias_gradients: Matrix::new(self.biases.nrows(), self.biases.ncols()),
            output: Vec::new(),
            activation_gradients: Vec::new(),
            derivatives: Vec::new(),
            forward_matrices: Vec::new(),
            ones: self.ones.clone(),
            rng: self.rng.clone(),
        };
        state.allocate_buffers();
        state
    }
}

/// A layer of the convolution family.
pub trait Layer<T: Scalar> {
    fn kind(&self) -> LayerKind;

    fn state(&self) -> &LayerState<T>;

    fn state_mut(&mut self) -> &mut LayerState<T>;

    /// Computes the output and caches the activation derivatives for the next
    /// [`Layer::backward`].
    fn forward(&mut self, input: &[Matrix<T>]);

    /// Back-propagates the gradients stored in
    /// [`LayerState::activation_gradients_mut`]. `gradients_backward` receives
    /// the gradient with respect to the input and may be empty for a first
    /// layer; `activations_backward` is the input of the preceding forward call.
    fn backward(&mut self, gradients_backward: &mut [Matrix<T>], activations_backward: &[Matrix<T>]);

    /// Forward pass with dropout applied to `input` first.
    fn forward_with_dropout(&mut self, input: &mut [Matrix<T>]) {
        self.state_mut().apply_dropout(input);
        self.forward(input);
    }

    fn to_record(&self) -> LayerRecord<T> {
        LayerRecord::from_state(self.kind(), self.state())
    }

    /// Loads weights and biases from a record written for the same geometry.
    fn load_record(&mut self, record: &LayerRecord<T>) -> Result<(), PersistError> {
        let kind = self.kind();
        self.state_mut().load(kind, record)
    }

    fn write_weights_to<W: Write>(&self, writer: W) -> Result<(), PersistError>
    where
        Self: Sized,
    {
        serde_json::to_writer_pretty(writer, &self.to_record())?;
        Ok(())
    }

    fn read_weights_from<R: Read>(&mut self, reader: R) -> Result<(), PersistError>
    where
        Self: Sized,
    {
        let record: LayerRecord<T> = serde_json::from_reader(reader)?;
        self.load_record(&record)
    }

    fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError>
    where
        Self: Sized,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_weights_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PersistError>
    where
        Self: Sized,
    {
        let reader = BufReader::new(File::open(path)?);
        self.read_weights_from(reader)
    }
}
