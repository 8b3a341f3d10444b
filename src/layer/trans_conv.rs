use crate::backend::{Backend, Cpu};
use crate::error::ConfigError;
use crate::kernels::trans_conv::{trans_conv_layer_backward, trans_conv_layer_forward};
use crate::layer::{Layer, LayerConfig, LayerKind, LayerState};
use crate::tensor::{Matrix, Scalar};
use std::fmt;
use tracing::instrument;

/// Transpose convolution (deconvolution) layer.
///
/// Upsamples `input_depth x H x W` images to
/// `number_filters x ((H - 1) * stride + filter - 2 * padding) x ...`.
/// The weight matrix is `number_filters x (input_depth * filter_height * filter_width)`.
#[derive(Debug, Clone)]
pub struct TransConvLayer<T: Scalar, B: Backend<T> = Cpu> {
    state: LayerState<T>,
    backend: B,
}

impl<T: Scalar> TransConvLayer<T, Cpu> {
    pub fn new(config: LayerConfig) -> Result<Self, ConfigError> {
        Self::with_backend(config, Cpu)
    }
}

impl<T: Scalar, B: Backend<T>> TransConvLayer<T, B> {
    /// Validates the geometry: the convolution adjoint to this layer must map
    /// its output back onto the input extent exactly.
    pub fn with_backend(config: LayerConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let params = config.params();
        let output_shape = params
            .filter()
            .trans_conv_output(params.input_shape(), params.number_filters)?;
        // scatter columns: one row per input pixel
        let scratch_shape = (
            params.input_height * params.input_width,
            params.number_filters * params.filter_size(),
        );
        Ok(Self {
            state: LayerState::new(config, output_shape, scratch_shape),
            backend,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn print(&self) {
        println!("{self}");
    }
}

impl<T: Scalar, B: Backend<T>> Layer<T> for TransConvLayer<T, B> {
    fn kind(&self) -> LayerKind {
        LayerKind::TransConv
    }

    fn state(&self) -> &LayerState<T> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<T> {
        &mut self.state
    }

    #[instrument(skip_all, level = "debug", name = "TransConvLayer::forward")]
    fn forward(&mut self, input: &[Matrix<T>]) {
        let s = &mut self.state;
        trans_conv_layer_forward(
            &self.backend,
            &mut s.output,
            &mut s.derivatives,
            input,
            &s.weights,
            &s.biases,
            &s.params,
            s.config.activation,
            s.config.algorithm,
            &mut s.forward_matrices,
            &s.ones,
        );
    }

    #[instrument(skip_all, level = "debug", name = "TransConvLayer::backward")]
    fn backward(&mut self, gradients_backward: &mut [Matrix<T>], activations_backward: &[Matrix<T>]) {
        let s = &mut self.state;
        trans_conv_layer_backward(
            &self.backend,
            gradients_backward,
            &mut s.weight_gradients,
            &mut s.bias_gradients,
            &mut s.derivatives,
            &s.activation_gradients,
            &s.weights,
            activations_backward,
            &s.params,
            s.config.algorithm,
        );
        s.add_regularization_gradients();
    }
}

impl<T: Scalar, B: Backend<T>> fmt::Display for TransConvLayer<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.describe(f, "TRANSCONV LAYER")
    }
}
