use crate::backend::{Backend, Cpu};
use crate::error::ConfigError;
use crate::kernels::conv2d::{conv_layer_backward, conv_layer_forward};
use crate::layer::{Layer, LayerConfig, LayerKind, LayerState};
use crate::tensor::{Matrix, Scalar};
use std::fmt;
use tracing::instrument;

/// Standard 2-D convolution layer, im2col + GEMM.
#[derive(Debug, Clone)]
pub struct ConvLayer<T: Scalar, B: Backend<T> = Cpu> {
    state: LayerState<T>,
    backend: B,
}

impl<T: Scalar> ConvLayer<T, Cpu> {
    pub fn new(config: LayerConfig) -> Result<Self, ConfigError> {
        Self::with_backend(config, Cpu)
    }
}

impl<T: Scalar, B: Backend<T>> ConvLayer<T, B> {
    pub fn with_backend(config: LayerConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let params = config.params();
        let output_shape = params
            .filter()
            .conv_output(params.input_shape(), params.number_filters)?;
        let scratch_shape = (output_shape.spatial(), params.local_view_pixels());
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

impl<T: Scalar, B: Backend<T>> Layer<T> for ConvLayer<T, B> {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv
    }

    fn state(&self) -> &LayerState<T> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LayerState<T> {
        &mut self.state
    }

    #[instrument(skip_all, level = "debug", name = "ConvLayer::forward")]
    fn forward(&mut self, input: &[Matrix<T>]) {
        let s = &mut self.state;
        conv_layer_forward(
            &self.backend,
            &mut s.output,
            &mut s.derivatives,
            input,
            &s.weights,
            &s.biases,
            &s.params,
            s.config.activation,
            &mut s.forward_matrices,
            &s.ones,
        );
    }

    #[instrument(skip_all, level = "debug", name = "ConvLayer::backward")]
    fn backward(&mut self, gradients_backward: &mut [Matrix<T>], activations_backward: &[Matrix<T>]) {
        let s = &mut self.state;
        conv_layer_backward(
            &self.backend,
            gradients_backward,
            &mut s.weight_gradients,
            &mut s.bias_gradients,
            &mut s.derivatives,
            &s.activation_gradients,
            &s.weights,
            activations_backward,
            &s.params,
        );
        s.add_regularization_gradients();
    }
}

impl<T: Scalar, B: Backend<T>> fmt::Display for ConvLayer<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.describe(f, "CONV LAYER")
    }
}
