//! CPU convolution and transpose-convolution layers built on im2col + GEMM.

pub mod backend;
pub mod error;
pub mod geometry;
pub mod kernels;
pub mod layer;
pub mod tensor;

pub use backend::{Backend, Cpu, Reference};
pub use error::{ConfigError, PersistError};
pub use geometry::{ConvParams, FilterGeometry, ImageShape};
pub use kernels::{ActivationFunction, Regularization, TransConvAlgorithm};
pub use layer::{ConvLayer, Initialization, Layer, LayerConfig, LayerRecord, TransConvLayer};
pub use tensor::{Matrix, Scalar};
