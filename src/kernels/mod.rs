pub mod activations;
pub mod conv2d;
pub mod gemm;
pub mod im2col;
pub mod regularization;
pub mod trans_conv;
pub mod utils;
pub use activations::ActivationFunction;
pub use conv2d::{
    calculate_conv_activation_gradients, calculate_conv_bias_gradients, calculate_conv_weight_gradients,
    conv_layer_backward, conv_layer_forward,
};
pub use gemm::{add_conv_biases, add_row_wise, hadamard, multiply, multiply_transpose, transpose_multiply, OnesVector};
pub use im2col::{col2im_fast, im2col, im2col_fast, im2col_fast_par, im2col_indices, rotate_weights};
pub use regularization::{add_regularization_gradients, dropout, Regularization};
pub use trans_conv::{
    generate_columnar_matrix, generate_conv_matrix, generate_trans_conv_matrix, trans_conv_layer_backward,
    trans_conv_layer_forward, TransConvAlgorithm,
};
pub use utils::{calculate_dimension, calculate_transposed_dimension, deflatten, flatten, reshape};
