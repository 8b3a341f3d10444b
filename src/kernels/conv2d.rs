use crate::backend::Backend;
use crate::geometry::{ConvParams, FilterGeometry};
use crate::kernels::activations::ActivationFunction;
use crate::kernels::gemm::{scale_add, OnesVector};
use crate::kernels::im2col::{col2im_fast, im2col_indices, rotate_weights};
use crate::tensor::{Matrix, Scalar};
use rayon::prelude::*;
use tracing::{instrument, trace};

/// Standard convolution forward pass over a batch.
///
/// Each `input[i]` is `input_depth x (input_height * input_width)`; each
/// `output[i]` and `derivatives[i]` is `number_filters x n_local_views`, and
/// each `forward_matrices[i]` is the `n_local_views x local_view_pixels`
/// gather scratch. One index map is built per call and shared by every
/// batch element.
#[instrument(skip_all, level = "debug", fields(
    batch = input.len(),
    depth = params.input_depth,
    height = params.input_height,
    width = params.input_width,
))]
#[allow(clippy::too_many_arguments)]
pub fn conv_layer_forward<T: Scalar, B: Backend<T>>(
    backend: &B,
    output: &mut [Matrix<T>],
    derivatives: &mut [Matrix<T>],
    input: &[Matrix<T>],
    weights: &Matrix<T>,
    biases: &Matrix<T>,
    params: &ConvParams,
    activation: ActivationFunction,
    forward_matrices: &mut [Matrix<T>],
    ones: &OnesVector<T>,
) {
    assert_eq!(output.len(), input.len(), "ConvLayerForward: output batch size mismatch");
    assert_eq!(derivatives.len(), input.len(), "ConvLayerForward: derivative batch size mismatch");
    assert_eq!(forward_matrices.len(), input.len(), "ConvLayerForward: scratch batch size mismatch");

    let indices = im2col_indices(params.input_shape(), &params.filter());

    output
        .par_iter_mut()
        .zip(derivatives.par_iter_mut())
        .zip(forward_matrices.par_iter_mut())
        .zip(input.par_iter())
        .for_each(|(((out, df), local_views), x)| {
            backend.im2col_fast(local_views, x, &indices);
            backend.multiply_transpose(out, weights, local_views);
            backend.add_conv_biases(out, biases, ones);
            backend.activate(out, df, activation);
        });
}

/// Standard convolution backward pass.
///
/// `df` holds the activation derivatives cached by the last forward call and
/// is overwritten with the gradient of the pre-activations. An empty
/// `activation_gradients_backward` skips the input gradient (first layer).
/// Weight and bias gradients are reset and summed over the batch.
#[instrument(skip_all, level = "debug", fields(
    batch = df.len(),
    depth = params.input_depth,
    height = params.input_height,
    width = params.input_width,
))]
#[allow(clippy::too_many_arguments)]
pub fn conv_layer_backward<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    weight_gradients: &mut Matrix<T>,
    bias_gradients: &mut Matrix<T>,
    df: &mut [Matrix<T>],
    activation_gradients: &[Matrix<T>],
    weights: &Matrix<T>,
    activations_backward: &[Matrix<T>],
    params: &ConvParams,
) {
    assert_eq!(df.len(), activation_gradients.len(), "ConvLayerBackward: gradient batch size mismatch");
    assert_eq!(df.len(), activations_backward.len(), "ConvLayerBackward: input batch size mismatch");

    df.par_iter_mut()
        .zip(activation_gradients.par_iter())
        .for_each(|(d, g)| backend.hadamard(d, g));

    calculate_conv_activation_gradients(backend, activation_gradients_backward, df, weights, params);
    calculate_conv_weight_gradients(backend, weight_gradients, df, activations_backward, params);
    calculate_conv_bias_gradients(bias_gradients, df);
}

/// Gradient with respect to the layer input.
///
/// With unit stride this is a full convolution of `df` with the rotated
/// filters; otherwise (or when the padding exceeds the filter extent) the
/// gathered columns are scattered back through the forward index map.
pub fn calculate_conv_activation_gradients<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    df: &[Matrix<T>],
    weights: &Matrix<T>,
    params: &ConvParams,
) {
    if activation_gradients_backward.is_empty() {
        return;
    }
    assert_eq!(
        activation_gradients_backward.len(),
        df.len(),
        "CalculateConvActivationGradients: batch size mismatch"
    );

    let filter = params.filter();
    let rotatable = filter.unit_stride()
        && params.padding_height < params.filter_height
        && params.padding_width < params.filter_width;
    if rotatable {
        rotated_activation_gradients(backend, activation_gradients_backward, df, weights, params);
    } else {
        scattered_activation_gradients(backend, activation_gradients_backward, df, weights, params);
    }
}

fn rotated_activation_gradients<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    df: &[Matrix<T>],
    weights: &Matrix<T>,
    params: &ConvParams,
) {
    let out = params.conv_output_shape();
    let rot_weights = rotate_weights(
        weights,
        params.input_depth,
        params.filter_height,
        params.filter_width,
        params.number_filters,
    );

    // padding that makes the stride-1 convolution of df land back on the input extent
    let reverse = FilterGeometry {
        depth: params.number_filters,
        height: params.filter_height,
        width: params.filter_width,
        stride_rows: 1,
        stride_cols: 1,
        padding_height: (params.input_height + params.filter_height - 1 - out.height) / 2,
        padding_width: (params.input_width + params.filter_width - 1 - out.width) / 2,
    };
    let n_local_views = params.input_height * params.input_width;
    let n_local_view_pixels = params.number_filters * params.filter_size();
    assert_eq!(
        reverse.local_view_dims(out),
        (params.input_height, params.input_width),
        "CalculateConvActivationGradients: reverse convolution does not reconstruct the input"
    );
    trace!(
        padding_height = reverse.padding_height,
        padding_width = reverse.padding_width,
        "rotated input gradient"
    );
    let indices = im2col_indices(out, &reverse);

    activation_gradients_backward
        .par_iter_mut()
        .zip(df.par_iter())
        .for_each(|(grad, d)| {
            let mut df_tr = Matrix::new(n_local_views, n_local_view_pixels);
            backend.im2col_fast(&mut df_tr, d, &indices);
            backend.multiply_transpose(grad, &rot_weights, &df_tr);
        });
}

fn scattered_activation_gradients<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    df: &[Matrix<T>],
    weights: &Matrix<T>,
    params: &ConvParams,
) {
    let indices = im2col_indices(params.input_shape(), &params.filter());
    let out = params.conv_output_shape();
    let n_local_views = out.spatial();
    let n_local_view_pixels = params.local_view_pixels();

    activation_gradients_backward
        .par_iter_mut()
        .zip(df.par_iter())
        .for_each(|(grad, d)| {
            let mut cols = Matrix::new(n_local_views, n_local_view_pixels);
            backend.transpose_multiply(&mut cols, d, weights);
            grad.zero();
            col2im_fast(grad, &cols, &indices);
        });
}

/// Weight gradient: every batch element gathers its input through the
/// forward index map and multiplies by its `df` into a private buffer,
/// then the buffers are summed serially.
pub fn calculate_conv_weight_gradients<T: Scalar, B: Backend<T>>(
    backend: &B,
    weight_gradients: &mut Matrix<T>,
    df: &[Matrix<T>],
    activations_backward: &[Matrix<T>],
    params: &ConvParams,
) {
    assert_eq!(
        weight_gradients.shape(),
        (params.number_filters, params.local_view_pixels()),
        "CalculateConvWeightGradients: weight gradient shape mismatch"
    );
    let indices = im2col_indices(params.input_shape(), &params.filter());
    let n_local_views = params.conv_output_shape().spatial();
    let n_local_view_pixels = params.local_view_pixels();

    let vres: Vec<Matrix<T>> = df
        .par_iter()
        .zip(activations_backward.par_iter())
        .map(|(d, x)| {
            let mut x_tr = Matrix::new(n_local_views, n_local_view_pixels);
            backend.im2col_fast(&mut x_tr, x, &indices);
            let mut res = Matrix::new(params.number_filters, n_local_view_pixels);
            backend.multiply(&mut res, d, &x_tr);
            res
        })
        .collect();

    weight_gradients.zero();
    for res in &vres {
        scale_add(weight_gradients, res, T::one());
    }
}

/// Bias gradient: `df` summed over spatial positions and batch, per filter.
pub fn calculate_conv_bias_gradients<T: Scalar>(bias_gradients: &mut Matrix<T>, df: &[Matrix<T>]) {
    bias_gradients.zero();
    for d in df {
        assert!(
            bias_gradients.len() >= d.nrows(),
            "CalculateConvBiasGradients: {} filters but only {} bias gradients",
            d.nrows(),
            bias_gradients.len()
        );
        let sums = bias_gradients.as_mut_slice();
        for col in 0..d.ncols() {
            for (b, &v) in sums.iter_mut().zip(d.column(col)) {
                *b += v;
            }
        }
    }
}
