use crate::backend::Backend;
use crate::geometry::{ConvParams, FilterGeometry};
use crate::kernels::activations::ActivationFunction;
use crate::kernels::conv2d::calculate_conv_bias_gradients;
use crate::kernels::gemm::{scale_add, OnesVector};
use crate::kernels::im2col::{col2im_fast, im2col_indices, swap_filter_channels};
use crate::kernels::utils::reshape;
use crate::tensor::{Matrix, Scalar};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

/// How the transpose convolution is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransConvAlgorithm {
    /// Index-map scatter, the dual of the im2col gather.
    #[default]
    Scatter,
    /// Explicit `output_scalars x input_scalars` expansion of the filters.
    Dense,
}

/// One filter tap: input pixel `input_pos` reaches output pixel `output_pos`
/// through receptive-field pixel `pixel` (`kh * filter_width + kw`).
#[derive(Debug, Clone, Copy)]
struct Tap {
    input_pos: usize,
    output_pos: usize,
    pixel: usize,
}

fn taps(params: &ConvParams) -> Vec<Tap> {
    let out = params.trans_conv_output_shape();
    let mut taps = Vec::new();
    for i in 0..params.input_height {
        for j in 0..params.input_width {
            for kh in 0..params.filter_height {
                let row = (i * params.stride_rows + kh) as isize - params.padding_height as isize;
                if row < 0 || row >= out.height as isize {
                    continue;
                }
                for kw in 0..params.filter_width {
                    let col = (j * params.stride_cols + kw) as isize - params.padding_width as isize;
                    if col < 0 || col >= out.width as isize {
                        continue;
                    }
                    taps.push(Tap {
                        input_pos: i * params.input_width + j,
                        output_pos: row as usize * out.width + col as usize,
                        pixel: kh * params.filter_width + kw,
                    });
                }
            }
        }
    }
    taps
}

/// Flattens `input` row by row into the single column `output`.
pub fn generate_columnar_matrix<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>) {
    assert_eq!(output.shape(), (input.len(), 1), "GenerateColumnarMatrix: output must be a column of input size");
    let cols = input.ncols();
    for i in 0..input.nrows() {
        for j in 0..cols {
            output[(i * cols + j, 0)] = input[(i, j)];
        }
    }
}

/// Dense expansion of the filter bank: one row per output scalar
/// (`filter * out_spatial + pos`), one column per input scalar
/// (`channel * in_spatial + pos`).
pub fn generate_conv_matrix<T: Scalar>(weights: &Matrix<T>, params: &ConvParams) -> Matrix<T> {
    let out_spatial = params.trans_conv_output_shape().spatial();
    let in_spatial = params.input_height * params.input_width;
    let filter_size = params.filter_size();
    assert_eq!(
        weights.shape(),
        (params.number_filters, params.local_view_pixels()),
        "GenerateConvMatrix: weight shape mismatch"
    );

    let mut m = Matrix::new(params.number_filters * out_spatial, params.input_depth * in_spatial);
    for tap in taps(params) {
        for o in 0..params.number_filters {
            for c in 0..params.input_depth {
                m[(o * out_spatial + tap.output_pos, c * in_spatial + tap.input_pos)] +=
                    weights[(o, c * filter_size + tap.pixel)];
            }
        }
    }
    trace!(rows = m.nrows(), cols = m.ncols(), "conv matrix");
    m
}

/// Transposed orientation of [`generate_conv_matrix`]: one row per input
/// scalar, one column per output scalar.
pub fn generate_trans_conv_matrix<T: Scalar>(weights: &Matrix<T>, params: &ConvParams) -> Matrix<T> {
    let out_spatial = params.trans_conv_output_shape().spatial();
    let in_spatial = params.input_height * params.input_width;
    let filter_size = params.filter_size();
    assert_eq!(
        weights.shape(),
        (params.number_filters, params.local_view_pixels()),
        "GenerateTransConvMatrix: weight shape mismatch"
    );

    let mut m = Matrix::new(params.input_depth * in_spatial, params.number_filters * out_spatial);
    for tap in taps(params) {
        for o in 0..params.number_filters {
            for c in 0..params.input_depth {
                m[(c * in_spatial + tap.input_pos, o * out_spatial + tap.output_pos)] +=
                    weights[(o, c * filter_size + tap.pixel)];
            }
        }
    }
    trace!(rows = m.nrows(), cols = m.ncols(), "trans conv matrix");
    m
}

/// Geometry of the index map laid over the transpose-convolution output.
/// Its local views coincide with the input pixels.
pub fn output_filter(params: &ConvParams) -> FilterGeometry {
    FilterGeometry {
        depth: params.number_filters,
        height: params.filter_height,
        width: params.filter_width,
        stride_rows: params.stride_rows,
        stride_cols: params.stride_cols,
        padding_height: params.padding_height,
        padding_width: params.padding_width,
    }
}

/// Transpose convolution forward pass over a batch.
///
/// `output[i]` and `derivatives[i]` are `number_filters x out_spatial`.
/// The scatter algorithm uses `forward_matrices[i]`
/// (`in_spatial x number_filters * filter_size`) as column scratch.
#[instrument(skip_all, level = "debug", fields(
    batch = input.len(),
    depth = params.input_depth,
    height = params.input_height,
    width = params.input_width,
    ?algorithm,
))]
#[allow(clippy::too_many_arguments)]
pub fn trans_conv_layer_forward<T: Scalar, B: Backend<T>>(
    backend: &B,
    output: &mut [Matrix<T>],
    derivatives: &mut [Matrix<T>],
    input: &[Matrix<T>],
    weights: &Matrix<T>,
    biases: &Matrix<T>,
    params: &ConvParams,
    activation: ActivationFunction,
    algorithm: TransConvAlgorithm,
    forward_matrices: &mut [Matrix<T>],
    ones: &OnesVector<T>,
) {
    assert_eq!(output.len(), input.len(), "TransConvLayerForward: output batch size mismatch");
    assert_eq!(derivatives.len(), input.len(), "TransConvLayerForward: derivative batch size mismatch");

    match algorithm {
        TransConvAlgorithm::Scatter => {
            assert_eq!(forward_matrices.len(), input.len(), "TransConvLayerForward: scratch batch size mismatch");
            let out = params.trans_conv_output_shape();
            let indices = im2col_indices(out, &output_filter(params));
            let swapped = swap_filter_channels(weights, params.input_depth, params.filter_size());

            output
                .par_iter_mut()
                .zip(derivatives.par_iter_mut())
                .zip(forward_matrices.par_iter_mut())
                .zip(input.par_iter())
                .for_each(|(((y, df), cols), x)| {
                    backend.transpose_multiply(cols, x, &swapped);
                    y.zero();
                    col2im_fast(y, cols, &indices);
                    backend.add_conv_biases(y, biases, ones);
                    backend.activate(y, df, activation);
                });
        }
        TransConvAlgorithm::Dense => {
            let conv_matrix = generate_conv_matrix(weights, params);

            output
                .par_iter_mut()
                .zip(derivatives.par_iter_mut())
                .zip(input.par_iter())
                .for_each(|((y, df), x)| {
                    let mut x_col = Matrix::new(x.len(), 1);
                    generate_columnar_matrix(&mut x_col, x);
                    let mut y_col = Matrix::new(y.len(), 1);
                    backend.multiply(&mut y_col, &conv_matrix, &x_col);
                    reshape(y, &y_col);
                    backend.add_conv_biases(y, biases, ones);
                    backend.activate(y, df, activation);
                });
        }
    }
}

/// Transpose convolution backward pass.
///
/// Same contract as the standard backward kernel: `df` becomes the
/// pre-activation gradient, an empty `activation_gradients_backward` skips the
/// input gradient, and weight/bias gradients are reset then summed over the
/// batch.
#[instrument(skip_all, level = "debug", fields(
    batch = df.len(),
    depth = params.input_depth,
    height = params.input_height,
    width = params.input_width,
    ?algorithm,
))]
#[allow(clippy::too_many_arguments)]
pub fn trans_conv_layer_backward<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    weight_gradients: &mut Matrix<T>,
    bias_gradients: &mut Matrix<T>,
    df: &mut [Matrix<T>],
    activation_gradients: &[Matrix<T>],
    weights: &Matrix<T>,
    activations_backward: &[Matrix<T>],
    params: &ConvParams,
    algorithm: TransConvAlgorithm,
) {
    assert_eq!(df.len(), activation_gradients.len(), "TransConvLayerBackward: gradient batch size mismatch");
    assert_eq!(df.len(), activations_backward.len(), "TransConvLayerBackward: input batch size mismatch");
    assert_eq!(
        weight_gradients.shape(),
        weights.shape(),
        "TransConvLayerBackward: weight gradient shape mismatch"
    );
    if !activation_gradients_backward.is_empty() {
        assert_eq!(
            activation_gradients_backward.len(),
            df.len(),
            "TransConvLayerBackward: input gradient batch size mismatch"
        );
    }

    df.par_iter_mut()
        .zip(activation_gradients.par_iter())
        .for_each(|(d, g)| backend.hadamard(d, g));

    match algorithm {
        TransConvAlgorithm::Scatter => scatter_backward(
            backend,
            activation_gradients_backward,
            weight_gradients,
            df,
            weights,
            activations_backward,
            params,
        ),
        TransConvAlgorithm::Dense => dense_backward(
            backend,
            activation_gradients_backward,
            weight_gradients,
            df,
            weights,
            activations_backward,
            params,
        ),
    }

    calculate_conv_bias_gradients(bias_gradients, df);
}

fn scatter_backward<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    weight_gradients: &mut Matrix<T>,
    df: &[Matrix<T>],
    weights: &Matrix<T>,
    activations_backward: &[Matrix<T>],
    params: &ConvParams,
) {
    let out = params.trans_conv_output_shape();
    let filter_size = params.filter_size();
    let indices = im2col_indices(out, &output_filter(params));
    let swapped = swap_filter_channels(weights, params.input_depth, filter_size);
    let n_local_views = params.input_height * params.input_width;
    let n_local_view_pixels = params.number_filters * filter_size;

    // gather df once per element, feed both gradients
    let df_tr: Vec<Matrix<T>> = df
        .par_iter()
        .map(|d| {
            let mut cols = Matrix::new(n_local_views, n_local_view_pixels);
            backend.im2col_fast(&mut cols, d, &indices);
            cols
        })
        .collect();

    activation_gradients_backward
        .par_iter_mut()
        .zip(df_tr.par_iter())
        .for_each(|(grad, cols)| backend.multiply_transpose(grad, &swapped, cols));

    let vres: Vec<Matrix<T>> = activations_backward
        .par_iter()
        .zip(df_tr.par_iter())
        .map(|(x, cols)| {
            let mut res = Matrix::new(params.input_depth, n_local_view_pixels);
            backend.multiply(&mut res, x, cols);
            res
        })
        .collect();

    let mut acc = Matrix::new(params.input_depth, n_local_view_pixels);
    for res in &vres {
        scale_add(&mut acc, res, T::one());
    }
    // acc is indexed (channel, filter * K + k); swap the blocks back
    *weight_gradients = swap_filter_channels(&acc, params.number_filters, filter_size);
}

fn dense_backward<T: Scalar, B: Backend<T>>(
    backend: &B,
    activation_gradients_backward: &mut [Matrix<T>],
    weight_gradients: &mut Matrix<T>,
    df: &[Matrix<T>],
    weights: &Matrix<T>,
    activations_backward: &[Matrix<T>],
    params: &ConvParams,
) {
    let filter_size = params.filter_size();

    if !activation_gradients_backward.is_empty() {
        let trans_matrix = generate_trans_conv_matrix(weights, params);
        activation_gradients_backward
            .par_iter_mut()
            .zip(df.par_iter())
            .for_each(|(grad, d)| {
                let mut d_col = Matrix::new(d.len(), 1);
                generate_columnar_matrix(&mut d_col, d);
                let mut g_col = Matrix::new(grad.len(), 1);
                backend.multiply(&mut g_col, &trans_matrix, &d_col);
                reshape(grad, &g_col);
            });
    }

    let taps = taps(params);
    let vres: Vec<Matrix<T>> = df
        .par_iter()
        .zip(activations_backward.par_iter())
        .map(|(d, x)| {
            let mut res = Matrix::new(params.number_filters, params.local_view_pixels());
            for tap in &taps {
                for o in 0..params.number_filters {
                    let delta = d[(o, tap.output_pos)];
                    for c in 0..params.input_depth {
                        res[(o, c * filter_size + tap.pixel)] += delta * x[(c, tap.input_pos)];
                    }
                }
            }
            res
        })
        .collect();

    weight_gradients.zero();
    for res in &vres {
        scale_add(weight_gradients, res, T::one());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Cpu;

    fn params(stride: usize, padding: usize) -> ConvParams {
        ConvParams {
            batch_size: 2,
            input_depth: 2,
            input_height: 3,
            input_width: 4,
            number_filters: 3,
            filter_height: 3,
            filter_width: 2,
            stride_rows: stride,
            stride_cols: stride,
            padding_height: padding,
            padding_width: padding,
        }
    }

    fn sample(rows: usize, cols: usize, seed: f64) -> Matrix<f64> {
        Matrix::from_fn(rows, cols, |i, j| ((i * 11 + j * 7) as f64 * 0.131 + seed).cos())
    }

    fn run_forward(p: &ConvParams, algorithm: TransConvAlgorithm, x: &[Matrix<f64>], w: &Matrix<f64>) -> Vec<Matrix<f64>> {
        let out = p.trans_conv_output_shape();
        let mut y = vec![Matrix::new(p.number_filters, out.spatial()); x.len()];
        let mut df = y.clone();
        let in_spatial = p.input_height * p.input_width;
        let mut scratch = vec![Matrix::new(in_spatial, p.number_filters * p.filter_size()); x.len()];
        let biases = Matrix::from_fn(p.number_filters, 1, |i, _| i as f64 * 0.5);
        let ones = OnesVector::new(out.spatial());
        trans_conv_layer_forward(
            &Cpu,
            &mut y,
            &mut df,
            x,
            w,
            &biases,
            p,
            ActivationFunction::Tanh,
            algorithm,
            &mut scratch,
            &ones,
        );
        y
    }

    #[test]
    fn test_conv_matrix_orientations_agree() {
        let p = params(2, 1);
        let w = sample(3, 12, 0.2);
        let a = generate_conv_matrix(&w, &p);
        let b = generate_trans_conv_matrix(&w, &p);
        assert_eq!(a.shape(), (b.ncols(), b.nrows()));
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                assert_eq!(a[(i, j)], b[(j, i)]);
            }
        }
    }

    #[test]
    fn test_scatter_matches_dense_forward() {
        for (stride, padding) in [(1, 0), (1, 1), (2, 0), (2, 1)] {
            let p = params(stride, padding);
            let x = vec![sample(2, 12, 0.1), sample(2, 12, 0.5)];
            let w = sample(3, 12, 0.3);
            let scatter = run_forward(&p, TransConvAlgorithm::Scatter, &x, &w);
            let dense = run_forward(&p, TransConvAlgorithm::Dense, &x, &w);
            for (a, b) in scatter.iter().zip(&dense) {
                for (u, v) in a.as_slice().iter().zip(b.as_slice()) {
                    assert!((u - v).abs() < 1e-12, "stride {stride} padding {padding}: {u} vs {v}");
                }
            }
        }
    }

    #[test]
    fn test_scatter_matches_dense_backward() {
        let p = params(2, 1);
        let out = p.trans_conv_output_shape();
        let x = vec![sample(2, 12, 0.4), sample(2, 12, 0.8)];
        let w = sample(3, 12, 0.6);
        let g = vec![sample(3, out.spatial(), 1.3), sample(3, out.spatial(), 1.9)];

        let run = |algorithm| {
            let mut df = vec![Matrix::new(3, out.spatial()); 2];
            df.iter_mut().for_each(|d| d.fill(0.5));
            let mut grad_x = vec![Matrix::new(2, 12); 2];
            let mut wg = Matrix::new(3, 12);
            let mut bg = Matrix::new(3, 1);
            trans_conv_layer_backward(&Cpu, &mut grad_x, &mut wg, &mut bg, &mut df, &g, &w, &x, &p, algorithm);
            (grad_x, wg, bg)
        };
        let (gx_s, wg_s, bg_s) = run(TransConvAlgorithm::Scatter);
        let (gx_d, wg_d, bg_d) = run(TransConvAlgorithm::Dense);
        for (a, b) in gx_s.iter().zip(&gx_d) {
            for (u, v) in a.as_slice().iter().zip(b.as_slice()) {
                assert!((u - v).abs() < 1e-12);
            }
        }
        for (u, v) in wg_s.as_slice().iter().zip(wg_d.as_slice()) {
            assert!((u - v).abs() < 1e-12);
        }
        assert_eq!(bg_s, bg_d);
    }
}
