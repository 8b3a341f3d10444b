use crate::geometry::{FilterGeometry, ImageShape};
use crate::tensor::{Matrix, Scalar};
use rayon::prelude::*;

/// Index-map entry for a receptive-field pixel that falls in the zero padding.
pub const PADDED: isize = -1;

/// Smallest slice of the index map handed to one worker.
const MIN_GATHER_CHUNK: usize = 4096;

/// Precomputes the im2col gather for `image` under `filter`.
///
/// Entry `pixel * n_local_views + view` holds the flat offset
/// `(row * width + col) * depth + channel` of the source pixel, or [`PADDED`].
/// Views run in raster order over output positions; within a view channels are
/// outermost and kernel rows/cols innermost, matching the weight-matrix columns.
pub fn im2col_indices(image: ImageShape, filter: &FilterGeometry) -> Vec<isize> {
    let (out_h, out_w) = filter.local_view_dims(image);
    let n_local_views = out_h * out_w;
    let n_pixels = image.depth * filter.filter_size();
    let mut indices = vec![PADDED; n_local_views * n_pixels];

    let height = image.height as isize;
    let width = image.width as isize;
    for oh in 0..out_h {
        let row_start = (oh * filter.stride_rows) as isize - filter.padding_height as isize;
        for ow in 0..out_w {
            let col_start = (ow * filter.stride_cols) as isize - filter.padding_width as isize;
            let view = oh * out_w + ow;
            let mut pixel = 0;
            for channel in 0..image.depth {
                for kh in 0..filter.height {
                    let row = row_start + kh as isize;
                    for kw in 0..filter.width {
                        let col = col_start + kw as isize;
                        if row >= 0 && row < height && col >= 0 && col < width {
                            indices[pixel * n_local_views + view] =
                                (row * width + col) * image.depth as isize + channel as isize;
                        }
                        pixel += 1;
                    }
                }
            }
        }
    }
    indices
}

/// Direct gather recomputing coordinates for every cell.
pub fn im2col<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, image: ImageShape, filter: &FilterGeometry) {
    let (out_h, out_w) = filter.local_view_dims(image);
    assert_eq!(input.shape(), (image.depth, image.spatial()), "Im2col input shape mismatch");
    assert_eq!(
        output.shape(),
        (out_h * out_w, image.depth * filter.filter_size()),
        "Im2col output shape mismatch"
    );

    for oh in 0..out_h {
        let row_start = (oh * filter.stride_rows) as isize - filter.padding_height as isize;
        for ow in 0..out_w {
            let col_start = (ow * filter.stride_cols) as isize - filter.padding_width as isize;
            let view = oh * out_w + ow;
            let mut pixel = 0;
            for channel in 0..image.depth {
                for kh in 0..filter.height {
                    let row = row_start + kh as isize;
                    for kw in 0..filter.width {
                        let col = col_start + kw as isize;
                        output[(view, pixel)] = if row < 0
                            || row >= image.height as isize
                            || col < 0
                            || col >= image.width as isize
                        {
                            T::zero()
                        } else {
                            input[(channel, row as usize * image.width + col as usize)]
                        };
                        pixel += 1;
                    }
                }
            }
        }
    }
}

/// Gather driven by a precomputed index map, serial.
pub fn im2col_fast<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, indices: &[isize]) {
    assert_eq!(indices.len(), output.len(), "Im2colFast index map does not cover the output");
    gather(output.as_mut_slice(), input.as_slice(), indices);
}

/// Gather driven by a precomputed index map, split across the rayon pool.
pub fn im2col_fast_par<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, indices: &[isize]) {
    assert_eq!(indices.len(), output.len(), "Im2colFast index map does not cover the output");
    let n = indices.len();
    let chunk = (n / rayon::current_num_threads()).max(MIN_GATHER_CHUNK);
    let src = input.as_slice();
    output
        .as_mut_slice()
        .par_chunks_mut(chunk)
        .zip(indices.par_chunks(chunk))
        .for_each(|(dst, idx)| gather(dst, src, idx));
}

#[inline]
fn gather<T: Scalar>(dst: &mut [T], src: &[T], indices: &[isize]) {
    for (d, &idx) in dst.iter_mut().zip(indices) {
        *d = if idx >= 0 { src[idx as usize] } else { T::zero() };
    }
}

/// Scatter-add dual of [`im2col_fast`]: `output[indices[i]] += cols[i]`.
///
/// Several cells may target the same output pixel, so this runs serially.
pub fn col2im_fast<T: Scalar>(output: &mut Matrix<T>, cols: &Matrix<T>, indices: &[isize]) {
    assert_eq!(indices.len(), cols.len(), "Col2imFast index map does not cover the columns");
    let dst = output.as_mut_slice();
    for (&value, &idx) in cols.as_slice().iter().zip(indices) {
        if idx >= 0 {
            dst[idx as usize] += value;
        }
    }
}

/// Reverses the receptive-field pixel order of every filter and swaps the
/// filter and channel roles: `A(j, k * jump + i) = B(k, (j + 1) * jump - 1 - i)`.
pub fn rotate_weights<T: Scalar>(
    weights: &Matrix<T>,
    filter_depth: usize,
    filter_height: usize,
    filter_width: usize,
    num_filters: usize,
) -> Matrix<T> {
    let jump = filter_height * filter_width;
    assert_eq!(weights.shape(), (num_filters, filter_depth * jump), "RotateWeights shape mismatch");
    let mut rotated = Matrix::new(filter_depth, num_filters * jump);
    for j in 0..filter_depth {
        for k in 0..num_filters {
            for i in 0..jump {
                rotated[(j, k * jump + i)] = weights[(k, (j + 1) * jump - 1 - i)];
            }
        }
    }
    rotated
}

/// Swaps filter and channel blocks without reversing pixels:
/// `A(c, k * jump + i) = B(k, c * jump + i)`.
pub fn swap_filter_channels<T: Scalar>(weights: &Matrix<T>, filter_depth: usize, filter_size: usize) -> Matrix<T> {
    let num_filters = weights.nrows();
    assert_eq!(weights.ncols(), filter_depth * filter_size, "SwapFilterChannels shape mismatch");
    let mut swapped = Matrix::new(filter_depth, num_filters * filter_size);
    for c in 0..filter_depth {
        for k in 0..num_filters {
            for i in 0..filter_size {
                swapped[(c, k * filter_size + i)] = weights[(k, c * filter_size + i)];
            }
        }
    }
    swapped
}
