use crate::kernels::activations::{evaluate_fused, ActivationFunction};
use crate::kernels::gemm::{self, OnesVector};
use crate::kernels::im2col;
use crate::tensor::{Matrix, Scalar};
use std::fmt::Debug;

/// The numeric primitives the layer kernels are written against.
///
/// Every operation asserts its dimension contract before touching memory.
pub trait Backend<T: Scalar>: Send + Sync + Debug {
    /// `output = input * weights`
    fn multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>);

    /// `output = input * weights^T`
    fn multiply_transpose(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>);

    /// `output = input^T * weights`
    fn transpose_multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>);

    fn im2col_fast(&self, output: &mut Matrix<T>, input: &Matrix<T>, indices: &[isize]);

    fn add_conv_biases(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>);

    fn add_row_wise(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>);

    fn hadamard(&self, a: &mut Matrix<T>, b: &Matrix<T>) {
        gemm::hadamard(a, b);
    }

    /// Stores `f'(output)` in `derivatives`, then applies `f` to `output` in place.
    fn activate(&self, output: &mut Matrix<T>, derivatives: &mut Matrix<T>, f: ActivationFunction) {
        evaluate_fused(output, derivatives, f);
    }
}

/// faer / matrixmultiply GEMM with a rayon-parallel gather.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu;

impl<T: Scalar> Backend<T> for Cpu {
    fn multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::multiply(output, input, weights);
    }

    fn multiply_transpose(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::multiply_transpose(output, input, weights);
    }

    fn transpose_multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::transpose_multiply(output, input, weights);
    }

    fn im2col_fast(&self, output: &mut Matrix<T>, input: &Matrix<T>, indices: &[isize]) {
        im2col::im2col_fast_par(output, input, indices);
    }

    fn add_conv_biases(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
        gemm::add_conv_biases(output, biases, ones);
    }

    fn add_row_wise(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
        gemm::add_row_wise(output, biases, ones);
    }
}

/// Plain loops, no BLAS and no worker threads inside an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reference;

impl<T: Scalar> Backend<T> for Reference {
    fn multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::check_multiply(output, input, weights);
        let (m, n) = output.shape();
        for j in 0..n {
            for i in 0..m {
                let mut acc = T::zero();
                for l in 0..input.ncols() {
                    acc += input[(i, l)] * weights[(l, j)];
                }
                output[(i, j)] = acc;
            }
        }
    }

    fn multiply_transpose(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::check_multiply_transpose(output, input, weights);
        let (m, n) = output.shape();
        for j in 0..n {
            for i in 0..m {
                let mut acc = T::zero();
                for l in 0..input.ncols() {
                    acc += input[(i, l)] * weights[(j, l)];
                }
                output[(i, j)] = acc;
            }
        }
    }

    fn transpose_multiply(&self, output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
        gemm::check_transpose_multiply(output, input, weights);
        let (m, n) = output.shape();
        for j in 0..n {
            for i in 0..m {
                let mut acc = T::zero();
                for l in 0..input.nrows() {
                    acc += input[(l, i)] * weights[(l, j)];
                }
                output[(i, j)] = acc;
            }
        }
    }

    fn im2col_fast(&self, output: &mut Matrix<T>, input: &Matrix<T>, indices: &[isize]) {
        im2col::im2col_fast(output, input, indices);
    }

    fn add_conv_biases(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
        gemm::check_conv_biases(output, biases, ones);
        let (m, n) = output.shape();
        let b = biases.as_slice();
        for j in 0..n {
            for (i, &bias) in b.iter().enumerate().take(m) {
                output[(i, j)] += bias;
            }
        }
    }

    fn add_row_wise(&self, output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
        gemm::check_row_wise(output, biases, ones);
        let (m, n) = output.shape();
        let b = biases.as_slice();
        for (j, &bias) in b.iter().enumerate().take(n) {
            for i in 0..m {
                output[(i, j)] += bias;
            }
        }
    }
}
