use faer::linalg::matmul::matmul as faer_matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};
use matrixmultiply::{dgemm, sgemm};
use num_traits::Float;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{AddAssign, Index, IndexMut, MulAssign};

/// Element type of every matrix in the crate.
///
/// The two BLAS-style primitives live here so that each float width can call
/// into its concrete faer / matrixmultiply entry point.
pub trait Scalar:
    Float
    + AddAssign
    + MulAssign
    + Sum
    + Default
    + Debug
    + Display
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    fn from_f64(v: f64) -> Self;

    /// `dst = alpha * lhs * rhs`, or `dst += alpha * lhs * rhs` when `accumulate`.
    fn gemm(
        dst: StridedMut<'_, Self>,
        lhs: Strided<'_, Self>,
        rhs: Strided<'_, Self>,
        alpha: Self,
        accumulate: bool,
    );

    /// Rank-1 update `a += alpha * x * y^T` of a column-major `m x n` buffer.
    fn ger(a: &mut [Self], m: usize, n: usize, alpha: Self, x: &[Self], y: &[Self]);
}

/// Borrowed strided view of a matrix buffer.
#[derive(Debug, Clone, Copy)]
pub struct Strided<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
}

/// Mutable strided view of a matrix buffer.
#[derive(Debug)]
pub struct StridedMut<'a, T> {
    data: &'a mut [T],
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
}

impl<T> Strided<'_, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl<T> StridedMut<'_, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
}

macro_rules! impl_scalar {
    ($ty:ty, $gemm:ident) => {
        impl Scalar for $ty {
            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            fn gemm(
                mut dst: StridedMut<'_, $ty>,
                lhs: Strided<'_, $ty>,
                rhs: Strided<'_, $ty>,
                alpha: $ty,
                accumulate: bool,
            ) {
                assert_eq!(lhs.cols, rhs.rows, "Gemm K dim mismatch: {} vs {}", lhs.cols, rhs.rows);
                assert_eq!(dst.rows, lhs.rows, "Gemm M dim mismatch: {} vs {}", dst.rows, lhs.rows);
                assert_eq!(dst.cols, rhs.cols, "Gemm N dim mismatch: {} vs {}", dst.cols, rhs.cols);
                if dst.rows == 0 || dst.cols == 0 {
                    return;
                }
                if lhs.cols == 0 {
                    if !accumulate {
                        dst.data.fill(0.0);
                    }
                    return;
                }
                unsafe {
                    let lhs_mat = MatRef::<$ty>::from_raw_parts(
                        lhs.data.as_ptr(), lhs.rows, lhs.cols, lhs.row_stride, lhs.col_stride,
                    );
                    let rhs_mat = MatRef::<$ty>::from_raw_parts(
                        rhs.data.as_ptr(), rhs.rows, rhs.cols, rhs.row_stride, rhs.col_stride,
                    );
                    let out_mat = MatMut::<$ty>::from_raw_parts_mut(
                        dst.data.as_mut_ptr(), dst.rows, dst.cols, dst.row_stride, dst.col_stride,
                    );
                    let accum = if accumulate { Accum::Add } else { Accum::Replace };
                    faer_matmul(out_mat, accum, lhs_mat, rhs_mat, alpha, Par::Seq);
                }
            }

            fn ger(a: &mut [$ty], m: usize, n: usize, alpha: $ty, x: &[$ty], y: &[$ty]) {
                assert_eq!(a.len(), m * n, "Ger output size mismatch");
                assert!(x.len() >= m, "Ger x too short: {} < {}", x.len(), m);
                assert!(y.len() >= n, "Ger y too short: {} < {}", y.len(), n);
                if m == 0 || n == 0 {
                    return;
                }
                // x is m x 1, y^T is 1 x n, a is column-major m x n
                unsafe {
                    $gemm(
                        m,
                        1,
                        n,
                        alpha,
                        x.as_ptr(),
                        1,
                        1,
                        y.as_ptr(),
                        1,
                        1,
                        1.0,
                        a.as_mut_ptr(),
                        1,
                        m as isize,
                    );
                }
            }
        }
    };
}

impl_scalar!(f32, sgemm);
impl_scalar!(f64, dgemm);

/// Dense 2-D buffer stored column-major, the layout BLAS expects.
///
/// A `depth x spatial` activation matrix therefore keeps the channels of one
/// pixel adjacent: element `(channel, pos)` sits at `pos * depth + channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> Matrix<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for j in 0..cols {
            for i in 0..rows {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn from_row_major(rows: usize, cols: usize, values: &[T]) -> Self {
        assert_eq!(values.len(), rows * cols, "Data length mismatch");
        Self::from_fn(rows, cols, |i, j| values[i * cols + j])
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contiguous column-major buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn column(&self, j: usize) -> &[T] {
        &self.data[j * self.rows..(j + 1) * self.rows]
    }

    pub fn zero(&mut self) {
        self.data.fill(T::zero());
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn sum(&self) -> T {
        self.data.iter().copied().sum()
    }

    pub fn to_row_major(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.data.len());
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.push(self[(i, j)]);
            }
        }
        out
    }

    pub fn view(&self) -> Strided<'_, T> {
        Strided {
            data: &self.data,
            rows: self.rows,
            cols: self.cols,
            row_stride: 1,
            col_stride: self.rows as isize,
        }
    }

    /// View of the transpose, without copying.
    pub fn view_transposed(&self) -> Strided<'_, T> {
        Strided {
            data: &self.data,
            rows: self.cols,
            cols: self.rows,
            row_stride: self.rows as isize,
            col_stride: 1,
        }
    }

    pub fn view_mut(&mut self) -> StridedMut<'_, T> {
        StridedMut {
            rows: self.rows,
            cols: self.cols,
            row_stride: 1,
            col_stride: self.rows as isize,
            data: &mut self.data,
        }
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        debug_assert!(i < self.rows && j < self.cols);
        &self.data[j * self.rows + i]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[j * self.rows + i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_layout() {
        let m = Matrix::<f32>::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(m[(1, 2)], 6.0);
        assert_eq!(m.to_row_major(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_gemm_transposed_view() {
        // A = [[1,2],[3,4]], B = [[5,6],[7,8]]; A * B^T = [[17,23],[39,53]]
        let a = Matrix::<f64>::from_row_major(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::<f64>::from_row_major(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let mut c = Matrix::<f64>::new(2, 2);
        f64::gemm(c.view_mut(), a.view(), b.view_transposed(), 1.0, false);
        assert_eq!(c.to_row_major(), vec![17.0, 23.0, 39.0, 53.0]);
    }

    #[test]
    fn test_ger_accumulates() {
        let mut a = Matrix::<f32>::from_row_major(2, 3, &[1.0; 6]);
        let (m, n) = a.shape();
        f32::ger(a.as_mut_slice(), m, n, 1.0, &[1.0, 2.0], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(a.to_row_major(), vec![2.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
    }
}
