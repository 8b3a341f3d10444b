use crate::tensor::{Matrix, Scalar};

/// Constant ones used to broadcast biases through a rank-1 update.
///
/// Sized once by its owner and only borrowed inside parallel regions.
#[derive(Debug, Clone)]
pub struct OnesVector<T> {
    data: Vec<T>,
}

impl<T: Scalar> OnesVector<T> {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![T::one(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// `input (m x k) * weights (k x n) -> output (m x n)`
pub fn check_multiply<T: Scalar>(output: &Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    assert_eq!(
        output.nrows(),
        input.nrows(),
        "Multiply: invalid output rows - input rows: {} != output rows: {}",
        input.nrows(),
        output.nrows()
    );
    assert_eq!(
        output.ncols(),
        weights.ncols(),
        "Multiply: invalid output cols - weight cols: {} != output cols: {}",
        weights.ncols(),
        output.ncols()
    );
    assert_eq!(
        input.ncols(),
        weights.nrows(),
        "Multiply: input cols: {} != weight rows: {}",
        input.ncols(),
        weights.nrows()
    );
}

/// `input (m x k) * weights^T (n x k) -> output (m x n)`
pub fn check_multiply_transpose<T: Scalar>(output: &Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    assert_eq!(
        output.nrows(),
        input.nrows(),
        "MultiplyTranspose: invalid input - output rows - input: {} != output: {}",
        input.nrows(),
        output.nrows()
    );
    assert_eq!(
        output.ncols(),
        weights.nrows(),
        "MultiplyTranspose: invalid output cols or weight rows - output cols: {} != weight rows: {}",
        output.ncols(),
        weights.nrows()
    );
    assert_eq!(
        input.ncols(),
        weights.ncols(),
        "MultiplyTranspose: invalid input cols or weight cols - input cols: {} != weight cols: {}",
        input.ncols(),
        weights.ncols()
    );
}

/// `input^T (m x k)^T * weights (k x n) -> output (m x n)`
pub fn check_transpose_multiply<T: Scalar>(output: &Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    assert_eq!(
        output.nrows(),
        input.ncols(),
        "TransposeMultiply: input cols: {} != output rows: {}",
        input.ncols(),
        output.nrows()
    );
    assert_eq!(
        output.ncols(),
        weights.ncols(),
        "TransposeMultiply: weight cols: {} != output cols: {}",
        weights.ncols(),
        output.ncols()
    );
    assert_eq!(
        input.nrows(),
        weights.nrows(),
        "TransposeMultiply: input rows: {} != weight rows: {}",
        input.nrows(),
        weights.nrows()
    );
}

pub fn check_conv_biases<T: Scalar>(output: &Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
    assert!(
        output.nrows() <= biases.len(),
        "AddConvBiases: {} output rows but only {} biases",
        output.nrows(),
        biases.len()
    );
    assert!(
        output.ncols() <= ones.len(),
        "AddConvBiases: ones vector of length {} is shorter than {} output cols",
        ones.len(),
        output.ncols()
    );
}

pub fn check_row_wise<T: Scalar>(output: &Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
    assert!(
        output.nrows() <= ones.len(),
        "AddRowWise: ones vector of length {} is shorter than {} output rows",
        ones.len(),
        output.nrows()
    );
    assert!(
        output.ncols() <= biases.len(),
        "AddRowWise: {} output cols but only {} biases",
        output.ncols(),
        biases.len()
    );
}

pub fn multiply<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    check_multiply(output, input, weights);
    T::gemm(output.view_mut(), input.view(), weights.view(), T::one(), false);
}

pub fn multiply_transpose<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    check_multiply_transpose(output, input, weights);
    T::gemm(output.view_mut(), input.view(), weights.view_transposed(), T::one(), false);
}

pub fn transpose_multiply<T: Scalar>(output: &mut Matrix<T>, input: &Matrix<T>, weights: &Matrix<T>) {
    check_transpose_multiply(output, input, weights);
    T::gemm(output.view_mut(), input.view_transposed(), weights.view(), T::one(), false);
}

/// Adds `biases[i]` to every column of row `i`.
pub fn add_conv_biases<T: Scalar>(output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
    check_conv_biases(output, biases, ones);
    let (m, n) = output.shape();
    T::ger(output.as_mut_slice(), m, n, T::one(), &biases.as_slice()[..m], ones.as_slice());
}

/// Adds `biases[j]` to every row of column `j`.
pub fn add_row_wise<T: Scalar>(output: &mut Matrix<T>, biases: &Matrix<T>, ones: &OnesVector<T>) {
    check_row_wise(output, biases, ones);
    let (m, n) = output.shape();
    T::ger(output.as_mut_slice(), m, n, T::one(), ones.as_slice(), &biases.as_slice()[..n]);
}

/// `a += beta * b`
pub fn scale_add<T: Scalar>(a: &mut Matrix<T>, b: &Matrix<T>, beta: T) {
    assert_eq!(a.shape(), b.shape(), "ScaleAdd shape mismatch");
    for (x, &y) in a.as_mut_slice().iter_mut().zip(b.as_slice()) {
        *x += beta * y;
    }
}

/// Element-wise `a *= b`.
pub fn hadamard<T: Scalar>(a: &mut Matrix<T>, b: &Matrix<T>) {
    assert_eq!(a.shape(), b.shape(), "Hadamard shape mismatch");
    for (x, &y) in a.as_mut_slice().iter_mut().zip(b.as_slice()) {
        *x *= y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_transpose() {
        // [[1,2,3],[4,5,6]] * [[1,0,1],[2,1,0]]^T = [[4,4],[10,13]]
        let a = Matrix::<f32>::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let w = Matrix::<f32>::from_row_major(2, 3, &[1.0, 0.0, 1.0, 2.0, 1.0, 0.0]);
        let mut out = Matrix::new(2, 2);
        multiply_transpose(&mut out, &a, &w);
        assert_eq!(out.to_row_major(), vec![4.0, 4.0, 10.0, 13.0]);
    }

    #[test]
    fn test_transpose_multiply() {
        let a = Matrix::<f64>::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::<f64>::from_row_major(2, 1, &[1.0, 1.0]);
        let mut out = Matrix::new(3, 1);
        transpose_multiply(&mut out, &a, &b);
        assert_eq!(out.to_row_major(), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    #[should_panic(expected = "MultiplyTranspose")]
    fn test_multiply_transpose_dimension_mismatch() {
        let a = Matrix::<f32>::new(2, 3);
        let w = Matrix::<f32>::new(2, 4);
        let mut out = Matrix::new(2, 2);
        multiply_transpose(&mut out, &a, &w);
    }

    #[test]
    fn test_bias_broadcast() {
        let ones = OnesVector::new(4);
        let biases = Matrix::<f32>::from_row_major(2, 1, &[1.0, -2.0]);
        let mut out = Matrix::new(2, 3);
        add_conv_biases(&mut out, &biases, &ones);
        assert_eq!(out.to_row_major(), vec![1.0, 1.0, 1.0, -2.0, -2.0, -2.0]);

        let col_biases = Matrix::<f32>::from_row_major(3, 1, &[1.0, 2.0, 3.0]);
        add_row_wise(&mut out, &col_biases, &ones);
        assert_eq!(out.to_row_major(), vec![2.0, 3.0, 4.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic(expected = "ones vector")]
    fn test_bias_broadcast_needs_ones() {
        let ones = OnesVector::new(2);
        let biases = Matrix::<f32>::new(2, 1);
        let mut out = Matrix::new(2, 3);
        add_conv_biases(&mut out, &biases, &ones);
    }
}
