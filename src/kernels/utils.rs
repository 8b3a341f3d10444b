use crate::error::ConfigError;
use crate::tensor::{Matrix, Scalar};

/// Output extent of a convolution: `(image - filter + 2 * padding) / stride + 1`.
/// The quotient must be exact, otherwise the window would not tile the padded image.
pub fn calculate_dimension(
    image: usize,
    filter: usize,
    padding: usize,
    stride: usize,
) -> Result<usize, ConfigError> {
    if stride == 0 {
        return Err(ConfigError::ZeroStride);
    }
    let incompatible = ConfigError::IncompatibleDimension {
        image,
        filter,
        padding,
        stride,
    };
    match (image + 2 * padding).checked_sub(filter) {
        Some(span) if span % stride == 0 => Ok(span / stride + 1),
        _ => Err(incompatible),
    }
}

/// Output extent of a transpose convolution: `(image - 1) * stride + filter - 2 * padding`.
/// Checked by running the forward formula on the result, which must give `image` back.
pub fn calculate_transposed_dimension(
    image: usize,
    filter: usize,
    padding: usize,
    stride: usize,
) -> Result<usize, ConfigError> {
    if stride == 0 {
        return Err(ConfigError::ZeroStride);
    }
    let incompatible = ConfigError::IncompatibleDimension {
        image,
        filter,
        padding,
        stride,
    };
    if image == 0 {
        return Err(incompatible);
    }
    let output = match ((image - 1) * stride + filter).checked_sub(2 * padding) {
        Some(output) if output > 0 => output,
        _ => return Err(incompatible),
    };
    if calculate_dimension(output, filter, padding, stride)? != image {
        return Err(incompatible);
    }
    Ok(output)
}

/// Copies `source` into `output` in row-major element order, whatever the two shapes.
pub fn reshape<T: Scalar>(output: &mut Matrix<T>, source: &Matrix<T>) {
    assert_eq!(output.len(), source.len(), "Reshape element count mismatch");
    let cols_out = output.ncols();
    let cols_in = source.ncols();
    for i in 0..output.nrows() {
        for j in 0..cols_out {
            let n = i * cols_out + j;
            output[(i, j)] = source[(n / cols_in, n % cols_in)];
        }
    }
}

/// Packs a batch of `rows x cols` matrices into one `batch x (rows * cols)` matrix.
pub fn flatten<T: Scalar>(output: &mut Matrix<T>, batch: &[Matrix<T>]) {
    assert_eq!(output.nrows(), batch.len(), "Flatten batch size mismatch");
    for (i, m) in batch.iter().enumerate() {
        let cols = m.ncols();
        assert_eq!(output.ncols(), m.len(), "Flatten element count mismatch");
        for j in 0..m.nrows() {
            for k in 0..cols {
                output[(i, j * cols + k)] = m[(j, k)];
            }
        }
    }
}

/// Inverse of [`flatten`].
pub fn deflatten<T: Scalar>(batch: &mut [Matrix<T>], source: &Matrix<T>) {
    assert_eq!(source.nrows(), batch.len(), "Deflatten batch size mismatch");
    for (i, m) in batch.iter_mut().enumerate() {
        let cols = m.ncols();
        assert_eq!(source.ncols(), m.len(), "Deflatten element count mismatch");
        for j in 0..m.nrows() {
            for k in 0..cols {
                m[(j, k)] = source[(i, j * cols + k)];
            }
        }
    }
}
