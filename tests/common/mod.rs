#![allow(dead_code)]

use deconv::Matrix;

/// Installs a fmt subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn assert_close(a: &[f64], b: &[f64], tol: f64, name: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", name);
    let max_diff = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f64, f64::max);

    if max_diff > tol {
        println!("{} FAILED: max diff = {:.6e} (tol = {:.6e})", name, max_diff, tol);
        println!("Got:      {:?}", &a[..5.min(a.len())]);
        println!("Expected: {:?}", &b[..5.min(b.len())]);
        panic!("{} failed accuracy check", name);
    }
}

pub fn assert_batches_close(a: &[Matrix<f64>], b: &[Matrix<f64>], tol: f64, name: &str) {
    assert_eq!(a.len(), b.len(), "{}: batch size mismatch", name);
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.shape(), y.shape(), "{}: shape mismatch", name);
        assert_close(x.as_slice(), y.as_slice(), tol, name);
    }
}

/// Deterministic, non-trivial test data.
pub fn sample(rows: usize, cols: usize, seed: f64) -> Matrix<f64> {
    Matrix::from_fn(rows, cols, |i, j| ((i * 17 + j * 7) as f64 * 0.211 + seed).sin())
}

pub fn dot(a: &[Matrix<f64>], b: &[Matrix<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.as_slice().iter().zip(y.as_slice()).map(|(u, v)| u * v).sum::<f64>())
        .sum()
}
