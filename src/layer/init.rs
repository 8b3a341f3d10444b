use crate::tensor::{Matrix, Scalar};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Weight initialisation schemes. Fan-in is the column count, fan-out the row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Initialization {
    /// Normal with `sigma = sqrt(2 / fan_in)`.
    #[default]
    Gauss,
    /// Uniform on `[-sqrt(2 / fan_in), sqrt(2 / fan_in)]`.
    Uniform,
    Identity,
    Zero,
    /// Normal with `sigma = sqrt(2 / (fan_in + fan_out))`, truncated at two sigma.
    GlorotNormal,
    /// Uniform on `[-sqrt(6 / (fan_in + fan_out)), sqrt(6 / (fan_in + fan_out))]`.
    GlorotUniform,
}

pub fn initialize<T: Scalar, R: Rng + ?Sized>(m: &mut Matrix<T>, init: Initialization, rng: &mut R) {
    let (rows, cols) = m.shape();
    if m.is_empty() {
        return;
    }
    let fan_in = cols as f64;
    let fan_sum = (rows + cols) as f64;

    match init {
        Initialization::Gauss => {
            let sigma = (2.0 / fan_in).sqrt();
            for v in m.as_mut_slice() {
                let z: f64 = rng.sample(StandardNormal);
                *v = T::from_f64(z * sigma);
            }
        }
        Initialization::Uniform => {
            let range = (2.0 / fan_in).sqrt();
            for v in m.as_mut_slice() {
                *v = T::from_f64(rng.gen_range(-range..=range));
            }
        }
        Initialization::Identity => {
            for j in 0..cols {
                for i in 0..rows {
                    m[(i, j)] = if i == j { T::one() } else { T::zero() };
                }
            }
        }
        Initialization::Zero => m.zero(),
        Initialization::GlorotNormal => {
            let sigma = (2.0 / fan_sum).sqrt();
            for v in m.as_mut_slice() {
                let mut z: f64 = rng.sample(StandardNormal);
                while z.abs() > 2.0 {
                    z = rng.sample(StandardNormal);
                }
                *v = T::from_f64(z * sigma);
            }
        }
        Initialization::GlorotUniform => {
            let range = (6.0 / fan_sum).sqrt();
            for v in m.as_mut_slice() {
                *v = T::from_f64(rng.gen_range(-range..=range));
            }
        }
    }
}
