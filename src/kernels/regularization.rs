use crate::kernels::gemm::scale_add;
use crate::tensor::{Matrix, Scalar};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Regularization {
    #[default]
    None,
    L1,
    L2,
}

impl Regularization {
    pub fn name(self) -> &'static str {
        match self {
            Regularization::None => "None",
            Regularization::L1 => "L1",
            Regularization::L2 => "L2",
        }
    }
}

/// Penalty contribution of `weights` to the loss.
pub fn regularization<T: Scalar>(weights: &Matrix<T>, reg: Regularization) -> T {
    match reg {
        Regularization::None => T::zero(),
        Regularization::L1 => weights.as_slice().iter().map(|w| w.abs()).sum(),
        Regularization::L2 => weights.as_slice().iter().map(|&w| w * w).sum(),
    }
}

/// Adds `weight_decay * d(penalty)/dw` to the weight gradients.
pub fn add_regularization_gradients<T: Scalar>(
    weight_gradients: &mut Matrix<T>,
    weights: &Matrix<T>,
    weight_decay: T,
    reg: Regularization,
) {
    match reg {
        Regularization::None => {}
        Regularization::L1 => {
            assert_eq!(weight_gradients.shape(), weights.shape(), "AddL1RegularizationGradients shape mismatch");
            for (g, &w) in weight_gradients.as_mut_slice().iter_mut().zip(weights.as_slice()) {
                // sign(0) is 0
                if w > T::zero() {
                    *g += weight_decay;
                } else if w < T::zero() {
                    *g = *g - weight_decay;
                }
            }
        }
        Regularization::L2 => {
            scale_add(weight_gradients, weights, T::from_f64(2.0) * weight_decay);
        }
    }
}

/// Inverted dropout in place: each entry survives with probability `keep`
/// and is rescaled by `1 / keep`.
pub fn dropout<T: Scalar, R: Rng + ?Sized>(m: &mut Matrix<T>, keep: f64, rng: &mut R) {
    if keep >= 1.0 {
        return;
    }
    let scale = T::from_f64(1.0 / keep);
    for v in m.as_mut_slice() {
        if rng.gen::<f64>() < keep {
            *v *= scale;
        } else {
            *v = T::zero();
        }
    }
}
