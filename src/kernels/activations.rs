use crate::tensor::{Matrix, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationFunction {
    #[default]
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    SymmRelu,
    SoftSign,
    Gauss,
}

impl ActivationFunction {
    pub const ALL: [ActivationFunction; 7] = [
        ActivationFunction::Identity,
        ActivationFunction::Relu,
        ActivationFunction::Sigmoid,
        ActivationFunction::Tanh,
        ActivationFunction::SymmRelu,
        ActivationFunction::SoftSign,
        ActivationFunction::Gauss,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActivationFunction::Identity => "Identity",
            ActivationFunction::Relu => "Relu",
            ActivationFunction::Sigmoid => "Sigmoid",
            ActivationFunction::Tanh => "Tanh",
            ActivationFunction::SymmRelu => "SymmRelu",
            ActivationFunction::SoftSign => "SoftSign",
            ActivationFunction::Gauss => "Gauss",
        }
    }

    /// Stable numeric code used in persisted layer records.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn value<T: Scalar>(self, x: T) -> T {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::Relu => relu_scalar(x),
            ActivationFunction::Sigmoid => sigmoid(x),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::SymmRelu => x.abs(),
            ActivationFunction::SoftSign => x / (T::one() + x.abs()),
            ActivationFunction::Gauss => (-x * x).exp(),
        }
    }

    pub fn derivative<T: Scalar>(self, x: T) -> T {
        match self {
            ActivationFunction::Identity => T::one(),
            ActivationFunction::Relu => {
                if x < T::zero() {
                    T::zero()
                } else {
                    T::one()
                }
            }
            ActivationFunction::Sigmoid => {
                let s = sigmoid(x);
                s * (T::one() - s)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                T::one() - t * t
            }
            ActivationFunction::SymmRelu => {
                if x < T::zero() {
                    -T::one()
                } else {
                    T::one()
                }
            }
            ActivationFunction::SoftSign => {
                let d = T::one() + x.abs();
                T::one() / (d * d)
            }
            ActivationFunction::Gauss => T::from_f64(-2.0) * x * (-x * x).exp(),
        }
    }
}

pub fn sigmoid<T: Scalar>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

pub fn relu_scalar<T: Scalar>(x: T) -> T {
    x.max(T::zero())
}

/// Applies `f` in place.
pub fn evaluate<T: Scalar>(m: &mut Matrix<T>, f: ActivationFunction) {
    if f == ActivationFunction::Identity {
        return;
    }
    for v in m.as_mut_slice() {
        *v = f.value(*v);
    }
}

/// Writes `f'(pre)` into `df`.
pub fn evaluate_derivative<T: Scalar>(df: &mut Matrix<T>, f: ActivationFunction, pre: &Matrix<T>) {
    assert_eq!(df.shape(), pre.shape(), "derivative buffer shape mismatch");
    for (d, &x) in df.as_mut_slice().iter_mut().zip(pre.as_slice()) {
        *d = f.derivative(x);
    }
}

/// Derivative then value, in one pass over the pre-activations.
pub fn evaluate_fused<T: Scalar>(output: &mut Matrix<T>, df: &mut Matrix<T>, f: ActivationFunction) {
    assert_eq!(df.shape(), output.shape(), "derivative buffer shape mismatch");
    for (x, d) in output.as_mut_slice().iter_mut().zip(df.as_mut_slice()) {
        *d = f.derivative(*x);
        *x = f.value(*x);
    }
}
