use thiserror::Error;

/// Invalid layer hyper parameters, reported at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(
        "incompatible hyper parameters for layer - (imageDim, filterDim, padding, stride) {image}, {filter}, {padding}, {stride}"
    )]
    IncompatibleDimension {
        image: usize,
        filter: usize,
        padding: usize,
        stride: usize,
    },
    #[error("stride must be positive")]
    ZeroStride,
    #[error("{0} must be positive")]
    EmptyDimension(&'static str),
    #[error("dropout probability must lie in (0, 1], got {0}")]
    InvalidDropout(f64),
    #[error("weight decay must be non-negative, got {0}")]
    NegativeWeightDecay(f64),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record describes a {found} but the layer is a {expected}")]
    WrongLayerKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("geometry mismatch for {field}: layer has {expected}, record has {found}")]
    GeometryMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("{name} holds {found} values but its shape needs {expected}")]
    InvalidMatrixData {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}
