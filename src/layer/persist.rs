use crate::error::PersistError;
use crate::layer::LayerState;
use crate::tensor::{Matrix, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Conv,
    TransConv,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Conv => "ConvLayer",
            LayerKind::TransConv => "TransConvLayer",
        }
    }
}

/// A matrix as stored on disk: shape plus row-major values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatrixRecord<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Scalar> MatrixRecord<T> {
    pub fn from_matrix(m: &Matrix<T>) -> Self {
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.to_row_major(),
        }
    }

    /// Rebuilds the matrix, insisting on `expected` as its shape.
    pub fn to_matrix(&self, name: &'static str, expected: (usize, usize)) -> Result<Matrix<T>, PersistError> {
        let found = (self.rows, self.cols);
        if found != expected {
            return Err(PersistError::ShapeMismatch { name, expected, found });
        }
        if self.data.len() != self.rows * self.cols {
            return Err(PersistError::InvalidMatrixData {
                name,
                expected: self.rows * self.cols,
                found: self.data.len(),
            });
        }
        Ok(Matrix::from_row_major(self.rows, self.cols, &self.data))
    }
}

/// Geometry attributes followed by the trainable matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerRecord<T> {
    pub kind: LayerKind,
    pub depth: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub stride_rows: usize,
    pub stride_cols: usize,
    pub padding_height: usize,
    pub padding_width: usize,
    pub activation_function: usize,
    pub weights: MatrixRecord<T>,
    pub biases: MatrixRecord<T>,
}

impl<T: Scalar> LayerRecord<T> {
    pub fn from_state(kind: LayerKind, state: &LayerState<T>) -> Self {
        let config = state.config();
        Self {
            kind,
            depth: config.number_filters,
            filter_height: config.filter_height,
            filter_width: config.filter_width,
            stride_rows: config.stride_rows,
            stride_cols: config.stride_cols,
            padding_height: config.padding_height,
            padding_width: config.padding_width,
            activation_function: config.activation.index(),
            weights: MatrixRecord::from_matrix(state.weights()),
            biases: MatrixRecord::from_matrix(state.biases()),
        }
    }

    /// Verifies the record against an already constructed layer and returns
    /// its weights and biases.
    pub fn check_against(&self, kind: LayerKind, state: &LayerState<T>) -> Result<(Matrix<T>, Matrix<T>), PersistError> {
        if self.kind != kind {
            return Err(PersistError::WrongLayerKind {
                expected: kind.name(),
                found: self.kind.name(),
            });
        }
        let config = state.config();
        let fields = [
            ("Depth", config.number_filters, self.depth),
            ("FilterHeight", config.filter_height, self.filter_height),
            ("FilterWidth", config.filter_width, self.filter_width),
            ("StrideRows", config.stride_rows, self.stride_rows),
            ("StrideCols", config.stride_cols, self.stride_cols),
            ("PaddingHeight", config.padding_height, self.padding_height),
            ("PaddingWidth", config.padding_width, self.padding_width),
            ("ActivationFunction", config.activation.index(), self.activation_function),
        ];
        for (field, expected, found) in fields {
            if expected != found {
                return Err(PersistError::GeometryMismatch { field, expected, found });
            }
        }

        let weights = self.weights.to_matrix("Weights", state.weights().shape())?;
        let biases = self.biases.to_matrix("Biases", state.biases().shape())?;
        Ok((weights, biases))
    }
}
