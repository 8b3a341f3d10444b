use crate::error::ConfigError;
use crate::kernels::utils::{calculate_dimension, calculate_transposed_dimension};
use serde::{Deserialize, Serialize};

/// Shape of one batch element: `depth` feature maps of `height x width` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    pub fn spatial(&self) -> usize {
        self.height * self.width
    }

    pub fn len(&self) -> usize {
        self.depth * self.spatial()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receptive-field geometry of a filter bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGeometry {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
    pub stride_rows: usize,
    pub stride_cols: usize,
    pub padding_height: usize,
    pub padding_width: usize,
}

impl FilterGeometry {
    pub fn filter_size(&self) -> usize {
        self.height * self.width
    }

    pub fn local_view_pixels(&self) -> usize {
        self.depth * self.filter_size()
    }

    pub fn unit_stride(&self) -> bool {
        self.stride_rows == 1 && self.stride_cols == 1
    }

    /// Number of window positions along each axis, flooring like a raster scan.
    /// Callers must have validated the geometry; this only asserts the window fits.
    pub fn local_view_dims(&self, image: ImageShape) -> (usize, usize) {
        assert!(self.stride_rows > 0 && self.stride_cols > 0, "stride must be positive");
        assert!(
            image.height + 2 * self.padding_height >= self.height,
            "filter height {} exceeds padded image height {}",
            self.height,
            image.height + 2 * self.padding_height
        );
        assert!(
            image.width + 2 * self.padding_width >= self.width,
            "filter width {} exceeds padded image width {}",
            self.width,
            image.width + 2 * self.padding_width
        );
        let rows = (image.height + 2 * self.padding_height - self.height) / self.stride_rows + 1;
        let cols = (image.width + 2 * self.padding_width - self.width) / self.stride_cols + 1;
        (rows, cols)
    }

    /// Output shape of a standard convolution producing `depth` feature maps.
    pub fn conv_output(&self, image: ImageShape, depth: usize) -> Result<ImageShape, ConfigError> {
        let height = calculate_dimension(image.height, self.height, self.padding_height, self.stride_rows)?;
        let width = calculate_dimension(image.width, self.width, self.padding_width, self.stride_cols)?;
        Ok(ImageShape::new(depth, height, width))
    }

    /// Output shape of a transpose convolution producing `depth` feature maps.
    pub fn trans_conv_output(&self, image: ImageShape, depth: usize) -> Result<ImageShape, ConfigError> {
        let height =
            calculate_transposed_dimension(image.height, self.height, self.padding_height, self.stride_rows)?;
        let width =
            calculate_transposed_dimension(image.width, self.width, self.padding_width, self.stride_cols)?;
        Ok(ImageShape::new(depth, height, width))
    }
}

/// Geometry handed to the layer kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    pub batch_size: usize,
    pub input_depth: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub number_filters: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub stride_rows: usize,
    pub stride_cols: usize,
    pub padding_height: usize,
    pub padding_width: usize,
}

impl ConvParams {
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.input_depth, self.input_height, self.input_width)
    }

    pub fn filter(&self) -> FilterGeometry {
        FilterGeometry {
            depth: self.input_depth,
            height: self.filter_height,
            width: self.filter_width,
            stride_rows: self.stride_rows,
            stride_cols: self.stride_cols,
            padding_height: self.padding_height,
            padding_width: self.padding_width,
        }
    }

    pub fn filter_size(&self) -> usize {
        self.filter_height * self.filter_width
    }

    pub fn local_view_pixels(&self) -> usize {
        self.input_depth * self.filter_size()
    }

    /// Output of the standard convolution path.
    pub fn conv_output_shape(&self) -> ImageShape {
        let (height, width) = self.filter().local_view_dims(self.input_shape());
        ImageShape::new(self.number_filters, height, width)
    }

    /// Output of the transpose convolution path.
    pub fn trans_conv_output_shape(&self) -> ImageShape {
        let height = ((self.input_height - 1) * self.stride_rows + self.filter_height)
            .checked_sub(2 * self.padding_height)
            .unwrap_or_else(|| panic!("padding height {} too large for transpose output", self.padding_height));
        let width = ((self.input_width - 1) * self.stride_cols + self.filter_width)
            .checked_sub(2 * self.padding_width)
            .unwrap_or_else(|| panic!("padding width {} too large for transpose output", self.padding_width));
        ImageShape::new(self.number_filters, height, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConvParams {
        ConvParams {
            batch_size: 1,
            input_depth: 2,
            input_height: 4,
            input_width: 5,
            number_filters: 3,
            filter_height: 3,
            filter_width: 3,
            stride_rows: 1,
            stride_cols: 2,
            padding_height: 1,
            padding_width: 1,
        }
    }

    #[test]
    fn test_conv_output_shape() {
        let p = params();
        assert_eq!(p.conv_output_shape(), ImageShape::new(3, 4, 3));
        assert_eq!(p.filter().conv_output(p.input_shape(), 3), Ok(ImageShape::new(3, 4, 3)));
    }

    #[test]
    fn test_trans_conv_output_shape() {
        let p = params();
        // (4-1)*1 + 3 - 2 = 4, (5-1)*2 + 3 - 2 = 9
        assert_eq!(p.trans_conv_output_shape(), ImageShape::new(3, 4, 9));
        let out = p.filter().trans_conv_output(p.input_shape(), 3).unwrap();
        assert_eq!(out, p.trans_conv_output_shape());
        // the adjoint convolution of the output recovers the input
        let back = p.filter().conv_output(out, 2).unwrap();
        assert_eq!(back, p.input_shape());
    }
}
