// Shared types module - Raster buffer snapshot passed from capture to the
// encoder and the visual-interest monitor
use anyhow::{anyhow, Result};

// Bytes per pixel everywhere in this driver (RGB, no alpha)
pub const CHANNELS: usize = 3;

// One captured frame. Rows may carry padding, so sample offsets are computed
// from `row_stride`, not from `width * CHANNELS`.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
    pub data: Vec<u8>,
}

impl RasterBuffer {
    pub fn new(width: usize, height: usize, row_stride: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("Raster dimensions must be nonzero ({}x{})", width, height));
        }
        if row_stride < width * CHANNELS {
            return Err(anyhow!(
                "Row stride {} is too small for width {} at {} bytes per pixel",
                row_stride,
                width,
                CHANNELS
            ));
        }
        if data.len() < row_stride * height {
            return Err(anyhow!(
                "Raster data is {} bytes, need at least {}",
                data.len(),
                row_stride * height
            ));
        }
        Ok(RasterBuffer {
            width,
            height,
            row_stride,
            data,
        })
    }

    // Packed rows, no padding
    pub fn packed(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, width * CHANNELS, data)
    }

    pub fn sample_offset(&self, x: usize, y: usize) -> usize {
        x * CHANNELS + y * self.row_stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_stride() {
        assert!(RasterBuffer::new(10, 10, 29, vec![0; 300]).is_err());
    }

    #[test]
    fn test_rejects_short_data() {
        assert!(RasterBuffer::new(10, 10, 30, vec![0; 299]).is_err());
    }

    #[test]
    fn test_sample_offset_uses_stride() {
        let raster = RasterBuffer::new(10, 10, 32, vec![0; 320]).unwrap();
        assert_eq!(raster.sample_offset(2, 3), 2 * 3 + 3 * 32);
    }
}
