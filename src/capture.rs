// Capture module - Sources of raster frames. The suit's real screen scraper
// lives outside this crate; these sources satisfy the same pull interface
// for development and bench work.
use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::types::RasterBuffer;

// Region of the source image to scrape before resampling to the raster
#[derive(Debug, Clone, Copy)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub trait CaptureSource {
    fn capture(&mut self) -> Result<RasterBuffer>;
}

// Cycles through one or more image files, cropping the capture region and
// resizing to the raster dimensions
pub struct ImageSource {
    frames: Vec<PathBuf>,
    next_frame: usize,
    region: Option<CaptureRegion>,
    raster_width: usize,
    raster_height: usize,
}

impl ImageSource {
    pub fn new(
        path: &Path,
        region: Option<CaptureRegion>,
        raster_width: usize,
        raster_height: usize,
    ) -> Result<Self> {
        let mut frames = Vec::new();
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                if entry.path().is_file() {
                    frames.push(entry.path());
                }
            }
            frames.sort();
        } else {
            frames.push(path.to_path_buf());
        }
        if frames.is_empty() {
            return Err(anyhow!("No image frames found in {}", path.display()));
        }
        Ok(ImageSource {
            frames,
            next_frame: 0,
            region,
            raster_width,
            raster_height,
        })
    }

    fn load_frame(&self, path: &Path) -> Result<RgbImage> {
        let mut image = image::open(path)
            .map_err(|e| anyhow!("Failed to load {}: {}", path.display(), e))?
            .to_rgb8();
        if let Some(region) = self.region {
            if region.x + region.width > image.width() || region.y + region.height > image.height()
            {
                return Err(anyhow!(
                    "Capture region {}x{}+{}+{} exceeds image {}x{}",
                    region.width,
                    region.height,
                    region.x,
                    region.y,
                    image.width(),
                    image.height()
                ));
            }
            let cropped =
                image::imageops::crop(&mut image, region.x, region.y, region.width, region.height)
                    .to_image();
            image = cropped;
        }
        Ok(image::imageops::resize(
            &image,
            self.raster_width as u32,
            self.raster_height as u32,
            FilterType::Triangle,
        ))
    }
}

impl CaptureSource for ImageSource {
    fn capture(&mut self) -> Result<RasterBuffer> {
        let path = &self.frames[self.next_frame];
        let image = self.load_frame(path)?;
        self.next_frame = (self.next_frame + 1) % self.frames.len();
        RasterBuffer::packed(self.raster_width, self.raster_height, image.into_raw())
    }
}

// Moving color wash with a random phase; gives the monitor nonzero interest
// without a screen to scrape
pub struct TestPatternSource {
    raster_width: usize,
    raster_height: usize,
    tick: u64,
    phase: f32,
}

impl TestPatternSource {
    pub fn new(raster_width: usize, raster_height: usize) -> Self {
        let mut rng = rand::thread_rng();
        TestPatternSource {
            raster_width,
            raster_height,
            tick: 0,
            phase: rng.gen_range(0.0..std::f32::consts::TAU),
        }
    }
}

impl CaptureSource for TestPatternSource {
    fn capture(&mut self) -> Result<RasterBuffer> {
        let mut data = Vec::with_capacity(self.raster_width * self.raster_height * 3);
        let t = self.tick as f32 * 0.05 + self.phase;
        for y in 0..self.raster_height {
            for x in 0..self.raster_width {
                let u = x as f32 / self.raster_width as f32;
                let v = y as f32 / self.raster_height as f32;
                data.push((((u * 6.0 + t).sin() * 0.5 + 0.5) * 255.0) as u8);
                data.push((((v * 6.0 + t * 1.3).sin() * 0.5 + 0.5) * 255.0) as u8);
                data.push((((u + v + t * 0.7).sin() * 0.5 + 0.5) * 255.0) as u8);
            }
        }
        self.tick += 1;
        RasterBuffer::packed(self.raster_width, self.raster_height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_has_raster_dimensions() {
        let mut source = TestPatternSource::new(10, 8);
        let raster = source.capture().unwrap();
        assert_eq!(raster.width, 10);
        assert_eq!(raster.height, 8);
        assert_eq!(raster.data.len(), 10 * 8 * 3);
    }

    #[test]
    fn test_pattern_changes_between_frames() {
        let mut source = TestPatternSource::new(16, 16);
        let first = source.capture().unwrap();
        let second = source.capture().unwrap();
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_image_source_rejects_missing_frames() {
        let dir = std::env::temp_dir().join("ledsuit-empty-frames-test");
        let _ = std::fs::create_dir_all(&dir);
        let result = ImageSource::new(&dir, None, 10, 10);
        assert!(result.is_err());
        let _ = std::fs::remove_dir(&dir);
    }
}
