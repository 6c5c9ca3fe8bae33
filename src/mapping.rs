// Mapping module - Converts LED physical positions into raster sample
// coordinates, either from an explicit mapping file or by serpentine
// sampling of a logical LED grid
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::CHANNELS;

// One raster-space sample location. Table index order is the physical wire
// order of the LED strip and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub x: usize,
    pub y: usize,
}

// One entry of the mapping file: a normalized position in the unit square.
// Either component may be absent in hand-edited files; such entries are
// skipped with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub samples: Vec<MappingSample>,
}

pub fn load_mapping(path: &Path) -> Result<Mapping> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read mapping file {}: {}", path.display(), e))?;
    let mapping: Mapping = serde_json::from_str(&contents)
        .map_err(|e| anyhow!("Failed to parse mapping file {}: {}", path.display(), e))?;
    Ok(mapping)
}

// Scale normalized samples into integer raster coordinates. Truncation (not
// rounding) matches the mapping files already in the field.
pub fn coordinates_from_samples(
    samples: &[MappingSample],
    raster_width: usize,
    raster_height: usize,
) -> Vec<Coordinate> {
    let mut coordinates = Vec::with_capacity(samples.len());
    for (index, sample) in samples.iter().enumerate() {
        let (x, y) = match (sample.x, sample.y) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                eprintln!("Mapping sample {} is missing a component; skipping", index);
                continue;
            }
        };
        coordinates.push(Coordinate {
            x: (x * (raster_width - 1) as f64) as usize,
            y: (y * (raster_height - 1) as f64) as usize,
        });
    }
    coordinates
}

// Serpentine sampling over a logical LED grid spanning the raster. The strip
// is wired zigzag to form a 2D panel, so odd grid rows are traversed
// right-to-left. Strides are integer; grid dimensions minus one should divide
// raster dimensions minus one for exact corner coverage.
pub fn coordinates_serpentine(
    grid_width: usize,
    grid_height: usize,
    raster_width: usize,
    raster_height: usize,
) -> Result<Vec<Coordinate>> {
    if grid_width < 2 || grid_height < 2 {
        return Err(anyhow!(
            "LED grid must be at least 2x2, got {}x{}",
            grid_width,
            grid_height
        ));
    }
    if grid_width > raster_width || grid_height > raster_height {
        return Err(anyhow!(
            "LED grid {}x{} does not fit raster {}x{}",
            grid_width,
            grid_height,
            raster_width,
            raster_height
        ));
    }

    let stride_x = (raster_width - 1) / (grid_width - 1);
    let stride_y = (raster_height - 1) / (grid_height - 1);

    let mut coordinates = Vec::with_capacity(grid_width * grid_height);
    let mut y = 0;
    while y < raster_height {
        let row = y / stride_y;
        let mut x = 0;
        while x < raster_width {
            let h_index = if row % 2 == 0 { x } else { (raster_width - 1) - x };
            coordinates.push(Coordinate { x: h_index, y });
            x += stride_x;
        }
        y += stride_y;
    }

    Ok(coordinates)
}

// Startup-time guard against out-of-range sampling. The encoder never checks
// coordinates per frame; anything that passes here is safe by construction.
pub fn validate_coordinates(
    coordinates: &[Coordinate],
    raster_width: usize,
    raster_height: usize,
    row_stride: usize,
) -> Result<()> {
    for (index, coordinate) in coordinates.iter().enumerate() {
        if coordinate.x >= raster_width || coordinate.y >= raster_height {
            return Err(anyhow!(
                "Coordinate {} at ({}, {}) is outside raster {}x{}",
                index,
                coordinate.x,
                coordinate.y,
                raster_width,
                raster_height
            ));
        }
        // Padding bytes at row ends are readable but never a valid sample
        if coordinate.x * CHANNELS + CHANNELS > row_stride {
            return Err(anyhow!(
                "Coordinate {} at x={} reads past row stride {}",
                index,
                coordinate.x,
                row_stride
            ));
        }
    }
    Ok(())
}
