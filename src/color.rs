// Color module - Per-channel gamma correction and peak-brightness
// equalization via precomputed lookup tables
use crate::types::CHANNELS;

const TABLE_SIZE: usize = 256;

// Immutable once built; the encode path and tests share it read-only, so no
// locking is needed around apply().
#[derive(Debug, Clone)]
pub struct ColorCorrection {
    tables: [[u8; TABLE_SIZE]; CHANNELS],
}

impl ColorCorrection {
    // Build one table per channel. Each channel is gamma-corrected, then
    // scaled so that no channel can out-shine the dimmest channel's peak
    // output: scale_c = min(peak) / peak_c.
    pub fn new(gamma: [f32; CHANNELS], peak_brightness: [f32; CHANNELS]) -> Self {
        let min_peak = peak_brightness
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min);

        let mut tables = [[0u8; TABLE_SIZE]; CHANNELS];
        for channel in 0..CHANNELS {
            let scale = min_peak / peak_brightness[channel];
            for value in 0..TABLE_SIZE {
                let normalized = value as f32 / 255.0;
                let corrected = (normalized.powf(gamma[channel]) * 255.0 * scale).ceil();
                tables[channel][value] = corrected.min(255.0) as u8;
            }
        }

        ColorCorrection { tables }
    }

    // Pass-through model: gamma 1, all peaks equal
    pub fn identity() -> Self {
        Self::new([1.0; CHANNELS], [1.0; CHANNELS])
    }

    pub fn table(&self, channel: usize) -> &[u8; TABLE_SIZE] {
        &self.tables[channel]
    }

    // Correct a flat buffer of RGB triplets in place
    pub fn apply(&self, pixels: &mut [u8]) {
        for triplet in pixels.chunks_exact_mut(CHANNELS) {
            for channel in 0..CHANNELS {
                triplet[channel] = self.tables[channel][triplet[channel] as usize];
            }
        }
    }
}
