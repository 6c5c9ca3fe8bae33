// Encoder module - Assembles the wire-ready LED frame from a captured
// raster: sample, clamp, flicker mitigation, intensity scale, color
// correction, red/green transpose
use anyhow::Result;

use crate::color::ColorCorrection;
use crate::mapping::{validate_coordinates, Coordinate};
use crate::types::{RasterBuffer, CHANNELS};

// First two bytes of every frame: LED data address + mode
pub const FRAME_HEADER: [u8; 2] = [0x80, 0x00];

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    // Global intensity scale; values outside [0, 1] disable scaling
    pub intensity: f32,
    // Sampled triplets with every byte below this are left dark
    pub clamp_threshold: u8,
    // Flicker mitigation: when more than `flicker_ratio` of the payload
    // bytes exceed `flicker_threshold`, all but a rotating subset of LEDs
    // are blanked for this frame to cap simultaneous draw
    pub flicker_threshold: u8,
    pub flicker_ratio: f32,
    // Power of two; selects 1-in-`flicker_modulus` LEDs to stay lit
    pub flicker_modulus: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            intensity: 1.0,
            clamp_threshold: 0,
            flicker_threshold: 250,
            flicker_ratio: 0.6,
            flicker_modulus: 4,
        }
    }
}

pub struct FrameEncoder {
    coordinates: Vec<Coordinate>,
    correction: ColorCorrection,
    config: EncoderConfig,
    // Increments once per encode; drives the rotating flicker subset
    frame_counter: u64,
}

impl FrameEncoder {
    // Coordinates are validated here once; encode itself never range-checks.
    pub fn new(
        coordinates: Vec<Coordinate>,
        correction: ColorCorrection,
        config: EncoderConfig,
        raster_width: usize,
        raster_height: usize,
        row_stride: usize,
    ) -> Result<Self> {
        validate_coordinates(&coordinates, raster_width, raster_height, row_stride)?;
        if !config.flicker_modulus.is_power_of_two() {
            anyhow::bail!(
                "Flicker modulus must be a power of two, got {}",
                config.flicker_modulus
            );
        }
        Ok(FrameEncoder {
            coordinates,
            correction,
            config,
            frame_counter: 0,
        })
    }

    pub fn led_count(&self) -> usize {
        self.coordinates.len()
    }

    // Produce the full wire frame (header + one corrected triplet per LED).
    // Step order matters: each stage operates on the previous stage's bytes.
    pub fn encode(&mut self, raster: &RasterBuffer) -> Vec<u8> {
        let payload_len = self.coordinates.len() * CHANNELS;
        let mut frame = vec![0u8; FRAME_HEADER.len() + payload_len];
        frame[..FRAME_HEADER.len()].copy_from_slice(&FRAME_HEADER);

        let payload = &mut frame[FRAME_HEADER.len()..];
        sample_into(payload, raster, &self.coordinates, self.config.clamp_threshold);
        full_white_compensate(
            payload,
            self.frame_counter,
            self.config.flicker_threshold,
            self.config.flicker_ratio,
            self.config.flicker_modulus,
        );
        scale_pixel_values(payload, self.config.intensity);
        self.correction.apply(payload);
        transpose_red_green(payload);

        self.frame_counter = self.frame_counter.wrapping_add(1);
        frame
    }
}

// Copy each LED's triplet from its sampling location. Triplets where every
// byte is below the clamp threshold stay zeroed, suppressing near-black
// sampling noise.
fn sample_into(
    payload: &mut [u8],
    raster: &RasterBuffer,
    coordinates: &[Coordinate],
    clamp_threshold: u8,
) {
    for (led, coordinate) in coordinates.iter().enumerate() {
        let offset = raster.sample_offset(coordinate.x, coordinate.y);
        let pixel = &raster.data[offset..offset + CHANNELS];
        if pixel.iter().any(|&byte| byte >= clamp_threshold) {
            payload[led * CHANNELS..(led + 1) * CHANNELS].copy_from_slice(pixel);
        }
    }
}

// On frames that would drive too many LEDs near full white, keep only the
// LEDs whose index matches the frame counter under the modulus mask and
// blank the rest. The lit subset rotates every frame, spreading current
// draw round-robin. The tally is taken over the post-clamp buffer.
fn full_white_compensate(
    payload: &mut [u8],
    frame_counter: u64,
    threshold: u8,
    ratio: f32,
    modulus: usize,
) {
    if payload.is_empty() {
        return;
    }
    let over = payload.iter().filter(|&&byte| byte > threshold).count();
    if (over as f32 / payload.len() as f32) <= ratio {
        return;
    }

    let mask = modulus - 1;
    let phase = frame_counter as usize & mask;
    for (led, triplet) in payload.chunks_exact_mut(CHANNELS).enumerate() {
        if led & mask != phase {
            triplet.fill(0);
        }
    }
}

// Scale every byte by a global intensity factor. Out-of-range factors are
// an invalid argument, not a clamp: the buffer is left untouched.
fn scale_pixel_values(payload: &mut [u8], scale: f32) {
    if !(0.0..=1.0).contains(&scale) {
        return;
    }
    for byte in payload.iter_mut() {
        *byte = (*byte as f32 * scale) as u8;
    }
}

// The suit's red and green data lines are swapped relative to the capture
// color order
fn transpose_red_green(payload: &mut [u8]) {
    for triplet in payload.chunks_exact_mut(CHANNELS) {
        triplet.swap(0, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster_with_pixels(pixels: &[[u8; 3]]) -> RasterBuffer {
        // One row, packed
        let data: Vec<u8> = pixels.iter().flatten().copied().collect();
        RasterBuffer::packed(pixels.len(), 1, data).unwrap()
    }

    fn row_coordinates(count: usize) -> Vec<Coordinate> {
        (0..count).map(|x| Coordinate { x, y: 0 }).collect()
    }

    fn encoder_for(raster: &RasterBuffer, config: EncoderConfig) -> FrameEncoder {
        FrameEncoder::new(
            row_coordinates(raster.width),
            ColorCorrection::identity(),
            config,
            raster.width,
            raster.height,
            raster.row_stride,
        )
        .unwrap()
    }

    #[test]
    fn test_frame_carries_header() {
        let raster = raster_with_pixels(&[[10, 20, 30]]);
        let mut encoder = encoder_for(&raster, EncoderConfig::default());
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[..2], &[0x80, 0x00]);
        assert_eq!(frame.len(), 2 + 3);
    }

    #[test]
    fn test_transpose_swaps_red_and_green() {
        let raster = raster_with_pixels(&[[10, 20, 30]]);
        let mut encoder = encoder_for(&raster, EncoderConfig::default());
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..], &[20, 10, 30]);
    }

    #[test]
    fn test_clamp_threshold_blanks_dim_pixels() {
        let raster = raster_with_pixels(&[[4, 4, 4], [4, 5, 4], [200, 0, 0]]);
        let config = EncoderConfig {
            clamp_threshold: 5,
            ..EncoderConfig::default()
        };
        let mut encoder = encoder_for(&raster, config);
        let frame = encoder.encode(&raster);
        // All bytes below threshold: blanked
        assert_eq!(&frame[2..5], &[0, 0, 0]);
        // One byte at threshold: whole triplet kept
        assert_eq!(&frame[5..8], &[5, 4, 4]);
        assert_eq!(&frame[8..11], &[0, 200, 0]);
    }

    #[test]
    fn test_flicker_noop_below_ratio() {
        let raster = raster_with_pixels(&[[255, 255, 255], [0, 0, 0], [0, 0, 0], [0, 0, 0]]);
        let config = EncoderConfig {
            flicker_threshold: 250,
            flicker_ratio: 0.5,
            ..EncoderConfig::default()
        };
        let mut encoder = encoder_for(&raster, config);
        let frame = encoder.encode(&raster);
        // 3 of 12 bytes over threshold, ratio not exceeded: output matches
        // the sampled (transposed) input exactly
        assert_eq!(&frame[2..5], &[255, 255, 255]);
        assert_eq!(&frame[5..8], &[0, 0, 0]);
    }

    #[test]
    fn test_flicker_blanks_rotating_subset() {
        let raster = raster_with_pixels(&[[255; 3], [255; 3], [255; 3], [255; 3]]);
        let config = EncoderConfig {
            flicker_threshold: 250,
            flicker_ratio: 0.5,
            flicker_modulus: 4,
            ..EncoderConfig::default()
        };
        let mut encoder = encoder_for(&raster, config);

        // Frame 0: only LED 0 survives
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..5], &[255, 255, 255]);
        assert_eq!(&frame[5..14], &[0; 9]);

        // Frame 1: the lit subset rotates to LED 1
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..5], &[0, 0, 0]);
        assert_eq!(&frame[5..8], &[255, 255, 255]);
        assert_eq!(&frame[8..14], &[0; 6]);
    }

    #[test]
    fn test_intensity_scales_bytes() {
        let raster = raster_with_pixels(&[[100, 200, 50]]);
        let config = EncoderConfig {
            intensity: 0.5,
            ..EncoderConfig::default()
        };
        let mut encoder = encoder_for(&raster, config);
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..], &[100, 50, 25]);
    }

    #[test]
    fn test_out_of_range_intensity_is_ignored() {
        let raster = raster_with_pixels(&[[100, 200, 50]]);
        let config = EncoderConfig {
            intensity: 1.5,
            ..EncoderConfig::default()
        };
        let mut encoder = encoder_for(&raster, config);
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..], &[200, 100, 50]);
    }

    #[test]
    fn test_sampling_respects_row_stride() {
        // Two rows of one pixel with 2 bytes of padding per row
        let data = vec![1, 2, 3, 0xEE, 0xEE, 4, 5, 6, 0xEE, 0xEE];
        let raster = RasterBuffer::new(1, 2, 5, data).unwrap();
        let mut encoder = FrameEncoder::new(
            vec![Coordinate { x: 0, y: 1 }],
            ColorCorrection::identity(),
            EncoderConfig::default(),
            1,
            2,
            5,
        )
        .unwrap();
        let frame = encoder.encode(&raster);
        assert_eq!(&frame[2..], &[5, 4, 6]);
    }

    #[test]
    fn test_rejects_non_power_of_two_modulus() {
        let result = FrameEncoder::new(
            row_coordinates(1),
            ColorCorrection::identity(),
            EncoderConfig {
                flicker_modulus: 3,
                ..EncoderConfig::default()
            },
            1,
            1,
            3,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_correction_applied_before_transpose() {
        // Scale red down via peak equalization; the scaled red byte must end
        // up in the green wire position
        let correction = ColorCorrection::new([1.0, 1.0, 1.0], [200.0, 100.0, 100.0]);
        let raster = raster_with_pixels(&[[200, 0, 0]]);
        let mut encoder = FrameEncoder::new(
            row_coordinates(1),
            correction,
            EncoderConfig::default(),
            1,
            1,
            3,
        )
        .unwrap();
        let frame = encoder.encode(&raster);
        // red 200 -> table lookup with scale 0.5 -> 100, then swapped
        assert_eq!(&frame[2..], &[0, 100, 0]);
    }
}
