// LEDSuit - Drives a wearable LED array from a continuously captured
// visualizer image, with a background monitor that advances the visualizer
// preset when the picture stops being interesting
use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod capture;
mod color;
mod config;
mod encoder;
mod interest;
mod mapping;
mod preset;
mod transport;
mod types;

use capture::{CaptureRegion, CaptureSource, ImageSource, TestPatternSource};
use color::ColorCorrection;
use config::{Args, DriverConfig};
use encoder::{EncoderConfig, FrameEncoder};
use interest::{MonitorConfig, VisualInterestMonitor};
use preset::PresetController;
use transport::{SpiDevTransport, Transport, UdpTransport};
use types::CHANNELS;

fn build_coordinates(config: &DriverConfig) -> Result<Vec<mapping::Coordinate>> {
    match &config.mapping_file {
        Some(path) => {
            let loaded = mapping::load_mapping(Path::new(path))?;
            let coordinates = mapping::coordinates_from_samples(
                &loaded.samples,
                config.raster_width,
                config.raster_height,
            );
            if coordinates.is_empty() {
                return Err(anyhow!("Mapping file {} contains no usable samples", path));
            }
            eprintln!("Loaded {} LED coordinates from {}", coordinates.len(), path);
            Ok(coordinates)
        }
        None => {
            let coordinates = mapping::coordinates_serpentine(
                config.grid_width,
                config.grid_height,
                config.raster_width,
                config.raster_height,
            )?;
            eprintln!(
                "No mapping file; serpentine sampling a {}x{} grid ({} LEDs)",
                config.grid_width,
                config.grid_height,
                coordinates.len()
            );
            Ok(coordinates)
        }
    }
}

fn build_transport(config: &DriverConfig) -> Result<Box<dyn Transport>> {
    match config.transport.as_str() {
        "spi" => Ok(Box::new(SpiDevTransport::open(&config.spi_device)?)),
        "udp" => Ok(Box::new(UdpTransport::connect(&config.udp_destination)?)),
        other => Err(anyhow!("unknown transport '{}'", other)),
    }
}

fn build_source(config: &DriverConfig) -> Result<Box<dyn CaptureSource>> {
    match config.source.as_str() {
        "pattern" => Ok(Box::new(TestPatternSource::new(
            config.raster_width,
            config.raster_height,
        ))),
        path => {
            let region = CaptureRegion {
                x: config.capture_x,
                y: config.capture_y,
                width: config.capture_width,
                height: config.capture_height,
            };
            Ok(Box::new(ImageSource::new(
                Path::new(path),
                Some(region),
                config.raster_width,
                config.raster_height,
            )?))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DriverConfig::load(args.cfg.as_deref())?;
    config.apply_args(&args);
    config.validate()?;

    if args.save {
        let path = DriverConfig::config_path(args.cfg.as_deref());
        config.save(&path)?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let coordinates = build_coordinates(&config)?;
    let row_stride = config.raster_width * CHANNELS;

    let correction = ColorCorrection::new(config.gamma, config.peak_brightness);
    let mut frame_encoder = FrameEncoder::new(
        coordinates,
        correction,
        EncoderConfig {
            intensity: config.intensity,
            clamp_threshold: config.clamp_threshold,
            flicker_threshold: config.flicker_threshold,
            flicker_ratio: config.flicker_ratio,
            flicker_modulus: config.flicker_modulus,
        },
        config.raster_width,
        config.raster_height,
        row_stride,
    )?;

    let mut led_transport = build_transport(&config)?;
    let mut source = build_source(&config)?;

    let preset_controller = Arc::new(PresetController::new(&config.advance_command));
    let mut monitor = VisualInterestMonitor::new(
        MonitorConfig {
            calculation_period_ms: config.calculation_period_ms,
            alpha: config.alpha,
            min_invocations: config.min_invocations,
            interest_threshold: config.interest_threshold,
            cooldown_periods: config.cooldown_periods,
        },
        move || preset_controller.advance(),
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    eprintln!(
        "Driving {} LEDs from a {}x{} raster over {}",
        frame_encoder.led_count(),
        config.raster_width,
        config.raster_height,
        config.transport
    );

    let frame_period = Duration::from_secs_f64(1.0 / config.fps);
    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        let raster = source.capture()?;
        monitor.receive(&raster);
        let frame = frame_encoder.encode(&raster);
        led_transport.transfer(&frame)?;

        let elapsed = cycle_start.elapsed();
        if elapsed < frame_period {
            thread::sleep(frame_period - elapsed);
        }
    }

    eprintln!("Shutting down");
    Ok(())
}
