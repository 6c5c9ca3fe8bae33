// Config Module - Configuration management and command-line argument parsing
use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LED suit driver: renders a captured visualizer image onto the suit's LED array",
    long_about = "Samples a captured raster image at each LED's physical position, corrects the\n\
                  colors for the suit's hardware, and streams frames over SPI. A background\n\
                  monitor scores how visually interesting the image is and advances the\n\
                  visualizer preset when it goes stale."
)]
pub struct Args {
    /// Config file path
    #[arg(long)]
    pub cfg: Option<String>,

    /// LED mapping file (JSON); omit to fall back to serpentine grid sampling
    #[arg(short, long)]
    pub mapping_file: Option<String>,

    /// Scale factor for LED intensity (0-1)
    #[arg(short, long)]
    pub intensity: Option<f32>,

    /// Frame source: "pattern" or a path to an image file/directory
    #[arg(short, long)]
    pub source: Option<String>,

    /// Transport: "spi" or "udp"
    #[arg(short, long)]
    pub transport: Option<String>,

    /// Target capture framerate
    #[arg(short, long)]
    pub fps: Option<f64>,

    /// Save the effective configuration back to the config file and exit
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    // Capture region in source-image pixels and the raster it is scaled to
    pub capture_x: u32,
    pub capture_y: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub raster_width: usize,
    pub raster_height: usize,

    // Logical LED grid for serpentine fallback sampling
    pub grid_width: usize,
    pub grid_height: usize,

    // Optional explicit LED mapping; overrides the serpentine grid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<String>,

    // Encoder
    pub intensity: f32,
    pub clamp_threshold: u8,
    pub flicker_threshold: u8,
    pub flicker_ratio: f32,
    pub flicker_modulus: usize,

    // Color correction, one entry per channel
    pub gamma: [f32; 3],
    pub peak_brightness: [f32; 3],

    // Visual-interest monitor
    pub calculation_period_ms: u64,
    pub alpha: f32,
    pub min_invocations: u32,
    pub interest_threshold: f32,
    pub cooldown_periods: u32,

    // Collaborators
    pub spi_device: String,
    pub udp_destination: String,
    pub transport: String,
    pub source: String,
    pub advance_command: String,
    pub fps: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            capture_x: 0,
            capture_y: 0,
            capture_width: 100,
            capture_height: 100,
            raster_width: 100,
            raster_height: 100,
            grid_width: 12,
            grid_height: 13,
            mapping_file: None,
            intensity: 1.0,
            clamp_threshold: 0,
            flicker_threshold: 250,
            flicker_ratio: 0.6,
            flicker_modulus: 4,
            gamma: [2.8, 2.8, 2.8],
            peak_brightness: [405.0, 690.0, 190.0],
            calculation_period_ms: 1000,
            alpha: 0.7,
            min_invocations: 5,
            interest_threshold: 10.0,
            cooldown_periods: 10,
            spi_device: "/dev/spidev0.0".to_string(),
            udp_destination: "127.0.0.1:4048".to_string(),
            transport: "spi".to_string(),
            source: "pattern".to_string(),
            advance_command: "xdotool search --name projectM key --window %1 n".to_string(),
            fps: 30.0,
        }
    }
}

impl DriverConfig {
    pub fn config_path(cfg_arg: Option<&str>) -> PathBuf {
        PathBuf::from(cfg_arg.unwrap_or("ledsuit.toml"))
    }

    // Missing file is not an error; defaults apply until --save is used
    pub fn load(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg);
        if !path.exists() {
            return Ok(DriverConfig::default());
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: DriverConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow!("Failed to write config {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(mapping_file) = &args.mapping_file {
            self.mapping_file = Some(mapping_file.clone());
        }
        if let Some(intensity) = args.intensity {
            self.intensity = intensity;
        }
        if let Some(source) = &args.source {
            self.source = source.clone();
        }
        if let Some(transport) = &args.transport {
            self.transport = transport.clone();
        }
        if let Some(fps) = args.fps {
            self.fps = fps;
        }
    }

    // All configuration errors are fatal at startup; nothing here is
    // recoverable frame by frame
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(anyhow!("intensity must be between 0 and 1, got {}", self.intensity));
        }
        if self.raster_width == 0 || self.raster_height == 0 {
            return Err(anyhow!(
                "raster dimensions must be nonzero, got {}x{}",
                self.raster_width,
                self.raster_height
            ));
        }
        if self.mapping_file.is_none() {
            if self.grid_width < 2 || self.grid_height < 2 {
                return Err(anyhow!(
                    "LED grid must be at least 2x2, got {}x{}",
                    self.grid_width,
                    self.grid_height
                ));
            }
            if self.grid_width > self.raster_width || self.grid_height > self.raster_height {
                return Err(anyhow!(
                    "LED grid {}x{} does not fit raster {}x{}",
                    self.grid_width,
                    self.grid_height,
                    self.raster_width,
                    self.raster_height
                ));
            }
        }
        if !self.flicker_modulus.is_power_of_two() {
            return Err(anyhow!(
                "flicker_modulus must be a power of two, got {}",
                self.flicker_modulus
            ));
        }
        if !(0.0..=1.0).contains(&self.flicker_ratio) {
            return Err(anyhow!(
                "flicker_ratio must be between 0 and 1, got {}",
                self.flicker_ratio
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(anyhow!("alpha must be in (0, 1], got {}", self.alpha));
        }
        if self.calculation_period_ms == 0 {
            return Err(anyhow!("calculation_period_ms must be nonzero"));
        }
        for (channel, gamma) in self.gamma.iter().enumerate() {
            if *gamma <= 0.0 {
                return Err(anyhow!("gamma[{}] must be positive, got {}", channel, gamma));
            }
        }
        for (channel, peak) in self.peak_brightness.iter().enumerate() {
            if *peak <= 0.0 {
                return Err(anyhow!(
                    "peak_brightness[{}] must be positive, got {}",
                    channel,
                    peak
                ));
            }
        }
        match self.transport.as_str() {
            "spi" | "udp" => {}
            other => return Err(anyhow!("unknown transport '{}', expected spi or udp", other)),
        }
        if self.fps <= 0.0 {
            return Err(anyhow!("fps must be positive, got {}", self.fps));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(DriverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_intensity() {
        let mut config = DriverConfig::default();
        config.intensity = 1.5;
        assert!(config.validate().is_err());
        config.intensity = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_grid_larger_than_raster() {
        let mut config = DriverConfig::default();
        config.grid_width = 200;
        assert!(config.validate().is_err());
        // With an explicit mapping the grid is unused and not checked
        config.mapping_file = Some("mapping.json".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let mut config = DriverConfig::default();
        config.alpha = 0.0;
        assert!(config.validate().is_err());
        config.alpha = 1.1;
        assert!(config.validate().is_err());
        config.alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_modulus() {
        let mut config = DriverConfig::default();
        config.flicker_modulus = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_transport() {
        let mut config = DriverConfig::default();
        config.transport = "i2c".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = DriverConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: DriverConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.grid_width, config.grid_width);
        assert_eq!(parsed.peak_brightness, config.peak_brightness);
        assert_eq!(parsed.advance_command, config.advance_command);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: DriverConfig = toml::from_str("intensity = 0.5\n").unwrap();
        assert_eq!(parsed.intensity, 0.5);
        assert_eq!(parsed.grid_width, DriverConfig::default().grid_width);
    }
}
