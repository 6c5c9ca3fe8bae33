// Preset module - Tells the external visualizer to advance to its next
// preset by running a configured shell command (the suit sends a key event
// to the projectM window)
use anyhow::{anyhow, Result};
use std::process::Command;

pub struct PresetController {
    command: String,
}

impl PresetController {
    pub fn new(command: &str) -> Self {
        PresetController {
            command: command.to_string(),
        }
    }

    pub fn advance(&self) -> Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .status()
            .map_err(|e| anyhow!("Failed to run advance command: {}", e))?;
        if !status.success() {
            return Err(anyhow!("Advance command exited with {}", status));
        }
        Ok(())
    }
}
