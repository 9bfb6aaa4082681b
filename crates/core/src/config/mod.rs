use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{visual::VisualMode, MixerError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub visual: VisualConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.visual.validate()
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    /// Analysis window length. The analyser exposes `fft_size / 2` bins.
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub master_gain: f32,
    pub ambient_gain: f32,
    pub melody_gain: f32,
    pub ramp_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            block_size: 1024,
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            master_gain: 0.8,
            ambient_gain: 0.7,
            melody_gain: 0.5,
            ramp_ms: 100,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MixerError::InvalidInput("sample rate must be positive"));
        }
        if self.channels == 0 {
            return Err(MixerError::InvalidInput("channel count must be positive"));
        }
        if self.block_size == 0 {
            return Err(MixerError::InvalidInput("block size must be positive"));
        }
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(MixerError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(MixerError::InvalidInput("smoothing must lie within [0, 1]"));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(MixerError::InvalidInput(
                "min_decibels must be lower than max_decibels",
            ));
        }
        Ok(())
    }

    /// Number of samples a volume ramp spans at the configured rate.
    pub fn ramp_samples(&self) -> usize {
        (self.sample_rate as u64 * self.ramp_ms as u64 / 1000) as usize
    }
}

/// Configuration for the visualisation driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub mode: VisualMode,
    pub particle_count: usize,
    pub link_distance: f32,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            mode: VisualMode::Particles,
            particle_count: 50,
            link_distance: 100.0,
            width: 800,
            height: 600,
            seed: None,
        }
    }
}

impl VisualConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MixerError::InvalidInput("canvas dimensions must be positive"));
        }
        if self.link_distance <= 0.0 {
            return Err(MixerError::InvalidInput("link distance must be positive"));
        }
        Ok(())
    }
}
