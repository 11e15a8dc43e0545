// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::performance::{
    Interpolation, VoiceSettings, DEFAULT_ATTACK_FRAMES, DEFAULT_MAX_VOICES,
    DEFAULT_RAMP_FRAMES, DEFAULT_RELEASE_FRAMES,
};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_MASTER_VOLUME: f32 = 0.25;

/// Frames the renderer mixes at a time when no buffer size is configured.
const DEFAULT_MIX_FRAMES: usize = 2048;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// The audio device. Names starting with "mock" select the mock device.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Stream buffer size in frames. When unset the driver picks one.
    buffer_size: Option<usize>,

    /// Number of voices that can sound at once (default: 128).
    max_voices: Option<usize>,

    /// How voices read between samples: "lagrange" (default) or "none".
    interpolation: Option<Interpolation>,

    /// Fade in length of every note in frames (default: 100).
    attack_frames: Option<u32>,

    /// Fade out length after a note ends in frames (default: 150).
    release_frames: Option<u32>,

    /// Smoothing length for velocity and pan changes in frames (default: 150).
    ramp_frames: Option<u32>,

    /// Initial master volume, 0.0 to 1.0 (default: 0.25).
    master_volume: Option<f32>,

    /// Semitones added to every note (default: 0).
    transpose: Option<i32>,

    /// Directory relative song paths are resolved against.
    song_directory: Option<PathBuf>,

    /// Directory relative sample paths are resolved against.
    sample_directory: Option<PathBuf>,
}

impl EngineConfig {
    /// New will create a new engine configuration for the given device.
    pub fn new(device: &str) -> EngineConfig {
        EngineConfig {
            device: Some(device.to_string()),
            ..EngineConfig::default()
        }
    }

    /// Parse an engine configuration from a YAML file. Relative directories are
    /// resolved against the directory the file lives in.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;

        if config.max_voices == Some(0) {
            return Err(ConfigError::Invalid(
                "max_voices must be at least 1".to_string(),
            ));
        }

        if let Some(base) = path.parent() {
            for dir in [&mut config.song_directory, &mut config.sample_directory]
                .into_iter()
                .flatten()
            {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    /// Overrides the device.
    pub fn with_device(mut self, device: &str) -> EngineConfig {
        self.device = Some(device.to_string());
        self
    }

    /// Overrides the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> EngineConfig {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Overrides the buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> EngineConfig {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Overrides the voice count.
    pub fn with_max_voices(mut self, max_voices: usize) -> EngineConfig {
        self.max_voices = Some(max_voices);
        self
    }

    /// Overrides the envelope and interpolation settings.
    pub fn with_voice_settings(mut self, settings: VoiceSettings) -> EngineConfig {
        self.interpolation = Some(settings.interpolation);
        self.attack_frames = Some(settings.attack_frames);
        self.release_frames = Some(settings.release_frames);
        self.ramp_frames = Some(settings.ramp_frames);
        self
    }

    /// Overrides the transpose.
    pub fn with_transpose(mut self, transpose: i32) -> EngineConfig {
        self.transpose = Some(transpose);
        self
    }

    /// Overrides the song and sample directories.
    pub fn with_directories(
        mut self,
        songs: Option<PathBuf>,
        samples: Option<PathBuf>,
    ) -> EngineConfig {
        self.song_directory = songs;
        self.sample_directory = samples;
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        match self.sample_rate {
            Some(0) | None => DEFAULT_SAMPLE_RATE,
            Some(rate) => rate,
        }
    }

    /// Returns the fixed stream buffer size, if any.
    pub fn buffer_size(&self) -> Option<usize> {
        self.buffer_size.filter(|size| *size > 0)
    }

    /// Returns the number of frames the renderer mixes at a time.
    pub fn mix_frames(&self) -> usize {
        self.buffer_size().unwrap_or(DEFAULT_MIX_FRAMES)
    }

    /// Returns the number of voices (default: 128).
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    /// Returns the settings every voice starts with.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            interpolation: self.interpolation.unwrap_or_default(),
            attack_frames: self.attack_frames.unwrap_or(DEFAULT_ATTACK_FRAMES),
            release_frames: self.release_frames.unwrap_or(DEFAULT_RELEASE_FRAMES),
            ramp_frames: self.ramp_frames.unwrap_or(DEFAULT_RAMP_FRAMES),
        }
    }

    /// Returns the initial master volume, clamped to [0, 1] (default: 0.25).
    pub fn master_volume(&self) -> f32 {
        self.master_volume
            .unwrap_or(DEFAULT_MASTER_VOLUME)
            .clamp(0.0, 1.0)
    }

    /// Returns the transpose in semitones (default: 0).
    pub fn transpose(&self) -> i32 {
        self.transpose.unwrap_or(0)
    }

    pub fn song_directory(&self) -> Option<&Path> {
        self.song_directory.as_deref()
    }

    pub fn sample_directory(&self) -> Option<&Path> {
        self.sample_directory.as_deref()
    }
}
