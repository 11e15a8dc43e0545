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
use std::{error::Error, fmt};

use crate::config::EngineConfig;
use crate::performance::Renderer;

pub mod cpal;
pub mod mock;
mod thread_priority;

pub trait Device: fmt::Display + Send + Sync {
    /// Starts pulling audio from the renderer. Audio keeps playing until the returned
    /// stream is dropped.
    fn start(&self, renderer: Renderer) -> Result<Stream, Box<dyn Error>>;
}

/// A running output stream. Dropping it stops the audio.
pub enum Stream {
    Cpal(::cpal::Stream),
    Mock(mock::Stream),
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Cpal(_) => write!(f, "Stream(cpal)"),
            Stream::Mock(stream) => write!(f, "Stream({:?})", stream),
        }
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named in the configuration.
pub fn get_device(config: &EngineConfig) -> Result<Box<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Device::get(config)));
    };

    Ok(Box::new(cpal::Device::get(config)?))
}
