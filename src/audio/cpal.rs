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

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::thread_priority::RenderPriority;
use crate::config::EngineConfig;
use crate::performance::Renderer;

const OUTPUT_CHANNELS: u16 = 2;

/// A small wrapper around a cpal::Device that remembers how the stream should be
/// opened.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Output sample rate.
    sample_rate: u32,
    /// Fixed stream buffer size in frames. The driver picks one when unset.
    buffer_size: Option<usize>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that can play stereo audio.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels >= OUTPUT_CHANNELS {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        sample_rate: 0,
                        buffer_size: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device.
    pub fn get(config: &EngineConfig) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        match Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(mut device) => {
                device.sample_rate = config.sample_rate();
                device.buffer_size = config.buffer_size();
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    fn stream_config(&self) -> Result<cpal::StreamConfig, Box<dyn Error>> {
        let buffer_size = match self.buffer_size {
            Some(frames) => cpal::BufferSize::Fixed(u32::try_from(frames)?),
            None => cpal::BufferSize::Default,
        };
        Ok(cpal::StreamConfig {
            channels: OUTPUT_CHANNELS,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size,
        })
    }
}

impl super::Device for Device {
    fn start(&self, mut renderer: Renderer) -> Result<super::Stream, Box<dyn Error>> {
        let span = span!(Level::INFO, "start stream (cpal)");
        let _enter = span.enter();

        let config = self.stream_config()?;
        let mut priority = RenderPriority::from_env();
        info!(
            device = self.name,
            sample_rate = self.sample_rate,
            buffer_size = ?self.buffer_size,
            realtime = priority.is_realtime(),
            "Starting output stream."
        );

        let stream = self.device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                priority.apply();
                renderer.generate_samples(data);
            },
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?;
        stream.play()?;
        info!("CPAL output stream started successfully");

        Ok(super::Stream::Cpal(stream))
    }
}
