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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{info, span, Level};

use super::thread_priority::RenderPriority;
use crate::config::EngineConfig;
use crate::performance::Renderer;

/// A mock device. Renders in real time and throws the audio away.
#[derive(Clone)]
pub struct Device {
    name: String,
    buffer_frames: usize,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(config: &EngineConfig) -> Device {
        Device {
            name: config.device().to_string(),
            buffer_frames: config.mix_frames(),
        }
    }
}

impl super::Device for Device {
    fn start(&self, mut renderer: Renderer) -> Result<super::Stream, Box<dyn Error>> {
        let span = span!(Level::INFO, "start stream (mock)");
        let _enter = span.enter();

        let sample_rate = renderer.sample_rate();
        let buffer_frames = self.buffer_frames.max(1);
        let period = Duration::from_secs_f64(buffer_frames as f64 / sample_rate as f64);
        info!(
            device = self.name,
            sample_rate,
            buffer_frames,
            "Starting mock stream."
        );

        let stop = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let mut priority = RenderPriority::from_env_without_realtime();
        let join_handle = {
            let stop = Arc::clone(&stop);
            let frames = Arc::clone(&frames);
            thread::Builder::new()
                .name(format!("{}-render", self.name))
                .spawn(move || {
                    priority.apply();

                    let mut buffer = vec![0.0; buffer_frames * 2];
                    let mut deadline = Instant::now();
                    while !stop.load(Ordering::Relaxed) {
                        renderer.generate_samples(&mut buffer);
                        frames.fetch_add(buffer_frames as u64, Ordering::Relaxed);

                        deadline += period;
                        let now = Instant::now();
                        if deadline > now {
                            spin_sleep::sleep(deadline - now);
                        } else {
                            // Fell behind, don't try to catch up.
                            deadline = now;
                        }
                    }
                })?
        };

        Ok(super::Stream::Mock(Stream {
            stop,
            frames,
            join_handle: Some(join_handle),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// The render thread of a mock device. Stops and joins the thread when dropped.
pub struct Stream {
    stop: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl Stream {
    /// Returns the number of frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStream")
            .field("frames_rendered", &self.frames_rendered())
            .finish()
    }
}
