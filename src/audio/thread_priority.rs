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
//! Scheduling for the thread that runs the renderer.
//!
//! Two environment variables tune it:
//! - `TRITONE_THREAD_PRIORITY`, 0 to 99, defaults to 70.
//! - `TRITONE_DISABLE_RT_AUDIO`, turns off the SCHED_FIFO request on unix.

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, info, warn};

const PRIORITY_VAR: &str = "TRITONE_THREAD_PRIORITY";
const DISABLE_RT_VAR: &str = "TRITONE_DISABLE_RT_AUDIO";

const DEFAULT_PRIORITY: u8 = 70;

/// How the render thread should be scheduled. Built before the stream starts and
/// moved into the thread that renders, where [`RenderPriority::apply`] is called on
/// every pass and only acts the first time.
#[derive(Clone, Copy, Debug)]
pub struct RenderPriority {
    priority: ThreadPriority,
    realtime: bool,
    applied: bool,
}

impl RenderPriority {
    /// Reads the priority from the environment. Realtime scheduling is requested
    /// unless it has been disabled there.
    pub fn from_env() -> RenderPriority {
        let value = std::env::var(PRIORITY_VAR).ok();
        let disabled = std::env::var(DISABLE_RT_VAR).ok();
        RenderPriority::new(
            value.as_deref().and_then(parse_priority),
            !disabled.as_deref().is_some_and(parse_flag),
        )
    }

    /// Like [`RenderPriority::from_env`], but never asks for realtime scheduling.
    /// Used by threads that only simulate a device.
    pub fn from_env_without_realtime() -> RenderPriority {
        RenderPriority {
            realtime: false,
            ..RenderPriority::from_env()
        }
    }

    fn new(priority: Option<ThreadPriorityValue>, realtime: bool) -> RenderPriority {
        let priority = priority
            .or_else(|| ThreadPriorityValue::try_from(DEFAULT_PRIORITY).ok())
            .map(ThreadPriority::Crossplatform)
            .unwrap_or(ThreadPriority::Max);
        RenderPriority {
            priority,
            realtime,
            applied: false,
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Applies the scheduling to the calling thread. Does nothing after the first call.
    pub fn apply(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;

        if let Err(e) = set_current_thread_priority(self.priority) {
            debug!(err = ?e, "Unable to raise render thread priority");
        }
        if self.realtime {
            self.apply_realtime();
        }
    }

    #[cfg(unix)]
    fn apply_realtime(&self) {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo);
        match set_thread_priority_and_policy(thread_native_id(), self.priority, policy) {
            Ok(()) => info!("Render thread running with SCHED_FIFO"),
            Err(e) => warn!(err = %e, "Render thread could not get SCHED_FIFO"),
        }
    }

    #[cfg(not(unix))]
    fn apply_realtime(&self) {}
}

/// Parses a priority between 0 and 99.
fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok().filter(|n| *n < 100)?;
    ThreadPriorityValue::try_from(n).ok()
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || ["true", "yes", "on"].iter().any(|v| value.eq_ignore_ascii_case(v))
}
