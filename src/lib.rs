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
//! A real-time, step-sequenced sample playback engine.
//!
//! - [`songfile`] reads and writes the binary song format.
//! - [`performance`] turns songs into audio: voices, tracks, the beat clock and the
//!   control/render engine pair.
//! - [`audio`] connects a renderer to an output device.
//! - [`config`] holds the YAML engine configuration.

pub mod audio;
pub mod config;
pub mod performance;
pub mod songfile;
#[cfg(test)]
mod testutil;
