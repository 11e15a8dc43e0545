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
//! The real-time performance engine.
//!
//! The engine comes in two halves built together by [`engine`]:
//! - [`Playback`], a cloneable handle used by control threads to load songs,
//!   start and stop playback and preview notes.
//! - [`Renderer`], owned by the audio callback, which mixes the live song.
//!
//! The halves share only atomics and two bounded channels. Songs are built in full
//! on the control side and handed over, so the audio thread never waits on a lock.

mod buffer;
mod clock;
mod loader;
mod playback;
mod pool;
mod renderer;
mod song;
mod state;
mod track;
mod voice;

use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;

pub use buffer::SampleBuffer;
pub use clock::{frames_per_beat, BeatClock, SUB_BEATS_PER_BEAT};
pub use loader::{decode_file, SampleCache, SampleLoadError};
pub use playback::{LoadError, Playback};
pub use pool::{VoiceHandle, VoicePool, DEFAULT_MAX_VOICES};
pub use renderer::Renderer;
pub use song::{wrap_position, Song, TRACK_COUNT};
pub use track::{Event, InstrumentTrack, NoteEvent, MAX_PITCH};
pub use voice::{
    Channel, Interpolation, Voice, VoiceSettings, CENTER_PAN, DEFAULT_ATTACK_FRAMES,
    DEFAULT_RAMP_FRAMES, DEFAULT_RELEASE_FRAMES, DEFAULT_VELOCITY,
};

/// How many songs can be waiting for the renderer at once.
pub const SONG_QUEUE: usize = 4;

/// Builds a connected control handle and renderer. The renderer starts out paused
/// with an empty song.
pub fn engine(config: &EngineConfig) -> (Playback, Renderer) {
    let sample_rate = config.sample_rate();
    let max_voices = config.max_voices().max(1);
    let shared = Arc::new(state::SharedState::new(sample_rate, config.master_volume()));

    let (song_tx, song_rx) = crossbeam_channel::bounded(SONG_QUEUE);
    let (retired_tx, retired_rx) = crossbeam_channel::bounded(SONG_QUEUE);

    let cache = SampleCache::new(
        sample_rate,
        config.sample_directory().map(|dir| dir.to_path_buf()),
    );
    let song = Box::new(Song::empty(cache.fallback(), max_voices));
    let pool = VoicePool::new(max_voices, config.voice_settings());

    info!(
        sample_rate,
        max_voices,
        mix_frames = config.mix_frames(),
        "Performance engine created"
    );

    let renderer = renderer::Renderer::new(
        Arc::clone(&shared),
        song,
        pool,
        config.mix_frames(),
        song_rx,
        retired_tx,
    );
    let control = playback::Control::new(
        cache,
        song_tx,
        retired_rx,
        max_voices,
        config.transpose(),
        config.song_directory().map(|dir| dir.to_path_buf()),
    );
    (Playback::new(shared, control), renderer)
}
