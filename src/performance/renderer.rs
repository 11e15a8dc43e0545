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

//! The audio thread half of the engine.
//!
//! The renderer owns everything the audio callback touches. It never blocks and
//! never allocates: requests from the control side arrive through atomics and a
//! bounded channel, and every buffer is sized up front.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::clock::BeatClock;
use super::pool::VoicePool;
use super::song::Song;
use super::state::SharedState;
use super::track::NoteEvent;
use super::voice::Channel;

const CHANNELS: usize = Channel::ALL.len();

/// Renders the live song into interleaved stereo buffers.
pub struct Renderer {
    shared: Arc<SharedState>,
    song: Box<Song>,
    pool: VoicePool,
    clock: BeatClock,
    /// Interleaved stereo scratch buffer. Never resized after construction.
    mix: Vec<f32>,
    /// Play state as last observed, used to detect play and pause edges.
    playing: bool,
    songs: Receiver<Box<Song>>,
    /// Replaced songs go back to the control side to be freed there.
    retired: Sender<Box<Song>>,
}

impl Renderer {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        song: Box<Song>,
        pool: VoicePool,
        mix_frames: usize,
        songs: Receiver<Box<Song>>,
        retired: Sender<Box<Song>>,
    ) -> Renderer {
        let clock = BeatClock::new(shared.sample_rate, song.bpm());
        Renderer {
            shared,
            song,
            pool,
            clock,
            mix: vec![0.0; mix_frames.max(1) * CHANNELS],
            playing: false,
            songs,
            retired,
        }
    }

    /// Fills the interleaved stereo buffer with the next block of audio.
    pub fn generate_samples(&mut self, output: &mut [f32]) {
        self.drain_requests();

        let chunk = self.mix.len();
        for block in output.chunks_mut(chunk) {
            self.render_block(block);
        }
    }

    /// Returns the sample rate the renderer runs at.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Returns the number of frames that can be mixed in one pass.
    pub fn mix_frames(&self) -> usize {
        self.mix.len() / CHANNELS
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn frames_per_beat(&self) -> f64 {
        self.clock.frames_per_beat()
    }

    fn drain_requests(&mut self) {
        // Checked before the channel: the flag is raised after its song is sent, so
        // the song is always picked up in the same pass.
        let song_changed = self.shared.play_on_load.swap(false, Ordering::AcqRel);

        while let Ok(mut song) = self.songs.try_recv() {
            song.adopt_voices(&mut self.song, &mut self.pool);
            self.clock.set_bpm(song.bpm());
            let old = std::mem::replace(&mut self.song, song);
            // The retire queue is as deep as the song queue, so this only fails if
            // the control side is gone.
            let _ = self.retired.try_send(old);
        }

        if song_changed {
            self.pool.kill_all();
            self.song.remove_unused_voices(&self.pool);
            self.shared.playhead.store(0, Ordering::Release);
            self.shared.playing.store(true, Ordering::Release);
            self.playing = true;
            self.clock.reset();
            self.song
                .trigger_events(0, &mut self.pool, self.clock.frames_per_beat());
        }

        let playing = self.shared.playing.load(Ordering::Acquire);
        if playing != self.playing {
            self.playing = playing;
            if playing {
                let start = self
                    .song
                    .wrap_position(self.shared.playhead_start.load(Ordering::Acquire));
                self.shared.playhead.store(start, Ordering::Release);
                self.clock.reset();
                self.song
                    .trigger_events(start, &mut self.pool, self.clock.frames_per_beat());
            } else {
                self.pool.kill_all();
                self.song.remove_unused_voices(&self.pool);
            }
        }

        if let Some(request) = self.shared.take_note_request() {
            let frames_per_beat = self.clock.frames_per_beat();
            if let Some(track) = self.song.track_mut(request.track as usize) {
                track.start_note(
                    NoteEvent::new(request.pitch, request.length),
                    &mut self.pool,
                    frames_per_beat,
                );
            }
        }
    }

    fn render_block(&mut self, output: &mut [f32]) {
        let frames = output.len() / CHANNELS;
        let mix = &mut self.mix[..frames * CHANNELS];
        mix.fill(0.0);

        let mut rendered = 0;
        loop {
            if self.playing {
                while self.clock.beat_due() {
                    self.clock.take_beat();
                    let position = self
                        .song
                        .wrap_position(self.shared.playhead.load(Ordering::Acquire).wrapping_add(1));
                    self.shared.playhead.store(position, Ordering::Release);
                    self.song
                        .trigger_events(position, &mut self.pool, self.clock.frames_per_beat());
                }
            }

            if rendered == frames {
                break;
            }

            let remaining = frames - rendered;
            let count = if self.playing && !self.clock.is_inert() {
                self.clock.frames_until_beat().min(remaining)
            } else {
                remaining
            };

            self.pool
                .render(&mut mix[rendered * CHANNELS..(rendered + count) * CHANNELS]);
            if self.playing {
                self.clock.advance(count);
            }
            self.song.remove_unused_voices(&self.pool);
            rendered += count;
        }

        let volume = self.shared.master_volume();
        for (out, sample) in output.iter_mut().zip(mix.iter()) {
            *out = (sample * volume).clamp(-1.0, 1.0);
        }
        // A trailing half frame gets silence.
        output[frames * CHANNELS..].fill(0.0);
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("song", &self.song)
            .field("pool", &self.pool)
            .field("playing", &self.playing)
            .field("mix_frames", &self.mix_frames())
            .finish()
    }
}
