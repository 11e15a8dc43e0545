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

//! Sub-beat timing.
//!
//! The playhead moves in sub-beats, four to a beat. Sub-beats rarely land on a
//! whole number of frames, so the clock keeps a fractional position and tells the
//! renderer how many whole frames it may render before the next boundary.

/// Sub-beats per beat.
pub const SUB_BEATS_PER_BEAT: f64 = 4.0;

/// Distances smaller than this are treated as zero to keep rounding from
/// producing a boundary one frame early or late.
const BEAT_EPSILON: f64 = 1e-6;

/// Tracks progress towards the next sub-beat boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatClock {
    sample_rate: u32,
    frames_per_beat: f64,
    beat_progress: f64,
}

impl BeatClock {
    /// Creates a clock for the given output rate and tempo.
    pub fn new(sample_rate: u32, bpm: u16) -> BeatClock {
        BeatClock {
            sample_rate,
            frames_per_beat: frames_per_beat(sample_rate, bpm),
            beat_progress: 0.0,
        }
    }

    /// Returns the number of frames in a sub-beat.
    pub fn frames_per_beat(&self) -> f64 {
        self.frames_per_beat
    }

    /// Changes tempo. Progress towards the current boundary is kept.
    pub fn set_bpm(&mut self, bpm: u16) {
        self.frames_per_beat = frames_per_beat(self.sample_rate, bpm);
        self.beat_progress = self.beat_progress.min(self.frames_per_beat);
    }

    /// Returns true when the clock cannot advance, as with a tempo of zero.
    pub fn is_inert(&self) -> bool {
        self.frames_per_beat < BEAT_EPSILON
    }

    /// Starts counting from a boundary.
    pub fn reset(&mut self) {
        self.beat_progress = 0.0;
    }

    /// Returns true if a sub-beat boundary has been reached.
    pub fn beat_due(&self) -> bool {
        !self.is_inert() && self.beat_progress >= self.frames_per_beat
    }

    /// Consumes a boundary, carrying the fractional overshoot into the next sub-beat.
    pub fn take_beat(&mut self) {
        self.beat_progress -= self.frames_per_beat;
        if self.beat_progress < BEAT_EPSILON {
            self.beat_progress = 0.0;
        }
    }

    /// Returns the whole number of frames that can be rendered before the next
    /// boundary. Always at least one.
    pub fn frames_until_beat(&self) -> usize {
        let remaining = (self.frames_per_beat - self.beat_progress - BEAT_EPSILON).ceil();
        if remaining < 1.0 {
            1
        } else {
            remaining as usize
        }
    }

    /// Records that frames were rendered.
    pub fn advance(&mut self, frames: usize) {
        self.beat_progress += frames as f64;
        if self.frames_per_beat - self.beat_progress < BEAT_EPSILON
            && self.beat_progress < self.frames_per_beat
        {
            self.beat_progress = self.frames_per_beat;
        }
    }
}

/// Frames in one sub-beat at the given rate and tempo.
pub fn frames_per_beat(sample_rate: u32, bpm: u16) -> f64 {
    if bpm == 0 {
        return 0.0;
    }
    sample_rate as f64 * 60.0 / bpm as f64 / SUB_BEATS_PER_BEAT
}
