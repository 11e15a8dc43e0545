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

//! Scalars shared between the control handle and the renderer.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::songfile::DEFAULT_BPM;

const NOTE_REQUEST_VALID: u64 = 1 << 63;

/// A one-off note to play on a track, outside of the score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NoteRequest {
    pub pitch: u8,
    pub length: u16,
    pub track: u8,
}

impl NoteRequest {
    /// Packs the request into one word so it can never be read half-written.
    pub fn pack(self) -> u64 {
        NOTE_REQUEST_VALID
            | ((self.pitch as u64) << 32)
            | ((self.length as u64) << 16)
            | self.track as u64
    }

    pub fn unpack(word: u64) -> Option<NoteRequest> {
        if word & NOTE_REQUEST_VALID == 0 {
            return None;
        }
        Some(NoteRequest {
            pitch: (word >> 32) as u8,
            length: (word >> 16) as u16,
            track: word as u8,
        })
    }
}

pub(crate) struct SharedState {
    pub sample_rate: u32,
    pub playing: AtomicBool,
    /// f32 bits.
    master_volume: AtomicU32,
    pub playhead: AtomicU32,
    pub playhead_start: AtomicU32,
    /// Set by the control side after publishing a song that should start playing.
    pub play_on_load: AtomicBool,
    note_request: AtomicU64,
    /// Tempo and end marker of the most recently published song.
    pub bpm: AtomicU32,
    pub end_position: AtomicU32,
}

impl SharedState {
    pub fn new(sample_rate: u32, master_volume: f32) -> SharedState {
        SharedState {
            sample_rate,
            playing: AtomicBool::new(false),
            master_volume: AtomicU32::new(master_volume.clamp(0.0, 1.0).to_bits()),
            playhead: AtomicU32::new(0),
            playhead_start: AtomicU32::new(0),
            play_on_load: AtomicBool::new(false),
            note_request: AtomicU64::new(0),
            bpm: AtomicU32::new(DEFAULT_BPM as u32),
            end_position: AtomicU32::new(0),
        }
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    pub fn set_master_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.master_volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Replaces any pending note request. Requests that were never picked up are lost.
    pub fn request_note(&self, request: NoteRequest) {
        self.note_request.store(request.pack(), Ordering::Release);
    }

    /// Takes the pending note request, if any.
    pub fn take_note_request(&self) -> Option<NoteRequest> {
        NoteRequest::unpack(self.note_request.swap(0, Ordering::AcqRel))
    }
}
