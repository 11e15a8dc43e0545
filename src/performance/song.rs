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
use std::fmt;
use std::sync::Arc;

use super::buffer::SampleBuffer;
use super::pool::VoicePool;
use super::track::{Event, InstrumentTrack, NoteEvent};
use crate::songfile::{SongData, TrackData, DEFAULT_BPM};

pub use crate::songfile::TRACK_COUNT;

/// A playable song: a fixed set of instrument tracks and the tempo they run at.
pub struct Song {
    tracks: [InstrumentTrack; TRACK_COUNT],
    bpm: u16,
    /// Position the playhead wraps at. 0 plays forever.
    end_position: u32,
}

impl Song {
    /// Creates a song with no events. Every track plays the given sample.
    pub fn empty(sample: Arc<SampleBuffer>, voice_capacity: usize) -> Song {
        Song {
            tracks: std::array::from_fn(|_| {
                InstrumentTrack::new(Arc::clone(&sample), voice_capacity)
            }),
            bpm: DEFAULT_BPM,
            end_position: 0,
        }
    }

    /// Copies editor data into a new song. `sample_for` supplies the sample each
    /// track plays. Tracks past [`TRACK_COUNT`] are ignored.
    pub fn from_data<F>(
        data: &SongData,
        voice_capacity: usize,
        transpose: i32,
        mut sample_for: F,
    ) -> Song
    where
        F: FnMut(&TrackData) -> Arc<SampleBuffer>,
    {
        let empty = TrackData::default();
        let tracks = std::array::from_fn(|i| {
            let source = data.tracks.get(i).unwrap_or(&empty);
            let mut track = InstrumentTrack::new(sample_for(source), voice_capacity);
            track.set_one_shot(source.one_shot);
            track.set_muted_flag(source.muted);
            track.set_transpose(transpose);

            for (position, column) in &source.notes {
                for note in column {
                    track.add_note(*position, NoteEvent::new(note.pitch, note.length));
                }
            }
            for (position, value) in &source.velocity_events {
                track.set_velocity_event(*position, Event::velocity(*value));
            }
            for (position, value) in &source.pan_events {
                track.set_pan_event(*position, Event::pan(*value));
            }
            track
        });

        Song {
            tracks,
            bpm: data.bpm,
            end_position: data.end_position,
        }
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn end_position(&self) -> u32 {
        self.end_position
    }

    pub fn tracks(&self) -> &[InstrumentTrack; TRACK_COUNT] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&InstrumentTrack> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut InstrumentTrack> {
        self.tracks.get_mut(index)
    }

    /// Maps a requested playhead position into the song, wrapping to the start once
    /// it passes the end marker.
    pub fn wrap_position(&self, position: u32) -> u32 {
        wrap_position(position, self.end_position)
    }

    /// Fires the events at the position on every track, in track order.
    pub fn trigger_events(&mut self, position: u32, pool: &mut VoicePool, frames_per_beat: f64) {
        for track in &mut self.tracks {
            track.trigger_events(position, pool, frames_per_beat);
        }
    }

    /// Forgets finished voices on every track.
    pub fn remove_unused_voices(&mut self, pool: &VoicePool) {
        for track in &mut self.tracks {
            track.remove_unused_voices(pool);
        }
    }

    /// Takes over the voices still sounding in the song this one replaces.
    pub fn adopt_voices(&mut self, previous: &mut Song, pool: &mut VoicePool) {
        for (track, old) in self.tracks.iter_mut().zip(previous.tracks.iter_mut()) {
            track.adopt_voices(old, pool);
        }
    }
}

/// Wraps a position to 0 once it passes `end_position`. An end of 0 never wraps.
pub fn wrap_position(position: u32, end_position: u32) -> u32 {
    if end_position > 0 && position > end_position - 1 {
        0
    } else {
        position
    }
}

impl fmt::Debug for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let notes: usize = self
            .tracks
            .iter()
            .map(|track| track.notes().values().map(Vec::len).sum::<usize>())
            .sum();
        f.debug_struct("Song")
            .field("bpm", &self.bpm)
            .field("end_position", &self.end_position)
            .field("notes", &notes)
            .finish()
    }
}
