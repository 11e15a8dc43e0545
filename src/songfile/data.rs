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
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Number of instrument tracks in a song.
pub const TRACK_COUNT: usize = 16;

/// Tempo of a freshly created song.
pub const DEFAULT_BPM: u16 = 140;

/// A note as the editor stores it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EditorNote {
    pub pitch: u8,
    /// Length in sub-beats.
    pub length: u16,
}

/// The editable contents of one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackData {
    /// Notes by column. A column holds at most one note per pitch.
    pub notes: BTreeMap<u32, Vec<EditorNote>>,
    pub velocity_events: BTreeMap<u32, f32>,
    pub pan_events: BTreeMap<u32, f32>,
    /// Sample to play. None plays the fallback tone.
    pub sample_path: Option<PathBuf>,
    pub one_shot: bool,
    pub muted: bool,
}

impl TrackData {
    /// Places a note, replacing any note of the same pitch in that column.
    pub fn add_note(&mut self, position: u32, note: EditorNote) {
        let column = self.notes.entry(position).or_default();
        match column.iter_mut().find(|n| n.pitch == note.pitch) {
            Some(existing) => existing.length = note.length,
            None => column.push(note),
        }
    }

    /// Removes the note of the given pitch from a column. Returns true if there was one.
    pub fn remove_note(&mut self, position: u32, pitch: u8) -> bool {
        let Some(column) = self.notes.get_mut(&position) else {
            return false;
        };
        let before = column.len();
        column.retain(|n| n.pitch != pitch);
        let removed = column.len() != before;
        if column.is_empty() {
            self.notes.remove(&position);
        }
        removed
    }

    /// Returns the total number of notes across all columns.
    pub fn note_count(&self) -> usize {
        self.notes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.velocity_events.is_empty() && self.pan_events.is_empty()
    }
}

/// A whole song as the editor and the file format see it.
#[derive(Clone, Debug, PartialEq)]
pub struct SongData {
    pub bpm: u16,
    /// Position the playhead wraps at. 0 plays forever.
    pub end_position: u32,
    /// Position playback starts from after a pause.
    pub playhead_start: u32,
    /// Where the song was loaded from or will be saved to.
    pub save_path: Option<PathBuf>,
    pub tracks: Vec<TrackData>,
}

impl Default for SongData {
    fn default() -> Self {
        SongData {
            bpm: DEFAULT_BPM,
            end_position: 0,
            playhead_start: 0,
            save_path: None,
            tracks: vec![TrackData::default(); TRACK_COUNT],
        }
    }
}

impl SongData {
    /// Returns the total number of notes in the song.
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(TrackData::note_count).sum()
    }
}
