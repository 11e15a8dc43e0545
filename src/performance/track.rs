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

//! Instrument tracks direct voices to play their sample at scored positions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::buffer::SampleBuffer;
use super::pool::{VoiceHandle, VoicePool};
use super::voice::{CENTER_PAN, DEFAULT_VELOCITY};

/// Highest pitch a note can carry.
pub const MAX_PITCH: u8 = 127;

/// A scored note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    /// Semitones relative to the sample's native pitch.
    pub pitch: i8,
    /// Length in sub-beats.
    pub length: u16,
}

impl NoteEvent {
    /// Creates a note, clamping the pitch into the playable range.
    pub fn new(pitch: u8, length: u16) -> NoteEvent {
        NoteEvent {
            pitch: pitch.min(MAX_PITCH) as i8,
            length,
        }
    }
}

/// A scored velocity or pan change. The value is always a finite number in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub value: f32,
}

impl Event {
    /// A velocity change. Values that are not numbers fall back to the default velocity.
    pub fn velocity(value: f32) -> Event {
        Event::sanitized(value, DEFAULT_VELOCITY)
    }

    /// A pan change. Values that are not numbers fall back to the centre.
    pub fn pan(value: f32) -> Event {
        Event::sanitized(value, CENTER_PAN)
    }

    fn sanitized(value: f32, fallback: f32) -> Event {
        let value = if value.is_finite() { value } else { fallback };
        Event {
            value: value.clamp(0.0, 1.0),
        }
    }
}

/// Notes and parameter changes for one instrument, plus the voices it has sounding.
#[derive(Debug)]
pub struct InstrumentTrack {
    notes: HashMap<u32, Vec<NoteEvent>>,
    velocity_events: HashMap<u32, Event>,
    pan_events: HashMap<u32, Event>,
    sample: Arc<SampleBuffer>,
    /// Play the sample once instead of looping it for the length of the note.
    one_shot: bool,
    muted: bool,
    /// Semitones added to every note.
    transpose: i32,
    /// Voices this track started. Advisory only; the pool decides when a voice is done.
    voices: Vec<VoiceHandle>,
}

impl InstrumentTrack {
    /// Creates an empty track playing the given sample. `voice_capacity` should match
    /// the pool so that recording voices never allocates.
    pub fn new(sample: Arc<SampleBuffer>, voice_capacity: usize) -> InstrumentTrack {
        InstrumentTrack {
            notes: HashMap::new(),
            velocity_events: HashMap::new(),
            pan_events: HashMap::new(),
            sample,
            one_shot: false,
            muted: false,
            transpose: 0,
            voices: Vec::with_capacity(voice_capacity),
        }
    }

    /// Adds a note at the given position. Several notes may share a position.
    pub fn add_note(&mut self, position: u32, note: NoteEvent) {
        self.notes.entry(position).or_default().push(note);
    }

    /// Sets the velocity change at the given position.
    pub fn set_velocity_event(&mut self, position: u32, event: Event) {
        self.velocity_events.insert(position, event);
    }

    /// Sets the pan change at the given position.
    pub fn set_pan_event(&mut self, position: u32, event: Event) {
        self.pan_events.insert(position, event);
    }

    /// Deletes every scored event. Sounding voices are left alone.
    pub fn clear_events(&mut self) {
        self.notes.clear();
        self.velocity_events.clear();
        self.pan_events.clear();
    }

    pub fn notes(&self) -> &HashMap<u32, Vec<NoteEvent>> {
        &self.notes
    }

    pub fn velocity_events(&self) -> &HashMap<u32, Event> {
        &self.velocity_events
    }

    pub fn pan_events(&self) -> &HashMap<u32, Event> {
        &self.pan_events
    }

    pub fn sample(&self) -> &Arc<SampleBuffer> {
        &self.sample
    }

    pub fn set_sample(&mut self, sample: Arc<SampleBuffer>) {
        self.sample = sample;
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn set_one_shot(&mut self, one_shot: bool) {
        self.one_shot = one_shot;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_transpose(&mut self, transpose: i32) {
        self.transpose = transpose;
    }

    /// Returns the handles of the voices this track believes are sounding.
    pub fn voices(&self) -> &[VoiceHandle] {
        &self.voices
    }

    /// Starts a note on a free voice. If the pool is exhausted the note is dropped.
    pub fn start_note(
        &mut self,
        event: NoteEvent,
        pool: &mut VoicePool,
        frames_per_beat: f64,
    ) -> Option<VoiceHandle> {
        let Some(handle) = pool.acquire() else {
            trace!(pitch = event.pitch, "No free voice, dropping note");
            return None;
        };

        if let Some(voice) = pool.get_mut(handle) {
            voice.set_pitch(event.pitch as i32 + self.transpose);
            voice.set_frames_left((event.length as f64 * frames_per_beat) as u32);
            voice.set_one_shot(self.one_shot);
            voice.set_muted(self.muted);
            voice.set_sample_buffer(Arc::clone(&self.sample));
        }

        if self.voices.len() == self.voices.capacity() {
            self.remove_stale_voices(pool);
        }
        if self.voices.len() < self.voices.capacity() {
            self.voices.push(handle);
        }
        Some(handle)
    }

    /// Ramps every sounding voice of this track to the new velocity. Notes started
    /// later are not affected.
    pub fn set_velocity(&mut self, event: Event, pool: &mut VoicePool) {
        for handle in &self.voices {
            if let Some(voice) = pool.get_mut(*handle) {
                voice.set_velocity(event.value);
            }
        }
    }

    /// Ramps every sounding voice of this track to the new pan.
    pub fn set_pan(&mut self, event: Event, pool: &mut VoicePool) {
        for handle in &self.voices {
            if let Some(voice) = pool.get_mut(*handle) {
                voice.set_pan(event.value);
            }
        }
    }

    /// Fires every event scored at the position: notes first, then velocity, then pan.
    pub fn trigger_events(&mut self, position: u32, pool: &mut VoicePool, frames_per_beat: f64) {
        let count = self.notes.get(&position).map_or(0, Vec::len);
        for i in 0..count {
            let note = self.notes[&position][i];
            self.start_note(note, pool, frames_per_beat);
        }

        if let Some(event) = self.velocity_events.get(&position).copied() {
            self.set_velocity(event, pool);
        }

        if let Some(event) = self.pan_events.get(&position).copied() {
            self.set_pan(event, pool);
        }
    }

    /// Forgets voices that have run out of frames or were reclaimed by the pool.
    pub fn remove_unused_voices(&mut self, pool: &VoicePool) {
        self.voices
            .retain(|handle| pool.get(*handle).is_some_and(|voice| voice.frames_left() > 0));
    }

    fn remove_stale_voices(&mut self, pool: &VoicePool) {
        self.voices.retain(|handle| pool.is_live(*handle));
    }

    /// Mutes or unmutes the track, including every note it has sounding.
    pub fn set_muted(&mut self, muted: bool, pool: &mut VoicePool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.sync_muted(pool);
    }

    /// Sets the muted flag without touching any voices. Used while building a song.
    pub fn set_muted_flag(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Takes over the sounding voices of the track this one replaces, so live changes
    /// keep reaching notes that were started before the swap.
    pub fn adopt_voices(&mut self, previous: &mut InstrumentTrack, pool: &mut VoicePool) {
        self.voices.clear();
        for handle in previous.voices.drain(..) {
            if self.voices.len() < self.voices.capacity() && pool.is_live(handle) {
                self.voices.push(handle);
            }
        }
        self.sync_muted(pool);
    }

    fn sync_muted(&self, pool: &mut VoicePool) {
        for handle in &self.voices {
            if let Some(voice) = pool.get_mut(*handle) {
                voice.set_muted(self.muted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::voice::{Interpolation, Voice, VoiceSettings};

    const FRAMES_PER_BEAT: f64 = 5512.5;

    fn pool(capacity: usize) -> VoicePool {
        VoicePool::new(
            capacity,
            VoiceSettings {
                interpolation: Interpolation::None,
                attack_frames: 0,
                release_frames: 0,
                ramp_frames: 0,
            },
        )
    }

    fn track(capacity: usize) -> InstrumentTrack {
        InstrumentTrack::new(Arc::new(SampleBuffer::from_slice(&[0.5; 32])), capacity)
    }

    #[test]
    fn test_note_event_clamps_pitch() {
        assert_eq!(NoteEvent::new(200, 1).pitch, 127);
        assert_eq!(NoteEvent::new(60, 1).pitch, 60);
    }

    #[test]
    fn test_events_are_sanitized() {
        assert_eq!(Event::velocity(0.4).value, 0.4);
        assert_eq!(Event::velocity(f32::NAN).value, DEFAULT_VELOCITY);
        assert_eq!(Event::velocity(f32::INFINITY).value, DEFAULT_VELOCITY);
        assert_eq!(Event::velocity(3.0).value, 1.0);
        assert_eq!(Event::pan(f32::NAN).value, CENTER_PAN);
        assert_eq!(Event::pan(f32::NEG_INFINITY).value, CENTER_PAN);
        assert_eq!(Event::pan(-0.5).value, 0.0);
    }

    #[test]
    fn test_start_note_configures_voice() {
        let mut pool = pool(4);
        let mut track = track(4);
        track.set_one_shot(true);
        track.set_transpose(-12);

        let handle = track
            .start_note(NoteEvent::new(24, 4), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");
        let voice = pool.get(handle).expect("live");
        assert_eq!(voice.frames_left(), 22050);
        assert_eq!(voice.pitch(), 12);
        assert_eq!(track.voices(), &[handle]);
    }

    #[test]
    fn test_length_truncates() {
        let mut pool = pool(4);
        let mut track = track(4);
        let handle = track
            .start_note(NoteEvent::new(0, 1), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");
        assert_eq!(pool.get(handle).map(Voice::frames_left), Some(5512));
    }

    #[test]
    fn test_trigger_events_order() {
        let mut pool = pool(8);
        let mut track = track(8);
        track.add_note(4, NoteEvent::new(0, 2));
        track.add_note(4, NoteEvent::new(7, 2));
        track.set_velocity_event(4, Event::velocity(0.25));
        track.set_pan_event(4, Event::pan(0.9));

        track.trigger_events(3, &mut pool, FRAMES_PER_BEAT);
        assert_eq!(pool.active_count(), 0);

        track.trigger_events(4, &mut pool, FRAMES_PER_BEAT);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(track.voices().len(), 2);

        // The notes were started first, so the same-position parameter changes reach
        // them and are applied on the next evaluation.
        let mut out = vec![0.0; 2];
        pool.render(&mut out);
        for handle in track.voices() {
            let voice = pool.get(*handle).expect("live");
            assert_eq!(voice.velocity(), 0.25);
            assert_eq!(voice.pan(), 0.9);
        }
    }

    #[test]
    fn test_velocity_only_reaches_sounding_voices() {
        let mut pool = pool(8);
        let mut track = track(8);
        track.set_velocity(Event::velocity(0.1), &mut pool);

        let handle = track
            .start_note(NoteEvent::new(0, 1), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");
        assert_eq!(pool.get(handle).map(Voice::velocity), Some(DEFAULT_VELOCITY));
    }

    #[test]
    fn test_exhausted_pool_drops_notes() {
        let mut pool = pool(3);
        let mut track = track(3);
        for _ in 0..5 {
            track.add_note(0, NoteEvent::new(0, 1));
        }
        track.trigger_events(0, &mut pool, FRAMES_PER_BEAT);
        assert_eq!(pool.active_count(), 3);
        assert_eq!(track.voices().len(), 3);
    }

    #[test]
    fn test_mute_propagates() {
        let mut pool = pool(4);
        let mut track = track(4);
        let first = track
            .start_note(NoteEvent::new(0, 1), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");

        track.set_muted(true, &mut pool);
        track.set_muted(true, &mut pool);
        assert!(track.is_muted());
        assert_eq!(pool.get(first).map(Voice::is_muted), Some(true));

        let second = track
            .start_note(NoteEvent::new(0, 1), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");
        assert_eq!(pool.get(second).map(Voice::is_muted), Some(true));

        track.set_muted(false, &mut pool);
        assert_eq!(pool.get(first).map(Voice::is_muted), Some(false));
        assert_eq!(pool.get(second).map(Voice::is_muted), Some(false));
    }

    #[test]
    fn test_remove_unused_voices() {
        let mut pool = pool(4);
        let mut track = track(4);
        track.start_note(NoteEvent::new(0, 0), &mut pool, FRAMES_PER_BEAT);
        track.start_note(NoteEvent::new(0, 1), &mut pool, FRAMES_PER_BEAT);
        assert_eq!(track.voices().len(), 2);

        // A zero-length note is out of frames straight away.
        track.remove_unused_voices(&pool);
        assert_eq!(track.voices().len(), 1);

        pool.kill_all();
        track.remove_unused_voices(&pool);
        assert!(track.voices().is_empty());
    }

    #[test]
    fn test_voice_list_never_outgrows_capacity() {
        let mut pool = pool(2);
        let mut track = track(2);
        for _ in 0..10 {
            track.start_note(NoteEvent::new(0, 0), &mut pool, FRAMES_PER_BEAT);
            let mut out = vec![0.0; 2];
            pool.render(&mut out);
        }
        assert!(track.voices().len() <= 2);
        assert_eq!(track.voices.capacity(), 2);
    }

    #[test]
    fn test_adopt_voices() {
        let mut pool = pool(4);
        let mut old = track(4);
        let handle = old
            .start_note(NoteEvent::new(0, 4), &mut pool, FRAMES_PER_BEAT)
            .expect("voice");

        let mut new = track(4);
        new.set_muted_flag(true);
        new.adopt_voices(&mut old, &mut pool);
        assert!(old.voices().is_empty());
        assert_eq!(new.voices(), &[handle]);
        assert_eq!(pool.get(handle).map(Voice::is_muted), Some(true));
    }

    #[test]
    fn test_clear_events() {
        let mut track = track(1);
        track.add_note(0, NoteEvent::new(0, 1));
        track.set_velocity_event(0, Event::velocity(0.5));
        track.set_pan_event(0, Event::pan(0.5));
        track.clear_events();
        assert!(track.notes().is_empty());
        assert!(track.velocity_events().is_empty());
        assert!(track.pan_events().is_empty());
    }
}
