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

//! Fixed-capacity voice storage.
//!
//! All voices are allocated up front. Tracks refer to voices through
//! [`VoiceHandle`]s, which go stale once the voice is reclaimed, so a track can
//! never reach a voice that has since been handed to another note.

use std::collections::VecDeque;
use std::fmt;

use super::voice::{Channel, Voice, VoiceSettings};

/// Default number of voices that can sound at once.
pub const DEFAULT_MAX_VOICES: usize = 128;

/// A reference to a voice in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: usize,
    generation: u32,
}

impl VoiceHandle {
    /// Returns the slot the handle points at.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Owns every voice and tracks which ones are sounding.
pub struct VoicePool {
    voices: Vec<Voice>,
    /// Bumped every time a slot is reclaimed, invalidating outstanding handles.
    generations: Vec<u32>,
    /// Free slots, oldest first.
    inactive: VecDeque<usize>,
    /// Sounding slots in the order they were started.
    active: Vec<usize>,
    settings: VoiceSettings,
}

impl VoicePool {
    /// Creates a pool with the given number of voices.
    pub fn new(capacity: usize, settings: VoiceSettings) -> VoicePool {
        VoicePool {
            voices: vec![Voice::new(settings); capacity],
            generations: vec![0; capacity],
            inactive: (0..capacity).collect(),
            active: Vec::with_capacity(capacity),
            settings,
        }
    }

    /// Returns the total number of voices.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Returns the number of voices currently sounding.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns the number of voices free to be started.
    pub fn inactive_count(&self) -> usize {
        self.inactive.len()
    }

    /// Takes a free voice, resets it and marks it active. Returns None if every voice
    /// is in use; the caller is expected to drop whatever it wanted to play.
    pub fn acquire(&mut self) -> Option<VoiceHandle> {
        let index = self.inactive.pop_front()?;
        self.voices[index] = Voice::new(self.settings);
        self.active.push(index);
        Some(VoiceHandle {
            index,
            generation: self.generations[index],
        })
    }

    /// Returns true if the handle still refers to a sounding voice.
    pub fn is_live(&self, handle: VoiceHandle) -> bool {
        self.generations.get(handle.index) == Some(&handle.generation)
    }

    /// Looks up a voice, ignoring stale handles.
    pub fn get(&self, handle: VoiceHandle) -> Option<&Voice> {
        if self.is_live(handle) {
            self.voices.get(handle.index)
        } else {
            None
        }
    }

    /// Looks up a voice for modification, ignoring stale handles.
    pub fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        if self.is_live(handle) {
            self.voices.get_mut(handle.index)
        } else {
            None
        }
    }

    /// Stops every voice immediately. No release tails are played.
    pub fn kill_all(&mut self) {
        for index in self.active.drain(..) {
            self.voices[index].set_frames_left(0);
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.inactive.push_back(index);
        }
    }

    /// Mixes every active voice into the interleaved stereo buffer and moves finished
    /// voices back to the free list.
    pub fn render(&mut self, out: &mut [f32]) {
        for frame in out.chunks_exact_mut(Channel::ALL.len()) {
            for j in (0..self.active.len()).rev() {
                let index = self.active[j];
                let voice = &mut self.voices[index];

                for (sample, channel) in frame.iter_mut().zip(Channel::ALL) {
                    *sample += voice.eval(channel);
                }

                voice.next_frame();
                if voice.frames_left() == 0 && !voice.enter_release() {
                    self.active.remove(j);
                    self.generations[index] = self.generations[index].wrapping_add(1);
                    self.inactive.push_back(index);
                }
            }
        }
    }
}

impl fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field("active_voices", &self.active.len())
            .field("max_voices", &self.voices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::performance::buffer::SampleBuffer;
    use crate::performance::voice::Interpolation;

    fn settings(release_frames: u32) -> VoiceSettings {
        VoiceSettings {
            interpolation: Interpolation::None,
            attack_frames: 0,
            release_frames,
            ramp_frames: 0,
        }
    }

    fn start(pool: &mut VoicePool, frames: u32) -> VoiceHandle {
        let handle = pool.acquire().expect("voice available");
        let voice = pool.get_mut(handle).expect("live handle");
        voice.set_sample_buffer(Arc::new(SampleBuffer::from_slice(&[0.5; 16])));
        voice.set_velocity(1.0);
        voice.set_frames_left(frames);
        handle
    }

    #[test]
    fn test_exhaustion_drops_requests() {
        let mut pool = VoicePool::new(4, settings(0));
        let handles: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        assert!(handles.iter().all(Option::is_some));
        assert!(pool.acquire().is_none());
        assert!(pool.acquire().is_none());
        assert_eq!(pool.active_count(), 4);
        assert_eq!(pool.inactive_count(), 0);
    }

    #[test]
    fn test_reclaim_without_release() {
        let mut pool = VoicePool::new(2, settings(0));
        let handle = start(&mut pool, 10);

        let mut out = vec![0.0; 9 * 2];
        pool.render(&mut out);
        assert!(pool.is_live(handle));
        assert_eq!(pool.get(handle).map(Voice::frames_left), Some(1));

        // Reclaimed on the same frame the countdown hits zero.
        let mut out = vec![0.0; 2];
        pool.render(&mut out);
        assert!(!pool.is_live(handle));
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.inactive_count(), 2);
    }

    #[test]
    fn test_reclaim_after_exactly_one_release() {
        let mut pool = VoicePool::new(2, settings(6));
        let handle = start(&mut pool, 10);

        let mut out = vec![0.0; 10 * 2];
        pool.render(&mut out);
        let voice = pool.get(handle).expect("still releasing");
        assert!(voice.is_releasing());
        assert_eq!(voice.frames_left(), 6);

        let mut out = vec![0.0; 5 * 2];
        pool.render(&mut out);
        assert!(pool.is_live(handle));

        let mut out = vec![0.0; 2];
        pool.render(&mut out);
        assert!(!pool.is_live(handle));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_render_mixes_voices() {
        let mut pool = VoicePool::new(4, settings(0));
        start(&mut pool, 4);
        start(&mut pool, 4);

        let mut out = vec![0.0; 4 * 2];
        pool.render(&mut out);
        for sample in out {
            assert!((sample - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stale_handles() {
        let mut pool = VoicePool::new(1, settings(0));
        let first = start(&mut pool, 1);
        let mut out = vec![0.0; 2];
        pool.render(&mut out);
        assert!(pool.get(first).is_none());

        let second = pool.acquire().expect("slot was reclaimed");
        assert_eq!(first.index(), second.index());
        assert!(pool.get_mut(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn test_kill_all() {
        let mut pool = VoicePool::new(3, settings(150));
        let handles: Vec<_> = (0..3).map(|_| start(&mut pool, 1000)).collect();
        pool.kill_all();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.inactive_count(), 3);
        assert!(handles.iter().all(|handle| !pool.is_live(*handle)));

        // A second call has nothing left to do.
        pool.kill_all();
        assert_eq!(pool.inactive_count(), 3);
    }

    #[test]
    fn test_free_list_is_fifo() {
        let mut pool = VoicePool::new(3, settings(0));
        let a = start(&mut pool, 1);
        let b = start(&mut pool, 5);
        let mut out = vec![0.0; 2];
        pool.render(&mut out);
        assert!(!pool.is_live(a));
        assert!(pool.is_live(b));

        // Slot 2 was freed first, so it comes back before slot 0.
        let next = pool.acquire().expect("free voice");
        assert_eq!(next.index(), 2);
        let next = pool.acquire().expect("free voice");
        assert_eq!(next.index(), a.index());
    }
}
