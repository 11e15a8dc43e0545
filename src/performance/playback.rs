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
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock;
use super::loader::SampleCache;
use super::song::{wrap_position, Song};
use super::state::{NoteRequest, SharedState};
use crate::songfile::{self, SongData, SongFileError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unable to read song: {0}")]
    SongFile(#[from] SongFileError),

    #[error("the renderer has not picked up the previous songs yet")]
    Busy,

    #[error("the renderer is gone")]
    Disconnected,
}

/// Control side state. Only ever locked by control threads.
pub(crate) struct Control {
    cache: SampleCache,
    loaded_path: Option<PathBuf>,
    songs: Sender<Box<Song>>,
    retired: Receiver<Box<Song>>,
    voice_capacity: usize,
    transpose: i32,
    song_directory: Option<PathBuf>,
}

impl Control {
    pub fn new(
        cache: SampleCache,
        songs: Sender<Box<Song>>,
        retired: Receiver<Box<Song>>,
        voice_capacity: usize,
        transpose: i32,
        song_directory: Option<PathBuf>,
    ) -> Control {
        Control {
            cache,
            loaded_path: None,
            songs,
            retired,
            voice_capacity,
            transpose,
            song_directory,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.song_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Builds a song from the data and hands it to the renderer.
    fn publish(&mut self, data: &SongData, shared: &SharedState) -> Result<(), LoadError> {
        // Songs the renderer has let go of are freed here, off the audio thread.
        let retired = self.retired.try_iter().count();
        if retired > 0 {
            debug!(count = retired, "Freed retired songs");
        }

        let failed = self.cache.preload(
            data.tracks
                .iter()
                .filter_map(|track| track.sample_path.as_deref()),
        );

        let cache = &mut self.cache;
        let song = Song::from_data(data, self.voice_capacity, self.transpose, |track| {
            match &track.sample_path {
                Some(path) if !failed.contains(&cache.resolve(path)) => cache.load_or_fetch(path),
                _ => cache.fallback(),
            }
        });
        let bpm = song.bpm();
        let end_position = song.end_position();

        match self.songs.try_send(Box::new(song)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(LoadError::Busy),
            Err(TrySendError::Disconnected(_)) => return Err(LoadError::Disconnected),
        }

        shared.bpm.store(bpm as u32, Ordering::Release);
        shared.end_position.store(end_position, Ordering::Release);
        info!(
            bpm,
            end_position,
            notes = data.note_count(),
            samples = self.cache.len(),
            sample_memory_kb = self.cache.total_memory_usage() / 1024,
            "Song published"
        );
        Ok(())
    }
}

/// A cloneable handle for driving the engine from any thread.
#[derive(Clone)]
pub struct Playback {
    shared: Arc<SharedState>,
    control: Arc<Mutex<Control>>,
}

impl Playback {
    pub(crate) fn new(shared: Arc<SharedState>, control: Control) -> Playback {
        Playback {
            shared,
            control: Arc::new(Mutex::new(control)),
        }
    }

    /// Loads a song file and publishes it. Reloading the song that is already
    /// loaded only updates whether it should start playing.
    pub fn load(&self, path: &Path, play_on_load: bool) -> Result<(), LoadError> {
        let mut control = self.control.lock();
        let path = control.resolve(path);

        if control.loaded_path.as_deref() == Some(path.as_path()) {
            debug!(path = ?path, "Song already loaded");
            self.shared.play_on_load.store(play_on_load, Ordering::Release);
            return Ok(());
        }

        let data = songfile::read_file(&path).inspect_err(|e| {
            warn!(path = ?path, err = %e, "Unable to load song");
        })?;
        control.publish(&data, &self.shared)?;
        control.loaded_path = Some(path);
        self.shared.play_on_load.store(play_on_load, Ordering::Release);
        Ok(())
    }

    /// Loads a song file and starts it from the beginning.
    pub fn load_and_play(&self, path: &Path) -> Result<(), LoadError> {
        self.load(path, true)
    }

    /// Publishes a song built by an editor. It replaces the live song without
    /// changing the play state. The song's playhead start becomes the position the
    /// next [`Playback::play`] starts from.
    pub fn load_song_data(&self, data: &SongData) -> Result<(), LoadError> {
        let mut control = self.control.lock();
        control.publish(data, &self.shared)?;
        control.loaded_path = data.save_path.clone();
        self.request_set_playhead_start(data.playhead_start);
        Ok(())
    }

    /// Starts playback from the playhead start.
    pub fn play(&self) {
        debug!("Play");
        self.shared.playing.store(true, Ordering::Release);
    }

    /// Stops playback. Every sounding voice is cut.
    pub fn pause(&self) {
        debug!("Pause");
        self.shared.playing.store(false, Ordering::Release);
    }

    /// Moves the playhead. Positions past the end of the song wrap to 0.
    pub fn seek(&self, position: u32) {
        let end_position = self.shared.end_position.load(Ordering::Acquire);
        self.shared
            .playhead
            .store(wrap_position(position, end_position), Ordering::Release);
    }

    /// Plays a single note on a track. Only the latest request between two audio
    /// callbacks is played.
    pub fn request_play_note(&self, pitch: u8, length: u16, track: u8) {
        self.shared.request_note(NoteRequest {
            pitch,
            length,
            track,
        });
    }

    /// Sets where playback starts the next time it goes from paused to playing.
    pub fn request_set_playhead_start(&self, position: u32) {
        self.shared
            .playhead_start
            .store(position, Ordering::Release);
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.shared.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master_volume()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    pub fn playhead_position(&self) -> u32 {
        self.shared.playhead.load(Ordering::Acquire)
    }

    /// Returns the path of the loaded song, if it came from a file.
    pub fn current_song_path(&self) -> Option<PathBuf> {
        self.control.lock().loaded_path.clone()
    }

    /// Returns the frames per beat of the most recently published song.
    pub fn frames_per_beat(&self) -> f64 {
        let bpm = self.shared.bpm.load(Ordering::Acquire);
        clock::frames_per_beat(self.shared.sample_rate, bpm as u16)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playback")
            .field("playing", &self.is_playing())
            .field("playhead", &self.playhead_position())
            .field("master_volume", &self.master_volume())
            .finish()
    }
}
