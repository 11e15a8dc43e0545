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

//! Sample loading and caching.
//!
//! Samples are decoded entirely into memory when a song is loaded, downmixed to
//! mono and converted to the engine rate, so voices never touch the disk.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::buffer::SampleBuffer;

/// Errors decoding a sample file.
#[derive(Debug, thiserror::Error)]
pub enum SampleLoadError {
    #[error("Unable to open sample: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to decode sample: {0}")]
    Decode(#[from] SymphoniaError),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Sample rate not specified")]
    UnknownSampleRate,
    #[error("Sample contains no audio")]
    Empty,
}

/// Decodes a file into a mono buffer at the given rate.
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<SampleBuffer, SampleLoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SampleLoadError::NoAudioTrack)?;
    let track_id = track.id;
    let source_sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SampleLoadError::UnknownSampleRate)?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut mono = Vec::new();
    let mut decode_buffer: Option<DecodeBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let needed = decoded.capacity() * spec.channels.count();
        if decode_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < needed)
        {
            decode_buffer = Some(DecodeBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buffer) = decode_buffer.as_mut() else {
            continue;
        };
        buffer.copy_interleaved_ref(decoded);
        downmix_into(buffer.samples(), spec.channels.count(), &mut mono);
    }

    if mono.is_empty() {
        return Err(SampleLoadError::Empty);
    }

    if source_sample_rate != target_sample_rate {
        debug!(
            source_rate = source_sample_rate,
            target_rate = target_sample_rate,
            "Transcoding sample"
        );
        mono = transcode_samples(&mono, source_sample_rate, target_sample_rate);
    }

    Ok(SampleBuffer::new(mono))
}

/// Averages interleaved frames down to one channel.
fn downmix_into(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(samples);
        return;
    }
    out.extend(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Converts mono samples between rates using linear interpolation.
fn transcode_samples(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (samples.len() as f64 * ratio).ceil() as usize;

    (0..target_frames)
        .map(|target_frame| {
            let source_pos = target_frame as f64 / ratio;
            let source_frame = source_pos.floor() as usize;
            let frac = source_pos.fract() as f32;

            let s0 = samples.get(source_frame).copied().unwrap_or(0.0);
            let s1 = samples.get(source_frame + 1).copied().unwrap_or(s0);
            s0 + (s1 - s0) * frac
        })
        .collect()
}

/// Keeps every sample a song has loaded, keyed by resolved path. Samples are never
/// evicted. A path that fails to load is not cached and resolves to the fallback tone.
pub struct SampleCache {
    samples: HashMap<PathBuf, Arc<SampleBuffer>>,
    fallback: Arc<SampleBuffer>,
    sample_rate: u32,
    /// Directory relative sample paths are resolved against.
    sample_directory: Option<PathBuf>,
}

impl SampleCache {
    /// Creates an empty cache that decodes to the given rate.
    pub fn new(sample_rate: u32, sample_directory: Option<PathBuf>) -> SampleCache {
        SampleCache {
            samples: HashMap::new(),
            fallback: Arc::new(SampleBuffer::sine()),
            sample_rate,
            sample_directory,
        }
    }

    /// Returns the tone used for tracks without a usable sample.
    pub fn fallback(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.fallback)
    }

    /// Resolves a sample path against the sample directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.sample_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Returns the cached sample for the path, loading it first if needed.
    pub fn load_or_fetch(&mut self, path: &Path) -> Arc<SampleBuffer> {
        let path = self.resolve(path);
        if let Some(sample) = self.samples.get(&path) {
            debug!(path = ?path, "Using cached sample");
            return Arc::clone(sample);
        }

        let result = decode_file(&path, self.sample_rate);
        self.insert_result(path, result)
    }

    /// Decodes every path that isn't cached yet in parallel. Returns the resolved
    /// paths that failed to load, so callers can skip them instead of decoding again.
    pub fn preload<'a, I>(&mut self, paths: I) -> HashSet<PathBuf>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut pending: Vec<PathBuf> = paths
            .into_iter()
            .map(|path| self.resolve(path))
            .filter(|path| !self.samples.contains_key(path))
            .collect();
        pending.sort();
        pending.dedup();
        let mut failed = HashSet::new();
        if pending.is_empty() {
            return failed;
        }

        let sample_rate = self.sample_rate;
        let results: Vec<_> = pending
            .into_par_iter()
            .map(|path| {
                let result = decode_file(&path, sample_rate);
                (path, result)
            })
            .collect();

        for (path, result) in results {
            if result.is_err() {
                failed.insert(path.clone());
            }
            self.insert_result(path, result);
        }
        failed
    }

    fn insert_result(
        &mut self,
        path: PathBuf,
        result: Result<SampleBuffer, SampleLoadError>,
    ) -> Arc<SampleBuffer> {
        match result {
            Ok(sample) => {
                let sample = Arc::new(sample);
                let duration =
                    Duration::from_secs_f64(sample.len() as f64 / self.sample_rate as f64);
                info!(
                    path = ?path,
                    duration_ms = duration.as_millis(),
                    memory_kb = sample.memory_size() / 1024,
                    "Sample loaded"
                );
                self.samples.insert(path, Arc::clone(&sample));
                sample
            }
            Err(e) => {
                warn!(path = ?path, err = %e, "Failed to load sample, using fallback tone");
                self.fallback()
            }
        }
    }

    /// Returns true if the path has been loaded successfully.
    pub fn contains(&self, path: &Path) -> bool {
        self.samples.contains_key(&self.resolve(path))
    }

    /// Returns the number of cached samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.samples.values().map(|s| s.memory_size()).sum()
    }
}

impl fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleCache")
            .field("cached_samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}
