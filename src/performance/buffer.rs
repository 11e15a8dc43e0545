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

//! Decoded mono sample storage.

use std::f32::consts::PI;
use std::fmt;

/// Number of samples in the fallback tone. One full period.
const SINE_LENGTH: usize = 100;

/// Peak amplitude of the fallback tone.
const SINE_AMPLITUDE: f32 = 0.4;

/// Raw audio that a voice can play. Samples are normalized to [-1.0, 1.0] and
/// never change once the buffer is built.
#[derive(Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f32>,
}

impl SampleBuffer {
    /// Creates a new sample buffer, taking ownership of the data.
    pub fn new(data: Vec<f32>) -> SampleBuffer {
        SampleBuffer { data }
    }

    /// Creates a copy of the given samples.
    pub fn from_slice(data: &[f32]) -> SampleBuffer {
        SampleBuffer {
            data: data.to_vec(),
        }
    }

    /// The tone used whenever a track has no sample or its sample failed to load.
    pub fn sine() -> SampleBuffer {
        SampleBuffer {
            data: (0..SINE_LENGTH)
                .map(|i| (i as f32 / SINE_LENGTH as f32 * PI * 2.0).sin() * SINE_AMPLITUDE)
                .collect(),
        }
    }

    /// Returns the length of the buffer in samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Indexes straight into the data, truncating the fractional part. The caller is
    /// responsible for keeping the index inside the buffer.
    #[inline]
    pub fn get(&self, index: f64) -> f32 {
        self.data[index as usize]
    }

    /// Indexes into the data, wrapping indices that fall outside of the buffer so that
    /// interpolation windows can reach past either end.
    #[inline]
    pub fn get_wrapped(&self, index: i64) -> f32 {
        let len = self.data.len() as i64;
        if len == 0 {
            return 0.0;
        }
        self.data[index.rem_euclid(len) as usize]
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_truncates() {
        let buffer = SampleBuffer::from_slice(&[0.1, 0.2, 0.3]);
        assert_eq!(buffer.get(0.0), 0.1);
        assert_eq!(buffer.get(1.9), 0.2);
        assert_eq!(buffer.get(2.5), 0.3);
    }

    #[test]
    fn test_get_wrapped() {
        let buffer = SampleBuffer::from_slice(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(buffer.get_wrapped(0), 0.1);
        assert_eq!(buffer.get_wrapped(4), 0.1);
        assert_eq!(buffer.get_wrapped(5), 0.2);
        assert_eq!(buffer.get_wrapped(-1), 0.4);
        assert_eq!(buffer.get_wrapped(-6), 0.3);
        assert_eq!(buffer.get_wrapped(13), 0.2);
    }

    #[test]
    fn test_get_wrapped_empty() {
        let buffer = SampleBuffer::new(Vec::new());
        assert!(buffer.is_empty());
        assert_eq!(buffer.get_wrapped(3), 0.0);
    }

    #[test]
    fn test_sine() {
        let sine = SampleBuffer::sine();
        assert_eq!(sine.len(), SINE_LENGTH);
        assert_eq!(sine.get(0.0), 0.0);
        assert!((sine.get(25.0) - SINE_AMPLITUDE).abs() < 1e-6);
        assert!((sine.get(75.0) + SINE_AMPLITUDE).abs() < 1e-6);
        assert_eq!(sine.memory_size(), SINE_LENGTH * 4);
    }
}
