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

//! A single playing instance of a sample.
//!
//! A voice turns pitch, velocity, pan and a remaining duration into a stream of
//! output samples. It is evaluated once per channel per frame and then advanced
//! with [`Voice::next_frame`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buffer::SampleBuffer;

/// Velocity a fresh voice starts at.
pub const DEFAULT_VELOCITY: f32 = 0.85;

/// Centre pan position.
pub const CENTER_PAN: f32 = 0.5;

/// Default number of frames a voice fades in over.
pub const DEFAULT_ATTACK_FRAMES: u32 = 100;

/// Default number of frames a voice fades out over once its note ends.
pub const DEFAULT_RELEASE_FRAMES: u32 = 150;

/// Default number of frames velocity and pan changes are smoothed over.
pub const DEFAULT_RAMP_FRAMES: u32 = 150;

/// How a voice reads between samples.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Nearest lower sample.
    None,
    /// 4-point cubic Lagrange interpolation.
    #[default]
    Lagrange,
}

/// An output channel of the stereo mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Both channels in interleaving order.
    pub const ALL: [Channel; 2] = [Channel::Left, Channel::Right];
}

/// Envelope and interpolation parameters every voice is reset to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceSettings {
    pub interpolation: Interpolation,
    pub attack_frames: u32,
    pub release_frames: u32,
    pub ramp_frames: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        VoiceSettings {
            interpolation: Interpolation::default(),
            attack_frames: DEFAULT_ATTACK_FRAMES,
            release_frames: DEFAULT_RELEASE_FRAMES,
            ramp_frames: DEFAULT_RAMP_FRAMES,
        }
    }
}

/// Plays a sample buffer.
#[derive(Clone, Debug)]
pub struct Voice {
    sample: Option<Arc<SampleBuffer>>,
    /// Fractional read position inside the sample.
    cursor: f64,
    /// Semitone offset from the sample's native pitch.
    pitch: i32,
    /// Cursor increment per frame, derived from the pitch.
    rate: f64,

    velocity: f32,
    target_velocity: f32,
    pan: f32,
    target_pan: f32,
    ramp_frames_left: u32,

    settings: VoiceSettings,
    attack_frames_left: u32,
    release_active: bool,

    /// Frames left before the note (or its release) is done.
    frames_left: u32,
    one_shot: bool,
    muted: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Voice::new(VoiceSettings::default())
    }
}

impl Voice {
    /// Creates an unbound voice with the given envelope settings.
    pub fn new(settings: VoiceSettings) -> Voice {
        Voice {
            sample: None,
            cursor: 0.0,
            pitch: 0,
            rate: 1.0,
            velocity: DEFAULT_VELOCITY,
            target_velocity: DEFAULT_VELOCITY,
            pan: CENTER_PAN,
            target_pan: CENTER_PAN,
            ramp_frames_left: 0,
            settings,
            attack_frames_left: settings.attack_frames,
            release_active: false,
            frames_left: 0,
            one_shot: false,
            muted: false,
        }
    }

    /// Binds the voice to a sample and rewinds it.
    pub fn set_sample_buffer(&mut self, sample: Arc<SampleBuffer>) {
        self.sample = Some(sample);
        self.cursor = 0.0;
    }

    /// Sets the pitch as a semitone offset. The sample is resampled, so one octave up
    /// plays it back twice as fast.
    pub fn set_pitch(&mut self, pitch: i32) {
        self.pitch = pitch;
        self.rate = 2f64.powf(pitch as f64 / 12.0);
    }

    pub fn pitch(&self) -> i32 {
        self.pitch
    }

    /// Returns the cursor increment per frame.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn frames_left(&self) -> u32 {
        self.frames_left
    }

    pub fn set_frames_left(&mut self, frames: u32) {
        self.frames_left = frames;
    }

    pub fn is_releasing(&self) -> bool {
        self.release_active
    }

    pub fn set_one_shot(&mut self, one_shot: bool) {
        self.one_shot = one_shot;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Sets the velocity to ramp towards. Values that are not numbers are ignored.
    pub fn set_velocity(&mut self, velocity: f32) {
        if !velocity.is_finite() {
            return;
        }
        self.target_velocity = velocity;
        if self.velocity != self.target_velocity {
            self.ramp_frames_left = self.settings.ramp_frames;
        }
    }

    /// Sets the pan to ramp towards. 0.0 is hard left, 1.0 hard right. Values that
    /// are not numbers are ignored.
    pub fn set_pan(&mut self, pan: f32) {
        if !pan.is_finite() {
            return;
        }
        self.target_pan = pan;
        if self.pan != self.target_pan {
            self.ramp_frames_left = self.settings.ramp_frames;
        }
    }

    /// Advances the read position. Looping voices wrap around the sample, one-shot
    /// voices end as soon as they run off the end of it.
    pub fn inc_cursor(&mut self) {
        let len = match &self.sample {
            Some(sample) if !sample.is_empty() => sample.len() as f64,
            _ => return,
        };

        self.cursor += self.rate;
        if self.cursor < len {
            return;
        }
        if self.one_shot {
            // Skip the release tail entirely.
            self.frames_left = 0;
            self.release_active = true;
            self.cursor = 0.0;
        } else {
            self.cursor = self.cursor.rem_euclid(len);
        }
    }

    /// Produces one output sample for the given channel.
    pub fn eval(&mut self, channel: Channel) -> f32 {
        if self.muted {
            return 0.0;
        }
        let sample = match &self.sample {
            Some(sample) if !sample.is_empty() => sample,
            _ => return 0.0,
        };

        let mut value = match self.settings.interpolation {
            Interpolation::None => sample.get(self.cursor),
            Interpolation::Lagrange => lagrange(sample, self.cursor),
        };

        let (velocity, pan) = if self.ramp_frames_left > 0 && self.settings.ramp_frames > 0 {
            let t = 1.0 - self.ramp_frames_left as f32 / self.settings.ramp_frames as f32;
            (
                lerp(self.velocity, self.target_velocity, t),
                lerp(self.pan, self.target_pan, t),
            )
        } else {
            self.velocity = self.target_velocity;
            self.pan = self.target_pan;
            (self.velocity, self.pan)
        };

        value *= velocity;
        value *= pan_gain(pan, channel);

        if self.attack_frames_left > 0 {
            value *= 1.0 - self.attack_frames_left as f32 / self.settings.attack_frames as f32;
        }

        if self.release_active {
            let release = if self.settings.release_frames > 0 {
                (self.frames_left as f32 / self.settings.release_frames as f32).min(1.0)
            } else {
                0.0
            };
            value *= release;
        }

        value
    }

    /// Moves on to the next frame. Call after evaluating every channel.
    pub fn next_frame(&mut self) {
        self.inc_cursor();

        self.ramp_frames_left = self.ramp_frames_left.saturating_sub(1);
        self.attack_frames_left = self.attack_frames_left.saturating_sub(1);
        self.frames_left = self.frames_left.saturating_sub(1);
    }

    /// Called once the remaining frames hit zero. Starts the release phase if there is
    /// one to play and returns true, or returns false when the voice is done.
    pub fn enter_release(&mut self) -> bool {
        if !self.release_active && self.settings.release_frames > 0 {
            self.release_active = true;
            self.frames_left = self.settings.release_frames;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn set_cursor(&mut self, cursor: f64) {
        self.cursor = cursor;
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Linear pan law. Each side is only attenuated once the pan moves past the centre
/// towards the other side.
fn pan_gain(pan: f32, channel: Channel) -> f32 {
    let gain = match channel {
        Channel::Left if pan > CENTER_PAN => (1.0 - pan) / CENTER_PAN,
        Channel::Right if pan < CENTER_PAN => pan / CENTER_PAN,
        _ => 1.0,
    };
    gain.max(0.0)
}

/// 4-point Lagrange interpolation anchored two samples behind the cursor.
fn lagrange(sample: &SampleBuffer, cursor: f64) -> f32 {
    let anchor = cursor.floor() as i64 - 2;
    let t = cursor.fract() as f32;

    let a = sample.get_wrapped(anchor - 1);
    let b = sample.get_wrapped(anchor);
    let c = sample.get_wrapped(anchor + 1);
    let d = sample.get_wrapped(anchor + 2);

    let c0 = b;
    let c1 = c - a / 3.0 - b / 2.0 - d / 6.0;
    let c2 = (a + c) / 2.0 - b;
    let c3 = (d - a) / 6.0 + (b - c) / 2.0;

    ((c3 * t + c2) * t + c1) * t + c0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_settings() -> VoiceSettings {
        VoiceSettings {
            interpolation: Interpolation::None,
            attack_frames: 0,
            release_frames: 0,
            ramp_frames: 0,
        }
    }

    fn voice_with(data: &[f32], settings: VoiceSettings) -> Voice {
        let mut voice = Voice::new(settings);
        voice.set_sample_buffer(Arc::new(SampleBuffer::from_slice(data)));
        voice
    }

    #[test]
    fn test_pitch_law() {
        let mut voice = Voice::default();
        voice.set_pitch(0);
        assert_eq!(voice.rate(), 1.0);
        voice.set_pitch(12);
        assert_eq!(voice.rate(), 2.0);
        voice.set_pitch(-12);
        assert_eq!(voice.rate(), 0.5);
        voice.set_pitch(7);
        assert!((voice.rate() - 1.4983).abs() < 1e-4);
    }

    #[test]
    fn test_octave_up_doubles_cursor_speed() {
        let mut voice = voice_with(&[0.0; 64], plain_settings());
        voice.set_frames_left(100);
        voice.set_pitch(12);
        for _ in 0..10 {
            voice.next_frame();
        }
        assert_eq!(voice.cursor(), 20.0);
    }

    #[test]
    fn test_looping_cursor_wraps() {
        let mut voice = voice_with(&[0.0; 4], plain_settings());
        voice.set_frames_left(100);
        for _ in 0..5 {
            voice.next_frame();
        }
        assert_eq!(voice.cursor(), 1.0);
        assert_eq!(voice.frames_left(), 95);
        assert!(!voice.is_releasing());
    }

    #[test]
    fn test_one_shot_overflow_ends_voice() {
        let mut voice = voice_with(&[0.0; 4], plain_settings());
        voice.set_one_shot(true);
        voice.set_frames_left(100);
        for _ in 0..3 {
            voice.next_frame();
        }
        assert_eq!(voice.frames_left(), 97);
        voice.next_frame();
        assert_eq!(voice.frames_left(), 0);
        assert!(voice.is_releasing());
        assert_eq!(voice.cursor(), 0.0);
        // A forced end never gets a release tail.
        assert!(!voice.enter_release());
    }

    #[test]
    fn test_eval_velocity_and_pan() {
        let mut voice = voice_with(&[1.0; 8], plain_settings());
        assert!((voice.eval(Channel::Left) - DEFAULT_VELOCITY).abs() < 1e-6);
        assert!((voice.eval(Channel::Right) - DEFAULT_VELOCITY).abs() < 1e-6);

        voice.set_velocity(1.0);
        voice.set_pan(0.75);
        assert!((voice.eval(Channel::Left) - 0.5).abs() < 1e-6);
        assert!((voice.eval(Channel::Right) - 1.0).abs() < 1e-6);

        voice.set_pan(0.0);
        assert!((voice.eval(Channel::Left) - 1.0).abs() < 1e-6);
        assert_eq!(voice.eval(Channel::Right), 0.0);

        voice.set_pan(1.0);
        assert_eq!(voice.eval(Channel::Left), 0.0);
        assert!((voice.eval(Channel::Right) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_gain_never_negative() {
        assert_eq!(pan_gain(1.5, Channel::Left), 0.0);
        assert_eq!(pan_gain(-0.5, Channel::Right), 0.0);
        assert_eq!(pan_gain(0.25, Channel::Left), 1.0);
        assert_eq!(pan_gain(0.25, Channel::Right), 0.5);
    }

    #[test]
    fn test_velocity_ramp() {
        let settings = VoiceSettings {
            ramp_frames: 10,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_frames_left(100);
        voice.set_velocity(0.0);

        // Start of the ramp still sounds at the old velocity.
        assert!((voice.eval(Channel::Left) - DEFAULT_VELOCITY).abs() < 1e-6);
        for _ in 0..5 {
            voice.next_frame();
        }
        assert!((voice.eval(Channel::Left) - DEFAULT_VELOCITY * 0.5).abs() < 1e-6);
        for _ in 0..5 {
            voice.next_frame();
        }
        assert_eq!(voice.eval(Channel::Left), 0.0);
        assert_eq!(voice.velocity(), 0.0);
    }

    #[test]
    fn test_pan_ramp() {
        let settings = VoiceSettings {
            ramp_frames: 10,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_velocity(1.0);
        for _ in 0..10 {
            voice.eval(Channel::Left);
            voice.next_frame();
        }
        // Settles the velocity ramp.
        voice.eval(Channel::Left);
        voice.set_pan(1.0);

        assert!((voice.eval(Channel::Left) - 1.0).abs() < 1e-6);
        for _ in 0..5 {
            voice.next_frame();
        }
        // Halfway through the ramp the pan sits at 0.75.
        assert!((voice.eval(Channel::Left) - 0.5).abs() < 1e-6);
        assert!((voice.eval(Channel::Right) - 1.0).abs() < 1e-6);
        for _ in 0..5 {
            voice.next_frame();
        }
        assert_eq!(voice.eval(Channel::Left), 0.0);
        assert_eq!(voice.pan(), 1.0);
    }

    #[test]
    fn test_non_finite_targets_are_ignored() {
        let settings = VoiceSettings {
            ramp_frames: 10,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_velocity(f32::NAN);
        voice.set_pan(f32::INFINITY);
        assert_eq!(voice.ramp_frames_left, 0);
        assert!((voice.eval(Channel::Left) - DEFAULT_VELOCITY).abs() < 1e-6);
        assert!((voice.eval(Channel::Right) - DEFAULT_VELOCITY).abs() < 1e-6);
    }

    #[test]
    fn test_fast_looping_voice_wraps_in_one_step() {
        let mut voice = voice_with(&[0.0], plain_settings());
        voice.set_frames_left(10);
        voice.set_pitch(127);
        voice.next_frame();
        assert!(voice.cursor() >= 0.0 && voice.cursor() < 1.0);
        assert_eq!(voice.frames_left(), 9);
    }

    #[test]
    fn test_setting_same_value_does_not_ramp() {
        let settings = VoiceSettings {
            ramp_frames: 10,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_pan(CENTER_PAN);
        voice.set_velocity(DEFAULT_VELOCITY);
        assert_eq!(voice.ramp_frames_left, 0);
    }

    #[test]
    fn test_attack_fade_in() {
        let settings = VoiceSettings {
            attack_frames: 4,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_velocity(1.0);
        voice.set_frames_left(100);

        let mut levels = Vec::new();
        for _ in 0..6 {
            levels.push(voice.eval(Channel::Left));
            voice.next_frame();
        }
        assert_eq!(levels, vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0]);
    }

    #[test]
    fn test_release_fade_out() {
        let settings = VoiceSettings {
            release_frames: 4,
            ..plain_settings()
        };
        let mut voice = voice_with(&[1.0; 8], settings);
        voice.set_velocity(1.0);
        voice.set_frames_left(1);

        assert_eq!(voice.eval(Channel::Left), 1.0);
        voice.next_frame();
        assert_eq!(voice.frames_left(), 0);
        assert!(voice.enter_release());
        assert_eq!(voice.frames_left(), 4);

        let mut levels = Vec::new();
        for _ in 0..4 {
            levels.push(voice.eval(Channel::Left));
            voice.next_frame();
        }
        assert_eq!(levels, vec![1.0, 0.75, 0.5, 0.25]);
        assert_eq!(voice.frames_left(), 0);
        assert!(!voice.enter_release());
    }

    #[test]
    fn test_muted_and_unbound_are_silent() {
        let mut voice = Voice::new(plain_settings());
        assert_eq!(voice.eval(Channel::Left), 0.0);

        let mut voice = voice_with(&[1.0; 8], plain_settings());
        voice.set_muted(true);
        assert_eq!(voice.eval(Channel::Left), 0.0);
        assert_eq!(voice.eval(Channel::Right), 0.0);
    }

    #[test]
    fn test_counters_saturate() {
        let mut voice = voice_with(&[1.0; 8], plain_settings());
        voice.next_frame();
        voice.next_frame();
        assert_eq!(voice.frames_left(), 0);
        assert_eq!(voice.attack_frames_left, 0);
        assert_eq!(voice.ramp_frames_left, 0);
    }

    #[test]
    fn test_lagrange_on_a_ramp() {
        // A cubic through four points of a straight line is the line itself, delayed by
        // the two sample anchor offset.
        let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let settings = VoiceSettings {
            interpolation: Interpolation::Lagrange,
            ..plain_settings()
        };
        let mut voice = voice_with(&data, settings);
        voice.set_velocity(1.0);
        voice.set_cursor(10.25);
        assert!((voice.eval(Channel::Left) - 8.25).abs() < 1e-4);
        voice.set_cursor(20.0);
        assert!((voice.eval(Channel::Left) - 18.0).abs() < 1e-4);
    }

    #[test]
    fn test_lagrange_wraps_at_start() {
        let data = [0.5f32; 16];
        let settings = VoiceSettings {
            interpolation: Interpolation::Lagrange,
            ..plain_settings()
        };
        let mut voice = voice_with(&data, settings);
        voice.set_velocity(1.0);
        voice.set_cursor(0.5);
        assert!((voice.eval(Channel::Left) - 0.5).abs() < 1e-6);
    }
}
