//! Audio sink seam and the per-scene background music channel.

use serde::{Deserialize, Serialize};

use crate::core::assets::AudioHandle;

/// Receives playback commands. Mixing and decoding live on the host side.
pub trait AudioSink {
    /// Start playing `handle`. `looped` tracks repeat until stopped or faded.
    fn play(&mut self, handle: AudioHandle, volume: f32, looped: bool, fade_in_ms: u32);
    fn fade_out(&mut self, handle: AudioHandle, fade_ms: u32);
    fn set_volume(&mut self, handle: AudioHandle, volume: f32);
    fn stop(&mut self, handle: AudioHandle);
}

/// Discards every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play(&mut self, _: AudioHandle, _: f32, _: bool, _: u32) {}
    fn fade_out(&mut self, _: AudioHandle, _: u32) {}
    fn set_volume(&mut self, _: AudioHandle, _: f32) {}
    fn stop(&mut self, _: AudioHandle) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioCommand {
    Play {
        handle: AudioHandle,
        volume: f32,
        looped: bool,
        fade_in_ms: u32,
    },
    FadeOut {
        handle: AudioHandle,
        fade_ms: u32,
    },
    SetVolume {
        handle: AudioHandle,
        volume: f32,
    },
    Stop {
        handle: AudioHandle,
    },
}

/// Records every command in order, for tests and headless previews.
#[derive(Debug, Default, Clone)]
pub struct RecordingAudio {
    pub commands: Vec<AudioCommand>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent volume set or played for `handle`.
    pub fn last_volume(&self, handle: AudioHandle) -> Option<f32> {
        self.commands.iter().rev().find_map(|c| match c {
            AudioCommand::Play { handle: h, volume, .. }
            | AudioCommand::SetVolume { handle: h, volume } if *h == handle => Some(*volume),
            _ => None,
        })
    }
}

impl AudioSink for RecordingAudio {
    fn play(&mut self, handle: AudioHandle, volume: f32, looped: bool, fade_in_ms: u32) {
        self.commands.push(AudioCommand::Play {
            handle,
            volume,
            looped,
            fade_in_ms,
        });
    }

    fn fade_out(&mut self, handle: AudioHandle, fade_ms: u32) {
        self.commands.push(AudioCommand::FadeOut { handle, fade_ms });
    }

    fn set_volume(&mut self, handle: AudioHandle, volume: f32) {
        self.commands.push(AudioCommand::SetVolume { handle, volume });
    }

    fn stop(&mut self, handle: AudioHandle) {
        self.commands.push(AudioCommand::Stop { handle });
    }
}

/// A scene's looping music track and its current volume.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundMusic {
    pub handle: AudioHandle,
    pub volume: f32,
}

impl BackgroundMusic {
    pub fn new(handle: AudioHandle, volume: f32) -> Self {
        Self { handle, volume }
    }

    pub fn start(&self, audio: &mut dyn AudioSink, fade_ms: u32) {
        audio.play(self.handle, self.volume, true, fade_ms);
    }

    pub fn stop(&self, audio: &mut dyn AudioSink, fade_ms: u32) {
        audio.fade_out(self.handle, fade_ms);
    }

    /// Multiply the current volume by `factor`.
    pub fn scale(&mut self, factor: f32, audio: &mut dyn AudioSink) {
        self.volume *= factor;
        audio.set_volume(self.handle, self.volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let mut audio = RecordingAudio::new();
        let music = BackgroundMusic::new(AudioHandle(1), 0.6);
        music.start(&mut audio, 1000);
        music.stop(&mut audio, 1000);
        assert_eq!(audio.commands.len(), 2);
        assert!(matches!(audio.commands[0], AudioCommand::Play { looped: true, .. }));
        assert!(matches!(audio.commands[1], AudioCommand::FadeOut { fade_ms: 1000, .. }));
    }

    #[test]
    fn ducking_round_trips_volume() {
        let mut audio = RecordingAudio::new();
        let mut music = BackgroundMusic::new(AudioHandle(1), 0.9);
        music.scale(1.0 / 3.0, &mut audio);
        assert!((audio.last_volume(AudioHandle(1)).unwrap() - 0.3).abs() < 1e-6);
        music.scale(3.0, &mut audio);
        assert!((music.volume - 0.9).abs() < 1e-6);
        assert_eq!(audio.last_volume(AudioHandle(2)), None);
    }
}
