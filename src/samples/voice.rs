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

//! A slot's connection to an audio graph.
//!
//! A voice holds at most one playback at a time. Starting a new playback revokes the previous
//! one, so a voice can never sound twice.

use std::sync::Arc;

use tracing::debug;

use super::LoadedSample;
use crate::audio::{mixer::ScheduledSource, AudioMixer};
use crate::playsync::{PlayHandle, PlayState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("voice is not attached to an audio graph")]
    NotAttached,

    #[error("audio graph is no longer rendering")]
    GraphStopped,
}

/// When a playback should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// At the next rendered block.
    Now,
    /// At an absolute render sample.
    Sample(u64),
}

#[derive(Default)]
pub struct Voice {
    mixer: Option<AudioMixer>,
    current: Option<Arc<PlayHandle>>,
}

impl Voice {
    pub fn new() -> Voice {
        Voice::default()
    }

    /// Connects the voice to a graph. Reattaching to the same graph is a no-op; attaching to a
    /// different one detaches from the old graph first.
    pub fn attach(&mut self, mixer: &AudioMixer) {
        if self.mixer.as_ref().map(AudioMixer::id) == Some(mixer.id()) {
            return;
        }
        self.detach();
        debug!(graph = mixer.id(), "Voice attached");
        self.mixer = Some(mixer.clone());
    }

    /// Disconnects from the current graph, revoking any playback first.
    pub fn detach(&mut self) {
        self.stop();
        if let Some(mixer) = self.mixer.take() {
            debug!(graph = mixer.id(), "Voice detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.mixer.is_some()
    }

    pub fn mixer(&self) -> Option<&AudioMixer> {
        self.mixer.as_ref()
    }

    /// Revokes the current playback and hands a new one to the renderer. Returns the new
    /// playback's handle.
    ///
    /// The previous playback is revoked before the hand-off so the two can never sound in the
    /// same block. If the hand-off fails with `GraphStopped`, the renderer is gone and the voice
    /// is left stopped.
    pub fn schedule_start(
        &mut self,
        sample: &LoadedSample,
        start_at: StartAt,
        looping: bool,
        volume: f32,
    ) -> Result<Arc<PlayHandle>, SchedulingError> {
        let mixer = self.mixer.as_ref().ok_or(SchedulingError::NotAttached)?;

        let total_frames = sample.frame_count() as u64;
        let (handle, start_at) = match start_at {
            StartAt::Now => (PlayHandle::immediate(total_frames, looping), None),
            StartAt::Sample(sample) => (PlayHandle::scheduled(total_frames, looping), Some(sample)),
        };
        let handle = Arc::new(handle);

        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        mixer.schedule(ScheduledSource {
            handle: handle.clone(),
            sample: sample.clone(),
            start_at,
            volume,
        })?;

        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Revokes the current playback. Returns the state it was revoked from, or `None` if nothing
    /// was scheduled or playing.
    pub fn stop(&mut self) -> Option<PlayState> {
        self.current.take().and_then(|handle| handle.cancel())
    }

    /// Handle of the most recent playback, which may already have finished.
    pub fn handle(&self) -> Option<&Arc<PlayHandle>> {
        self.current.as_ref()
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::mock;

    fn tone(frames: usize) -> LoadedSample {
        LoadedSample::from_interleaved(vec![0.5; frames], 1, 48000)
    }

    #[test]
    fn test_schedule_requires_attach() {
        let mut voice = Voice::new();
        let result = voice.schedule_start(&tone(10), StartAt::Now, false, 1.0);
        assert!(matches!(result, Err(SchedulingError::NotAttached)));
        assert!(voice.handle().is_none());
    }

    #[test]
    fn test_restart_revokes_previous_playback() {
        let device = mock::Device::get("mock", 1, 48000);
        let mut voice = Voice::new();
        voice.attach(crate::audio::Device::mixer(&device));

        let first = voice
            .schedule_start(&tone(1000), StartAt::Now, false, 1.0)
            .expect("schedule");
        device.render(64);
        assert_eq!(PlayState::Playing, first.state());

        let second = voice
            .schedule_start(&tone(1000), StartAt::Now, false, 1.0)
            .expect("schedule");
        assert_eq!(PlayState::Cancelled, first.state());

        let output = device.render(64);
        // Only one voice is sounding.
        assert!(output.iter().all(|s| (*s - 0.5).abs() < f32::EPSILON));
        assert_eq!(Some(64), voice.handle().map(|handle| handle.frames_played()));
        assert_eq!(PlayState::Playing, second.state());
        assert_eq!(1, device.active_count());
    }

    #[test]
    fn test_failed_restart_leaves_voice_stopped() {
        let (mixer, mut renderer) = AudioMixer::new(1, 48000);
        let mut voice = Voice::new();
        voice.attach(&mixer);
        let first = voice
            .schedule_start(&tone(1000), StartAt::Now, false, 1.0)
            .expect("schedule");
        let mut output = vec![0.0; 64];
        renderer.render(&mut output);
        assert_eq!(PlayState::Playing, first.state());

        drop(renderer);
        assert_eq!(
            Err(SchedulingError::GraphStopped),
            voice
                .schedule_start(&tone(1000), StartAt::Now, false, 1.0)
                .map(|_| ())
        );
        assert_eq!(PlayState::Cancelled, first.state());
        assert!(voice.handle().is_none());
        assert_eq!(None, voice.stop());
    }

    #[test]
    fn test_detach_stops_playback() {
        let device = mock::Device::get("mock", 1, 48000);
        let mut voice = Voice::new();
        voice.attach(crate::audio::Device::mixer(&device));
        let handle = voice
            .schedule_start(&tone(1000), StartAt::Sample(10_000), false, 1.0)
            .expect("schedule");

        voice.detach();
        assert!(!voice.is_attached());
        assert_eq!(PlayState::Cancelled, handle.state());
        assert_eq!(None, voice.stop());
    }

    #[test]
    fn test_attach_same_graph_is_noop() {
        let device = mock::Device::get("mock", 1, 48000);
        let mixer = crate::audio::Device::mixer(&device);
        let mut voice = Voice::new();
        voice.attach(mixer);
        let handle = voice
            .schedule_start(&tone(1000), StartAt::Now, true, 1.0)
            .expect("schedule");

        voice.attach(mixer);
        assert_eq!(PlayState::Playing, handle.state());

        let other = mock::Device::get("other", 1, 48000);
        voice.attach(crate::audio::Device::mixer(&other));
        assert_eq!(PlayState::Cancelled, handle.state());
        assert_eq!(
            Some(crate::audio::Device::mixer(&other).id()),
            voice.mixer().map(AudioMixer::id)
        );
    }
}
