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

//! A single triggerable sample.
//!
//! A slot owns one decoded sample and one voice. Its observable state is derived from the play
//! handle of the voice's current playback, which the render thread advances with atomic
//! transitions, so `is_playing` and `is_pending` can never disagree. Control-side transitions are
//! serialized by a per-slot mutex the render thread never touches.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::loader::{LoadError, LoadedSample, SampleLoader};
use super::voice::{SchedulingError, StartAt, Voice};
use crate::audio::AudioMixer;
use crate::playsync::PlayState;
use crate::transport::TransportClock;

/// What a slot is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    /// Waiting for a bar boundary.
    Pending,
    Playing,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Idle => "idle",
            SlotState::Pending => "pending",
            SlotState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// The effect a trigger had on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    /// Playback started immediately.
    Started,
    /// Playback will start at the given render sample.
    Scheduled { at: u64 },
    /// Pending or in-flight playback was revoked.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot {0} has no sample loaded")]
    Empty(usize),

    #[error("slot {index} could not schedule playback: {source}")]
    Scheduling {
        index: usize,
        #[source]
        source: SchedulingError,
    },
}

struct SlotInner {
    sample: Option<LoadedSample>,
    sample_name: Option<String>,
    path: Option<PathBuf>,
    voice: Voice,
    clock: Weak<TransportClock>,
    looping: bool,
    volume: f32,
}

impl SlotInner {
    fn state(&self) -> SlotState {
        match self.voice.handle().map(|handle| handle.state()) {
            Some(PlayState::Scheduled) => SlotState::Pending,
            Some(PlayState::Playing) => SlotState::Playing,
            Some(PlayState::Finished) | Some(PlayState::Cancelled) | None => SlotState::Idle,
        }
    }
}

pub struct SampleSlot {
    index: usize,
    loader: Arc<SampleLoader>,
    inner: Mutex<SlotInner>,
}

impl SampleSlot {
    pub fn new(index: usize, loader: Arc<SampleLoader>) -> SampleSlot {
        SampleSlot {
            index,
            loader,
            inner: Mutex::new(SlotInner {
                sample: None,
                sample_name: None,
                path: None,
                voice: Voice::new(),
                clock: Weak::new(),
                looping: false,
                volume: 1.0,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Decodes a file and makes it this slot's sample, stopping anything in flight first. On
    /// failure the previous sample and play state are left untouched.
    pub fn load_sample_from_file(&self, path: &Path) -> Result<(), LoadError> {
        let sample = self.loader.load(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.replace_sample(sample, name, Some(path.to_path_buf()));
        Ok(())
    }

    /// Makes an already decoded sample this slot's sample, stopping anything in flight first.
    pub fn load_sample(&self, sample: LoadedSample, name: &str) {
        self.replace_sample(sample, name.to_string(), None);
    }

    fn replace_sample(&self, sample: LoadedSample, name: String, path: Option<PathBuf>) {
        let mut inner = self.inner.lock();
        if inner.voice.stop().is_some() {
            debug!(slot = self.index, "Stopped playback to swap sample");
        }
        info!(
            slot = self.index,
            sample = name,
            frames = sample.frame_count(),
            "Sample loaded into slot"
        );
        inner.sample = Some(sample);
        inner.sample_name = Some(name);
        inner.path = path;
        drop(inner);

        self.loader.evict_unused();
    }

    /// Starts the sample immediately from the beginning. A slot that is already playing or
    /// waiting for a boundary restarts from zero.
    pub fn play(&self) -> Result<SlotAction, SlotError> {
        let mut inner = self.inner.lock();
        self.start(&mut inner, StartAt::Now)
    }

    /// Revokes a pending start and stops any in-flight playback. Returns what the stop
    /// interrupted: `Pending` if it won the race against the bar boundary, `Playing` if the
    /// renderer had already committed the start. Stopping an idle slot does nothing and returns
    /// `None`.
    pub fn stop(&self) -> Option<SlotState> {
        let mut inner = self.inner.lock();
        let from = match inner.voice.stop()? {
            PlayState::Scheduled => SlotState::Pending,
            PlayState::Playing => SlotState::Playing,
            PlayState::Finished | PlayState::Cancelled => return None,
        };
        debug!(slot = self.index, from = %from, "Slot stopped");
        Some(from)
    }

    /// Stops the slot if it is playing, otherwise plays it.
    pub fn toggle(&self) -> Result<SlotAction, SlotError> {
        let mut inner = self.inner.lock();
        if inner.state() == SlotState::Playing {
            inner.voice.stop();
            debug!(slot = self.index, "Slot toggled off");
            Ok(SlotAction::Stopped)
        } else {
            self.start(&mut inner, StartAt::Now)
        }
    }

    /// Schedules the sample to start exactly on the next bar boundary. Without a started
    /// transport clock this plays immediately instead.
    pub fn play_at_next_bar_boundary(&self) -> Result<SlotAction, SlotError> {
        let mut inner = self.inner.lock();
        self.start_quantized(&mut inner)
    }

    /// Stops the slot if it is playing or pending, otherwise schedules it for the next bar.
    pub fn toggle_quantized(&self) -> Result<SlotAction, SlotError> {
        let mut inner = self.inner.lock();
        match inner.state() {
            SlotState::Playing | SlotState::Pending => {
                inner.voice.stop();
                debug!(slot = self.index, "Slot toggled off");
                Ok(SlotAction::Stopped)
            }
            SlotState::Idle => self.start_quantized(&mut inner),
        }
    }

    fn start_quantized(&self, inner: &mut SlotInner) -> Result<SlotAction, SlotError> {
        let Some(clock) = inner.clock.upgrade() else {
            debug!(
                slot = self.index,
                "No transport clock, playing immediately"
            );
            return self.start(inner, StartAt::Now);
        };

        match clock.next_bar_boundary() {
            Ok(boundary) => self.start(inner, StartAt::Sample(boundary)),
            Err(e) => {
                warn!(
                    slot = self.index,
                    err = %e,
                    "Quantization unavailable, playing immediately"
                );
                self.start(inner, StartAt::Now)
            }
        }
    }

    fn start(&self, inner: &mut SlotInner, start_at: StartAt) -> Result<SlotAction, SlotError> {
        let sample = inner.sample.clone().ok_or(SlotError::Empty(self.index))?;
        let (looping, volume) = (inner.looping, inner.volume);
        inner
            .voice
            .schedule_start(&sample, start_at, looping, volume)
            .map_err(|source| SlotError::Scheduling {
                index: self.index,
                source,
            })?;

        Ok(match start_at {
            StartAt::Now => {
                debug!(slot = self.index, "Slot started");
                SlotAction::Started
            }
            StartAt::Sample(at) => {
                debug!(slot = self.index, at, "Slot scheduled");
                SlotAction::Scheduled { at }
            }
        })
    }

    pub fn state(&self) -> SlotState {
        self.inner.lock().state()
    }

    /// True from the moment playback is committed until it is stopped or reaches the end.
    pub fn is_playing(&self) -> bool {
        self.state() == SlotState::Playing
    }

    /// True between a quantized request and its bar boundary.
    pub fn is_pending(&self) -> bool {
        self.state() == SlotState::Pending
    }

    /// Fraction of the sample played, in [0, 1]. Zero while idle or pending; a one-shot that ran
    /// to the end holds at 1.0 until it is played or stopped again.
    pub fn current_progress(&self) -> f64 {
        self.inner
            .lock()
            .voice
            .handle()
            .map(|handle| handle.progress())
            .unwrap_or(0.0)
    }

    /// Render sample at which the current playback began, if it has.
    pub fn started_at(&self) -> Option<u64> {
        self.inner
            .lock()
            .voice
            .handle()
            .and_then(|handle| handle.started_at())
    }

    pub fn sample_name(&self) -> Option<String> {
        self.inner.lock().sample_name.clone()
    }

    pub fn sample_path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    pub fn has_sample(&self) -> bool {
        self.inner.lock().sample.is_some()
    }

    /// Sets the clock used for quantized starts. Only a weak reference is kept; once the clock
    /// is dropped, quantized starts fall back to immediate ones.
    pub fn set_transport_clock(&self, clock: &Arc<TransportClock>) {
        self.inner.lock().clock = Arc::downgrade(clock);
    }

    /// Applies to the next playback.
    pub fn set_looping(&self, looping: bool) {
        self.inner.lock().looping = looping;
    }

    /// Applies to the next playback.
    pub fn set_volume(&self, volume: f32) {
        self.inner.lock().volume = volume;
    }

    pub fn attach(&self, mixer: &AudioMixer) {
        self.inner.lock().voice.attach(mixer);
    }

    pub fn detach(&self) {
        self.inner.lock().voice.detach();
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().voice.is_attached()
    }
}

impl fmt::Display for SampleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, state, progress) = {
            let inner = self.inner.lock();
            let progress = inner
                .voice
                .handle()
                .map(|handle| handle.progress())
                .unwrap_or(0.0);
            (inner.sample_name.clone(), inner.state(), progress)
        };
        match name {
            Some(name) => write!(
                f,
                "{:>2}: {} [{}, {:.0}%]",
                self.index,
                name,
                state,
                progress * 100.0
            ),
            None => write!(f, "{:>2}: <empty>", self.index),
        }
    }
}
