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
// Core audio mixing logic shared by the cpal backend and the offline test device.
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender};

use super::ClockSource;
use crate::playsync::PlayHandle;
use crate::samples::{LoadedSample, SchedulingError};

/// Global counter for telling audio graphs apart.
static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Initial room for concurrently active sources, so the render thread rarely reallocates.
const ACTIVE_SOURCE_CAPACITY: usize = 64;

/// A playback request handed from the control side to the render thread.
pub struct ScheduledSource {
    /// Shared play state.
    pub handle: Arc<PlayHandle>,
    /// The audio to play.
    pub sample: LoadedSample,
    /// Render sample to start at. `None` starts at the next rendered block.
    pub start_at: Option<u64>,
    /// Linear gain applied to every sample.
    pub volume: f32,
}

pub type SourceSender = Sender<ScheduledSource>;

/// State shared between every handle to a graph and its renderer.
struct Shared {
    id: u64,
    num_channels: u16,
    sample_rate: u32,
    /// Render position: the sample index of the next frame to be rendered.
    current_sample: AtomicU64,
    /// True once the renderer has produced its first block.
    running: AtomicBool,
    /// Set by `shutdown` and never cleared.
    shut_down: AtomicBool,
}

/// The control-side handle to an audio graph. Cheap to clone. Scheduling goes through a
/// lock-free channel and the render position is a single atomic, so nothing here ever contends
/// with the render thread.
#[derive(Clone)]
pub struct AudioMixer {
    shared: Arc<Shared>,
    source_tx: SourceSender,
}

/// The render-side half of an audio graph. Owned by whichever thread runs the audio callback;
/// it is the only place active sources live.
pub struct Renderer {
    shared: Arc<Shared>,
    source_rx: Receiver<ScheduledSource>,
    active: Vec<ActiveSource>,
}

/// A source the renderer is currently tracking.
struct ActiveSource {
    source: ScheduledSource,
    /// Next frame index within the sample.
    position: usize,
    started: bool,
}

impl AudioMixer {
    /// Creates a new audio graph, returning the control handle and its renderer.
    pub fn new(num_channels: u16, sample_rate: u32) -> (AudioMixer, Renderer) {
        let shared = Arc::new(Shared {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            num_channels,
            sample_rate,
            current_sample: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });
        let (source_tx, source_rx) = crossbeam_channel::unbounded();

        (
            AudioMixer {
                shared: shared.clone(),
                source_tx,
            },
            Renderer {
                shared,
                source_rx,
                active: Vec::with_capacity(ACTIVE_SOURCE_CAPACITY),
            },
        )
    }

    /// Unique ID of this graph.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.shared.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// The sample index of the next frame the renderer will produce.
    pub fn current_sample(&self) -> u64 {
        self.shared.current_sample.load(Ordering::Acquire)
    }

    /// Returns true while the renderer is producing audio.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
            && !self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Marks the graph as decommissioned. Its render timeline is no longer available, and any
    /// block rendered afterwards is silent.
    pub fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::Release);
    }

    /// Hands a source to the render thread.
    pub fn schedule(&self, source: ScheduledSource) -> Result<(), SchedulingError> {
        self.source_tx
            .send(source)
            .map_err(|_| SchedulingError::GraphStopped)
    }
}

impl ClockSource for AudioMixer {
    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    fn sample_time(&self) -> Option<u64> {
        if self.is_running() {
            Some(self.current_sample())
        } else {
            None
        }
    }
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("id", &self.shared.id)
            .field("num_channels", &self.shared.num_channels)
            .field("sample_rate", &self.shared.sample_rate)
            .field("current_sample", &self.current_sample())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Renderer {
    /// Renders one block of interleaved audio into `output` and advances the render timeline by
    /// the number of frames in the block. This is the audio callback: it never blocks.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let channels = self.shared.num_channels as usize;
        if channels == 0 || self.shared.shut_down.load(Ordering::Acquire) {
            return;
        }
        let frames = output.len() / channels;
        let block_start = self.shared.current_sample.load(Ordering::Acquire);
        self.shared.running.store(true, Ordering::Release);

        while let Ok(source) = self.source_rx.try_recv() {
            self.active.push(ActiveSource {
                source,
                position: 0,
                started: false,
            });
        }

        self.active
            .retain_mut(|active| active.render_into(output, channels, block_start, frames));

        self.shared
            .current_sample
            .store(block_start + frames as u64, Ordering::Release);
    }

    /// Number of sources the renderer is tracking, including ones waiting for their start.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl ActiveSource {
    /// Mixes this source into the block. Returns false once the source should be dropped.
    fn render_into(
        &mut self,
        output: &mut [f32],
        channels: usize,
        block_start: u64,
        frames: usize,
    ) -> bool {
        let handle = &self.source.handle;
        if matches!(
            handle.state(),
            crate::playsync::PlayState::Cancelled | crate::playsync::PlayState::Finished
        ) {
            return false;
        }

        let mut offset = 0;
        if !self.started {
            // A start that is already behind us plays from the top of this block.
            let start = self.source.start_at.unwrap_or(block_start).max(block_start);
            if start >= block_start + frames as u64 {
                return true;
            }
            offset = (start - block_start) as usize;
            if !handle.begin(start) {
                return false;
            }
            self.started = true;
        }

        let sample = &self.source.sample;
        let total = sample.frame_count();
        if total == 0 {
            handle.finish();
            return false;
        }
        let source_channels = sample.channel_count() as usize;
        let data = sample.data();
        let volume = self.source.volume;

        let mut rendered = 0;
        for frame in offset..frames {
            if self.position >= total {
                if handle.is_looping() {
                    self.position = 0;
                } else {
                    break;
                }
            }

            let base = self.position * source_channels;
            let out = &mut output[frame * channels..(frame + 1) * channels];
            for (channel, out_sample) in out.iter_mut().enumerate() {
                // Mono sources feed every output; otherwise channels map one to one.
                let source_channel = if source_channels == 1 {
                    0
                } else if channel < source_channels {
                    channel
                } else {
                    continue;
                };
                *out_sample += data[base + source_channel] * volume;
            }

            self.position += 1;
            rendered += 1;
        }
        handle.advance(rendered);

        if !handle.is_looping() && self.position >= total {
            handle.finish();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playsync::PlayState;

    fn constant_sample(value: f32, frames: usize, channels: u16) -> LoadedSample {
        LoadedSample::from_interleaved(vec![value; frames * channels as usize], channels, 48000)
    }

    fn schedule(
        mixer: &AudioMixer,
        sample: &LoadedSample,
        start_at: Option<u64>,
        looping: bool,
    ) -> Arc<PlayHandle> {
        let handle = Arc::new(match start_at {
            Some(_) => PlayHandle::scheduled(sample.frame_count() as u64, looping),
            None => PlayHandle::immediate(sample.frame_count() as u64, looping),
        });
        mixer
            .schedule(ScheduledSource {
                handle: handle.clone(),
                sample: sample.clone(),
                start_at,
                volume: 1.0,
            })
            .expect("schedule failed");
        handle
    }

    #[test]
    fn test_render_advances_timeline() {
        let (mixer, mut renderer) = AudioMixer::new(2, 48000);
        assert!(!mixer.is_running());
        assert_eq!(None, mixer.sample_time());

        let mut block = vec![0.0; 256 * 2];
        renderer.render(&mut block);
        assert!(mixer.is_running());
        assert_eq!(256, mixer.current_sample());
        assert_eq!(Some(256), mixer.sample_time());

        mixer.shutdown();
        assert_eq!(None, mixer.sample_time());

        // A callback that fires after shutdown can't bring the timeline back.
        let handle = schedule(&mixer, &constant_sample(0.5, 1000, 2), None, false);
        renderer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
        assert!(!mixer.is_running());
        assert_eq!(None, mixer.sample_time());
        assert_eq!(0, handle.frames_played());
    }

    #[test]
    fn test_immediate_mono_source_feeds_all_channels() {
        let (mixer, mut renderer) = AudioMixer::new(2, 48000);
        let sample = constant_sample(0.5, 4, 1);
        let handle = schedule(&mixer, &sample, None, false);

        let mut block = vec![0.0; 8 * 2];
        renderer.render(&mut block);

        assert_eq!(&[0.5; 8], &block[..8]);
        assert_eq!(&[0.0; 8], &block[8..]);
        assert_eq!(PlayState::Finished, handle.state());
        assert_eq!(Some(0), handle.started_at());
        assert_eq!(4, handle.frames_played());
        assert_eq!(0, renderer.active_count());
    }

    #[test]
    fn test_scheduled_source_starts_mid_block() {
        let (mixer, mut renderer) = AudioMixer::new(1, 48000);
        let sample = constant_sample(1.0, 100, 1);
        let handle = schedule(&mixer, &sample, Some(12), false);

        let mut block = vec![0.0; 8];
        renderer.render(&mut block);
        assert_eq!(vec![0.0; 8], block);
        assert_eq!(PlayState::Scheduled, handle.state());

        renderer.render(&mut block);
        assert_eq!(&[0.0; 4], &block[..4]);
        assert_eq!(&[1.0; 4], &block[4..]);
        assert_eq!(PlayState::Playing, handle.state());
        assert_eq!(Some(12), handle.started_at());
        assert_eq!(4, handle.frames_played());
    }

    #[test]
    fn test_cancelled_source_is_silent() {
        let (mixer, mut renderer) = AudioMixer::new(1, 48000);
        let sample = constant_sample(1.0, 100, 1);
        let handle = schedule(&mixer, &sample, Some(4), false);
        handle.cancel();

        let mut block = vec![0.0; 16];
        renderer.render(&mut block);
        assert_eq!(vec![0.0; 16], block);
        assert_eq!(None, handle.started_at());
        assert_eq!(0, renderer.active_count());
    }

    #[test]
    fn test_looping_source_wraps() {
        let (mixer, mut renderer) = AudioMixer::new(1, 48000);
        let sample = LoadedSample::from_interleaved(vec![0.1, 0.2, 0.3], 1, 48000);
        let handle = schedule(&mixer, &sample, None, true);

        let mut block = vec![0.0; 7];
        renderer.render(&mut block);
        assert_eq!(vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1], block);
        assert_eq!(PlayState::Playing, handle.state());
        assert_eq!(1, renderer.active_count());
    }

    #[test]
    fn test_stereo_source_into_wider_output() {
        let (mixer, mut renderer) = AudioMixer::new(4, 48000);
        let sample = LoadedSample::from_interleaved(vec![0.25, -0.25], 2, 48000);
        schedule(&mixer, &sample, None, false);

        let mut block = vec![0.0; 4];
        renderer.render(&mut block);
        assert_eq!(vec![0.25, -0.25, 0.0, 0.0], block);
    }

    #[test]
    fn test_schedule_after_renderer_dropped() {
        let (mixer, renderer) = AudioMixer::new(2, 48000);
        drop(renderer);

        let sample = constant_sample(1.0, 4, 1);
        let result = mixer.schedule(ScheduledSource {
            handle: Arc::new(PlayHandle::immediate(4, false)),
            sample,
            start_at: None,
            volume: 1.0,
        });
        assert!(matches!(result, Err(SchedulingError::GraphStopped)));
    }
}
