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
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

const SCHEDULED: u8 = 0;
const PLAYING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

/// Sentinel for "the render thread has not begun this playback yet".
const NOT_STARTED: u64 = u64::MAX;

/// The lifecycle of a single scheduled playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// Waiting for its start sample to come around in the render timeline.
    Scheduled,
    /// Committed to playing. The render thread may not have reached it yet.
    Playing,
    /// Reached the end of a one-shot buffer.
    Finished,
    /// Revoked by the control side. Never leaves this state.
    Cancelled,
}

impl PlayState {
    fn from_u8(value: u8) -> PlayState {
        match value {
            SCHEDULED => PlayState::Scheduled,
            PLAYING => PlayState::Playing,
            FINISHED => PlayState::Finished,
            _ => PlayState::Cancelled,
        }
    }
}

/// A play handle is shared between the control side that requested a playback and the render
/// thread that carries it out. All transitions are single atomic operations on one state word,
/// so neither side ever waits on the other and a cancel can never be half-applied.
///
/// The render thread may only move `Scheduled -> Playing` and `Playing -> Finished`. The control
/// side may only move `Scheduled | Playing -> Cancelled`. Whichever compare-and-swap lands first
/// wins, which is what makes a cancel racing a bar boundary well defined.
#[derive(Debug)]
pub struct PlayHandle {
    state: AtomicU8,
    /// Render sample at which the first frame was mixed.
    started_at: AtomicU64,
    /// Frames mixed so far, across loop passes.
    frames_played: AtomicU64,
    /// Length of the buffer being played, in frames.
    total_frames: u64,
    looping: bool,
}

impl PlayHandle {
    /// Creates a handle for a playback that starts as soon as the render thread sees it.
    pub fn immediate(total_frames: u64, looping: bool) -> PlayHandle {
        PlayHandle::new(PLAYING, total_frames, looping)
    }

    /// Creates a handle for a playback deferred to a future render sample.
    pub fn scheduled(total_frames: u64, looping: bool) -> PlayHandle {
        PlayHandle::new(SCHEDULED, total_frames, looping)
    }

    fn new(state: u8, total_frames: u64, looping: bool) -> PlayHandle {
        PlayHandle {
            state: AtomicU8::new(state),
            started_at: AtomicU64::new(NOT_STARTED),
            frames_played: AtomicU64::new(0),
            total_frames,
            looping,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true if the playback loops instead of finishing.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Revokes the playback. Returns the state it was revoked from, or `None` if it had already
    /// finished or been cancelled.
    pub fn cancel(&self) -> Option<PlayState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match state {
                SCHEDULED | PLAYING => Some(CANCELLED),
                _ => None,
            })
            .ok()
            .map(PlayState::from_u8)
    }

    /// Marks the first mixed frame. Returns false if the playback was cancelled first, in which
    /// case the render thread must not mix anything.
    pub(crate) fn begin(&self, at_sample: u64) -> bool {
        let began = match self.state.compare_exchange(
            SCHEDULED,
            PLAYING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current == PLAYING,
        };
        if began {
            self.started_at.store(at_sample, Ordering::Release);
        }
        began
    }

    /// Records frames mixed in the last block.
    pub(crate) fn advance(&self, frames: u64) {
        self.frames_played.fetch_add(frames, Ordering::AcqRel);
    }

    /// Marks natural end of buffer. A cancel that landed first is left alone.
    pub(crate) fn finish(&self) {
        let _ = self
            .state
            .compare_exchange(PLAYING, FINISHED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Returns the render sample at which playback began, if it has.
    pub fn started_at(&self) -> Option<u64> {
        match self.started_at.load(Ordering::Acquire) {
            NOT_STARTED => None,
            sample => Some(sample),
        }
    }

    /// Returns the number of frames mixed so far.
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    /// Returns the buffer length in frames.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Playback progress in [0, 1]. Looping playbacks report their position within the loop.
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }

        match self.state() {
            PlayState::Scheduled | PlayState::Cancelled => 0.0,
            PlayState::Finished => 1.0,
            PlayState::Playing => {
                let played = self.frames_played();
                if self.looping {
                    (played % self.total_frames) as f64 / self.total_frames as f64
                } else {
                    (played as f64 / self.total_frames as f64).min(1.0)
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_cancel_scheduled_prevents_begin() {
        let handle = PlayHandle::scheduled(100, false);
        assert_eq!(Some(PlayState::Scheduled), handle.cancel());
        assert!(!handle.begin(10));
        assert_eq!(PlayState::Cancelled, handle.state());
        assert_eq!(None, handle.started_at());

        // Cancelling twice is a no-op.
        assert_eq!(None, handle.cancel());
    }

    #[test]
    fn test_begin_then_cancel() {
        let handle = PlayHandle::scheduled(100, false);
        assert!(handle.begin(42));
        assert_eq!(PlayState::Playing, handle.state());
        assert_eq!(Some(42), handle.started_at());
        assert_eq!(Some(PlayState::Playing), handle.cancel());
        assert_eq!(0.0, handle.progress());
    }

    #[test]
    fn test_finish_does_not_override_cancel() {
        let handle = PlayHandle::immediate(100, false);
        assert!(handle.begin(0));
        handle.cancel();
        handle.finish();
        assert_eq!(PlayState::Cancelled, handle.state());
    }

    #[test]
    fn test_progress() {
        let handle = PlayHandle::immediate(100, false);
        assert!(handle.begin(0));
        handle.advance(25);
        assert_eq!(0.25, handle.progress());
        handle.advance(75);
        handle.finish();
        assert_eq!(1.0, handle.progress());

        let looping = PlayHandle::immediate(100, true);
        assert!(looping.begin(0));
        looping.advance(150);
        assert_eq!(0.5, looping.progress());
    }

    #[test]
    fn test_cancel_races_begin() {
        // Whichever side lands first, the handle ends in a state both sides agree on.
        for _ in 0..200 {
            let handle = Arc::new(PlayHandle::scheduled(10, false));
            let join = {
                let handle = handle.clone();
                thread::spawn(move || handle.begin(7))
            };
            let cancelled_from = handle.cancel();
            let began = join.join().expect("render thread panicked");

            assert_eq!(PlayState::Cancelled, handle.state());
            match cancelled_from {
                Some(PlayState::Scheduled) => assert!(!began),
                Some(PlayState::Playing) => assert!(began),
                other => panic!("unexpected cancel result {:?}", other),
            }
        }
    }
}
