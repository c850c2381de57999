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

//! Musical time derived from the render timeline.
//!
//! The transport clock turns a fixed tempo and bar length into bar positions and bar boundary
//! timestamps on the audio graph's sample clock. Everything except the origin is immutable, and
//! the origin is a single atomic, so queries are safe from any thread and never block.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::{info, warn};

use crate::audio::ClockSource;

const NOT_STARTED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ClockError {
    #[error("transport clock has not been started")]
    NotStarted,

    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),

    #[error("a bar must have at least one beat")]
    InvalidBeatsPerBar,
}

/// A fixed-tempo bar clock over a render timeline.
pub struct TransportClock {
    bpm: f64,
    beats_per_bar: u32,
    sample_rate: u32,
    source: Arc<dyn ClockSource>,
    /// Render sample that is bar 0, beat 0.
    origin: AtomicU64,
}

impl TransportClock {
    /// Creates a new transport clock. The sample rate is taken from the clock source.
    pub fn new(
        source: Arc<dyn ClockSource>,
        bpm: f64,
        beats_per_bar: u32,
    ) -> Result<TransportClock, ClockError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ClockError::InvalidTempo(bpm));
        }
        if beats_per_bar == 0 {
            return Err(ClockError::InvalidBeatsPerBar);
        }

        Ok(TransportClock {
            bpm,
            beats_per_bar,
            sample_rate: source.sample_rate(),
            source,
            origin: AtomicU64::new(NOT_STARTED),
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per beat: `sample_rate * 60 / bpm`.
    pub fn samples_per_beat(&self) -> f64 {
        self.sample_rate as f64 * 60.0 / self.bpm
    }

    /// Samples per bar.
    pub fn samples_per_bar(&self) -> f64 {
        self.samples_per_beat() * self.beats_per_bar as f64
    }

    /// Captures the current render position as the origin of bar 0.
    ///
    /// Call exactly once, after the audio graph has started rendering. Calling it again moves
    /// the origin, which shifts every bar boundary; that is logged as a caller error.
    pub fn start(&self) -> Result<u64, ClockError> {
        let now = self.source.sample_time().ok_or(ClockError::NotStarted)?;
        let previous = self.origin.swap(now, Ordering::AcqRel);
        if previous != NOT_STARTED {
            warn!(
                previous_origin = previous,
                origin = now,
                "Transport clock restarted, bar boundaries have moved"
            );
        }

        info!(
            bpm = self.bpm,
            beats_per_bar = self.beats_per_bar,
            sample_rate = self.sample_rate,
            origin = now,
            "Transport clock started"
        );
        Ok(now)
    }

    /// Returns the origin, if the clock has been started.
    pub fn origin(&self) -> Option<u64> {
        match self.origin.load(Ordering::Acquire) {
            NOT_STARTED => None,
            origin => Some(origin),
        }
    }

    /// Returns true if the clock has been started and the render timeline is live.
    pub fn is_started(&self) -> bool {
        self.origin().is_some() && self.source.sample_time().is_some()
    }

    /// Reads the render position and origin together.
    fn now_and_origin(&self) -> Result<(u64, u64), ClockError> {
        let origin = self.origin().ok_or(ClockError::NotStarted)?;
        let now = self.source.sample_time().ok_or(ClockError::NotStarted)?;
        Ok((now, origin))
    }

    /// Current position in bars since the origin.
    pub fn current_bar_position(&self) -> Result<f64, ClockError> {
        let (now, origin) = self.now_and_origin()?;
        Ok(now.saturating_sub(origin) as f64 / self.samples_per_beat() / self.beats_per_bar as f64)
    }

    /// Render sample of the start of bar `bar`.
    pub fn bar_boundary(&self, bar: u64) -> Result<u64, ClockError> {
        let origin = self.origin().ok_or(ClockError::NotStarted)?;
        Ok(origin + (bar as f64 * self.samples_per_bar()).round() as u64)
    }

    /// Render sample of the next bar boundary strictly in the future.
    pub fn next_bar_boundary(&self) -> Result<u64, ClockError> {
        let (now, _) = self.now_and_origin()?;
        self.next_bar_boundary_after(now)
    }

    /// Render sample of the first bar boundary strictly after `sample`. A sample sitting exactly
    /// on a boundary yields the following one, so a quantized start is never scheduled for an
    /// instant the renderer has already reached.
    pub fn next_bar_boundary_after(&self, sample: u64) -> Result<u64, ClockError> {
        let origin = self.origin().ok_or(ClockError::NotStarted)?;
        if sample < origin {
            return Ok(origin);
        }

        let elapsed = (sample - origin) as f64;
        let mut bar = (elapsed / self.samples_per_bar()).floor() as u64 + 1;
        let mut boundary = self.bar_boundary(bar)?;
        // Rounding can land the candidate on or before `sample` for fractional bar lengths.
        while boundary <= sample {
            bar += 1;
            boundary = self.bar_boundary(bar)?;
        }
        Ok(boundary)
    }

    /// Converts a span of render samples to wall time.
    pub fn samples_to_duration(&self, samples: u64) -> Duration {
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

impl fmt::Debug for TransportClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClock")
            .field("bpm", &self.bpm)
            .field("beats_per_bar", &self.beats_per_bar)
            .field("sample_rate", &self.sample_rate)
            .field("origin", &self.origin())
            .finish()
    }
}
