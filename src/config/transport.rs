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
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_BPM: f64 = 120.0;
const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Tempo and bar length for the session.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Transport {
    /// Beats per minute (default: 120).
    bpm: Option<f64>,

    /// Beats in a bar (default: 4).
    beats_per_bar: Option<u32>,
}

impl Transport {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Transport {
        Transport {
            bpm: Some(bpm),
            beats_per_bar: Some(beats_per_bar),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.unwrap_or(DEFAULT_BEATS_PER_BAR)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !self.bpm().is_finite() || self.bpm() <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "bpm must be positive, got {}",
                self.bpm()
            )));
        }
        if self.beats_per_bar() == 0 {
            return Err(ConfigError::Invalid(
                "beats_per_bar must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
