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
use crate::trigger::TriggerMode;

const DEFAULT_BASE_NOTE: u8 = 36;

/// A YAML representation of the MIDI input configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Midi {
    /// The MIDI input device. Any device whose name contains this string matches.
    device: String,

    /// The note that maps to slot 0 (default: 36).
    base_note: Option<u8>,

    /// The channel to listen on, 1 through 16. All channels when unset.
    channel: Option<u8>,

    /// Whether notes toggle slots right away or on the next bar (default: quantized).
    trigger: Option<TriggerMode>,
}

impl Midi {
    pub fn new(device: &str) -> Midi {
        Midi {
            device: device.to_string(),
            base_note: None,
            channel: None,
            trigger: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn base_note(&self) -> u8 {
        self.base_note.unwrap_or(DEFAULT_BASE_NOTE)
    }

    /// The zero-indexed channel to listen on, or `None` for every channel.
    pub fn channel(&self) -> Option<u8> {
        self.channel.map(|channel| channel.saturating_sub(1))
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger.unwrap_or_default()
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.base_note() > 127 {
            return Err(ConfigError::Invalid(format!(
                "base note {} is not a MIDI note",
                self.base_note()
            )));
        }
        if let Some(channel) = self.channel {
            if !(1..=16).contains(&channel) {
                return Err(ConfigError::Invalid(format!(
                    "MIDI channel must be between 1 and 16, got {}",
                    channel
                )));
            }
        }
        Ok(())
    }
}
