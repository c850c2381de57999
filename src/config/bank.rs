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
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_CAPACITY: usize = 16;

/// The sample bank: how many slots it has and what is loaded into them.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Bank {
    /// Number of slots (default: 16).
    capacity: Option<usize>,

    /// Samples to load at startup.
    #[serde(default)]
    slots: Vec<Slot>,
}

/// A sample assigned to a slot.
#[derive(Deserialize, Clone, Debug)]
pub struct Slot {
    index: usize,

    /// Path to the sample. Relative paths are relative to the config file.
    file: PathBuf,

    /// Loop instead of stopping at the end (default: false).
    #[serde(rename = "loop")]
    looping: Option<bool>,

    /// Linear gain (default: 1.0).
    volume: Option<f32>,
}

impl Bank {
    pub fn new(capacity: usize, slots: Vec<Slot>) -> Bank {
        Bank {
            capacity: Some(capacity),
            slots,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_CAPACITY)
    }

    /// The capacity, once validated.
    pub fn nonzero_capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.capacity())
            .ok_or_else(|| ConfigError::Invalid("bank capacity must be at least 1".into()))
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.nonzero_capacity()?.get();
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if slot.index >= capacity {
                return Err(ConfigError::Invalid(format!(
                    "slot {} is out of range for a bank of {} slots",
                    slot.index, capacity
                )));
            }
            if !seen.insert(slot.index) {
                return Err(ConfigError::Invalid(format!(
                    "slot {} is assigned more than once",
                    slot.index
                )));
            }
            if !slot.volume().is_finite() || slot.volume() < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "slot {} has an invalid volume {}",
                    slot.index,
                    slot.volume()
                )));
            }
        }
        Ok(())
    }
}

impl Slot {
    pub fn new(index: usize, file: &str) -> Slot {
        Slot {
            index,
            file: PathBuf::from(file),
            looping: None,
            volume: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The sample path, resolved against the directory holding the config file.
    pub fn resolved_file(&self, base_dir: &Path) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            base_dir.join(&self.file)
        }
    }

    pub fn looping(&self) -> bool {
        self.looping.unwrap_or(false)
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(1.0)
    }
}
