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
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::audio::Audio;
use super::bank::Bank;
use super::error::ConfigError;
use super::midi::Midi;
use super::transport::Transport;

/// The top level launcher configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Launcher {
    audio: Audio,

    #[serde(default)]
    transport: Transport,

    midi: Option<Midi>,

    #[serde(default)]
    bank: Bank,

    /// Directory sample paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Launcher {
    pub fn new(
        audio: Audio,
        transport: Transport,
        midi: Option<Midi>,
        bank: Bank,
        base_dir: &Path,
    ) -> Launcher {
        Launcher {
            audio,
            transport,
            midi,
            bank,
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Parses and validates a launcher config from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Launcher, ConfigError> {
        let mut launcher = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Launcher>()?;
        launcher.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        launcher.validate()?;
        Ok(launcher)
    }

    /// Parses and validates a launcher config from a YAML string.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Launcher, ConfigError> {
        let mut launcher = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Launcher>()?;
        launcher.base_dir = base_dir.to_path_buf();
        launcher.validate()?;
        Ok(launcher)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.transport.validate()?;
        if let Some(midi) = &self.midi {
            midi.validate()?;
        }
        self.bank.validate()
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
