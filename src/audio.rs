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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;

pub use mixer::{AudioMixer, Renderer};

/// A sample-accurate render timeline.
pub trait ClockSource: Send + Sync {
    /// Sample rate of the timeline in Hz.
    fn sample_rate(&self) -> u32;

    /// Current position of the render timeline in samples, or `None` if nothing is rendering.
    fn sample_time(&self) -> Option<u64>;
}

/// An audio output device that renders an audio graph.
pub trait Device: fmt::Display + Send + Sync {
    /// The audio graph fed by this device.
    fn mixer(&self) -> &AudioMixer;
}

/// Describes an available output device.
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.channels(),
            config.sample_rate(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
