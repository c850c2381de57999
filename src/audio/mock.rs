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
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use super::mixer::{AudioMixer, Renderer};

/// An offline device. Nothing is rendered until the caller asks for it, which makes the render
/// timeline fully deterministic.
pub struct Device {
    name: String,
    mixer: AudioMixer,
    /// Only the thread driving `render` takes this lock; it plays the role of the audio callback.
    renderer: Mutex<Renderer>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, num_channels: u16, sample_rate: u32) -> Device {
        let (mixer, renderer) = AudioMixer::new(num_channels, sample_rate);
        debug!(name, num_channels, sample_rate, "Created mock audio device");
        Device {
            name: name.to_string(),
            mixer,
            renderer: Mutex::new(renderer),
        }
    }

    /// Renders the given number of frames and returns the interleaved output.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * self.mixer.num_channels() as usize];
        self.renderer.lock().render(&mut output);
        output
    }

    /// Renders `blocks` consecutive blocks of `block_frames` frames each, the way an audio
    /// callback would, and returns all of the output.
    pub fn render_blocks(&self, blocks: usize, block_frames: usize) -> Vec<f32> {
        let mut output =
            Vec::with_capacity(blocks * block_frames * self.mixer.num_channels() as usize);
        for _ in 0..blocks {
            output.extend(self.render(block_frames));
        }
        output
    }

    /// Number of sources the renderer is tracking.
    pub fn active_count(&self) -> usize {
        self.renderer.lock().active_count()
    }
}

impl super::Device for Device {
    fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::ClockSource;

    #[test]
    fn test_render_blocks() {
        let device = Device::get("mock-device", 2, 48000);
        assert_eq!(None, device.mixer.sample_time());

        let output = device.render_blocks(4, 128);
        assert_eq!(4 * 128 * 2, output.len());
        assert!(output.iter().all(|sample| *sample == 0.0));
        assert_eq!(Some(512), device.mixer.sample_time());
        assert_eq!("mock-device (Mock)", device.to_string());
    }
}
