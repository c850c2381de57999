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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::mixer::{AudioMixer, Renderer};
use super::DeviceInfo;
use crate::config;

/// How often the output thread checks whether it should tear the stream down.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A cpal output device driving an audio graph. The stream lives on its own thread, since cpal
/// streams are not `Send` on every platform.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host name of the device.
    host: String,
    /// The audio graph rendered by the stream.
    mixer: AudioMixer,
    /// Tells the output thread to drop the stream.
    closed: Arc<AtomicBool>,
    /// Handle to the output thread (keeps it alive).
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.mixer.num_channels(),
            self.host
        )
    }
}

/// Builds an output stream whose callback renders the graph and converts to the device format.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() != data.len() {
                scratch.resize(data.len(), 0.0);
            }
            renderer.render(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!(err = err.to_string(), "CPAL output stream error"),
        None,
    )
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|(info, _)| info)
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push((
                        DeviceInfo {
                            name: device.name()?,
                            host: host_id.name().to_string(),
                            max_channels,
                        },
                        device,
                    ));
                }
            }
        }

        devices.sort_by_key(|(info, _)| info.name.to_string());
        Ok(devices)
    }

    /// Finds the configured device. "default" selects the default output of the default host.
    fn find(name: &str) -> Result<(String, String, cpal::Device), Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device available")?;
            return Ok((device.name()?, host.id().name().to_string(), device));
        }

        match Device::list_cpal_devices()?
            .into_iter()
            .find(|(info, _)| info.name.trim() == name)
        {
            Some((info, device)) => Ok((info.name, info.host, device)),
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    /// Opens the configured device and starts rendering a fresh audio graph through it.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let (name, host, device) = Device::find(config.device())?;
        let sample_format = device.default_output_config()?.sample_format();
        let num_channels = config.channels();
        let sample_rate = config.sample_rate();

        let (mixer, renderer) = AudioMixer::new(num_channels, sample_rate);
        let closed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let output_thread = {
            let closed = closed.clone();
            thread::spawn(move || {
                let stream_config = cpal::StreamConfig {
                    channels: num_channels,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_stream::<f32>(&device, &stream_config, renderer)
                    }
                    cpal::SampleFormat::I16 => {
                        build_stream::<i16>(&device, &stream_config, renderer)
                    }
                    cpal::SampleFormat::I32 => {
                        build_stream::<i32>(&device, &stream_config, renderer)
                    }
                    cpal::SampleFormat::U16 => {
                        build_stream::<u16>(&device, &stream_config, renderer)
                    }
                    other => {
                        let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the device is dropped.
                while !closed.load(Ordering::Relaxed) {
                    thread::sleep(STREAM_POLL_INTERVAL);
                }
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("failed to start output stream: {}", e).into()),
            Err(_) => return Err("output thread exited before the stream started".into()),
        }

        info!(
            device = name,
            host,
            channels = num_channels,
            sample_rate,
            format = format!("{:?}", sample_format),
            "CPAL output stream started"
        );

        Ok(Device {
            name,
            host,
            mixer,
            closed,
            output_thread: Mutex::new(Some(output_thread)),
        })
    }
}

impl super::Device for Device {
    fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.mixer.shutdown();
        self.closed.store(true, Ordering::Relaxed);
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
    }
}
