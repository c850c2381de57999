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
use std::{error::Error, sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    audio::{self, ClockSource},
    config,
    controller::{self, Controller, Driver},
    midi,
    samples::{BankError, SampleBank, SampleLoader},
    transport::{ClockError, TransportClock},
    trigger::{TriggerMode, TriggerRouter},
};

/// Base note used for routing when no MIDI section is configured.
const DEFAULT_BASE_NOTE: u8 = 36;

/// How often to check whether the output device has started rendering.
const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A bank wired to an output device, a transport clock and a trigger router.
pub struct Launcher {
    device: Arc<dyn audio::Device>,
    bank: Arc<SampleBank>,
    clock: Arc<TransportClock>,
    router: Arc<TriggerRouter>,
    midi: Option<config::Midi>,
}

impl Launcher {
    /// Opens the configured output device, builds the bank and loads every configured slot. A slot
    /// that fails to load is left empty and logged.
    pub fn new(config: &config::Launcher) -> Result<Launcher, Box<dyn Error>> {
        let device = audio::get_device(config.audio())?;
        info!(device = %device, "Audio device opened");
        Launcher::with_device(config, device)
    }

    /// Builds the launcher around an already opened device.
    pub fn with_device(
        config: &config::Launcher,
        device: Arc<dyn audio::Device>,
    ) -> Result<Launcher, Box<dyn Error>> {
        let mixer = device.mixer();
        let bank = Arc::new(SampleBank::new(
            config.bank().nonzero_capacity()?,
            mixer.sample_rate(),
        ));
        bank.attach(mixer);

        let source: Arc<dyn ClockSource> = Arc::new(mixer.clone());
        let clock = Arc::new(TransportClock::new(
            source,
            config.transport().bpm(),
            config.transport().beats_per_bar(),
        )?);
        bank.set_transport_clock(&clock);

        for slot_config in config.bank().slots() {
            let path = slot_config.resolved_file(config.base_dir());
            match bank.load_sample(slot_config.index(), &path) {
                Ok(()) => {
                    if let Some(slot) = bank.slot(slot_config.index()) {
                        slot.set_looping(slot_config.looping());
                        slot.set_volume(slot_config.volume());
                    }
                }
                Err(e) => error!(err = %e, "Slot left empty"),
            }
        }
        info!(
            capacity = bank.capacity(),
            loaded = bank.count(),
            memory = bank.loader().total_memory_usage(),
            "Sample bank ready"
        );

        let (base_note, channel, mode) = match config.midi() {
            Some(midi) => (midi.base_note(), midi.channel(), midi.trigger()),
            None => (DEFAULT_BASE_NOTE, None, TriggerMode::default()),
        };
        let router = Arc::new(TriggerRouter::new(bank.clone(), base_note, channel, mode));

        Ok(Launcher {
            device,
            bank,
            clock,
            router,
            midi: config.midi().cloned(),
        })
    }

    pub fn device(&self) -> &Arc<dyn audio::Device> {
        &self.device
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    pub fn clock(&self) -> &Arc<TransportClock> {
        &self.clock
    }

    pub fn router(&self) -> &Arc<TriggerRouter> {
        &self.router
    }

    /// Waits for the device to start rendering, then starts the transport there. If the device
    /// doesn't render within `timeout`, the transport stays stopped and quantized triggers play
    /// immediately.
    pub async fn start_transport(&self, timeout: Duration) -> Result<u64, ClockError> {
        let mixer = self.device.mixer();
        let deadline = tokio::time::Instant::now() + timeout;
        while !mixer.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(RENDER_POLL_INTERVAL).await;
        }

        self.clock.start().inspect_err(|e| {
            warn!(
                err = %e,
                "Transport not started, quantized triggers will play immediately"
            );
        })
    }

    /// Starts a controller with the keyboard driver and, if configured, the MIDI driver.
    pub fn controller(&self) -> Result<Controller, Box<dyn Error>> {
        let mut drivers: Vec<Arc<dyn Driver>> = vec![Arc::new(controller::keyboard::Driver::new())];
        if let Some(midi) = &self.midi {
            let device = midi::get_device(midi.device())?;
            info!(device = %device, base_note = midi.base_note(), "MIDI input opened");
            drivers.push(Arc::new(controller::midi::Driver::new(device)));
        }
        Ok(Controller::new(self.router.clone(), drivers))
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        self.bank.stop_all();
        self.bank.detach();
    }
}

/// Decodes every configured sample without opening any device. Returns the failures, one per
/// slot that would be left empty.
pub fn verify(config: &config::Launcher) -> Vec<BankError> {
    let loader = SampleLoader::new(config.audio().sample_rate());
    config
        .bank()
        .slots()
        .iter()
        .filter_map(|slot| {
            let path = slot.resolved_file(config.base_dir());
            match loader.load(&path) {
                Ok(sample) => {
                    info!(
                        slot = slot.index(),
                        path = %path.display(),
                        duration = ?sample.duration(),
                        "Sample ok"
                    );
                    None
                }
                Err(source) => Some(BankError::Load {
                    index: slot.index(),
                    source,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::audio::mock;
    use crate::samples::{LoadError, SlotAction};
    use crate::testutil::write_wav;

    fn write_samples(dir: &Path) {
        write_wav(&dir.join("kick.wav"), 1, 48000, &[0.5; 4800]).expect("write wav");
        write_wav(&dir.join("pad.wav"), 2, 48000, &[0.25; 9600]).expect("write wav");
    }

    fn launcher_config(dir: &Path) -> config::Launcher {
        let yaml = r#"
audio:
  device: mock-device
  sample_rate: 48000
  channels: 2
bank:
  capacity: 4
  slots:
    - index: 0
      file: kick.wav
    - index: 1
      file: pad.wav
      loop: true
      volume: 0.5
    - index: 3
      file: missing.wav
"#;
        config::Launcher::from_yaml(yaml, dir).expect("config")
    }

    #[test]
    fn test_loads_configured_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_samples(dir.path());
        let launcher = Launcher::new(&launcher_config(dir.path())).expect("launcher");

        let bank = launcher.bank();
        assert_eq!(4, bank.capacity());
        assert_eq!(2, bank.count());
        assert_eq!(Some("kick".to_string()), bank.slot(0).and_then(|s| s.sample_name()));
        assert_eq!(Some("pad".to_string()), bank.slot(1).and_then(|s| s.sample_name()));
        assert!(!bank.slot(3).expect("slot").has_sample());
        assert!(bank.slots().all(|slot| slot.is_attached()));
        assert_eq!(TriggerMode::Quantized, launcher.router().mode());
        assert_eq!(Some(0), launcher.router().slot_for_note(DEFAULT_BASE_NOTE));
        assert_eq!(120.0, launcher.clock().bpm());
    }

    #[tokio::test]
    async fn test_transport_waits_for_rendering() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_samples(dir.path());
        let device = Arc::new(mock::Device::get("mock-device", 2, 48000));
        let launcher =
            Launcher::with_device(&launcher_config(dir.path()), device.clone()).expect("launcher");

        // Nothing rendered yet, so there is no timeline to start on.
        assert_eq!(
            Err(ClockError::NotStarted),
            launcher.start_transport(Duration::from_millis(20)).await
        );
        assert!(matches!(
            launcher.router().route_note(36),
            Ok(SlotAction::Started)
        ));
        launcher.bank().stop_all();

        device.render(480);
        assert_eq!(
            Ok(480),
            launcher.start_transport(Duration::from_millis(20)).await
        );
        assert!(matches!(
            launcher.router().route_note(36),
            Ok(SlotAction::Scheduled { at: 96480 })
        ));
    }

    #[test]
    fn test_looping_and_volume_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_samples(dir.path());
        let device = Arc::new(mock::Device::get("mock-device", 2, 48000));
        let launcher =
            Launcher::with_device(&launcher_config(dir.path()), device.clone()).expect("launcher");

        let slot = launcher.bank().slot(1).expect("slot");
        slot.play().expect("play");
        // Twice the sample's length: a looping slot keeps going.
        let output = device.render_blocks(10, 960);
        assert!(slot.is_playing());
        assert!(output.iter().all(|s| (*s - 0.125).abs() < 0.001));
    }

    #[test]
    fn test_drop_stops_playback() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_samples(dir.path());
        let device = Arc::new(mock::Device::get("mock-device", 2, 48000));
        let launcher =
            Launcher::with_device(&launcher_config(dir.path()), device.clone()).expect("launcher");
        launcher.bank().slot(1).expect("slot").play().expect("play");
        device.render(64);

        drop(launcher);
        assert!(device.render(64).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_verify() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_samples(dir.path());
        let failures = verify(&launcher_config(dir.path()));
        assert_eq!(1, failures.len());
        assert!(matches!(
            &failures[0],
            BankError::Load {
                index: 3,
                source: LoadError::FileNotFound(_)
            }
        ));
    }
}
