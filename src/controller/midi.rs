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
use std::{io, sync::Arc};

use tokio::{sync::mpsc, sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, Instrument, Level};

use super::Event;
use crate::midi::Device;

/// A controller that forwards messages from a MIDI input. Channel filtering and note routing are
/// left to the trigger router.
pub struct Driver {
    /// The MIDI device.
    midi_device: Arc<dyn Device>,
}

impl Driver {
    pub fn new(midi_device: Arc<dyn Device>) -> Driver {
        Driver { midi_device }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let (midi_events_tx, mut midi_events_rx) =
            mpsc::channel::<Vec<u8>>(crate::midi::EVENT_QUEUE_SIZE);
        let device = self.midi_device.clone();

        let watch_result = device
            .watch_events(midi_events_tx)
            .map_err(|e| io::Error::other(e.to_string()));

        tokio::spawn(
            async move {
                watch_result?;
                info!(device = %device, "MIDI driver started.");

                while let Some(raw_event) = midi_events_rx.recv().await {
                    if events_tx.send(Event::Midi(raw_event)).await.is_err() {
                        info!("Controller closed, stopping MIDI driver.");
                        device.stop_watch_events();
                        return Ok(());
                    }
                }

                info!("MIDI watcher closed.");
                device.stop_watch_events();
                Ok(())
            }
            .instrument(span!(Level::INFO, "MIDI driver")),
        )
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, num::NonZeroUsize, sync::Arc};

    use midly::{live::LiveEvent, MidiMessage};

    use crate::{
        audio::{mock, Device as _},
        controller::Controller,
        midi::{self, Device as _},
        samples::{LoadedSample, SampleBank},
        testutil::eventually_async,
        trigger::{TriggerMode, TriggerRouter},
    };

    fn note_on(channel: u8, key: u8, vel: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3);
        LiveEvent::Midi {
            channel: channel.into(),
            message: MidiMessage::NoteOn {
                key: key.into(),
                vel: vel.into(),
            },
        }
        .write(&mut buf)
        .expect("write event");
        buf
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_midi_controller() -> Result<(), Box<dyn Error>> {
        let audio_device = mock::Device::get("mock-device", 1, 48000);
        let bank = Arc::new(SampleBank::new(NonZeroUsize::new(4).expect("nonzero"), 48000));
        bank.attach(audio_device.mixer());
        bank.slot(1)
            .expect("slot")
            .load_sample(LoadedSample::from_interleaved(vec![0.5; 48000], 1, 48000), "pad");
        let router = Arc::new(TriggerRouter::new(
            bank.clone(),
            36,
            Some(9),
            TriggerMode::Immediate,
        ));

        let binding = midi::get_device("mock-midi-device")?;
        let midi_device = binding.to_mock()?;
        let driver = Arc::new(super::Driver::new(binding.clone()));
        let _controller = Controller::new(router, vec![driver]);

        eventually_async(|| midi_device.is_watching(), "MIDI driver never started").await;

        // Wrong channel, then the right one.
        assert!(midi_device.mock_event(&note_on(0, 37, 100)));
        assert!(midi_device.mock_event(&note_on(9, 37, 100)));
        eventually_async(
            || bank.slot(1).is_some_and(|slot| slot.is_playing()),
            "Slot 1 never started playing",
        )
        .await;

        // Note off as note-on with velocity zero does nothing, a second note-on toggles off.
        assert!(midi_device.mock_event(&note_on(9, 37, 0)));
        assert!(midi_device.mock_event(&note_on(9, 37, 127)));
        eventually_async(
            || bank.slot(1).is_some_and(|slot| !slot.is_playing()),
            "Slot 1 never stopped playing",
        )
        .await;

        Ok(())
    }
}
