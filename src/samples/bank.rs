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

//! A fixed-size, fixed-order collection of slots.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{info, warn};

use super::loader::{LoadError, SampleLoader};
use super::slot::{SampleSlot, SlotAction, SlotError};
use crate::audio::AudioMixer;
use crate::transport::TransportClock;
use crate::trigger::TriggerMode;

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("slot index {index} is out of range for a bank of {capacity} slots")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("note {note} does not map to a slot (base note {base_note}, {capacity} slots)")]
    NoteOutOfRange {
        note: u8,
        base_note: u8,
        capacity: usize,
    },

    #[error("unable to load slot {index}: {source}")]
    Load {
        index: usize,
        #[source]
        source: LoadError,
    },

    #[error(transparent)]
    Slot(#[from] SlotError),
}

pub struct SampleBank {
    slots: Vec<SampleSlot>,
    loader: Arc<SampleLoader>,
    clock: RwLock<Weak<TransportClock>>,
}

impl SampleBank {
    /// Creates a bank of empty slots. Samples are decoded at `sample_rate`, which should match the
    /// graph the bank will be attached to.
    pub fn new(capacity: NonZeroUsize, sample_rate: u32) -> SampleBank {
        let loader = Arc::new(SampleLoader::new(sample_rate));
        SampleBank {
            slots: (0..capacity.get())
                .map(|index| SampleSlot::new(index, loader.clone()))
                .collect(),
            loader,
            clock: RwLock::new(Weak::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots with a sample loaded.
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.has_sample()).count()
    }

    pub fn slot(&self, index: usize) -> Option<&SampleSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> impl Iterator<Item = &SampleSlot> {
        self.slots.iter()
    }

    pub fn loader(&self) -> &SampleLoader {
        &self.loader
    }

    fn checked_slot(&self, index: usize) -> Result<&SampleSlot, BankError> {
        self.slots.get(index).ok_or(BankError::IndexOutOfRange {
            index,
            capacity: self.slots.len(),
        })
    }

    pub fn load_sample(&self, index: usize, path: &Path) -> Result<(), BankError> {
        self.checked_slot(index)?
            .load_sample_from_file(path)
            .map_err(|source| BankError::Load { index, source })
    }

    /// Connects every slot to the graph. Attaching to the graph the bank is already on changes
    /// nothing; attaching to another graph moves every slot over.
    pub fn attach(&self, mixer: &AudioMixer) {
        for slot in &self.slots {
            slot.attach(mixer);
        }
        info!(graph = mixer.id(), slots = self.slots.len(), "Sample bank attached");
    }

    pub fn detach(&self) {
        for slot in &self.slots {
            slot.detach();
        }
        info!("Sample bank detached");
    }

    /// Shares the clock with every slot. Only weak references are kept.
    pub fn set_transport_clock(&self, clock: &Arc<TransportClock>) {
        *self.clock.write() = Arc::downgrade(clock);
        for slot in &self.slots {
            slot.set_transport_clock(clock);
        }
    }

    pub fn transport_clock(&self) -> Option<Arc<TransportClock>> {
        self.clock.read().upgrade()
    }

    /// Stops every slot.
    pub fn stop_all(&self) {
        for slot in &self.slots {
            slot.stop();
        }
        info!("All slots stopped");
    }

    /// Toggles a slot, immediately or on the next bar, and logs what the trigger did.
    pub fn trigger(&self, index: usize, mode: TriggerMode) -> Result<SlotAction, BankError> {
        let slot = self.checked_slot(index).inspect_err(|e| {
            warn!(slot = index, err = %e, "Trigger rejected");
        })?;

        let result = match mode {
            TriggerMode::Immediate => slot.toggle(),
            TriggerMode::Quantized => slot.toggle_quantized(),
        };
        match &result {
            Ok(SlotAction::Started) => info!(slot = index, "Trigger started slot"),
            Ok(SlotAction::Scheduled { at }) => {
                info!(slot = index, at, "Trigger scheduled slot for next bar")
            }
            Ok(SlotAction::Stopped) => info!(slot = index, "Trigger stopped slot"),
            Err(SlotError::Empty(_)) => info!(slot = index, "Trigger ignored, slot is empty"),
            Err(e) => warn!(slot = index, err = %e, "Trigger had no effect"),
        }
        Ok(result?)
    }
}

impl std::fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBank")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{mock, ClockSource, Device};
    use crate::samples::{LoadedSample, SlotState};
    use crate::testutil::write_wav;

    fn bank(capacity: usize, sample_rate: u32) -> SampleBank {
        SampleBank::new(NonZeroUsize::new(capacity).expect("nonzero"), sample_rate)
    }

    fn tone(frames: usize) -> LoadedSample {
        LoadedSample::from_interleaved(vec![0.5; frames], 1, 48000)
    }

    #[test]
    fn test_slot_out_of_range() {
        let bank = bank(4, 48000);
        assert_eq!(4, bank.capacity());
        assert!(bank.slot(3).is_some());
        assert!(bank.slot(7).is_none());
        assert!(matches!(
            bank.load_sample(7, Path::new("kick.wav")),
            Err(BankError::IndexOutOfRange {
                index: 7,
                capacity: 4
            })
        ));
        assert!(matches!(
            bank.trigger(4, TriggerMode::Immediate),
            Err(BankError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_load_failure_is_distinct_from_range() {
        let bank = bank(4, 48000);
        assert!(matches!(
            bank.load_sample(1, Path::new("/no/such/kick.wav")),
            Err(BankError::Load {
                index: 1,
                source: LoadError::FileNotFound(_)
            })
        ));
        assert_eq!(0, bank.count());
    }

    #[test]
    fn test_count_and_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clap.wav");
        write_wav(&path, 1, 48000, &[0.1; 64]).expect("write wav");

        let bank = bank(4, 48000);
        bank.load_sample(2, &path).expect("load");
        bank.slot(0).expect("slot").load_sample(tone(10), "kick");
        assert_eq!(2, bank.count());
        assert_eq!(Some("clap".to_string()), bank.slot(2).and_then(|s| s.sample_name()));
        assert_eq!(None, bank.slot(1).and_then(|s| s.sample_name()));
    }

    #[test]
    fn test_attach_and_reattach() {
        let first = mock::Device::get("first", 1, 48000);
        let second = mock::Device::get("second", 1, 48000);
        let bank = bank(2, 48000);
        bank.slot(0).expect("slot").load_sample(tone(48000), "pad");

        bank.attach(first.mixer());
        bank.attach(first.mixer());
        bank.trigger(0, TriggerMode::Immediate).expect("trigger");
        first.render(16);
        assert_eq!(1, first.active_count());

        bank.attach(second.mixer());
        assert!(!bank.slot(0).expect("slot").is_playing());
        assert!(first.render(16).iter().all(|s| *s == 0.0));
        bank.trigger(0, TriggerMode::Immediate).expect("trigger");
        assert!(second.render(16).iter().all(|s| *s == 0.5));

        bank.detach();
        assert!(bank.slots().all(|slot| !slot.is_attached()));
    }

    #[test]
    fn test_stop_all() {
        let device = mock::Device::get("mock", 1, 48000);
        let bank = bank(3, 48000);
        bank.attach(device.mixer());
        for index in 0..3 {
            bank.slot(index).expect("slot").load_sample(tone(48000), "pad");
            bank.trigger(index, TriggerMode::Immediate).expect("trigger");
        }
        device.render(16);
        assert!(bank.slots().all(|slot| slot.is_playing()));

        bank.stop_all();
        assert!(bank.slots().all(|slot| slot.state() == SlotState::Idle));
        assert!(device.render(16).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_trigger_empty_slot() {
        let device = mock::Device::get("mock", 1, 48000);
        let bank = bank(2, 48000);
        bank.attach(device.mixer());
        assert!(matches!(
            bank.trigger(1, TriggerMode::Quantized),
            Err(BankError::Slot(SlotError::Empty(1)))
        ));
    }

    #[test]
    fn test_transport_clock_is_weak() {
        let device = mock::Device::get("mock", 1, 48000);
        let bank = bank(2, 48000);
        let source: Arc<dyn ClockSource> = Arc::new(device.mixer().clone());
        let clock = Arc::new(TransportClock::new(source, 120.0, 4).expect("clock"));

        bank.set_transport_clock(&clock);
        assert!(bank.transport_clock().is_some());
        drop(clock);
        assert!(bank.transport_clock().is_none());
    }

    #[test]
    fn test_quantized_scenario() {
        // 120bpm 4/4 at 48kHz: a bar is 96000 samples (2 seconds).
        const BLOCK: usize = 480;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("one-second.wav");
        write_wav(&path, 1, 48000, &vec![0.5; 48000]).expect("write wav");

        let device = mock::Device::get("mock", 2, 48000);
        let bank = bank(4, 48000);
        bank.load_sample(2, &path).expect("load");
        bank.attach(device.mixer());

        device.render(BLOCK);
        let source: Arc<dyn ClockSource> = Arc::new(device.mixer().clone());
        let clock = Arc::new(TransportClock::new(source, 120.0, 4).expect("clock"));
        assert_eq!(Ok(480), clock.start());
        bank.set_transport_clock(&clock);

        // Half a bar in.
        device.render_blocks(100, BLOCK);
        assert_eq!(Ok(0.5), clock.current_bar_position());

        let slot = bank.slot(2).expect("slot");
        assert_eq!(
            Ok(SlotAction::Scheduled { at: 480 + 96000 }),
            slot.play_at_next_bar_boundary()
        );
        assert!(slot.is_pending());
        assert!(!slot.is_playing());

        // Right up to the boundary: still waiting, still silent.
        let output = device.render_blocks(100, BLOCK);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(slot.is_pending());
        assert_eq!(0.0, slot.current_progress());

        // Exactly on bar 1.
        let output = device.render(BLOCK);
        assert!(slot.is_playing());
        assert_eq!(Some(96480), slot.started_at());
        assert_eq!(Ok(96480), clock.bar_boundary(1));
        assert!(output.iter().all(|s| (*s - 0.5).abs() < 0.001));

        // One second later the one-shot has run out.
        device.render_blocks(98, BLOCK);
        assert!(slot.is_playing());
        assert_eq!(0.99, slot.current_progress());
        device.render(BLOCK);
        assert!(!slot.is_playing());
        assert_eq!(1.0, slot.current_progress());
        assert!(device.render(BLOCK).iter().all(|s| *s == 0.0));
    }
}
