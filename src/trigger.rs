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
use std::{fmt, sync::Arc};

use midly::{live::LiveEvent, MidiMessage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::samples::{BankError, SampleBank, SlotAction};

/// How a routed note toggles its slot.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Toggle right away.
    Immediate,
    /// Toggle on the next bar boundary.
    #[default]
    Quantized,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Immediate => f.write_str("immediate"),
            TriggerMode::Quantized => f.write_str("quantized"),
        }
    }
}

/// Maps note numbers onto slot indices: `base_note` is slot 0, `base_note + 1` is slot 1, and so
/// on up to the bank's capacity.
pub struct TriggerRouter {
    bank: Arc<SampleBank>,
    base_note: u8,
    /// Zero-indexed channel to listen on, or `None` for any channel.
    channel: Option<u8>,
    mode: TriggerMode,
}

impl TriggerRouter {
    pub fn new(
        bank: Arc<SampleBank>,
        base_note: u8,
        channel: Option<u8>,
        mode: TriggerMode,
    ) -> TriggerRouter {
        TriggerRouter {
            bank,
            base_note,
            channel,
            mode,
        }
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// The slot index a note maps to, if any.
    pub fn slot_for_note(&self, note: u8) -> Option<usize> {
        note.checked_sub(self.base_note)
            .map(usize::from)
            .filter(|index| *index < self.bank.capacity())
    }

    /// Toggles the slot a note maps to using the configured mode.
    pub fn route_note(&self, note: u8) -> Result<SlotAction, BankError> {
        let index = self.slot_for_note(note).ok_or_else(|| {
            let err = BankError::NoteOutOfRange {
                note,
                base_note: self.base_note,
                capacity: self.bank.capacity(),
            };
            warn!(note, err = %err, "Note rejected");
            err
        })?;
        debug!(note, slot = index, mode = %self.mode, "Routing note");
        self.bank.trigger(index, self.mode)
    }

    /// Handles a raw MIDI message. Anything other than a note-on on the watched channel is
    /// ignored and yields `None`.
    pub fn process_midi_event(&self, raw: &[u8]) -> Option<Result<SlotAction, BankError>> {
        let note = note_on(raw, self.channel)?;
        Some(self.route_note(note))
    }
}

/// Extracts the note number from a note-on message. A note-on with velocity zero is a note-off
/// and is ignored, as are messages on other channels when `channel` is set.
fn note_on(raw: &[u8], channel: Option<u8>) -> Option<u8> {
    let event = match LiveEvent::parse(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(err = format!("{:?}", e), "Ignoring unparseable MIDI message");
            return None;
        }
    };

    match event {
        LiveEvent::Midi {
            channel: event_channel,
            message: MidiMessage::NoteOn { key, vel },
        } if vel.as_int() > 0 && channel.map_or(true, |c| c == event_channel.as_int()) => {
            Some(key.as_int())
        }
        _ => None,
    }
}
