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

//! Triggered sample playback.
//!
//! This module provides:
//! - Sample decoding and caching (in-memory for zero-latency playback)
//! - Voices, which connect a slot to an audio graph
//! - Slots with immediate and bar-quantized play, stop and toggle
//! - A fixed-capacity bank of slots with index-addressed triggering

mod bank;
mod loader;
mod slot;
mod voice;

pub use bank::{BankError, SampleBank};
pub use loader::{LoadError, LoadedSample, SampleLoader};
pub use slot::{SampleSlot, SlotAction, SlotError, SlotState};
pub use voice::{SchedulingError, StartAt, Voice};
