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
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::samples::{SampleBank, SlotAction};
use crate::trigger::TriggerRouter;

pub mod keyboard;
pub mod midi;

/// Controller events that will trigger behavior in the bank.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// Starts a slot immediately, restarting it if it is already playing.
    Play(usize),

    /// Starts a slot on the next bar boundary.
    Quantize(usize),

    /// Stops a playing slot, or starts an idle one immediately.
    Toggle(usize),

    /// Stops a slot.
    Stop(usize),

    /// Stops every slot.
    StopAll,

    /// A raw MIDI message. Note-ons are routed to a slot by the trigger router.
    Midi(Vec<u8>),

    /// Logs the state of every slot.
    Status,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds events from any number of drivers into a sample bank.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given drivers.
    pub fn new(router: Arc<TriggerRouter>, drivers: Vec<Arc<dyn Driver>>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(router, drivers)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers bank events by watching the drivers and getting events from them. Returns once
    /// every driver has stopped.
    async fn trigger_events(router: Arc<TriggerRouter>, drivers: Vec<Arc<dyn Driver>>) {
        let (events_tx, mut events_rx) = mpsc::channel(crate::midi::EVENT_QUEUE_SIZE);
        let join_handles = drivers
            .iter()
            .map(|driver| driver.monitor_events(events_tx.clone()))
            .collect::<Vec<_>>();
        drop(events_tx);

        info!(
            slots = router.bank().capacity(),
            loaded = router.bank().count(),
            drivers = join_handles.len(),
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");
            handle_event(&router, event);
        }

        info!("Controller closing.");
        for join_handle in join_handles {
            match join_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(err = %e, "Driver stopped with an error"),
                Err(e) => error!(err = %e, "Error waiting for event monitor to stop"),
            }
        }
    }
}

/// Applies a single event. Failures are logged, never fatal.
pub fn handle_event(router: &TriggerRouter, event: Event) {
    let bank = router.bank();
    let result = match event {
        Event::Play(index) => with_slot(bank, index, |slot| slot.play().map_err(Into::into)),
        Event::Quantize(index) => with_slot(bank, index, |slot| {
            slot.play_at_next_bar_boundary().map_err(Into::into)
        }),
        Event::Toggle(index) => with_slot(bank, index, |slot| slot.toggle().map_err(Into::into)),
        Event::Stop(index) => with_slot(bank, index, |slot| {
            if let Some(from) = slot.stop() {
                info!(slot = index, from = %from, "Slot stopped");
            }
            Ok(SlotAction::Stopped)
        }),
        Event::StopAll => {
            bank.stop_all();
            Ok(SlotAction::Stopped)
        }
        Event::Midi(raw) => match router.process_midi_event(&raw) {
            Some(result) => result,
            None => return,
        },
        Event::Status => {
            log_status(router);
            return;
        }
    };

    match result {
        Ok(action) => info!(action = ?action, "Event applied."),
        Err(e) => error!(err = %e, "Event had no effect."),
    }
}

fn with_slot<F>(
    bank: &SampleBank,
    index: usize,
    f: F,
) -> Result<SlotAction, crate::samples::BankError>
where
    F: FnOnce(&crate::samples::SampleSlot) -> Result<SlotAction, crate::samples::BankError>,
{
    match bank.slot(index) {
        Some(slot) => f(slot),
        None => Err(crate::samples::BankError::IndexOutOfRange {
            index,
            capacity: bank.capacity(),
        }),
    }
}

fn log_status(router: &TriggerRouter) {
    let bank = router.bank();
    let clock = bank.transport_clock();
    let bar = clock
        .as_ref()
        .and_then(|clock| clock.current_bar_position().ok());
    let bar_length = clock
        .as_ref()
        .map(|clock| clock.samples_to_duration(clock.samples_per_bar().round() as u64));
    info!(
        capacity = bank.capacity(),
        loaded = bank.count(),
        bar = ?bar,
        bar_length = ?bar_length,
        mode = %router.mode(),
        "Bank status"
    );
    for slot in bank.slots().filter(|slot| slot.has_sample()) {
        info!("{}", slot);
    }
}
