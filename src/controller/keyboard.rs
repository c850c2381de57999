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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const QUANTIZE: &str = "quantize";
const TOGGLE: &str = "toggle";
const STOP: &str = "stop";
const STATUS: &str = "status";

/// A controller that drives the bank from typed commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses a single command line. `stop` on its own stops every slot.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let index = match words.next() {
            Some(word) => Some(word.parse::<usize>().ok()?),
            None => None,
        };
        if words.next().is_some() {
            return None;
        }

        match (command.as_str(), index) {
            (PLAY, Some(index)) => Some(Event::Play(index)),
            (QUANTIZE, Some(index)) => Some(Event::Quantize(index)),
            (TOGGLE, Some(index)) => Some(Event::Toggle(index)),
            (STOP, Some(index)) => Some(Event::Stop(index)),
            (STOP, None) => Some(Event::StopAll),
            (STATUS, None) => Some(Event::Status),
            _ => None,
        }
    }

    /// Reads one command. Returns false once the input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} N, {} N, {} N, {} [N], {}): ",
            PLAY, QUANTIZE, TOGGLE, STOP, STATUS,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        match Driver::parse(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::other(e.to_string()))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::Driver;
    use crate::controller::Event;

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(event.as_bytes());
        let writer = BufWriter::new(Vec::new());
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Some(Event::Play(2)), get_event("play 2")?);
        assert_eq!(Some(Event::Quantize(0)), get_event("quantize 0\n")?);
        assert_eq!(Some(Event::Toggle(15)), get_event("  TOGGLE   15 ")?);
        assert_eq!(Some(Event::Stop(3)), get_event("stop 3")?);
        assert_eq!(Some(Event::StopAll), get_event("stop")?);
        assert_eq!(Some(Event::Status), get_event("status")?);
        assert_eq!(None, get_event("play")?);
        assert_eq!(None, get_event("play x")?);
        assert_eq!(None, get_event("play 1 2")?);
        assert_eq!(None, get_event("status 1")?);
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input() -> Result<(), io::Error> {
        let (sender, _receiver) = mpsc::channel::<Event>(1);
        assert!(!Driver::monitor_io(&sender, BufReader::new(&b""[..]), io::sink())?);
        Ok(())
    }
}
