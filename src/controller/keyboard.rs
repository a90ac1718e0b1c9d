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
const RESUME: &str = "resume";
const STOP: &str = "stop";
const RESET: &str = "reset";
const TEMPO: &str = "tempo";
const FASTER: &str = "faster";
const SLOWER: &str = "slower";
const TRIGGER: &str = "trigger";
const QUIT: &str = "quit";

/// Reads commands from stdin, one per line.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Handles one line of input. Returns false once input is exhausted or
    /// the user quits.
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
            "Command ({}, {}, {}, {}, {} <bpm>, {}, {}, {} <name>, {}): ",
            PLAY, RESUME, STOP, RESET, TEMPO, FASTER, SLOWER, TRIGGER, QUIT,
        )?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let input = input.trim();
        if input.eq_ignore_ascii_case(QUIT) {
            return Ok(false);
        }
        match parse(input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?,
            None => warn!(input = input, "Unrecognized input"),
        }
        Ok(true)
    }
}

fn parse(input: &str) -> Option<Event> {
    let mut words = input.split_whitespace();
    let command = words.next()?.to_lowercase();
    let argument = words.next();
    if words.next().is_some() {
        return None;
    }

    match (command.as_str(), argument) {
        (PLAY, None) => Some(Event::Play),
        (RESUME, None) => Some(Event::Resume),
        (STOP, None) => Some(Event::Stop),
        (RESET, None) => Some(Event::Reset),
        (FASTER, None) => Some(Event::Faster),
        (SLOWER, None) => Some(Event::Slower),
        (TEMPO, Some(bpm)) => bpm
            .parse::<f64>()
            .ok()
            .filter(|bpm| bpm.is_finite())
            .map(Event::Tempo),
        (TRIGGER, Some(name)) => Some(Event::Trigger(name.to_string())),
        _ => None,
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
