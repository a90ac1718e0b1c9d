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

use tokio::{
    sync::mpsc::{self, Sender},
    task::{JoinError, JoinHandle},
};
use tracing::{error, info, span, Instrument, Level};

use crate::handle::{HandleError, SchedulerHandle};

mod drivers;
pub mod keyboard;
pub mod midi;
pub mod multi;

pub use self::drivers::driver;

/// BPM added or removed by a faster/slower command.
pub const TEMPO_NUDGE: f64 = 1.0;

/// Controller events that will drive the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Starts from beat 0.
    Play,

    /// Starts from where playback last stopped.
    Resume,

    Stop,

    /// Rewinds to beat 0. Ignored while playing.
    Reset,

    /// Sets an absolute tempo.
    Tempo(f64),

    Faster,
    Slower,

    /// Fires a configured trigger by name.
    Trigger(String),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Forwards driver events to a scheduler.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Starts watching the driver. Must be called from within a tokio runtime.
    pub fn new(scheduler: SchedulerHandle, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::dispatch(scheduler, driver).instrument(span)),
        }
    }

    /// Stops forwarding events. Drivers blocked on input are left to finish
    /// on their own.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Join will block until every driver has finished.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn dispatch(scheduler: SchedulerHandle, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            triggers = scheduler.triggers().count(),
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            info!(event = ?event, "Received event.");
            if let Err(e) = apply(&scheduler, &event) {
                error!(err = %e, event = ?event, "Unable to forward event to the scheduler.");
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(err = %e, "Driver failed."),
            Err(e) => error!(err = %e, "Error waiting for driver to stop."),
        }
    }
}

fn apply(scheduler: &SchedulerHandle, event: &Event) -> Result<(), HandleError> {
    match event {
        Event::Play => scheduler.start(),
        Event::Resume => scheduler.resume(),
        Event::Stop => scheduler.stop(),
        Event::Reset => scheduler.reset(),
        Event::Tempo(bpm) => scheduler.set_tempo(*bpm),
        Event::Faster => scheduler.nudge_tempo(TEMPO_NUDGE),
        Event::Slower => scheduler.nudge_tempo(-TEMPO_NUDGE),
        Event::Trigger(name) => scheduler.trigger(name),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{error::Error, io, sync::Arc, time::Duration};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use super::{Controller, Driver, Event, TEMPO_NUDGE};
    use crate::{
        engine::Command,
        handle::{SchedulerHandle, Trigger},
        quantize::Grid,
        scheduler::{EventKind, StartFrom},
    };

    /// Sends a fixed list of events, then finishes.
    pub(crate) struct ScriptedDriver {
        events: Vec<Event>,
    }

    impl ScriptedDriver {
        pub(crate) fn new(events: Vec<Event>) -> ScriptedDriver {
            ScriptedDriver { events }
        }
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::task::spawn_blocking(move || {
                for event in events {
                    events_tx
                        .blocking_send(event)
                        .map_err(|e| io::Error::other(e.to_string()))?;
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() -> Result<(), Box<dyn Error>> {
        let (tx, rx) = crossbeam_channel::bounded(32);
        let chorus = Trigger {
            name: "chorus".to_string(),
            kind: EventKind::Cue(1),
            grid: Grid::Bar,
            lookahead: Duration::from_millis(50),
        };
        let handle = SchedulerHandle::new(tx).with_triggers(vec![chorus]);
        let driver = Arc::new(ScriptedDriver::new(vec![
            Event::Play,
            Event::Tempo(100.0),
            Event::Faster,
            Event::Slower,
            // Unknown triggers are logged and skipped.
            Event::Trigger("bridge".to_string()),
            Event::Trigger("chorus".to_string()),
            Event::Stop,
            Event::Resume,
            Event::Stop,
            Event::Reset,
        ]));

        let mut controller = Controller::new(handle, driver);
        controller.join().await?;

        let commands: Vec<Command> = rx.try_iter().collect();
        assert_eq!(
            commands,
            vec![
                Command::Start(StartFrom::Beginning),
                Command::SetTempo(100.0),
                Command::NudgeTempo(TEMPO_NUDGE),
                Command::NudgeTempo(-TEMPO_NUDGE),
                Command::Quantized {
                    kind: EventKind::Cue(1),
                    grid: Grid::Bar,
                    lookahead: Duration::from_millis(50),
                },
                Command::Stop,
                Command::Start(StartFrom::Resume),
                Command::Stop,
                Command::Reset,
            ]
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_survives_stopped_engine() -> Result<(), Box<dyn Error>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        let driver = Arc::new(ScriptedDriver::new(vec![Event::Play, Event::Stop]));

        let mut controller = Controller::new(SchedulerHandle::new(tx), driver);
        controller.join().await?;
        Ok(())
    }
}
