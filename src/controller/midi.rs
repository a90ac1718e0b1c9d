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
use std::{error::Error, io, sync::Arc};

use midly::live::LiveEvent;
use tokio::{
    sync::mpsc::{self, Sender},
    task::JoinHandle,
};
use tracing::{debug, error, info, span, Instrument, Level};

use super::Event;
use crate::{config, midi::Device};

/// Maps incoming MIDI messages onto controller events.
pub struct Driver {
    midi_device: Arc<dyn Device>,
    /// Exact messages to match. The first match wins.
    bindings: Arc<Vec<(LiveEvent<'static>, Event)>>,
}

impl Driver {
    pub fn new(midi_device: Arc<dyn Device>, bindings: Vec<(LiveEvent<'static>, Event)>) -> Driver {
        Driver {
            midi_device,
            bindings: Arc::new(bindings),
        }
    }

    /// Binds the transport messages from `config` and the message of every
    /// trigger that has one.
    pub fn from_config(
        config: &config::MidiController,
        triggers: &[config::Trigger],
        midi_device: Arc<dyn Device>,
    ) -> Result<Driver, Box<dyn Error>> {
        let transport = [
            (config.play()?, Event::Play),
            (config.resume()?, Event::Resume),
            (config.stop()?, Event::Stop),
            (config.reset()?, Event::Reset),
            (config.faster()?, Event::Faster),
            (config.slower()?, Event::Slower),
        ];

        let mut bindings: Vec<(LiveEvent<'static>, Event)> = transport
            .into_iter()
            .filter_map(|(message, event)| message.map(|message| (message, event)))
            .collect();
        for trigger in triggers {
            if let Some(message) = trigger.midi_event()? {
                bindings.push((message, Event::Trigger(trigger.name().to_string())));
            }
        }

        Ok(Driver::new(midi_device, bindings))
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let (midi_events_tx, mut midi_events_rx) = mpsc::channel::<Vec<u8>>(32);
        let device = self.midi_device.clone();
        let bindings = self.bindings.clone();
        let span = span!(Level::INFO, "MIDI driver", device = device.name());

        tokio::spawn(
            async move {
                device
                    .watch_events(midi_events_tx)
                    .map_err(|e| io::Error::other(e.to_string()))?;
                info!(bindings = bindings.len(), "MIDI driver started.");

                while let Some(raw_event) = midi_events_rx.recv().await {
                    let message = match LiveEvent::parse(&raw_event) {
                        Ok(message) => message,
                        Err(e) => {
                            error!(err = ?e, "Error parsing event.");
                            continue;
                        }
                    };

                    let Some((_, event)) = bindings.iter().find(|(binding, _)| *binding == message)
                    else {
                        debug!(message = ?message, "Unbound MIDI message.");
                        continue;
                    };
                    if events_tx.send(event.clone()).await.is_err() {
                        break;
                    }
                }

                info!("MIDI watcher closed.");
                device.stop_watch_events();
                Ok(())
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc, time::Duration};

    use midly::{live::LiveEvent, MidiMessage};

    use crate::{
        config::{
            self,
            midi::{note_on, ToMidiEvent},
            MidiController,
        },
        controller::Controller,
        engine::Command,
        handle::SchedulerHandle,
        midi::{self, Device as _},
        scheduler::StartFrom,
        testutil::eventually,
    };

    fn bytes(event: LiveEvent<'_>) -> Result<Vec<u8>, Box<dyn Error>> {
        let mut buf = Vec::with_capacity(8);
        event.write(&mut buf)?;
        Ok(buf)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_midi_controller() -> Result<(), Box<dyn Error>> {
        let play = note_on(10, 36, 127);
        let stop = note_on(10, 37, 127);
        let play_buf = bytes(play.to_midi_event()?)?;
        let stop_buf = bytes(stop.to_midi_event()?)?;
        // Same key, wrong velocity.
        let soft_play_buf = bytes(note_on(10, 36, 30).to_midi_event()?)?;
        let unrecognized_buf = bytes(LiveEvent::Midi {
            channel: 15.into(),
            message: MidiMessage::ProgramChange { program: 27.into() },
        })?;
        let invalid_buf: Vec<u8> = vec![1, 2, 3, 4, 5, 6, 7, 8];

        let device = midi::test::Device::get("mock-pads");
        let driver = super::Driver::from_config(
            &MidiController::new(play, stop),
            &[] as &[config::Trigger],
            Arc::new(device.clone()),
        )?;

        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut controller = Controller::new(SchedulerHandle::new(tx), Arc::new(driver));
        eventually(|| device.is_watched(), "MIDI device was never watched");

        device.mock_event(&invalid_buf).await;
        device.mock_event(&unrecognized_buf).await;
        device.mock_event(&soft_play_buf).await;
        device.mock_event(&play_buf).await;
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5))?,
            Command::Start(StartFrom::Beginning)
        );

        device.mock_event(&unrecognized_buf).await;
        device.mock_event(&stop_buf).await;
        assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, Command::Stop);

        // Closing the device ends the driver, then the controller.
        device.stop_watch_events();
        controller.join().await?;
        assert!(rx.try_recv().is_err());
        Ok(())
    }
}
