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

//! A running session: an engine driven by a device, a controller feeding it
//! and a feed reporting on it.

use std::{error::Error, sync::Arc, time::Duration};

use tracing::{debug, info, span, Level};

use crate::{
    audio, config,
    controller::{self, Controller},
    engine::{self, Settings},
    feed::{FeedThread, PlaybackStatus, DEFAULT_POLL_INTERVAL},
    handle::SchedulerHandle,
    hosttime::MonotonicClock,
    midi,
    scheduler::{EventKind, Notification},
};

pub struct Session {
    handle: SchedulerHandle,
    controller: Controller,
    runner: audio::Runner,
    feed: FeedThread,
}

impl Session {
    /// Builds everything the configuration names and starts it. Playback
    /// itself waits for a controller. Must be called from within a tokio
    /// runtime.
    pub fn start(config: &config::Session) -> Result<Session, Box<dyn Error>> {
        let span = span!(Level::INFO, "session");
        let _enter = span.enter();

        let settings = config.settings()?;
        let device = audio::get_device(&config.audio())?;
        let midi_device = config
            .midi()
            .map(|midi_config| midi::get_device(midi_config.device()))
            .transpose()?;
        let driver = controller::driver(
            &config.controller(),
            config.trigger_configs(),
            midi_device,
        )?;

        let (engine, handle, feed) = engine::new(&settings, Arc::new(MonotonicClock::new()));
        let handle = handle.with_triggers(config.triggers()?);
        for trigger in handle.triggers() {
            info!(trigger = %trigger, "Registered trigger.");
        }

        let feed = feed.spawn(DEFAULT_POLL_INTERVAL, log_notification)?;
        let runner = device.run(engine)?;
        let controller = Controller::new(handle.clone(), driver);

        info!(
            device = %device,
            sample_rate = settings.sample_rate,
            buffer_size = settings.buffer_size,
            tempo = settings.tempo,
            time_signature = %settings.time_signature,
            "Session started."
        );

        Ok(Session {
            handle,
            controller,
            runner,
            feed,
        })
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn status(&self) -> PlaybackStatus {
        self.feed.status()
    }

    /// Waits for the controller to finish, then shuts down.
    pub async fn join(mut self) -> Result<PlaybackStatus, Box<dyn Error>> {
        self.controller.join().await?;
        self.shutdown()
    }

    /// Stops playback and the render cycle. Returns the final status.
    pub fn shutdown(self) -> Result<PlaybackStatus, Box<dyn Error>> {
        self.controller.abort();
        self.runner.stop();

        let status = self.feed.stop()?.status();
        info!(
            fired = status.fired,
            dropped = status.dropped,
            rejected = status.rejected,
            overflowed = status.overflowed,
            "Session stopped."
        );
        Ok(status)
    }
}

/// Runs a bare click on `audio` for `duration`.
pub async fn click(
    settings: &Settings,
    audio: &config::Audio,
    duration: Duration,
) -> Result<PlaybackStatus, Box<dyn Error>> {
    let device = audio::get_device(audio)?;
    let (engine, handle, feed) = engine::new(settings, Arc::new(MonotonicClock::new()));
    let feed = feed.spawn(DEFAULT_POLL_INTERVAL, log_notification)?;

    handle.start()?;
    let runner = device.run(engine)?;
    info!(device = %device, tempo = settings.tempo, duration = ?duration, "Clicking.");
    tokio::time::sleep(duration).await;

    // Dropping the engine stops playback.
    runner.stop();
    Ok(feed.stop()?.status())
}

fn log_notification(notification: &Notification) {
    match *notification {
        Notification::BeatChanged {
            beat,
            bar,
            beat_in_bar,
        } => debug!(beat, bar = bar + 1, beat_in_bar, "Beat."),
        Notification::StateChanged { playing } => info!(playing, "Transport changed."),
        Notification::TempoChanged { bpm } => info!(bpm, "Tempo changed."),
        Notification::EventFired {
            beat, kind, sample, ..
        } => match kind {
            EventKind::Click => {}
            _ => info!(beat, sample, kind = %kind, "Event fired."),
        },
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, time::Duration};

    use config::{Config, File, FileFormat};

    use super::{click, Session};
    use crate::{config as beatsync_config, engine::Settings, testutil::eventually};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_lifecycle() -> Result<(), Box<dyn Error>> {
        let config = Config::builder()
            .add_source(File::from_str(
                r#"
tempo: 240
audio:
  device: simulated
midi:
  device: mock-pads
controller:
  kind: midi
  play:
    type: note_on
    channel: 10
    key: 36
triggers:
  - name: drop
    kind: cue
    id: 9
    grid: bar
"#,
                FileFormat::Yaml,
            ))
            .build()?
            .try_deserialize::<beatsync_config::Session>()?;

        let session = Session::start(&config)?;
        session.handle().start()?;
        session.handle().trigger("drop")?;

        eventually(
            || {
                let status = session.status();
                status.playing && status.beat >= 5
            },
            "Session never reached beat 5",
        );

        let status = session.shutdown()?;
        assert!(!status.playing);
        assert_eq!(status.rejected, 0);
        // Clicks on beats 0 through 5, plus the cue.
        assert!(status.fired >= 7);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_click() -> Result<(), Box<dyn Error>> {
        let settings = Settings {
            tempo: 240.0,
            ..Settings::default()
        };
        let status = click(
            &settings,
            &beatsync_config::Audio::new("simulated"),
            Duration::from_millis(600),
        )
        .await?;
        assert!(!status.playing);
        assert!(status.fired >= 2);
        Ok(())
    }
}
