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

//! The observer side of playback: drains notifications on its own cadence
//! and keeps a snapshot of where playback is.

use std::{
    error::Error,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::RwLock;
use tracing::{debug, info, span, warn, Level};

use crate::{
    queue::Consumer,
    scheduler::{Counters, EventKind, Notification},
};

/// Roughly one display frame.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(16_667);

/// What the observer last heard from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub playing: bool,
    pub tempo: f64,
    pub beat: i64,
    /// 0-indexed.
    pub bar: i64,
    /// 1-indexed.
    pub beat_in_bar: u32,
    pub last_event: Option<(f64, EventKind)>,
    /// Events fired since the feed was created.
    pub fired: u64,
    /// Notifications lost to a full queue.
    pub dropped: u64,
    pub rejected: u64,
    pub overflowed: u64,
}

impl PlaybackStatus {
    fn new(tempo: f64) -> PlaybackStatus {
        PlaybackStatus {
            playing: false,
            tempo,
            beat: 0,
            bar: 0,
            beat_in_bar: 1,
            last_event: None,
            fired: 0,
            dropped: 0,
            rejected: 0,
            overflowed: 0,
        }
    }

    fn apply(&mut self, notification: &Notification) {
        match *notification {
            Notification::BeatChanged {
                beat,
                bar,
                beat_in_bar,
            } => {
                self.beat = beat;
                self.bar = bar;
                self.beat_in_bar = beat_in_bar;
            }
            Notification::StateChanged { playing } => self.playing = playing,
            Notification::EventFired { beat, kind, .. } => {
                self.fired += 1;
                self.last_event = Some((beat, kind));
            }
            Notification::TempoChanged { bpm } => self.tempo = bpm,
        }
    }
}

/// Sole consumer of the engine's notifications.
pub struct Feed {
    consumer: Consumer<Notification>,
    counters: Arc<Counters>,
    status: Arc<RwLock<PlaybackStatus>>,
    drained: Vec<Notification>,
    reported_dropped: u64,
}

impl Feed {
    pub(crate) fn new(
        consumer: Consumer<Notification>,
        counters: Arc<Counters>,
        tempo: f64,
    ) -> Feed {
        let capacity = consumer.capacity();
        Feed {
            consumer,
            counters,
            status: Arc::new(RwLock::new(PlaybackStatus::new(tempo))),
            drained: Vec::with_capacity(capacity),
            reported_dropped: 0,
        }
    }

    /// Drains everything published since the last poll, oldest first, and
    /// folds it into the status.
    pub fn poll(&mut self) -> &[Notification] {
        self.drained.clear();
        self.consumer.drain_into(&mut self.drained);

        let dropped = self.consumer.dropped();
        {
            let mut status = self.status.write();
            for notification in self.drained.iter() {
                status.apply(notification);
            }
            status.dropped = dropped;
            status.rejected = self.counters.rejected();
            status.overflowed = self.counters.overflowed();
        }

        if dropped > self.reported_dropped {
            warn!(
                dropped,
                since_last_poll = dropped - self.reported_dropped,
                "Notification queue overflowed, observer is falling behind."
            );
            self.reported_dropped = dropped;
        }

        &self.drained
    }

    /// A copy of the current status.
    pub fn status(&self) -> PlaybackStatus {
        self.status.read().clone()
    }

    /// Shared view of the status for other threads.
    pub fn status_handle(&self) -> Arc<RwLock<PlaybackStatus>> {
        self.status.clone()
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Polls every `interval` on a dedicated thread, handing each
    /// notification to `callback`.
    pub fn spawn<F>(mut self, interval: Duration, mut callback: F) -> io::Result<FeedThread>
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let status = self.status.clone();
        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("beatsync-feed".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "feed");
                    let _enter = span.enter();
                    info!(interval = ?interval, "Feed started.");

                    while !stop.load(Ordering::Relaxed) {
                        for notification in self.poll() {
                            callback(notification);
                        }
                        thread::sleep(interval);
                    }

                    // Deliver whatever arrived while stopping.
                    for notification in self.poll() {
                        callback(notification);
                    }
                    debug!("Feed stopped.");
                    self
                })?
        };

        Ok(FeedThread {
            stop,
            status,
            thread: Some(thread),
        })
    }
}

/// A feed polling on its own thread.
pub struct FeedThread {
    stop: Arc<AtomicBool>,
    status: Arc<RwLock<PlaybackStatus>>,
    thread: Option<thread::JoinHandle<Feed>>,
}

impl FeedThread {
    pub fn status(&self) -> PlaybackStatus {
        self.status.read().clone()
    }

    pub fn status_handle(&self) -> Arc<RwLock<PlaybackStatus>> {
        self.status.clone()
    }

    /// Stops polling and hands the feed back.
    pub fn stop(mut self) -> Result<Feed, Box<dyn Error>> {
        self.stop.store(true, Ordering::Relaxed);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| "feed thread panicked".into()),
            None => Err("feed thread already stopped".into()),
        }
    }
}

impl Drop for FeedThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use parking_lot::Mutex;

    use crate::{
        engine::{self, Settings},
        hosttime::{HostClock, ManualClock},
        scheduler::{EventKind, Notification},
        testutil::eventually,
    };

    use super::*;

    fn run_cycles(engine: &mut engine::Engine, host: &ManualClock, count: usize) {
        for _ in 0..count {
            engine.process(engine.buffer_size());
            host.advance(engine.buffer_size() as u64);
        }
    }

    #[test]
    fn test_poll_tracks_status() -> Result<(), Box<dyn Error>> {
        let host = ManualClock::new(44100);
        let (mut engine, handle, mut feed) =
            engine::new(&Settings::default(), Arc::new(host.clone()));
        assert!(!feed.status().playing);
        assert_eq!(feed.status().tempo, 120.0);

        handle.start()?;
        handle.schedule(EventKind::Cue(5), 1.5)?;
        // Through beat 2 (sample 44100).
        run_cycles(&mut engine, &host, 175);

        let drained = feed.poll().len();
        assert!(drained > 0);
        let status = feed.status();
        assert!(status.playing);
        assert_eq!((status.beat, status.bar, status.beat_in_bar), (2, 0, 3));
        assert_eq!(status.fired, 4);
        assert_eq!(status.last_event, Some((2.0, EventKind::Click)));

        handle.set_tempo(100.0)?;
        handle.stop()?;
        run_cycles(&mut engine, &host, 1);
        feed.poll();
        let status = feed.status();
        assert!(!status.playing);
        assert_eq!(status.tempo, 100.0);

        // Nothing new, nothing drained.
        assert!(feed.poll().is_empty());
        Ok(())
    }

    #[test]
    fn test_poll_reports_drops_and_rejections() -> Result<(), Box<dyn Error>> {
        let host = ManualClock::new(44100);
        let settings = Settings {
            queue_capacity: 4,
            ..Settings::default()
        };
        let (mut engine, handle, mut feed) = engine::new(&settings, Arc::new(host.clone()));
        handle.start()?;
        handle.start()?;
        run_cycles(&mut engine, &host, 2000);

        assert_eq!(feed.poll().len(), 3);
        let status = feed.status();
        assert!(status.dropped > 0);
        assert_eq!(status.rejected, 1);
        Ok(())
    }

    #[test]
    fn test_spawned_feed_delivers_in_order() -> Result<(), Box<dyn Error>> {
        let host = ManualClock::new(44100);
        let (mut engine, handle, feed) = engine::new(&Settings::default(), Arc::new(host.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let thread = {
            let seen = seen.clone();
            feed.spawn(Duration::from_millis(5), move |notification| {
                if let Notification::BeatChanged { beat, .. } = notification {
                    seen.lock().push(*beat);
                }
            })?
        };

        handle.start()?;
        run_cycles(&mut engine, &host, 400);
        assert!(host.now() > 88200);

        let status = thread.status_handle();
        eventually(|| status.read().beat == 4, "Feed never reached beat 4");
        let feed = thread.stop()?;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert!(feed.status().playing);
        Ok(())
    }
}
