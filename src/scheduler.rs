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

//! The hardware-time-anchored scheduler.
//!
//! Every registered event has an absolute host-clock target computed from a
//! fixed anchor `(anchor_ticks, anchor_beat)`:
//!
//! ```text
//! target = anchor_ticks + (beat - anchor_beat) * ticks_per_beat
//! ```
//!
//! Targets are never derived from "now plus an interval", so jitter in when
//! the render cycle runs never accumulates into drift. The anchor only moves
//! on start and on tempo changes.
//!
//! Everything here runs on the real-time thread. Nothing allocates after
//! construction, nothing blocks, and nothing logs.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crate::{
    clock::{clamp_tempo, MusicalClock},
    hosttime::{HostClock, HostTime},
    quantize::{Grid, QuantizeError, Quantizer},
    queue::Producer,
};

pub mod event;
mod timers;

pub use event::{EventKind, Notification, ScheduledEvent};
use event::Origin;
use timers::TimerQueue;

/// Number of beats registered per batch when none is configured.
pub const DEFAULT_LOOKAHEAD_BEATS: u32 = 4;

/// Tolerance for float noise when comparing beats.
const BEAT_EPSILON: f64 = 1e-9;

/// Positions at or past this many samples are refused. Far beyond any real
/// session, and well inside both `i64` and exact `f64` integers.
const MAX_POSITION: f64 = (1u64 << 53) as f64;

/// Render cycles the sample position may drift from host time before it is
/// pulled back.
const RESYNC_CYCLES: i64 = 2;

/// Where playback starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartFrom {
    /// Rewind to beat 0.
    Beginning,
    /// Continue from wherever playback stopped.
    Resume,
    /// Seek to the given beat. Negative beats are treated as 0; beats that
    /// are not finite or lie beyond any reachable position are refused.
    Beat(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    /// Transient: only observable from inside a tempo change.
    Retempoing,
}

/// Why the scheduler refused a request.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Rejected {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("scheduler is re-anchoring after a tempo change")]
    Retempoing,
    #[error("beat {0} is in the past")]
    InPast(f64),
    #[error("beat {0} is not a reachable position")]
    InvalidBeat(f64),
    #[error("no room left to hold the event")]
    Full,
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
}

/// Counters readable from any thread.
#[derive(Debug, Default)]
pub struct Counters {
    rejected: AtomicU64,
    overflowed: AtomicU64,
}

impl Counters {
    /// Requests refused with a [`Rejected`].
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Registrations that did not fit into the timer list.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    ticks: HostTime,
    beat: f64,
}

/// A user event kept in musical time until it fires.
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    id: u64,
    beat: f64,
    kind: EventKind,
    /// Whether the event currently sits in the timer list.
    registered: bool,
}

pub struct Scheduler {
    clock: MusicalClock,
    host: Arc<dyn HostClock>,
    state: State,
    anchor: Anchor,
    /// Clicks per batch.
    lookahead_beats: u32,
    /// The first click beat that has not fired or been skipped.
    next_click: i64,
    /// Exclusive end of the registered clicks.
    horizon: i64,
    timers: TimerQueue,
    pending: Vec<PendingEvent>,
    pending_capacity: usize,
    next_id: u64,
    notifications: Producer<Notification>,
    counters: Arc<Counters>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    ///
    /// `capacity` bounds the number of user events held at once.
    ///
    /// # Panics
    ///
    /// Panics if `lookahead_beats` or `capacity` is zero.
    pub fn new(
        clock: MusicalClock,
        host: Arc<dyn HostClock>,
        lookahead_beats: u32,
        capacity: usize,
        notifications: Producer<Notification>,
    ) -> Scheduler {
        assert!(lookahead_beats > 0, "lookahead must be at least one beat");
        assert!(capacity > 0, "event capacity must be non-zero");

        // A fresh batch lands while at most one older batch is outstanding.
        let timer_capacity = 2 * lookahead_beats as usize + capacity;
        Scheduler {
            clock,
            host,
            state: State::Idle,
            anchor: Anchor {
                ticks: 0,
                beat: 0.0,
            },
            lookahead_beats,
            next_click: 0,
            horizon: 0,
            timers: TimerQueue::new(timer_capacity),
            pending: Vec::with_capacity(capacity),
            pending_capacity: capacity,
            next_id: 0,
            notifications,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    pub fn clock(&self) -> &MusicalClock {
        &self.clock
    }

    pub fn tempo(&self) -> f64 {
        self.clock.tempo()
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Number of events currently registered against the host clock.
    pub fn registered(&self) -> usize {
        self.timers.len()
    }

    /// Number of user events that have not fired yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Exclusive end of the registered click window.
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Idle -> Running.
    pub fn start(&mut self, from: StartFrom) -> Result<(), Rejected> {
        self.check_reentry()?;
        if self.state == State::Running {
            return self.reject(Rejected::AlreadyRunning);
        }

        if let StartFrom::Beat(beat) = from {
            if !self.is_reachable(beat) {
                return self.reject(Rejected::InvalidBeat(beat));
            }
        }

        match from {
            StartFrom::Beginning => self.clock.reset(),
            StartFrom::Resume => {}
            StartFrom::Beat(beat) => {
                let sample = self.clock.beat_to_sample(beat.max(0.0));
                self.clock.seek(sample);
            }
        }

        let beat = self.clock.current_beat();
        self.anchor = Anchor {
            ticks: self.host.now(),
            beat,
        };

        self.cancel_all();
        // Anything behind the new position would otherwise fire at once.
        self.pending.retain(|event| event.beat >= beat - BEAT_EPSILON);

        let first_click = (beat - BEAT_EPSILON).ceil() as i64;
        self.next_click = match from {
            // A click can fire up to a buffer before the position reaches it.
            StartFrom::Resume => self.next_click.max(first_click),
            StartFrom::Beginning | StartFrom::Beat(_) => first_click,
        };
        self.horizon = self.next_click;
        self.state = State::Running;
        self.notify(Notification::StateChanged { playing: true });
        self.extend_horizon();

        Ok(())
    }

    /// Running -> Idle. Cancels every registration before returning and
    /// keeps the position. Stopping while idle does nothing.
    pub fn stop(&mut self) -> Result<(), Rejected> {
        self.check_reentry()?;
        if self.state == State::Idle {
            return Ok(());
        }

        self.cancel_all();
        self.state = State::Idle;
        self.notify(Notification::StateChanged { playing: false });
        Ok(())
    }

    /// Rewinds to beat 0 and forgets pending user events. Idle only.
    pub fn reset(&mut self) -> Result<(), Rejected> {
        self.check_reentry()?;
        if self.state == State::Running {
            return self.reject(Rejected::AlreadyRunning);
        }

        self.clock.reset();
        self.pending.clear();
        self.next_click = 0;
        self.horizon = 0;
        Ok(())
    }

    /// Changes the tempo, clamped to the supported range.
    ///
    /// While running this cancels the outstanding registrations, re-anchors
    /// at the current hardware time and registers a fresh batch starting at
    /// the first click that has not fired. A tempo equal to the current one
    /// does nothing. While idle the musical position is kept.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), Rejected> {
        self.check_reentry()?;
        let bpm = clamp_tempo(bpm);
        if bpm == self.clock.tempo() {
            return Ok(());
        }

        if self.state == State::Running {
            self.retempo(bpm);
        } else {
            let beat = self.clock.current_beat();
            self.clock.set_tempo(bpm);
            let sample = self.clock.beat_to_sample(beat);
            self.clock.seek(sample);
        }

        self.notify(Notification::TempoChanged { bpm });
        Ok(())
    }

    /// Schedules a user event at a musical position. Returns its id.
    pub fn schedule(&mut self, kind: EventKind, beat: f64) -> Result<u64, Rejected> {
        self.check_reentry()?;
        if !self.is_reachable(beat) {
            return self.reject(Rejected::InvalidBeat(beat));
        }
        if beat < self.clock.current_beat() - BEAT_EPSILON {
            return self.reject(Rejected::InPast(beat));
        }
        if self.pending.len() >= self.pending_capacity {
            return self.reject(Rejected::Full);
        }

        let id = self.next_id();
        self.pending.push(PendingEvent {
            id,
            beat,
            kind,
            registered: false,
        });

        if self.state == State::Running && beat < self.horizon as f64 {
            self.register_pending();
        }
        Ok(id)
    }

    /// Snaps to the next reachable grid point and schedules there. Returns
    /// the chosen beat.
    pub fn schedule_quantized(
        &mut self,
        kind: EventKind,
        grid: Grid,
        lookahead: Duration,
    ) -> Result<f64, Rejected> {
        self.check_reentry()?;
        let beat = match Quantizer::new(&self.clock).next_target(grid, lookahead) {
            Ok(beat) => beat,
            Err(e) => return self.reject(e.into()),
        };
        self.schedule(kind, beat)?;
        Ok(beat)
    }

    /// Runs one render cycle of `frames` frames: tops up the lookahead
    /// window, fires everything due before the end of the buffer, then moves
    /// the clock forward.
    ///
    /// Host time is the reference. When cycles go missing (an xrun, a stalled
    /// thread) the sample position is pulled back in line with it, clicks
    /// that can no longer land on time are skipped, and anything already
    /// registered fires late, once.
    pub fn process(&mut self, frames: usize) {
        if self.state != State::Running {
            return;
        }

        let now = self.host.now();
        let buffer = self.frames_to_ticks(frames);
        let deadline = now.saturating_add(buffer);

        let played = self.beat_at(now);
        let position = self.clock.beat_to_sample(played);
        if (position - self.clock.position()).abs() > RESYNC_CYCLES * frames.max(1) as i64 {
            self.clock.seek(position);
        }

        if played > self.horizon as f64 {
            self.horizon = (played - BEAT_EPSILON).ceil() as i64;
            self.next_click = self.next_click.max(self.horizon);
        }
        // Cover the end of the next buffer too, so nothing is registered
        // after its cycle has passed.
        let ahead = self.beat_at(deadline.saturating_add(buffer));
        let half_batch = self.lookahead_beats as f64 / 2.0;
        while ahead >= self.horizon as f64 - half_batch {
            self.extend_horizon();
        }

        while let Some(event) = self.timers.pop_due(deadline) {
            self.fire(event, now, frames);
        }

        self.clock.advance(frames);
    }

    fn retempo(&mut self, bpm: f64) {
        self.state = State::Retempoing;
        self.cancel_all();

        // Where we are, measured at the old tempo.
        let now = self.host.now();
        let beat = self.beat_at(now);

        self.clock.set_tempo(bpm);
        let sample = self.clock.beat_to_sample(beat);
        self.clock.seek(sample);
        self.anchor = Anchor { ticks: now, beat };

        self.horizon = self.next_click;
        self.extend_horizon();
        self.state = State::Running;
    }

    fn fire(&mut self, event: ScheduledEvent, now: HostTime, frames: usize) {
        let ahead = event.target.saturating_sub(now);
        let mut offset =
            (ahead as f64 * self.clock.sample_rate() / self.host.ticks_per_second() as f64) as i64;
        if frames > 0 {
            offset = offset.min(frames as i64 - 1);
        }

        self.notify(Notification::EventFired {
            beat: event.beat,
            kind: event.kind,
            accent: event.accent,
            sample: self.clock.position() + offset,
        });

        match event.origin {
            Origin::Metronome => {
                let beat = event.beat as i64;
                let beats_per_bar = self.beats_per_bar();
                self.next_click = self.next_click.max(beat + 1);
                self.notify(Notification::BeatChanged {
                    beat,
                    bar: beat.div_euclid(beats_per_bar),
                    beat_in_bar: beat.rem_euclid(beats_per_bar) as u32 + 1,
                });
            }
            Origin::User => {
                if let Some(index) = self.pending.iter().position(|p| p.id == event.id) {
                    self.pending.swap_remove(index);
                }
            }
        }
    }

    /// Registers the next batch of clicks, then any user events that now fall
    /// inside the window.
    fn extend_horizon(&mut self) {
        let end = self.horizon + self.lookahead_beats as i64;
        for beat in self.horizon..end {
            self.register_click(beat);
        }
        self.horizon = end;
        self.register_pending();
    }

    fn register_click(&mut self, beat: i64) {
        let event = ScheduledEvent {
            target: self.target_for(beat as f64),
            beat: beat as f64,
            kind: EventKind::Click,
            accent: beat.rem_euclid(self.beats_per_bar()) == 0,
            id: self.next_id(),
            origin: Origin::Metronome,
        };
        if !self.timers.insert(event) {
            self.counters.overflowed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn register_pending(&mut self) {
        let horizon = self.horizon as f64;
        for index in 0..self.pending.len() {
            let pending = self.pending[index];
            if pending.registered || pending.beat >= horizon {
                continue;
            }

            let event = ScheduledEvent {
                target: self.target_for(pending.beat),
                beat: pending.beat,
                kind: pending.kind,
                accent: false,
                id: pending.id,
                origin: Origin::User,
            };
            if self.timers.insert(event) {
                self.pending[index].registered = true;
            } else {
                self.counters.overflowed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn cancel_all(&mut self) {
        self.timers.clear();
        for pending in self.pending.iter_mut() {
            pending.registered = false;
        }
    }

    /// The beat playing at host time `ticks`, from the current anchor.
    fn beat_at(&self, ticks: HostTime) -> f64 {
        let elapsed = ticks.saturating_sub(self.anchor.ticks);
        self.anchor.beat + elapsed as f64 / self.ticks_per_beat()
    }

    /// Finite, and small enough that its sample position cannot overflow.
    fn is_reachable(&self, beat: f64) -> bool {
        beat.is_finite() && beat.max(0.0) * self.clock.samples_per_beat() < MAX_POSITION
    }

    fn target_for(&self, beat: f64) -> HostTime {
        let offset = ((beat - self.anchor.beat) * self.ticks_per_beat()).round() as i64;
        self.anchor.ticks.saturating_add_signed(offset)
    }

    fn ticks_per_beat(&self) -> f64 {
        self.host.ticks_per_second() as f64 * 60.0 / self.clock.tempo()
    }

    fn frames_to_ticks(&self, frames: usize) -> HostTime {
        (frames as f64 * self.host.ticks_per_second() as f64 / self.clock.sample_rate()).round()
            as HostTime
    }

    fn beats_per_bar(&self) -> i64 {
        self.clock.time_signature().beats_per_bar as i64
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    #[inline]
    fn notify(&mut self, notification: Notification) {
        // A full queue counts the drop itself.
        self.notifications.enqueue(notification);
    }

    fn reject<T>(&self, reason: Rejected) -> Result<T, Rejected> {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        Err(reason)
    }

    fn check_reentry(&self) -> Result<(), Rejected> {
        if self.state == State::Retempoing {
            debug_assert!(false, "re-entrant scheduler mutation while retempoing");
            return self.reject(Rejected::Retempoing);
        }
        Ok(())
    }
}
