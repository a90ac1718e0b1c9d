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
use std::collections::VecDeque;

use super::event::ScheduledEvent;
use crate::hosttime::HostTime;

/// The execution context: registered events sorted by target time.
///
/// Storage is reserved up front and never grows, so inserting and popping
/// are safe on the real-time thread.
pub(crate) struct TimerQueue {
    events: VecDeque<ScheduledEvent>,
    capacity: usize,
}

impl TimerQueue {
    pub fn new(capacity: usize) -> TimerQueue {
        TimerQueue {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers an event. Returns false without registering when full.
    pub fn insert(&mut self, event: ScheduledEvent) -> bool {
        if self.events.len() >= self.capacity {
            return false;
        }
        let index = self
            .events
            .partition_point(|e| (e.target, e.id) <= (event.target, event.id));
        self.events.insert(index, event);
        true
    }

    /// Removes and returns the earliest event if it is due before `deadline`.
    #[inline]
    pub fn pop_due(&mut self, deadline: HostTime) -> Option<ScheduledEvent> {
        match self.events.front() {
            Some(event) if event.target < deadline => self.events.pop_front(),
            _ => None,
        }
    }

    /// Cancels every registration.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter()
    }
}
