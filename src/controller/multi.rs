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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::error;

use super::Event;

/// Runs several drivers at once. Finishes when all of them have.
pub struct Driver {
    drivers: Vec<Arc<dyn super::Driver>>,
}

impl Driver {
    pub fn new(drivers: Vec<Arc<dyn super::Driver>>) -> Driver {
        Driver { drivers }
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let join_handles = self
            .drivers
            .iter()
            .map(|driver| driver.monitor_events(events_tx.clone()))
            .collect::<Vec<_>>();

        tokio::spawn(async move {
            let mut result = Ok(());
            for join_handle in join_handles {
                match join_handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(err = %e, "Sub-driver failed.");
                        result = Err(e);
                    }
                    Err(e) => {
                        error!(err = %e, "Sub-driver panicked.");
                        result = Err(io::Error::other(e.to_string()));
                    }
                }
            }
            result
        })
    }
}
