// This file is part of ppsp-tester, an application to measure DMA throughput and data integrity of PCIe FPGA test boards.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// ppsp-tester is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// ppsp-tester is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! A test session: up to two workers, each reachable under a stable [`InterfaceId`].
//!
//! Every worker is constructed before any of them is spawned, so a board that fails to open
//! aborts the whole session without leaving half of it running.

use crate::comm::channel::ControllerEnd;
use crate::comm::messages::Command;
use crate::config::{InterfaceConfig, WorkerConfig};
use crate::error::PpspError;
use crate::worker::{Worker, WorkerHandle};
use log::{info, warn};
use std::fmt;

/// A board carries at most two interfaces.
pub const MAX_INTERFACES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub u8);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface {}", self.0)
    }
}

struct Running {
    id: InterfaceId,
    controller: ControllerEnd,
    handle: WorkerHandle,
}

pub struct Session {
    running: Vec<Running>,
}

impl Session {
    /// Open every interface in `interfaces` and start one worker per interface.
    ///
    /// # Returns: `Result<Session, PpspError>`
    /// * `Ok(Session)` - All workers are running
    /// * `Err(PpspError::Argument)` - More than [`MAX_INTERFACES`] interfaces were given
    /// * `Err(PpspError)` - An interface failed to open; no worker was started
    pub fn open(
        interfaces: &[InterfaceConfig],
        config: WorkerConfig,
    ) -> Result<Session, PpspError> {
        check_count(interfaces.len())?;
        let workers = interfaces
            .iter()
            .map(|interface| Worker::open(interface, config.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Session::start(workers)
    }

    /// Start already constructed workers, numbering them in order.
    pub fn start(workers: Vec<(Worker, ControllerEnd)>) -> Result<Session, PpspError> {
        check_count(workers.len())?;
        let mut running = Vec::with_capacity(workers.len());
        for (index, (worker, controller)) in workers.into_iter().enumerate() {
            let id = InterfaceId(index as u8);
            let handle = worker.spawn()?;
            info!("{id}: started worker {}", handle.name());
            running.push(Running {
                id,
                controller,
                handle,
            });
        }
        Ok(Session { running })
    }

    /// The controller end of the worker behind `id`.
    pub fn interface(&self, id: InterfaceId) -> Option<&ControllerEnd> {
        self.running
            .iter()
            .find(|r| r.id == id)
            .map(|r| &r.controller)
    }

    pub fn interfaces(&self) -> Vec<InterfaceId> {
        self.running.iter().map(|r| r.id).collect()
    }

    /// Whether the worker behind `id` has exited on its own.
    pub fn is_finished(&self, id: InterfaceId) -> bool {
        self.running
            .iter()
            .find(|r| r.id == id)
            .is_some_and(|r| r.handle.is_finished())
    }

    /// Stop every worker and wait for all of them.
    ///
    /// Stop is sent to every worker before any join, so the workers wind down in parallel.
    pub fn shutdown(self) -> Vec<(InterfaceId, Result<(), PpspError>)> {
        for running in &self.running {
            if running.controller.send(Command::Stop).is_err() {
                warn!("{}: worker already exited", running.id);
            }
        }
        self.running
            .into_iter()
            .map(|r| (r.id, r.handle.join()))
            .collect()
    }
}

fn check_count(count: usize) -> Result<(), PpspError> {
    if count > MAX_INTERFACES {
        return Err(PpspError::Argument(format!(
            "{count} interfaces requested, a session supports at most {MAX_INTERFACES}"
        )));
    }
    Ok(())
}
