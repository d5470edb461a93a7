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

//! The command/response channel pair between a controller and one worker.
//!
//! Both directions are unbounded crossbeam channels. The controller end can be cloned freely;
//! the worker end belongs to exactly one worker thread.
//!
//! The worker never acts on a stale command: [`WorkerEnd::take_latest`] drains everything that
//! is queued and hands back only the most recent command, except that a [`Command::Stop`] ends
//! the drain on the spot so nothing queued behind it is ever observed.

use crate::comm::messages::{Command, Response};
use crate::error::PpspError;
use crossbeam::channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded,
};
use log::debug;
use std::time::Duration;

/// Build a connected controller/worker channel pair.
pub fn channel_pair() -> (ControllerEnd, WorkerEnd) {
    let (command_tx, command_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    (
        ControllerEnd {
            commands: command_tx,
            responses: response_rx,
        },
        WorkerEnd {
            commands: command_rx,
            responses: response_tx,
        },
    )
}

/// The controller's side: sends commands, receives responses.
#[derive(Debug, Clone)]
pub struct ControllerEnd {
    commands: Sender<Command>,
    responses: Receiver<Response>,
}

impl ControllerEnd {
    /// Queue a command for the worker.
    ///
    /// # Returns: `Result<(), PpspError>`
    /// * `Ok(())` - Command queued
    /// * `Err(PpspError::Internal)` - The worker has exited and will never see the command
    pub fn send(&self, command: Command) -> Result<(), PpspError> {
        self.commands
            .send(command)
            .map_err(|e| PpspError::Internal(format!("worker is gone, dropped {:?}", e.0)))
    }

    /// Next response if one is queued. Never blocks.
    pub fn try_recv(&self) -> Option<Response> {
        self.responses.try_recv().ok()
    }

    /// Next response, waiting at most `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Response> {
        self.responses.recv_timeout(timeout).ok()
    }

    /// Next response, blocking until one arrives.
    ///
    /// `None` once the worker has exited and every response it sent has been received.
    pub fn recv(&self) -> Option<Response> {
        self.responses.recv().ok()
    }

    /// Every response queued right now.
    pub fn drain(&self) -> Vec<Response> {
        self.responses.try_iter().collect()
    }
}

/// Outcome of polling the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Nothing new, keep the current configuration.
    Nothing,
    Command(Command),
    /// Every controller end is gone.
    Disconnected,
}

/// The worker's side: receives commands, sends responses.
#[derive(Debug)]
pub struct WorkerEnd {
    commands: Receiver<Command>,
    responses: Sender<Response>,
}

impl WorkerEnd {
    /// Drain the command queue and return the most recent command.
    ///
    /// With `wait` set, block up to that long for the first command; otherwise only look at what
    /// is already queued. An empty queue is the normal case and yields [`Received::Nothing`].
    pub fn take_latest(&self, wait: Option<Duration>) -> Received {
        let first = match wait {
            Some(timeout) => match self.commands.recv_timeout(timeout) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => return Received::Nothing,
                Err(RecvTimeoutError::Disconnected) => return Received::Disconnected,
            },
            None => match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => return Received::Nothing,
                Err(TryRecvError::Disconnected) => return Received::Disconnected,
            },
        };

        let mut latest = first;
        while latest != Command::Stop {
            match self.commands.try_recv() {
                Ok(command) => {
                    debug!("superseding {latest:?} with {command:?}");
                    latest = command;
                }
                Err(_) => break,
            }
        }
        Received::Command(latest)
    }

    /// Send a response to the controller. A controller that went away is not an error for the
    /// worker; the response is dropped.
    pub fn respond(&self, response: Response) {
        if let Err(e) = self.responses.send(response) {
            debug!("controller is gone, dropping response: {}", e.0.message);
        }
    }
}
