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

//! The hardware transfer worker.
//!
//! A [`Worker`] owns everything needed to drive one board interface: the register window (through
//! its stream generator and checker), the device-control handle and the worker end of a channel
//! pair. It runs on its own thread and turns commands into DMA transfers:
//!
//! ```text
//!            +-----------------------------+
//!            |            Idle             | <------------------------+
//!            +-----------------------------+                          |
//!     Configure(Read|Write) |      ^ Configure(Idle), invalid command, |
//!                           v      | consistency or integrity error   |
//!            +-----------------------------+                          |
//!            |  Transferring(mode, size)   | --- one transfer per ----+
//!            +-----------------------------+     loop pass
//! ```
//!
//! Each loop pass drains the command queue (the most recent command wins), performs at most one
//! transfer and emits one response. `Stop`, or the controller dropping its end, ends the loop and
//! releases the hardware. Device-control and protocol errors end the loop as well, after an error
//! response has been sent; the thread then returns the error.
//!
//! # Examples
//!
//! ```rust
//! # use ppsp_tester::comm::messages::{Command, TransferMode};
//! # use ppsp_tester::config::{InterfaceConfig, WorkerConfig};
//! # use ppsp_tester::hw::simulated::{SimConfig, SimulatedBoard};
//! # use ppsp_tester::worker::Worker;
//! # use std::time::Duration;
//! # fn example() -> Result<(), ppsp_tester::error::PpspError> {
//! let interface = InterfaceConfig::new("interface 0", "simulated");
//! let sim = SimulatedBoard::new(SimConfig::default());
//! let (worker, controller) = Worker::new(&interface, sim.board(), WorkerConfig::default())?;
//! let handle = worker.spawn()?;
//!
//! controller.send(Command::configure(TransferMode::Write, 4096))?;
//! while let Some(response) = controller.recv_timeout(Duration::from_secs(1)) {
//!     println!("{}", response.message);
//!     if response.write_throughput > 0.0 {
//!         break;
//!     }
//! }
//! handle.stop_with(&controller)?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use crate::comm::channel::{ControllerEnd, Received, WorkerEnd, channel_pair};
use crate::comm::messages::{Command, Response, TransferMode};
use crate::config::{InterfaceConfig, MismatchPolicy, WorkerConfig};
use crate::error::PpspError;
use crate::hw::Board;
use crate::hw::pcie_device::{DeviceControl, PcieDevice};
use crate::hw::register_window::RegisterBlock;
use crate::hw::stream_modules::stream_checker::{IntegrityStats, StreamChecker};
use crate::hw::stream_modules::stream_generator::StreamGenerator;
use crate::hw::transfer::{
    TransferResult, fill_pattern, pattern_integrity, run_transfer, validate_size,
};
use log::{debug, error, info, warn};
use std::thread::{self, JoinHandle};

/// What the worker is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Transferring { mode: TransferMode, size_bytes: u32 },
}

pub struct Worker {
    name: String,
    config: WorkerConfig,
    generator: StreamGenerator,
    checker: StreamChecker,
    device: Box<dyn DeviceControl>,
    endpoint: WorkerEnd,
    mode: TransferMode,
    size_bytes: u32,
    /// Host copy of the DMA buffer, allocated on first use.
    buffer: Vec<u8>,
    needs_prime: bool,
}

impl Worker {
    /// Open the board described by `interface` and build a worker for it.
    ///
    /// All setup happens here, on the caller's thread, so a missing device or a bad register
    /// layout is reported before any worker thread exists.
    ///
    /// # Returns: `Result<(Worker, ControllerEnd), PpspError>`
    /// * `Ok((Worker, ControllerEnd))` - The worker, not yet running, and the controller's end
    ///   of its channel pair
    /// * `Err(PpspError::Config)` - The register layout is unusable
    /// * `Err(PpspError::DeviceOpen | PpspError::DeviceMap)` - The device could not be opened or
    ///   mapped
    pub fn open(
        interface: &InterfaceConfig,
        config: WorkerConfig,
    ) -> Result<(Worker, ControllerEnd), PpspError> {
        let board = PcieDevice::open(interface)?;
        Worker::new(interface, board, config)
    }

    /// Build a worker around an already opened `board`.
    pub fn new(
        interface: &InterfaceConfig,
        board: Board,
        config: WorkerConfig,
    ) -> Result<(Worker, ControllerEnd), PpspError> {
        interface.validate()?;
        if config.sample_size_bytes == 0 {
            return Err(PpspError::Config(String::from(
                "sample size must not be zero",
            )));
        }
        let generator = StreamGenerator::new(RegisterBlock::new(
            board.window.clone(),
            interface.generator_base,
        ))?;
        let checker =
            StreamChecker::new(RegisterBlock::new(board.window, interface.checker_base))?;
        let (controller, endpoint) = channel_pair();
        let worker = Worker {
            name: interface.name.clone(),
            size_bytes: config.initial_size_bytes,
            config,
            generator,
            checker,
            device: board.device,
            endpoint,
            mode: TransferMode::Idle,
            buffer: Vec::new(),
            needs_prime: false,
        };
        Ok((worker, controller))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        match self.mode {
            TransferMode::Idle => WorkerState::Idle,
            mode => WorkerState::Transferring {
                mode,
                size_bytes: self.size_bytes,
            },
        }
    }

    /// Move the worker onto its own thread.
    ///
    /// # Returns: `Result<WorkerHandle, PpspError>`
    /// * `Ok(WorkerHandle)` - The running worker
    /// * `Err(PpspError::Internal)` - The thread could not be spawned
    pub fn spawn(self) -> Result<WorkerHandle, PpspError> {
        let name = self.name.clone();
        let thread = thread::Builder::new()
            .name(format!("ppsp {name}"))
            .spawn(move || self.run())
            .map_err(|e| PpspError::Internal(format!("failed to spawn worker {name}: {e}")))?;
        Ok(WorkerHandle { name, thread })
    }

    /// Run the transfer loop on the current thread until stopped.
    ///
    /// # Returns: `Result<(), PpspError>`
    /// * `Ok(())` - Stopped by a `Stop` command or because the controller went away
    /// * `Err(PpspError)` - A fatal error ended the loop; it was also sent as an error response
    pub fn run(mut self) -> Result<(), PpspError> {
        info!("{}: worker started", self.name);
        self.endpoint
            .respond(Response::info(format!("{}: worker started", self.name)));

        let mut wait = None;
        loop {
            match self.endpoint.take_latest(wait) {
                Received::Command(Command::Stop) => {
                    info!("{}: stop requested", self.name);
                    break;
                }
                Received::Disconnected => {
                    info!("{}: controller went away, stopping", self.name);
                    break;
                }
                Received::Command(Command::Configure { mode, size_bytes }) => {
                    self.adopt(mode, size_bytes)
                }
                Received::Nothing => {}
            }

            if self.mode == TransferMode::Idle {
                wait = Some(self.config.idle_poll);
                continue;
            }

            match self.transfer_iteration() {
                Ok(response) => self.endpoint.respond(response),
                Err(e) => {
                    error!("{}: {e}", self.name);
                    self.endpoint
                        .respond(Response::error(format!("{}: {e}", self.name)));
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!("{}: going idle until the next command", self.name);
                    self.mode = TransferMode::Idle;
                }
            }
            wait = Some(self.config.throttle);
        }
        Ok(())
    }

    fn adopt(&mut self, mode: TransferMode, size_bytes: u32) {
        if mode != TransferMode::Idle {
            let write = mode == TransferMode::Write;
            if let Err(e) = validate_size(size_bytes, write, self.config.sample_size_bytes) {
                warn!("{}: rejecting {mode} of {size_bytes} bytes: {e}", self.name);
                self.endpoint
                    .respond(Response::error(format!("{}: {e}", self.name)));
                self.mode = TransferMode::Idle;
                return;
            }
        }
        info!("{}: mode = {mode}, size = {size_bytes} B", self.name);
        self.needs_prime = mode == TransferMode::Read && self.config.prime_read_buffer;
        self.mode = mode;
        self.size_bytes = size_bytes;
    }

    fn transfer_iteration(&mut self) -> Result<Response, PpspError> {
        let mode = self.mode;
        let size = self.size_bytes;
        let (result, stats) = match mode {
            TransferMode::Read => self.read_transfer(size)?,
            TransferMode::Write => self.write_transfer(size)?,
            TransferMode::Idle => {
                return Err(PpspError::Internal(String::from(
                    "transfer requested while idle",
                )));
            }
        };

        let throughput = result.throughput_mbps();
        let mut message = format!(
            "{}: mode = {mode}, size = {size} B, duration = {} ns ({:.2} us), throughput = {throughput:.2} MB/s",
            self.name,
            result.duration_ns,
            result.duration_ns as f64 / 1000.0
        );
        if let Some(stats) = stats {
            message.push_str(&format!(", check = {}/{}", stats.ok, stats.total));
            if let Some(percent) = stats.percent() {
                message.push_str(&format!(" ({percent:.2} %)"));
            }
            if !stats.is_clean() && self.config.mismatch_policy == MismatchPolicy::Halt {
                return Err(PpspError::Integrity(message));
            }
        }
        debug!("{message}");
        Ok(Response::transfer(
            mode,
            message,
            throughput,
            stats.and_then(|s| s.percent()),
        ))
    }

    /// Host to card: the checker validates what the DMA engine pushes out of the buffer.
    fn read_transfer(
        &mut self,
        size: u32,
    ) -> Result<(TransferResult, Option<IntegrityStats>), PpspError> {
        if self.needs_prime {
            self.prime_buffer()?;
            self.needs_prime = false;
        }
        self.checker.clear()?;
        let result = run_transfer(self.device.as_mut(), false, size)?;
        let stats = self.checker.stats()?;
        Ok((result, Some(stats)))
    }

    /// Card to host: the generator produces `size` bytes worth of samples into the buffer.
    fn write_transfer(
        &mut self,
        size: u32,
    ) -> Result<(TransferResult, Option<IntegrityStats>), PpspError> {
        let samples = size / self.config.sample_size_bytes;
        self.generator.start(samples)?;
        let state = self.generator.state()?;
        if !state.busy {
            return Err(PpspError::Consistency(format!(
                "generator is not busy after being started for {samples} samples"
            )));
        }

        let result = run_transfer(self.device.as_mut(), true, size)?;

        let state = self.generator.state()?;
        if state.busy {
            return Err(PpspError::Consistency(format!(
                "generator is still busy after a {size} byte transfer"
            )));
        }
        if state.samples_transmitted != samples {
            return Err(PpspError::Consistency(format!(
                "generator transmitted {} samples, expected {samples}",
                state.samples_transmitted
            )));
        }

        let stats = if self.config.verify_write_data {
            self.fetch_buffer()?;
            Some(pattern_integrity(
                &self.buffer,
                size as usize,
                self.config.pattern_skip_words,
            ))
        } else {
            None
        };
        Ok((result, stats))
    }

    fn fetch_buffer(&mut self) -> Result<(), PpspError> {
        self.ensure_buffer();
        self.device.read_buffer(&mut self.buffer)
    }

    /// Upload the counting pattern so the checker has something valid to compare against.
    fn prime_buffer(&mut self) -> Result<(), PpspError> {
        self.ensure_buffer();
        fill_pattern(&mut self.buffer);
        debug!("{}: priming DMA buffer with the counting pattern", self.name);
        self.device.write_buffer(&self.buffer)
    }

    fn ensure_buffer(&mut self) {
        let len = self.device.buffer_size();
        if self.buffer.len() != len {
            self.buffer = vec![0u8; len];
        }
    }
}

/// A worker running on its own thread.
pub struct WorkerHandle {
    name: String,
    thread: JoinHandle<Result<(), PpspError>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker thread to end and return how it ended.
    ///
    /// The caller is expected to have sent `Stop` (or dropped every controller end) first,
    /// otherwise this waits forever.
    pub fn join(self) -> Result<(), PpspError> {
        self.thread
            .join()
            .map_err(|_| PpspError::Internal(format!("worker {} panicked", self.name)))?
    }

    /// Ask the worker to stop through `controller` and wait for it.
    ///
    /// A worker that already ended is fine: its exit result is returned.
    pub fn stop_with(self, controller: &ControllerEnd) -> Result<(), PpspError> {
        if controller.send(Command::Stop).is_err() {
            debug!("{} already stopped", self.name);
        }
        self.join()
    }
}
