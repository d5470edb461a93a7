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

//! Software model of a board.
//!
//! [`SimulatedBoard`] implements the register window and device-control seams in memory so
//! workers can run without hardware, for development and for tests. The model follows the
//! reference design closely enough for the worker's checks to be meaningful:
//!
//! - writing `1` to the generator control register makes it busy and resets its transmitted
//!   counter
//! - a write (card-to-host) transfer drains a busy generator: the DMA buffer receives the
//!   counting pattern, the transmitted counter reaches the programmed sample count and busy
//!   drops
//! - a read (host-to-card) transfer feeds the checker, which compares every sample in the DMA
//!   buffer against the counting pattern
//! - any write to the checker total counter clears both counters
//!
//! Faults can be injected to exercise the error paths, and the model counts every access so
//! tests can assert on what the worker did.
//!
//! # Examples
//!
//! ```rust
//! # use ppsp_tester::hw::simulated::{SimConfig, SimulatedBoard};
//! let sim = SimulatedBoard::new(SimConfig::default());
//! let board = sim.board();
//! assert_eq!(sim.transfer_count(), 0);
//! ```

use crate::config::{
    CHECKER_BASE, GENERATOR_BASE, InterfaceConfig, SAMPLE_SIZE_BYTES, WINDOW_SIZE, WorkerConfig,
};
use crate::error::PpspError;
use crate::hw::Board;
use crate::hw::pcie_device::DeviceControl;
use crate::hw::register_window::{RegisterWindow, check_access};
use crate::hw::stream_modules::{stream_checker, stream_generator};
use crate::hw::transfer::{FRAME_SIZE, TransferFrame, fill_pattern};
use log::trace;
use nix::errno::Errno;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub const SIM_GENERATOR_ID: u32 = 0x5354_4745;
pub const SIM_CHECKER_ID: u32 = 0x5354_4348;
pub const SIM_MODULE_VERSION: u32 = 0x0001_0000;

/// Shape and timing of a simulated board.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub window_size: usize,
    pub generator_base: usize,
    pub checker_base: usize,
    /// Size of the simulated DMA buffer. Much smaller than the real one so tests stay cheap.
    pub buffer_size: usize,
    pub sample_size_bytes: u32,
    /// Duration every transfer reports.
    pub duration_ns: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            window_size: WINDOW_SIZE,
            generator_base: GENERATOR_BASE,
            checker_base: CHECKER_BASE,
            buffer_size: 1024 * 1024,
            sample_size_bytes: SAMPLE_SIZE_BYTES,
            duration_ns: 100_000,
        }
    }
}

impl SimConfig {
    /// A model laid out like `interface`, with samples sized like `worker` expects.
    pub fn for_interface(interface: &InterfaceConfig, worker: &WorkerConfig) -> SimConfig {
        SimConfig {
            window_size: interface.window_size,
            generator_base: interface.generator_base,
            checker_base: interface.checker_base,
            sample_size_bytes: worker.sample_size_bytes,
            ..SimConfig::default()
        }
    }
}

#[derive(Debug)]
struct BoardState {
    config: SimConfig,
    registers: HashMap<usize, u32>,
    dma: Vec<u8>,
    generator_busy: bool,
    samples_transmitted: u32,
    checked_total: u32,
    checked_ok: u32,
    transfers: Vec<TransferFrame>,
    register_accesses: usize,
    buffer_calls: usize,
    fail_next_transfer: Option<Errno>,
    generator_stuck: bool,
    corrupt_from_word: Option<usize>,
}

impl BoardState {
    fn new(config: SimConfig) -> BoardState {
        let mut dma = vec![0u8; config.buffer_size];
        // the buffer starts out as a previous card-to-host run would have left it
        fill_pattern(&mut dma);
        let mut registers = HashMap::new();
        registers.insert(config.generator_base + stream_generator::regs::ID, SIM_GENERATOR_ID);
        registers.insert(config.checker_base + stream_checker::regs::ID, SIM_CHECKER_ID);
        registers.insert(
            config.generator_base + stream_generator::regs::VERSION,
            SIM_MODULE_VERSION,
        );
        registers.insert(
            config.checker_base + stream_checker::regs::VERSION,
            SIM_MODULE_VERSION,
        );
        BoardState {
            config,
            registers,
            dma,
            generator_busy: false,
            samples_transmitted: 0,
            checked_total: 0,
            checked_ok: 0,
            transfers: Vec::new(),
            register_accesses: 0,
            buffer_calls: 0,
            fail_next_transfer: None,
            generator_stuck: false,
            corrupt_from_word: None,
        }
    }

    fn read32(&mut self, offset: usize) -> Result<u32, PpspError> {
        check_access(offset, self.config.window_size)?;
        self.register_accesses += 1;
        let generator = self.config.generator_base;
        let checker = self.config.checker_base;
        let value = if offset == generator + stream_generator::regs::STATUS {
            if self.generator_busy {
                stream_generator::regs::STATUS_BUSY
            } else {
                0
            }
        } else if offset == generator + stream_generator::regs::SAMPLES_TX {
            self.samples_transmitted
        } else if offset == checker + stream_checker::regs::SAMP_TOTAL {
            self.checked_total
        } else if offset == checker + stream_checker::regs::SAMP_OK {
            self.checked_ok
        } else {
            self.registers.get(&offset).copied().unwrap_or(0)
        };
        trace!("sim rd32 0x{offset:06X} -> 0x{value:08X}");
        Ok(value)
    }

    fn write32(&mut self, offset: usize, value: u32) -> Result<(), PpspError> {
        check_access(offset, self.config.window_size)?;
        self.register_accesses += 1;
        trace!("sim wr32 0x{offset:06X} <- 0x{value:08X}");
        let generator = self.config.generator_base;
        let checker = self.config.checker_base;
        if offset == generator + stream_generator::regs::CONTROL
            && value & stream_generator::regs::CONTROL_START != 0
        {
            self.generator_busy = true;
            self.samples_transmitted = 0;
        } else if offset == checker + stream_checker::regs::SAMP_TOTAL {
            self.checked_total = 0;
            self.checked_ok = 0;
        } else {
            self.registers.insert(offset, value);
        }
        Ok(())
    }

    fn start_transfer(&mut self, frame: &mut [u8; FRAME_SIZE]) -> Result<(), PpspError> {
        let request =
            TransferFrame::decode(frame).map_err(|_| sim_error("START_TX", Errno::EINVAL))?;
        self.transfers.push(request);
        if let Some(e) = self.fail_next_transfer.take() {
            return Err(sim_error("START_TX", e));
        }
        let size = request.size_bytes as usize;
        if size == 0 || size % 4 != 0 || size > self.dma.len() {
            return Err(sim_error("START_TX", Errno::EINVAL));
        }

        if request.write {
            if self.generator_busy && !self.generator_stuck {
                fill_pattern(&mut self.dma[..size]);
                if let Some(first) = self.corrupt_from_word {
                    for word in self.dma[..size].chunks_exact_mut(2).skip(first) {
                        word[0] ^= 0xFF;
                        word[1] ^= 0xFF;
                    }
                }
                self.samples_transmitted = self
                    .registers
                    .get(&(self.config.generator_base + stream_generator::regs::SAMPLES))
                    .copied()
                    .unwrap_or(0);
                self.generator_busy = false;
            }
        } else {
            let sample = self.config.sample_size_bytes.max(2) as usize;
            let mut expected = vec![0u8; size];
            fill_pattern(&mut expected);
            for (got, want) in self.dma[..size]
                .chunks_exact(sample)
                .zip(expected.chunks_exact(sample))
            {
                self.checked_total += 1;
                if got == want {
                    self.checked_ok += 1;
                }
            }
        }

        let mut response = request;
        response.duration_ns = self.config.duration_ns;
        *frame = response.encode();
        Ok(())
    }
}

fn sim_error(request: &'static str, e: Errno) -> PpspError {
    PpspError::DeviceControl {
        request,
        device: PathBuf::from("simulated"),
        e,
    }
}

/// Handle on one simulated board. Clones share the same board.
#[derive(Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new(config: SimConfig) -> SimulatedBoard {
        SimulatedBoard {
            state: Arc::new(Mutex::new(BoardState::new(config))),
        }
    }

    /// Window and device handles backed by this board, ready to hand to a worker.
    pub fn board(&self) -> Board {
        Board {
            window: Arc::new(SimulatedWindow {
                state: self.state.clone(),
            }),
            device: Box::new(SimulatedDevice {
                state: self.state.clone(),
            }),
        }
    }

    /// Every transfer request seen so far, including failed ones.
    pub fn transfers(&self) -> Vec<TransferFrame> {
        self.with_state(|s| s.transfers.clone())
    }

    pub fn transfer_count(&self) -> usize {
        self.with_state(|s| s.transfers.len())
    }

    /// Register reads and writes plus buffer calls seen so far.
    pub fn hardware_accesses(&self) -> usize {
        self.with_state(|s| s.register_accesses + s.buffer_calls + s.transfers.len())
    }

    /// Make the next `START_TX` fail with `e`.
    pub fn fail_next_transfer(&self, e: Errno) {
        self.with_state(|s| s.fail_next_transfer = Some(e));
    }

    /// Keep the generator busy through write transfers.
    pub fn set_generator_stuck(&self, stuck: bool) {
        self.with_state(|s| s.generator_stuck = stuck);
    }

    /// Corrupt every pattern word from index `word` on in later write transfers.
    pub fn corrupt_pattern_from(&self, word: Option<usize>) {
        self.with_state(|s| s.corrupt_from_word = word);
    }

    /// Overwrite part of the DMA buffer, e.g. to break the pattern seen by the checker.
    pub fn poke_buffer(&self, offset: usize, data: &[u8]) {
        self.with_state(|s| s.dma[offset..offset + data.len()].copy_from_slice(data));
    }

    pub fn set_duration_ns(&self, duration_ns: u64) {
        self.with_state(|s| s.config.duration_ns = duration_ns);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BoardState) -> T) -> T {
        // a panicking test thread must not hide the board from the rest of the test
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

fn lock(state: &Mutex<BoardState>) -> Result<MutexGuard<'_, BoardState>, PpspError> {
    state
        .lock()
        .map_err(|_| PpspError::Internal(String::from("simulated board lock is poisoned")))
}

struct SimulatedWindow {
    state: Arc<Mutex<BoardState>>,
}

impl RegisterWindow for SimulatedWindow {
    fn size(&self) -> usize {
        lock(&self.state).map_or(0, |s| s.config.window_size)
    }

    fn read32(&self, offset: usize) -> Result<u32, PpspError> {
        lock(&self.state)?.read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<(), PpspError> {
        lock(&self.state)?.write32(offset, value)
    }
}

struct SimulatedDevice {
    state: Arc<Mutex<BoardState>>,
}

impl DeviceControl for SimulatedDevice {
    fn buffer_size(&self) -> usize {
        lock(&self.state).map_or(0, |s| s.dma.len())
    }

    fn start_transfer(&mut self, frame: &mut [u8; FRAME_SIZE]) -> Result<(), PpspError> {
        lock(&self.state)?.start_transfer(frame)
    }

    fn read_buffer(&mut self, buffer: &mut [u8]) -> Result<(), PpspError> {
        let mut state = lock(&self.state)?;
        state.buffer_calls += 1;
        let len = state.dma.len();
        if buffer.len() < len {
            return Err(PpspError::Argument(format!(
                "host buffer of {} bytes is smaller than the {len} byte DMA buffer",
                buffer.len()
            )));
        }
        buffer[..len].copy_from_slice(&state.dma);
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), PpspError> {
        let mut state = lock(&self.state)?;
        state.buffer_calls += 1;
        let len = state.dma.len();
        if buffer.len() < len {
            return Err(PpspError::Argument(format!(
                "host buffer of {} bytes is smaller than the {len} byte DMA buffer",
                buffer.len()
            )));
        }
        state.dma.copy_from_slice(&buffer[..len]);
        Ok(())
    }
}
