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

//! Avalon-ST stream generator.
//!
//! The generator produces a counting pattern on the card-to-host stream. It is started with a
//! sample count and reports busy until the DMA engine has drained all requested samples.
//!
//! # Register map (module relative)
//! ```text
//! 0x00  ID          ro
//! 0x04  VERSION     ro
//! 0x10  STATUS      ro   bit 0 = busy
//! 0x14  CONTROL     wo   write 1 = start
//! 0x20  SAMPLES     rw   samples to produce
//! 0x24  SAMPLES_TX  ro   samples transmitted since start
//! ```

use crate::error::PpspError;
use crate::hw::register_window::RegisterBlock;
use log::{debug, info};

/// Generator register offsets.
pub mod regs {
    pub const ID: usize = 0x00;
    pub const VERSION: usize = 0x04;
    pub const STATUS: usize = 0x10;
    pub const CONTROL: usize = 0x14;
    pub const SAMPLES: usize = 0x20;
    pub const SAMPLES_TX: usize = 0x24;

    pub const STATUS_BUSY: u32 = 1 << 0;
    pub const CONTROL_START: u32 = 1;
}

/// Snapshot of the generator status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorState {
    pub busy: bool,
    pub samples_transmitted: u32,
}

pub struct StreamGenerator {
    block: RegisterBlock,
}

impl StreamGenerator {
    /// Attach to the generator at `block` and log its identification registers.
    pub fn new(block: RegisterBlock) -> Result<StreamGenerator, PpspError> {
        let id = block.read32(regs::ID)?;
        let version = block.read32(regs::VERSION)?;
        info!(
            "[stream generator @ 0x{:X}] id = {id:08x}, version = {version:08x}",
            block.base()
        );
        Ok(StreamGenerator { block })
    }

    /// Program the sample count, then start the generator.
    pub fn start(&self, sample_count: u32) -> Result<(), PpspError> {
        debug!("starting stream generator for {sample_count} samples");
        self.block.write32(regs::SAMPLES, sample_count)?;
        self.block.write32(regs::CONTROL, regs::CONTROL_START)
    }

    /// Read the busy flag and transmitted sample counter as they are right now.
    pub fn state(&self) -> Result<GeneratorState, PpspError> {
        let status = self.block.read32(regs::STATUS)?;
        let samples_transmitted = self.block.read32(regs::SAMPLES_TX)?;
        Ok(GeneratorState {
            busy: status & regs::STATUS_BUSY != 0,
            samples_transmitted,
        })
    }
}
