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

//! Avalon-ST stream checker.
//!
//! The checker consumes the host-to-card stream and counts how many samples it saw and how many
//! of those matched the expected counting pattern.
//!
//! # Register map (module relative)
//! ```text
//! 0x00  ID          ro
//! 0x04  VERSION     ro
//! 0x10  SAMP_TOTAL  rw   samples checked, any write clears both counters
//! 0x14  SAMP_OK     ro   samples matching the pattern
//! ```

use crate::error::PpspError;
use crate::hw::register_window::RegisterBlock;
use log::{debug, info};

/// Checker register offsets.
pub mod regs {
    pub const ID: usize = 0x00;
    pub const VERSION: usize = 0x04;
    pub const SAMP_TOTAL: usize = 0x10;
    pub const SAMP_OK: usize = 0x14;
}

/// Checked versus matching sample counts of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityStats {
    pub total: u32,
    pub ok: u32,
}

impl IntegrityStats {
    /// Share of matching samples in percent, `None` when nothing was checked.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(f64::from(self.ok) / f64::from(self.total) * 100.0)
        }
    }

    pub fn is_clean(&self) -> bool {
        self.ok == self.total
    }
}

pub struct StreamChecker {
    block: RegisterBlock,
}

impl StreamChecker {
    /// Attach to the checker at `block` and log its identification registers.
    pub fn new(block: RegisterBlock) -> Result<StreamChecker, PpspError> {
        let id = block.read32(regs::ID)?;
        let version = block.read32(regs::VERSION)?;
        info!(
            "[stream checker @ 0x{:X}] id = {id:08x}, version = {version:08x}",
            block.base()
        );
        Ok(StreamChecker { block })
    }

    /// Reset the total and ok counters.
    pub fn clear(&self) -> Result<(), PpspError> {
        debug!("clearing stream checker counters");
        self.block.write32(regs::SAMP_TOTAL, 1)
    }

    pub fn stats(&self) -> Result<IntegrityStats, PpspError> {
        let total = self.block.read32(regs::SAMP_TOTAL)?;
        let ok = self.block.read32(regs::SAMP_OK)?;
        Ok(IntegrityStats { total, ok })
    }
}
