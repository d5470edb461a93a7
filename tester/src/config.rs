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

//! Board constants and the explicit configuration handed to each worker.
//!
//! Nothing in the crate opens a compiled-in device path: every [`Worker`](crate::worker::Worker)
//! is built from an [`InterfaceConfig`] (where the hardware is) and a [`WorkerConfig`] (how the
//! transfer loop behaves). The constants below are only the defaults those structs start from.

use crate::error::PpspError;
use std::path::PathBuf;
use std::time::Duration;

/// The directory the `pp_sp_pcie` driver creates its character devices in.
pub static DEVICE_DIR: &str = "/dev/";

/// File name prefix of the user character devices, followed by the PCI address of the board,
/// e.g. `/dev/pp_sp_pcie_user_0000:05:00.0`.
pub static DEVICE_PREFIX: &str = "pp_sp_pcie_user_";

/// The sysfs directory holding one entry per PCI device bound to the `pp_sp_pcie` driver.
pub static DRIVER_SYSFS_DIR: &str = "/sys/module/pp_sp_pcie/drivers/pci:pp_sp_pcie/";

/// Size of the control-plane mapping of the character device.
pub const WINDOW_SIZE: usize = 4 * 1024 * 1024;

/// Size of the driver's coherent DMA buffer. `GET_BUFFER` and `SET_BUFFER` always copy this many
/// bytes.
pub const DMA_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Default offset of the stream checker inside the register window.
pub const CHECKER_BASE: usize = 0x10000;

/// Default offset of the stream generator inside the register window.
pub const GENERATOR_BASE: usize = 0x11000;

/// Address span reserved for one stream module.
pub const MODULE_SPAN: usize = 0x1000;

/// Bytes carried by one generator/checker sample (a 256-bit Avalon-ST beat).
pub const SAMPLE_SIZE_BYTES: u32 = 32;

/// Leading 16-bit words of a card-to-host buffer that are not part of the counting pattern.
pub const PATTERN_SKIP_WORDS: usize = 32;

/// Transfer size a worker starts with before the first command arrives.
pub const DEFAULT_TRANSFER_SIZE: u32 = 1024;

/// How long an idle worker waits for a command before looping.
pub const IDLE_POLL: Duration = Duration::from_millis(100);

/// Pause between two transfers so the device-control interface is not saturated.
pub const TRANSFER_THROTTLE: Duration = Duration::from_millis(100);

/// Bytes per megabyte used for every throughput figure (decimal megabytes).
pub const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;

/// Where one board interface lives and how its register window is laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceConfig {
    /// Human readable name used for the worker thread and log lines.
    pub name: String,
    pub device_path: PathBuf,
    pub window_size: usize,
    pub generator_base: usize,
    pub checker_base: usize,
}

impl InterfaceConfig {
    /// Configuration for `device_path` using the reference design's window layout.
    pub fn new(name: impl Into<String>, device_path: impl Into<PathBuf>) -> InterfaceConfig {
        InterfaceConfig {
            name: name.into(),
            device_path: device_path.into(),
            window_size: WINDOW_SIZE,
            generator_base: GENERATOR_BASE,
            checker_base: CHECKER_BASE,
        }
    }

    /// Check that both stream modules fit in the window, are word aligned and do not overlap.
    ///
    /// # Returns: `Result<(), PpspError>`
    /// * `Ok(())` - Layout is usable
    /// * `Err(PpspError::Config)` - A module base is misaligned, outside the window, or the two
    ///   module ranges overlap
    pub fn validate(&self) -> Result<(), PpspError> {
        for (module, base) in [
            ("generator", self.generator_base),
            ("checker", self.checker_base),
        ] {
            if base % 4 != 0 {
                return Err(PpspError::Config(format!(
                    "{} {module} base 0x{base:X} is not 32-bit aligned",
                    self.name
                )));
            }
            if base
                .checked_add(MODULE_SPAN)
                .is_none_or(|end| end > self.window_size)
            {
                return Err(PpspError::Config(format!(
                    "{} {module} base 0x{base:X} does not fit in a 0x{:X} byte window",
                    self.name, self.window_size
                )));
            }
        }
        if self.generator_base.abs_diff(self.checker_base) < MODULE_SPAN {
            return Err(PpspError::Config(format!(
                "{} generator (0x{:X}) and checker (0x{:X}) register ranges overlap",
                self.name, self.generator_base, self.checker_base
            )));
        }
        Ok(())
    }
}

/// What a worker does when the data it checked does not fully match the expected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Report the integrity percentage in the transfer response and keep going.
    #[default]
    Report,
    /// Emit an error response and park the worker in idle.
    Halt,
}

/// Transfer loop tuning shared by every worker of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub initial_size_bytes: u32,
    pub idle_poll: Duration,
    pub throttle: Duration,
    pub sample_size_bytes: u32,
    /// Read back the DMA buffer after a card-to-host transfer and compare it to the pattern.
    pub verify_write_data: bool,
    pub pattern_skip_words: usize,
    pub mismatch_policy: MismatchPolicy,
    /// Upload the counting pattern into the DMA buffer before the first host-to-card transfer of
    /// each read configuration.
    pub prime_read_buffer: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            initial_size_bytes: DEFAULT_TRANSFER_SIZE,
            idle_poll: IDLE_POLL,
            throttle: TRANSFER_THROTTLE,
            sample_size_bytes: SAMPLE_SIZE_BYTES,
            verify_write_data: false,
            pattern_skip_words: PATTERN_SKIP_WORDS,
            mismatch_policy: MismatchPolicy::default(),
            prime_read_buffer: false,
        }
    }
}
