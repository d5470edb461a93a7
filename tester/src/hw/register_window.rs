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

//! Register window abstraction.
//!
//! A register window is the control-plane address space of one board: a fixed-size byte region
//! with 32-bit access primitives. Hardware modules never hold the window directly, they hold a
//! [`RegisterBlock`], which is the window plus the module's base offset.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use ppsp_tester::hw::register_window::{MappedWindow, RegisterBlock, RegisterWindow};
//! # use ppsp_tester::system_io::open_device;
//! # use std::path::Path;
//! # use std::sync::Arc;
//! # fn example() -> Result<(), ppsp_tester::error::PpspError> {
//! let path = Path::new("/dev/pp_sp_pcie_user_0000:05:00.0");
//! let file = open_device(path)?;
//! let window: Arc<dyn RegisterWindow> = Arc::new(MappedWindow::map(&file, path, 4 << 20)?);
//! let generator = RegisterBlock::new(window, 0x11000);
//! println!("id = 0x{:08X}", generator.read32(0x00)?);
//! # Ok(())
//! # }
//! ```

use crate::error::PpspError;
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fs::File;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

/// Trait for a fixed-size, memory-mapped control-plane region.
pub trait RegisterWindow: Send + Sync {
    /// Size of the window in bytes.
    fn size(&self) -> usize;

    /// Read the 32-bit word at `offset`.
    ///
    /// # Returns: `Result<u32, PpspError>`
    /// * `Ok(u32)` - Value of the word, freshly read from the device
    /// * `Err(PpspError::OutOfRange)` - `[offset, offset + 4)` is not inside the window
    /// * `Err(PpspError::Misaligned)` - `offset` is not a multiple of 4
    fn read32(&self, offset: usize) -> Result<u32, PpspError>;

    /// Write the 32-bit word at `offset`.
    ///
    /// # Returns: `Result<(), PpspError>`
    /// * `Ok(())` - Word written
    /// * `Err(PpspError::OutOfRange)` - `[offset, offset + 4)` is not inside the window
    /// * `Err(PpspError::Misaligned)` - `offset` is not a multiple of 4
    fn write32(&self, offset: usize, value: u32) -> Result<(), PpspError>;
}

/// Validate a 32-bit access at `offset` against a window of `window` bytes.
pub fn check_access(offset: usize, window: usize) -> Result<(), PpspError> {
    if offset % 4 != 0 {
        return Err(PpspError::Misaligned { offset });
    }
    match offset.checked_add(4) {
        Some(end) if end <= window => Ok(()),
        _ => Err(PpspError::OutOfRange { offset, window }),
    }
}

/// Register window backed by a shared mapping of the board's character device.
pub struct MappedWindow {
    map: MmapRaw,
}

impl MappedWindow {
    /// Map the first `size` bytes of an open device.
    ///
    /// # Arguments
    ///
    /// * `file` - The device, opened read-write
    /// * `device_path` - Path of the device, for error reporting
    /// * `size` - Number of bytes to map
    ///
    /// # Returns: `Result<MappedWindow, PpspError>`
    /// * `Ok(MappedWindow)` - The mapping
    /// * `Err(PpspError::DeviceMap)` - mmap failed
    pub fn map(file: &File, device_path: &Path, size: usize) -> Result<MappedWindow, PpspError> {
        trace!("Mapping {size} bytes of {device_path:?}");
        let map = MmapOptions::new()
            .len(size)
            .map_raw(file)
            .map_err(|e| PpspError::DeviceMap {
                device: device_path.into(),
                size,
                e,
            })?;
        Ok(MappedWindow { map })
    }
}

impl RegisterWindow for MappedWindow {
    fn size(&self) -> usize {
        self.map.len()
    }

    fn read32(&self, offset: usize) -> Result<u32, PpspError> {
        check_access(offset, self.size())?;
        // SAFETY: the access is aligned and inside the mapping, which lives as long as `self`.
        let value = unsafe { ptr::read_volatile(self.map.as_ptr().add(offset) as *const u32) };
        trace!("rd32 0x{offset:06X} -> 0x{value:08X}");
        Ok(value)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<(), PpspError> {
        check_access(offset, self.size())?;
        trace!("wr32 0x{offset:06X} <- 0x{value:08X}");
        // SAFETY: see `read32`.
        unsafe { ptr::write_volatile(self.map.as_mut_ptr().add(offset) as *mut u32, value) };
        Ok(())
    }
}

/// A register window seen from one hardware module: every offset is relative to `base`.
#[derive(Clone)]
pub struct RegisterBlock {
    window: Arc<dyn RegisterWindow>,
    base: usize,
}

impl RegisterBlock {
    pub fn new(window: Arc<dyn RegisterWindow>, base: usize) -> RegisterBlock {
        RegisterBlock { window, base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn read32(&self, reg: usize) -> Result<u32, PpspError> {
        self.window.read32(self.absolute(reg)?)
    }

    pub fn write32(&self, reg: usize, value: u32) -> Result<(), PpspError> {
        self.window.write32(self.absolute(reg)?, value)
    }

    fn absolute(&self, reg: usize) -> Result<usize, PpspError> {
        self.base.checked_add(reg).ok_or(PpspError::OutOfRange {
            offset: reg,
            window: self.window.size(),
        })
    }
}
