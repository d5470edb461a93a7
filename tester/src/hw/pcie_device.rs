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

//! The `pp_sp_pcie` character device.
//!
//! The kernel driver exposes one character device per board. It supports `mmap` of the BAR
//! holding the stream modules and three ioctls:
//!
//! | request     | code         | argument                                        |
//! |-------------|--------------|-------------------------------------------------|
//! | SET_BUFFER  | `0x40082501` | host buffer, copied into the 128 MiB DMA buffer |
//! | GET_BUFFER  | `0x80082501` | host buffer, filled from the 128 MiB DMA buffer |
//! | START_TX    | `0xC0082502` | 16 byte [`TransferFrame`](crate::hw::transfer::TransferFrame) |
//!
//! `START_TX` blocks until the DMA engine raises its completion interrupt (or the driver's
//! 10 second timeout expires) and writes the elapsed time into the frame.

use crate::config::{DMA_BUFFER_SIZE, InterfaceConfig};
use crate::error::PpspError;
use crate::hw::Board;
use crate::hw::register_window::MappedWindow;
use crate::hw::transfer::FRAME_SIZE;
use crate::system_io::open_device;
use log::{info, trace};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;

const PP_SP_IOCTL_MAGIC: u8 = 0x25;

// The driver declares every request with `void*` as its argument type, so the size field of
// each code is the pointer width and not the size of the data that is actually copied.
const PP_SP_IOCTL_SET_BUFFER: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_write!(PP_SP_IOCTL_MAGIC, 1, std::mem::size_of::<*const u8>());
const PP_SP_IOCTL_GET_BUFFER: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_read!(PP_SP_IOCTL_MAGIC, 1, std::mem::size_of::<*const u8>());
const PP_SP_IOCTL_START_TX: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_readwrite!(PP_SP_IOCTL_MAGIC, 2, std::mem::size_of::<*const u8>());

nix::ioctl_write_ptr_bad!(pp_sp_set_buffer, PP_SP_IOCTL_SET_BUFFER, u8);
nix::ioctl_read_bad!(pp_sp_get_buffer, PP_SP_IOCTL_GET_BUFFER, u8);
nix::ioctl_readwrite_bad!(pp_sp_start_tx, PP_SP_IOCTL_START_TX, [u8; FRAME_SIZE]);

/// Trait for the blocking device-control calls of one board.
pub trait DeviceControl: Send {
    /// Size of the DMA buffer moved by [`read_buffer`](DeviceControl::read_buffer) and
    /// [`write_buffer`](DeviceControl::write_buffer).
    fn buffer_size(&self) -> usize;

    /// Run one DMA transfer described by `frame`.
    ///
    /// Blocks until the transfer completes. On success the duration field of `frame` has been
    /// overwritten by the driver.
    ///
    /// # Returns: `Result<(), PpspError>`
    /// * `Ok(())` - Transfer finished, `frame` holds the measured duration
    /// * `Err(PpspError::DeviceControl)` - The driver rejected the request or the call failed
    fn start_transfer(&mut self, frame: &mut [u8; FRAME_SIZE]) -> Result<(), PpspError>;

    /// Copy the DMA buffer into `buffer`, which must hold at least
    /// [`buffer_size`](DeviceControl::buffer_size) bytes.
    fn read_buffer(&mut self, buffer: &mut [u8]) -> Result<(), PpspError>;

    /// Copy `buffer`, at least [`buffer_size`](DeviceControl::buffer_size) bytes, into the DMA
    /// buffer.
    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), PpspError>;
}

/// An open `pp_sp_pcie` character device.
pub struct PcieDevice {
    path: PathBuf,
    file: File,
}

impl PcieDevice {
    /// Open the device named in `config` and map its register window.
    ///
    /// # Arguments
    ///
    /// * `config` - The interface to open, validated before anything is touched
    ///
    /// # Returns: `Result<Board, PpspError>`
    /// * `Ok(Board)` - The mapped window and the device-control handle
    /// * `Err(PpspError::Config)` - The register layout in `config` is unusable
    /// * `Err(PpspError::DeviceOpen)` - The device could not be opened
    /// * `Err(PpspError::DeviceMap)` - The window could not be mapped
    pub fn open(config: &InterfaceConfig) -> Result<Board, PpspError> {
        config.validate()?;
        let file = open_device(&config.device_path)?;
        let window = MappedWindow::map(&file, &config.device_path, config.window_size)?;
        info!(
            "{}: opened {:?} with a 0x{:X} byte register window",
            config.name, config.device_path, config.window_size
        );
        Ok(Board {
            window: Arc::new(window),
            device: Box::new(PcieDevice {
                path: config.device_path.clone(),
                file,
            }),
        })
    }

    fn check_buffer_len(&self, len: usize) -> Result<(), PpspError> {
        if len < DMA_BUFFER_SIZE {
            return Err(PpspError::Argument(format!(
                "host buffer of {len} bytes is smaller than the {DMA_BUFFER_SIZE} byte DMA buffer of {:?}",
                self.path
            )));
        }
        Ok(())
    }

    fn control_error(&self, request: &'static str, e: nix::errno::Errno) -> PpspError {
        PpspError::DeviceControl {
            request,
            device: self.path.clone(),
            e,
        }
    }
}

impl DeviceControl for PcieDevice {
    fn buffer_size(&self) -> usize {
        DMA_BUFFER_SIZE
    }

    fn start_transfer(&mut self, frame: &mut [u8; FRAME_SIZE]) -> Result<(), PpspError> {
        trace!("START_TX {frame:02X?}");
        // SAFETY: the driver reads and writes exactly one frame through the pointer.
        unsafe { pp_sp_start_tx(self.file.as_raw_fd(), frame) }
            .map_err(|e| self.control_error("START_TX", e))?;
        trace!("START_TX done {frame:02X?}");
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &mut [u8]) -> Result<(), PpspError> {
        self.check_buffer_len(buffer.len())?;
        trace!("GET_BUFFER into {} bytes", buffer.len());
        // SAFETY: the driver writes DMA_BUFFER_SIZE bytes and `buffer` is at least that long.
        unsafe { pp_sp_get_buffer(self.file.as_raw_fd(), buffer.as_mut_ptr()) }
            .map_err(|e| self.control_error("GET_BUFFER", e))?;
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &[u8]) -> Result<(), PpspError> {
        self.check_buffer_len(buffer.len())?;
        trace!("SET_BUFFER from {} bytes", buffer.len());
        // SAFETY: the driver reads DMA_BUFFER_SIZE bytes and `buffer` is at least that long.
        unsafe { pp_sp_set_buffer(self.file.as_raw_fd(), buffer.as_ptr()) }
            .map_err(|e| self.control_error("SET_BUFFER", e))?;
        Ok(())
    }
}
