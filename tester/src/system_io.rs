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

//! Error Wrapping File System I/O Helpers
//!
//! This module provides thin wrappers around the file system operations the tester needs, with
//! automatic conversion to `PpspError` types. All functions include trace logging for debugging
//! and provide error context including the path involved.
//!
//! Includes: sysfs attribute reads, directory listing and opening the board's character device.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use ppsp_tester::system_io::{fs_read, open_device};
//! # use std::path::Path;
//!
//! # fn example() -> Result<(), ppsp_tester::error::PpspError> {
//! let width = fs_read(Path::new(
//!     "/sys/module/pp_sp_pcie/drivers/pci:pp_sp_pcie/0000:05:00.0/current_link_width",
//! ))?;
//! let device = open_device(Path::new("/dev/pp_sp_pcie_user_0000:05:00.0"))?;
//! # Ok(())
//! # }
//! ```

use crate::error::PpspError;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Read the contents of a file to a String.
///
/// This is a convenient wrapper around `std::fs::File::read_to_string` that provides
/// trace logging and automatic error conversion to `PpspError::IORead`.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, PpspError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(PpspError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, PpspError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(PpspError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the contents of a directory and return entry names.
///
/// Returns entry names (not full paths). Entries that cannot be read are silently skipped.
///
/// # Arguments
///
/// * `dir` - The directory path to list
///
/// # Returns: `Result<Vec<String>, PpspError>`
/// * `Ok(Vec<String>)` - List of entry names in the directory
/// * `Err(PpspError::IOReadDir)` - If the directory cannot be read
pub fn fs_read_dir(dir: &Path) -> Result<Vec<String>, PpspError> {
    trace!("Attempting to read directory '{dir:?}'");
    std::fs::read_dir(dir).map_or_else(
        |e| {
            Err(PpspError::IOReadDir {
                dir: dir.to_owned(),
                e,
            })
        },
        |iter| {
            let ret = iter
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            trace!("Dir reading done.");
            Ok(ret)
        },
    )
}

/// Open a board character device for register mapping and device-control calls.
///
/// The device is opened read-write with `O_SYNC` so register writes through the mapping are not
/// held back by the page cache.
///
/// # Arguments
///
/// * `device_path` - Path of the character device, e.g. `/dev/pp_sp_pcie_user_0000:05:00.0`
///
/// # Returns: `Result<File, PpspError>`
/// * `Ok(File)` - The open device
/// * `Err(PpspError::DeviceOpen)` - The device does not exist or permissions are missing
pub fn open_device(device_path: &Path) -> Result<File, PpspError> {
    trace!("Attempting to open device {device_path:?}");
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(nix::libc::O_SYNC)
        .open(device_path)
        .map_err(|e| PpspError::DeviceOpen {
            device: device_path.into(),
            e,
        })
}
