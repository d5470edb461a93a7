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

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PpspError {
    #[error("PpspError::Argument: {0}")]
    Argument(String),
    #[error("PpspError::Config: Invalid interface configuration: {0}")]
    Config(String),
    #[error("PpspError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("PpspError::IOReadDir: An IO error occurred when reading directory {dir:?}: {e}")]
    IOReadDir { dir: PathBuf, e: std::io::Error },
    #[error("PpspError::LinkParse: Cannot interpret {value:?} read from {file:?}")]
    LinkParse { file: PathBuf, value: String },
    #[error("PpspError::DeviceOpen: Failed to open {device:?}: {e}")]
    DeviceOpen { device: PathBuf, e: std::io::Error },
    #[error("PpspError::DeviceMap: Failed to map {size} bytes of {device:?}: {e}")]
    DeviceMap {
        device: PathBuf,
        size: usize,
        e: std::io::Error,
    },
    #[error("PpspError::OutOfRange: Register access at 0x{offset:X} is outside the 0x{window:X} byte window")]
    OutOfRange { offset: usize, window: usize },
    #[error("PpspError::Misaligned: Register access at 0x{offset:X} is not 32-bit aligned")]
    Misaligned { offset: usize },
    #[error("PpspError::DeviceControl: {request} failed on {device:?}: {e}")]
    DeviceControl {
        request: &'static str,
        device: PathBuf,
        e: nix::errno::Errno,
    },
    #[error("PpspError::Protocol: Malformed transfer response: {0}")]
    Protocol(String),
    #[error("PpspError::Consistency: Stream generator state is not as expected: {0}")]
    Consistency(String),
    #[error("PpspError::Integrity: Data integrity check failed: {0}")]
    Integrity(String),
    #[error("PpspError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl PpspError {
    /// Whether the error must terminate the worker that hit it.
    ///
    /// Device-control, protocol and register faults leave the hardware in an unknown state, so
    /// the worker stops. Consistency and integrity errors are reported and the worker parks in
    /// idle until the controller decides what to do next.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PpspError::Argument(..) | PpspError::Consistency(..) | PpspError::Integrity(..)
        )
    }
}
