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

//! DMA transfer protocol.
//!
//! One transfer is one `START_TX` call carrying a [`TransferFrame`]. The frame is both the
//! request and the response: the driver overwrites the duration in place.
//!
//! # Frame layout
//!
//! All multi-byte fields are little-endian. This matches the in-memory layout of the driver's
//! `struct pp_sp_tx_cmd_resp` on the little-endian hosts the board plugs into.
//! ```text
//! byte  0       dir_wr_rd_n   1 = write (card to host), 0 = read (host to card)
//! bytes 1..4    padding       always zero
//! bytes 4..8    size_bytes    u32
//! bytes 8..16   duration_ns   u64, filled in by the driver
//! ```
//!
//! The module also holds the arithmetic done on a finished transfer: throughput in decimal
//! megabytes per second and the counting-pattern check of a card-to-host buffer.

use crate::config::{BYTES_PER_MEGABYTE, DMA_BUFFER_SIZE};
use crate::error::PpspError;
use crate::hw::pcie_device::DeviceControl;
use crate::hw::stream_modules::stream_checker::IntegrityStats;
use log::debug;
use std::time::Duration;

pub const FRAME_SIZE: usize = 16;

const DIR_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const DURATION_OFFSET: usize = 8;

/// Decoded form of the 16 byte transfer request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFrame {
    /// `true` for a card-to-host (write) transfer.
    pub write: bool,
    pub size_bytes: u32,
    pub duration_ns: u64,
}

impl TransferFrame {
    pub fn request(write: bool, size_bytes: u32) -> TransferFrame {
        TransferFrame {
            write,
            size_bytes,
            duration_ns: 0,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[DIR_OFFSET] = u8::from(self.write);
        bytes[SIZE_OFFSET..DURATION_OFFSET].copy_from_slice(&self.size_bytes.to_le_bytes());
        bytes[DURATION_OFFSET..].copy_from_slice(&self.duration_ns.to_le_bytes());
        bytes
    }

    /// Decode a frame.
    ///
    /// # Returns: `Result<TransferFrame, PpspError>`
    /// * `Ok(TransferFrame)` - The decoded frame
    /// * `Err(PpspError::Protocol)` - The direction byte is neither 0 nor 1
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<TransferFrame, PpspError> {
        let write = match bytes[DIR_OFFSET] {
            0 => false,
            1 => true,
            other => {
                return Err(PpspError::Protocol(format!(
                    "direction flag is 0x{other:02X}"
                )));
            }
        };
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[SIZE_OFFSET..DURATION_OFFSET]);
        let mut duration = [0u8; 8];
        duration.copy_from_slice(&bytes[DURATION_OFFSET..]);
        Ok(TransferFrame {
            write,
            size_bytes: u32::from_le_bytes(size),
            duration_ns: u64::from_le_bytes(duration),
        })
    }
}

/// A completed transfer as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    pub size_bytes: u32,
    pub duration_ns: u64,
}

impl TransferResult {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns)
    }

    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(u64::from(self.size_bytes), self.duration_ns)
    }
}

/// Throughput of `size_bytes` moved in `duration_ns`, in decimal megabytes per second.
///
/// Returns 0 for a zero duration.
pub fn throughput_mbps(size_bytes: u64, duration_ns: u64) -> f64 {
    if duration_ns == 0 {
        return 0.0;
    }
    let seconds = duration_ns as f64 * 1e-9;
    size_bytes as f64 / seconds / BYTES_PER_MEGABYTE
}

/// Check a transfer size against what the driver and the stream modules accept.
///
/// The driver rejects sizes that are zero or not a multiple of 4, and a transfer cannot be
/// larger than the DMA buffer. A write transfer is produced by the generator, which only deals
/// in whole samples.
///
/// # Returns: `Result<(), PpspError>`
/// * `Ok(())` - `size_bytes` can be transferred
/// * `Err(PpspError::Argument)` - `size_bytes` would be rejected
pub fn validate_size(
    size_bytes: u32,
    write: bool,
    sample_size_bytes: u32,
) -> Result<(), PpspError> {
    if size_bytes == 0 || size_bytes % 4 != 0 {
        return Err(PpspError::Argument(format!(
            "transfer size {size_bytes} must be a non-zero multiple of 4 bytes"
        )));
    }
    if size_bytes as usize > DMA_BUFFER_SIZE {
        return Err(PpspError::Argument(format!(
            "transfer size {size_bytes} exceeds the {DMA_BUFFER_SIZE} byte DMA buffer"
        )));
    }
    if write && (sample_size_bytes == 0 || size_bytes % sample_size_bytes != 0) {
        return Err(PpspError::Argument(format!(
            "write transfer size {size_bytes} must be a multiple of the {sample_size_bytes} byte sample size"
        )));
    }
    Ok(())
}

/// Run one blocking transfer on `device`.
///
/// # Returns: `Result<TransferResult, PpspError>`
/// * `Ok(TransferResult)` - The transfer completed
/// * `Err(PpspError::DeviceControl)` - The device-control call failed
/// * `Err(PpspError::Protocol)` - The response frame is malformed: it does not echo the request
///   or reports a zero duration
pub fn run_transfer(
    device: &mut dyn DeviceControl,
    write: bool,
    size_bytes: u32,
) -> Result<TransferResult, PpspError> {
    let mut frame = TransferFrame::request(write, size_bytes).encode();
    device.start_transfer(&mut frame)?;
    let response = TransferFrame::decode(&frame)?;
    if response.write != write || response.size_bytes != size_bytes {
        return Err(PpspError::Protocol(format!(
            "request was (write = {write}, size = {size_bytes}), response is (write = {}, size = {})",
            response.write, response.size_bytes
        )));
    }
    if response.duration_ns == 0 {
        return Err(PpspError::Protocol(String::from(
            "driver reported a zero transfer duration",
        )));
    }
    debug!(
        "transfer of {size_bytes} bytes took {} ns",
        response.duration_ns
    );
    Ok(TransferResult {
        size_bytes,
        duration_ns: response.duration_ns,
    })
}

/// Fill `buffer` with the counting pattern the stream modules use: 16-bit little-endian words
/// where word `i` holds `i` truncated to 16 bits.
pub fn fill_pattern(buffer: &mut [u8]) {
    for (i, word) in buffer.chunks_exact_mut(2).enumerate() {
        word.copy_from_slice(&(i as u16).to_le_bytes());
    }
}

/// Compare the first `size_bytes` of `buffer` against the counting pattern.
///
/// The first `skip_words` words are not checked. Every remaining 16-bit word counts towards
/// `total`, and towards `ok` when it holds its own index.
pub fn pattern_integrity(buffer: &[u8], size_bytes: usize, skip_words: usize) -> IntegrityStats {
    let len = size_bytes.min(buffer.len());
    let mut stats = IntegrityStats::default();
    for (i, word) in buffer[..len].chunks_exact(2).enumerate().skip(skip_words) {
        stats.total += 1;
        if u16::from_le_bytes([word[0], word[1]]) == i as u16 {
            stats.ok += 1;
        }
    }
    stats
}
