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

//! Board discovery and PCIe link capabilities.
//!
//! The driver names its character devices after the PCI address of the board and the kernel
//! publishes the negotiated link of that address in sysfs:
//!
//! ```text
//! /dev/pp_sp_pcie_user_0000:05:00.0
//! /sys/module/pp_sp_pcie/drivers/pci:pp_sp_pcie/0000:05:00.0/
//!     current_link_width     "8"
//!     current_link_speed     "8.0 GT/s PCIe"
//!     max_link_width         "8"
//!     max_link_speed         "8.0 GT/s PCIe"
//! ```
//!
//! The theoretical payload ceiling of a link is what the measured throughput is compared
//! against.

use crate::config::{DEVICE_DIR, DEVICE_PREFIX, DRIVER_SYSFS_DIR};
use crate::error::PpspError;
use crate::system_io::{fs_read, fs_read_dir};
use log::{debug, trace};
use std::fmt;
use std::path::{Path, PathBuf};

/// Negotiated and maximum link of one board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStats {
    pub width: u32,
    /// Transfer rate per lane in GT/s.
    pub speed_gts: f64,
    pub max_width: u32,
    pub max_speed_gts: f64,
}

impl LinkStats {
    /// Payload ceiling of the negotiated link in MB/s.
    pub fn current_mbps(&self) -> f64 {
        max_throughput_mbps(self.speed_gts, self.width)
    }

    /// Payload ceiling the board could reach in a better slot, in MB/s.
    pub fn capable_mbps(&self) -> f64 {
        max_throughput_mbps(self.max_speed_gts, self.max_width)
    }

    /// The link trained below what both ends support.
    pub fn is_degraded(&self) -> bool {
        self.width < self.max_width || self.speed_gts < self.max_speed_gts
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x{} @ {} GT/s ({:.2} MB/s), max x{} @ {} GT/s ({:.2} MB/s)",
            self.width,
            self.speed_gts,
            self.current_mbps(),
            self.max_width,
            self.max_speed_gts,
            self.capable_mbps()
        )
    }
}

/// Theoretical payload throughput of `lanes` lanes running at `gts` GT/s, in MB/s.
///
/// Gen1 and Gen2 links (below 8 GT/s) use 8b/10b line encoding, Gen3 and later use 128b/130b.
pub fn max_throughput_mbps(gts: f64, lanes: u32) -> f64 {
    let encoding = if gts < 8.0 { 8.0 / 10.0 } else { 128.0 / 130.0 };
    gts * f64::from(lanes) * encoding / 8.0 * 1000.0
}

/// Parse a sysfs link speed such as `"8.0 GT/s PCIe"` or `"2.5 GT/s"` into GT/s.
pub fn parse_speed_gts(value: &str) -> Option<f64> {
    let mut parts = value.split_whitespace();
    let number = parts.next()?.parse::<f64>().ok()?;
    (parts.next()? == "GT/s").then_some(number)
}

/// Parse a sysfs link width such as `"8"` or `"x8"`.
pub fn parse_width(value: &str) -> Option<u32> {
    let value = value.trim();
    value.strip_prefix('x').unwrap_or(value).parse().ok()
}

/// The PCI address encoded in a board device path.
///
/// # Returns: `Result<String, PpspError>`
/// * `Ok(String)` - The address, e.g. `0000:05:00.0`
/// * `Err(PpspError::Argument)` - The path does not name a board user device
pub fn pci_address_from_device_path(device_path: &Path) -> Result<String, PpspError> {
    device_path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(DEVICE_PREFIX))
        .filter(|address| !address.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            PpspError::Argument(format!(
                "{device_path:?} is not a {DEVICE_PREFIX}<pci address> device"
            ))
        })
}

/// Link capabilities of the board behind `device_path`.
pub fn link_stats(device_path: &Path) -> Result<LinkStats, PpspError> {
    let address = pci_address_from_device_path(device_path)?;
    link_stats_in(&Path::new(DRIVER_SYSFS_DIR).join(address))
}

/// Link capabilities read from a PCI device directory in sysfs.
///
/// # Returns: `Result<LinkStats, PpspError>`
/// * `Ok(LinkStats)` - All four attributes were read and understood
/// * `Err(PpspError::IORead)` - An attribute is missing
/// * `Err(PpspError::LinkParse)` - An attribute holds something unexpected, e.g. `Unknown`
pub fn link_stats_in(pci_dir: &Path) -> Result<LinkStats, PpspError> {
    trace!("reading link attributes from {pci_dir:?}");
    let stats = LinkStats {
        width: read_attr(pci_dir, "current_link_width", parse_width)?,
        speed_gts: read_attr(pci_dir, "current_link_speed", parse_speed_gts)?,
        max_width: read_attr(pci_dir, "max_link_width", parse_width)?,
        max_speed_gts: read_attr(pci_dir, "max_link_speed", parse_speed_gts)?,
    };
    debug!("{pci_dir:?}: {stats}");
    Ok(stats)
}

fn read_attr<T>(
    pci_dir: &Path,
    attr: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, PpspError> {
    let file = pci_dir.join(attr);
    let value = fs_read(&file)?;
    parse(value.trim()).ok_or_else(|| PpspError::LinkParse {
        file,
        value: value.trim().to_owned(),
    })
}

/// Board user devices present in `/dev`, sorted by PCI address.
pub fn discover_devices() -> Result<Vec<PathBuf>, PpspError> {
    discover_devices_in(Path::new(DEVICE_DIR))
}

pub fn discover_devices_in(dev_dir: &Path) -> Result<Vec<PathBuf>, PpspError> {
    let mut names: Vec<String> = fs_read_dir(dev_dir)?
        .into_iter()
        .filter(|name| name.starts_with(DEVICE_PREFIX))
        .collect();
    names.sort();
    debug!("found {} board device(s) in {dev_dir:?}", names.len());
    Ok(names.into_iter().map(|name| dev_dir.join(name)).collect())
}
