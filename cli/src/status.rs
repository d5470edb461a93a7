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

//! Board link reporting.

use log::{info, warn};
use ppsp_tester::link::link_stats;
use ppsp_tester::session::InterfaceId;
use std::path::Path;

/// Log the PCIe link of the board behind `device`, warning when it trained below its maximum.
///
/// Missing link information never stops a test run, it only limits what the throughput figures
/// can be compared against.
pub(crate) fn log_link_stats(id: InterfaceId, device: &Path) {
    match link_stats(device) {
        Ok(stats) => {
            info!("{id}: {device:?} link {stats}");
            if stats.is_degraded() {
                warn!(
                    "{id}: link runs below its capability, expect at most {:.2} MB/s instead of {:.2} MB/s",
                    stats.current_mbps(),
                    stats.capable_mbps()
                );
            }
        }
        Err(e) => warn!("{id}: no link information for {device:?}: {e}"),
    }
}
