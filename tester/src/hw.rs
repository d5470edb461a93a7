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

//! Hardware access layer for one board interface.
//!
//! The worker only ever talks to the board through two seams:
//! - [`RegisterWindow`](register_window::RegisterWindow) - the memory-mapped control plane
//! - [`DeviceControl`](pcie_device::DeviceControl) - the blocking ioctl calls of the driver
//!
//! [`pcie_device`] implements both on top of the real character device and [`simulated`]
//! implements them in software for development machines and tests. The stream modules and the
//! transfer protocol are written against the traits only.

use crate::hw::pcie_device::DeviceControl;
use crate::hw::register_window::RegisterWindow;
use std::sync::Arc;

pub mod pcie_device;
pub mod register_window;
pub mod simulated;
pub mod transfer;

pub mod stream_modules {
    pub mod stream_checker;
    pub mod stream_generator;
}

/// The two hardware handles a worker owns for its whole life.
pub struct Board {
    pub window: Arc<dyn RegisterWindow>,
    pub device: Box<dyn DeviceControl>,
}
