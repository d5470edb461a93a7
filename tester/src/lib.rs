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

//! ppsp-tester - DMA throughput and data-integrity workers for PCIe FPGA test boards.
//!
//! The crate drives the streaming reference design of the Pikes Peak/Storey Peak boards through
//! the `pp_sp_pcie` driver. Each board interface gets a worker thread that owns the board's
//! register window and device-control handle, takes commands from a controller over a channel
//! pair and reports one response per DMA transfer:
//! - write mode moves data card to host: the stream generator produces it
//! - read mode moves data host to card: the stream checker validates it
//!
//! # Modules
//!
//! - [`config`] - board constants and the per-interface/per-worker configuration
//! - [`hw`] - register window, stream modules, transfer protocol, device and simulated board
//! - [`comm`] - commands, responses and the channel pair
//! - [`worker`] - the transfer state machine
//! - [`session`] - up to two workers under stable interface identities
//! - [`link`] - board discovery and PCIe link capabilities from sysfs
//! - [`system_io`] - file and device helpers with logging and error conversion
//! - [`error`] - the crate error type
//!
//! # Logging
//!
//! Everything logs through the [`log`] facade: register and file accesses at `trace`, worker
//! lifecycle at `info`/`debug` and failures at `warn`/`error`. The binary picks the logger.

pub mod comm;
pub mod config;
pub mod error;
pub mod hw;
pub mod link;
pub mod session;
pub mod system_io;
pub mod worker;
