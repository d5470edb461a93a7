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

//! Commands sent to a worker and the responses it sends back.

use std::fmt;

/// Which DMA direction a worker exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Idle,
    /// Card to host: the stream generator feeds the DMA engine.
    Write,
    /// Host to card: the DMA engine feeds the stream checker.
    Read,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferMode::Idle => "idle",
            TransferMode::Write => "write",
            TransferMode::Read => "read",
        };
        f.write_str(name)
    }
}

/// A request from the controller. A `Configure` replaces the worker's whole configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Configure { mode: TransferMode, size_bytes: u32 },
    Stop,
}

impl Command {
    pub fn configure(mode: TransferMode, size_bytes: u32) -> Command {
        Command::Configure { mode, size_bytes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Lifecycle notice, no measurement.
    Info,
    /// Result of one completed transfer.
    Transfer,
    /// A failed iteration or rejected command.
    Error,
}

/// A message from a worker. Transfer responses set exactly one of the throughput fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub kind: ResponseKind,
    pub message: String,
    /// Host-to-card throughput in MB/s.
    pub read_throughput: f64,
    /// Card-to-host throughput in MB/s.
    pub write_throughput: f64,
    /// Share of checked data that matched the pattern, in percent.
    pub integrity: Option<f64>,
}

impl Response {
    pub fn info(message: impl Into<String>) -> Response {
        Response {
            kind: ResponseKind::Info,
            message: message.into(),
            read_throughput: 0.0,
            write_throughput: 0.0,
            integrity: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Response {
        Response {
            kind: ResponseKind::Error,
            ..Response::info(message)
        }
    }

    /// A transfer result; `throughput` lands in the field matching `mode`.
    pub fn transfer(
        mode: TransferMode,
        message: impl Into<String>,
        throughput: f64,
        integrity: Option<f64>,
    ) -> Response {
        let (read_throughput, write_throughput) = match mode {
            TransferMode::Read => (throughput, 0.0),
            TransferMode::Write => (0.0, throughput),
            TransferMode::Idle => (0.0, 0.0),
        };
        Response {
            kind: ResponseKind::Transfer,
            message: message.into(),
            read_throughput,
            write_throughput,
            integrity,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }
}
