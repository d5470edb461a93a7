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

//! `ppsp_cli` - drive the transfer workers of one or two PCIe test boards from the command line.
//!
//! The controller discovers the boards (or takes them from `--dev`), logs their PCIe link,
//! starts one worker per board, sends every worker the same configuration and logs the
//! responses until `--count` transfers have been reported per board or Ctrl-C is pressed.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! # Examples
//!
//! ```bash
//! # 10 card-to-host transfers of 64 KiB on every discovered board, checking the data
//! ppsp_cli --mode write --size 65536 --count 10 --verify
//!
//! # host-to-card transfers on a given board until Ctrl-C
//! ppsp_cli --dev /dev/pp_sp_pcie_user_0000:05:00.0 --mode read --size 4096
//!
//! # try it out without hardware
//! RUST_LOG=debug ppsp_cli --simulate --mode write --size 1024 --count 3
//! ```

mod run;
mod status;

use clap::{ArgAction, Parser, ValueEnum};
use log::debug;
use ppsp_tester::comm::messages::TransferMode;
use ppsp_tester::config::{
    DEFAULT_TRANSFER_SIZE, MismatchPolicy, SAMPLE_SIZE_BYTES, WorkerConfig,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Card to host, data produced by the stream generator
    Write,
    /// Host to card, data consumed by the stream checker
    Read,
    Idle,
}

impl From<Mode> for TransferMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Write => TransferMode::Write,
            Mode::Read => TransferMode::Read,
            Mode::Idle => TransferMode::Idle,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ppsp_cli")]
#[command(bin_name = "ppsp_cli")]
#[command(about = "Measure DMA throughput and data integrity of PCIe FPGA test boards")]
struct Cli {
    #[arg(
        long = "dev",
        action = ArgAction::Append,
        help = r#"board character device to test, can be given twice.
Default value for this option is calculated in runtime and application
picks the first two boards in the system (/dev/pp_sp_pcie_user_*).
        "#
    )]
    dev: Vec<PathBuf>,
    #[arg(long, help = "run against simulated boards instead of hardware")]
    simulate: bool,
    #[arg(long, value_enum)]
    mode: Mode,
    #[arg(long, default_value_t = DEFAULT_TRANSFER_SIZE, help = "transfer size in bytes")]
    size: u32,
    #[arg(long, help = "stop after this many transfers per board")]
    count: Option<u64>,
    #[arg(long = "throttle-ms", default_value_t = 100, help = "pause between transfers")]
    throttle_ms: u64,
    #[arg(
        long = "sample-size",
        default_value_t = SAMPLE_SIZE_BYTES,
        help = "bytes per generator sample"
    )]
    sample_size: u32,
    #[arg(long, help = "read back card-to-host data and check the counting pattern")]
    verify: bool,
    #[arg(long = "halt-on-mismatch", help = "park a board's worker when its data does not match")]
    halt_on_mismatch: bool,
    #[arg(
        long = "prime-read-buffer",
        help = "upload the counting pattern before host-to-card transfers"
    )]
    prime_read_buffer: bool,
}

impl Cli {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            throttle: Duration::from_millis(self.throttle_ms),
            sample_size_bytes: self.sample_size,
            verify_write_data: self.verify,
            mismatch_policy: if self.halt_on_mismatch {
                MismatchPolicy::Halt
            } else {
                MismatchPolicy::Report
            },
            prime_read_buffer: self.prime_read_buffer,
            ..WorkerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    run::run(&cli).await
}
