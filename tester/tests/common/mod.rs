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

//! Helpers shared by the integration tests. Everything runs against the simulated board.

#![allow(dead_code)]

use ppsp_tester::comm::channel::ControllerEnd;
use ppsp_tester::comm::messages::{Response, ResponseKind};
use ppsp_tester::config::{InterfaceConfig, WorkerConfig};
use ppsp_tester::hw::simulated::{SimConfig, SimulatedBoard};
use ppsp_tester::worker::Worker;
use std::time::{Duration, Instant};

/// How long a test waits for a worker before giving up.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Worker tuning with short poll intervals so tests finish quickly.
pub fn fast_config() -> WorkerConfig {
    WorkerConfig {
        idle_poll: Duration::from_millis(5),
        throttle: Duration::from_millis(5),
        ..WorkerConfig::default()
    }
}

pub fn sim_worker(config: WorkerConfig) -> (Worker, ControllerEnd, SimulatedBoard) {
    sim_worker_named("interface 0", config)
}

pub fn sim_worker_named(
    name: &str,
    config: WorkerConfig,
) -> (Worker, ControllerEnd, SimulatedBoard) {
    let _ = env_logger::builder().is_test(true).try_init();
    let interface = InterfaceConfig::new(name, "simulated");
    let sim = SimulatedBoard::new(SimConfig::for_interface(&interface, &config));
    let (worker, controller) =
        Worker::new(&interface, sim.board(), config).expect("failed to build simulated worker");
    (worker, controller, sim)
}

/// Receive responses until one of `kind` arrives. Everything received is returned, the match
/// last.
pub fn wait_for_kind(controller: &ControllerEnd, kind: ResponseKind) -> Vec<Response> {
    let deadline = Instant::now() + PATIENCE;
    let mut seen = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match controller.recv_timeout(left) {
            Some(response) => {
                let done = response.kind == kind;
                seen.push(response);
                if done {
                    return seen;
                }
            }
            None => break,
        }
    }
    panic!("no {kind:?} response within {PATIENCE:?}, got {seen:?}");
}

/// The next transfer response, skipping info responses.
pub fn next_transfer(controller: &ControllerEnd) -> Response {
    let mut seen = wait_for_kind(controller, ResponseKind::Transfer);
    let last = seen.pop().expect("wait_for_kind returns the match");
    assert!(
        seen.iter().all(|r| r.kind == ResponseKind::Info),
        "unexpected responses before the transfer: {seen:?}"
    );
    last
}

/// The next error response, skipping anything before it.
pub fn next_error(controller: &ControllerEnd) -> Response {
    let mut seen = wait_for_kind(controller, ResponseKind::Error);
    seen.pop().expect("wait_for_kind returns the match")
}
