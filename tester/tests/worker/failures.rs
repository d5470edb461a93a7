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

use crate::common::{fast_config, next_error, next_transfer, sim_worker};
use googletest::prelude::*;
use nix::errno::Errno;
use ppsp_tester::comm::messages::{Command, ResponseKind, TransferMode};
use ppsp_tester::config::{InterfaceConfig, MismatchPolicy, WorkerConfig};
use ppsp_tester::error::PpspError;
use ppsp_tester::hw::simulated::{SimConfig, SimulatedBoard};
use ppsp_tester::worker::Worker;
use rstest::*;
use std::thread::sleep;
use std::time::Duration;

#[gtest]
#[rstest]
#[case::io_error(Errno::EIO)]
#[case::driver_timeout(Errno::ETIMEDOUT)]
fn device_control_failure_ends_the_worker(#[case] errno: Errno) {
    let (worker, controller, sim) = sim_worker(fast_config());
    sim.fail_next_transfer(errno);
    controller
        .send(Command::configure(TransferMode::Read, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let error = next_error(&controller);
    expect_that!(error.message, contains_substring("START_TX"));
    expect_that!(
        handle.join(),
        err(displays_as(contains_substring("PpspError::DeviceControl")))
    );
    expect_that!(sim.transfer_count(), eq(1));
}

#[gtest]
#[test]
fn zero_duration_is_a_protocol_error() {
    let (worker, controller, sim) = sim_worker(fast_config());
    sim.set_duration_ns(0);
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let error = next_error(&controller);
    expect_that!(error.message, contains_substring("PpspError::Protocol"));
    expect_that!(
        handle.join(),
        err(displays_as(contains_substring("PpspError::Protocol")))
    );
}

#[gtest]
#[test]
fn stuck_generator_parks_the_worker() {
    let (worker, controller, sim) = sim_worker(fast_config());
    sim.set_generator_stuck(true);
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let error = next_error(&controller);
    expect_that!(error.message, contains_substring("PpspError::Consistency"));
    sleep(Duration::from_millis(30));
    expect_that!(sim.transfer_count(), eq(1));
    expect_that!(controller.try_recv().is_none(), eq(true));

    sim.set_generator_stuck(false);
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    expect_that!(next_transfer(&controller).write_throughput, approx_eq(10.24));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn halt_policy_parks_the_worker_on_mismatch() {
    let (worker, controller, sim) = sim_worker(WorkerConfig {
        verify_write_data: true,
        mismatch_policy: MismatchPolicy::Halt,
        ..fast_config()
    });
    sim.corrupt_pattern_from(Some(100));
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let error = next_error(&controller);
    expect_that!(error.kind, eq(ResponseKind::Error));
    expect_that!(error.message, contains_substring("PpspError::Integrity"));
    sleep(Duration::from_millis(30));
    expect_that!(sim.transfer_count(), eq(1));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[rstest]
#[case::overlapping_modules(0x10000, 0x10800, "overlap")]
#[case::misaligned_generator(0x11002, 0x10000, "aligned")]
#[case::outside_window(0x400000, 0x10000, "does not fit")]
fn bad_layout_fails_before_spawning(
    #[case] generator_base: usize,
    #[case] checker_base: usize,
    #[case] reason: &str,
) {
    let interface = InterfaceConfig {
        generator_base,
        checker_base,
        ..InterfaceConfig::new("interface 0", "simulated")
    };
    let sim = SimulatedBoard::new(SimConfig::default());
    let result = Worker::new(&interface, sim.board(), WorkerConfig::default());
    expect_that!(result.is_err(), eq(true));
    if let Err(e) = result {
        expect_that!(e, displays_as(contains_substring("PpspError::Config")));
        expect_that!(e, displays_as(contains_substring(reason)));
    }
    expect_that!(sim.hardware_accesses(), eq(0));
}

#[gtest]
#[test]
fn missing_device_fails_to_open() {
    let interface = InterfaceConfig::new("interface 0", "/dev/pp_sp_pcie_user_ffff:ff:1f.7");
    let result = Worker::open(&interface, WorkerConfig::default());
    expect_that!(
        result.map(|_| ()),
        err(displays_as(contains_substring("PpspError::DeviceOpen")))
    );
}

#[gtest]
#[test]
fn error_classes() {
    expect_that!(PpspError::Consistency(String::new()).is_fatal(), eq(false));
    expect_that!(PpspError::Integrity(String::new()).is_fatal(), eq(false));
    expect_that!(PpspError::Protocol(String::new()).is_fatal(), eq(true));
}
