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

use crate::common::{fast_config, next_error, next_transfer, sim_worker, wait_for_kind};
use googletest::prelude::*;
use ppsp_tester::comm::messages::{Command, ResponseKind, TransferMode};
use ppsp_tester::hw::transfer::TransferFrame;
use rstest::*;
use std::thread::sleep;
use std::time::Duration;

#[gtest]
#[test]
fn latest_command_wins() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller
        .send(Command::configure(TransferMode::Write, 2048))
        .unwrap();
    controller
        .send(Command::configure(TransferMode::Read, 4096))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.read_throughput, gt(0.0));
    expect_that!(handle.stop_with(&controller), ok(anything()));

    let transfers = sim.transfers();
    expect_that!(transfers.is_empty(), eq(false));
    expect_that!(
        transfers.iter().all(|t| *t == TransferFrame::request(false, 4096)),
        eq(true)
    );
}

#[gtest]
#[test]
fn idle_worker_touches_nothing() {
    let (worker, controller, sim) = sim_worker(fast_config());
    let after_setup = sim.hardware_accesses();
    let handle = worker.spawn().unwrap();

    let started = wait_for_kind(&controller, ResponseKind::Info);
    expect_that!(started.len(), eq(1));
    expect_that!(started[0].message, contains_substring("worker started"));

    sleep(Duration::from_millis(50));
    expect_that!(sim.hardware_accesses(), eq(after_setup));
    expect_that!(controller.try_recv().is_none(), eq(true));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn configure_idle_stops_transferring() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();
    next_transfer(&controller);

    controller
        .send(Command::configure(TransferMode::Idle, 1024))
        .unwrap();
    // let any transfer that raced the command finish
    sleep(Duration::from_millis(30));
    let settled = sim.hardware_accesses();
    controller.drain();
    sleep(Duration::from_millis(50));
    expect_that!(sim.hardware_accesses(), eq(settled));
    expect_that!(controller.drain().len(), eq(0));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn stop_ends_hardware_access() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();
    next_transfer(&controller);

    expect_that!(handle.stop_with(&controller), ok(anything()));
    let at_stop = sim.hardware_accesses();
    sleep(Duration::from_millis(30));
    expect_that!(sim.hardware_accesses(), eq(at_stop));
    expect_that!(
        controller.send(Command::configure(TransferMode::Read, 1024)),
        err(displays_as(contains_substring("worker is gone")))
    );
}

#[gtest]
#[test]
fn commands_behind_stop_are_never_seen() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller.send(Command::Stop).unwrap();
    // the send may fail once the worker is gone, which is just as good
    let _ = controller.send(Command::configure(TransferMode::Write, 1024));
    let handle = worker.spawn().unwrap();

    expect_that!(handle.join(), ok(anything()));
    expect_that!(sim.transfer_count(), eq(0));
}

#[gtest]
#[test]
fn dropping_the_controller_stops_the_worker() {
    let (worker, controller, _sim) = sim_worker(fast_config());
    let handle = worker.spawn().unwrap();
    drop(controller);
    expect_that!(handle.join(), ok(anything()));
}

#[gtest]
#[rstest]
#[case::write_not_whole_samples(TransferMode::Write, 1000)]
#[case::read_zero(TransferMode::Read, 0)]
#[case::read_unaligned(TransferMode::Read, 6)]
#[case::read_beyond_dma_buffer(TransferMode::Read, 256 * 1024 * 1024)]
fn invalid_sizes_are_rejected(#[case] mode: TransferMode, #[case] size_bytes: u32) {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller.send(Command::configure(mode, size_bytes)).unwrap();
    let handle = worker.spawn().unwrap();

    let error = next_error(&controller);
    expect_that!(error.message, contains_substring("PpspError::Argument"));
    sleep(Duration::from_millis(20));
    expect_that!(sim.transfer_count(), eq(0));

    // the worker is idle, not gone
    controller
        .send(Command::configure(TransferMode::Read, 1024))
        .unwrap();
    expect_that!(next_transfer(&controller).read_throughput, gt(0.0));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}
