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

use crate::common::{fast_config, next_transfer, sim_worker};
use googletest::prelude::*;
use ppsp_tester::comm::messages::{Command, ResponseKind, TransferMode};
use ppsp_tester::config::{MismatchPolicy, WorkerConfig};
use ppsp_tester::hw::transfer::TransferFrame;
use rstest::*;

#[gtest]
#[test]
fn write_end_to_end() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.kind, eq(ResponseKind::Transfer));
    expect_that!(response.write_throughput, approx_eq(10.24));
    expect_that!(response.read_throughput, eq(0.0));
    expect_that!(response.integrity.is_none(), eq(true));
    expect_that!(response.message, contains_substring("1024"));
    expect_that!(response.message, contains_substring("100000 ns"));
    // the worker names itself once, the controller logs messages as they are
    expect_that!(response.message, starts_with("interface 0: mode = write"));
    expect_that!(
        response.message,
        not(contains_substring("interface 0: interface 0"))
    );

    expect_that!(handle.stop_with(&controller), ok(anything()));
    expect_that!(
        sim.transfers()[0],
        eq(TransferFrame::request(true, 1024))
    );
}

#[gtest]
#[rstest]
#[case::one_kib_in_100_us(1024, 100_000, 10.24)]
#[case::four_kib_in_1_ms(4096, 1_000_000, 4.096)]
#[case::one_mib_in_1_ms(1024 * 1024, 1_000_000, 1048.576)]
fn throughput_is_decimal_megabytes(
    #[case] size_bytes: u32,
    #[case] duration_ns: u64,
    #[case] expected_mbps: f64,
) {
    let (worker, controller, sim) = sim_worker(fast_config());
    sim.set_duration_ns(duration_ns);
    controller
        .send(Command::configure(TransferMode::Read, size_bytes))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.read_throughput, approx_eq(expected_mbps));
    expect_that!(response.write_throughput, eq(0.0));
    expect_that!(
        response.message,
        contains_substring(format!("{duration_ns} ns"))
    );
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[rstest]
#[case::clean_buffer(None, 100.0)]
#[case::one_bad_sample(Some(0), 31.0 / 32.0 * 100.0)]
#[case::last_sample_bad(Some(31 * 32), 31.0 / 32.0 * 100.0)]
fn read_reports_checker_integrity(#[case] bad_sample_at: Option<usize>, #[case] expected: f64) {
    let (worker, controller, sim) = sim_worker(fast_config());
    if let Some(offset) = bad_sample_at {
        sim.poke_buffer(offset, &[0xA5; 32]);
    }
    controller
        .send(Command::configure(TransferMode::Read, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.integrity, some(approx_eq(expected)));
    expect_that!(response.message, contains_substring("check = "));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn priming_restores_the_pattern_before_reading() {
    let (worker, controller, sim) = sim_worker(WorkerConfig {
        prime_read_buffer: true,
        ..fast_config()
    });
    sim.poke_buffer(0, &[0xA5; 64]);
    controller
        .send(Command::configure(TransferMode::Read, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.integrity, some(approx_eq(100.0)));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn verified_write_reports_clean_pattern() {
    let (worker, controller, _sim) = sim_worker(WorkerConfig {
        verify_write_data: true,
        ..fast_config()
    });
    controller
        .send(Command::configure(TransferMode::Write, 4096))
        .unwrap();
    let handle = worker.spawn().unwrap();

    let response = next_transfer(&controller);
    expect_that!(response.integrity, some(approx_eq(100.0)));
    // 2048 words minus the 32 leading words that are not part of the pattern
    expect_that!(response.message, contains_substring("check = 2016/2016"));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn verified_write_reports_mismatches_and_continues() {
    let (worker, controller, sim) = sim_worker(WorkerConfig {
        verify_write_data: true,
        mismatch_policy: MismatchPolicy::Report,
        ..fast_config()
    });
    sim.corrupt_pattern_from(Some(256));
    controller
        .send(Command::configure(TransferMode::Write, 1024))
        .unwrap();
    let handle = worker.spawn().unwrap();

    // words 32..256 of 512 are intact
    let first = next_transfer(&controller);
    expect_that!(first.integrity, some(approx_eq(224.0 / 480.0 * 100.0)));
    expect_that!(first.message, contains_substring("check = 224/480"));
    let second = next_transfer(&controller);
    expect_that!(second.kind, eq(ResponseKind::Transfer));
    expect_that!(handle.stop_with(&controller), ok(anything()));
}

#[gtest]
#[test]
fn reconfigure_switches_direction() {
    let (worker, controller, sim) = sim_worker(fast_config());
    controller
        .send(Command::configure(TransferMode::Write, 2048))
        .unwrap();
    let handle = worker.spawn().unwrap();
    let write = next_transfer(&controller);
    expect_that!(write.write_throughput, gt(0.0));

    controller
        .send(Command::configure(TransferMode::Read, 512))
        .unwrap();
    // a write may already be in flight when the command lands
    let read = loop {
        let response = next_transfer(&controller);
        if response.read_throughput > 0.0 {
            break response;
        }
    };
    expect_that!(read.message, contains_substring("mode = read, size = 512 B"));
    expect_that!(handle.stop_with(&controller), ok(anything()));

    let transfers = sim.transfers();
    let first_read = transfers.iter().position(|t| !t.write).unwrap();
    expect_that!(
        transfers[first_read..].iter().all(|t| *t == TransferFrame::request(false, 512)),
        eq(true)
    );
}
