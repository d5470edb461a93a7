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

use googletest::prelude::*;
use ppsp_tester::link::{discover_devices_in, link_stats_in, max_throughput_mbps};
use rstest::*;
use std::fs;
use std::path::{Path, PathBuf};

/// A scratch directory unique to this test process and `name`.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ppsp-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("failed to create scratch directory");
    dir
}

fn write_link_attrs(dir: &Path, attrs: &[(&str, &str)]) {
    for (name, value) in attrs {
        fs::write(dir.join(name), format!("{value}\n")).expect("failed to write attribute");
    }
}

#[gtest]
#[rstest]
#[case::gen3_x8("gen3_x8", "8", "8.0 GT/s PCIe", "8", "8.0 GT/s PCIe", false)]
#[case::gen1_x4("gen1_x4", "4", "2.5 GT/s PCIe", "4", "2.5 GT/s PCIe", false)]
#[case::narrow_slot("narrow_slot", "4", "8.0 GT/s PCIe", "8", "8.0 GT/s PCIe", true)]
#[case::slow_slot("slow_slot", "8", "5.0 GT/s PCIe", "8", "8.0 GT/s PCIe", true)]
fn reads_link_attributes(
    #[case] name: &str,
    #[case] width: &str,
    #[case] speed: &str,
    #[case] max_width: &str,
    #[case] max_speed: &str,
    #[case] degraded: bool,
) {
    let dir = scratch_dir(name);
    write_link_attrs(
        &dir,
        &[
            ("current_link_width", width),
            ("current_link_speed", speed),
            ("max_link_width", max_width),
            ("max_link_speed", max_speed),
        ],
    );

    let stats = link_stats_in(&dir).unwrap();
    expect_that!(stats.width, eq(width.parse::<u32>().unwrap()));
    expect_that!(stats.max_width, eq(max_width.parse::<u32>().unwrap()));
    expect_that!(stats.is_degraded(), eq(degraded));
    expect_that!(
        stats.current_mbps(),
        approx_eq(max_throughput_mbps(stats.speed_gts, stats.width))
    );
    let _ = fs::remove_dir_all(&dir);
}

#[gtest]
#[test]
fn unknown_speed_is_reported() {
    let dir = scratch_dir("unknown_speed");
    write_link_attrs(
        &dir,
        &[
            ("current_link_width", "0"),
            ("current_link_speed", "Unknown"),
            ("max_link_width", "8"),
            ("max_link_speed", "8.0 GT/s PCIe"),
        ],
    );
    expect_that!(
        link_stats_in(&dir),
        err(displays_as(contains_substring("PpspError::LinkParse")))
    );
    let _ = fs::remove_dir_all(&dir);
}

#[gtest]
#[test]
fn missing_attribute_is_an_io_error() {
    let dir = scratch_dir("missing_attr");
    expect_that!(
        link_stats_in(&dir),
        err(displays_as(contains_substring("PpspError::IORead")))
    );
    let _ = fs::remove_dir_all(&dir);
}

#[gtest]
#[test]
fn discovers_board_devices_in_order() {
    let dir = scratch_dir("discovery");
    for name in [
        "pp_sp_pcie_user_0000:06:00.0",
        "null",
        "pp_sp_pcie_user_0000:05:00.0",
        "pp_sp_pcie_other",
    ] {
        fs::write(dir.join(name), "").unwrap();
    }
    expect_that!(
        discover_devices_in(&dir).unwrap(),
        eq(&vec![
            dir.join("pp_sp_pcie_user_0000:05:00.0"),
            dir.join("pp_sp_pcie_user_0000:06:00.0")
        ])
    );
    let _ = fs::remove_dir_all(&dir);
}
