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
use ppsp_tester::error::PpspError;
use ppsp_tester::system_io::{fs_read, fs_read_dir, open_device};
use rstest::*;
use std::path::Path;

#[gtest]
#[rstest]
#[case::not_found(
    "bad_input",
    err(displays_as(contains_substring("No such file or directory")))
)]
#[case::is_dir("/etc/", err(displays_as(contains_substring("Is a directory"))))]
#[case::ok(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"), ok(contains_substring("ppsp_tester")))]
fn test_fs_read<M: for<'a> Matcher<&'a std::result::Result<String, PpspError>>>(
    #[case] path_str: &str,
    #[case] condition: M,
) {
    let r = fs_read(Path::new(path_str));
    expect_that!(r, condition);
}

#[gtest]
#[rstest]
#[case::not_found(
    "/nonexistent_dir",
    err(displays_as(contains_substring("PpspError::IOReadDir")))
)]
#[case::is_file(
    concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"),
    err(displays_as(contains_substring("Not a directory")))
)]
#[case::ok(env!("CARGO_MANIFEST_DIR"), ok(anything()))]
fn test_fs_read_dir<M: for<'a> Matcher<&'a std::result::Result<Vec<String>, PpspError>>>(
    #[case] path_str: &str,
    #[case] condition: M,
) {
    let r = fs_read_dir(Path::new(path_str));
    expect_that!(r, condition);
}

#[gtest]
#[test]
fn test_open_device_missing() {
    let r = open_device(Path::new("/dev/pp_sp_pcie_user_ffff:ff:1f.7"));
    expect_that!(
        r.map(|_| ()),
        err(displays_as(contains_substring("PpspError::DeviceOpen")))
    );
}
