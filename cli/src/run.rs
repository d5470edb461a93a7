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

//! Session driving: open the boards, configure the workers, collect responses, shut down.
//!
//! Responses are forwarded from every worker as they arrive, so the controller can stop an
//! interface right after its last wanted transfer. An interface is done when it has reported
//! `--count` transfers or an error. The run ends once every worker has exited, or on Ctrl-C.

use crate::Cli;
use crate::status::log_link_stats;
use log::{debug, error, info, warn};
use ppsp_tester::comm::messages::{Command, Response, ResponseKind, TransferMode};
use ppsp_tester::config::{InterfaceConfig, WorkerConfig};
use ppsp_tester::error::PpspError;
use ppsp_tester::hw::simulated::{SimConfig, SimulatedBoard};
use ppsp_tester::link::discover_devices;
use ppsp_tester::session::{InterfaceId, MAX_INTERFACES, Session};
use ppsp_tester::worker::Worker;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Where an interface stands from the controller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Outcome {
    #[default]
    Running,
    /// Reported the requested number of transfers.
    Reached,
    /// Reported an error, the worker is parked or gone.
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    transfers: u64,
    outcome: Outcome,
}

/// Transfers and outcome per interface, against an optional target.
#[derive(Debug)]
pub(crate) struct Tally {
    interfaces: BTreeMap<InterfaceId, Progress>,
    target: Option<u64>,
}

impl Tally {
    pub(crate) fn new(interfaces: &[InterfaceId], target: Option<u64>) -> Tally {
        Tally {
            interfaces: interfaces
                .iter()
                .map(|id| (*id, Progress::default()))
                .collect(),
            target,
        }
    }

    /// Account for `response` from `id`.
    ///
    /// Returns true when this response finished `id`: it was the last wanted transfer or the
    /// first error. Transfers that land after that are still counted.
    pub(crate) fn record(&mut self, id: InterfaceId, response: &Response) -> bool {
        let progress = self.interfaces.entry(id).or_default();
        if response.kind == ResponseKind::Transfer {
            progress.transfers += 1;
        }
        if progress.outcome != Outcome::Running {
            return false;
        }
        let reached = self.target.is_some_and(|t| progress.transfers >= t);
        progress.outcome = match response.kind {
            ResponseKind::Error => Outcome::Failed,
            ResponseKind::Transfer if reached => Outcome::Reached,
            _ => return false,
        };
        true
    }

    pub(crate) fn count(&self, id: InterfaceId) -> u64 {
        self.interfaces.get(&id).map_or(0, |p| p.transfers)
    }

    pub(crate) fn outcome(&self, id: InterfaceId) -> Outcome {
        self.interfaces.get(&id).map_or(Outcome::Running, |p| p.outcome)
    }
}

/// How one interface ended.
#[derive(Debug)]
pub(crate) struct InterfaceReport {
    pub(crate) id: InterfaceId,
    pub(crate) transfers: u64,
    pub(crate) outcome: Outcome,
    /// Exit result of the worker thread.
    pub(crate) result: Result<(), PpspError>,
}

impl InterfaceReport {
    pub(crate) fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failed || self.result.is_err()
    }
}

// worker messages already carry the interface name
fn log_response(response: &Response) {
    match response.kind {
        ResponseKind::Info | ResponseKind::Transfer => info!("{}", response.message),
        ResponseKind::Error => error!("{}", response.message),
    }
}

/// Device paths to test: the ones given on the command line, or the discovered ones.
fn board_paths(cli: &Cli) -> Result<Vec<PathBuf>, PpspError> {
    if !cli.dev.is_empty() {
        return Ok(cli.dev.clone());
    }
    let mut found = discover_devices()?;
    if found.len() > MAX_INTERFACES {
        warn!(
            "found {} boards, testing the first {MAX_INTERFACES}",
            found.len()
        );
        found.truncate(MAX_INTERFACES);
    }
    if found.is_empty() {
        return Err(PpspError::Argument(String::from(
            "no board found, use --dev or --simulate",
        )));
    }
    Ok(found)
}

pub(crate) fn interface_configs(paths: &[PathBuf]) -> Vec<InterfaceConfig> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| InterfaceConfig::new(InterfaceId(index as u8).to_string(), path))
        .collect()
}

pub(crate) fn simulated_session(boards: usize, config: WorkerConfig) -> Result<Session, PpspError> {
    info!("simulating {boards} board(s)");
    let workers = (0..boards)
        .map(|index| {
            let interface =
                InterfaceConfig::new(InterfaceId(index as u8).to_string(), "simulated");
            let sim = SimulatedBoard::new(SimConfig::for_interface(&interface, &config));
            Worker::new(&interface, sim.board(), config.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;
    Session::start(workers)
}

fn open_session(cli: &Cli, config: WorkerConfig) -> Result<Session, PpspError> {
    if cli.simulate {
        return simulated_session(cli.dev.len().clamp(1, MAX_INTERFACES), config);
    }
    let paths = board_paths(cli)?;
    for (index, path) in paths.iter().enumerate() {
        log_link_stats(InterfaceId(index as u8), path);
    }
    Session::open(&interface_configs(&paths), config)
}

fn stop_interface(session: &Session, id: InterfaceId) {
    let sent = session
        .interface(id)
        .is_some_and(|controller| controller.send(Command::Stop).is_ok());
    if !sent {
        debug!("{id}: worker already exited");
    }
}

/// Configure every worker of `session` for `mode`/`size_bytes` and follow them until each has
/// reported `count` transfers or an error, or until Ctrl-C. Consumes the session and shuts it
/// down.
pub(crate) async fn drive(
    session: Session,
    mode: TransferMode,
    size_bytes: u32,
    count: Option<u64>,
) -> Result<Vec<InterfaceReport>, Box<dyn Error>> {
    let interfaces = session.interfaces();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in &interfaces {
        let Some(controller) = session.interface(*id) else {
            continue;
        };
        controller.send(Command::configure(mode, size_bytes))?;
        let controller = controller.clone();
        let tx = tx.clone();
        let id = *id;
        // ends when the worker has exited and its responses are drained
        tokio::task::spawn_blocking(move || {
            while let Some(response) = controller.recv() {
                if tx.send((id, response)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);
    info!(
        "configured {} interface(s): mode = {mode}, size = {size_bytes} B",
        interfaces.len()
    );

    let mut tally = Tally::new(&interfaces, count);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                info!("interrupted, stopping workers");
                break;
            }
            received = rx.recv() => {
                let Some((id, response)) = received else {
                    // every worker has exited
                    break;
                };
                log_response(&response);
                if tally.record(id, &response) {
                    match tally.outcome(id) {
                        Outcome::Failed => warn!("{id}: giving up after an error"),
                        _ => info!("{id}: reached {} transfer(s)", tally.count(id)),
                    }
                    stop_interface(&session, id);
                }
            }
        }
    }

    // joining the worker threads blocks
    let results = tokio::task::spawn_blocking(move || session.shutdown()).await?;
    while let Some((id, response)) = rx.recv().await {
        log_response(&response);
        tally.record(id, &response);
    }

    Ok(results
        .into_iter()
        .map(|(id, result)| InterfaceReport {
            id,
            transfers: tally.count(id),
            outcome: tally.outcome(id),
            result,
        })
        .collect())
}

/// Run one test session as described by `cli`.
///
/// # Returns: `Result<(), Box<dyn Error>>`
/// * `Ok(())` - Every interface finished without an error
/// * `Err(Box<dyn Error>)` - Setup failed, or at least one interface reported or ended with an
///   error
pub(crate) async fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let session = open_session(cli, cli.worker_config())?;
    let reports = drive(session, TransferMode::from(cli.mode), cli.size, cli.count).await?;

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(()) => info!(
                "{}: worker stopped after {} transfer(s)",
                report.id, report.transfers
            ),
            Err(e) => error!("{}: worker failed: {e}", report.id),
        }
        if report.is_failure() {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(Box::new(PpspError::Internal(format!(
            "{failed} interface(s) ended with an error"
        ))));
    }
    Ok(())
}
