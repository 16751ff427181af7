//! Keeps the worker units alive.
//!
//! Every unit runs as its own task. When one exits for any reason (error,
//! panic, or an unexpected clean return) a watcher task reports it over a
//! channel and the supervisor launches a fresh instance of the same kind.
//! Shutdown cancels every unit, waits up to a grace period for them to
//! wind down, then aborts whatever is left.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Ingest { index: usize },
    Update,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Ingest { index } => write!(f, "ingest-{index}"),
            UnitKind::Update => f.write_str("update"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Running,
    Dead,
    Restarting,
}

/// Builds the future for one run of a unit.
///
/// Called again with the same kind every time that unit has to be restarted,
/// so any per-unit resources should be acquired inside the returned future.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, kind: UnitKind, cancel: CancellationToken) -> BoxFuture<'static, Result<()>>;
}

#[derive(Debug)]
enum ExitReason {
    Returned,
    Failed(String),
    Panicked(String),
    Aborted,
}

#[derive(Debug)]
struct UnitExit {
    slot: usize,
    generation: u64,
    reason: ExitReason,
}

struct Slot {
    kind: UnitKind,
    state: UnitState,
    generation: u64,
    abort: AbortHandle,
}

/// What happened over the supervisor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub restarts: usize,
    /// Units still running when the grace period ran out.
    pub aborted: usize,
}

pub struct Supervisor<L> {
    launcher: Arc<L>,
    kinds: Vec<UnitKind>,
    restart_delay: Duration,
    shutdown_grace: Duration,
}

impl<L: Launcher> Supervisor<L> {
    /// One update unit plus `ingest_workers` ingest units.
    pub fn new(launcher: Arc<L>, ingest_workers: usize) -> Self {
        let mut kinds: Vec<UnitKind> = (0..ingest_workers)
            .map(|index| UnitKind::Ingest { index })
            .collect();
        kinds.push(UnitKind::Update);

        Self {
            launcher,
            kinds,
            restart_delay: Duration::ZERO,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> SupervisorReport {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        let units = CancellationToken::new();
        let mut report = SupervisorReport::default();

        let mut slots: Vec<Slot> = self
            .kinds
            .iter()
            .enumerate()
            .map(|(index, &kind)| {
                let abort = self.spawn_unit(index, 0, kind, &units, &exit_tx);
                info!(unit = %kind, "Started unit");
                Slot {
                    kind,
                    state: UnitState::Running,
                    generation: 0,
                    abort,
                }
            })
            .collect();

        'supervise: loop {
            // Shutdown wins over any exit notices still queued.
            let exit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'supervise,
                Some(exit) = exit_rx.recv() => exit,
            };

            let slot = &mut slots[exit.slot];
            if exit.generation != slot.generation {
                continue;
            }
            slot.state = UnitState::Dead;
            log_exit(slot.kind, &exit.reason);

            if !self.restart_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break 'supervise,
                    _ = tokio::time::sleep(self.restart_delay) => {}
                }
            }
            if shutdown.is_cancelled() {
                break 'supervise;
            }

            slot.state = UnitState::Restarting;
            slot.generation += 1;
            slot.abort = self.spawn_unit(exit.slot, slot.generation, slot.kind, &units, &exit_tx);
            slot.state = UnitState::Running;
            report.restarts += 1;
            info!(unit = %slot.kind, restarts = report.restarts, "Restarted unit");
        }

        info!("Shutdown requested, stopping all units");
        units.cancel();
        report.aborted = self.drain(&mut slots, &mut exit_rx).await;
        info!(restarts = report.restarts, aborted = report.aborted, "Supervisor stopped");
        report
    }

    fn spawn_unit(
        &self,
        slot: usize,
        generation: u64,
        kind: UnitKind,
        units: &CancellationToken,
        exit_tx: &mpsc::UnboundedSender<UnitExit>,
    ) -> AbortHandle {
        let handle = tokio::spawn(self.launcher.launch(kind, units.child_token()));
        let abort = handle.abort_handle();
        let exit_tx = exit_tx.clone();

        tokio::spawn(async move {
            let reason = match handle.await {
                Ok(Ok(())) => ExitReason::Returned,
                Ok(Err(e)) => ExitReason::Failed(e.to_string()),
                Err(e) if e.is_panic() => ExitReason::Panicked(e.to_string()),
                Err(_) => ExitReason::Aborted,
            };
            // The receiver only goes away once the supervisor is done.
            let _ = exit_tx.send(UnitExit {
                slot,
                generation,
                reason,
            });
        });

        abort
    }

    /// Waits for running units to exit, aborting stragglers after the grace
    /// period. Returns how many had to be aborted.
    async fn drain(
        &self,
        slots: &mut [Slot],
        exit_rx: &mut mpsc::UnboundedReceiver<UnitExit>,
    ) -> usize {
        let wait_all = async {
            while slots.iter().any(|s| s.state != UnitState::Dead) {
                let Some(exit) = exit_rx.recv().await else {
                    break;
                };
                let slot = &mut slots[exit.slot];
                if exit.generation == slot.generation {
                    slot.state = UnitState::Dead;
                    if let ExitReason::Failed(_) | ExitReason::Panicked(_) = exit.reason {
                        warn!(unit = %slot.kind, reason = ?exit.reason, "Unit failed while stopping");
                    }
                }
            }
        };

        if tokio::time::timeout(self.shutdown_grace, wait_all).await.is_ok() {
            return 0;
        }

        let mut aborted = 0;
        for slot in slots.iter().filter(|s| s.state != UnitState::Dead) {
            warn!(unit = %slot.kind, "Unit did not stop in time, aborting");
            slot.abort.abort();
            aborted += 1;
        }
        aborted
    }
}

fn log_exit(kind: UnitKind, reason: &ExitReason) {
    match reason {
        ExitReason::Returned => warn!(unit = %kind, "Unit has died. Restarting."),
        ExitReason::Failed(e) => error!(unit = %kind, error = %e, "Unit failed. Restarting."),
        ExitReason::Panicked(e) => error!(unit = %kind, error = %e, "Unit panicked. Restarting."),
        ExitReason::Aborted => warn!(unit = %kind, "Unit was aborted. Restarting."),
    }
}
