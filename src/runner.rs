use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::assertion::{fail_unscanned, AssertionEngine};
use crate::error::Error;
use crate::types::{AssertionOutcome, HostCheck};

/// Reason recorded for checks that were never scanned because the run was cancelled.
pub const CANCELLED: &str = "scan cancelled";

/// Run every check concurrently and return all outcomes in plan order.
///
/// `concurrency` of `None` leaves scans unbounded. Cancelling `cancel` stops
/// new scans from starting; every check that never ran yields failed outcomes
/// so an interrupted run cannot pass. The first fatal error (bad token, scanner
/// contract violation, panicked check) aborts the run.
pub async fn run_checks(
    engine: &AssertionEngine,
    checks: Vec<HostCheck>,
    concurrency: Option<usize>,
    cancel: CancellationToken,
) -> Result<Vec<AssertionOutcome>, Error> {
    let sem = concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut set = JoinSet::new();

    for (index, check) in checks.into_iter().enumerate() {
        let engine = engine.clone();
        let sem = sem.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let skipped = |check: &HostCheck| {
                fail_unscanned(&check.host, &check.tokens, check.protocol, CANCELLED)
            };
            let _permit = match sem {
                Some(sem) => tokio::select! {
                    permit = sem.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => return (index, skipped(&check)),
                },
                None => None,
            };
            if cancel.is_cancelled() {
                return (index, skipped(&check));
            }
            let res = engine
                .assert_ports_open(&check.host, &check.tokens, check.protocol)
                .await;
            (index, res)
        });
    }

    let mut by_index: Vec<(usize, Vec<AssertionOutcome>)> = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let res = match joined {
            Ok((index, res)) => res.map(|outcomes| (index, outcomes)),
            Err(e) => {
                tracing::error!(error = %e, "check task panicked");
                Err(Error::Task(e.to_string()))
            }
        };
        match res {
            Ok(entry) => by_index.push(entry),
            Err(e) => {
                set.abort_all();
                return Err(e);
            }
        }
    }

    if cancel.is_cancelled() {
        tracing::warn!("run was cancelled, unscanned checks are reported as failed");
    }
    by_index.sort_by_key(|(index, _)| *index);
    Ok(by_index.into_iter().flat_map(|(_, o)| o).collect())
}

/// Cancel `token` when the process receives Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl-C, not starting further scans");
            token.cancel();
        }
    });
}
