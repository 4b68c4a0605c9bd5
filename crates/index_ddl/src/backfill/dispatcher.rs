//! Backfill dispatcher (`addTableIndex`, §4.6).
use std::sync::Arc;

use tokio::{
    sync::mpsc,
    task::JoinSet,
};

use crate::{
    backfill::worker::{
        backfill_index_in_txn,
        BatchRet,
        OnceHandleLatch,
        WorkerContext,
        WorkerError,
    },
    config::{
        INDEX_BACKFILL_BATCH_SIZE,
        INDEX_BACKFILL_WORKER_COUNT,
    },
    job::{
        Job,
        ReorgInfoStore,
    },
    kv::Handle,
    metrics,
};

/// A dispatcher round ran out the clock waiting on an owner re-election;
/// not an error, just "come back later" (§5, §7 `WaitReorgTimeout`).
#[derive(Debug, thiserror::Error)]
#[error("reorg owner lost leadership mid-round")]
pub struct ReorgNotRunnable;

/// Drives the backfill to completion: opens rounds of up to
/// `INDEX_BACKFILL_WORKER_COUNT` concurrent workers, each processing up to
/// `INDEX_BACKFILL_BATCH_SIZE` rows, until a round launches fewer workers
/// than the configured count (meaning the table is exhausted).
///
/// On success returns the total number of rows written. On a duplicate-key
/// violation from a unique index, returns the underlying
/// [`crate::kv::KeyExistsError`] so the caller can drive the rollback
/// conversion (§4.8).
pub async fn add_table_index(
    ctx: Arc<WorkerContext>,
    job: &mut Job,
    reorg_info: Arc<dyn ReorgInfoStore>,
    reorg_handle: Handle,
) -> anyhow::Result<i64> {
    let worker_count = *INDEX_BACKFILL_WORKER_COUNT;
    let mut seek_handle = reorg_handle;
    let mut total_rows = 0i64;

    loop {
        let (results, launched) = run_round(&ctx, job, seek_handle, worker_count).await?;

        let mut sorted = results;
        sorted.sort_by_key(|r| r.done_handle);
        // Overstates progress if an earlier batch in this round errored;
        // acceptable because an error abandons and re-runs the whole reorg
        // from the last persisted handle (§4.6 progress accounting note).
        let done_handle = sorted.last().map_or(0, |r| r.done_handle);
        let added_this_round: i64 = sorted.iter().map(|r| r.count).sum();
        total_rows += added_this_round;

        // A round where every worker found zero rows (e.g. the very first
        // worker of a round probes past the end of the table) reports
        // `done_handle == 0`; persisting `0 + 1` here would regress an
        // already-durable checkpoint from an earlier round and violate P4.
        // Only advance the persisted handle on real progress.
        let next_handle = if done_handle > 0 {
            let next_handle = done_handle + 1;
            let reorg_info = reorg_info.clone();
            ctx.kv
                .run_in_new_txn(Box::new(move |txn| {
                    let reorg_info = reorg_info.clone();
                    Box::pin(async move { reorg_info.update_handle(txn, next_handle).await })
                }))
                .await?;
            next_handle
        } else {
            seek_handle
        };

        job.row_count += added_this_round;
        metrics::record_round(added_this_round);
        tracing::info!(
            rows_added = added_this_round,
            total_rows,
            next_handle,
            "backfill round complete"
        );

        if launched < worker_count {
            return Ok(total_rows);
        }
        seek_handle = next_handle;
    }
}

/// Runs one round: launches workers in strictly ascending starting-handle
/// order, each gated on its predecessor publishing its boundary handle, and
/// waits for all of them to finish.
async fn run_round(
    ctx: &Arc<WorkerContext>,
    job: &Job,
    seek_handle: Handle,
    worker_count: usize,
) -> anyhow::Result<(Vec<BatchRet>, usize)> {
    let mut join_set = JoinSet::new();
    let mut next_start = seek_handle;
    let mut launched = 0;

    for _ in 0..worker_count {
        let (tx, mut rx) = mpsc::channel(1);
        let latch = Arc::new(OnceHandleLatch::new(tx));
        let ctx = ctx.clone();
        let job = job.clone();
        let start_handle = next_start;

        join_set.spawn(async move { backfill_index_in_txn(&ctx, &job, start_handle, None, &latch).await });
        launched += 1;

        // Block only on the boundary handoff; the worker itself keeps
        // running concurrently in the JoinSet (§5 ordering guarantees).
        match rx.recv().await {
            Some(0) | None => break,
            Some(boundary) => next_start = boundary + 1,
        }
    }

    let mut results = Vec::with_capacity(launched);
    while let Some(joined) = join_set.join_next().await {
        match joined.expect("worker task panicked") {
            Ok(ret) => results.push(ret),
            Err(WorkerError::NotRunnable) => return Err(ReorgNotRunnable.into()),
            Err(WorkerError::Other(err)) => return Err(err),
        }
    }

    Ok((results, launched))
}

pub fn default_batch_size() -> usize {
    *INDEX_BACKFILL_BATCH_SIZE
}
