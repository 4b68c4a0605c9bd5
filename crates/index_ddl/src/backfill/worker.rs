//! Backfill worker (`backfillIndexInTxn`, §4.7).
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

use tokio::sync::mpsc;

use crate::{
    descriptor::ColumnType,
    iterator::{
        iterate_snapshot_rows,
        StepResult,
    },
    job::{
        Job,
        ReorgRunnable,
    },
    kv::{
        ColumnId,
        Datum,
        Handle,
        IndexPrimitive,
        KvStore,
        RowCodec,
        Snapshot,
        TableId,
    },
};

/// Publishes a worker's boundary handle to the dispatcher exactly once, even
/// if the worker's surrounding transaction is retried internally by the
/// store (§4.7, §9 "do-once latch").
pub struct OnceHandleLatch {
    sent: AtomicBool,
    tx: mpsc::Sender<Handle>,
}

impl OnceHandleLatch {
    pub fn new(tx: mpsc::Sender<Handle>) -> Self {
        Self {
            sent: AtomicBool::new(false),
            tx,
        }
    }

    /// No-ops on every call after the first.
    pub async fn send_once(&self, handle: Handle) {
        if self.sent.swap(true, Ordering::SeqCst) {
            return;
        }
        // The dispatcher may have already moved on (e.g. the round closed
        // early); a failed send is not this worker's problem.
        let _ = self.tx.send(handle).await;
    }
}

/// Shared, read-only context every worker in a round operates against.
pub struct WorkerContext {
    pub table: TableId,
    pub snapshot: Arc<dyn Snapshot>,
    pub kv: Arc<dyn KvStore>,
    pub index_columns: Vec<ColumnId>,
    pub column_types: BTreeMap<ColumnId, ColumnType>,
    pub row_codec: Arc<dyn RowCodec>,
    pub index: Arc<dyn IndexPrimitive>,
    pub reorg_runnable: Arc<dyn ReorgRunnable>,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRet {
    pub count: i64,
    pub done_handle: Handle,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("owner lost leadership or job was cancelled mid-reorg")]
    NotRunnable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Runs one worker's batch: reads up to `batch_size` rows starting at
/// `start_handle`, publishes the batch's boundary handle on `boundary`
/// exactly once, then decodes and writes index entries for every row inside
/// a single retryable transaction.
///
/// `end_handle` bounds the batch from above (exclusive) once the dispatcher
/// knows no more workers will launch this round; `None` means "up to
/// `batch_size` rows, wherever the table ends".
pub async fn backfill_index_in_txn(
    ctx: &WorkerContext,
    job: &Job,
    start_handle: Handle,
    end_handle: Option<Handle>,
    boundary: &OnceHandleLatch,
) -> Result<BatchRet, WorkerError> {
    if !ctx.reorg_runnable.is_reorg_runnable(job).await? {
        return Err(WorkerError::NotRunnable);
    }

    let mut rows = Vec::with_capacity(ctx.batch_size);
    iterate_snapshot_rows(&ctx.snapshot, ctx.table, start_handle, ctx.batch_size, |row| {
        if let Some(end) = end_handle {
            if row.handle >= end {
                return Ok(StepResult::Stop);
            }
        }
        rows.push(row.clone());
        if rows.len() >= ctx.batch_size {
            Ok(StepResult::Stop)
        } else {
            Ok(StepResult::Continue)
        }
    })
    .await?;

    boundary.send_once(rows.last().map_or(0, |r| r.handle)).await;

    if rows.is_empty() {
        return Ok(BatchRet::default());
    }

    let decoded: Vec<(Handle, Vec<u8>, Vec<Datum>)> = rows
        .iter()
        .map(|row| {
            let values = ctx.row_codec.decode_row(&row.raw_row, &ctx.column_types)?;
            let tuple = ctx
                .index_columns
                .iter()
                .map(|column_id| values.get(column_id).cloned().unwrap_or(Datum::Null))
                .collect();
            Ok::<_, anyhow::Error>((row.handle, row.row_key.clone(), tuple))
        })
        .collect::<anyhow::Result<_>>()?;

    let index = ctx.index.clone();
    let outcome: Arc<Mutex<BatchRet>> = Arc::new(Mutex::new(BatchRet::default()));
    {
        let outcome = outcome.clone();
        let index = index.clone();
        ctx.kv
            .run_in_new_txn(Box::new(move |txn| {
                let decoded = decoded.clone();
                let index = index.clone();
                let outcome = outcome.clone();
                Box::pin(async move {
                    let mut count = 0i64;
                    let mut done_handle = 0;
                    for (handle, row_key, values) in &decoded {
                        txn.lock_keys(std::slice::from_ref(row_key)).await?;
                        match index.create(txn, values, *handle).await? {
                            Ok(()) => {},
                            Err(existing) if existing.existing_handle == *handle => {
                                // Already written by a concurrent WriteOnly
                                // DML that raced ahead of the scan (§4.7).
                            },
                            Err(existing) => {
                                anyhow::bail!(crate::kv::KeyExistsError {
                                    existing_handle: existing.existing_handle,
                                })
                            },
                        }
                        count += 1;
                        done_handle = *handle;
                    }
                    *outcome.lock().expect("outcome mutex poisoned") = BatchRet { count, done_handle };
                    Ok(())
                })
            }))
            .await?;
    }

    let result = *outcome.lock().expect("outcome mutex poisoned");
    Ok(result)
}
