//! The DDL job and reorg-progress records the state machines operate on
//! (§3, §6). The owner-election loop and the job queue itself are out of
//! scope; this module only defines the fields the core reads and writes.
use async_trait::async_trait;

use crate::{
    descriptor::IndexState,
    kv::{
        Handle,
        SchemaId,
        SnapshotVersion,
        TableId,
        Transaction,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
    Cancelled,
    Rollback,
    RollbackDone,
}

/// `job.Args`, decoded. The wire format is the SQL front-end's concern; the
/// core only ever needs one of these two shapes (§4.3, §4.4, §4.8).
#[derive(Debug, Clone)]
pub enum JobArgs {
    CreateIndex {
        unique: bool,
        name: String,
        columns: Vec<crate::descriptor::IndexColumnSpec>,
    },
    DropIndex {
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub schema_id: SchemaId,
    pub table_id: TableId,
    pub state: JobState,
    pub schema_state: IndexState,
    pub snapshot_ver: SnapshotVersion,
    pub args: JobArgs,
    pub row_count: i64,
    pub history: Vec<String>,
}

impl Job {
    pub fn append_history(&mut self, event: impl Into<String>) {
        self.history.push(event.into());
    }

    /// Validation and name-collision errors cancel the job outright (§7).
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.state = JobState::Cancelled;
        self.append_history(reason);
    }
}

/// Persisted backfill checkpoint (§3, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct ReorgInfo {
    /// Next handle the dispatcher should start scanning from.
    pub handle: Handle,
    /// True only on the first invocation of this reorg; gates the snapshot
    /// version from being used before the owner has durably recorded it
    /// (§4.3, open question (c)).
    pub first: bool,
}

#[async_trait]
pub trait ReorgInfoStore: Send + Sync {
    async fn load(&self, schema: SchemaId, table: TableId) -> anyhow::Result<ReorgInfo>;

    async fn update_handle(&self, txn: &mut dyn Transaction, handle: Handle) -> anyhow::Result<()>;
}

/// External predicate: has the owner lost leadership, or was the job
/// cancelled out from under the running reorg? (§4.7, §5)
#[async_trait]
pub trait ReorgRunnable: Send + Sync {
    async fn is_reorg_runnable(&self, job: &Job) -> anyhow::Result<bool>;
}
