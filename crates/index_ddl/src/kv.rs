//! External collaborator interfaces (§6).
//!
//! Everything in this module is a trait: the SQL front-end, the DDL job
//! queue/dispatch loop, the transactional key-value store, the row/key codec
//! and the table descriptor metastore are all out of scope (§1) and are
//! modeled here only as the surface this crate calls through.
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::descriptor::{
    ColumnOffset,
    TableDescriptor,
};

pub type SchemaId = i64;
pub type TableId = i64;
pub type IndexId = i64;
pub type Handle = i64;
pub type SnapshotVersion = u64;
pub type ColumnId = ColumnOffset;

/// One decoded column value. The physical encoding is the row/key codec's
/// concern, not ours; we only need enough structure to build index values.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int(i64),
    Bytes(Vec<u8>),
}

/// Raised by [`IndexPrimitive::create`] when the value tuple already maps to
/// a different (or the same) handle in the index.
#[derive(Debug, Clone, thiserror::Error)]
#[error("key already exists for handle {existing_handle}")]
pub struct KeyExistsError {
    pub existing_handle: Handle,
}

/// A single row as read off a snapshot iterator: its handle, its encoded key,
/// and its raw (un-decoded) value bytes.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub handle: Handle,
    pub row_key: Vec<u8>,
    pub raw_row: Vec<u8>,
}

/// A point-in-time consistent view of the key-value store.
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// Returns up to `limit` rows of `table`'s record space starting at
    /// `seek_handle` (inclusive), in ascending handle order. An empty result
    /// means there is no more data at or after `seek_handle`.
    async fn scan_rows(
        &self,
        table: TableId,
        seek_handle: Handle,
        limit: usize,
    ) -> anyhow::Result<Vec<RawRow>>;
}

/// A single read-write transaction against the key-value store.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Serialises against concurrent DML on the given base-row keys.
    async fn lock_keys(&mut self, keys: &[Vec<u8>]) -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

/// A unit of work run inside a fresh transaction by [`KvStore::run_in_new_txn`].
/// The store may invoke this more than once if the transaction needs to
/// retry internally, so bodies that publish something exactly once must
/// guard themselves (§9, "do-once latch").
pub type TxnBody<'a> =
    Box<dyn Fn(&mut dyn Transaction) -> futures::future::BoxFuture<'_, anyhow::Result<()>> + Send + Sync + 'a>;

/// The transactional key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_snapshot(&self, version: SnapshotVersion) -> anyhow::Result<std::sync::Arc<dyn Snapshot>>;

    /// Runs `body` inside a fresh, retryable transaction and commits on
    /// success.
    async fn run_in_new_txn<'a>(&'a self, body: TxnBody<'a>) -> anyhow::Result<()>;

    /// Deletes every key with the given prefix. May complete asynchronously;
    /// callers do not wait on it beyond the `runReorgJob` wrapper (§4.9).
    async fn delete_range_by_prefix(&self, prefix: Vec<u8>) -> anyhow::Result<()>;
}

/// Row/key codec (out of scope to implement, but needed as a call surface).
pub trait RowCodec: Send + Sync {
    fn encode_table_record_prefix(&self, table: TableId) -> Vec<u8>;

    fn encode_table_index_prefix(&self, table: TableId, index: IndexId) -> Vec<u8>;

    fn decode_row_key(&self, key: &[u8]) -> anyhow::Result<Handle>;

    fn decode_row(
        &self,
        raw_row: &[u8],
        column_types: &BTreeMap<ColumnId, crate::descriptor::ColumnType>,
    ) -> anyhow::Result<BTreeMap<ColumnId, Datum>>;
}

/// The index's own storage primitive (physical layout is explicitly out of
/// scope, §1).
#[async_trait]
pub trait IndexPrimitive: Send + Sync {
    /// Inserts `values` under `handle`. On conflict returns `Ok(Err(..))`
    /// carrying the existing handle rather than a plain error, so callers
    /// can apply the exact silently-continue predicate from §4.7.
    async fn create(
        &self,
        txn: &mut dyn Transaction,
        values: &[Datum],
        handle: Handle,
    ) -> anyhow::Result<Result<(), KeyExistsError>>;
}

/// Hands out the storage primitive bound to a particular index, so the
/// backfill worker doesn't need to know how primitives are constructed.
pub trait IndexPrimitiveFactory: Send + Sync {
    fn primitive_for(&self, table: TableId, index: IndexId) -> std::sync::Arc<dyn IndexPrimitive>;
}

/// Table descriptor metastore.
#[async_trait]
pub trait Metastore: Send + Sync {
    async fn get_table(&self, schema: SchemaId, table: TableId) -> anyhow::Result<TableDescriptor>;

    async fn update_table(&self, schema: SchemaId, table: &TableDescriptor) -> anyhow::Result<()>;

    async fn update_schema_version(&self) -> anyhow::Result<u64>;
}
