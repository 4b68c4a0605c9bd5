//! Wires the external collaborators (§6) together behind the two state
//! machines. This is the one piece of plumbing `onCreateIndex`/`onDropIndex`
//! (§4.3, §4.4) both depend on; there is no interesting logic here beyond
//! bundling the interfaces.
use std::sync::Arc;

use crate::{
    descriptor::{
        IndexName,
        IndexState,
        TableDescriptor,
    },
    job::{
        Job,
        ReorgInfoStore,
        ReorgRunnable,
    },
    kv::{
        IndexPrimitiveFactory,
        KeyExistsError,
        KvStore,
        Metastore,
        RowCodec,
    },
};

pub struct IndexDdlEngine {
    pub metastore: Arc<dyn Metastore>,
    pub kv: Arc<dyn KvStore>,
    pub row_codec: Arc<dyn RowCodec>,
    pub reorg_info: Arc<dyn ReorgInfoStore>,
    pub reorg_runnable: Arc<dyn ReorgRunnable>,
    pub index_primitives: Arc<dyn IndexPrimitiveFactory>,
}

/// Moves `index_name`'s descriptor to `to`, keeps `job.schema_state` in sync
/// (I3), and persists the table. Every single-step transition in both state
/// machines goes through here.
pub(crate) async fn advance_state(
    engine: &IndexDdlEngine,
    table: &mut TableDescriptor,
    index_name: &IndexName,
    to: IndexState,
    job: &mut Job,
) -> anyhow::Result<()> {
    let index = table
        .index_by_name_mut(index_name)
        .expect("index looked up by the caller before calling advance_state");
    let from = index.state;
    index.state = to;
    job.schema_state = to;
    engine.metastore.update_table(job.schema_id, table).await?;
    tracing::info!(index = %index_name, ?from, ?to, "index state transition");
    Ok(())
}

/// True for the exact predicate the rollback converter reacts to (§4.8,
/// §9 "rollback asymmetry"): a duplicate-key violation, and nothing else.
pub(crate) fn is_key_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<KeyExistsError>().is_some()
}
