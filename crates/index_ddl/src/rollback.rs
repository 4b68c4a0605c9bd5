//! Rollback converter (§4.8).
use anyhow::Context;

use crate::{
    descriptor::{
        IndexName,
        IndexState,
        TableDescriptor,
    },
    engine::IndexDdlEngine,
    job::{
        Job,
        JobArgs,
        JobState,
    },
};

/// Flips a create job to a rollback job after a unique-key violation during
/// backfill (§4.8, §9 "rollback asymmetry"): this is a synchronous,
/// in-handler flip triggered by exactly one predicate — a duplicate-key
/// error from the key-value store — and nothing else.
///
/// The symmetric mapping is `WriteReorganization` (create) <-> `WriteOnly`
/// (drop), so the descriptor steps back to `DeleteOnly`, the state the drop
/// machine expects to find on its next invocation.
pub async fn convert_to_rollback(
    engine: &IndexDdlEngine,
    table: &mut TableDescriptor,
    index_name: &IndexName,
    job: &mut Job,
    cause: anyhow::Error,
) -> anyhow::Result<()> {
    job.state = JobState::Rollback;
    job.args = JobArgs::DropIndex {
        name: index_name.as_str().to_string(),
    };

    {
        let index = table
            .index_by_name_mut(index_name)
            .expect("index present when its own backfill reports a conflict");
        index.state = IndexState::DeleteOnly;
    }
    job.schema_state = IndexState::DeleteOnly;
    engine.metastore.update_table(job.schema_id, table).await?;

    job.append_history(format!("index {index_name} rolled back after duplicate key"));
    tracing::warn!(index = %index_name, "duplicate key during backfill, converting job to rollback");

    Err(cause).context(format!(
        "duplicate key while backfilling index {index_name}; job converted to rollback"
    ))
}
