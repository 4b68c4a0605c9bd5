//! Drop state machine (`onDropIndex`, §4.4) and bulk index dropper (§4.9).
use errors::ErrorMetadata;

use crate::{
    column_flags::drop_index_column_flag,
    descriptor::{
        IndexName,
        IndexState,
        TableDescriptor,
    },
    engine::{
        advance_state,
        IndexDdlEngine,
    },
    job::{
        Job,
        JobArgs,
        JobState,
    },
    kv::IndexId,
};

/// Advances `job` by exactly one state, in the reverse order of
/// [`crate::create::on_create_index`]: a newly write-only index must be
/// invisible to readers before older replicas stop considering it public,
/// and a disappearing index must keep being deleted-on-delete until no
/// replica reads it any more (§4.4).
pub async fn on_drop_index(engine: &IndexDdlEngine, job: &mut Job) -> anyhow::Result<()> {
    let JobArgs::DropIndex { name } = job.args.clone() else {
        return Err(ErrorMetadata::internal("onDropIndex invoked with a create job's args").into());
    };
    let index_name = IndexName::new(name);

    let mut table = engine.metastore.get_table(job.schema_id, job.table_id).await?;

    let Some(index) = table.index_by_name(&index_name) else {
        job.cancel("CantDropFieldOrKey");
        return Err(ErrorMetadata::bad_request(
            "CantDropFieldOrKey",
            format!("index {index_name} does not exist"),
        )
        .into());
    };
    let state = index.state;
    let index_id = index.id;

    match state {
        IndexState::Public => advance_state(engine, &mut table, &index_name, IndexState::WriteOnly, job).await,
        IndexState::WriteOnly => advance_state(engine, &mut table, &index_name, IndexState::DeleteOnly, job).await,
        IndexState::DeleteOnly => {
            advance_state(engine, &mut table, &index_name, IndexState::DeleteReorganization, job).await
        },
        IndexState::DeleteReorganization => finish_drop(engine, &mut table, &index_name, job, index_id).await,
        IndexState::None | IndexState::WriteReorganization => {
            Err(ErrorMetadata::internal("onDropIndex observed an index state it cannot advance from").into())
        },
    }
}

/// `DeleteReorganization -> Absent` (§4.4, §4.9): bulk-deletes the index's
/// key range, removes the descriptor, and restores the column flags to what
/// they would be without this index.
async fn finish_drop(
    engine: &IndexDdlEngine,
    table: &mut TableDescriptor,
    index_name: &IndexName,
    job: &mut Job,
    index_id: IndexId,
) -> anyhow::Result<()> {
    let prefix = engine.row_codec.encode_table_index_prefix(job.table_id, index_id);
    engine.kv.delete_range_by_prefix(prefix).await?;

    let dropped = table
        .index_by_name(index_name)
        .expect("index present at the start of its own finish_drop")
        .clone();
    table.indexes.retain(|idx| idx.id != index_id);
    drop_index_column_flag(table, &dropped);

    engine.metastore.update_table(job.schema_id, table).await?;

    job.state = if job.state == JobState::Rollback {
        JobState::RollbackDone
    } else {
        JobState::Done
    };
    job.append_history(format!("index {index_name} dropped"));
    tracing::info!(index = %index_name, job_state = ?job.state, "index drop complete");
    Ok(())
}
