//! Create state machine (`onCreateIndex`, §4.3).
use std::{
    collections::BTreeMap,
    sync::Arc,
};

use errors::ErrorMetadata;

use crate::{
    backfill::{
        add_table_index,
        worker::WorkerContext,
    },
    column_flags::add_index_column_flag,
    descriptor::{
        build_index_descriptor,
        IndexName,
        IndexState,
    },
    engine::{
        advance_state,
        is_key_exists,
        IndexDdlEngine,
    },
    job::{
        Job,
        JobArgs,
        JobState,
    },
    kv::IndexId,
    rollback::convert_to_rollback,
};

/// Advances `job` by exactly one state and returns; the external job loop
/// re-invokes until the job reaches a terminal state (`Done`, `Cancelled`,
/// or `RollbackDone`).
pub async fn on_create_index(engine: &IndexDdlEngine, job: &mut Job) -> anyhow::Result<()> {
    if job.state == JobState::Rollback {
        return crate::drop::on_drop_index(engine, job).await;
    }

    let JobArgs::CreateIndex { unique, name, columns } = job.args.clone() else {
        return Err(ErrorMetadata::internal("onCreateIndex invoked with a drop job's args").into());
    };
    let index_name = IndexName::new(name);

    let mut table = engine.metastore.get_table(job.schema_id, job.table_id).await?;

    let index_id: IndexId = match table.index_by_name(&index_name) {
        Some(existing) if existing.state == IndexState::Public => {
            job.cancel("DupKeyName");
            return Err(ErrorMetadata::bad_request(
                "DupKeyName",
                format!("index {index_name} already exists"),
            )
            .into());
        },
        Some(existing) => existing.id,
        None => {
            let descriptor = match build_index_descriptor(&mut table, unique, index_name.clone(), columns) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    job.cancel(format!("{err:#}"));
                    return Err(err);
                },
            };
            let id = descriptor.id;
            table.indexes.push(descriptor);
            id
        },
    };

    engine.metastore.update_schema_version().await?;

    let state = table
        .index_by_name(&index_name)
        .expect("index just located or inserted above")
        .state;

    match state {
        IndexState::None => advance_state(engine, &mut table, &index_name, IndexState::DeleteOnly, job).await,
        IndexState::DeleteOnly => advance_state(engine, &mut table, &index_name, IndexState::WriteOnly, job).await,
        IndexState::WriteOnly => {
            job.snapshot_ver = 0;
            advance_state(engine, &mut table, &index_name, IndexState::WriteReorganization, job).await
        },
        IndexState::WriteReorganization => run_reorg(engine, &mut table, &index_name, job, index_id).await,
        IndexState::Public | IndexState::DeleteReorganization => {
            Err(ErrorMetadata::internal("onCreateIndex observed an index state it cannot advance from").into())
        },
    }
}

/// The `WriteReorganization -> Public` transition (§4.3, §4.6). Runs the
/// backfill dispatcher to completion, then marks the index `Public`; on a
/// duplicate-key violation, converts the job to a rollback instead.
async fn run_reorg(
    engine: &IndexDdlEngine,
    table: &mut crate::descriptor::TableDescriptor,
    index_name: &IndexName,
    job: &mut Job,
    index_id: IndexId,
) -> anyhow::Result<()> {
    let reorg = engine.reorg_info.load(job.schema_id, job.table_id).await?;
    if reorg.first {
        // The outer job loop persists the chosen snapshot version after this
        // invocation returns; only the next invocation actually scans
        // (open question (c): this is not an error, just "come back later").
        return Ok(());
    }

    let snapshot = engine.kv.get_snapshot(job.snapshot_ver).await?;
    let index_descriptor = table
        .index_by_name(index_name)
        .expect("index present while its own reorg runs")
        .clone();

    let column_types: BTreeMap<_, _> = table.columns.iter().map(|c| (c.offset, c.ty)).collect();
    let index_columns = index_descriptor.columns.iter().map(|c| c.offset).collect();

    let ctx = Arc::new(WorkerContext {
        table: job.table_id,
        snapshot,
        kv: engine.kv.clone(),
        index_columns,
        column_types,
        row_codec: engine.row_codec.clone(),
        index: engine.index_primitives.primitive_for(job.table_id, index_id),
        reorg_runnable: engine.reorg_runnable.clone(),
        batch_size: crate::backfill::dispatcher::default_batch_size(),
    });

    match add_table_index(ctx, job, engine.reorg_info.clone(), reorg.handle).await {
        Ok(rows_added) => {
            {
                let index = table
                    .index_by_name_mut(index_name)
                    .expect("index present while its own reorg runs");
                index.state = IndexState::Public;
            }
            let published = table.index_by_name(index_name).expect("just updated above").clone();
            add_index_column_flag(table, &published);
            job.schema_state = IndexState::Public;
            engine.metastore.update_table(job.schema_id, table).await?;

            job.state = JobState::Done;
            job.append_history(format!("index {index_name} backfilled {rows_added} rows and is now public"));
            tracing::info!(index = %index_name, rows_added, "index backfill complete");
            Ok(())
        },
        Err(err) if is_key_exists(&err) => convert_to_rollback(engine, table, index_name, job, err).await,
        Err(err) => Err(err),
    }
}
