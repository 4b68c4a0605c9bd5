//! Snapshot row iterator (§4.5).
use std::sync::Arc;

use crate::kv::{
    Handle,
    RawRow,
    Snapshot,
    TableId,
};

/// Outcome of invoking the row callback: whether to keep iterating.
pub enum StepResult {
    Continue,
    Stop,
}

/// Streams rows of `table` from `snapshot` starting at `seek_handle`,
/// invoking `on_row` for each, in ascending handle order. Stops when `on_row`
/// returns `StepResult::Stop`, when `on_row` errors, or when the snapshot is
/// exhausted.
///
/// `scan_rows` already filters to the table's record prefix and already
/// advances past any column-family keys sharing a row's prefix; both
/// concerns live in the row/key codec this trait abstracts over (§6), not
/// here.
pub async fn iterate_snapshot_rows(
    snapshot: &Arc<dyn Snapshot>,
    table: TableId,
    seek_handle: Handle,
    page_size: usize,
    mut on_row: impl FnMut(&RawRow) -> anyhow::Result<StepResult>,
) -> anyhow::Result<()> {
    let mut next_seek = seek_handle;
    loop {
        let rows = snapshot.scan_rows(table, next_seek, page_size).await?;
        if rows.is_empty() {
            return Ok(());
        }
        for row in &rows {
            match on_row(row)? {
                StepResult::Continue => {},
                StepResult::Stop => return Ok(()),
            }
        }
        next_seek = rows.last().expect("checked non-empty above").handle + 1;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FakeSnapshot {
        rows: Vec<RawRow>,
    }

    #[async_trait]
    impl Snapshot for FakeSnapshot {
        async fn scan_rows(
            &self,
            _table: TableId,
            seek_handle: Handle,
            limit: usize,
        ) -> anyhow::Result<Vec<RawRow>> {
            Ok(self
                .rows
                .iter()
                .filter(|r| r.handle >= seek_handle)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn row(handle: Handle) -> RawRow {
        RawRow {
            handle,
            row_key: handle.to_be_bytes().to_vec(),
            raw_row: vec![],
        }
    }

    #[tokio::test]
    async fn visits_every_row_in_order() {
        let snapshot: Arc<dyn Snapshot> = Arc::new(FakeSnapshot {
            rows: vec![row(1), row(2), row(3)],
        });
        let mut seen = vec![];
        iterate_snapshot_rows(&snapshot, 1, 0, 2, |row| {
            seen.push(row.handle);
            Ok(StepResult::Continue)
        })
        .await
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stops_early_when_callback_requests() {
        let snapshot: Arc<dyn Snapshot> = Arc::new(FakeSnapshot {
            rows: vec![row(1), row(2), row(3)],
        });
        let mut seen = vec![];
        iterate_snapshot_rows(&snapshot, 1, 0, 2, |row| {
            seen.push(row.handle);
            Ok(if row.handle == 2 {
                StepResult::Stop
            } else {
                StepResult::Continue
            })
        })
        .await
        .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_table_visits_nothing() {
        let snapshot: Arc<dyn Snapshot> = Arc::new(FakeSnapshot { rows: vec![] });
        let mut seen = vec![];
        iterate_snapshot_rows(&snapshot, 1, 0, 2, |row| {
            seen.push(row.handle);
            Ok(StepResult::Continue)
        })
        .await
        .unwrap();
        assert!(seen.is_empty());
    }
}
