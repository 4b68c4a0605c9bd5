//! Backfill progress metrics (§4.6 step 6).
//!
//! The production stack's metrics crate wraps a forked `prometheus` with a
//! custom histogram type tuned for high-cardinality label sets; none of that
//! is needed here, so this module registers directly against the upstream
//! `prometheus` default registry.
use std::sync::LazyLock;

use prometheus::{
    register_histogram,
    register_int_counter,
    Histogram,
    IntCounter,
};

pub static BACKFILL_ROWS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "index_ddl_backfill_rows_total",
        "Rows written to a secondary index by the backfill pipeline"
    )
    .expect("metric registration is infallible outside of duplicate registration bugs")
});

pub static BACKFILL_ROUND_ROWS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "index_ddl_backfill_round_rows",
        "Rows added per backfill dispatcher round"
    )
    .expect("metric registration is infallible outside of duplicate registration bugs")
});

pub fn record_round(rows_added: i64) {
    if rows_added > 0 {
        BACKFILL_ROWS_TOTAL.inc_by(rows_added as u64);
    }
    BACKFILL_ROUND_ROWS.observe(rows_added as f64);
}
