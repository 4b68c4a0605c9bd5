//! Concurrent backfill pipeline (§4.6, §4.7).
pub mod dispatcher;
pub mod worker;

pub use dispatcher::add_table_index;
