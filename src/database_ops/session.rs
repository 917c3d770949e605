use anyhow::Result;
use async_trait::async_trait;

use super::rows::{ProductRow, ReviewRow};

/// Bulk write of one batch of rows of a single kind. Each entity kind carries
/// its own conflict policy.
#[async_trait]
pub trait BatchSink<R: Send + Sync>: Send {
    async fn write_batch(&mut self, rows: &[R]) -> Result<()>;
}

/// Rows removed when a run partition is cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionCleared {
    pub reviews: u64,
    pub products: u64,
}

/// One transactional session owned by a single run.
///
/// Nothing written through the session is durable until [`commit`]. Dropping
/// an uncommitted session discards its writes.
///
/// [`commit`]: LoadSession::commit
#[async_trait]
pub trait LoadSession: BatchSink<ProductRow> + BatchSink<ReviewRow> {
    /// Delete every review, then every product, tagged with `run_id`.
    async fn clear_partition(&mut self, run_id: &str) -> Result<PartitionCleared>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Bound parameters per row of each insert statement.
pub(crate) const PRODUCT_BINDS: usize = 7;
pub(crate) const REVIEW_BINDS: usize = 5;

/// Rows that fit in one statement without exceeding `max_binds` parameters.
pub(crate) fn rows_per_statement(max_binds: usize, binds_per_row: usize) -> usize {
    (max_binds / binds_per_row.max(1)).max(1)
}

/// Keep only the last occurrence of each product key, preserving order of
/// the survivors. A single `ON CONFLICT DO UPDATE` statement may not touch
/// the same row twice.
pub(crate) fn last_per_asin(rows: &[ProductRow]) -> Vec<&ProductRow> {
    use std::collections::HashMap;
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        last.insert(row.asin.as_str(), idx);
    }
    rows.iter()
        .enumerate()
        .filter(|(idx, row)| last.get(row.asin.as_str()) == Some(idx))
        .map(|(_, row)| row)
        .collect()
}
