use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::database_ops::rows::{ProductRow, ReviewRow};
use crate::database_ops::session::BatchSink;
use crate::normalization::{normalize_product, normalize_review, RawRecord};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// A row kind the loader can classify from a raw record.
pub trait Entity: Send + Sync + Sized {
    /// Label used in logs and error context.
    const KIND: &'static str;

    /// `None` when the record is not representable as this kind.
    fn from_record(record: &RawRecord, run_id: &str) -> Option<Self>;
}

impl Entity for ProductRow {
    const KIND: &'static str = "products";

    fn from_record(record: &RawRecord, run_id: &str) -> Option<Self> {
        normalize_product(record).map(|p| ProductRow::new(p, run_id))
    }
}

impl Entity for ReviewRow {
    const KIND: &'static str = "reviews";

    fn from_record(record: &RawRecord, run_id: &str) -> Option<Self> {
        normalize_review(record).map(|r| ReviewRow::new(r, run_id))
    }
}

/// Per-kind counters for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Records accepted by the normalizer.
    pub seen: u64,
    /// Rows handed to the sink, summed over flushes.
    pub written: u64,
    /// Records rejected by the normalizer.
    pub skipped: u64,
}

/// Buffers normalized rows and flushes them to the sink in fixed-size batches.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    run_id: String,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(run_id: impl Into<String>, batch_size: usize) -> Self {
        Self {
            run_id: run_id.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Stream `records` into `sink`. The first read or sink error aborts the
    /// load; rows already flushed are left to the session's transaction.
    #[instrument(skip(self, sink, records), fields(kind = E::KIND, run_id = %self.run_id))]
    pub async fn load<E, S, I>(&self, sink: &mut S, records: I) -> Result<LoadStats>
    where
        E: Entity,
        S: BatchSink<E>,
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let mut stats = LoadStats::default();
        let mut buffer: Vec<E> = Vec::with_capacity(self.batch_size);

        for record in records {
            let record = record.with_context(|| format!("read {} source", E::KIND))?;
            match E::from_record(&record, &self.run_id) {
                Some(row) => {
                    buffer.push(row);
                    stats.seen += 1;
                }
                None => {
                    stats.skipped += 1;
                    continue;
                }
            }

            if buffer.len() >= self.batch_size {
                self.flush(sink, &mut buffer, &mut stats).await?;
            }
        }
        if !buffer.is_empty() {
            self.flush(sink, &mut buffer, &mut stats).await?;
        }

        info!(
            seen = stats.seen,
            written = stats.written,
            skipped = stats.skipped,
            "load complete"
        );
        Ok(stats)
    }

    async fn flush<E, S>(
        &self,
        sink: &mut S,
        buffer: &mut Vec<E>,
        stats: &mut LoadStats,
    ) -> Result<()>
    where
        E: Entity,
        S: BatchSink<E>,
    {
        sink.write_batch(buffer)
            .await
            .with_context(|| format!("flush {} batch of {} rows", E::KIND, buffer.len()))?;
        stats.written += buffer.len() as u64;
        debug!(written = stats.written, "batch flushed");
        buffer.clear();
        Ok(())
    }
}
