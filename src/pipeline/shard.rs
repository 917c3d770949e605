use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use crate::normalization::{normalize_review, Review};
use crate::pipeline::reader::read_records;

pub const DEFAULT_SHARD_SIZE: usize = 100_000;

/// One finished output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardFile {
    pub path: PathBuf,
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShardSummary {
    pub shards: Vec<ShardFile>,
    pub written: usize,
    pub skipped: usize,
}

struct OpenShard {
    path: PathBuf,
    records: usize,
    encoder: GzEncoder<BufWriter<File>>,
}

/// Writes reviews as gzip NDJSON into `<prefix>_<NNN>.jsonl.gz` files holding
/// at most `capacity` records each.
///
/// A shard is opened on its first record, not when the previous one fills.
/// An input whose length is an exact multiple of `capacity` therefore ends
/// on a full shard with no empty trailing file. Sharders that rotate eagerly
/// leave that extra empty file behind, so shard counts differ by one there.
pub struct ShardWriter {
    prefix: String,
    capacity: usize,
    current: Option<OpenShard>,
    finished: Vec<ShardFile>,
}

impl ShardWriter {
    pub fn new(prefix: impl Into<String>, capacity: usize) -> Self {
        Self {
            prefix: prefix.into(),
            capacity: capacity.max(1),
            current: None,
            finished: Vec::new(),
        }
    }

    /// Path of the shard at `index`.
    pub fn shard_path(&self, index: usize) -> PathBuf {
        PathBuf::from(format!("{}_{:03}.jsonl.gz", self.prefix, index))
    }

    pub fn write(&mut self, review: &Review) -> Result<()> {
        let shard = match self.current.take() {
            Some(open) => open,
            None => self.open_next()?,
        };
        let shard = self.current.insert(shard);

        serde_json::to_writer(&mut shard.encoder, review)
            .with_context(|| format!("serialize review to {}", shard.path.display()))?;
        shard
            .encoder
            .write_all(b"\n")
            .with_context(|| format!("write {}", shard.path.display()))?;
        shard.records += 1;

        if shard.records >= self.capacity {
            self.close_current()?;
        }
        Ok(())
    }

    /// Close the last shard and report what was written. An empty stream
    /// still produces the first (empty) shard.
    pub fn finish(mut self) -> Result<Vec<ShardFile>> {
        if self.current.is_none() && self.finished.is_empty() {
            self.current = Some(self.open_next()?);
        }
        self.close_current()?;
        Ok(self.finished)
    }

    fn open_next(&self) -> Result<OpenShard> {
        let path = self.shard_path(self.finished.len());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)
                    .with_context(|| format!("mkdir -p {}", parent.display()))?;
            }
        }
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        debug!(path = %path.display(), "opened shard");
        Ok(OpenShard {
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            path,
            records: 0,
        })
    }

    fn close_current(&mut self) -> Result<()> {
        let Some(shard) = self.current.take() else {
            return Ok(());
        };
        let mut inner = shard
            .encoder
            .finish()
            .with_context(|| format!("finish gzip stream {}", shard.path.display()))?;
        inner
            .flush()
            .with_context(|| format!("flush {}", shard.path.display()))?;
        info!(path = %shard.path.display(), records = shard.records, "closed shard");
        self.finished.push(ShardFile {
            path: shard.path,
            records: shard.records,
        });
        Ok(())
    }
}

/// Extract reviews from `input` and spread them over bounded shards.
#[instrument(skip(input))]
pub fn shard_reviews(
    input: impl AsRef<Path>,
    prefix: &str,
    capacity: usize,
) -> Result<ShardSummary> {
    let mut writer = ShardWriter::new(prefix, capacity);
    let mut written = 0usize;
    let mut skipped = 0usize;

    for record in read_records(input.as_ref())? {
        let record = record?;
        match normalize_review(&record) {
            Some(review) => {
                writer.write(&review)?;
                written += 1;
            }
            None => skipped += 1,
        }
    }

    let shards = writer.finish()?;
    info!(written, skipped, shards = shards.len(), "review sharding complete");
    Ok(ShardSummary {
        shards,
        written,
        skipped,
    })
}
