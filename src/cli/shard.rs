use anyhow::Result;
use std::path::PathBuf;

use crate::pipeline::shard::{shard_reviews, ShardSummary, DEFAULT_SHARD_SIZE};
use crate::util::env::env_parse;

#[derive(Debug, Clone)]
pub struct ShardCommandConfig {
    pub input: PathBuf,
    pub output_prefix: String,
    /// Falls back to `SHARD_SIZE`, then 100000.
    pub shard_size: Option<usize>,
}

pub fn run(cfg: ShardCommandConfig) -> Result<ShardSummary> {
    let capacity = cfg
        .shard_size
        .unwrap_or_else(|| env_parse("SHARD_SIZE", DEFAULT_SHARD_SIZE));
    shard_reviews(&cfg.input, &cfg.output_prefix, capacity)
}
