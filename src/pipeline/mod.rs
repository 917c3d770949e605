//! Streaming stages: NDJSON reader, review sharder, and batched loader.

pub mod loader;
pub mod reader;
pub mod shard;
