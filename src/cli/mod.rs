pub mod load;
pub mod shard;
