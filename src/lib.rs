pub mod cli;
pub mod database_ops;
pub mod normalization;
pub mod orchestrator;
pub mod pipeline;

pub mod util {
    pub mod env;
    pub mod logging;
}

pub use orchestrator::{run_loader, RunRequest, RunStats};
pub use pipeline::loader::{BatchLoader, LoadStats};
