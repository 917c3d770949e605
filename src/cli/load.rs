use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::database_ops::db::DbConfig;
use crate::database_ops::sqlite;
use crate::orchestrator::{self, RunRequest, RunStats};
use crate::pipeline::loader::DEFAULT_BATCH_SIZE;
use crate::util::env::env_parse;

#[derive(Debug, Clone)]
pub struct LoadCommandConfig {
    pub products: PathBuf,
    pub reviews: PathBuf,
    pub run_date: String,
    pub overwrite: bool,
    /// Falls back to `LOADER_BATCH_SIZE`, then 5000.
    pub batch_size: Option<usize>,
    /// Optional override for the connection; `sqlite:` URLs load locally.
    pub database_url: Option<String>,
}

pub async fn run(cfg: LoadCommandConfig) -> Result<RunStats> {
    let run_id = cfg.run_date.trim().to_string();
    if run_id.is_empty() {
        bail!("--run-date must not be blank");
    }
    if NaiveDate::parse_from_str(&run_id, "%Y-%m-%d").is_err() {
        warn!(run_id = %run_id, "run date is not YYYY-MM-DD; using it verbatim as the partition label");
    }

    let batch_size = cfg
        .batch_size
        .unwrap_or_else(|| env_parse("LOADER_BATCH_SIZE", DEFAULT_BATCH_SIZE));
    let request = RunRequest {
        products_path: cfg.products,
        reviews_path: cfg.reviews,
        run_id,
        overwrite: cfg.overwrite,
    };
    info!(
        products = %request.products_path.display(),
        reviews = %request.reviews_path.display(),
        run_id = %request.run_id,
        overwrite = request.overwrite,
        batch_size,
        "starting load"
    );

    match cfg.database_url {
        Some(url) if url.starts_with("sqlite:") => {
            let pool = sqlite::connect(&url).await?;
            let result = match sqlite::begin(&pool).await {
                Ok(session) => orchestrator::run_loader(session, &request, batch_size).await,
                Err(err) => Err(err),
            };
            pool.close().await;
            result
        }
        url => {
            let mut db_cfg = DbConfig::from_env();
            if url.is_some() {
                db_cfg.database_url = url;
            }
            orchestrator::run(&db_cfg, &request, batch_size).await
        }
    }
}
