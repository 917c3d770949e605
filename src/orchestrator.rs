//! Run coordinator: one end-to-end load inside a single transaction.
//!
//! ```text
//! START -> [PARTITION_CLEARED] -> PRODUCTS_LOADED -> REVIEWS_LOADED -> COMMITTED
//!                      \______________ any error ______________/-> ABORTED
//! ```
//!
//! The commit is issued once, after both loads. On any error the session is
//! rolled back explicitly before the error is returned, so nothing from a
//! failed run is durable.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::database_ops::db::{Db, DbConfig};
use crate::database_ops::rows::{ProductRow, ReviewRow};
use crate::database_ops::session::LoadSession;
use crate::pipeline::loader::{BatchLoader, LoadStats};
use crate::pipeline::reader::read_records;

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub products_path: PathBuf,
    pub reviews_path: PathBuf,
    /// Partition label stamped on every row as `source_run`.
    pub run_id: String,
    /// Delete the run's existing rows before loading.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub products: LoadStats,
    pub reviews: LoadStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    PartitionCleared,
    ProductsLoaded,
    ReviewsLoaded,
    Committed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Start => "START",
            RunState::PartitionCleared => "PARTITION_CLEARED",
            RunState::ProductsLoaded => "PRODUCTS_LOADED",
            RunState::ReviewsLoaded => "REVIEWS_LOADED",
            RunState::Committed => "COMMITTED",
            RunState::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

/// Drive one run over an already-open session. The session is consumed:
/// committed on success, rolled back on failure.
#[instrument(skip(session, request), fields(run_id = %request.run_id, overwrite = request.overwrite))]
pub async fn run_loader<S: LoadSession>(
    mut session: S,
    request: &RunRequest,
    batch_size: usize,
) -> Result<RunStats> {
    let mut state = RunState::Start;
    let outcome = load_partition(&mut session, request, batch_size, &mut state).await;

    match outcome {
        Ok(stats) => {
            session
                .commit()
                .await
                .with_context(|| format!("run {} aborted at {}", request.run_id, state))?;
            info!(state = %RunState::Committed, "run committed");
            Ok(stats)
        }
        Err(err) => {
            warn!(reached = %state, error = %format!("{err:#}"), "run failed; rolling back");
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %format!("{rollback_err:#}"), "rollback failed");
            }
            info!(state = %RunState::Aborted, "run aborted");
            Err(err.context(format!("run {} aborted after {}", request.run_id, state)))
        }
    }
}

async fn load_partition<S: LoadSession>(
    session: &mut S,
    request: &RunRequest,
    batch_size: usize,
    state: &mut RunState,
) -> Result<RunStats> {
    if request.overwrite {
        session.clear_partition(&request.run_id).await?;
        *state = RunState::PartitionCleared;
    }

    let loader = BatchLoader::new(request.run_id.clone(), batch_size);

    let products = loader
        .load::<ProductRow, _, _>(session, read_records(&request.products_path)?)
        .await?;
    *state = RunState::ProductsLoaded;

    let reviews = loader
        .load::<ReviewRow, _, _>(session, read_records(&request.reviews_path)?)
        .await?;
    *state = RunState::ReviewsLoaded;

    Ok(RunStats { products, reviews })
}

/// Full run against Postgres: connect, load, and close the pool on every path.
pub async fn run(config: &DbConfig, request: &RunRequest, batch_size: usize) -> Result<RunStats> {
    let db = Db::connect(config).await?;
    let result = match db.begin().await {
        Ok(session) => run_loader(session, request, batch_size).await,
        Err(err) => Err(err),
    };
    db.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::sqlite::{begin, test_support};
    use flate2::{write::GzEncoder, Compression};
    use sqlx::SqlitePool;
    use std::io::Write;
    use std::path::Path;

    fn write_gz(path: &Path, lines: &[&str]) {
        let mut enc = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::default());
        for line in lines {
            enc.write_all(line.as_bytes()).unwrap();
            enc.write_all(b"\n").unwrap();
        }
        enc.finish().unwrap();
    }

    const PRODUCTS: &[&str] = &[
        r#"{"asin":"B0001","title":"Cable","price":"19.99-24.99","category":["Electronics"]}"#,
        r#"{"asin":"B0002","title":"Mouse","brand":"Acme","main_cat":"Computers"}"#,
        r#"{"title":"no asin"}"#,
        "not json",
    ];

    const REVIEWS: &[&str] = &[
        r#"{"asin":"B0001","reviewText":"Works","summary":"Good","unixReviewTime":1500000000}"#,
        r#"{"asin":"B0002","reviewText":"  Great   product!  ","summary":"","unixReviewTime":1500000000}"#,
        r#"{"reviewText":"ok"}"#,
        r#"{"asin":"B0002","reviewText":"","summary":""}"#,
    ];

    fn request(dir: &Path, run_id: &str, overwrite: bool) -> RunRequest {
        let products_path = dir.join("meta.json.gz");
        let reviews_path = dir.join("reviews.json.gz");
        if !products_path.exists() {
            write_gz(&products_path, PRODUCTS);
            write_gz(&reviews_path, REVIEWS);
        }
        RunRequest {
            products_path,
            reviews_path,
            run_id: run_id.to_string(),
            overwrite,
        }
    }

    async fn run_once(pool: &SqlitePool, req: &RunRequest) -> Result<RunStats> {
        let session = begin(pool).await?;
        run_loader(session, req, 2).await
    }

    #[tokio::test]
    async fn successful_run_commits_both_tables() {
        let (dir, pool) = test_support::temp_db().await;
        let req = request(dir.path(), "2024-01-01", false);

        let stats = run_once(&pool, &req).await.unwrap();

        assert_eq!(stats.products, LoadStats { seen: 2, written: 2, skipped: 1 });
        assert_eq!(stats.reviews, LoadStats { seen: 2, written: 2, skipped: 2 });
        assert_eq!(test_support::count(&pool, "products_table").await, 2);
        assert_eq!(test_support::count(&pool, "reviews_table").await, 2);

        let (price, price_raw): (Option<f64>, Option<String>) =
            sqlx::query_as("SELECT price, price_raw FROM products_table WHERE asin = 'B0001'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(price, Some(19.99));
        assert_eq!(price_raw.as_deref(), Some("19.99-24.99"));
    }

    #[tokio::test]
    async fn rerun_without_overwrite_is_idempotent() {
        let (dir, pool) = test_support::temp_db().await;
        let req = request(dir.path(), "2024-01-01", false);

        run_once(&pool, &req).await.unwrap();
        run_once(&pool, &req).await.unwrap();

        assert_eq!(test_support::count(&pool, "products_table").await, 2);
        assert_eq!(test_support::count(&pool, "reviews_table").await, 2);
    }

    #[tokio::test]
    async fn overwrite_clears_only_the_target_run() {
        let (dir, pool) = test_support::temp_db().await;
        sqlx::raw_sql(
            "INSERT INTO products_table (asin, title, source_run) VALUES ('OLD1', 'stale', '2024-01-01');
             INSERT INTO products_table (asin, title, source_run) VALUES ('KEEP', 'other run', '2023-12-31');
             INSERT INTO reviews_table (review_id, asin, review_text, source_run) VALUES ('old-review', 'OLD1', 'x', '2024-01-01');
             INSERT INTO reviews_table (review_id, asin, review_text, source_run) VALUES ('kept-review', 'KEEP', 'y', '2023-12-31');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let req = request(dir.path(), "2024-01-01", true);
        run_once(&pool, &req).await.unwrap();

        let asins: Vec<String> = sqlx::query_scalar("SELECT asin FROM products_table ORDER BY asin")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(asins, vec!["B0001", "B0002", "KEEP"]);
        let reviews: Vec<String> =
            sqlx::query_scalar("SELECT review_id FROM reviews_table WHERE source_run = '2023-12-31'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(reviews, vec!["kept-review"]);
        assert_eq!(test_support::count(&pool, "reviews_table").await, 3);
    }

    #[tokio::test]
    async fn failed_review_load_rolls_back_products_and_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_support::temp_db_without_schema(&dir).await;
        // products table only: the review flush must fail
        sqlx::raw_sql(
            "CREATE TABLE products_table (
                asin TEXT PRIMARY KEY, title TEXT, brand TEXT, category TEXT,
                price REAL, price_raw TEXT, source_run TEXT, updated_at TEXT
            );",
        )
        .execute(&pool)
        .await
        .unwrap();

        let req = request(dir.path(), "2024-01-01", false);
        let err = run_once(&pool, &req).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("aborted after PRODUCTS_LOADED"), "{message}");
        assert!(message.contains("reviews"), "{message}");

        // the single pooled connection is back and the product writes are gone
        assert_eq!(test_support::count(&pool, "products_table").await, 0);
    }

    #[tokio::test]
    async fn missing_input_aborts_before_commit() {
        let (dir, pool) = test_support::temp_db().await;
        let mut req = request(dir.path(), "2024-01-01", false);
        req.reviews_path = dir.path().join("absent.json.gz");

        let err = run_once(&pool, &req).await.unwrap_err();
        assert!(format!("{err:#}").contains("absent.json.gz"));
        assert_eq!(test_support::count(&pool, "products_table").await, 0);
    }

    #[test]
    fn states_render_as_labels() {
        assert_eq!(RunState::PartitionCleared.to_string(), "PARTITION_CLEARED");
        assert_eq!(RunState::Aborted.to_string(), "ABORTED");
    }
}
