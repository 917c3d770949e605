//! SQLite backend for local loads. Same conflict policies as Postgres; the
//! target database must already carry `products_table` and `reviews_table`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
    QueryBuilder, Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use super::rows::{ProductRow, ReviewRow};
use super::session::{
    last_per_asin, rows_per_statement, BatchSink, LoadSession, PartitionCleared, PRODUCT_BINDS,
    REVIEW_BINDS,
};

/// `SQLITE_MAX_VARIABLE_NUMBER` default since 3.32.
const MAX_BINDS: usize = 32_766;

/// Open a single-connection pool for a `sqlite:` URL.
#[instrument]
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parse sqlite url {url}"))?;
    connect_with(options).await
}

pub async fn connect_with(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("open sqlite database")?;
    info!("connected to sqlite");
    Ok(pool)
}

pub async fn begin(pool: &SqlitePool) -> Result<SqliteSession> {
    let tx = pool.begin().await.context("begin transaction")?;
    Ok(SqliteSession { tx })
}

pub struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl BatchSink<ProductRow> for SqliteSession {
    async fn write_batch(&mut self, rows: &[ProductRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let unique = last_per_asin(rows);
        for chunk in unique.chunks(rows_per_statement(MAX_BINDS, PRODUCT_BINDS)) {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO products_table (asin, title, brand, category, price, price_raw, source_run, updated_at) ",
            );
            qb.push_values(chunk.iter().copied(), |mut b, r| {
                b.push_bind(&r.asin)
                    .push_bind(&r.title)
                    .push_bind(&r.brand)
                    .push_bind(Json(&r.category))
                    .push_bind(r.price)
                    .push_bind(r.price_raw.as_deref())
                    .push_bind(&r.source_run);
                b.push("CURRENT_TIMESTAMP");
            });
            qb.push(
                " ON CONFLICT (asin)
                  DO UPDATE SET title = excluded.title,
                                brand = excluded.brand,
                                category = excluded.category,
                                price = excluded.price,
                                price_raw = excluded.price_raw,
                                source_run = excluded.source_run,
                                updated_at = CURRENT_TIMESTAMP",
            );
            qb.build()
                .execute(&mut *self.tx)
                .await
                .context("upsert products batch")?;
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<ReviewRow> for SqliteSession {
    async fn write_batch(&mut self, rows: &[ReviewRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for chunk in rows.chunks(rows_per_statement(MAX_BINDS, REVIEW_BINDS)) {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO reviews_table (review_id, asin, review_text, summary_text, source_run) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(&r.review_id)
                    .push_bind(&r.asin)
                    .push_bind(&r.review_text)
                    .push_bind(&r.summary_text)
                    .push_bind(&r.source_run);
            });
            qb.push(" ON CONFLICT (review_id) DO NOTHING");
            qb.build()
                .execute(&mut *self.tx)
                .await
                .context("insert reviews batch")?;
        }
        Ok(())
    }
}

#[async_trait]
impl LoadSession for SqliteSession {
    async fn clear_partition(&mut self, run_id: &str) -> Result<PartitionCleared> {
        let reviews = sqlx::query("DELETE FROM reviews_table WHERE source_run = ?")
            .bind(run_id)
            .execute(&mut *self.tx)
            .await
            .context("clear reviews partition")?
            .rows_affected();
        let products = sqlx::query("DELETE FROM products_table WHERE source_run = ?")
            .bind(run_id)
            .execute(&mut *self.tx)
            .await
            .context("clear products partition")?
            .rows_affected();
        info!(run_id, reviews, products, "partition cleared");
        Ok(PartitionCleared { reviews, products })
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("commit transaction")
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("rollback transaction")
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{count, temp_db};
    use super::*;
    use serde_json::{json, Value};
    use sqlx::Row;

    fn product(asin: &str, title: &str, run: &str) -> ProductRow {
        ProductRow {
            asin: asin.into(),
            title: title.into(),
            brand: "Acme".into(),
            category: json!(["Electronics"]),
            price: Some(9.5),
            price_raw: Some("$9.50".into()),
            source_run: run.into(),
        }
    }

    fn review(id: &str, text: &str, run: &str) -> ReviewRow {
        ReviewRow {
            review_id: id.into(),
            asin: "B1".into(),
            review_text: text.into(),
            summary_text: String::new(),
            source_run: run.into(),
        }
    }

    #[tokio::test]
    async fn product_upsert_overwrites_every_column() {
        let (_dir, pool) = temp_db().await;

        let mut session = begin(&pool).await.unwrap();
        session.write_batch(&[product("B1", "old", "r1")]).await.unwrap();
        session.commit().await.unwrap();

        let mut session = begin(&pool).await.unwrap();
        let mut newer = product("B1", "new", "r2");
        newer.price = None;
        newer.category = Value::Null;
        session.write_batch(&[newer]).await.unwrap();
        session.commit().await.unwrap();

        let row = sqlx::query("SELECT title, price, category, source_run, updated_at FROM products_table WHERE asin = 'B1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("title"), "new");
        assert_eq!(row.get::<Option<f64>, _>("price"), None);
        assert_eq!(row.get::<String, _>("category"), "null");
        assert_eq!(row.get::<String, _>("source_run"), "r2");
        assert!(row.get::<Option<String>, _>("updated_at").is_some());
        assert_eq!(count(&pool, "products_table").await, 1);
    }

    #[tokio::test]
    async fn duplicate_asins_in_one_batch_keep_the_last() {
        let (_dir, pool) = temp_db().await;
        let mut session = begin(&pool).await.unwrap();
        session
            .write_batch(&[product("B1", "first", "r"), product("B1", "second", "r")])
            .await
            .unwrap();
        session.commit().await.unwrap();

        let title: String = sqlx::query_scalar("SELECT title FROM products_table WHERE asin = 'B1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(title, "second");
    }

    #[tokio::test]
    async fn review_insert_ignores_conflicts() {
        let (_dir, pool) = temp_db().await;
        let mut session = begin(&pool).await.unwrap();
        session.write_batch(&[review("id1", "original", "r1")]).await.unwrap();
        session
            .write_batch(&[review("id1", "changed", "r2"), review("id2", "other", "r2")])
            .await
            .unwrap();
        session.commit().await.unwrap();

        let text: String =
            sqlx::query_scalar("SELECT review_text FROM reviews_table WHERE review_id = 'id1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(text, "original");
        assert_eq!(count(&pool, "reviews_table").await, 2);
    }

    #[tokio::test]
    async fn clear_partition_only_touches_the_run() {
        let (_dir, pool) = temp_db().await;
        let mut session = begin(&pool).await.unwrap();
        session
            .write_batch(&[product("B1", "a", "r1"), product("B2", "b", "r2")])
            .await
            .unwrap();
        session
            .write_batch(&[review("id1", "x", "r1"), review("id2", "y", "r1"), review("id3", "z", "r2")])
            .await
            .unwrap();
        let cleared = session.clear_partition("r1").await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(cleared, PartitionCleared { reviews: 2, products: 1 });
        assert_eq!(count(&pool, "products_table").await, 1);
        assert_eq!(count(&pool, "reviews_table").await, 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let (_dir, pool) = temp_db().await;
        let mut session = begin(&pool).await.unwrap();
        session.write_batch(&[product("B1", "a", "r1")]).await.unwrap();
        session.rollback().await.unwrap();
        assert_eq!(count(&pool, "products_table").await, 0);
    }

    #[tokio::test]
    async fn dropped_session_discards_writes() {
        let (_dir, pool) = temp_db().await;
        {
            let mut session = begin(&pool).await.unwrap();
            session.write_batch(&[product("B1", "a", "r1")]).await.unwrap();
        }
        assert_eq!(count(&pool, "products_table").await, 0);
    }
}
