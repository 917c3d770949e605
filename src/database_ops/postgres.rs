use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{types::Json, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, instrument};

use super::rows::{ProductRow, ReviewRow};
use super::session::{
    last_per_asin, rows_per_statement, BatchSink, LoadSession, PartitionCleared, PRODUCT_BINDS,
    REVIEW_BINDS,
};

/// Protocol cap on bind parameters in one statement.
const MAX_BINDS: usize = 65_535;

/// Postgres transaction backing one loader run.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl BatchSink<ProductRow> for PgSession {
    // Product metadata changes over time: latest run wins per ASIN.
    #[instrument(skip(self, rows), fields(batch = rows.len()))]
    async fn write_batch(&mut self, rows: &[ProductRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let unique = last_per_asin(rows);
        for chunk in unique.chunks(rows_per_statement(MAX_BINDS, PRODUCT_BINDS)) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
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
                b.push("now()");
            });
            qb.push(
                " ON CONFLICT (asin)
                  DO UPDATE SET title = EXCLUDED.title,
                                brand = EXCLUDED.brand,
                                category = EXCLUDED.category,
                                price = EXCLUDED.price,
                                price_raw = EXCLUDED.price_raw,
                                source_run = EXCLUDED.source_run,
                                updated_at = now()",
            );
            qb.build()
                .persistent(false)
                .execute(&mut *self.tx)
                .await
                .context("upsert products batch")?;
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<ReviewRow> for PgSession {
    // Reviews are immutable: first write wins.
    #[instrument(skip(self, rows), fields(batch = rows.len()))]
    async fn write_batch(&mut self, rows: &[ReviewRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut inserted = 0u64;
        for chunk in rows.chunks(rows_per_statement(MAX_BINDS, REVIEW_BINDS)) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
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
            inserted += qb
                .build()
                .persistent(false)
                .execute(&mut *self.tx)
                .await
                .context("insert reviews batch")?
                .rows_affected();
        }
        debug!(inserted, "review batch applied");
        Ok(())
    }
}

#[async_trait]
impl LoadSession for PgSession {
    #[instrument(skip(self))]
    async fn clear_partition(&mut self, run_id: &str) -> Result<PartitionCleared> {
        let reviews = sqlx::query("DELETE FROM reviews_table WHERE source_run = $1")
            .persistent(false)
            .bind(run_id)
            .execute(&mut *self.tx)
            .await
            .context("clear reviews partition")?
            .rows_affected();
        let products = sqlx::query("DELETE FROM products_table WHERE source_run = $1")
            .persistent(false)
            .bind(run_id)
            .execute(&mut *self.tx)
            .await
            .context("clear products partition")?
            .rows_affected();
        info!(reviews, products, "partition cleared");
        Ok(PartitionCleared { reviews, products })
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("commit transaction")
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("rollback transaction")
    }
}
