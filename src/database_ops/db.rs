use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use super::postgres::PgSession;
use crate::util::env::{env_flag, env_opt, env_parse};

/// Connection settings, resolved once at process start.
#[derive(Clone)]
pub struct DbConfig {
    /// Full DSN; takes precedence over the discrete fields when set.
    pub database_url: Option<String>,
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub port: u16,
    /// Keep server-side prepared statements (off by default, PgBouncer safe).
    pub use_prepared: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "postgres".into(),
            database: "rag_db".into(),
            user: "rag_user".into(),
            password: None,
            port: 5432,
            use_prepared: false,
        }
    }
}

impl std::fmt::Debug for DbConfig {
    // SECURITY: never print the password or a DSN that may embed it.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("use_prepared", &self.use_prepared)
            .finish()
    }
}

impl DbConfig {
    /// Read `DATABASE_URL` / `POSTGRES_*` from the environment (after `.env`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_opt("DATABASE_URL"),
            host: env_opt("POSTGRES_HOST").unwrap_or(defaults.host),
            database: env_opt("POSTGRES_DB").unwrap_or(defaults.database),
            user: env_opt("POSTGRES_USER").unwrap_or(defaults.user),
            password: env_opt("POSTGRES_PASSWORD"),
            port: env_parse("POSTGRES_PORT", defaults.port),
            use_prepared: env_flag("USE_PREPARED", false),
        }
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = match self.database_url.as_deref() {
            Some(url) => {
                let mut options =
                    PgConnectOptions::from_str(url).context("parse DATABASE_URL")?;
                if url.contains("sslmode=require") {
                    options = options.ssl_mode(PgSslMode::Require);
                }
                options
            }
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .database(&self.database)
                    .username(&self.user);
                if let Some(password) = self.password.as_deref() {
                    options = options.password(password);
                }
                options
            }
        };
        if !self.use_prepared {
            options = options.statement_cache_capacity(0);
        }
        Ok(options)
    }
}

/// Postgres pool sized for a single loader session.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    #[instrument(skip(config))]
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(config.connect_options()?)
            .await
            .context("connect to postgres")?;
        info!(host = %config.host, database = %config.database, "connected to db");
        Ok(Self { pool })
    }

    /// Open the run's transaction.
    pub async fn begin(&self) -> Result<PgSession> {
        let tx = self.pool.begin().await.context("begin transaction")?;
        Ok(PgSession::new(tx))
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("db pool closed");
    }
}
