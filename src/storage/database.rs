//! Connection pools for the two stores.

use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::StoreConfig;
use crate::domain::Result;

async fn connect(config: &StoreConfig) -> Result<Pool<Sqlite>> {
    let in_memory = config.url.contains(":memory:");

    if !in_memory && !Sqlite::database_exists(&config.url).await? {
        info!(url = %config.url, "creating database");
        Sqlite::create_database(&config.url).await?;
    }

    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(config.connection_timeout_secs))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(false);

    // Every connection to an unnamed in-memory database is its own
    // database; the pool must stay at one connection there.
    let max_connections = if in_memory { 1 } else { config.max_connections };

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Primary pricing store: catalogue, snapshots, BYOK audit rows.
#[derive(Clone)]
pub struct PricingStore {
    pool: Pool<Sqlite>,
}

impl PricingStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = connect(config).await?;
        let store = Self { pool };

        if config.run_migrations {
            store.run_migrations().await?;
        }

        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running pricing store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Backend projection store: the denormalised active-models table.
#[derive(Clone)]
pub struct BackendStore {
    pool: Pool<Sqlite>,
}

impl BackendStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = connect(config).await?;
        let store = Self { pool };

        if config.run_migrations {
            store.run_migrations().await?;
        }

        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running backend store migrations");
        sqlx::migrate!("./migrations_backend")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_stores() {
        let config = StoreConfig::default();

        let pricing = PricingStore::connect(&config).await.unwrap();
        assert!(pricing.health_check().await.is_ok());

        let backend = BackendStore::connect(&config).await.unwrap();
        assert!(backend.health_check().await.is_ok());
    }
}
