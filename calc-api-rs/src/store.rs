// calc-api-rs/src/store.rs
//
// Append-only storage for request log entries
// Provides:
// - The RequestLogStore trait the request logger writes through
// - An in-memory backend for development and tests
// - A PostgreSQL backend (JSONB request data, server-side timestamps)

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::request_log::RequestLogEntry;

/// A persisted log entry, as read back from a store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRequestLog {
    pub id: Uuid,
    #[serde(flatten)]
    pub entry: RequestLogEntry,
    pub timestamp: DateTime<Utc>,
}

/// Storage backend for request logs
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    /// Prepare the backend (create tables, etc.)
    async fn initialize(&self) -> Result<()>;

    /// Check if the storage backend is healthy
    async fn is_healthy(&self) -> bool;

    /// Append one entry; the store assigns the timestamp
    async fn insert(&self, entry: RequestLogEntry) -> Result<()>;

    /// Release connections. Inserts after close fail.
    async fn close(&self);
}

/// In-memory storage backend for testing and development
#[derive(Default)]
pub struct InMemoryRequestLogStore {
    entries: RwLock<Vec<StoredRequestLog>>,
    closed: RwLock<bool>,
}

impl InMemoryRequestLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything inserted so far, in insertion order
    pub async fn entries(&self) -> Vec<StoredRequestLog> {
        self.entries.read().await.clone()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.read().await
    }
}

#[async_trait]
impl RequestLogStore for InMemoryRequestLogStore {
    async fn initialize(&self) -> Result<()> {
        info!("In-memory request log store initialized");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.is_closed().await
    }

    async fn insert(&self, entry: RequestLogEntry) -> Result<()> {
        if self.is_closed().await {
            return Err(anyhow!("request log store is closed"));
        }

        let stored = StoredRequestLog {
            id: Uuid::new_v4(),
            entry,
            timestamp: Utc::now(),
        };
        debug!("Stored request log {} for {}", stored.id, stored.entry.endpoint);
        self.entries.write().await.push(stored);
        Ok(())
    }

    async fn close(&self) {
        *self.closed.write().await = true;
    }
}

/// PostgreSQL storage backend
pub struct PostgresRequestLogStore {
    pool: sqlx::PgPool,
}

impl PostgresRequestLogStore {
    /// Connect to PostgreSQL; fails fast if the server is unreachable
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RequestLogStore for PostgresRequestLogStore {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS request_logs (
                id UUID PRIMARY KEY,
                endpoint TEXT NOT NULL,
                request_data JSONB NOT NULL,
                timestamp TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create request_logs table")?;

        info!("PostgreSQL request log store initialized");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn insert(&self, entry: RequestLogEntry) -> Result<()> {
        let request_data =
            serde_json::to_value(&entry.request_data).context("Failed to serialize request data")?;

        sqlx::query("INSERT INTO request_logs (id, endpoint, request_data) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(&entry.endpoint)
            .bind(&request_data)
            .execute(&self.pool)
            .await
            .context("Failed to insert request log")?;

        debug!("Stored request log for {}", entry.endpoint);
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Which backend to open at startup
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    Postgres { database_url: String },
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Capacity of the queue between the request path and the store writer
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            queue_capacity: 1024,
        }
    }
}

impl StoreConfig {
    /// Read `LOG_STORE`, `DATABASE_URL` and `LOG_QUEUE_CAPACITY` from the service config
    pub fn from_service_config(config: &config_rs::ServiceConfig) -> Result<Self> {
        let backend = match config.get_setting("log_store", "memory").to_lowercase().as_str() {
            "memory" | "in-memory" => StoreBackend::Memory,
            "postgres" | "postgresql" => {
                let database_url = config.get_optional_setting("database_url").ok_or_else(|| {
                    anyhow!(
                        "{} is required for the postgres log store",
                        config.setting_var("database_url")
                    )
                })?;
                StoreBackend::Postgres { database_url }
            }
            other => return Err(anyhow!("Unknown log store backend: {}", other)),
        };

        let queue_capacity = config
            .get_parsed_setting("log_queue_capacity", StoreConfig::default().queue_capacity)
            .max(1);

        Ok(Self { backend, queue_capacity })
    }
}

/// Open and initialize the configured store
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RequestLogStore>> {
    let store: Arc<dyn RequestLogStore> = match &config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory request log store");
            Arc::new(InMemoryRequestLogStore::new())
        }
        StoreBackend::Postgres { database_url } => {
            info!("Using PostgreSQL request log store");
            Arc::new(PostgresRequestLogStore::connect(database_url).await?)
        }
    };

    store.initialize().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_log::RequestData;
    use serde_json::json;

    fn entry(endpoint: &str) -> RequestLogEntry {
        RequestLogEntry {
            endpoint: endpoint.to_string(),
            request_data: RequestData {
                method: "POST".to_string(),
                params: Default::default(),
                query: Default::default(),
                body: json!({"a": 1, "n": 2}),
            },
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_appends_in_order() {
        let store = InMemoryRequestLogStore::new();
        store.initialize().await.unwrap();

        store.insert(entry("/calculate-expression")).await.unwrap();
        store.insert(entry("/calculate-triangle")).await.unwrap();

        let entries = store.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry.endpoint, "/calculate-expression");
        assert_eq!(entries[1].entry.endpoint, "/calculate-triangle");
        assert!(entries[0].timestamp <= entries[1].timestamp);
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn test_in_memory_store_rejects_after_close() {
        let store = InMemoryRequestLogStore::new();
        assert!(store.is_healthy().await);

        store.close().await;
        assert!(!store.is_healthy().await);
        assert!(store.insert(entry("/calculate-triangle")).await.is_err());
    }

    #[test]
    fn test_stored_log_document_shape() {
        let stored = StoredRequestLog {
            id: Uuid::nil(),
            entry: entry("/calculate-expression"),
            timestamp: Utc::now(),
        };
        let doc = serde_json::to_value(&stored).unwrap();
        assert_eq!(doc["endpoint"], "/calculate-expression");
        assert_eq!(doc["requestData"]["method"], "POST");
        assert_eq!(doc["requestData"]["body"]["n"], 2);
        assert!(doc["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = tokio_test::assert_ok!(open_store(&StoreConfig::default()).await);
        assert!(store.is_healthy().await);
    }

    #[test]
    fn test_store_config_from_environment() {
        let config = config_rs::ServiceConfig::new("store-config-test");

        let defaults = StoreConfig::from_service_config(&config).unwrap();
        assert_eq!(defaults.backend, StoreBackend::Memory);
        assert_eq!(defaults.queue_capacity, 1024);

        std::env::set_var("STORE_CONFIG_TEST_LOG_STORE", "postgres");
        assert!(StoreConfig::from_service_config(&config).is_err());

        std::env::set_var("STORE_CONFIG_TEST_DATABASE_URL", "postgres://localhost/calc");
        std::env::set_var("STORE_CONFIG_TEST_LOG_QUEUE_CAPACITY", "0");
        let parsed = StoreConfig::from_service_config(&config).unwrap();
        assert_eq!(
            parsed.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/calc".to_string()
            }
        );
        assert_eq!(parsed.queue_capacity, 1);

        std::env::set_var("STORE_CONFIG_TEST_LOG_STORE", "mongo");
        assert!(StoreConfig::from_service_config(&config).is_err());
    }
}
