// src/persistence.rs
//
// Where finished enrichment results end up.
//
// Two backends:
//   - sqlite: `railway_objects` table, one row per enriched track
//   - jsonl:  one JSON object per line, append-only
//
// Workers share one gateway. Each call writes exactly one record and is
// never retried; the caller logs and counts failures.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::enrichment::EnrichmentResult;
use crate::error::ConfigError;
use crate::types::{PersistenceConfig, StorageBackend};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn record(&self, result: &EnrichmentResult) -> Result<()>;
}

/// Open the configured backend. An unreachable store is a start-up error.
pub async fn open_gateway(
    config: &PersistenceConfig,
) -> Result<Arc<dyn PersistenceGateway>, ConfigError> {
    match config.backend {
        StorageBackend::Sqlite => {
            let gateway = SqliteGateway::connect(&config.sqlite_path)
                .await
                .map_err(|e| ConfigError::StorageUnreachable(format!("{:#}", e)))?;
            Ok(Arc::new(gateway))
        }
        StorageBackend::Jsonl => {
            let gateway = JsonlGateway::open(&config.jsonl_path)
                .await
                .map_err(|e| ConfigError::StorageUnreachable(format!("{:#}", e)))?;
            Ok(Arc::new(gateway))
        }
    }
}

// ============================================================================
// SQLITE
// ============================================================================

pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .with_context(|| format!("invalid sqlite path {}", path))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening {}", path))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS railway_objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL,
                object_type TEXT NOT NULL,
                date_time TEXT NOT NULL,
                description TEXT NOT NULL,
                location_x INTEGER NOT NULL,
                location_y INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("creating railway_objects table")?;

        info!("✅ Database and table are ready!");
        Ok(Self { pool })
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn record(&self, result: &EnrichmentResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO railway_objects (track_id, object_type, date_time, description, location_x, location_y)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(result.track_id as i64)
        .bind(&result.object_type)
        .bind(result.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .bind(&result.description)
        .bind(result.x)
        .bind(result.y)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting track {}", result.track_id))?;
        Ok(())
    }
}

// ============================================================================
// JSONL
// ============================================================================

pub struct JsonlGateway {
    file: Mutex<tokio::fs::File>,
}

impl JsonlGateway {
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening {}", path))?;

        info!("✅ Result log ready: {}", path);
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl PersistenceGateway for JsonlGateway {
    async fn record(&self, result: &EnrichmentResult) -> Result<()> {
        let mut line = serde_json::to_vec(result).context("serializing result")?;
        line.push(b'\n');

        // One writer at a time keeps lines whole.
        let mut file = self.file.lock().await;
        file.write_all(&line).await.context("appending result")?;
        file.flush().await.context("flushing result log")?;
        Ok(())
    }
}
