//! SQLite-backed storage, one database file per namespace

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{Edit, PrefBackend, StorageProvider, StoredValue};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS prefs (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// Connect to a database file, creating it if needed
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let pool = SqlitePool::connect(&database_url)
        .await
        .with_context(|| format!("Failed to connect to database: {}", db_path.display()))?;

    // Configure SQLite: WAL for concurrent readers, FULL sync so a committed
    // preference survives a crash. Single table, so no foreign keys.
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await
        .context("Failed to enable WAL mode")?;

    sqlx::query("PRAGMA synchronous = FULL")
        .execute(&pool)
        .await
        .context("Failed to set synchronous mode")?;

    log::debug!("Connected to database: {}", db_path.display());
    Ok(pool)
}

/// Connect to a private in-memory database.
///
/// The pool is capped at one connection: every `:memory:` connection is its own database.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to connect to in-memory database")?;

    log::debug!("Connected to in-memory SQLite database");
    Ok(pool)
}

/// Backend storing each entry as a `(kind, value)` text pair
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wrap a pool, creating the `prefs` table if it does not exist
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create prefs table")?;
        Ok(Self { pool })
    }
}

fn encode(value: &StoredValue) -> Result<(&'static str, String)> {
    Ok(match value {
        StoredValue::Int(v) => ("int", v.to_string()),
        StoredValue::Long(v) => ("long", v.to_string()),
        StoredValue::Float(v) => ("float", v.to_string()),
        StoredValue::Bool(v) => ("bool", v.to_string()),
        StoredValue::String(v) => ("string", v.clone()),
        StoredValue::StringSet(v) => (
            "string_set",
            serde_json::to_string(v).context("Failed to encode string set")?,
        ),
    })
}

fn decode(kind: &str, raw: &str) -> Result<StoredValue> {
    Ok(match kind {
        "int" => StoredValue::Int(raw.parse().context("Failed to parse as int")?),
        "long" => StoredValue::Long(raw.parse().context("Failed to parse as long")?),
        "float" => StoredValue::Float(raw.parse().context("Failed to parse as float")?),
        "bool" => StoredValue::Bool(raw.parse().context("Failed to parse as bool")?),
        "string" => StoredValue::String(raw.to_string()),
        "string_set" => {
            let set: BTreeSet<String> =
                serde_json::from_str(raw).context("Failed to parse as string set")?;
            StoredValue::StringSet(set)
        }
        other => anyhow::bail!("Unknown stored kind '{}'", other),
    })
}

#[async_trait]
impl PrefBackend for SqliteBackend {
    async fn read(&self, key: &str) -> Result<Option<StoredValue>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT kind, value FROM prefs WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read preference from database")?;

        row.map(|(kind, raw)| {
            decode(&kind, &raw).with_context(|| format!("Corrupt entry for key '{}'", key))
        })
        .transpose()
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prefs WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check preference in database")?;
        Ok(count > 0)
    }

    async fn commit(&self, edits: Vec<Edit>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for edit in &edits {
            match edit {
                Edit::Put(key, value) => {
                    let (kind, raw) = encode(value)?;
                    sqlx::query(
                        "INSERT INTO prefs (key, kind, value, updated_at) VALUES (?, ?, ?, CURRENT_TIMESTAMP)
                         ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, value = excluded.value, updated_at = CURRENT_TIMESTAMP",
                    )
                    .bind(key)
                    .bind(kind)
                    .bind(&raw)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to write preference '{}'", key))?;
                }
                Edit::Remove(key) => {
                    sqlx::query("DELETE FROM prefs WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to delete preference '{}'", key))?;
                }
            }
        }

        tx.commit().await.context("Failed to commit preferences")?;
        log::debug!("Committed {} preference edit(s)", edits.len());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT key FROM prefs ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list preferences")
    }
}

/// Opens `<dir>/<namespace>.db`, or private in-memory databases
pub struct SqliteProvider {
    dir: Option<PathBuf>,
}

impl SqliteProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Every `open` gets a fresh in-memory database
    pub fn in_memory() -> Self {
        Self { dir: None }
    }
}

#[async_trait]
impl StorageProvider for SqliteProvider {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn PrefBackend>> {
        let pool = match &self.dir {
            Some(dir) => {
                if !dir.exists() {
                    std::fs::create_dir_all(dir).with_context(|| {
                        format!("Failed to create data directory: {:?}", dir)
                    })?;
                    log::info!("Created data directory: {:?}", dir);
                }
                connect(&dir.join(format!("{}.db", namespace))).await?
            }
            None => connect_memory().await?,
        };

        Ok(Arc::new(SqliteBackend::new(pool).await?))
    }
}
