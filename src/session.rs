//! Session cache and its durable stores.
//!
//! A [`SessionCache`] maps verbatim query strings to previously produced
//! [`Resolution`]s for one session. It is an in-memory `moka` cache bounded
//! by entry count, warmed from a [`SessionStore`] when constructed and
//! written through to it after each new resolution.
//!
//! Keys are never normalised: `"Refund?"` and `"refund?"` are distinct
//! entries.
//!
//! Stores:
//!
//! - [`SqliteSessionStore`] persists to the `workflow_cache` table.
//! - [`InMemorySessionStore`] lives and dies with the process.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use moka::future::Cache;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::db;
use crate::migrate;
use crate::models::{Outcome, Resolution, ResolutionOutput};
use crate::traits::SessionStore;

// ============ SQLite store ============

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open the database at `path` and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<(String, Resolution)>> {
        let rows = sqlx::query(
            r#"
            SELECT query, outcome, output_json
            FROM workflow_cache
            WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let query: String = row.get("query");
            let outcome: String = row.get("outcome");
            let output_json: String = row.get("output_json");

            let Some(outcome) = Outcome::parse(&outcome) else {
                tracing::warn!(%query, %outcome, "skipping cached entry with unknown outcome");
                continue;
            };
            match serde_json::from_str::<ResolutionOutput>(&output_json) {
                Ok(output) => entries.push((query, Resolution { outcome, output })),
                Err(e) => tracing::warn!(%query, error = %e, "skipping invalid cached entry"),
            }
        }
        Ok(entries)
    }

    async fn save(&self, session_id: &str, query: &str, resolution: &Resolution) -> Result<()> {
        let output_json = serde_json::to_string(&resolution.output)?;
        let now = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO workflow_cache (session_id, query, outcome, output_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id, query) DO UPDATE SET
                outcome = excluded.outcome,
                output_json = excluded.output_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(session_id)
        .bind(query)
        .bind(resolution.outcome.as_str())
        .bind(&output_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============ In-memory store ============

/// Process-local store, used when no session database is configured.
pub struct InMemorySessionStore {
    /// Per session, entries in insertion order (oldest first).
    sessions: RwLock<HashMap<String, Vec<(String, Resolution)>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<(String, Resolution)>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(sessions
            .get(session_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn save(&self, session_id: &str, query: &str, resolution: &Resolution) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let entries = sessions.entry(session_id.to_string()).or_default();
        entries.retain(|(q, _)| q != query);
        entries.push((query.to_string(), resolution.clone()));
        Ok(())
    }
}

// ============ Cache ============

pub struct SessionCache {
    session_id: String,
    cache: Cache<String, Resolution>,
    store: Arc<dyn SessionStore>,
}

impl SessionCache {
    /// Build a cache of at most `capacity` entries, warmed with the
    /// session's most recent stored entries. A failing store leaves the
    /// cache empty.
    pub async fn load(
        session_id: impl Into<String>,
        capacity: u64,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let session_id = session_id.into();
        let cache: Cache<String, Resolution> = Cache::builder().max_capacity(capacity).build();

        let limit = usize::try_from(capacity).unwrap_or(usize::MAX);
        match store.load(&session_id, limit).await {
            Ok(entries) => {
                tracing::debug!(session = %session_id, entries = entries.len(), "session loaded");
                // Oldest first, so the newest entries are the most recently inserted.
                for (query, resolution) in entries.into_iter().rev() {
                    cache.insert(query, resolution).await;
                }
            }
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "failed to load workflow session");
            }
        }

        Self {
            session_id,
            cache,
            store,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn get(&self, query: &str) -> Option<Resolution> {
        self.cache.get(query).await
    }

    /// Return the cached resolution for `query`, or run `init` to produce
    /// one. Concurrent callers for the same query share a single `init`.
    ///
    /// The flag is `true` when the value came from the cache. Errors are
    /// not cached.
    pub async fn get_or_try_insert<F>(
        &self,
        query: &str,
        init: F,
    ) -> std::result::Result<(Resolution, bool), Arc<anyhow::Error>>
    where
        F: Future<Output = Result<Resolution>>,
    {
        let entry = self
            .cache
            .entry_by_ref(query)
            .or_try_insert_with(init)
            .await?;
        let cached = !entry.is_fresh();
        Ok((entry.into_value(), cached))
    }

    /// Write an entry through to the store. Failures are logged only.
    pub async fn persist(&self, query: &str, resolution: &Resolution) {
        if let Err(e) = self.store.save(&self.session_id, query, resolution).await {
            tracing::warn!(session = %self.session_id, error = %e, "failed to persist workflow session");
        }
    }
}
