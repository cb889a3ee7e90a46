//! # PostgreSQL Backend
//!
//! [`KvStore`] over two tables (see `migrations/0001_kv.sql`):
//! `kv_entries(key, value JSONB, revision, expires_at)` and
//! `kv_sets(key, member)`.
//!
//! Single-key operations are single statements. [`KvStore::commit`] runs in
//! a `SERIALIZABLE` transaction; a serialization failure (SQLSTATE `40001`)
//! is reported as a failed guard, which callers already handle by
//! re-reading.
//!
//! TTLs are applied server-side (`now() + ttl`), so every process agrees on
//! expiry regardless of local clock skew.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgExecutor, Row};

use crate::error::StoreError;
use crate::kv::{Guard, KvStore, ScanPage, Transaction, Versioned, WriteOp};

const LIVE: &str = "(expires_at IS NULL OR expires_at > now())";

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is given (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match database_url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 Train state will not survive restarts or be shared between processes."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// PostgreSQL-backed [`KvStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn ttl_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn revision_from(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or_default()
}

fn revision_to(rev: u64) -> i64 {
    i64::try_from(rev).unwrap_or(i64::MAX)
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("40001"),
        _ => false,
    }
}

async fn exec_put<'e, E: PgExecutor<'e>>(
    executor: E,
    key: &str,
    value: &Value,
    ttl: Option<Duration>,
) -> Result<u64, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO kv_entries (key, value, revision, expires_at)
         VALUES ($1, $2, 1, now() + ($3::BIGINT * interval '1 millisecond'))
         ON CONFLICT (key) DO UPDATE SET
             value = EXCLUDED.value,
             revision = CASE
                 WHEN kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= now() THEN 1
                 ELSE kv_entries.revision + 1
             END,
             expires_at = EXCLUDED.expires_at
         RETURNING revision",
    )
    .bind(key)
    .bind(value)
    .bind(ttl_millis(ttl))
    .fetch_one(executor)
    .await?;
    Ok(revision_from(row.try_get("revision")?))
}

async fn exec_delete<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<bool, sqlx::Error> {
    // Expired rows are removed too but do not count as a delete.
    let row = sqlx::query(&format!(
        "WITH gone AS (DELETE FROM kv_entries WHERE key = $1 RETURNING expires_at)
         SELECT count(*) FILTER (WHERE {LIVE}) AS live FROM gone"
    ))
    .bind(key)
    .fetch_one(executor)
    .await?;
    let live: i64 = row.try_get("live")?;
    Ok(live > 0)
}

async fn exec_set_add<'e, E: PgExecutor<'e>>(
    executor: E,
    set: &str,
    member: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO kv_sets (key, member) VALUES ($1, $2) ON CONFLICT (key, member) DO NOTHING",
    )
    .bind(set)
    .bind(member)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn exec_set_remove<'e, E: PgExecutor<'e>>(
    executor: E,
    set: &str,
    member: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM kv_sets WHERE key = $1 AND member = $2")
        .bind(set)
        .bind(member)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

impl PgStore {
    async fn try_commit(&self, txn: &Transaction) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        for guard in &txn.guards {
            let holds = match guard {
                Guard::Revision { key, revision } => {
                    let row = sqlx::query(&format!(
                        "SELECT revision FROM kv_entries WHERE key = $1 AND {LIVE} FOR UPDATE"
                    ))
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;
                    match row {
                        Some(row) => revision_from(row.try_get("revision")?) == *revision,
                        None => false,
                    }
                }
                Guard::Absent { key } => sqlx::query(&format!(
                    "SELECT 1 AS present FROM kv_entries WHERE key = $1 AND {LIVE}"
                ))
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?
                .is_none(),
            };
            if !holds {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        for op in &txn.ops {
            match op {
                WriteOp::Put { key, value, ttl } => {
                    exec_put(&mut *tx, key, value, *ttl).await?;
                }
                WriteOp::Delete { key } => {
                    exec_delete(&mut *tx, key).await?;
                }
                WriteOp::SetAdd { set, member } => {
                    exec_set_add(&mut *tx, set, member).await?;
                }
                WriteOp::SetRemove { set, member } => {
                    exec_set_remove(&mut *tx, set, member).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT value, revision FROM kv_entries WHERE key = $1 AND {LIVE}"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Versioned {
                value: row.try_get("value")?,
                revision: revision_from(row.try_get("revision")?),
            })),
            None => Ok(None),
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT key, value, revision FROM kv_entries WHERE key = ANY($1) AND {LIVE}"
        ))
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let mut found = std::collections::HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key")?;
            found.insert(
                key,
                Versioned {
                    value: row.try_get("value")?,
                    revision: revision_from(row.try_get("revision")?),
                },
            );
        }
        Ok(keys.iter().map(|k| found.remove(k)).collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        Ok(exec_put(&self.pool, key, &value, ttl).await?)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "INSERT INTO kv_entries (key, value, revision, expires_at)
             VALUES ($1, $2, 1, now() + ($3::BIGINT * interval '1 millisecond'))
             ON CONFLICT (key) DO UPDATE SET
                 value = EXCLUDED.value,
                 revision = 1,
                 expires_at = EXCLUDED.expires_at
             WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= now()
             RETURNING revision",
        )
        .bind(key)
        .bind(&value)
        .bind(ttl_millis(ttl))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE kv_entries SET
                 value = $3,
                 revision = revision + 1,
                 expires_at = now() + ($4::BIGINT * interval '1 millisecond')
             WHERE key = $1 AND revision = $2 AND {LIVE}"
        ))
        .bind(key)
        .bind(revision_to(expected_revision))
        .bind(&value)
        .bind(ttl_millis(ttl))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(exec_delete(&self.pool, key).await?)
    }

    async fn delete_if_value(&self, key: &str, expected: &Value) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM kv_entries WHERE key = $1 AND value = $2 AND {LIVE}"
        ))
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&self, txn: Transaction) -> Result<bool, StoreError> {
        match self.try_commit(&txn).await {
            Ok(applied) => Ok(applied),
            Err(e) if is_serialization_failure(&e) => {
                tracing::debug!(error = %e, "serialization failure on commit, reporting guard failure");
                Ok(false)
            }
            Err(e) => {
                tracing::error!(error = %e, "guarded commit failed");
                Err(e.into())
            }
        }
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT key FROM kv_entries
             WHERE left(key, length($1)) = $1
               AND ($2::TEXT IS NULL OR key > $2)
               AND {LIVE}
             ORDER BY key
             LIMIT $3"
        ))
        .bind(prefix)
        .bind(cursor)
        .bind(limit_i64)
        .fetch_all(&self.pool)
        .await?;

        let keys = rows
            .iter()
            .map(|r| r.try_get::<String, _>("key"))
            .collect::<Result<Vec<_>, _>>()?;
        let next = if limit > 0 && keys.len() == limit {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(exec_set_add(&self.pool, set, member).await?)
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(exec_set_remove(&self.pool, set, member).await?)
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT member FROM kv_sets WHERE key = $1 ORDER BY member")
            .bind(set)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get::<String, _>("member"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= now()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
