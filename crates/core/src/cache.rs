//! Response cache
//!
//! Content-addressed store of AI outputs, keyed by a fingerprint of the
//! normalized request and scoped per tenant; two tenants issuing the same
//! prompt never share an entry. An entry whose expiry has passed is a miss
//! no matter when it is physically evicted; eviction happens lazily on
//! access plus a periodic sweep.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use mealforge_shared::CacheEntry;

use crate::error::{CoreError, CoreResult};

/// Per-(tenant, key) locks that collapse concurrent misses onto a single
/// upstream computation.
type FlightLocks = Arc<Mutex<HashMap<(Uuid, String), Arc<Mutex<()>>>>>;

/// Result of a paid upstream computation, handed to the cache on a miss.
#[derive(Debug, Clone)]
pub struct ComputedResponse {
    pub payload: serde_json::Value,
    pub model: String,
    pub tokens: i64,
    pub cost_cents: i64,
}

/// A cache entry plus whether it was served from the cache or computed on
/// this call.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub entry: CacheEntry,
    pub from_cache: bool,
}

/// Deterministic fingerprint of a normalized request.
///
/// serde_json maps serialize with sorted keys, so semantically equal
/// request objects hash identically.
pub fn fingerprint(model: &str, request: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(request.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
    flights: FlightLocks,
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Look up a live entry for `(tenant_id, key)`; expired entries read
    /// as misses and are evicted on the way out.
    pub async fn get(&self, tenant_id: Uuid, key: &str) -> CoreResult<Option<CacheEntry>> {
        self.get_at(tenant_id, key, Utc::now()).await
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    pub async fn get_at(
        &self,
        tenant_id: Uuid,
        key: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<CacheEntry>> {
        let entry: Option<CacheEntry> = sqlx::query_as(
            "SELECT * FROM cache_entries WHERE tenant_id = $1 AND cache_key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match entry {
            Some(entry) if now < entry.expires_at => Ok(Some(entry)),
            Some(entry) => {
                // Logically dead; evict lazily
                sqlx::query("DELETE FROM cache_entries WHERE id = $1")
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
                debug!(tenant_id = %tenant_id, key, "Expired cache entry evicted on read");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store a response under `(tenant_id, key)`. Last writer wins; an
    /// existing entry for the key is overwritten wholesale.
    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        tenant_id: Uuid,
        key: &str,
        payload: serde_json::Value,
        model: &str,
        tokens: i64,
        cost_cents: i64,
        ttl_seconds: i64,
    ) -> CoreResult<CacheEntry> {
        self.put_at(tenant_id, key, payload, model, tokens, cost_cents, ttl_seconds, Utc::now())
            .await
    }

    /// [`put`](Self::put) with an explicit creation instant.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_at(
        &self,
        tenant_id: Uuid,
        key: &str,
        payload: serde_json::Value,
        model: &str,
        tokens: i64,
        cost_cents: i64,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<CacheEntry> {
        if ttl_seconds <= 0 {
            return Err(CoreError::InvalidInput("ttl must be positive".into()));
        }

        let expires_at = now + Duration::seconds(ttl_seconds);
        sqlx::query(
            r#"
            INSERT INTO cache_entries
                (id, tenant_id, cache_key, payload, model, tokens, cost_cents, ttl_seconds, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tenant_id, cache_key) DO UPDATE SET
                payload = excluded.payload,
                model = excluded.model,
                tokens = excluded.tokens,
                cost_cents = excluded.cost_cents,
                ttl_seconds = excluded.ttl_seconds,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(key)
        .bind(payload)
        .bind(model)
        .bind(tokens)
        .bind(cost_cents)
        .bind(ttl_seconds)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, CacheEntry>(
            "SELECT * FROM cache_entries WHERE tenant_id = $1 AND cache_key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Check the cache and, on a miss, run `compute` exactly once per
    /// concurrent (tenant, key) group, writing the result through with
    /// `ttl_seconds`. Duplicate in-flight misses wait on the first caller
    /// and are then served from the cache.
    pub async fn get_or_compute<F, Fut>(
        &self,
        tenant_id: Uuid,
        key: &str,
        ttl_seconds: i64,
        compute: F,
    ) -> CoreResult<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<ComputedResponse>>,
    {
        if let Some(entry) = self.get(tenant_id, key).await? {
            return Ok(CachedResponse {
                entry,
                from_cache: true,
            });
        }

        let flight_key = (tenant_id, key.to_string());
        let lock = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(flight_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // Another caller may have populated the entry while we waited
        if let Some(entry) = self.get(tenant_id, key).await? {
            self.flights.lock().await.remove(&flight_key);
            return Ok(CachedResponse {
                entry,
                from_cache: true,
            });
        }

        let result = compute().await;
        let outcome = match result {
            Ok(computed) => self
                .put(
                    tenant_id,
                    key,
                    computed.payload,
                    &computed.model,
                    computed.tokens,
                    computed.cost_cents,
                    ttl_seconds,
                )
                .await
                .map(|entry| CachedResponse {
                    entry,
                    from_cache: false,
                }),
            Err(e) => Err(e),
        };

        self.flights.lock().await.remove(&flight_key);
        outcome
    }

    /// Physically delete expired entries. Hygiene only: visibility rules
    /// never depend on this running.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let removed = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed > 0 {
            info!(removed, "Expired cache entries swept");
        }
        Ok(removed)
    }
}
