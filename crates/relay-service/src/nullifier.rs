//! Nullifier registry: the single serialization point for issuance
//!
//! Data model (Redis):
//! - nullifier:{hash} → JSON `NullifierRecord` (reserved or committed)
//! - nullifiers:committed → Set of committed hashes
//!
//! Records never expire. A reservation orphaned by a crash blocks retries
//! for that hash until an operator releases it, but it can never let the
//! same hash issue twice.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use repute_common::{NullifierHash, NullifierRecord, NullifierState};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const COMMITTED_SET: &str = "nullifiers:committed";

/// reserved -> committed; idempotent for the same tx ref
const COMMIT_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local record = cjson.decode(raw)
if record.state == 'committed' then
  if record.issuanceTxRef == ARGV[1] then return 1 end
  return -1
end
record.state = 'committed'
record.issuanceTxRef = ARGV[1]
redis.call('SET', KEYS[1], cjson.encode(record))
redis.call('SADD', KEYS[2], ARGV[2])
return 1
"#;

/// reserved -> absent; refuses committed records
const RELEASE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local record = cjson.decode(raw)
if record.state ~= 'reserved' then return -1 end
redis.call('DEL', KEYS[1])
return 1
"#;

/// Outcome of an atomic reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller now owns the slot
    Reserved,
    /// Already reserved or committed by someone else
    AlreadyUsed,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Nullifier {0} is not reserved")]
    NotReserved(NullifierHash),

    #[error("Nullifier {hash} already committed with transaction {existing}")]
    CommitConflict {
        hash: NullifierHash,
        existing: String,
    },

    #[error("Nullifier {0} is committed and cannot be released")]
    AlreadyCommitted(NullifierHash),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Corrupt registry record: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for RegistryError {
    fn from(err: redis::RedisError) -> Self {
        RegistryError::Redis(err.to_string())
    }
}

/// Idempotency store keyed by nullifier hash
///
/// `reserve` is the only operation that decides who may issue; it must be
/// linearizable across concurrent callers. `contains` is advisory and only
/// used to skip proof verification for hashes that are already taken.
#[async_trait]
pub trait NullifierRegistry: Send + Sync {
    /// absent -> reserved, atomically
    async fn reserve(&self, hash: &NullifierHash) -> Result<Reservation, RegistryError>;

    /// reserved -> committed, attaching the issuance transaction
    async fn commit(&self, hash: &NullifierHash, issuance_tx_ref: &str)
        -> Result<(), RegistryError>;

    /// reserved -> absent, only when issuance definitely did not happen
    async fn release(&self, hash: &NullifierHash) -> Result<(), RegistryError>;

    /// Whether the hash is reserved or committed
    async fn contains(&self, hash: &NullifierHash) -> Result<bool, RegistryError>;

    /// Fetch the record for a hash
    async fn get(&self, hash: &NullifierHash) -> Result<Option<NullifierRecord>, RegistryError>;

    /// Check the backing store is reachable
    async fn health_check(&self) -> Result<(), RegistryError>;
}

/// Durable registry backed by Redis
pub struct RedisNullifierRegistry {
    conn: ConnectionManager,
    commit_script: redis::Script,
    release_script: redis::Script,
}

impl RedisNullifierRegistry {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn new(redis_url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Nullifier registry connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            commit_script: redis::Script::new(COMMIT_SCRIPT),
            release_script: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    fn key(hash: &NullifierHash) -> String {
        format!("nullifier:{}", hash)
    }
}

#[async_trait]
impl NullifierRegistry for RedisNullifierRegistry {
    async fn reserve(&self, hash: &NullifierHash) -> Result<Reservation, RegistryError> {
        let mut conn = self.conn.clone();
        let record = serde_json::to_string(&NullifierRecord::reserved(hash.clone()))
            .map_err(|e| RegistryError::Corrupt(e.to_string()))?;

        // SET NX - set if not exists (atomic operation)
        let set_result: Option<String> = redis::cmd("SET")
            .arg(Self::key(hash))
            .arg(record)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if set_result.is_none() {
            warn!("Nullifier already used: {}", hash);
            return Ok(Reservation::AlreadyUsed);
        }

        debug!("Nullifier reserved: {}", hash);
        Ok(Reservation::Reserved)
    }

    async fn commit(
        &self,
        hash: &NullifierHash,
        issuance_tx_ref: &str,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();

        let outcome: i64 = self
            .commit_script
            .key(Self::key(hash))
            .key(COMMITTED_SET)
            .arg(issuance_tx_ref)
            .arg(hash.as_str())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => {
                info!("Nullifier committed: {} (tx {})", hash, issuance_tx_ref);
                Ok(())
            }
            0 => Err(RegistryError::NotReserved(hash.clone())),
            _ => {
                let existing = self
                    .get(hash)
                    .await?
                    .and_then(|r| r.issuance_tx_ref)
                    .unwrap_or_default();
                Err(RegistryError::CommitConflict {
                    hash: hash.clone(),
                    existing,
                })
            }
        }
    }

    async fn release(&self, hash: &NullifierHash) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();

        let outcome: i64 = self
            .release_script
            .key(Self::key(hash))
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => {
                info!("Nullifier reservation released: {}", hash);
                Ok(())
            }
            0 => Err(RegistryError::NotReserved(hash.clone())),
            _ => Err(RegistryError::AlreadyCommitted(hash.clone())),
        }
    }

    async fn contains(&self, hash: &NullifierHash) -> Result<bool, RegistryError> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(hash))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn get(&self, hash: &NullifierHash) -> Result<Option<NullifierRecord>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(hash))
            .query_async(&mut conn)
            .await?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| RegistryError::Corrupt(e.to_string()))
        })
        .transpose()
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local registry
///
/// Forgets everything on restart, so it only upholds at-most-once issuance
/// for the lifetime of one process. Used for tests and demo deployments.
#[derive(Default)]
pub struct InMemoryNullifierRegistry {
    records: Mutex<HashMap<NullifierHash, NullifierRecord>>,
}

impl InMemoryNullifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in any state
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl NullifierRegistry for InMemoryNullifierRegistry {
    async fn reserve(&self, hash: &NullifierHash) -> Result<Reservation, RegistryError> {
        // Check and insert under one lock
        let mut records = self.records.lock().await;
        if records.contains_key(hash) {
            warn!("Nullifier already used: {}", hash);
            return Ok(Reservation::AlreadyUsed);
        }
        records.insert(hash.clone(), NullifierRecord::reserved(hash.clone()));
        debug!("Nullifier reserved: {}", hash);
        Ok(Reservation::Reserved)
    }

    async fn commit(
        &self,
        hash: &NullifierHash,
        issuance_tx_ref: &str,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(hash)
            .ok_or_else(|| RegistryError::NotReserved(hash.clone()))?;

        match record.state {
            NullifierState::Committed => {
                let existing = record.issuance_tx_ref.clone().unwrap_or_default();
                if existing == issuance_tx_ref {
                    return Ok(());
                }
                Err(RegistryError::CommitConflict {
                    hash: hash.clone(),
                    existing,
                })
            }
            NullifierState::Reserved => {
                record.state = NullifierState::Committed;
                record.issuance_tx_ref = Some(issuance_tx_ref.to_string());
                info!("Nullifier committed: {} (tx {})", hash, issuance_tx_ref);
                Ok(())
            }
        }
    }

    async fn release(&self, hash: &NullifierHash) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        match records.get(hash).map(|r| r.state) {
            None => Err(RegistryError::NotReserved(hash.clone())),
            Some(NullifierState::Committed) => Err(RegistryError::AlreadyCommitted(hash.clone())),
            Some(NullifierState::Reserved) => {
                records.remove(hash);
                info!("Nullifier reservation released: {}", hash);
                Ok(())
            }
        }
    }

    async fn contains(&self, hash: &NullifierHash) -> Result<bool, RegistryError> {
        Ok(self.records.lock().await.contains_key(hash))
    }

    async fn get(&self, hash: &NullifierHash) -> Result<Option<NullifierRecord>, RegistryError> {
        Ok(self.records.lock().await.get(hash).cloned())
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}
