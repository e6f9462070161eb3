//! Key-value store abstraction with hash, set and expiry semantics.
//!
//! [`KeyValueStore`] is the seam to a real backend. [`MemoryStore`] is the
//! in-process implementation used by the CLI and the tests. Expiry is
//! measured with `tokio::time`, so paused test clocks drive it.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set fields of the hash at `key`, creating it if needed.
    HashSet {
        key: String,
        fields: HashMap<String, String>,
    },
    /// Add `member` to the set at `key`, creating it if needed.
    SetAdd { key: String, member: String },
    /// Expire `key` after `ttl`. No-op on a missing key.
    Expire { key: String, ttl: Duration },
}

/// A group of writes applied atomically.
///
/// Guards are checked under the same lock as the writes; if any guarded
/// key exists nothing is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    guards: Vec<String>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the whole batch with [`StoreError::KeyExists`] if `key` exists.
    pub fn require_absent(mut self, key: impl Into<String>) -> Self {
        self.guards.push(key.into());
        self
    }

    pub fn hset(mut self, key: impl Into<String>, fields: HashMap<String, String>) -> Self {
        self.ops.push(WriteOp::HashSet {
            key: key.into(),
            fields,
        });
        self
    }

    pub fn sadd(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ops.push(WriteOp::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn guards(&self) -> &[String] {
        &self.guards
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Durable map of string keys to hashes or sets, with per-key expiry.
///
/// Missing and expired keys read as empty.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, StoreError>;

    /// Apply every write of `batch`, or none of them.
    async fn execute(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every key.
    pub async fn flush_all(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether `key` holds a value that has not expired.
    pub async fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        Self::live(&entries, key).is_some()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        entries.get(key).filter(|entry| entry.is_live(Instant::now()))
    }

    fn check_type(
        entries: &HashMap<String, Entry>,
        key: &str,
        expected: &'static str,
    ) -> Result<(), StoreError> {
        match Self::live(entries, key) {
            Some(entry) if entry.value.type_name() != expected => Err(StoreError::WrongType {
                key: key.to_string(),
                expected,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.entries.read().await;
        match Self::live(&entries, key).map(|entry| &entry.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(Value::Set(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "hash",
            }),
        }
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let entries = self.entries.read().await;
        match Self::live(&entries, key).map(|entry| &entry.value) {
            None => Ok(HashSet::new()),
            Some(Value::Set(members)) => Ok(members.clone()),
            Some(Value::Hash(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "set",
            }),
        }
    }

    async fn execute(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;

        for key in batch.guards() {
            if Self::live(&entries, key).is_some() {
                return Err(StoreError::KeyExists(key.clone()));
            }
        }
        for op in batch.ops() {
            match op {
                WriteOp::HashSet { key, .. } => Self::check_type(&entries, key, "hash")?,
                WriteOp::SetAdd { key, .. } => Self::check_type(&entries, key, "set")?,
                WriteOp::Expire { .. } => {}
            }
        }

        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));

        for op in batch.ops {
            match op {
                WriteOp::HashSet { key, fields } => {
                    let entry = entries.entry(key).or_insert_with(|| Entry {
                        value: Value::Hash(HashMap::new()),
                        expires_at: None,
                    });
                    if let Value::Hash(existing) = &mut entry.value {
                        existing.extend(fields);
                    }
                }
                WriteOp::SetAdd { key, member } => {
                    let entry = entries.entry(key).or_insert_with(|| Entry {
                        value: Value::Set(HashSet::new()),
                        expires_at: None,
                    });
                    if let Value::Set(members) = &mut entry.value {
                        members.insert(member);
                    }
                }
                WriteOp::Expire { key, ttl } => {
                    // A deadline past the clock's range never arrives.
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.expires_at = now.checked_add(ttl);
                    }
                }
            }
        }

        debug!("Applied write batch ({} keys stored)", entries.len());
        Ok(())
    }
}
