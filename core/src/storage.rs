//! Persistence of generated questions and tips.
//!
//! Each item is a hash at its own key, indexed by a set under its parent
//! (the user for questions, the question for tips). Every write refreshes
//! the TTL of both keys.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StoreError};
use crate::kv::{KeyValueStore, WriteBatch};
use crate::schema::{
    GeneratedQuestion, GeneratedTip, Metadata, QuestionContent, QuestionGenerationRequest,
    TipContent, TipGenerationRequest,
};

/// Hash fields holding JSON rather than plain strings.
const ENCODED_FIELDS: &[&str] = &["request"];

/// An item the persistence layer knows how to key, index and encode.
pub trait StoredRecord: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;

    type Content: Send;
    type Request: Send + Sync;

    fn id(&self) -> Uuid;

    fn item_key(id: Uuid) -> String;

    /// Key of the set indexing every item under `parent`.
    fn index_key(parent: Uuid) -> String;

    /// Id of the user or question this record is indexed under.
    fn parent(&self) -> Uuid;

    fn assemble(
        id: Uuid,
        content: Self::Content,
        metadata: Metadata,
        request: Self::Request,
    ) -> Self;
}

impl StoredRecord for GeneratedQuestion {
    const KIND: &'static str = "question";

    type Content = QuestionContent;
    type Request = QuestionGenerationRequest;

    fn id(&self) -> Uuid {
        self.id
    }

    fn item_key(id: Uuid) -> String {
        format!("question:{id}")
    }

    fn index_key(user_id: Uuid) -> String {
        format!("user:{user_id}:questions")
    }

    fn parent(&self) -> Uuid {
        self.request.user_id
    }

    fn assemble(
        id: Uuid,
        content: QuestionContent,
        metadata: Metadata,
        request: QuestionGenerationRequest,
    ) -> Self {
        Self {
            id,
            content,
            metadata,
            request,
        }
    }
}

impl StoredRecord for GeneratedTip {
    const KIND: &'static str = "tip";

    type Content = TipContent;
    type Request = TipGenerationRequest;

    fn id(&self) -> Uuid {
        self.id
    }

    fn item_key(id: Uuid) -> String {
        format!("tip:{id}")
    }

    fn index_key(question_id: Uuid) -> String {
        format!("question:{question_id}:tips")
    }

    fn parent(&self) -> Uuid {
        self.request.question_id
    }

    fn assemble(
        id: Uuid,
        content: TipContent,
        metadata: Metadata,
        request: TipGenerationRequest,
    ) -> Self {
        Self {
            id,
            content,
            metadata,
            request,
        }
    }
}

/// Flatten a record into string hash fields.
fn encode<R: StoredRecord>(record: &R) -> Result<HashMap<String, String>, StorageError> {
    let serde_json::Value::Object(map) = serde_json::to_value(record)? else {
        return Err(StorageError::Corrupt {
            key: R::item_key(record.id()),
            reason: "record does not serialize to an object".to_string(),
        });
    };
    Ok(map
        .into_iter()
        .map(|(field, value)| match value {
            serde_json::Value::String(text) => (field, text),
            other => (field, other.to_string()),
        })
        .collect())
}

fn decode<R: StoredRecord>(key: &str, fields: HashMap<String, String>) -> Result<R, StorageError> {
    let mut map = serde_json::Map::with_capacity(fields.len());
    for (field, text) in fields {
        let value = if ENCODED_FIELDS.contains(&field.as_str()) {
            serde_json::from_str(&text).map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: format!("field {field}: {e}"),
            })?
        } else {
            serde_json::Value::String(text)
        };
        map.insert(field, value);
    }
    serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Persistence for one kind of record.
pub struct Storage<R> {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    app_version: String,
    _record: PhantomData<fn() -> R>,
}

pub type QuestionStorage = Storage<GeneratedQuestion>;
pub type TipStorage = Storage<GeneratedTip>;

impl<R: StoredRecord> Storage<R> {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, app_version: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            app_version: app_version.into(),
            _record: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `content` under a fresh time-ordered id.
    pub async fn add(&self, request: R::Request, content: R::Content) -> Result<R, StorageError> {
        let record = R::assemble(
            Uuid::now_v7(),
            content,
            Metadata::now(self.app_version.as_str()),
            request,
        );
        self.insert(&record).await?;
        Ok(record)
    }

    /// Write `record` and index it under its parent.
    ///
    /// Fails with [`StorageError::Collision`] if its id is already stored.
    pub(crate) async fn insert(&self, record: &R) -> Result<(), StorageError> {
        let id = record.id();
        let item_key = R::item_key(id);
        let index_key = R::index_key(record.parent());

        let batch = WriteBatch::new()
            .require_absent(item_key.as_str())
            .hset(item_key.as_str(), encode(record)?)
            .sadd(index_key.as_str(), id.to_string())
            .expire(item_key.as_str(), self.ttl)
            .expire(index_key.as_str(), self.ttl);

        match self.store.execute(batch).await {
            Ok(()) => {}
            Err(StoreError::KeyExists(_)) => {
                return Err(StorageError::Collision { kind: R::KIND, id });
            }
            Err(e) => return Err(e.into()),
        }

        info!("Stored {} {id} under {index_key}", R::KIND);
        Ok(())
    }

    /// Fetch one record. Missing or expired records are `None`.
    pub async fn get(&self, id: Uuid) -> Result<Option<R>, StorageError> {
        let key = R::item_key(id);
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            debug!("No {} stored at {key}", R::KIND);
            return Ok(None);
        }
        decode(&key, fields).map(Some)
    }

    /// Every live record indexed under `parent`, in no particular order.
    pub async fn list_by_parent(&self, parent: Uuid) -> Result<Vec<R>, StorageError> {
        let index_key = R::index_key(parent);
        let members = self.store.smembers(&index_key).await?;

        let mut records = Vec::with_capacity(members.len());
        for member in members {
            let id = Uuid::parse_str(&member).map_err(|e| StorageError::Corrupt {
                key: index_key.clone(),
                reason: format!("member {member}: {e}"),
            })?;
            match self.get(id).await? {
                Some(record) => records.push(record),
                None => warn!("Skipping expired {} {id} listed under {index_key}", R::KIND),
            }
        }
        Ok(records)
    }
}
