//! Durable session storage with cursor pagination.
//!
//! One object per session under key `<id>.json`, body the pretty-printed
//! session JSON. Ids are `session_<unix millis>`, so ascending key order
//! approximates creation order.
//!
//! # Pagination
//!
//! [`SessionArchive::list_page`] lists at most one page of keys after the
//! cursor (ascending, as the store returns them), loads every record, and
//! sorts the page by descending creation time. Order is only guaranteed
//! within a page: a later page may hold newer sessions than an earlier one.
//! A page either loads completely or the call fails.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local, for tests and dry runs
//! - [`FsStore`]: one file per key under a directory
//! - [`S3Store`]: any S3-compatible bucket, Cloudflare R2 by default

mod fs;
mod memory;
mod s3;
mod sigv4;
mod store;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use s3::{S3Config, S3Store};
pub use store::{ListRequest, ListResult, ObjectStore};

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::conversation::Session;
use crate::error::{LabError, Result};

/// Prefix shared by every session key.
pub const SESSION_PREFIX: &str = "session_";

/// Default number of sessions per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

const JSON_CONTENT_TYPE: &str = "application/json";
const IDEMPOTENCY_PREFIX: &str = "idempotency/";

/// One page of sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    /// Sessions, newest first within the page
    pub sessions: Vec<Session>,
    /// More keys exist after this page
    pub has_more: bool,
    /// Cursor for the next page: the id of the last key listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdempotencyMarker {
    session_id: String,
}

/// Session records on top of an [`ObjectStore`].
pub struct SessionArchive {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
    last_id_millis: AtomicI64,
}

impl SessionArchive {
    /// Archive over `store` with the default page size.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
            last_id_millis: AtomicI64::new(0),
        }
    }

    /// Change the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Backend name, for logs.
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Next id, strictly greater than any id this archive handed out before.
    fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_id_millis.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last_id_millis.compare_exchange_weak(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("{SESSION_PREFIX}{candidate}"),
                Err(actual) => prev = actual,
            }
        }
    }

    fn key_for(id: &str) -> String {
        format!("{id}.json")
    }

    fn id_for(key: &str) -> &str {
        key.strip_suffix(".json").unwrap_or(key)
    }

    /// Assign an id, write the record and return the id.
    ///
    /// Not idempotent: a retried save writes a second record under a new id.
    pub async fn save(&self, session: &mut Session) -> Result<String> {
        let id = self.next_id();
        session.id = id.clone();

        let body = serde_json::to_vec_pretty(&*session)?;
        let key = Self::key_for(&id);
        self.store
            .put(&key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await?;

        tracing::info!(id = %id, backend = self.backend(), messages = session.messages.len(), "session saved");
        Ok(id)
    }

    /// Point lookup.
    ///
    /// A missing record is [`LabError::NotFound`]; a record that fails to
    /// parse is [`LabError::MalformedRecord`].
    pub async fn get(&self, id: &str) -> Result<Session> {
        let key = Self::key_for(id);
        let body = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| LabError::NotFound(format!("session {id}")))?;
        Self::decode(&key, &body)
    }

    fn decode(key: &str, body: &[u8]) -> Result<Session> {
        let mut session: Session =
            serde_json::from_slice(body).map_err(|e| LabError::MalformedRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if session.id.is_empty() {
            session.id = Self::id_for(key).to_string();
        }
        Ok(session)
    }

    /// One page of sessions after `cursor`, newest first within the page.
    pub async fn list_page(&self, cursor: Option<&str>) -> Result<SessionPage> {
        let request = ListRequest {
            prefix: SESSION_PREFIX.to_string(),
            start_after: cursor.filter(|c| !c.is_empty()).map(Self::key_for),
            max_keys: self.page_size,
        };
        let listing = self.store.list(&request).await?;

        let loads = listing.keys.iter().map(|key| async move {
            match self.store.get(key).await? {
                Some(body) => Self::decode(key, &body),
                None => Err(LabError::Storage(format!("{key} vanished during listing"))),
            }
        });
        let mut sessions = try_join_all(loads).await?;
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let next_cursor = listing.keys.last().map(|k| Self::id_for(k).to_string());
        tracing::debug!(
            cursor = cursor.unwrap_or(""),
            count = sessions.len(),
            has_more = listing.is_truncated,
            "session page listed"
        );

        Ok(SessionPage {
            sessions,
            has_more: listing.is_truncated,
            next_cursor,
        })
    }

    /// Session previously saved under idempotency `key`, if any.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Session>> {
        let marker_key = Self::marker_key(key)?;
        let Some(body) = self.store.get(&marker_key).await? else {
            return Ok(None);
        };
        let marker: IdempotencyMarker =
            serde_json::from_slice(&body).map_err(|e| LabError::MalformedRecord {
                key: marker_key.clone(),
                reason: e.to_string(),
            })?;
        self.get(&marker.session_id).await.map(Some)
    }

    /// Record that idempotency `key` produced `session_id`.
    ///
    /// Returns false when another writer claimed the key first.
    pub async fn remember_idempotency_key(&self, key: &str, session_id: &str) -> Result<bool> {
        let marker_key = Self::marker_key(key)?;
        let body = serde_json::to_vec(&IdempotencyMarker {
            session_id: session_id.to_string(),
        })?;
        self.store
            .put_if_absent(&marker_key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await
    }

    fn marker_key(key: &str) -> Result<String> {
        let valid = !key.is_empty()
            && key.len() <= 128
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid || key.starts_with('.') {
            return Err(LabError::validation(
                "Idempotency-Key must be 1-128 characters of [A-Za-z0-9._-]",
            ));
        }
        Ok(format!("{IDEMPOTENCY_PREFIX}{key}.json"))
    }
}
