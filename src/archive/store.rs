//! Object store abstraction.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Only keys strictly greater than this one
    pub start_after: Option<String>,
    /// Page size
    pub max_keys: usize,
}

/// One page of keys, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResult {
    /// Keys in ascending order
    pub keys: Vec<String>,
    /// More keys exist after the last one returned
    pub is_truncated: bool,
}

/// Flat key/value blob store with ordered listing.
///
/// Keys are listed in ascending byte order, matching S3 `ListObjectsV2`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Write only if `key` does not exist. Returns false if it already did.
    async fn put_if_absent(&self, key: &str, body: Bytes, content_type: &str) -> Result<bool>;

    /// Read `key`; `None` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// List keys matching `request`.
    async fn list(&self, request: &ListRequest) -> Result<ListResult>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Page a sorted key sequence the way `ListObjectsV2` does.
pub(crate) fn page_keys<'a>(
    sorted: impl Iterator<Item = &'a String>,
    request: &ListRequest,
) -> ListResult {
    let mut matching = sorted
        .filter(|k| k.starts_with(&request.prefix))
        .filter(|k| request.start_after.as_ref().map_or(true, |after| *k > after));

    let max = request.max_keys.max(1);
    let keys: Vec<String> = matching.by_ref().take(max).cloned().collect();
    let is_truncated = matching.next().is_some();
    ListResult { keys, is_truncated }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_keys_respects_prefix_and_cursor() {
        let keys: Vec<String> = ["a", "session_1.json", "session_2.json", "session_3.json", "z"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let request = ListRequest {
            prefix: "session_".into(),
            start_after: Some("session_1.json".into()),
            max_keys: 1,
        };
        let page = page_keys(keys.iter(), &request);
        assert_eq!(page.keys, vec!["session_2.json"]);
        assert!(page.is_truncated);

        let last = page_keys(
            keys.iter(),
            &ListRequest {
                start_after: Some("session_2.json".into()),
                ..request
            },
        );
        assert_eq!(last.keys, vec!["session_3.json"]);
        assert!(!last.is_truncated);
    }
}
