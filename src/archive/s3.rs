//! S3-compatible store (Cloudflare R2 by default), path-style addressing.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;

use super::sigv4::{self, Credentials, RequestParts, EMPTY_PAYLOAD_SHA256};
use super::store::{ListRequest, ListResult, ObjectStore};
use crate::error::{LabError, Result};

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Scheme and host, e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Signing region
    pub region: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl S3Config {
    /// Settings for a Cloudflare R2 account.
    pub fn r2(
        account_id: &str,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: format!("https://{account_id}.r2.cloudflarestorage.com"),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: "auto".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
}

/// Bucket access over the S3 REST API with SigV4 signing.
pub struct S3Store {
    client: Client,
    base: String,
    host: String,
    bucket: String,
    credentials: Credentials,
}

impl S3Store {
    /// Validate the endpoint and build the HTTP client.
    pub fn new(config: S3Config) -> Result<Self> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| LabError::Config(format!("invalid S3 endpoint {}: {e}", config.endpoint)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(LabError::Config(format!(
                    "S3 endpoint has no host: {}",
                    config.endpoint
                )))
            },
        };
        if config.bucket.is_empty() {
            return Err(LabError::Config("S3 bucket name is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LabError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: format!("{}://{host}", url.scheme()),
            host,
            bucket: config.bucket,
            credentials: Credentials {
                access_key_id: config.access_key_id,
                secret_access_key: config.secret_access_key,
                region: config.region,
            },
        })
    }

    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let path = match key {
            Some(key) => format!("/{}/{key}", self.bucket),
            None => format!("/{}", self.bucket),
        };
        let payload_sha256 = body
            .as_ref()
            .map_or_else(|| EMPTY_PAYLOAD_SHA256.to_string(), |b| sigv4::sha256_hex(b));

        let signed = sigv4::sign(
            &self.credentials,
            &RequestParts {
                method: method.as_str(),
                host: &self.host,
                path: &path,
                query,
                headers: extra_headers,
                payload_sha256: &payload_sha256,
            },
            Utc::now(),
        )?;

        let mut url = format!("{}{}", self.base, sigv4::encode_path(&path));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&sigv4::canonical_query(query));
        }

        let mut builder = self.client.request(method.clone(), &url);
        for (name, value) in signed.iter().chain(extra_headers) {
            // reqwest derives Host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        builder.send().await.map_err(|e| {
            tracing::warn!(method = %method, path = %path, error = %e, "object store request failed");
            LabError::Storage(format!("{method} {path}: {e}"))
        })
    }

    async fn failure(response: reqwest::Response, what: &str) -> LabError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, what, body = %body.chars().take(200).collect::<String>(), "object store rejected request");
        LabError::Storage(format!("{what}: HTTP {status}"))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let headers = [("content-type".to_string(), content_type.to_string())];
        let response = self.send(Method::PUT, Some(key), &[], &headers, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &format!("put {key}")).await);
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, body: Bytes, content_type: &str) -> Result<bool> {
        let headers = [
            ("content-type".to_string(), content_type.to_string()),
            ("if-none-match".to_string(), "*".to_string()),
        ];
        let response = self.send(Method::PUT, Some(key), &[], &headers, Some(body)).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::PRECONDITION_FAILED => Ok(false),
            _ => Err(Self::failure(response, &format!("conditional put {key}")).await),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let response = self.send(Method::GET, Some(key), &[], &[], None).await?;
        match response.status() {
            s if s.is_success() => response
                .bytes()
                .await
                .map(Some)
                .map_err(|e| LabError::Storage(format!("read {key}: {e}"))),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::failure(response, &format!("get {key}")).await),
        }
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResult> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), request.max_keys.max(1).to_string()),
        ];
        if !request.prefix.is_empty() {
            query.push(("prefix".to_string(), request.prefix.clone()));
        }
        if let Some(after) = &request.start_after {
            query.push(("start-after".to_string(), after.clone()));
        }

        let response = self.send(Method::GET, None, &query, &[], None).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, "list").await);
        }
        let xml = response
            .text()
            .await
            .map_err(|e| LabError::Storage(format!("read listing: {e}")))?;
        let parsed: ListBucketResult = quick_xml::de::from_str(&xml)
            .map_err(|e| LabError::Storage(format!("unparseable listing: {e}")))?;

        Ok(ListResult {
            keys: parsed.contents.into_iter().map(|o| o.key).collect(),
            is_truncated: parsed.is_truncated,
        })
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
