//! Streaming GCS read client over HTTPS.
//!
//! Objects are read through the XML API endpoint
//! (`GET {base}/{bucket}/{object}?generation=N`), which keeps slashes in
//! object names literal. A `403` response is mapped to a typed
//! [`PermissionError`] carrying whatever principal the backend names in the
//! error body; everything else unexpected becomes a transport error.

use std::env;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::storage::{ByteStream, GcsObject, ObjectStore, PermissionError, StorageError};

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Environment variable pointing reads at a local emulator, e.g.
/// `127.0.0.1:4443`.
pub const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";

/// Environment variable carrying an optional OAuth bearer token.
pub const AUTH_TOKEN_ENV: &str = "GCS_AUTH_TOKEN";

/// Streaming read client for Google Cloud Storage.
pub struct GcsClient {
    client: Client,
    base_url: String,
}

impl GcsClient {
    /// Create a client against the production endpoint, or against
    /// `STORAGE_EMULATOR_HOST` when that variable is set.
    pub fn new() -> Self {
        let base_url = match env::var(EMULATOR_HOST_ENV) {
            Ok(host) if host.contains("://") => host,
            Ok(host) => format!("http://{host}"),
            Err(_) => DEFAULT_BASE_URL.to_string(),
        };
        Self::with_base_url(base_url)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn object_url(&self, bucket: &str, object: &str, generation: Option<i64>) -> String {
        let mut url = format!("{}/{bucket}/{object}", self.base_url);
        if let Some(generation) = generation {
            url.push_str(&format!("?generation={generation}"));
        }
        url
    }
}

impl Default for GcsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn new_reader(
        &self,
        bucket: &str,
        object: &str,
        generation: Option<i64>,
    ) -> Result<ByteStream, StorageError> {
        let address = GcsObject::new(bucket, object, generation);
        let url = self.object_url(bucket, object, generation);
        debug!(object = %address, "opening storage read");

        let mut request = self.client.get(&url);
        if let Ok(token) = env::var(AUTH_TOKEN_ENV) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("GET {address}: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(PermissionError {
                bucket: bucket.to_string(),
                principal: extract_principal(&body)
                    .unwrap_or_else(|| "the build service account".to_string()),
            }
            .into());
        }
        if !status.is_success() {
            return Err(StorageError::Transport(format!(
                "GET {address}: HTTP {status}"
            )));
        }

        let stream = response
            .bytes_stream()
            .map_err(move |e| StorageError::Transport(format!("reading response body: {e}")));
        Ok(Box::pin(stream))
    }
}

/// Pull the rejected principal (an email-shaped token) out of an AccessDenied
/// error body.
fn extract_principal(body: &str) -> Option<String> {
    let is_principal_char =
        |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '%' | '+' | '@');

    let at = body.find('@')?;
    let start = body[..at]
        .rfind(|c| !is_principal_char(c))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = body[at..]
        .find(|c| !is_principal_char(c))
        .map(|i| at + i)
        .unwrap_or(body.len());

    let principal = &body[start..end];
    if principal.len() > 1 {
        Some(principal.to_string())
    } else {
        None
    }
}
