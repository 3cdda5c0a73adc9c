//! HTTP client for `atelier-docstore`.
//!
//! - `GET    {base}/users/{user}/{kind}/active`        read (404 = absent)
//! - `PATCH  {base}/users/{user}/{kind}/active`        merge fields
//! - `GET    {base}/users/{user}/{kind}/active/events` SSE change feed

use futures::StreamExt;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};
use url::Url;

use atelier_core::{DocumentKind, UserId};

use super::{Document, RemoteStore, Subscription};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// [`RemoteStore`] backed by the docstore HTTP API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    /// Create a client for the configured docstore.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("atelier-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    /// URL of a document, optionally with a trailing sub-resource.
    fn document_url(
        &self,
        user: &UserId,
        kind: DocumentKind,
        suffix: Option<&str>,
    ) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                RemoteError::InvalidUrl(format!("{} cannot be a base", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["users", user.as_str(), kind.as_str(), "active"]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    /// Convert a non-success response into `RemoteError::Api`.
    async fn error_for(response: reqwest::Response) -> RemoteError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        RemoteError::Api { status, message }
    }
}

impl RemoteStore for HttpRemoteStore {
    #[instrument(skip_all, fields(%user, %kind))]
    async fn fetch(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> Result<Option<Document>, RemoteError> {
        let url = self.document_url(user, kind, None)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Document>().await?)),
            _ => Err(Self::error_for(response).await),
        }
    }

    #[instrument(skip_all, fields(%user, %kind))]
    async fn merge_write(
        &self,
        user: &UserId,
        kind: DocumentKind,
        fields: Document,
    ) -> Result<(), RemoteError> {
        let url = self.document_url(user, kind, None)?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(self.token.expose_secret())
            .json(&fields)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        debug!("Merged remote document");
        Ok(())
    }

    #[instrument(skip_all, fields(%user, %kind))]
    async fn subscribe(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> Result<Subscription, RemoteError> {
        let url = self.document_url(user, kind, Some("events"))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        Ok(Subscription::new(async_stream::stream! {
            let mut buffer = String::new();
            let mut pending: Vec<u8> = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        // Only decode complete UTF-8 sequences; a character can be
                        // split across chunks.
                        pending.extend_from_slice(&chunk);
                        let valid = match std::str::from_utf8(&pending) {
                            Ok(_) => pending.len(),
                            // Invalid bytes are consumed (and replaced); a truncated
                            // tail waits for the next chunk.
                            Err(e) => e.valid_up_to() + e.error_len().unwrap_or(0),
                        };
                        let complete: Vec<u8> = pending.drain(..valid).collect();
                        buffer.push_str(&String::from_utf8_lossy(&complete));
                        while let Some(event) = extract_sse_event(&mut buffer) {
                            if let Some(document) = parse_sse_event(&event) {
                                yield document;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Remote change feed interrupted");
                        break;
                    }
                }
            }
        }))
    }
}

/// Extract a complete SSE event from the buffer, if one is available.
fn extract_sse_event(buffer: &mut String) -> Option<String> {
    // Normalize CRLF framing before looking for the blank-line separator.
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }
    buffer.find("\n\n").map(|idx| {
        let event = buffer[..idx].to_string();
        buffer.drain(..idx + 2);
        event
    })
}

/// Parse the `data:` payload of an SSE event as a document.
///
/// Comments (keep-alives) and undecodable payloads yield `None`.
fn parse_sse_event(event: &str) -> Option<Document> {
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        })
        .collect();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<Document>(&data.join("\n")) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!(error = %e, "Skipping undecodable change event");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(&RemoteConfig {
            base_url: Url::parse(base).unwrap(),
            token: SecretString::from("test-token"),
        })
        .unwrap()
    }

    #[test]
    fn test_document_url() {
        let store = store("https://docs.example.test/api/");
        let url = store
            .document_url(&UserId::new("u 1"), DocumentKind::Cart, None)
            .unwrap();
        assert_eq!(url.as_str(), "https://docs.example.test/api/users/u%201/cart/active");

        let url = store
            .document_url(&UserId::new("u1"), DocumentKind::Wishlist, Some("events"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://docs.example.test/api/users/u1/wishlist/active/events"
        );
    }

    #[test]
    fn test_extract_sse_event() {
        let mut buffer = "data: {\"a\":1}\n\ndata: {\"b\"".to_string();
        assert_eq!(extract_sse_event(&mut buffer).unwrap(), "data: {\"a\":1}");
        assert!(extract_sse_event(&mut buffer).is_none());
        assert_eq!(buffer, "data: {\"b\"");
    }

    #[test]
    fn test_extract_sse_event_crlf() {
        let mut buffer = "data: {}\r\n\r\n".to_string();
        assert_eq!(extract_sse_event(&mut buffer).unwrap(), "data: {}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_sse_event() {
        let document = parse_sse_event("event: snapshot\ndata: {\"items\":[]}").unwrap();
        assert!(document.contains_key("items"));
        assert!(parse_sse_event(": keep-alive").is_none());
        assert!(parse_sse_event("data: not json").is_none());
    }
}
