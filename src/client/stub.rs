// src/client/stub.rs
// =============================================================================
// A LinkClient that never touches the network, for tests.
//
// Pages are served in small chunks so the tokenizer sees a real stream,
// including chunk boundaries that fall inside tags and inside multi-byte
// characters. Any URL without a canned page or status behaves like an
// unreachable host.
// =============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ClientError, LinkClient, Page};

// A canned page body and the charset its Content-Type would declare
#[derive(Debug)]
struct StubPage {
    bytes: Vec<u8>,
    charset: Option<String>,
}

#[derive(Debug, Default)]
pub struct StubClient {
    pages: HashMap<String, StubPage>,
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    head_calls: AtomicUsize,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` at `url` with no declared charset.
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        let page = StubPage {
            bytes: html.as_bytes().to_vec(),
            charset: None,
        };
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Serves raw `bytes` at `url`, declared as `charset`.
    pub fn with_encoded_page(mut self, url: &str, bytes: &[u8], charset: &str) -> Self {
        let page = StubPage {
            bytes: bytes.to_vec(),
            charset: Some(charset.to_string()),
        };
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// Makes HEAD requests for `url` take at least `delay`.
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }
}

const CHUNK_SIZE: usize = 7;

#[async_trait]
impl LinkClient for StubClient {
    async fn get(&self, url: &str) -> Result<Page, ClientError> {
        let page = self.pages.get(url).ok_or_else(|| ClientError::Unreachable {
            url: url.to_string(),
            reason: "no such host".to_string(),
        })?;

        let chunks: Vec<Result<Bytes, ClientError>> = page
            .bytes
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Page {
            charset: page.charset.clone(),
            body: stream::iter(chunks).boxed(),
        })
    }

    async fn head(&self, url: &str) -> Result<u16, ClientError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.statuses
            .get(url)
            .copied()
            .ok_or_else(|| ClientError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
    }
}
