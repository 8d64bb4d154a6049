// src/client/mod.rs
// =============================================================================
// This module is the network side of link-prober.
//
// The pipeline never talks to reqwest directly. It only sees the LinkClient
// trait below, which has exactly two operations:
// - get:  download a page, handing back its declared charset and its body
//         as a stream of chunks
// - head: probe a URL and report the HTTP status code
//
// Submodules:
// - http: DualClient, the real implementation (direct or SOCKS overlay)
// - stub: StubClient, a canned test double (tests only)
//
// Rust concepts:
// - Traits: A shared interface that several types can implement
// - Trait objects: Arc<dyn LinkClient> lets the pipeline hold "some client"
// - Streams: The async version of an iterator
// =============================================================================

mod http;
#[cfg(test)]
pub mod stub;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

pub use http::{ClientConfig, DualClient, Transport, DEFAULT_OVERLAY_PROXY};

/// A response body: chunks of bytes, arriving as the server sends them.
pub type Body = BoxStream<'static, Result<Bytes, ClientError>>;

/// A fetched page, not yet read.
pub struct Page {
    /// The `charset` parameter of the Content-Type header, if the server sent one
    pub charset: Option<String>,
    pub body: Body,
}

/// Everything that can go wrong inside a LinkClient.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("the overlay transport needs a proxy address")]
    MissingProxy,

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

// The capability the pipeline needs from the network.
//
// Implementations must be safe to share between many workers at once
// (Send + Sync), since every status-check worker holds the same client.
#[async_trait]
pub trait LinkClient: Send + Sync {
    /// Fetches `url` and returns its charset and body stream.
    async fn get(&self, url: &str) -> Result<Page, ClientError>;

    /// Sends a HEAD request to `url` and returns the status code.
    async fn head(&self, url: &str) -> Result<u16, ClientError>;
}
