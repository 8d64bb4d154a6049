// src/pipeline/crawler.rs
// =============================================================================
// LinkCrawler: fetch one page, check every link on it.
//
// What happens in get_links:
// 1. Validate the page URL and fetch it (failure here ends the crawl)
// 2. Pump the response body into the tokenizer, chunk by chunk
// 3. Tokenizer -> extractor -> filter workers -> status workers
// 4. Collect every LinkResult into a Vec
//
// All stages run at the same time. The first links are being probed while
// the rest of the page is still downloading.
//
// Shutdown happens by itself: when the body ends, each stage finishes its
// input, drops its Sender, and that closes the next stage's input. The
// final channel closes only after the last status worker is done.
//
// Cancellation: get_links_with_cancel takes a CancellationToken. Every
// stage watches it, so cancelling stops the whole pipeline promptly and
// the call returns CrawlError::Cancelled (never a partial list). A cancel
// that lands after every link was already checked changes nothing.
// =============================================================================

use async_channel::{bounded, Receiver};
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::extract::{spawn_extractor, spawn_filter_pool};
use super::status::{spawn_status_pool, LinkResult};
use super::stop::StopSignal;
use super::tokenizer::spawn_tokenizer;
use super::PipelineConfig;
use crate::client::{Body, ClientError, LinkClient};

const ANCHOR_TAG: &str = "a";
const LINK_ATTRIBUTE: &str = "href";

/// Why a crawl produced no list at all.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid page URL '{url}'")]
    InvalidRootUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to fetch {url}")]
    RootFetch {
        url: String,
        #[source]
        source: ClientError,
    },

    #[error("crawl was cancelled")]
    Cancelled,
}

// The fetched page body. Dropping it releases the connection.
//
// Owned by the pump task, so it is dropped however that task ends:
// end of body, read error, cancellation, or a panic unwinding the task.
struct RootDocument {
    url: String,
    body: Body,
}

impl Drop for RootDocument {
    fn drop(&mut self) {
        debug!(url = %self.url, "released page body");
    }
}

// Forwards body chunks into a bounded channel for the tokenizer thread
//
// A read error mid-body ends the document early; whatever was read so far
// still gets tokenized.
fn spawn_body_pump(
    mut document: RootDocument,
    capacity: usize,
    stop: StopSignal,
) -> Receiver<Bytes> {
    let (tx, rx) = bounded(capacity.max(1));

    tokio::spawn(async move {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                chunk = document.body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!(url = %document.url, error = %e, "stopped reading page body");
                    break;
                }
                None => break,
            };

            let sent = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                sent = tx.send(bytes) => sent,
            };
            if sent.is_err() {
                break;
            }
        }
    });

    rx
}

// Picks the decoder for the page body from its declared charset
//
// Unknown or missing labels fall back to UTF-8.
fn encoding_for(url: &str, charset: Option<&str>) -> &'static Encoding {
    let Some(label) = charset else {
        return UTF_8;
    };
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding,
        None => {
            warn!(url = %url, charset = label, "unknown charset, decoding page as UTF-8");
            UTF_8
        }
    }
}

// Drains the final stage into a Vec
//
// Only a stage that actually stopped early makes the list incomplete, so
// that is what decides between Cancelled and the results.
async fn collect(
    results: Receiver<LinkResult>,
    stop: &StopSignal,
) -> Result<Vec<LinkResult>, CrawlError> {
    let mut collected = Vec::new();
    while let Ok(result) = results.recv().await {
        collected.push(result);
    }

    if stop.cut_short() {
        debug!(checked = collected.len(), "discarding partial results");
        return Err(CrawlError::Cancelled);
    }
    Ok(collected)
}

/// Fetches a page and checks every absolute link on it.
pub struct LinkCrawler {
    client: Arc<dyn LinkClient>,
    config: PipelineConfig,
}

impl LinkCrawler {
    pub fn new(client: Arc<dyn LinkClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Checks every link on `root_url`. Runs until all links are checked.
    pub async fn get_links(&self, root_url: &str) -> Result<Vec<LinkResult>, CrawlError> {
        self.get_links_with_cancel(root_url, CancellationToken::new())
            .await
    }

    // Same as get_links, but stops early once `cancel` fires
    //
    // Returns:
    //   Ok(results): one LinkResult per link found, in no particular order
    //                (empty if the page has no links)
    //   Err(_): the page URL was invalid, the page could not be fetched,
    //           or the crawl was cancelled before every link was checked
    pub async fn get_links_with_cancel(
        &self,
        root_url: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<LinkResult>, CrawlError> {
        Url::parse(root_url).map_err(|source| CrawlError::InvalidRootUrl {
            url: root_url.to_string(),
            source,
        })?;

        let PipelineConfig {
            workers,
            queue_capacity: capacity,
        } = self.config;
        info!(url = %root_url, workers, "fetching page");

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            page = self.client.get(root_url) => page.map_err(|source| CrawlError::RootFetch {
                url: root_url.to_string(),
                source,
            })?,
        };

        let encoding = encoding_for(root_url, page.charset.as_deref());
        let document = RootDocument {
            url: root_url.to_string(),
            body: page.body,
        };

        let stop = StopSignal::new(cancel);
        let chunks = spawn_body_pump(document, capacity, stop.clone());
        let tags = spawn_tokenizer(chunks, ANCHOR_TAG, encoding, capacity, stop.clone());
        let attrs = spawn_extractor(tags, capacity, stop.clone());
        let links = spawn_filter_pool(attrs, LINK_ATTRIBUTE, workers, capacity, &stop);
        let results = spawn_status_pool(links, Arc::clone(&self.client), workers, capacity, &stop);

        let collected = match collect(results, &stop).await {
            Ok(collected) => collected,
            Err(e) => {
                info!(url = %root_url, "crawl cancelled");
                return Err(e);
            }
        };

        let reachable = collected.iter().filter(|r| r.reachable).count();
        info!(
            url = %root_url,
            links = collected.len(),
            reachable,
            "finished checking links"
        );

        Ok(collected)
    }
}
