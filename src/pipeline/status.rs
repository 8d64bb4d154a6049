// src/pipeline/status.rs
// =============================================================================
// This module checks whether links are alive.
//
// Each link gets exactly one HEAD request (lightweight, no body download).
// The answer is a plain yes/no:
// - reachable = true:  the server answered with a status below 400
// - reachable = false: 4xx/5xx, or the request failed (timeout, DNS,
//   refused connection, TLS error, ...)
//
// Failures are swallowed here on purpose: one dead link must never stop
// the other checks. They are still logged at debug level.
//
// Rust concepts:
// - Arc<dyn Trait>: Sharing one client between many worker tasks
// - Serialize: LinkResult can be printed as JSON
// =============================================================================

use async_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::extract::NormalizedLink;
use super::merge::spawn_pool;
use super::stop::StopSignal;
use crate::client::LinkClient;

/// The outcome of probing one link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkResult {
    /// The link that was checked
    pub url: String,
    /// Whether it answered with a status below 400
    pub reachable: bool,
}

/// Probes one link. Never fails: errors become `reachable: false`.
pub async fn check(client: &dyn LinkClient, link: NormalizedLink) -> LinkResult {
    let reachable = match client.head(link.as_str()).await {
        Ok(status) => {
            debug!(url = %link, status, "probed link");
            status < 400
        }
        Err(e) => {
            debug!(url = %link, error = %e, "probe failed");
            false
        }
    };

    LinkResult {
        url: link.into_string(),
        reachable,
    }
}

// Runs `workers` status checkers over the link stream and merges their
// results
//
// At most `workers` HEAD requests are in flight at any moment.
pub fn spawn_status_pool(
    links: Receiver<NormalizedLink>,
    client: Arc<dyn LinkClient>,
    workers: usize,
    capacity: usize,
    stop: &StopSignal,
) -> Receiver<LinkResult> {
    spawn_pool("status", links, workers, capacity, stop, move |link| {
        let client = Arc::clone(&client);
        async move { Some(check(client.as_ref(), link).await) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubClient;
    use crate::pipeline::extract::normalize_link;
    use crate::pipeline::tokenizer::Attribute;
    use std::time::Duration;

    fn link(url: &str) -> NormalizedLink {
        let attr = Attribute {
            key: "href".to_string(),
            value: url.to_string(),
        };
        normalize_link(&attr, "href").unwrap()
    }

    #[tokio::test]
    async fn test_ok_status_is_reachable() {
        let client = StubClient::new().with_status("http://x.test/ok", 200);
        let result = check(&client, link("http://x.test/ok")).await;
        assert_eq!(
            result,
            LinkResult {
                url: "http://x.test/ok".to_string(),
                reachable: true
            }
        );
    }

    #[tokio::test]
    async fn test_not_found_is_unreachable() {
        let client = StubClient::new().with_status("http://x.test/gone", 404);
        assert!(!check(&client, link("http://x.test/gone")).await.reachable);
    }

    #[tokio::test]
    async fn test_status_boundary() {
        let client = StubClient::new()
            .with_status("http://x.test/moved", 399)
            .with_status("http://x.test/bad", 400)
            .with_status("http://x.test/down", 503);
        assert!(check(&client, link("http://x.test/moved")).await.reachable);
        assert!(!check(&client, link("http://x.test/bad")).await.reachable);
        assert!(!check(&client, link("http://x.test/down")).await.reachable);
    }

    #[tokio::test]
    async fn test_transport_error_is_unreachable() {
        let client = StubClient::new();
        let result = check(&client, link("http://nowhere.test/")).await;
        assert_eq!(result.url, "http://nowhere.test/");
        assert!(!result.reachable);
    }

    #[tokio::test]
    async fn test_pool_checks_every_link_once() {
        let mut client = StubClient::new().with_delay("http://x.test/0", Duration::from_millis(80));
        for n in 0..30 {
            client = client.with_status(&format!("http://x.test/{n}"), 200);
        }
        let client = Arc::new(client);

        let (tx, rx) = async_channel::bounded(4);
        tokio::spawn(async move {
            for n in 0..30 {
                tx.send(link(&format!("http://x.test/{n}"))).await.unwrap();
            }
        });

        let results = spawn_status_pool(rx, client.clone(), 5, 2, &StopSignal::default());
        let mut urls = Vec::new();
        while let Ok(result) = results.recv().await {
            assert!(result.reachable);
            urls.push(result.url);
        }

        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 30);
        assert_eq!(client.head_calls(), 30);
    }

    #[test]
    fn test_result_serializes_as_url_and_reachable() {
        let result = LinkResult {
            url: "http://x.test/a".to_string(),
            reachable: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"url":"http://x.test/a","reachable":false}"#);
    }
}
