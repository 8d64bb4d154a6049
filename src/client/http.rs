// src/client/http.rs
// =============================================================================
// This module implements LinkClient on top of reqwest.
//
// "Dual" because it can reach a URL two ways:
// - Direct: a plain HTTP(S) connection
// - Overlay: through a SOCKS5 proxy, e.g. a local Tor daemon, which is the
//   only way to reach .onion addresses
//
// Which path a request takes depends on the configured Transport:
// - Direct:  always direct
// - Overlay: always through the proxy
// - Auto:    .onion hosts through the proxy, everything else direct
//
// Rust concepts:
// - Builder pattern: reqwest::Client::builder() and our with_* methods
// - Option<T>: The overlay client only exists when a proxy is configured
// - impl Trait for Type: Implementing LinkClient for DualClient
// =============================================================================

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, ClientBuilder, Proxy};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ClientError, LinkClient, Page};

/// Local Tor daemon's SOCKS port. `socks5h` resolves hostnames on the proxy
/// side, which .onion addresses require.
pub const DEFAULT_OVERLAY_PROXY: &str = "socks5h://127.0.0.1:9050";

// Which network path requests should take
//
// #[derive(clap::ValueEnum)] lets the CLI accept --transport direct|overlay|auto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// Plain connections only
    Direct,
    /// Every request goes through the overlay proxy
    Overlay,
    /// Onion hosts through the overlay proxy, the rest direct
    #[default]
    Auto,
}

// Settings shared by every request the client makes
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout, for both GET and HEAD
    pub timeout: Duration,
    pub transport: Transport,
    /// SOCKS proxy URL for the overlay path
    pub overlay_proxy: Option<String>,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            transport: Transport::Auto,
            overlay_proxy: Some(DEFAULT_OVERLAY_PROXY.to_string()),
            user_agent: concat!("link-prober/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 5,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_overlay_proxy(mut self, proxy: Option<String>) -> Self {
        self.overlay_proxy = proxy;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Direct,
    Overlay,
}

// The real network client
//
// reqwest::Client is cheap to clone and safe to share between tasks,
// so one DualClient serves every worker in the pipeline.
#[derive(Debug)]
pub struct DualClient {
    direct: Client,
    overlay: Option<Client>,
    transport: Transport,
}

impl DualClient {
    /// Builds the direct client, plus the overlay client when a proxy is set.
    ///
    /// Fails if `transport` is Overlay but no proxy was given.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let direct = base_builder(config).build().map_err(ClientError::Build)?;

        let overlay = match (config.transport, &config.overlay_proxy) {
            (Transport::Direct, _) => None,
            (_, Some(proxy_url)) => {
                let proxy = Proxy::all(proxy_url.as_str()).map_err(ClientError::Build)?;
                let client = base_builder(config)
                    .proxy(proxy)
                    .build()
                    .map_err(ClientError::Build)?;
                Some(client)
            }
            (Transport::Overlay, None) => return Err(ClientError::MissingProxy),
            (Transport::Auto, None) => None,
        };

        debug!(
            transport = ?config.transport,
            overlay = overlay.is_some(),
            timeout_secs = config.timeout.as_secs_f64(),
            "built network client"
        );

        Ok(Self {
            direct,
            overlay,
            transport: config.transport,
        })
    }

    // Picks the reqwest client for this URL
    fn client_for(&self, url: &str) -> Result<&Client, ClientError> {
        match route_for(self.transport, url) {
            Route::Direct => Ok(&self.direct),
            Route::Overlay => self.overlay.as_ref().ok_or_else(|| ClientError::Unreachable {
                url: url.to_string(),
                reason: "needs the overlay transport but no proxy is configured".to_string(),
            }),
        }
    }
}

// Settings both the direct and the overlay client share
fn base_builder(config: &ClientConfig) -> ClientBuilder {
    Client::builder()
        .timeout(config.timeout)
        .redirect(Policy::limited(config.max_redirects))
        .user_agent(config.user_agent.clone())
}

fn route_for(transport: Transport, url: &str) -> Route {
    match transport {
        Transport::Direct => Route::Direct,
        Transport::Overlay => Route::Overlay,
        Transport::Auto if is_onion(url) => Route::Overlay,
        Transport::Auto => Route::Direct,
    }
}

// True for hosts under the .onion special-use domain
fn is_onion(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .host_str()
                .map(|host| host.trim_end_matches('.').ends_with(".onion"))
        })
        .unwrap_or(false)
}

// Pulls the charset parameter out of a Content-Type value
//
// Examples:
//   "text/html; charset=ISO-8859-1"  -> Some("ISO-8859-1")
//   "text/html;charset=\"utf-8\""    -> Some("utf-8")
//   "text/html"                      -> None
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        let value = value.trim().trim_matches('"');
        (name.trim().eq_ignore_ascii_case("charset") && !value.is_empty())
            .then(|| value.to_string())
    })
}

#[async_trait]
impl LinkClient for DualClient {
    async fn get(&self, url: &str) -> Result<Page, ClientError> {
        let response = self
            .client_for(url)?
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Request {
                url: url.to_string(),
                source,
            })?;

        // The page is parsed whatever its status; an error page can still
        // carry links worth checking.
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "page returned a non-success status");
        }

        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_of);

        Ok(Page {
            charset,
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::Body))
                .boxed(),
        })
    }

    async fn head(&self, url: &str) -> Result<u16, ClientError> {
        let response = self
            .client_for(url)?
            .head(url)
            .send()
            .await
            .map_err(|source| ClientError::Request {
                url: url.to_string(),
                source,
            })?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_routes_onion_through_overlay() {
        let onion = "http://expyuzz4wqqyqhjn.onion/index.html";
        assert_eq!(route_for(Transport::Auto, onion), Route::Overlay);
        assert_eq!(route_for(Transport::Auto, "https://example.com/"), Route::Direct);
    }

    #[test]
    fn test_fixed_transports_ignore_host() {
        let onion = "http://expyuzz4wqqyqhjn.onion/";
        assert_eq!(route_for(Transport::Direct, onion), Route::Direct);
        assert_eq!(route_for(Transport::Overlay, "https://example.com/"), Route::Overlay);
    }

    #[test]
    fn test_is_onion() {
        assert!(is_onion("http://abc.onion"));
        assert!(is_onion("http://abc.onion./path"));
        assert!(!is_onion("http://onion.example.com"));
        assert!(!is_onion("not a url"));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(charset_of("text/html; charset=ISO-8859-1").as_deref(), Some("ISO-8859-1"));
        assert_eq!(charset_of("text/html;Charset=\"utf-8\"").as_deref(), Some("utf-8"));
        assert_eq!(charset_of("text/html; boundary=x; charset=koi8-r").as_deref(), Some("koi8-r"));
        assert_eq!(charset_of("text/html"), None);
        assert_eq!(charset_of("text/html; charset="), None);
    }

    #[test]
    fn test_overlay_without_proxy_is_rejected() {
        let config = ClientConfig::default()
            .with_transport(Transport::Overlay)
            .with_overlay_proxy(None);
        let result = DualClient::new(&config);
        assert!(matches!(result, Err(ClientError::MissingProxy)));
    }

    #[tokio::test]
    async fn test_onion_without_overlay_fails_before_sending() {
        let config = ClientConfig::default().with_overlay_proxy(None);
        let client = DualClient::new(&config).unwrap();
        let result = client.head("http://expyuzz4wqqyqhjn.onion/").await;
        assert!(matches!(result, Err(ClientError::Unreachable { .. })));
    }
}
