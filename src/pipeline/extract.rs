// src/pipeline/extract.rs
// =============================================================================
// This module turns start tags into normalized, absolute links.
//
// Two stages:
// 1. Extractor: flattens each tag's attribute list into single attributes
//    (one task, so attributes keep their document order)
// 2. Filter: a pool of workers that keep only href attributes whose value
//    is an absolute URL, and rewrite it in the url crate's canonical form
//
// What gets dropped (silently, these are not errors):
// - Relative links:        "/docs", "../about", "page.html"
// - Fragments:             "#section"
// - Scheme-relative links: "//cdn.example.com/x.js"
// - Strings that don't parse as URLs at all
//
// Relative links are never resolved against the page URL. Only links that
// are absolute in the document itself get checked.
//
// Rust concepts:
// - Result<T, E> as data: a dropped candidate is Err(Dropped), not a failure
// - Newtypes: NormalizedLink wraps a String that is known to be valid
// =============================================================================

use async_channel::{bounded, Receiver};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

use super::merge::spawn_pool;
use super::stop::StopSignal;
use super::tokenizer::{Attribute, StartTag};

/// An absolute URL with a scheme, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedLink(String);

impl NormalizedLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an attribute did not become a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dropped {
    /// Not the attribute we are looking for (e.g. `class`, `rel`)
    OtherAttribute,
    /// A relative reference, fragment, or scheme-relative URL
    Relative,
    /// Not a URL at all
    Malformed(url::ParseError),
    MissingScheme,
}

// Decides whether one attribute is a link we should check
//
// Parameters:
//   attr: the attribute as the tokenizer saw it
//   target_key: the attribute name that holds links ("href")
//
// Returns: the canonical link, or why it was dropped
//
// Examples:
//   href="HTTP://Example.COM:80/a" -> Ok("http://example.com/a")
//   href="/relative"               -> Err(Dropped::Relative)
//   href="http://[oops"            -> Err(Dropped::Malformed(..))
pub fn normalize_link(attr: &Attribute, target_key: &str) -> Result<NormalizedLink, Dropped> {
    if attr.key != target_key {
        return Err(Dropped::OtherAttribute);
    }

    let url = match Url::parse(&attr.value) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => return Err(Dropped::Relative),
        Err(e) => return Err(Dropped::Malformed(e)),
    };

    if url.scheme().is_empty() {
        return Err(Dropped::MissingScheme);
    }

    Ok(NormalizedLink(url.into()))
}

// Flattens tags into their attributes, in document order
//
// This is the tokenizer's only consumer. The output closes when the tags
// run out, when nobody listens any more, or on cancellation.
pub fn spawn_extractor(
    tags: Receiver<StartTag>,
    capacity: usize,
    stop: StopSignal,
) -> Receiver<Attribute> {
    let (tx, rx) = bounded(capacity.max(1));

    tokio::spawn(async move {
        let mut extracted = 0usize;
        'tags: loop {
            let tag = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                tag = tags.recv() => match tag {
                    Ok(tag) => tag,
                    Err(_) => break,
                },
            };

            trace!(tag = %tag.name, attributes = tag.attributes.len(), "extracting attributes");
            for attr in tag.attributes {
                let sent = tokio::select! {
                    biased;
                    _ = stop.stopped() => break 'tags,
                    sent = tx.send(attr) => sent,
                };
                if sent.is_err() {
                    break 'tags;
                }
                extracted += 1;
            }
        }
        debug!(extracted, "attribute extractor finished");
    });

    rx
}

// Runs `workers` filter workers over the attribute stream and merges the
// links they keep
pub fn spawn_filter_pool(
    attrs: Receiver<Attribute>,
    target_key: &str,
    workers: usize,
    capacity: usize,
    stop: &StopSignal,
) -> Receiver<NormalizedLink> {
    let target_key: Arc<str> = Arc::from(target_key);

    spawn_pool("filter", attrs, workers, capacity, stop, move |attr| {
        let target_key = Arc::clone(&target_key);
        async move {
            match normalize_link(&attr, &target_key) {
                Ok(link) => Some(link),
                Err(Dropped::OtherAttribute) => None,
                Err(reason) => {
                    trace!(value = %attr.value, ?reason, "dropped link candidate");
                    None
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn href(value: &str) -> Attribute {
        Attribute {
            key: "href".to_string(),
            value: value.to_string(),
        }
    }

    fn anchor(attrs: &[(&str, &str)]) -> StartTag {
        StartTag {
            name: "a".to_string(),
            attributes: attrs
                .iter()
                .map(|(key, value)| Attribute {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_absolute_link_is_kept() {
        let link = normalize_link(&href("http://x.test/a"), "href").unwrap();
        assert_eq!(link.as_str(), "http://x.test/a");
    }

    #[test]
    fn test_link_is_canonicalized() {
        let link = normalize_link(&href("HTTP://Example.COM:80/a%7e"), "href").unwrap();
        assert_eq!(link.as_str(), "http://example.com/a%7e");

        let link = normalize_link(&href("https://www.rust-lang.org"), "href").unwrap();
        assert_eq!(link.as_str(), "https://www.rust-lang.org/");
    }

    #[test]
    fn test_relative_and_fragment_links_are_dropped() {
        for value in ["/relative", "../about", "page.html", "#section", "//cdn.x.test/a.js", ""] {
            assert_eq!(normalize_link(&href(value), "href"), Err(Dropped::Relative), "{value}");
        }
    }

    #[test]
    fn test_malformed_link_is_dropped() {
        let result = normalize_link(&href("http://[oops"), "href");
        assert!(matches!(result, Err(Dropped::Malformed(_))));
    }

    #[test]
    fn test_other_attributes_are_ignored() {
        let attr = Attribute {
            key: "src".to_string(),
            value: "http://x.test/a".to_string(),
        };
        assert_eq!(normalize_link(&attr, "href"), Err(Dropped::OtherAttribute));
    }

    #[test]
    fn test_non_http_schemes_are_kept() {
        let link = normalize_link(&href("mailto:someone@x.test"), "href").unwrap();
        assert_eq!(link.as_str(), "mailto:someone@x.test");
    }

    #[tokio::test]
    async fn test_extractor_flattens_in_order() {
        let (tx, rx) = bounded(4);
        let attrs = spawn_extractor(rx, 1, StopSignal::default());

        tokio::spawn(async move {
            tx.send(anchor(&[("href", "1"), ("rel", "2")])).await.unwrap();
            tx.send(anchor(&[])).await.unwrap();
            tx.send(anchor(&[("href", "3")])).await.unwrap();
        });

        let mut values = Vec::new();
        while let Ok(attr) = attrs.recv().await {
            values.push(attr.value);
        }
        assert_eq!(values, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_filter_pool_keeps_only_absolute_hrefs() {
        let (tx, rx) = bounded(16);
        for attr in [
            href("http://x.test/a"),
            href("/relative"),
            href("http://x.test/b"),
            Attribute {
                key: "class".to_string(),
                value: "http://x.test/c".to_string(),
            },
        ] {
            tx.send(attr).await.unwrap();
        }
        drop(tx);

        let links = spawn_filter_pool(rx, "href", 4, 2, &StopSignal::default());
        let mut found = Vec::new();
        while let Ok(link) = links.recv().await {
            found.push(link.into_string());
        }
        found.sort();
        assert_eq!(found, vec!["http://x.test/a", "http://x.test/b"]);
    }
}
