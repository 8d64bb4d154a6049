// src/pipeline/tokenizer.rs
// =============================================================================
// This module turns a stream of HTML bytes into a stream of start tags.
//
// We use html5ever's tokenizer directly instead of building a DOM with
// scraper. The tokenizer is a streaming parser: we feed it text as chunks
// arrive from the network and it hands back tokens (start tag, end tag,
// text, comment, ...) one at a time. We keep only start tags with the
// target name, e.g. every <a ...>.
//
// The body of <script>, <style>, <title>, <textarea> and friends is text,
// not markup, so a tag written inside it is never reported.
//
// Bytes are decoded with the page's declared charset (UTF-8 if none) before
// html5ever sees them.
//
// Malformed markup is never fatal. html5ever recovers from parse errors the
// way a browser would, so we simply keep whatever tags it produces.
//
// The tokenizer runs on its own blocking thread and is owned by that thread
// alone. Nothing else can advance it, so it needs no lock.
//
// Rust concepts:
// - Traits: TokenSink is how html5ever hands tokens back to us
// - spawn_blocking: Running synchronous, CPU-bound work off the async threads
// - Ownership: The tokenizer moves into the thread and never comes back
// =============================================================================

use async_channel::{bounded, Receiver, Sender};
use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, Encoding};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tracing::debug;

use super::stop::StopSignal;

/// One attribute of a tag, in source order. Names are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// A start tag such as `<a href="..." rel="...">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

// Receives tokens from html5ever and keeps the start tags we care about
//
// Tags pile up in `pending` while html5ever works through a chunk; the
// driving loop publishes them after every feed.
struct StartTagSink {
    target: String,
    pending: Vec<StartTag>,
}

impl TokenSink for StartTagSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let tag = match token {
            Token::TagToken(tag) if tag.kind == TagKind::StartTag => tag,
            _ => return TokenSinkResult::Continue,
        };

        let next = content_model(&tag.name);
        if &*tag.name == self.target.as_str() {
            let attributes = tag
                .attrs
                .into_iter()
                .map(|attr| Attribute {
                    key: attr.name.local.to_string(),
                    value: attr.value.to_string(),
                })
                .collect();
            self.pending.push(StartTag {
                name: tag.name.to_string(),
                attributes,
            });
        }
        next
    }
}

// How the tokenizer must read what follows a start tag
//
// A bare html5ever Tokenizer has no tree builder to tell it that the body of
// <script> or <title> is text. Without this, `<a href>` inside a script
// string or a textarea would come out as a real anchor.
fn content_model(tag_name: &str) -> TokenSinkResult<()> {
    match tag_name {
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        // Everything after <plaintext> is text, to the end of the document
        "plaintext" => TokenSinkResult::Plaintext,
        _ => TokenSinkResult::Continue,
    }
}

// Tokenizes HTML arriving on `chunks` and returns a channel of matching
// start tags
//
// Parameters:
//   chunks: the document body, in order; closing it means end of document
//   tag_name: which start tags to keep (case-insensitive, e.g. "a")
//   encoding: how the body bytes are encoded (a BOM in the body wins)
//   capacity: size of the output queue
//   stop: stops tokenizing at the next chunk
//
// The output closes when the document ends, when the crawl is stopped,
// or when nobody is listening any more.
pub fn spawn_tokenizer(
    chunks: Receiver<Bytes>,
    tag_name: &str,
    encoding: &'static Encoding,
    capacity: usize,
    stop: StopSignal,
) -> Receiver<StartTag> {
    let (tx, rx) = bounded(capacity.max(1));
    let sink = StartTagSink {
        target: tag_name.to_ascii_lowercase(),
        pending: Vec::new(),
    };

    tokio::task::spawn_blocking(move || {
        let mut tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
        let mut queue = BufferQueue::new();
        let mut decoder = ChunkDecoder::new(encoding);
        let mut published = 0usize;

        while let Ok(chunk) = chunks.recv_blocking() {
            if stop.should_stop() {
                debug!(published, "tokenizer stopped");
                return;
            }
            let text = decoder.decode(&chunk);
            if text.is_empty() {
                continue;
            }
            queue.push_back(StrTendril::from_slice(&text));
            let _ = tokenizer.feed(&mut queue);
            if !publish(&mut tokenizer.sink.pending, &tx, &mut published) {
                return;
            }
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            queue.push_back(StrTendril::from_slice(&rest));
            let _ = tokenizer.feed(&mut queue);
        }
        tokenizer.end();
        publish(&mut tokenizer.sink.pending, &tx, &mut published);

        debug!(published, encoding = encoding.name(), "tokenizer reached end of document");
    });

    rx
}

// Sends every pending tag downstream. Returns false once the receiver is gone.
fn publish(pending: &mut Vec<StartTag>, tx: &Sender<StartTag>, published: &mut usize) -> bool {
    for tag in pending.drain(..) {
        if tx.send_blocking(tag).is_err() {
            return false;
        }
        *published += 1;
    }
    true
}

// Decodes a body that arrives split across arbitrary chunk boundaries
//
// encoding_rs keeps a character cut in half at the end of a chunk until the
// next chunk completes it. Bytes that are invalid in the encoding become
// U+FFFD.
struct ChunkDecoder {
    inner: Decoder,
}

impl ChunkDecoder {
    fn new(encoding: &'static Encoding) -> Self {
        Self {
            inner: encoding.new_decoder(),
        }
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        self.run(chunk, false)
    }

    // Flushes whatever is still held back at end of stream
    fn finish(&mut self) -> String {
        self.run(&[], true)
    }

    fn run(&mut self, mut src: &[u8], last: bool) -> String {
        let mut text = String::new();
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len());
            text.reserve(needed.max(16));
            let (result, read, _) = self.inner.decode_to_string(src, &mut text, last);
            src = &src[read..];
            if let CoderResult::InputEmpty = result {
                return text;
            }
        }
    }
}
