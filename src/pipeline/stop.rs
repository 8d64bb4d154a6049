// src/pipeline/stop.rs
// =============================================================================
// StopSignal: a CancellationToken that remembers whether it cost us work.
//
// Asking a crawl to stop and a crawl actually stopping early are not the
// same thing. Ctrl-C can arrive after the last link was checked, while the
// results are still being collected; the list is complete and should be
// returned. So every stage waits on StopSignal instead of the bare token,
// and the signal records when a stage gave up because of it.
//
// Rust concepts:
// - Arc<AtomicBool>: A flag shared by every clone, set from any thread
// - Clone: Each stage gets its own handle to the same signal
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    cut_short: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            cut_short: Arc::new(AtomicBool::new(false)),
        }
    }

    // Resolves once stopping is requested
    //
    // Meant for a `tokio::select!` branch: the future only completes when
    // its branch is taken, so completing marks the crawl as cut short.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
        self.cut_short.store(true, Ordering::SeqCst);
    }

    /// Polling version of `stopped` for the blocking tokenizer thread.
    pub fn should_stop(&self) -> bool {
        let stop = self.token.is_cancelled();
        if stop {
            self.cut_short.store(true, Ordering::SeqCst);
        }
        stop
    }

    /// True once any stage has abandoned work because of a stop request.
    pub fn cut_short(&self) -> bool {
        self.cut_short.load(Ordering::SeqCst)
    }
}
