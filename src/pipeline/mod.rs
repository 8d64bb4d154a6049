// src/pipeline/mod.rs
// =============================================================================
// The link pipeline: from one page's HTML to a list of checked links.
//
//   body chunks ─> tokenizer ─> extractor ─> W filter workers ─> merge
//                                                                  │
//   results <─ merge <─ W status workers <─────────────────────────┘
//
// Submodules:
// - tokenizer: streaming HTML -> start tags
// - extract: start tags -> attributes -> normalized links
// - merge: the generic fan-in and worker pool helpers
// - status: normalized links -> LinkResult
// - stop: StopSignal, cancellation that records whether it cut work short
// - crawler: LinkCrawler, which fetches the page and wires it all up
//
// Every arrow is a bounded channel, so a slow stage slows down the stage
// before it instead of letting queues grow.
// =============================================================================

mod crawler;
mod extract;
mod merge;
mod status;
mod stop;
mod tokenizer;

pub use crawler::{CrawlError, LinkCrawler};
pub use status::LinkResult;

/// Worker counts and queue sizes for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Workers in the filter stage and in the status stage
    pub workers: usize,
    /// Capacity of every channel between stages
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            queue_capacity: 10,
        }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }
}
