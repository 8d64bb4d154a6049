// src/pipeline/merge.rs
// =============================================================================
// The two concurrency building blocks every pipeline stage is made of.
//
// merge:      many channels in, one channel out (fan-in)
// spawn_pool: one channel in, W workers, their outputs merged (fan-out)
//
// How merge knows when to close its output:
// - Each source gets a forwarding task holding a clone of the output Sender
// - The original Sender is dropped as soon as the forwarders are spawned
// - A channel closes when its last Sender is dropped
// So the output closes exactly once, right after the slowest source ends.
// With zero sources there are no clones, so it is closed immediately.
//
// Rust concepts:
// - Generics: merge works for any element type T
// - Trait bounds: T: Send + 'static because T crosses task boundaries
// - Closures: spawn_pool takes the per-item work as a closure
// =============================================================================

use async_channel::{bounded, Receiver};
use std::future::Future;
use tracing::trace;

use super::stop::StopSignal;

/// Merges `sources` into a single channel of the given capacity.
///
/// Elements from one source keep their relative order; elements from
/// different sources interleave in whatever order they arrive.
pub fn merge<T>(sources: Vec<Receiver<T>>, capacity: usize) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = bounded(capacity.max(1));

    for source in sources {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Ok(item) = source.recv().await {
                // The receiving side is gone; nobody wants the rest.
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}

// Spawns `workers` tasks that all pull from `input` and merges what they emit
//
// Parameters:
//   input: shared work queue; every element goes to exactly one worker
//   workers: how many workers (at least one is always spawned)
//   capacity: size of each worker's output queue and of the merged queue
//   stop: stops every worker, even in the middle of an item
//   work: turns one input into zero or one outputs
//
// A worker stops when the input is closed and drained, when its output
// has no receiver left, or when `stop` fires. Stopping drops its Sender,
// which is how merge learns the worker is done.
pub fn spawn_pool<I, O, F, Fut>(
    stage: &'static str,
    input: Receiver<I>,
    workers: usize,
    capacity: usize,
    stop: &StopSignal,
    work: F,
) -> Receiver<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Option<O>> + Send,
{
    let mut outputs = Vec::with_capacity(workers.max(1));

    for worker in 0..workers.max(1) {
        let (tx, rx) = bounded(capacity.max(1));
        let input = input.clone();
        let stop = stop.clone();
        let work = work.clone();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    item = input.recv() => match item {
                        Ok(item) => item,
                        Err(_) => break,
                    },
                };

                let output = tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    output = work(item) => output,
                };
                let Some(output) = output else {
                    continue;
                };

                let sent = tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    sent = tx.send(output) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            trace!(stage, worker, "worker finished");
        });

        outputs.push(rx);
    }

    merge(outputs, capacity)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why async-channel instead of tokio::sync::mpsc?
//    - tokio's mpsc has exactly one Receiver
//    - Our workers all need to pull from the same queue
//    - async-channel's Receiver can be cloned; each message still goes to
//      exactly one of the clones. No Mutex needed.
//
// 2. What does bounded(capacity) mean?
//    - The channel holds at most `capacity` items
//    - send().await waits while it is full
//    - That waiting is "backpressure": a slow stage slows down the stage
//      feeding it instead of letting memory grow without limit
//
// 3. What is tokio::select!?
//    - Waits on several futures and runs the branch of whichever finishes
//      first, dropping the others
//    - `biased;` checks branches top to bottom, so cancellation wins ties
//
// 4. What is let ... else?
//    - `let Some(x) = expr else { continue; };` binds x if the pattern
//      matches and otherwise runs the else block, which must leave the scope
// -----------------------------------------------------------------------------
