//! Asynchronous syntax highlighting.
//!
//! Creating a snippet and rendering it are decoupled through a bounded FIFO
//! queue:
//!
//! ```text
//! Splinter::post_snippet
//!        |
//!        v
//! Dispatcher::post (try_send, fails fast when full)
//!        |
//!        v
//! worker tasks (Dispatcher::run, one per worker)
//!        |
//!        +--> Renderer::render (bounded by render_timeout)
//!        |
//!        v
//! SnippetStorage::set_snippet_highlight / mark_highlight_failed
//! ```
//!
//! A failed job is logged and dropped: no retry and no requeue. Jobs still in
//! the queue when the process exits are lost.

mod renderer;

pub use renderer::{PygmentsRenderer, Renderer};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, RenderError};
use crate::model::{Snippet, SnippetId};
use crate::storage::SnippetStorage;

pub const DEFAULT_QUEUE_SIZE: usize = 256;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    pub queue_size: usize,
    pub render_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }
}

/// What happened to a single dequeued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Rendered,
    RenderFailed(String),
    WriteBackFailed(String),
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    rejected: AtomicU64,
    rendered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Jobs accepted by `post`.
    pub queued: u64,
    /// Jobs refused because the queue was full.
    pub rejected: u64,
    pub rendered: u64,
    /// Render failures and write-back failures.
    pub failed: u64,
    /// Jobs waiting for a worker right now.
    pub pending: usize,
}

/// Bounded highlight queue plus the logic run by each worker.
pub struct Dispatcher<S, R> {
    sender: mpsc::Sender<Snippet>,
    receiver: Mutex<mpsc::Receiver<Snippet>>,
    store: Arc<S>,
    renderer: R,
    render_timeout: Duration,
    counters: Counters,
}

impl<S, R> Dispatcher<S, R>
where
    S: SnippetStorage + 'static,
    R: Renderer,
{
    /// A `queue_size` of 0 is raised to 1; config loading rejects 0 before
    /// it gets here.
    pub fn new(store: Arc<S>, renderer: R, options: DispatcherOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.queue_size.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            store,
            renderer,
            render_timeout: options.render_timeout,
            counters: Counters::default(),
        }
    }

    /// Queues a snippet for highlighting without waiting.
    ///
    /// Returns [`DispatchError::QueueFull`] when the queue is at capacity;
    /// the caller decides whether that matters.
    pub fn post(&self, snippet: Snippet) -> Result<(), DispatchError> {
        match self.sender.try_send(snippet) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(snippet)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::QueueFull(snippet.id))
            }
            Err(mpsc::error::TrySendError::Closed(snippet)) => Err(DispatchError::Closed(snippet.id)),
        }
    }

    /// Number of jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            rendered: self.counters.rendered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Worker loop. Takes jobs in FIFO order until `cancel` fires; a job
    /// already dequeued is always finished first.
    pub async fn run(&self, worker: usize, cancel: CancellationToken) {
        tracing::info!(worker, "highlight worker started");
        while let Some(snippet) = self.next_job(&cancel).await {
            self.process(snippet).await;
        }
        tracing::info!(worker, "highlight worker shutting down");
    }

    /// Spawns `count` workers sharing this dispatcher.
    pub fn spawn_workers(self: &Arc<Self>, count: usize, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { dispatcher.run(worker, cancel).await })
            })
            .collect()
    }

    async fn next_job(&self, cancel: &CancellationToken) -> Option<Snippet> {
        // the receiver lock is only held while waiting, never during a render
        let mut receiver = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            receiver = self.receiver.lock() => receiver,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            snippet = receiver.recv() => snippet,
        }
    }

    /// Renders one snippet and writes the result back to the store.
    pub async fn process(&self, snippet: Snippet) -> JobOutcome {
        let id = snippet.id;
        match self.render(&snippet).await {
            Ok(html) => self.write_back(id, &html).await,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(snippet = %id, language = %snippet.language, error = %e, "highlight failed");
                if let Err(e) = self.store.mark_highlight_failed(id, &e.to_string()).await {
                    tracing::warn!(snippet = %id, error = %e, "failed to record highlight failure");
                }
                JobOutcome::RenderFailed(e.to_string())
            }
        }
    }

    async fn render(&self, snippet: &Snippet) -> Result<String, RenderError> {
        let render = self.renderer.render(&snippet.contents, &snippet.language);
        match tokio::time::timeout(self.render_timeout, render).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.render_timeout)),
        }
    }

    async fn write_back(&self, id: SnippetId, html: &str) -> JobOutcome {
        match self.store.set_snippet_highlight(id, html).await {
            Ok(()) => {
                self.counters.rendered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(snippet = %id, bytes = html.len(), "snippet highlighted");
                JobOutcome::Rendered
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(snippet = %id, error = %e, "failed to store highlight");
                JobOutcome::WriteBackFailed(e.to_string())
            }
        }
    }
}
