//! Progress-callback trait for per-item batch events.
//!
//! Attach an [`Arc<dyn BatchProgressCallback>`] with
//! [`crate::batch::BatchCoordinator::with_progress`] to receive events as
//! items start and finish. Callers can forward them to a terminal progress
//! bar, a channel, or a job record without the library knowing how the
//! host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_textproc::BatchProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, index: usize, total: usize, source: &str) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{source} done ({done}/{total}, item {index})");
//!     }
//! }
//!
//! let cb: Arc<dyn BatchProgressCallback> = Arc::new(Counter(AtomicUsize::new(0)));
//! cb.on_item_complete(0, 3, "a.md");
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as it processes each item.
///
/// Items run concurrently, so `on_item_*` methods may be called from
/// several tasks at once; protect shared state with atomics or a mutex.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item starts.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before an item is converted or analysed.
    ///
    /// # Arguments
    /// * `index`  — 0-based position in the input
    /// * `total`  — number of items in the batch
    /// * `source` — the item's identifier
    fn on_item_start(&self, index: usize, total: usize, source: &str) {
        let _ = (index, total, source);
    }

    /// Called when an item produced a successful result.
    fn on_item_complete(&self, index: usize, total: usize, source: &str) {
        let _ = (index, total, source);
    }

    /// Called when an item failed (conversion, analysis, or cancellation).
    fn on_item_error(&self, index: usize, total: usize, source: &str, error: &str) {
        let _ = (index, total, source, error);
    }

    /// Called once after every item has an outcome.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation; the default when no callback is attached.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by the coordinator.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
