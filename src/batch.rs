//! BatchCoordinator: run one analysis over many inputs.
//!
//! Items are independent. A failed item is recorded in its slot and the
//! rest carry on; the call itself never fails. At most `concurrency`
//! items are in flight, which bounds the number of simultaneous model
//! invocations.
//!
//! | API | Output order |
//! |-----|--------------|
//! | [`BatchCoordinator::process_batch`] | input order |
//! | [`BatchCoordinator::process_documents`] | input order |
//! | [`BatchCoordinator::process_files`] | input order |
//! | [`BatchCoordinator::stream_batch`] | completion order, tagged with the input index |
//!
//! Cancellation is cooperative: once a [`BatchCancel`] is triggered,
//! items that have not started finish as [`BatchOutcome::Cancelled`] and
//! items already running complete normally.

use crate::convert::{read_document, Document, DocumentConverter};
use crate::error::ConversionError;
use crate::output::{AnalysisTask, BatchItem, BatchOutcome, BatchResult};
use crate::processor::TextProcessor;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of `(input index, item)` pairs in completion order.
pub type BatchStream = Pin<Box<dyn Stream<Item = (usize, BatchItem)> + Send>>;

/// Cloneable cancellation flag shared between a batch and its controller.
#[derive(Debug, Clone, Default)]
pub struct BatchCancel(Arc<AtomicBool>);

impl BatchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting new items. Running items are not interrupted.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum ItemInput {
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Parameters shared by every item of one batch run.
struct BatchJob<'a> {
    task: &'a AnalysisTask,
    converter: Option<&'a dyn DocumentConverter>,
    use_ocr: bool,
    cancel: Option<&'a BatchCancel>,
    total: usize,
}

/// Fans a [`TextProcessor`] call out over many inputs.
#[derive(Clone)]
pub struct BatchCoordinator {
    processor: TextProcessor,
    concurrency: usize,
    progress: ProgressCallback,
}

impl BatchCoordinator {
    /// Coordinator using the processor's configured concurrency.
    pub fn new(processor: TextProcessor) -> Self {
        Self {
            concurrency: processor.config().concurrency.max(1),
            processor,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Override the in-flight limit (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn processor(&self) -> &TextProcessor {
        &self.processor
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Analyse `(identifier, text)` pairs, returning one item per input in
    /// input order.
    pub async fn process_batch(
        &self,
        items: impl IntoIterator<Item = (String, String)>,
        task: &AnalysisTask,
        cancel: Option<&BatchCancel>,
    ) -> BatchResult {
        let inputs = items
            .into_iter()
            .map(|(source, text)| (source, ItemInput::Text(text)))
            .collect();
        let job = BatchJob {
            task,
            converter: None,
            use_ocr: false,
            cancel,
            total: 0,
        };
        self.run_ordered(job, inputs).await
    }

    /// Convert then analyse in-memory documents.
    ///
    /// Conversion failures are recorded as
    /// [`BatchOutcome::ConversionFailed`] in the item's slot.
    pub async fn process_documents(
        &self,
        converter: &dyn DocumentConverter,
        documents: Vec<Document>,
        use_ocr: bool,
        task: &AnalysisTask,
        cancel: Option<&BatchCancel>,
    ) -> BatchResult {
        let inputs = documents
            .into_iter()
            .map(|doc| (doc.name, ItemInput::Bytes(doc.bytes)))
            .collect();
        let job = BatchJob {
            task,
            converter: Some(converter),
            use_ocr,
            cancel,
            total: 0,
        };
        self.run_ordered(job, inputs).await
    }

    /// Read, convert, and analyse files from disk.
    ///
    /// Files are read lazily as their slot starts, so at most
    /// `concurrency` documents are held in memory. Unreadable, oversized,
    /// or unsupported files are recorded as conversion failures.
    pub async fn process_files(
        &self,
        converter: &dyn DocumentConverter,
        paths: Vec<PathBuf>,
        use_ocr: bool,
        task: &AnalysisTask,
        cancel: Option<&BatchCancel>,
    ) -> BatchResult {
        let inputs = paths
            .into_iter()
            .map(|p| (p.display().to_string(), ItemInput::File(p)))
            .collect();
        let job = BatchJob {
            task,
            converter: Some(converter),
            use_ocr,
            cancel,
            total: 0,
        };
        self.run_ordered(job, inputs).await
    }

    /// Analyse `(identifier, text)` pairs, yielding items as they finish.
    ///
    /// Items arrive in completion order tagged with their input index.
    /// `on_batch_complete` is not emitted; the stream ending marks the end
    /// of the batch.
    pub fn stream_batch(
        &self,
        items: impl IntoIterator<Item = (String, String)>,
        task: AnalysisTask,
        cancel: Option<BatchCancel>,
    ) -> BatchStream {
        let items: Vec<(String, String)> = items.into_iter().collect();
        let total = items.len();
        let concurrency = self.concurrency;
        self.progress.on_batch_start(total);
        info!("Streaming batch of {} item(s), concurrency {}", total, concurrency);

        let this = self.clone();
        let task = Arc::new(task);
        let s = stream::iter(items.into_iter().enumerate())
            .map(move |(index, (source, text))| {
                let this = this.clone();
                let task = Arc::clone(&task);
                let cancel = cancel.clone();
                async move {
                    let job = BatchJob {
                        task: &task,
                        converter: None,
                        use_ocr: false,
                        cancel: cancel.as_ref(),
                        total,
                    };
                    let item = this.run_item(&job, index, source, ItemInput::Text(text)).await;
                    (index, item)
                }
            })
            .buffer_unordered(concurrency);
        Box::pin(s)
    }

    async fn run_ordered(
        &self,
        mut job: BatchJob<'_>,
        inputs: Vec<(String, ItemInput)>,
    ) -> BatchResult {
        job.total = inputs.len();
        self.progress.on_batch_start(job.total);
        info!(
            "Batch of {} item(s), task {}, concurrency {}",
            job.total,
            job.task.task(),
            self.concurrency
        );

        let job = &job;
        let items: Vec<BatchItem> = stream::iter(inputs.into_iter().enumerate())
            .map(|(index, (source, input))| self.run_item(job, index, source, input))
            .buffered(self.concurrency)
            .collect()
            .await;

        let result = BatchResult { items };
        let succeeded = result.succeeded();
        self.progress.on_batch_complete(job.total, succeeded);
        info!("Batch done: {}/{} succeeded", succeeded, job.total);
        result
    }

    async fn run_item(
        &self,
        job: &BatchJob<'_>,
        index: usize,
        source: String,
        input: ItemInput,
    ) -> BatchItem {
        if job.cancel.is_some_and(BatchCancel::is_cancelled) {
            debug!("Item {} ({}) cancelled before start", index, source);
            self.progress
                .on_item_error(index, job.total, &source, "cancelled before start");
            return BatchItem {
                source,
                outcome: BatchOutcome::Cancelled,
            };
        }

        self.progress.on_item_start(index, job.total, &source);

        let text = match self.load_text(job, &source, input).await {
            Ok(text) => text,
            Err(e) => {
                let error = e.to_string();
                warn!("Item {} ({}): {}", index, source, error);
                self.progress.on_item_error(index, job.total, &source, &error);
                return BatchItem {
                    source,
                    outcome: BatchOutcome::ConversionFailed { error },
                };
            }
        };

        let result = self.processor.analyze_text(&text, job.task).await;
        match result.error.as_deref() {
            None => self.progress.on_item_complete(index, job.total, &source),
            Some(error) => self.progress.on_item_error(index, job.total, &source, error),
        }
        BatchItem {
            source,
            outcome: BatchOutcome::Analyzed { result },
        }
    }

    async fn load_text(
        &self,
        job: &BatchJob<'_>,
        source: &str,
        input: ItemInput,
    ) -> Result<String, ConversionError> {
        let (name, bytes) = match input {
            ItemInput::Text(text) => return Ok(text),
            ItemInput::Bytes(bytes) => (source.to_string(), bytes),
            ItemInput::File(path) => {
                let doc = read_document(&path, self.processor.config().max_document_bytes).await?;
                (doc.name, doc.bytes)
            }
        };
        let converter = job.converter.ok_or_else(|| ConversionError::Failed {
            name: name.clone(),
            detail: "no document converter configured".into(),
        })?;
        let converted = converter.convert(&name, &bytes, job.use_ocr).await?;
        debug!(
            "Converted {} to {} chars of {}",
            name,
            converted.text.chars().count(),
            converted.format
        );
        Ok(converted.text)
    }
}
