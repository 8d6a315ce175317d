use super::Sink;
use crate::error::SinkError;
use crate::model::{DocId, Kind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A single document that could not be written.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub index: String,
    pub id: DocId,
    pub error: SinkError,
}

/// Fans document writes out to the sink with at most `limit` in flight.
///
/// A permit is acquired before each write is spawned and released when it completes.
/// Outcomes are folded into counters and a failure list as tasks finish.
pub struct BoundedWriter<S: ?Sized> {
    sink: Arc<S>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<(), WriteFailure>>,
    written: usize,
    skipped_invalid: usize,
    failed: usize,
    pending_failures: Vec<WriteFailure>,
}

impl<S: Sink + ?Sized + 'static> BoundedWriter<S> {
    pub fn new(sink: Arc<S>, limit: usize) -> Self {
        Self {
            sink,
            permits: Arc::new(Semaphore::new(limit.max(1))),
            tasks: JoinSet::new(),
            written: 0,
            skipped_invalid: 0,
            failed: 0,
            pending_failures: Vec::new(),
        }
    }

    /// Queue a write, waiting for a free slot first.
    pub async fn submit(&mut self, index: &str, kind: Kind, id: DocId, doc: Value) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record(Err(WriteFailure {
                    index: index.to_string(),
                    id,
                    error: SinkError::Backend("write pool closed".into()),
                }));
                return;
            }
        };
        let sink = Arc::clone(&self.sink);
        let index = index.to_string();
        self.tasks.spawn(async move {
            let _permit = permit;
            sink.put_document(&index, kind, id, &doc).await.map_err(|error| WriteFailure { index, id, error })
        });
        while let Some(joined) = self.tasks.try_join_next() {
            self.joined(joined);
        }
    }

    /// Wait for every in-flight write.
    pub async fn flush(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.joined(joined);
        }
    }

    fn joined(&mut self, joined: Result<Result<(), WriteFailure>, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(e) => {
                self.failed += 1;
                tracing::error!(error = %e, "write task did not complete");
            }
        }
    }

    fn record(&mut self, outcome: Result<(), WriteFailure>) {
        match outcome {
            Ok(()) => self.written += 1,
            Err(WriteFailure { error: SinkError::InvalidId(_), .. }) => self.skipped_invalid += 1,
            Err(failure) => {
                self.failed += 1;
                self.pending_failures.push(failure);
            }
        }
    }

    /// Failures recorded since the last call.
    pub fn take_failures(&mut self) -> Vec<WriteFailure> {
        std::mem::take(&mut self.pending_failures)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn skipped_invalid(&self) -> usize {
        self.skipped_invalid
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

/// Log a batch of failures as one line.
pub(crate) fn log_failures(phase: &str, failures: &[WriteFailure]) {
    let Some(first) = failures.first() else { return };
    let ids: Vec<DocId> = failures.iter().take(5).map(|f| f.id).collect();
    tracing::warn!(
        phase,
        count = failures.len(),
        index = %first.index,
        ids = ?ids,
        error = %first.error,
        "document writes failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SearchQuery, SinkResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks the highest number of concurrent writes and fails id 13.
    #[derive(Default)]
    struct Gauge {
        inner: MemorySink,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Sink for Gauge {
        async fn create_index(&self, index: &str, kind: Kind) -> SinkResult<()> {
            self.inner.create_index(index, kind).await
        }
        async fn delete_index(&self, index: &str) -> SinkResult<()> {
            self.inner.delete_index(index).await
        }
        async fn put_document(&self, index: &str, kind: Kind, id: DocId, doc: &Value) -> SinkResult<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if id == 13 {
                return Err(SinkError::Backend("boom".into()));
            }
            self.inner.put_document(index, kind, id, doc).await
        }
        async fn get_document(&self, index: &str, kind: Kind, id: DocId) -> SinkResult<Option<Value>> {
            self.inner.get_document(index, kind, id).await
        }
        async fn search(&self, index: &str, query: &SearchQuery) -> SinkResult<Vec<Value>> {
            self.inner.search(index, query).await
        }
        async fn refresh_index(&self, index: &str) -> SinkResult<()> {
            self.inner.refresh_index(index).await
        }
        async fn count(&self, index: &str) -> SinkResult<u64> {
            self.inner.count(index).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded_and_outcomes_counted() {
        let sink = Arc::new(Gauge::default());
        sink.create_index("t", Kind::Post).await.unwrap();
        let mut writer = BoundedWriter::new(Arc::clone(&sink), 3);
        for id in -1..40 {
            writer.submit("t", Kind::Post, id, json!({ "Id": id })).await;
        }
        writer.flush().await;

        assert!(sink.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(writer.written(), 39);
        assert_eq!(writer.skipped_invalid(), 1);
        assert_eq!(writer.failed(), 1);
        let failures = writer.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, 13);
        assert!(writer.take_failures().is_empty());
    }
}
