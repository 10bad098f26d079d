//! Part transfer engine.
//!
//! Executes one [`TransferDescriptor`] against its local byte source and
//! drives the owning task in the [`SessionTracker`] through
//! pending → uploading → done | error. Failures stay confined to the task;
//! nothing here retries.

use crate::api::UploadApi;
use crate::error::TransferError;
use crate::progress::ProgressAggregator;
use crate::source::UploadSource;
use crate::tracker::{SessionTracker, TaskStatus};
use crate::transport::{ObjectTransport, ProgressFn};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use upload_protocol::{
    normalize_receipts, part_count, part_range, validate_receipts, CompleteMultipartRequest,
    PartReceipt, PartUrl, TransferDescriptor,
};

/// Runs transfers and reports their progress into a session
#[derive(Clone)]
pub struct TransferEngine {
    transport: Arc<dyn ObjectTransport>,
    api: Arc<dyn UploadApi>,
    tracker: SessionTracker,
    part_concurrency: Option<usize>,
}

impl TransferEngine {
    pub fn new(
        transport: Arc<dyn ObjectTransport>,
        api: Arc<dyn UploadApi>,
        tracker: SessionTracker,
    ) -> Self {
        Self {
            transport,
            api,
            tracker,
            part_concurrency: None,
        }
    }

    /// Limit how many parts of one file are in flight at once
    pub fn with_part_concurrency(mut self, limit: Option<usize>) -> Self {
        self.part_concurrency = limit.filter(|n| *n > 0);
        self
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Transfer one file and settle its task as done or error
    #[instrument(skip(self, descriptor, source), fields(key = %descriptor.key(), mode = descriptor.mode()))]
    pub async fn run(
        &self,
        descriptor: &TransferDescriptor,
        source: Option<Arc<dyn UploadSource>>,
    ) -> Result<(), TransferError> {
        let key = descriptor.key();
        let result = self.transfer(descriptor, source).await;

        match &result {
            Ok(()) => {
                self.tracker.update_status(key, TaskStatus::Done);
                info!("Transfer complete");
            }
            Err(e) => {
                self.tracker.update_status(key, TaskStatus::Error);
                warn!(error = %e, "Transfer failed");
            }
        }

        result
    }

    async fn transfer(
        &self,
        descriptor: &TransferDescriptor,
        source: Option<Arc<dyn UploadSource>>,
    ) -> Result<(), TransferError> {
        match descriptor {
            TransferDescriptor::Failed { error, .. } => Err(TransferError::IssueFailed(error.clone())),
            TransferDescriptor::Single {
                key,
                url,
                content_type,
            } => {
                let source = source.ok_or_else(|| TransferError::MissingSource(key.clone()))?;
                self.tracker.update_status(key, TaskStatus::Uploading);
                self.put_single(key, url, content_type, source.as_ref()).await
            }
            TransferDescriptor::Multipart {
                key,
                upload_id,
                part_size,
                part_urls,
            } => {
                let source = source.ok_or_else(|| TransferError::MissingSource(key.clone()))?;
                self.tracker.update_status(key, TaskStatus::Uploading);
                self.put_multipart(key, upload_id, *part_size, part_urls, source.as_ref())
                    .await
            }
        }
    }

    async fn put_single(
        &self,
        key: &str,
        url: &str,
        content_type: &str,
        source: &dyn UploadSource,
    ) -> Result<(), TransferError> {
        let body = source.open_range(0..source.len()).await?;
        let aggregator = Arc::new(ProgressAggregator::new(source.len(), 1));

        self.transport
            .put(url, body, Some(content_type), self.progress_sink(key, aggregator, 0))
            .await?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        upload_id: &str,
        part_size: u64,
        part_urls: &[PartUrl],
        source: &dyn UploadSource,
    ) -> Result<(), TransferError> {
        let total_bytes = source.len();
        let aggregator = Arc::new(ProgressAggregator::new(total_bytes, part_urls.len()));
        let limiter = self.part_concurrency.map(Semaphore::new);
        let limiter = limiter.as_ref();

        let uploads = part_urls.iter().enumerate().map(|(index, part)| {
            let progress = self.progress_sink(key, aggregator.clone(), index);
            async move {
                let _permit = match limiter {
                    Some(limiter) => Some(
                        limiter
                            .acquire()
                            .await
                            .map_err(|e| TransferError::Transport(e.to_string()))?,
                    ),
                    None => None,
                };

                let range = part_range(part.part_number, part_size, total_bytes);
                let body = source.open_range(range).await?;
                let outcome = self.transport.put(&part.url, body, None, progress).await?;

                let etag = outcome.etag.unwrap_or_else(|| {
                    warn!(part_number = part.part_number, "Part acknowledged without ETag");
                    String::new()
                });
                Ok::<_, TransferError>(PartReceipt::new(part.part_number, etag))
            }
        });

        // Finalize only after every part is acknowledged; the first failure
        // drops the parts still in flight
        let receipts = try_join_all(uploads).await?;

        let receipts = normalize_receipts(&receipts);
        let expected = u32::try_from(part_count(total_bytes, part_size)).unwrap_or(u32::MAX);
        validate_receipts(&receipts, Some(expected))?;

        self.api
            .complete_multipart(&CompleteMultipartRequest {
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                parts: receipts,
            })
            .await?;

        Ok(())
    }

    fn progress_sink(
        &self,
        key: &str,
        aggregator: Arc<ProgressAggregator>,
        part_index: usize,
    ) -> ProgressFn {
        let tracker = self.tracker.clone();
        let key = key.to_string();
        Arc::new(move |sent| {
            if let Some(percent) = aggregator.record(part_index, sent) {
                tracker.update_progress(&key, percent);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesSource;
    use crate::testing::{FakeApi, FakeTransport};
    use parking_lot::Mutex;
    use std::time::Duration;
    use upload_protocol::ReceiptError;

    const KIB: u64 = 1024;
    const KEY: &str = "u/e/raw_video/big.mp4";

    fn multipart(part_size: u64, parts: u32) -> TransferDescriptor {
        TransferDescriptor::Multipart {
            key: KEY.to_string(),
            upload_id: "upload-1".to_string(),
            part_size,
            part_urls: (1..=parts)
                .map(|n| PartUrl {
                    part_number: n,
                    url: format!("https://s3/part/{}", n),
                })
                .collect(),
        }
    }

    fn source(len: u64) -> Option<Arc<dyn UploadSource>> {
        Some(Arc::new(BytesSource::new(vec![1u8; len as usize])))
    }

    fn build(
        transport: Arc<FakeTransport>,
        api: Arc<FakeApi>,
    ) -> (TransferEngine, SessionTracker) {
        let tracker = SessionTracker::new(Duration::from_secs(5));
        let engine = TransferEngine::new(transport, api, tracker.clone());
        (engine, tracker)
    }

    #[tokio::test]
    async fn test_single_transfer_reaches_done_at_100() {
        let transport = Arc::new(FakeTransport::new());
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport.clone(), api.clone());

        let descriptor = TransferDescriptor::Single {
            key: "u/e/raw_video/small.mp4".to_string(),
            url: "https://s3/small".to_string(),
            content_type: "video/mp4".to_string(),
        };
        tracker.register(&descriptor);

        engine.run(&descriptor, source(5 * KIB)).await.unwrap();

        let puts = transport.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].len, 5 * KIB as usize);
        assert_eq!(puts[0].content_type.as_deref(), Some("video/mp4"));

        let task = tracker.snapshot().tasks[0].clone();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.progress_percent, 100);
        assert!(api.completions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_descriptor_makes_no_request() {
        let transport = Arc::new(FakeTransport::new());
        let (engine, tracker) = build(transport.clone(), Arc::new(FakeApi::new()));

        let descriptor = TransferDescriptor::Failed {
            key: "u/e/raw_video/a.mp4".to_string(),
            error: "signing failed".to_string(),
        };
        tracker.register(&descriptor);

        let err = engine.run(&descriptor, source(10)).await.unwrap_err();
        assert!(matches!(err, TransferError::IssueFailed(_)));
        assert!(transport.puts().is_empty());
        assert_eq!(tracker.snapshot().tasks[0].status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_source_makes_no_request() {
        let transport = Arc::new(FakeTransport::new());
        let (engine, tracker) = build(transport.clone(), Arc::new(FakeApi::new()));

        let descriptor = multipart(10, 2);
        tracker.register(&descriptor);

        let err = engine.run(&descriptor, None).await.unwrap_err();
        assert!(matches!(err, TransferError::MissingSource(_)));
        assert!(transport.puts().is_empty());
        assert_eq!(tracker.snapshot().tasks[0].status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_multipart_finalizes_with_sorted_receipts() {
        // 250 KiB in 10 KiB parts
        let transport = Arc::new(FakeTransport::new());
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport.clone(), api.clone());

        let descriptor = multipart(10 * KIB, 25);
        tracker.register(&descriptor);

        engine.run(&descriptor, source(250 * KIB)).await.unwrap();

        assert_eq!(transport.puts().len(), 25);
        assert!(transport.puts().iter().all(|p| p.len == 10 * KIB as usize));

        let completions = api.completions();
        assert_eq!(completions.len(), 1);
        let request = &completions[0];
        assert_eq!(request.upload_id, "upload-1");
        let numbers: Vec<u32> = request.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, (1..=25).collect::<Vec<_>>());
        assert_eq!(request.parts[0].etag, "etag-https://s3/part/1");

        let task = tracker.snapshot().tasks[0].clone();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.progress_percent, 100);
    }

    #[tokio::test]
    async fn test_last_part_is_short() {
        let transport = Arc::new(FakeTransport::new());
        let (engine, tracker) = build(transport.clone(), Arc::new(FakeApi::new()));

        let descriptor = multipart(10, 3);
        tracker.register(&descriptor);
        engine.run(&descriptor, source(25)).await.unwrap();

        let mut sizes: Vec<usize> = transport.puts().iter().map(|p| p.len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_parts_keep_progress_monotonic() {
        let transport = Arc::new(
            FakeTransport::new()
                .delay("https://s3/part/1", Duration::from_secs(3))
                .delay("https://s3/part/2", Duration::from_secs(1))
                .delay("https://s3/part/3", Duration::from_secs(2)),
        );
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport.clone(), api.clone());

        let descriptor = multipart(10, 3);
        tracker.register(&descriptor);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = tracker.subscribe();
        let sink = seen.clone();
        let collector = tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let snapshot = events.borrow_and_update().clone();
                if let Some(task) = snapshot.task(KEY) {
                    sink.lock().push(task.progress_percent);
                }
            }
        });

        engine.run(&descriptor, source(30)).await.unwrap();
        tokio::task::yield_now().await;
        collector.abort();

        let seen = seen.lock().clone();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(tracker.snapshot().tasks[0].progress_percent, 100);

        // Completion order was 2, 3, 1; the finalize list is still ascending
        let order: Vec<String> = transport.puts().iter().map(|p| p.url.clone()).collect();
        assert_eq!(order[0], "https://s3/part/2");
        let numbers: Vec<u32> = api.completions()[0]
            .parts
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_part_url_fails_without_finalize() {
        // 250 KiB needs 25 parts but only 24 URLs were issued
        let transport = Arc::new(FakeTransport::new());
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport, api.clone());

        let descriptor = multipart(10 * KIB, 24);
        tracker.register(&descriptor);

        let err = engine.run(&descriptor, source(250 * KIB)).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidReceipts(ReceiptError::CountMismatch {
                expected: 25,
                received: 24
            })
        ));
        assert!(api.completions().is_empty());

        let task = tracker.snapshot().tasks[0].clone();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.progress_percent < 100);
    }

    #[tokio::test]
    async fn test_rejected_finalize_marks_error() {
        let transport = Arc::new(FakeTransport::new());
        let api = Arc::new(FakeApi::new().rejecting_finalize());
        let (engine, tracker) = build(transport, api.clone());

        let descriptor = multipart(10, 2);
        tracker.register(&descriptor);

        let err = engine.run(&descriptor, source(20)).await.unwrap_err();
        assert!(matches!(err, TransferError::Finalize(_)));
        assert_eq!(api.completions().len(), 1);
        assert_eq!(tracker.snapshot().tasks[0].status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_failed_part_skips_finalize() {
        let transport = Arc::new(FakeTransport::new().fail("https://s3/part/2"));
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport, api.clone());

        let descriptor = multipart(10, 3);
        tracker.register(&descriptor);

        let err = engine.run(&descriptor, source(30)).await.unwrap_err();
        assert!(matches!(err, TransferError::Status { status: 500, .. }));
        assert!(api.completions().is_empty());
        assert_eq!(tracker.snapshot().tasks[0].status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_etag_is_recorded_empty() {
        let transport = Arc::new(FakeTransport::new().without_etag());
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport, api.clone());

        let descriptor = multipart(10, 2);
        tracker.register(&descriptor);
        engine.run(&descriptor, source(20)).await.unwrap();

        let parts = &api.completions()[0].parts;
        assert!(parts.iter().all(|p| p.etag.is_empty()));
    }

    #[tokio::test]
    async fn test_file_parts_stream_without_buffering_whole_file() {
        use crate::source::{FileSource, READ_CHUNK_BYTES};
        use std::io::Write;

        const MIB: u64 = 1024 * KIB;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![3u8; 10 * MIB as usize]).unwrap();
        let source: Arc<dyn UploadSource> = Arc::new(FileSource::open(tmp.path()).await.unwrap());

        let transport = Arc::new(FakeTransport::new());
        let api = Arc::new(FakeApi::new());
        let (engine, tracker) = build(transport.clone(), api.clone());

        let descriptor = multipart(MIB, 10);
        tracker.register(&descriptor);
        engine.run(&descriptor, Some(source)).await.unwrap();

        assert_eq!(transport.puts().len(), 10);
        assert!(transport.puts().iter().all(|p| p.len == MIB as usize));
        // At most one read buffer per concurrent part, never a whole part
        assert!(transport.peak_held_bytes() <= 10 * READ_CHUNK_BYTES);
        assert_eq!(api.completions().len(), 1);
        assert_eq!(tracker.snapshot().tasks[0].progress_percent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_part_concurrency_limit() {
        let mut transport = FakeTransport::new();
        for n in 1..=6 {
            transport = transport.delay(format!("https://s3/part/{}", n), Duration::from_secs(1));
        }
        let transport = Arc::new(transport);
        let (engine, tracker) = build(transport.clone(), Arc::new(FakeApi::new()));
        let engine = engine.with_part_concurrency(Some(2));

        let descriptor = multipart(10, 6);
        tracker.register(&descriptor);
        engine.run(&descriptor, source(60)).await.unwrap();

        assert_eq!(transport.puts().len(), 6);
        assert_eq!(transport.max_in_flight(), 2);
    }
}
