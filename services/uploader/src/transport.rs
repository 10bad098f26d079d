//! Byte transfer to pre-authorized object-store URLs.

use crate::error::TransferError;
use crate::source::PartBody;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Body, Client};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Receives the cumulative number of body bytes sent for one request
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Acknowledgment of a successful PUT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Integrity tag from the `ETag` response header, if any
    pub etag: Option<String>,
}

/// Performs PUT requests against presigned URLs
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    async fn put(
        &self,
        url: &str,
        body: PartBody,
        content_type: Option<&str>,
        progress: ProgressFn,
    ) -> Result<PutOutcome, TransferError>;
}

/// [`ObjectTransport`] over reqwest with chunked progress reporting
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(client: Client, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// Split a body into chunk-sized views of the same buffer
fn split_chunks(body: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..body.len())
        .step_by(chunk_size)
        .map(|start| body.slice(start..(start + chunk_size).min(body.len())))
        .collect()
}

#[async_trait]
impl ObjectTransport for HttpTransport {
    #[instrument(skip(self, url, body, progress), fields(bytes = body.len()))]
    async fn put(
        &self,
        url: &str,
        body: PartBody,
        content_type: Option<&str>,
        progress: ProgressFn,
    ) -> Result<PutOutcome, TransferError> {
        let total_bytes = body.len();
        let chunk_size = self.chunk_size;
        let sent = Arc::new(AtomicU64::new(0));

        // Source reads are re-cut to the progress granularity as they are pulled
        let stream = body
            .into_stream()
            .flat_map(move |item| {
                let chunks: Vec<io::Result<Bytes>> = match item {
                    Ok(bytes) => split_chunks(&bytes, chunk_size).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(chunks)
            })
            .map(move |item| {
                if let Ok(chunk) = &item {
                    let len = chunk.len() as u64;
                    let now = sent.fetch_add(len, Ordering::SeqCst) + len;
                    progress(now);
                }
                item
            });

        // Presigned PUTs need an explicit length; a streamed body would go out chunked
        let mut request = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, total_bytes)
            .body(Body::wrap_stream(stream));

        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Header lookup is case-insensitive, covering both `ETag` and `etag`
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(status = status.as_u16(), etag = ?etag, "PUT acknowledged");

        Ok(PutOutcome { etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |sent| sink.lock().push(sent)), seen)
    }

    #[test]
    fn test_split_chunks() {
        let body = Bytes::from(vec![7u8; 10]);
        let chunks = split_chunks(&body, 4);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(split_chunks(&Bytes::new(), 4).is_empty());
    }

    #[tokio::test]
    async fn test_put_reports_progress_and_etag() {
        let server = MockServer::start().await;
        let payload = vec![42u8; 1000];
        Mock::given(method("PUT"))
            .and(path("/bucket/a.mp4"))
            .and(header("content-type", "video/mp4"))
            .and(body_bytes(payload.clone()))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), 256);
        let (progress, seen) = recording_progress();
        let outcome = transport
            .put(
                &format!("{}/bucket/a.mp4", server.uri()),
                PartBody::from_bytes(Bytes::from(payload)),
                Some("video/mp4"),
                progress,
            )
            .await
            .unwrap();

        assert_eq!(outcome.etag.as_deref(), Some("\"abc123\""));
        let seen = seen.lock();
        assert_eq!(seen.as_slice(), &[256, 512, 768, 1000]);
    }

    #[tokio::test]
    async fn test_put_streams_file_range() {
        use crate::source::{FileSource, UploadSource, READ_CHUNK_BYTES};
        use std::io::Write;

        let contents: Vec<u8> = (0..3 * READ_CHUNK_BYTES + 100).map(|i| (i % 97) as u8).collect();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&contents).unwrap();
        let source = FileSource::open(tmp.path()).await.unwrap();

        let range = 50..source.len();
        let expected = contents[50..].to_vec();

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("content-length", expected.len().to_string().as_str()))
            .and(body_bytes(expected.clone()))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"part\""))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), 10_000);
        let (progress, seen) = recording_progress();
        transport
            .put(
                &server.uri(),
                source.open_range(range).await.unwrap(),
                None,
                progress,
            )
            .await
            .unwrap();

        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.iter().zip(seen.iter().skip(1)).all(|(a, b)| b - a <= 10_000));
        assert_eq!(seen.last().copied(), Some(expected.len() as u64));
    }

    #[tokio::test]
    async fn test_put_reads_lowercase_etag_header() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "lower"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), 64);
        let (progress, _) = recording_progress();
        let outcome = transport
            .put(
                &server.uri(),
                PartBody::from_bytes(Bytes::from_static(b"part")),
                None,
                progress,
            )
            .await
            .unwrap();

        assert_eq!(outcome.etag.as_deref(), Some("lower"));
    }

    #[tokio::test]
    async fn test_put_without_etag_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), 64);
        let (progress, _) = recording_progress();
        let outcome = transport
            .put(
                &server.uri(),
                PartBody::from_bytes(Bytes::from_static(b"part")),
                None,
                progress,
            )
            .await
            .unwrap();

        assert_eq!(outcome, PutOutcome { etag: None });
    }

    #[tokio::test]
    async fn test_put_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), 64);
        let (progress, _) = recording_progress();
        let err = transport
            .put(
                &server.uri(),
                PartBody::from_bytes(Bytes::from_static(b"data")),
                None,
                progress,
            )
            .await
            .unwrap_err();

        match err {
            TransferError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("SignatureDoesNotMatch"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
