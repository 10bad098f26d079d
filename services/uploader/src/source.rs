//! Local byte sources for uploads.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

/// Buffer size for streamed file reads; at most one such chunk per part is
/// held in memory at a time
pub const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Body bytes produced on demand while a request is being sent
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Lazily read request body of known length
pub struct PartBody {
    len: u64,
    stream: ByteStream,
}

impl PartBody {
    pub fn new(len: u64, stream: ByteStream) -> Self {
        Self { len, stream }
    }

    /// Body backed by bytes already in memory
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            len: bytes.len() as u64,
            stream: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

/// Random-access bytes for one file
#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Body for `range` of the file, read as it is sent
    async fn open_range(&self, range: Range<u64>) -> io::Result<PartBody>;
}

fn check_range(range: &Range<u64>, len: u64) -> io::Result<()> {
    if range.start > range.end || range.end > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("range {:?} outside {} bytes", range, len),
        ));
    }
    Ok(())
}

/// In-memory file contents
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl UploadSource for BytesSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open_range(&self, range: Range<u64>) -> io::Result<PartBody> {
        check_range(&range, self.len())?;
        // Zero-copy slice of the shared buffer
        Ok(PartBody::from_bytes(
            self.data.slice(range.start as usize..range.end as usize),
        ))
    }
}

/// File on disk, opened per range so concurrent parts never share a cursor
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Stat the file and capture its size
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn open_range(&self, range: Range<u64>) -> io::Result<PartBody> {
        check_range(&range, self.len)?;

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;

        let len = range.end - range.start;
        let reader = file.take(len);
        Ok(PartBody::new(
            len,
            ReaderStream::with_capacity(reader, READ_CHUNK_BYTES).boxed(),
        ))
    }
}

/// A named local file offered for upload
#[derive(Clone)]
pub struct LocalFile {
    /// Name sent to the presign service; the object key ends with it
    pub name: String,
    pub content_type: String,
    pub source: Arc<dyn UploadSource>,
}

impl LocalFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        source: Arc<dyn UploadSource>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source,
        }
    }

    /// Whether this file is the one an object key was issued for
    pub fn matches_key(&self, key: &str) -> bool {
        key == self.name
            || key
                .strip_suffix(self.name.as_str())
                .is_some_and(|prefix| prefix.ends_with('/'))
    }
}

/// Find the local file an object key was issued for
pub fn find_source(files: &[LocalFile], key: &str) -> Option<Arc<dyn UploadSource>> {
    files
        .iter()
        .find(|f| f.matches_key(key))
        .map(|f| f.source.clone())
}

/// Guess a MIME type from the file extension
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "json" => "application/json",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
