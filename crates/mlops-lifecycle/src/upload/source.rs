//! Where upload bytes come from.

use std::io::SeekFrom;
use std::ops::Range;
use std::path::PathBuf;

use bytes::Bytes;
use mlops_core::UploadError;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::fingerprint;

/// Artifact to upload in chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Local file, read one chunk at a time.
    File(PathBuf),
    /// Artifact already in memory; chunks are zero-copy slices.
    Bytes(Bytes),
}

impl ArtifactSource {
    pub(crate) async fn open(&self) -> Result<OpenArtifact, UploadError> {
        let (reader, size) = match self {
            Self::File(path) => {
                let file = File::open(path)
                    .await
                    .map_err(|e| UploadError::from_io_error(&e))?;
                let size = file
                    .metadata()
                    .await
                    .map_err(|e| UploadError::from_io_error(&e))?
                    .len();
                (Reader::File(file), size)
            }
            Self::Bytes(bytes) => (Reader::Memory(bytes.clone()), bytes.len() as u64),
        };

        if size == 0 {
            return Err(UploadError::EmptyArtifact);
        }
        Ok(OpenArtifact { reader, size })
    }

    pub(crate) async fn fingerprint(&self) -> Result<String, UploadError> {
        match self {
            Self::File(path) => fingerprint::sha256_file(path).await,
            Self::Bytes(bytes) => Ok(fingerprint::sha256_bytes(bytes)),
        }
    }
}

impl From<PathBuf> for ArtifactSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<Bytes> for ArtifactSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ArtifactSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

enum Reader {
    File(File),
    Memory(Bytes),
}

/// An artifact opened for ranged reads.
pub(crate) struct OpenArtifact {
    reader: Reader,
    size: u64,
}

impl OpenArtifact {
    pub(crate) const fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly the bytes of `range`.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) async fn read(&mut self, range: Range<u64>) -> std::io::Result<Bytes> {
        match &mut self.reader {
            Reader::Memory(bytes) => Ok(bytes.slice(range.start as usize..range.end as usize)),
            Reader::File(file) => {
                let len = usize::try_from(range.end - range.start)
                    .map_err(std::io::Error::other)?;
                let mut buf = vec![0u8; len];
                file.seek(SeekFrom::Start(range.start)).await?;
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}
