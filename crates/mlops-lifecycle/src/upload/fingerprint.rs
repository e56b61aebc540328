//! SHA-256 fingerprints of upload artifacts.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use mlops_core::UploadError;
use sha2::{Digest, Sha256};

const READ_BUFFER: usize = 1024 * 1024;

/// Lowercase hex SHA-256 of an in-memory artifact.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, streamed on the blocking pool.
pub async fn sha256_file(path: &Path) -> Result<String, UploadError> {
    let path: PathBuf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await;

    match result {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(err)) => Err(UploadError::from_io_error(&err)),
        Err(join_err) => Err(UploadError::Io {
            kind: "Other".to_string(),
            message: format!("hashing task failed: {join_err}"),
        }),
    }
}
