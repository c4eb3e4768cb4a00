//! JSON documents on disk

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::errors::ApiError;

/// Settings documents larger than this are refused
pub const MAX_DOCUMENT_BYTES: u64 = 1024 * 1024;

/// A JSON document at a fixed path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the document. Reads at most [`MAX_DOCUMENT_BYTES`];
    /// anything longer is an error rather than a truncated parse.
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let file = fs::File::open(&self.path).await?;
        let mut contents = Vec::new();
        file.take(MAX_DOCUMENT_BYTES + 1)
            .read_to_end(&mut contents)
            .await?;

        if contents.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(ApiError::ConfigError(format!(
                "{} is larger than {} bytes",
                self.path.display(),
                MAX_DOCUMENT_BYTES
            )));
        }
        Ok(serde_json::from_slice(&contents)?)
    }
}
