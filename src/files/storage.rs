//! Persistence backend for transferred files

use async_trait::async_trait;
use bytes::Bytes;
use procfleet_shared::Attachment;
use std::path::PathBuf;

use super::TransferError;

/// Filename-keyed save/open
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `filename`, replacing any existing file
    async fn save(&self, filename: &str, data: &[u8]) -> Result<(), TransferError>;

    /// Size of `filename` in bytes, without reading it
    async fn size(&self, filename: &str) -> Result<u64, TransferError>;

    /// Read `filename` back as an attachment
    async fn open(&self, filename: &str) -> Result<Attachment, TransferError>;
}

/// Files on local disk below a root directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn save(&self, filename: &str, data: &[u8]) -> Result<(), TransferError> {
        let path = self.root.join(filename);
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| TransferError::Write {
                filename: filename.to_string(),
                source,
            })
    }

    async fn size(&self, filename: &str) -> Result<u64, TransferError> {
        let metadata = tokio::fs::metadata(self.root.join(filename))
            .await
            .map_err(|source| TransferError::Read {
                filename: filename.to_string(),
                source,
            })?;
        Ok(metadata.len())
    }

    async fn open(&self, filename: &str) -> Result<Attachment, TransferError> {
        let path = self.root.join(filename);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| TransferError::Read {
                filename: filename.to_string(),
                source,
            })?;

        // Attachments carry the bare name, like an upload would
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        Ok(Attachment::new(name, Bytes::from(data)))
    }
}
