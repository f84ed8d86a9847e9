//! Receive and fetch files over the control channel

use procfleet_shared::{codec::MAX_FRAME_SIZE, Attachment};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::Storage;
use super::TransferError;

/// Result of a fetch, by how many files resolved
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    None,
    One(Attachment),
    Many(Vec<Attachment>),
}

impl TransferOutcome {
    fn from_files(mut files: Vec<Attachment>) -> Self {
        match files.len() {
            0 => TransferOutcome::None,
            1 => TransferOutcome::One(files.remove(0)),
            _ => TransferOutcome::Many(files),
        }
    }

    pub fn into_files(self) -> Vec<Attachment> {
        match self {
            TransferOutcome::None => Vec::new(),
            TransferOutcome::One(file) => vec![file],
            TransferOutcome::Many(files) => files,
        }
    }
}

/// Frame bytes kept free for reply text, filenames and JSON structure
const FRAME_HEADROOM: u64 = 256 * 1024;

/// Encoded attachment bytes one reply may carry
pub const DEFAULT_FETCH_BUDGET: u64 = MAX_FRAME_SIZE as u64 - FRAME_HEADROOM;

/// Moves files between the control channel and local storage
pub struct FileGateway {
    storage: Arc<dyn Storage>,
    reserved: HashSet<String>,
    budget: u64,
}

impl FileGateway {
    pub fn new(storage: Arc<dyn Storage>, reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            storage,
            reserved: reserved.into_iter().collect(),
            budget: DEFAULT_FETCH_BUDGET,
        }
    }

    #[cfg(test)]
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    pub fn is_reserved(&self, filename: &str) -> bool {
        self.reserved.contains(filename)
    }

    /// Persist every non-reserved attachment, returning the accepted names in
    /// the order received
    pub async fn receive(&self, attachments: &[Attachment]) -> Result<Vec<String>, TransferError> {
        let mut saved = Vec::new();

        for attachment in attachments {
            let name = bare_name(&attachment.filename)
                .ok_or_else(|| TransferError::InvalidName(attachment.filename.clone()))?;

            if self.is_reserved(&name) {
                warn!(filename = %name, "rejected reserved filename");
                continue;
            }

            self.storage.save(&name, &attachment.data).await?;
            debug!(filename = %name, bytes = attachment.len(), "file saved");
            saved.push(name);
        }

        info!(saved = saved.len(), offered = attachments.len(), "files received");
        Ok(saved)
    }

    /// Resolve every requested name; a single failure fails the whole fetch
    ///
    /// Sizes are checked before anything is read, so a fetch that would not
    /// fit in one reply fails without loading the files.
    pub async fn fetch(&self, filenames: &[String]) -> Result<TransferOutcome, TransferError> {
        let mut encoded = 0u64;
        for filename in filenames {
            encoded += base64_len(self.storage.size(filename).await?);
            if encoded > self.budget {
                warn!(filename = %filename, encoded, budget = self.budget, "fetch too large");
                return Err(TransferError::TooLarge {
                    filename: filename.clone(),
                    encoded,
                    budget: self.budget,
                });
            }
        }

        let mut files = Vec::with_capacity(filenames.len());
        for filename in filenames {
            files.push(self.storage.open(filename).await?);
        }

        info!(count = files.len(), "files fetched");
        Ok(TransferOutcome::from_files(files))
    }
}

/// Attachment data travels base64 encoded
fn base64_len(raw: u64) -> u64 {
    raw.div_ceil(3) * 4
}

/// Final path component of an uploaded name
fn bare_name(filename: &str) -> Option<String> {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
