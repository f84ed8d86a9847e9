//! File transfer between the control channel and this instance
//!
//! This module handles:
//! - Saving received attachments, refusing reserved filenames
//! - Fetching local files as reply attachments, all or nothing, within the
//!   size one reply frame can carry

mod gateway;
mod storage;

pub use gateway::{FileGateway, TransferOutcome};
pub use storage::LocalStorage;

use thiserror::Error;

/// Errors raised while moving files
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("invalid filename: {0:?}")]
    InvalidName(String),

    #[error("cannot write {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{filename} does not fit in one reply ({encoded} encoded bytes, limit {budget})")]
    TooLarge {
        filename: String,
        encoded: u64,
        budget: u64,
    },

    #[error("cannot read {filename}: {source}")]
    Read {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}
