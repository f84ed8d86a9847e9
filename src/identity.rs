//! Device identity of this instance

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;

/// The identifier operators use to address this instance
///
/// Loaded once at startup and never changed; matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Read the identity from `path`, trimming surrounding whitespace
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read identity file {}", path.display()))?;
        let id = raw.trim();
        if id.is_empty() {
            bail!("identity file {} is empty", path.display());
        }
        Ok(Self::new(id))
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Case-insensitive comparison against a command target
    pub fn matches(&self, target: &str) -> bool {
        self.id.to_lowercase() == target.to_lowercase()
    }

    /// Name this instance uses when talking on the control channel
    pub fn chat_name(&self) -> String {
        format!("procfleet-{}", self.id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
