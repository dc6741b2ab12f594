//! Error taxonomy for engine operations.
//!
//! Low-level helpers (runtime, extractors, HTTP) report `anyhow` errors with
//! context. Public operations fold those into [`Error`], which always names the
//! archive, ledger file, mod or URL the failure belongs to.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single root that could not be linked or unlinked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFailure {
    pub root: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The archive could not be opened or is not a valid container.
    #[error("Cannot read archive {}: {source:#}", .archive.display())]
    Archive {
        archive: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Staging failed; nothing was recorded for the mod.
    #[error("Cannot stage {}: {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    /// A ledger file exists but cannot be read, parsed or written.
    #[error("Ledger {} is unusable: {source:#}", .path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Some link operations failed; the requested status was not committed.
    #[error("{} link operation(s) failed for '{mod_name}': {}", .failures.len(), summarize(.failures))]
    Link {
        mod_name: String,
        failures: Vec<LinkFailure>,
    },

    /// A remote request failed.
    #[error("Network request for {target} failed: {source:#}")]
    Network {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Mod '{0}' is not in the staging ledger")]
    ModNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The archive, ledger, mod or URL this error is about.
    pub fn subject(&self) -> String {
        match self {
            Error::Archive { archive, .. } | Error::Extraction { archive, .. } => {
                archive.display().to_string()
            }
            Error::Ledger { path, .. } => path.display().to_string(),
            Error::Link { mod_name, .. } => mod_name.clone(),
            Error::ModNotFound(name) => name.clone(),
            Error::Network { target, .. } => target.clone(),
            Error::Config(_) => "configuration".to_string(),
        }
    }

    pub(crate) fn extraction(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Extraction {
            archive: archive.into(),
            message: message.into(),
        }
    }
}

fn summarize(failures: &[LinkFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.root, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}
