//! Archive Inspector.
//!
//! Extractors list, read and selectively extract entries from `.zip` and
//! `.rar` containers. [`inspect`] classifies an archive as a plain package or a
//! multi-option installer by looking for a FOMOD descriptor.

pub mod fomod;
#[cfg(feature = "rar")]
mod rar;
mod zip;

use crate::error::{Error, Result as EngineResult};
use crate::runtime::Runtime;
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

pub use fomod::InstallerOption;
#[cfg(feature = "rar")]
pub use rar::RarExtractor;
pub use zip::ZipExtractor;

/// One entry of an archive, with `/` separated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Maps an archive entry name to a path relative to the extraction root,
/// or `None` to leave the entry out.
pub type EntryMapper<'a> = &'a dyn Fn(&str) -> Option<PathBuf>;

/// Upper bound on how long an archive operation may run.
///
/// Checked between entries; a single huge entry is not interrupted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(budget),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            expires_at: None,
            budget: Duration::ZERO,
        }
    }

    pub fn check(&self) -> Result<()> {
        if let Some(at) = self.expires_at
            && Instant::now() >= at
        {
            bail!(
                "Archive operation timed out after {}s",
                self.budget.as_secs()
            );
        }
        Ok(())
    }
}

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// List every entry in archive order.
    fn entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<Vec<ArchiveEntry>>;

    /// Read a single file entry into memory.
    fn read_entry<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        name: &str,
    ) -> Result<Vec<u8>>;

    /// Extract the entries accepted by `mapper` under `extract_to`.
    ///
    /// Returns the number of files written.
    fn extract_entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        mapper: EntryMapper<'_>,
        deadline: &Deadline,
    ) -> Result<usize>;
}

/// Dispatcher that selects the extractor matching the archive's extension.
pub struct Archives {
    zip: ZipExtractor,
    #[cfg(feature = "rar")]
    rar: RarExtractor,
}

impl Default for Archives {
    fn default() -> Self {
        Self::new()
    }
}

impl Archives {
    pub fn new() -> Self {
        Self {
            zip: ZipExtractor,
            #[cfg(feature = "rar")]
            rar: RarExtractor,
        }
    }
}

fn unsupported(archive_path: &Path) -> anyhow::Error {
    anyhow!("Unsupported archive format: {}", archive_path.display())
}

impl ArchiveExtractor for Archives {
    fn can_handle(&self, archive_path: &Path) -> bool {
        #[cfg(feature = "rar")]
        if self.rar.can_handle(archive_path) {
            return true;
        }
        self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<Vec<ArchiveEntry>> {
        #[cfg(feature = "rar")]
        if self.rar.can_handle(archive_path) {
            return self.rar.entries(runtime, archive_path);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.entries(runtime, archive_path);
        }
        Err(unsupported(archive_path))
    }

    fn read_entry<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        name: &str,
    ) -> Result<Vec<u8>> {
        #[cfg(feature = "rar")]
        if self.rar.can_handle(archive_path) {
            return self.rar.read_entry(runtime, archive_path, name);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.read_entry(runtime, archive_path, name);
        }
        Err(unsupported(archive_path))
    }

    #[tracing::instrument(skip(self, runtime, mapper, deadline))]
    fn extract_entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        mapper: EntryMapper<'_>,
        deadline: &Deadline,
    ) -> Result<usize> {
        #[cfg(feature = "rar")]
        if self.rar.can_handle(archive_path) {
            return self
                .rar
                .extract_entries(runtime, archive_path, extract_to, mapper, deadline);
        }
        if self.zip.can_handle(archive_path) {
            return self
                .zip
                .extract_entries(runtime, archive_path, extract_to, mapper, deadline);
        }
        Err(unsupported(archive_path))
    }
}

/// Result of inspecting an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// No usable installer descriptor; install everything.
    Plain,
    /// FOMOD-style package with mutually exclusive options.
    MultiOption {
        module_name: String,
        options: Vec<InstallerOption>,
    },
}

/// True for file names the engine treats as mod archives.
pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".rar")
}

/// Classify an archive.
///
/// A corrupt or unsupported container is an [`Error::Archive`]. Any problem
/// with the descriptor itself degrades to [`Inspection::Plain`].
#[tracing::instrument(skip(runtime, archives))]
pub fn inspect<R: Runtime + 'static, A: ArchiveExtractor>(
    runtime: &R,
    archives: &A,
    archive_path: &Path,
) -> EngineResult<Inspection> {
    let entries = archives
        .entries(runtime, archive_path)
        .map_err(|source| Error::Archive {
            archive: archive_path.to_path_buf(),
            source,
        })?;

    let Some(descriptor) = fomod::find_descriptor(entries.iter().map(|e| e.name.as_str())) else {
        return Ok(Inspection::Plain);
    };
    debug!("Found installer descriptor {}", descriptor);

    let bytes = match archives.read_entry(runtime, archive_path, descriptor) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Cannot read {}: {:#}; installing as plain archive", descriptor, e);
            return Ok(Inspection::Plain);
        }
    };

    match fomod::parse_module_config(&bytes) {
        Ok(config) if !config.options.is_empty() => Ok(Inspection::MultiOption {
            module_name: config.module_name,
            options: config.options,
        }),
        Ok(_) => {
            debug!("Descriptor lists no options; installing as plain archive");
            Ok(Inspection::Plain)
        }
        Err(e) => {
            warn!("Malformed installer descriptor: {:#}; installing as plain archive", e);
            Ok(Inspection::Plain)
        }
    }
}

/// Entry name with `\` turned into `/` and leading `./` or `/` removed.
pub(crate) fn clean_entry_name(name: &str) -> String {
    let replaced = name.replace('\\', "/");
    let mut trimmed = replaced.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

/// True when `path` only walks downward, so joining it cannot escape the root.
pub(crate) fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}
