//! Staging Extractor.
//!
//! Archives are first unpacked into `<staging>/.nomm-extract.tmp`. Only after
//! every entry was written are the resulting roots moved into the staging
//! directory, replacing older copies of the same roots.

use anyhow::Context;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::{ArchiveEntry, ArchiveExtractor, Deadline, InstallerOption, is_contained};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::error::{Error, Result};
use crate::ledger::{DOWNLOAD_LEDGER_FILE, STAGING_LEDGER_FILE};
use crate::runtime::{Runtime, RuntimeExt};

pub const EXTRACT_TMP_DIR: &str = ".nomm-extract.tmp";

type EntryMap = dyn Fn(&str) -> Option<PathBuf>;

fn is_reserved(root: &str) -> bool {
    root == EXTRACT_TMP_DIR || root == STAGING_LEDGER_FILE || root == DOWNLOAD_LEDGER_FILE
}

/// Find the entry prefix that holds `source_folder`.
///
/// The declared folder may not exist verbatim as a directory entry, so any
/// entry ending in `<folder>/` or containing `/<folder>/` counts. Matching
/// ignores ASCII case. The returned prefix ends with `/`.
pub fn find_option_prefix(entries: &[ArchiveEntry], source_folder: &str) -> Option<String> {
    let folder = source_folder.replace('\\', "/").trim_matches('/').to_ascii_lowercase();
    if folder.is_empty() {
        return None;
    }
    let suffix = format!("/{folder}");
    let needle = format!("/{folder}/");
    let leading = format!("{folder}/");

    let dir_match = entries.iter().find_map(|entry| {
        let lower = entry.name.to_ascii_lowercase();
        (entry.is_dir && (lower == folder || lower.ends_with(&suffix)))
            .then(|| format!("{}/", entry.name))
    });
    if dir_match.is_some() {
        return dir_match;
    }

    entries.iter().find_map(|entry| {
        let lower = entry.name.to_ascii_lowercase();
        if let Some(idx) = lower.find(&needle) {
            return Some(entry.name[..idx + needle.len()].to_string());
        }
        lower
            .starts_with(&leading)
            .then(|| entry.name[..leading.len()].to_string())
    })
}

/// Directory name an option is staged under.
pub fn option_root(option: &InstallerOption) -> String {
    let cleaned = option.name.replace(['/', '\\'], "_").trim().to_string();
    match cleaned.as_str() {
        "" | "." | ".." => "option".to_string(),
        name if is_reserved(name) => format!("{name}_"),
        _ => cleaned,
    }
}

fn first_segment(name: &str) -> &str {
    name.split('/').next().unwrap_or(name)
}

/// Extracts archives into a game's staging directory.
pub struct Stager<'a, R: Runtime, A: ArchiveExtractor> {
    runtime: &'a R,
    archives: &'a A,
    archive_timeout: Option<Duration>,
    cleanup_ctx: Option<SharedCleanupContext>,
    /// Staged roots of other mods, mapped to their owner.
    foreign_roots: BTreeMap<String, String>,
}

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> Stager<'a, R, A> {
    pub fn new(runtime: &'a R, archives: &'a A) -> Self {
        Self {
            runtime,
            archives,
            archive_timeout: None,
            cleanup_ctx: None,
            foreign_roots: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.archive_timeout = Some(timeout);
        self
    }

    pub fn with_cleanup(mut self, ctx: SharedCleanupContext) -> Self {
        self.cleanup_ctx = Some(ctx);
        self
    }

    /// Refuse archives whose roots are already staged for another mod.
    pub fn with_foreign_roots(mut self, owners: BTreeMap<String, String>) -> Self {
        self.foreign_roots = owners;
        self
    }

    fn deadline(&self) -> Deadline {
        self.archive_timeout
            .map(Deadline::after)
            .unwrap_or_else(Deadline::unbounded)
    }

    /// Stage an archive and return its manifest.
    ///
    /// Without `option` every entry is extracted and the manifest lists the
    /// distinct first path segments. With `option` only the entries under the
    /// option's folder are extracted, below a single root named after it.
    #[tracing::instrument(skip(self, option), fields(option = option.map(|o| o.name.as_str())))]
    pub fn stage(
        &self,
        archive_path: &Path,
        staging_dir: &Path,
        option: Option<&InstallerOption>,
    ) -> Result<Vec<String>> {
        let deadline = self.deadline();
        let entries = self
            .archives
            .entries(self.runtime, archive_path)
            .map_err(|source| Error::Archive {
                archive: archive_path.to_path_buf(),
                source,
            })?;

        let (manifest, mapper): (Vec<String>, Box<EntryMap>) = match option {
            None => {
                let mut roots: Vec<String> = Vec::new();
                for entry in &entries {
                    let root = first_segment(&entry.name);
                    if is_contained(Path::new(&entry.name))
                        && !is_reserved(root)
                        && !roots.iter().any(|r| r == root)
                    {
                        roots.push(root.to_string());
                    }
                }
                let mapper: Box<EntryMap> = Box::new(|name: &str| {
                    (!is_reserved(first_segment(name))).then(|| PathBuf::from(name))
                });
                (roots, mapper)
            }
            Some(option) => {
                let prefix = find_option_prefix(&entries, &option.source_folder).ok_or_else(|| {
                    Error::extraction(
                        archive_path,
                        format!(
                            "folder '{}' for option '{}' not found in archive",
                            option.source_folder, option.name
                        ),
                    )
                })?;
                debug!("Option '{}' maps to archive prefix {}", option.name, prefix);
                let root = option_root(option);
                let target = PathBuf::from(&root);
                let mapper: Box<EntryMap> = Box::new(move |name: &str| {
                    name.strip_prefix(prefix.as_str())
                        .filter(|rest| !rest.is_empty())
                        .map(|rest| target.join(rest))
                });
                (vec![root], mapper)
            }
        };

        if manifest.is_empty() {
            return Err(Error::extraction(archive_path, "archive contains no files"));
        }
        if let Some((root, owner)) = manifest
            .iter()
            .find_map(|root| self.foreign_roots.get(root).map(|owner| (root, owner)))
        {
            return Err(Error::extraction(
                archive_path,
                format!("'{}' is already staged by mod '{}'", root, owner),
            ));
        }

        let tmp_dir = staging_dir.join(EXTRACT_TMP_DIR);
        let guard = self
            .cleanup_ctx
            .as_ref()
            .map(|ctx| CleanupGuard::new(ctx.clone(), tmp_dir.clone()));

        let result = self.extract_and_move(
            archive_path,
            staging_dir,
            &tmp_dir,
            &manifest,
            mapper.as_ref(),
            &deadline,
        );
        if self.runtime.occupied(&tmp_dir)
            && let Err(e) = self.runtime.remove_entry(&tmp_dir)
        {
            debug!("Failed to remove {:?}: {}", tmp_dir, e);
        }
        if let Some(guard) = guard {
            guard.success();
        }

        let manifest = result.map_err(|e| Error::extraction(archive_path, format!("{e:#}")))?;
        info!(
            "Staged {} root(s) from {:?} into {:?}",
            manifest.len(),
            archive_path,
            staging_dir
        );
        Ok(manifest)
    }

    fn extract_and_move(
        &self,
        archive_path: &Path,
        staging_dir: &Path,
        tmp_dir: &Path,
        manifest: &[String],
        mapper: &EntryMap,
        deadline: &Deadline,
    ) -> anyhow::Result<Vec<String>> {
        if self.runtime.occupied(tmp_dir) {
            self.runtime.remove_entry(tmp_dir)?;
        }
        self.runtime
            .create_dir_all(tmp_dir)
            .context("Failed to create temporary extraction directory")?;

        self.archives
            .extract_entries(self.runtime, archive_path, tmp_dir, mapper, deadline)?;

        let extracted: Vec<String> = manifest
            .iter()
            .filter(|root| self.runtime.occupied(&tmp_dir.join(root.as_str())))
            .cloned()
            .collect();
        if extracted.is_empty() {
            anyhow::bail!("nothing was extracted");
        }

        for root in &extracted {
            let dest = staging_dir.join(root);
            if self.runtime.occupied(&dest) {
                debug!("Replacing staged {:?}", dest);
                self.runtime
                    .remove_entry(&dest)
                    .with_context(|| format!("Failed to replace {:?}", dest))?;
            }
            self.runtime
                .rename(&tmp_dir.join(root), &dest)
                .with_context(|| format!("Failed to move {} into staging", root))?;
        }
        Ok(extracted)
    }
}

/// True when every file entry of the archive exists under `staging_dir`.
pub fn is_fully_staged<R: Runtime + 'static, A: ArchiveExtractor>(
    runtime: &R,
    archives: &A,
    archive_path: &Path,
    staging_dir: &Path,
) -> bool {
    match archives.entries(runtime, archive_path) {
        Ok(entries) => {
            let mut files = entries.iter().filter(|e| !e.is_dir).peekable();
            files.peek().is_some()
                && files.all(|e| runtime.exists(&staging_dir.join(&e.name)))
        }
        Err(e) => {
            debug!("Cannot list {:?}: {:#}", archive_path, e);
            false
        }
    }
}
