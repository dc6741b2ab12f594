//! Read-only views over one game's ledgers and files.

use log::debug;
use serde::Serialize;

use super::ModManager;
use crate::archive::{ArchiveExtractor, is_archive_name};
use crate::error::Result;
use crate::ledger::{ModStatus, resolve_mod_name};
use crate::runtime::{Runtime, RuntimeExt};
use crate::staging::is_fully_staged;

/// Counters for a game overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub enabled: usize,
    pub disabled: usize,
    pub downloads_available: usize,
    pub downloads_installed: usize,
}

/// One staged mod as seen on disk right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModState {
    pub name: String,
    pub version: Option<String>,
    pub new_version: Option<String>,
    pub update_available: bool,
    pub status: ModStatus,
    pub mod_files: Vec<String>,
    /// Manifest roots no longer present in staging.
    pub missing_files: Vec<String>,
    /// Roots currently linked into the game by this mod.
    pub linked_roots: Vec<String>,
}

impl ModState {
    pub fn has_drift(&self) -> bool {
        !self.missing_files.is_empty()
    }
}

/// One archive in the downloads folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadState {
    pub file_name: String,
    pub mod_name: String,
    pub version: Option<String>,
    pub installed: bool,
}

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> ModManager<'a, R, A> {
    /// Archive file names in the downloads folder, sorted.
    pub fn list_archives(&self) -> Result<Vec<String>> {
        let dir = &self.paths.downloads_dir;
        if !self.runtime.is_dir(dir) {
            return Ok(Vec::new());
        }
        let entries = self
            .runtime
            .read_dir(dir)
            .map_err(|e| {
                crate::error::Error::Config(format!("Cannot list downloads folder {:?}: {e:#}", dir))
            })?;

        let mut names: Vec<String> = entries
            .iter()
            .filter(|path| !self.runtime.is_dir(path))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
            .filter(|name| is_archive_name(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every staged mod with its drift, link and update state.
    pub fn mod_states(&self) -> Result<Vec<ModState>> {
        let ledger = self.staging().load()?;
        let deployer = self.try_deployer();

        Ok(ledger
            .mods
            .into_iter()
            .map(|(name, record)| {
                let missing_files: Vec<String> = record
                    .mod_files
                    .iter()
                    .filter(|root| !self.runtime.occupied(&self.paths.staging_dir.join(root)))
                    .cloned()
                    .collect();
                if !missing_files.is_empty() {
                    debug!("'{}' is missing {:?} from staging", name, missing_files);
                }
                let linked_roots = deployer
                    .as_ref()
                    .map(|d| d.linked_roots(&record.mod_files))
                    .unwrap_or_default();
                let update_available = record
                    .new_version
                    .as_ref()
                    .is_some_and(|new| Some(new) != record.version.as_ref());

                ModState {
                    name,
                    version: record.version,
                    new_version: record.new_version,
                    update_available,
                    status: record.status,
                    mod_files: record.mod_files,
                    missing_files,
                    linked_roots,
                }
            })
            .collect())
    }

    /// Archives with their resolved mod name and install state.
    ///
    /// An archive counts as installed when its mod is in the staging ledger
    /// or when all of its files are already present in staging.
    pub fn download_states(&self) -> Result<Vec<DownloadState>> {
        let downloads = self.downloads().load()?;
        let staging = self.staging().load()?;

        Ok(self
            .list_archives()?
            .into_iter()
            .map(|file_name| {
                let mod_name = resolve_mod_name(&file_name, &downloads);
                let installed = staging.mods.contains_key(&mod_name)
                    || is_fully_staged(
                        self.runtime,
                        self.archives,
                        &self.archive_path(&file_name),
                        &self.paths.staging_dir,
                    );
                let version = downloads
                    .mods
                    .get(&file_name)
                    .and_then(|r| r.version.clone());
                DownloadState {
                    file_name,
                    mod_name,
                    version,
                    installed,
                }
            })
            .collect())
    }

    pub fn summary(&self) -> Result<Summary> {
        let staging = self.staging().load()?;
        let downloads = self.download_states()?;

        let enabled = staging
            .mods
            .values()
            .filter(|r| r.status.is_enabled())
            .count();
        Ok(Summary {
            enabled,
            disabled: staging.mods.len() - enabled,
            downloads_available: downloads.len(),
            downloads_installed: downloads.iter().filter(|d| d.installed).count(),
        })
    }
}
