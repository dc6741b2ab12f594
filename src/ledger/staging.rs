use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::STAGING_LEDGER_FILE;
use super::records::{DownloadLedger, ModStatus, StagingLedger, StagingRecord};
use super::store::LedgerFile;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// What a reinstall does to a mod that is already enabled.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReinstallStatus {
    /// Every (re)install leaves the mod disabled.
    #[default]
    Reset,
    /// Keep the previous status.
    Preserve,
}

/// New remote version information for one staged mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub mod_name: String,
    pub new_version: String,
    /// `None` leaves the stored changelog untouched.
    pub changelog: Option<String>,
}

/// Mod name for an archive: the download record's name, else the file name
/// without its extension.
pub fn resolve_mod_name(archive_filename: &str, downloads: &DownloadLedger) -> String {
    downloads
        .mods
        .get(archive_filename)
        .and_then(|record| record.name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| file_stem(archive_filename))
}

fn file_stem(archive_filename: &str) -> String {
    Path::new(archive_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| archive_filename.to_string())
}

/// The staging ledger of one game's staging directory.
pub struct StagingLedgerStore<'a, R: Runtime> {
    file: LedgerFile<'a, R, StagingLedger>,
}

impl<'a, R: Runtime> StagingLedgerStore<'a, R> {
    pub fn new(runtime: &'a R, staging_dir: &Path) -> Self {
        Self {
            file: LedgerFile::new(runtime, staging_dir.join(STAGING_LEDGER_FILE)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    pub fn load(&self) -> Result<StagingLedger> {
        self.file.load()
    }

    /// Look up a mod, failing with [`Error::ModNotFound`].
    pub fn get(&self, mod_name: &str) -> Result<StagingRecord> {
        self.load()?
            .mods
            .remove(mod_name)
            .ok_or_else(|| Error::ModNotFound(mod_name.to_string()))
    }

    /// Write the staging record for a freshly extracted archive.
    ///
    /// Metadata comes from the archive's download record when there is one.
    /// The ledger info block is copied from the download ledger on first use.
    /// Returns the mod name the record is stored under.
    #[tracing::instrument(skip(self, downloads, manifest))]
    pub fn promote_to_staging(
        &self,
        archive_filename: &str,
        downloads: &DownloadLedger,
        manifest: Vec<String>,
        reinstall: ReinstallStatus,
    ) -> Result<String> {
        let mod_name = resolve_mod_name(archive_filename, downloads);
        let download = downloads.mods.get(archive_filename);

        self.file.update(|ledger| {
            if ledger.info.is_none() {
                ledger.info = downloads.info.clone();
            }

            let status = match (reinstall, ledger.mods.get(&mod_name)) {
                (ReinstallStatus::Preserve, Some(previous)) => previous.status,
                _ => ModStatus::Disabled,
            };

            let mut record = StagingRecord {
                mod_files: manifest,
                status,
                ..StagingRecord::default()
            };
            if let Some(download) = download {
                record.version = download.version.clone();
                record.changelog = download.changelog.clone();
                record.mod_link = download.mod_link.clone();
                record.mod_id = download.mod_id.clone();
                record.file_id = download.file_id.clone();
            }

            debug!("Staging '{}' with status {}", mod_name, status);
            ledger.mods.insert(mod_name.clone(), record);
            Ok(mod_name.clone())
        })
    }

    /// Drop a mod's record, returning it.
    pub fn remove_staging(&self, mod_name: &str) -> Result<StagingRecord> {
        self.file.update(|ledger| {
            ledger
                .mods
                .remove(mod_name)
                .ok_or_else(|| Error::ModNotFound(mod_name.to_string()))
        })
    }

    pub fn set_status(&self, mod_name: &str, status: ModStatus) -> Result<()> {
        self.file.update(|ledger| {
            let record = ledger
                .mods
                .get_mut(mod_name)
                .ok_or_else(|| Error::ModNotFound(mod_name.to_string()))?;
            record.status = status;
            Ok(())
        })
    }

    pub fn apply_update_info(
        &self,
        mod_name: &str,
        new_version: &str,
        changelog: Option<&str>,
    ) -> Result<()> {
        self.apply_updates(&[UpdateInfo {
            mod_name: mod_name.to_string(),
            new_version: new_version.to_string(),
            changelog: changelog.map(str::to_string),
        }])
        .and_then(|applied| {
            if applied == 0 {
                Err(Error::ModNotFound(mod_name.to_string()))
            } else {
                Ok(())
            }
        })
    }

    /// Apply a batch of update findings in one write.
    ///
    /// Mods that disappeared from the ledger meanwhile are skipped. Returns
    /// the number of records changed; nothing is written when that is zero.
    pub fn apply_updates(&self, updates: &[UpdateInfo]) -> Result<usize> {
        let mut ledger = self.file.load()?;
        let mut applied = 0;
        for update in updates {
            let Some(record) = ledger.mods.get_mut(&update.mod_name) else {
                debug!("'{}' is no longer staged; skipping update", update.mod_name);
                continue;
            };
            record.new_version = Some(update.new_version.clone());
            if let Some(changelog) = &update.changelog {
                record.changelog = changelog.clone();
            }
            applied += 1;
        }
        if applied > 0 {
            self.file.save(&ledger)?;
        }
        Ok(applied)
    }
}
