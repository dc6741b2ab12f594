use anyhow::Context;
use log::{info, warn};

use super::ModManager;
use crate::archive::ArchiveExtractor;
use crate::deploy::{self, ToggleReport};
use crate::error::{Error, Result};
use crate::runtime::{Runtime, RuntimeExt};

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> ModManager<'a, R, A> {
    /// Link or unlink a staged mod and record the confirmed status.
    pub fn set_enabled(&self, mod_name: &str, enabled: bool) -> Result<ToggleReport> {
        self.deployer()?
            .set_enabled(&self.staging(), mod_name, enabled)
    }

    /// Remove a mod's links, staged files and staging record.
    ///
    /// Without a known game mod folder there are no links to remove; the
    /// staged files and the record still go.
    pub fn uninstall(&self, mod_name: &str) -> Result<Vec<String>> {
        let staging = self.staging();
        if let Some(deployer) = self.try_deployer() {
            return deployer.uninstall(&staging, mod_name);
        }

        let staged = staging.load()?;
        if !staged.mods.contains_key(mod_name) {
            return Err(Error::ModNotFound(mod_name.to_string()));
        }
        warn!("'{}': game mod folder unknown; no links removed", mod_name);
        let removed = deploy::unshared_roots(&staged, mod_name);
        deploy::remove_staged(self.runtime, &self.paths.staging_dir, &removed)?;
        staging.remove_staging(mod_name)?;
        info!("Uninstalled '{}'", mod_name);
        Ok(removed)
    }

    /// Delete a downloaded archive and its download record.
    ///
    /// Returns whether anything was removed. Staged copies are not touched.
    #[tracing::instrument(skip(self))]
    pub fn delete_download(&self, file_name: &str) -> Result<bool> {
        let path = self.archive_path(file_name);
        let had_file = self.runtime.occupied(&path);
        if had_file {
            self.runtime
                .remove_file(&path)
                .context("Failed to delete archive")
                .map_err(|source| Error::Archive {
                    archive: path.clone(),
                    source,
                })?;
        }
        let had_record = self.downloads().remove_download(file_name)?;
        if had_file || had_record {
            info!("Deleted download {}", file_name);
        }
        Ok(had_file || had_record)
    }
}
