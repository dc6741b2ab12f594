use log::{info, warn};

use super::ModManager;
use crate::archive::{self, ArchiveExtractor, Inspection, InstallerOption};
use crate::deploy;
use crate::error::{Error, Result};
use crate::ledger::{ModStatus, ReinstallStatus, resolve_mod_name};
use crate::runtime::Runtime;
use crate::staging::Stager;

/// What an install changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub mod_name: String,
    pub manifest: Vec<String>,
    pub status: ModStatus,
    /// Roots of the previous install that the new one no longer has.
    pub removed_roots: Vec<String>,
}

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> ModManager<'a, R, A> {
    pub fn inspect(&self, file_name: &str) -> Result<Inspection> {
        archive::inspect(self.runtime, self.archives, &self.archive_path(file_name))
    }

    /// Pick the installer option named `option_name` (case-insensitive).
    ///
    /// A multi-option archive needs a choice; a plain archive accepts none.
    pub fn select_option(
        &self,
        file_name: &str,
        option_name: Option<&str>,
    ) -> Result<Option<InstallerOption>> {
        let archive_path = self.archive_path(file_name);
        match (self.inspect(file_name)?, option_name) {
            (Inspection::Plain, None) => Ok(None),
            (Inspection::Plain, Some(name)) => Err(Error::extraction(
                archive_path,
                format!("archive has no installer options (requested '{}')", name),
            )),
            (Inspection::MultiOption { options, .. }, Some(name)) => options
                .into_iter()
                .find(|o| o.name.eq_ignore_ascii_case(name.trim()))
                .map(Some)
                .ok_or_else(|| {
                    Error::extraction(archive_path, format!("no installer option named '{}'", name))
                }),
            (Inspection::MultiOption { options, .. }, None) => {
                let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
                Err(Error::extraction(
                    archive_path,
                    format!("installer option required, one of: {}", names.join(", ")),
                ))
            }
        }
    }

    /// Stage a downloaded archive and record it in the staging ledger.
    ///
    /// A reinstall replaces the previous roots. Roots the new version no
    /// longer ships are unlinked and deleted. With the `reset` policy a
    /// previously enabled mod comes back disabled and unlinked; with
    /// `preserve` it is linked again and stays enabled. An archive whose
    /// roots are already staged for another mod is refused.
    #[tracing::instrument(skip(self, option), fields(option = option.map(|o| o.name.as_str())))]
    pub fn install(
        &self,
        file_name: &str,
        option: Option<&InstallerOption>,
    ) -> Result<InstallOutcome> {
        let archive_path = self.archive_path(file_name);
        let downloads = self.downloads().load()?;
        let staging = self.staging();
        let mod_name = resolve_mod_name(file_name, &downloads);
        let staged = staging.load()?;
        let owners = staged.root_owners(&mod_name, false);
        let previous = staged.mods.get(&mod_name).cloned();

        let mut stager = Stager::new(self.runtime, self.archives).with_foreign_roots(owners.clone());
        if let Some(timeout) = self.archive_timeout {
            stager = stager.with_timeout(timeout);
        }
        if let Some(ctx) = &self.cleanup {
            stager = stager.with_cleanup(ctx.clone());
        }
        let manifest = stager.stage(&archive_path, &self.paths.staging_dir, option)?;

        let was_enabled = previous.as_ref().is_some_and(|p| p.status.is_enabled());
        let deployer = self.try_deployer();

        let removed_roots: Vec<String> = previous
            .as_ref()
            .map(|p| {
                p.mod_files
                    .iter()
                    .filter(|root| !manifest.contains(root) && !owners.contains_key(root.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if !removed_roots.is_empty() {
            match &deployer {
                Some(deployer) => {
                    let failures = deployer.apply(&mod_name, &removed_roots, false).failures();
                    if !failures.is_empty() {
                        return Err(Error::Link {
                            mod_name: mod_name.clone(),
                            failures,
                        });
                    }
                    deployer.remove_staged(&removed_roots)?;
                }
                None => {
                    deploy::remove_staged(self.runtime, &self.paths.staging_dir, &removed_roots)?;
                }
            }
            info!("'{}': dropped stale roots {:?}", mod_name, removed_roots);
        }

        let relink = was_enabled && self.reinstall == ReinstallStatus::Preserve;
        if was_enabled && !relink && let Some(deployer) = &deployer {
            let report = deployer.apply(&mod_name, &manifest, false);
            let failures = report.failures();
            if !failures.is_empty() {
                return Err(Error::Link {
                    mod_name: mod_name.clone(),
                    failures,
                });
            }
        }

        // Record as disabled first when relinking so that `enabled` is only
        // written once the links exist.
        let policy = if relink {
            ReinstallStatus::Reset
        } else {
            self.reinstall
        };
        let mod_name = staging.promote_to_staging(file_name, &downloads, manifest.clone(), policy)?;

        let mut status = ModStatus::Disabled;
        if relink {
            match &deployer {
                Some(deployer) => {
                    if let Err(e) = deployer.set_enabled(&staging, &mod_name, true) {
                        for failure in deployer.apply(&mod_name, &manifest, false).failures() {
                            warn!(
                                "'{}': cannot unlink {} after failed relink: {}",
                                mod_name, failure.root, failure.message
                            );
                        }
                        return Err(e);
                    }
                    status = staging.get(&mod_name)?.status;
                }
                None => warn!("'{}': game mod folder unknown; left disabled", mod_name),
            }
        }

        info!("Installed '{}' from {} ({:?})", mod_name, file_name, manifest);
        Ok(InstallOutcome {
            mod_name,
            manifest,
            status,
            removed_roots,
        })
    }
}
