//! Deployment Manager.
//!
//! A mod is enabled by linking every root of its manifest from the game's
//! mod directory into staging: `<destination>/<root> -> <staging>/<root>`.
//! Status changes are committed through the staging ledger only after the
//! link operations confirmed them.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, LinkFailure, Result};
use crate::ledger::{ModStatus, StagingLedger, StagingLedgerStore};
use crate::runtime::{Runtime, RuntimeExt, normalize_path};

/// State of a destination slot relative to one staged root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// A symlink to our staged root
    Ours,
    /// Nothing there
    NotExists,
    /// A symlink pointing somewhere else
    Foreign,
    /// A regular file or directory
    NotSymlink,
}

impl LinkStatus {
    pub fn reason(&self) -> &'static str {
        match self {
            LinkStatus::Ours => "already linked",
            LinkStatus::NotExists => "does not exist",
            LinkStatus::Foreign => "occupied by another link",
            LinkStatus::NotSymlink => "occupied by a real file or directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootOutcome {
    Linked,
    AlreadyLinked,
    /// Left alone because something else holds the name.
    Skipped { reason: String },
    Unlinked,
    NotLinked,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    pub root: String,
    pub outcome: RootOutcome,
}

/// Outcome of one enable/disable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReport {
    pub mod_name: String,
    pub enabled: bool,
    pub roots: Vec<RootReport>,
    /// Whether the requested status was written to the ledger.
    pub committed: bool,
}

impl ToggleReport {
    pub fn skipped(&self) -> impl Iterator<Item = &RootReport> {
        self.roots
            .iter()
            .filter(|r| matches!(r.outcome, RootOutcome::Skipped { .. }))
    }

    pub(crate) fn failures(&self) -> Vec<LinkFailure> {
        self.roots
            .iter()
            .filter_map(|r| match &r.outcome {
                RootOutcome::Failed { message } => Some(LinkFailure {
                    root: r.root.clone(),
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn satisfied(&self) -> usize {
        self.roots
            .iter()
            .filter(|r| matches!(r.outcome, RootOutcome::Linked | RootOutcome::AlreadyLinked))
            .count()
    }
}

/// Links staged roots of one game into its mod directory.
pub struct Deployer<'a, R: Runtime> {
    runtime: &'a R,
    staging_dir: PathBuf,
    destination_dir: PathBuf,
}

impl<'a, R: Runtime> Deployer<'a, R> {
    pub fn new(runtime: &'a R, staging_dir: &Path, destination_dir: &Path) -> Self {
        let staging_dir = runtime
            .absolute(staging_dir)
            .unwrap_or_else(|_| staging_dir.to_path_buf());
        Self {
            runtime,
            staging_dir: normalize_path(&staging_dir),
            destination_dir: destination_dir.to_path_buf(),
        }
    }

    fn source(&self, root: &str) -> PathBuf {
        self.staging_dir.join(root)
    }

    fn dest(&self, root: &str) -> PathBuf {
        self.destination_dir.join(root)
    }

    pub fn check_link(&self, root: &str) -> LinkStatus {
        let dest = self.dest(root);
        if self.runtime.is_symlink(&dest) {
            match self.runtime.resolve_link(&dest) {
                Ok(target) if normalize_path(&target) == self.source(root) => LinkStatus::Ours,
                _ => LinkStatus::Foreign,
            }
        } else if self.runtime.exists(&dest) {
            LinkStatus::NotSymlink
        } else {
            LinkStatus::NotExists
        }
    }

    /// Roots currently linked into the destination by this mod.
    pub fn linked_roots(&self, roots: &[String]) -> Vec<String> {
        roots
            .iter()
            .filter(|root| self.check_link(root) == LinkStatus::Ours)
            .cloned()
            .collect()
    }

    /// Manifest roots no longer present in staging.
    pub fn missing_roots(&self, roots: &[String]) -> Vec<String> {
        roots
            .iter()
            .filter(|root| !self.runtime.occupied(&self.source(root)))
            .cloned()
            .collect()
    }

    fn link_root(&self, root: &str) -> RootOutcome {
        let source = self.source(root);
        if !self.runtime.occupied(&source) {
            return RootOutcome::Failed {
                message: "missing from staging".to_string(),
            };
        }
        match self.check_link(root) {
            LinkStatus::Ours => RootOutcome::AlreadyLinked,
            LinkStatus::NotExists => match self.runtime.symlink(&source, &self.dest(root)) {
                Ok(()) => RootOutcome::Linked,
                Err(e) => RootOutcome::Failed {
                    message: format!("{e:#}"),
                },
            },
            status => RootOutcome::Skipped {
                reason: status.reason().to_string(),
            },
        }
    }

    fn unlink_root(&self, root: &str) -> RootOutcome {
        match self.check_link(root) {
            LinkStatus::Ours => match self.runtime.remove_symlink(&self.dest(root)) {
                Ok(()) => RootOutcome::Unlinked,
                Err(e) => RootOutcome::Failed {
                    message: format!("{e:#}"),
                },
            },
            LinkStatus::NotExists => RootOutcome::NotLinked,
            status => RootOutcome::Skipped {
                reason: status.reason().to_string(),
            },
        }
    }

    /// Link or unlink every root of `roots` without touching any ledger.
    pub fn apply(&self, mod_name: &str, roots: &[String], enabled: bool) -> ToggleReport {
        self.apply_with_owners(mod_name, roots, enabled, &BTreeMap::new())
    }

    /// Like [`Deployer::apply`], but roots found in `owners` belong to
    /// another mod and are skipped.
    fn apply_with_owners(
        &self,
        mod_name: &str,
        roots: &[String],
        enabled: bool,
        owners: &BTreeMap<String, String>,
    ) -> ToggleReport {
        let mut reports = Vec::with_capacity(roots.len());

        if enabled
            && !self.runtime.is_dir(&self.destination_dir)
            && let Err(e) = self.runtime.create_dir_all(&self.destination_dir)
        {
            let message = format!("cannot create {:?}: {e:#}", self.destination_dir);
            for root in roots {
                reports.push(RootReport {
                    root: root.clone(),
                    outcome: RootOutcome::Failed {
                        message: message.clone(),
                    },
                });
            }
        } else {
            for root in roots {
                let outcome = match owners.get(root) {
                    Some(owner) => RootOutcome::Skipped {
                        reason: format!("claimed by '{}'", owner),
                    },
                    None if enabled => self.link_root(root),
                    None => self.unlink_root(root),
                };
                debug!("{}: {:?}", root, outcome);
                reports.push(RootReport {
                    root: root.clone(),
                    outcome,
                });
            }
        }

        ToggleReport {
            mod_name: mod_name.to_string(),
            enabled,
            roots: reports,
            committed: false,
        }
    }

    /// Enable or disable a staged mod.
    ///
    /// All roots are processed. Any failed root is an [`Error::Link`] and the
    /// status stays as it was. Roots held by another enabled mod or by real
    /// files are skipped; an enable where every root was skipped commits
    /// nothing.
    #[tracing::instrument(skip(self, ledger))]
    pub fn set_enabled(
        &self,
        ledger: &StagingLedgerStore<'_, R>,
        mod_name: &str,
        enabled: bool,
    ) -> Result<ToggleReport> {
        let staged = ledger.load()?;
        let record = staged
            .mods
            .get(mod_name)
            .ok_or_else(|| Error::ModNotFound(mod_name.to_string()))?;
        let owners = staged.root_owners(mod_name, true);
        let mut report = self.apply_with_owners(mod_name, &record.mod_files, enabled, &owners);

        let failures = report.failures();
        if !failures.is_empty() {
            return Err(Error::Link {
                mod_name: mod_name.to_string(),
                failures,
            });
        }

        for skipped in report.skipped() {
            if let RootOutcome::Skipped { reason } = &skipped.outcome {
                warn!("'{}': skipped {} ({})", mod_name, skipped.root, reason);
            }
        }

        if enabled && report.satisfied() == 0 {
            warn!("'{}': no root could be linked; status left unchanged", mod_name);
            return Ok(report);
        }

        ledger.set_status(mod_name, ModStatus::from_enabled(enabled))?;
        report.committed = true;
        info!(
            "{} '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            mod_name
        );
        Ok(report)
    }

    /// Remove a mod: its links, its staged roots, then its ledger record.
    ///
    /// Links held for another enabled mod stay, and staged roots that another
    /// record still lists are kept. Returns the roots deleted from staging.
    #[tracing::instrument(skip(self, ledger))]
    pub fn uninstall(&self, ledger: &StagingLedgerStore<'_, R>, mod_name: &str) -> Result<Vec<String>> {
        let staged = ledger.load()?;
        let record = staged
            .mods
            .get(mod_name)
            .ok_or_else(|| Error::ModNotFound(mod_name.to_string()))?;
        let report = self.apply_with_owners(
            mod_name,
            &record.mod_files,
            false,
            &staged.root_owners(mod_name, true),
        );
        let failures = report.failures();
        if !failures.is_empty() {
            return Err(Error::Link {
                mod_name: mod_name.to_string(),
                failures,
            });
        }

        let removed = unshared_roots(&staged, mod_name);
        self.remove_staged(&removed)?;
        ledger.remove_staging(mod_name)?;
        info!("Uninstalled '{}'", mod_name);
        Ok(removed)
    }

    pub fn remove_staged(&self, roots: &[String]) -> Result<()> {
        remove_staged(self.runtime, &self.staging_dir, roots)
    }
}

/// Roots of `mod_name` that no other staging record lists.
pub fn unshared_roots(ledger: &StagingLedger, mod_name: &str) -> Vec<String> {
    let owners = ledger.root_owners(mod_name, false);
    ledger
        .mods
        .get(mod_name)
        .map(|record| {
            record
                .mod_files
                .iter()
                .filter(|root| {
                    let shared = owners.get(root.as_str());
                    if let Some(owner) = shared {
                        debug!("Keeping staged {} for '{}'", root, owner);
                    }
                    shared.is_none()
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Delete staged roots from disk. Missing roots are ignored.
pub fn remove_staged<R: Runtime>(runtime: &R, staging_dir: &Path, roots: &[String]) -> Result<()> {
    for root in roots {
        let source = staging_dir.join(root);
        if !runtime.occupied(&source) {
            continue;
        }
        runtime
            .remove_entry(&source)
            .map_err(|e| Error::extraction(&source, format!("cannot remove staged root: {e:#}")))?;
    }
    Ok(())
}
