//! Application layer: the use cases the CLI (or any other front end) calls.
//!
//! [`ModManager`] binds one game's resolved paths to the engine components
//! and is the single writer for that game's ledgers. Background work
//! (downloads, update queries) hands its results back to it.

mod install;
mod lifecycle;
mod status;
mod sync;

pub use install::InstallOutcome;
pub use status::{DownloadState, ModState, Summary};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::ArchiveExtractor;
use crate::cleanup::SharedCleanupContext;
use crate::config::{GamePaths, UserConfig};
use crate::deploy::Deployer;
use crate::error::Result;
use crate::ledger::{DownloadLedgerStore, ReinstallStatus, StagingLedgerStore};
use crate::runtime::Runtime;

pub struct ModManager<'a, R: Runtime + 'static, A: ArchiveExtractor> {
    runtime: &'a R,
    archives: &'a A,
    paths: GamePaths,
    reinstall: ReinstallStatus,
    archive_timeout: Option<Duration>,
    cleanup: Option<SharedCleanupContext>,
}

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> ModManager<'a, R, A> {
    pub fn new(runtime: &'a R, archives: &'a A, paths: GamePaths) -> Self {
        Self {
            runtime,
            archives,
            paths,
            reinstall: ReinstallStatus::default(),
            archive_timeout: None,
            cleanup: None,
        }
    }

    /// Apply the engine settings from the user config.
    pub fn with_settings(mut self, config: &UserConfig) -> Self {
        self.reinstall = config.reinstall_status;
        self.archive_timeout = Some(config.archive_timeout());
        self
    }

    pub fn with_reinstall_status(mut self, reinstall: ReinstallStatus) -> Self {
        self.reinstall = reinstall;
        self
    }

    pub fn with_archive_timeout(mut self, timeout: Duration) -> Self {
        self.archive_timeout = Some(timeout);
        self
    }

    pub fn with_cleanup(mut self, ctx: SharedCleanupContext) -> Self {
        self.cleanup = Some(ctx);
        self
    }

    pub fn paths(&self) -> &GamePaths {
        &self.paths
    }

    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        self.paths.downloads_dir.join(file_name)
    }

    fn downloads(&self) -> DownloadLedgerStore<'a, R> {
        DownloadLedgerStore::new(self.runtime, &self.paths.downloads_dir)
    }

    fn staging(&self) -> StagingLedgerStore<'a, R> {
        StagingLedgerStore::new(self.runtime, &self.paths.staging_dir)
    }

    fn deployer(&self) -> Result<Deployer<'a, R>> {
        let destination = self.paths.destination()?;
        Ok(Deployer::new(self.runtime, &self.paths.staging_dir, destination))
    }

    /// Deployer when the game's mod folder is known.
    fn try_deployer(&self) -> Option<Deployer<'a, R>> {
        self.paths
            .destination_dir
            .as_deref()
            .map(|dest: &Path| Deployer::new(self.runtime, &self.paths.staging_dir, dest))
    }
}
