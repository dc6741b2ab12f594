//! Folding background results (update findings, finished downloads) into the
//! ledgers from the single-writer side.

use log::info;

use super::ModManager;
use crate::archive::ArchiveExtractor;
use crate::download::{CompletedDownload, DownloadEvent};
use crate::error::Result;
use crate::nexus::ModCatalog;
use crate::runtime::Runtime;
use crate::update::{UpdateChecker, UpdateReport};

impl<'a, R: Runtime + 'static, A: ArchiveExtractor> ModManager<'a, R, A> {
    /// Query the catalog for every staged mod and store the findings in one
    /// ledger write. Per-mod failures are returned in the report.
    #[tracing::instrument(skip(self, catalog))]
    pub async fn check_updates<C: ModCatalog + ?Sized>(&self, catalog: &C) -> Result<UpdateReport> {
        let staging = self.staging();
        let ledger = staging.load()?;
        let report = UpdateChecker::new(catalog).check(&ledger).await;

        if report.has_updates() {
            let applied = staging.apply_updates(&report.updates)?;
            info!("Recorded {} new version(s)", applied);
        }
        Ok(report)
    }

    /// Record a completed download. Other events change nothing.
    ///
    /// Returns the archive file name that was recorded.
    pub fn apply_download_event(&self, event: &DownloadEvent) -> Result<Option<String>> {
        match event {
            DownloadEvent::Completed(done) => {
                self.record_completed(done)?;
                Ok(Some(done.file_name.clone()))
            }
            DownloadEvent::Started { .. } | DownloadEvent::Failed { .. } => Ok(None),
        }
    }

    fn record_completed(&self, done: &CompletedDownload) -> Result<()> {
        self.downloads()
            .record_download(&done.file_name, done.record.clone(), done.info.clone())?;
        info!("Recorded download {}", done.file_name);
        Ok(())
    }
}
