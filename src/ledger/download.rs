use std::path::{Path, PathBuf};

use super::DOWNLOAD_LEDGER_FILE;
use super::records::{DownloadLedger, DownloadRecord, LedgerInfo};
use super::store::LedgerFile;
use crate::error::Result;
use crate::runtime::Runtime;

/// The download ledger of one downloads directory.
pub struct DownloadLedgerStore<'a, R: Runtime> {
    file: LedgerFile<'a, R, DownloadLedger>,
}

impl<'a, R: Runtime> DownloadLedgerStore<'a, R> {
    pub fn new(runtime: &'a R, downloads_dir: &Path) -> Self {
        Self {
            file: LedgerFile::new(runtime, downloads_dir.join(DOWNLOAD_LEDGER_FILE)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    pub fn load(&self) -> Result<DownloadLedger> {
        self.file.load()
    }

    /// Create or replace the record for `archive_filename`.
    ///
    /// `info` only fills the ledger's info block when it has none yet.
    #[tracing::instrument(skip(self, record, info))]
    pub fn record_download(
        &self,
        archive_filename: &str,
        record: DownloadRecord,
        info: Option<LedgerInfo>,
    ) -> Result<()> {
        self.file.update(|ledger| {
            if ledger.info.is_none() {
                ledger.info = info;
            }
            ledger.mods.insert(archive_filename.to_string(), record);
            Ok(())
        })
    }

    /// Drop the record for `archive_filename`. Returns whether one existed.
    pub fn remove_download(&self, archive_filename: &str) -> Result<bool> {
        let mut ledger = self.file.load()?;
        if ledger.mods.remove(archive_filename).is_none() {
            return Ok(false);
        }
        self.file.save(&ledger)?;
        Ok(true)
    }
}
