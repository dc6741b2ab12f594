//! Metadata Ledger.
//!
//! Two YAML sidecar documents track mods through their lifecycle:
//!
//! - `<downloads>/.downloads.nomm.yaml`: one record per downloaded archive,
//!   keyed by file name.
//! - `<staging>/.staging.nomm.yaml`: one record per staged mod, keyed by mod
//!   name. Its `status` field is only changed through [`StagingLedgerStore`].
//!
//! Both stores assume a single writer per file.

mod download;
pub mod records;
mod staging;
mod store;

pub use download::DownloadLedgerStore;
pub use records::{
    DownloadLedger, DownloadRecord, LedgerInfo, ModStatus, StagingLedger, StagingRecord,
};
pub use staging::{ReinstallStatus, StagingLedgerStore, UpdateInfo, resolve_mod_name};
pub use store::LedgerFile;

pub const DOWNLOAD_LEDGER_FILE: &str = ".downloads.nomm.yaml";
pub const STAGING_LEDGER_FILE: &str = ".staging.nomm.yaml";
