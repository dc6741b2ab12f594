//! Download Worker.
//!
//! Fetches archives in the background and reports the outcome as a
//! [`DownloadEvent`]. The worker never touches a ledger: the receiver applies
//! a [`CompletedDownload`] to the download ledger from its own context.

use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::ledger::{DownloadRecord, LedgerInfo};
use crate::nexus::{ModCatalog, NxmLink};
use crate::runtime::{Runtime, RuntimeExt};
use anyhow::{Context, anyhow};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub const PARTIAL_SUFFIX: &str = ".part";

/// An archive that finished downloading, with the record to store for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedDownload {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub record: DownloadRecord,
    pub info: Option<LedgerInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started { source: String, file_name: String },
    Completed(CompletedDownload),
    Failed { source: String, message: String },
}

/// Path of the in-progress file for `target`.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Archive file name taken from the last segment of a download URI.
pub fn file_name_from_uri(uri: &str) -> anyhow::Result<String> {
    let url = url::Url::parse(uri).with_context(|| format!("Invalid download URI: {}", uri))?;
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string();

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return Err(anyhow!("Download URI has no usable file name: {}", uri));
    }
    Ok(name)
}

/// Download `url` to `target` through `<target>.part`.
///
/// The partial file is registered with `cleanup` while the transfer runs and
/// is left behind on failure.
#[tracing::instrument(skip(runtime, http, cleanup))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    http: &HttpClient,
    url: &str,
    target: &Path,
    cleanup: Option<&SharedCleanupContext>,
) -> anyhow::Result<u64> {
    info!("Downloading file from {}...", url);

    let part = partial_path(target);
    let guard = cleanup.map(|ctx| CleanupGuard::new(ctx.clone(), part.clone()));

    let bytes = http
        .download_file(url, || {
            runtime
                .create_file(&part)
                .with_context(|| format!("Failed to create file at {:?}", part))
        })
        .await?;

    if runtime.occupied(target) {
        runtime.remove_entry(target)?;
    }
    runtime
        .rename(&part, target)
        .with_context(|| format!("Failed to move download into place at {:?}", target))?;

    if let Some(guard) = guard {
        guard.success();
    }
    info!("Download complete: {:?}", target);
    Ok(bytes)
}

/// Background fetcher for `nxm://` links into one downloads directory.
pub struct DownloadWorker<R: Runtime> {
    runtime: Arc<R>,
    catalog: Arc<dyn ModCatalog>,
    http: HttpClient,
    downloads_dir: PathBuf,
    game_name: Option<String>,
    cleanup: Option<SharedCleanupContext>,
}

/// A running download. Cancelling it leaves the partial file in place.
pub struct DownloadHandle {
    task: JoinHandle<()>,
}

impl DownloadHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

impl<R: Runtime + 'static> DownloadWorker<R> {
    pub fn new(
        runtime: Arc<R>,
        catalog: Arc<dyn ModCatalog>,
        http: HttpClient,
        downloads_dir: &Path,
    ) -> Self {
        Self {
            runtime,
            catalog,
            http,
            downloads_dir: downloads_dir.to_path_buf(),
            game_name: None,
            cleanup: None,
        }
    }

    /// Game name written to the ledger info block. Defaults to the link's game.
    pub fn with_game_name(mut self, name: impl Into<String>) -> Self {
        self.game_name = Some(name.into());
        self
    }

    pub fn with_cleanup(mut self, ctx: SharedCleanupContext) -> Self {
        self.cleanup = Some(ctx);
        self
    }

    /// Run [`fetch_nxm`](Self::fetch_nxm) on a tokio task, reporting to `events`.
    pub fn spawn(
        self: Arc<Self>,
        link: NxmLink,
        events: UnboundedSender<DownloadEvent>,
    ) -> DownloadHandle {
        let task = tokio::spawn(async move {
            let source = link.to_string();
            let event = match self.fetch(&link, Some(&events)).await {
                Ok(done) => DownloadEvent::Completed(done),
                Err(e) => {
                    warn!("Download of {} failed: {}", source, e);
                    DownloadEvent::Failed {
                        source,
                        message: e.to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });
        DownloadHandle { task }
    }

    /// Resolve, download and describe one `nxm://` link.
    #[tracing::instrument(skip(self, link), fields(link = %link))]
    pub async fn fetch_nxm(&self, link: &NxmLink) -> Result<CompletedDownload> {
        self.fetch(link, None).await
    }

    async fn fetch(
        &self,
        link: &NxmLink,
        events: Option<&UnboundedSender<DownloadEvent>>,
    ) -> Result<CompletedDownload> {
        let network = |target: String| move |source: anyhow::Error| Error::Network { target, source };

        let mirrors = self
            .catalog
            .download_links(link)
            .await
            .map_err(network(link.to_string()))?;
        let uri = mirrors
            .first()
            .map(|m| m.uri.clone())
            .ok_or_else(|| Error::Network {
                target: link.to_string(),
                source: anyhow!("No download mirrors available"),
            })?;
        let file_name = file_name_from_uri(&uri).map_err(network(uri.clone()))?;

        if let Some(events) = events {
            let _ = events.send(DownloadEvent::Started {
                source: link.to_string(),
                file_name: file_name.clone(),
            });
        }

        self.runtime
            .create_dir_all(&self.downloads_dir)
            .map_err(network(uri.clone()))?;
        let path = self.downloads_dir.join(&file_name);
        let bytes = download_file(
            self.runtime.as_ref(),
            &self.http,
            &uri,
            &path,
            self.cleanup.as_ref(),
        )
        .await
        .map_err(network(uri.clone()))?;

        let record = self.describe(link, &file_name).await;
        let info = LedgerInfo {
            game: Some(self.game_name.clone().unwrap_or_else(|| link.game.clone())),
            nexus_game_id: Some(link.game.clone()),
        };

        Ok(CompletedDownload {
            file_name,
            path,
            bytes,
            record,
            info: Some(info),
        })
    }

    /// Download record from the file's catalog metadata, or from its file
    /// name when the lookup fails.
    async fn describe(&self, link: &NxmLink, file_name: &str) -> DownloadRecord {
        let base = DownloadRecord {
            mod_id: Some(link.mod_id.clone()),
            file_id: Some(link.file_id.clone()),
            mod_link: Some(link.mod_link()),
            ..DownloadRecord::default()
        };

        match self
            .catalog
            .file_info(&link.game, &link.mod_id, &link.file_id)
            .await
        {
            Ok(file) => DownloadRecord {
                name: Some(file.name.unwrap_or_else(|| "Unknown Mod".to_string())),
                version: Some(file.version.unwrap_or_else(|| "1.0".to_string())),
                changelog: file.changelog_html.unwrap_or_default(),
                ..base
            },
            Err(e) => {
                warn!("Could not retrieve mod metadata for {}: {:#}", link, e);
                let stem = Path::new(file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| file_name.to_string());
                DownloadRecord {
                    name: Some(stem),
                    ..base
                }
            }
        }
    }
}
