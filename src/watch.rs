//! Advisory watcher for a downloads directory.
//!
//! Events only tell the receiver to refresh what it shows. They may arrive
//! twice or out of order and never cause a ledger write.

use anyhow::{Context, Result};
use log::{debug, info};
use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

use crate::archive::is_archive_name;
use crate::download::PARTIAL_SUFFIX;
use crate::ledger::DOWNLOAD_LEDGER_FILE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Archive files were added, removed or renamed.
    DownloadsChanged { paths: Vec<PathBuf> },
}

/// Archive paths touched by `event`, ignoring the ledger and partial downloads.
pub fn archive_paths(event: &Event) -> Vec<PathBuf> {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    if !relevant {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
                return false;
            };
            name != DOWNLOAD_LEDGER_FILE
                && !name.ends_with(PARTIAL_SUFFIX)
                && is_archive_name(&name)
        })
        .cloned()
        .collect()
}

/// Keeps a non-recursive watch on one directory while alive.
pub struct DownloadsWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DownloadsWatcher {
    pub fn start(dir: &Path, events: UnboundedSender<WatchEvent>) -> Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let paths = archive_paths(&event);
                    if !paths.is_empty() {
                        let _ = events.send(WatchEvent::DownloadsChanged { paths });
                    }
                }
                Err(e) => debug!("Watch error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;
        info!("Watching {:?} for new downloads", dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
