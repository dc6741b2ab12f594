use anyhow::{Result, bail};
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::GameContext;
use super::config::build_catalog;
use crate::cleanup::{new_shared, spawn_ctrl_c_handler};
use crate::download::{DownloadEvent, DownloadWorker};
use crate::nexus::NxmLink;
use crate::runtime::Runtime;
use crate::watch::{DownloadsWatcher, WatchEvent};

/// Print the archives in the game's downloads folder.
#[tracing::instrument(skip(runtime, data_dir))]
pub fn downloads<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let states = ctx.manager().download_states()?;

    if states.is_empty() {
        println!("No downloads in {}", ctx.paths.downloads_dir.display());
    }
    for state in states {
        println!(
            "{:<11} {} ({} {})",
            if state.installed { "installed" } else { "available" },
            state.file_name,
            state.mod_name,
            state.version.as_deref().unwrap_or("(unknown)")
        );
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, data_dir))]
pub fn remove_download<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
    file_name: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    if ctx.manager().delete_download(file_name)? {
        println!("Removed {}", file_name);
    } else {
        println!("No download named {}", file_name);
    }
    Ok(())
}

/// Fetch an `nxm://` link into the game's downloads folder and record it.
///
/// Without `game` the link's own game id selects the game config.
#[tracing::instrument(skip(runtime, data_dir))]
pub async fn download<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: Option<&str>,
    link: &str,
) -> Result<()> {
    let link = NxmLink::parse(link)?;
    let ctx = GameContext::load(runtime, data_dir, game.unwrap_or(&link.game))?;
    if ctx.user.nexus_api_key.is_none() {
        bail!("No Nexus API key: set nexus_api_key in user_config.yaml or NOMM_API_KEY");
    }

    let catalog = build_catalog(&ctx.user)?;
    let http = catalog.http.clone();

    let cleanup = new_shared();
    let ctrl_c = spawn_ctrl_c_handler(cleanup.clone());

    let GameContext {
        runtime,
        user,
        game,
        paths,
        archives,
    } = ctx;
    let runtime = Arc::new(runtime);

    let worker = Arc::new(
        DownloadWorker::new(runtime.clone(), Arc::new(catalog), http, &paths.downloads_dir)
            .with_game_name(game.name.clone())
            .with_cleanup(cleanup),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = worker.spawn(link, tx);

    let manager = crate::application::ModManager::new(runtime.as_ref(), &archives, paths)
        .with_settings(&user);

    let mut outcome = Ok(());
    while let Some(event) = rx.recv().await {
        match &event {
            DownloadEvent::Started { file_name, .. } => {
                println!("Downloading {} to {}...", file_name, game.name)
            }
            DownloadEvent::Completed(done) => {
                manager.apply_download_event(&event)?;
                println!("Saved {} ({} bytes)", done.path.display(), done.bytes);
            }
            DownloadEvent::Failed { message, .. } => {
                outcome = Err(anyhow::anyhow!("{}", message));
            }
        }
    }
    handle.wait().await;
    ctrl_c.abort();
    outcome
}

/// Print a refreshed downloads count whenever the folder changes, until Ctrl-C.
#[tracing::instrument(skip(runtime, data_dir))]
pub async fn watch<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let dir = ctx.paths.downloads_dir.clone();
    ctx.runtime.create_dir_all(&dir)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = DownloadsWatcher::start(&dir, tx)?;
    println!("Watching {} (Ctrl-C to stop)", dir.display());

    let manager = ctx.manager();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(WatchEvent::DownloadsChanged { paths }) = event else {
                    break;
                };
                debug!("Downloads changed: {:?}", paths);
                match manager.summary() {
                    Ok(summary) => println!(
                        "Downloads changed: {}/{} installed",
                        summary.downloads_installed, summary.downloads_available
                    ),
                    Err(e) => warn!("Cannot refresh summary: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::DataRoot;
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::ledger::{DownloadLedgerStore, DownloadRecord};
    use crate::runtime::RealRuntime;
    use std::fs;

    #[test]
    fn test_downloads_and_remove() {
        let data = DataRoot::new();
        write_zip(&data.archive("mymod.zip"), &[("A/a.txt", "a")]);
        DownloadLedgerStore::new(&RealRuntime, &data.downloads())
            .record_download("mymod.zip", DownloadRecord::default(), None)
            .unwrap();

        downloads(RealRuntime, Some(data.path()), "gamex").unwrap();
        remove_download(RealRuntime, Some(data.path()), "gamex", "mymod.zip").unwrap();

        assert!(!data.archive("mymod.zip").exists());
        let ledger = DownloadLedgerStore::new(&RealRuntime, &data.downloads())
            .load()
            .unwrap();
        assert!(ledger.mods.is_empty());
    }

    #[tokio::test]
    async fn test_download_from_nxm_link() {
        let mut server = mockito::Server::new_async().await;
        let cdn = format!("{}/cdn/mymod.zip", server.url());
        let _links = server
            .mock(
                "GET",
                "/v1/games/gamex/mods/42/files/7/download_link.json?key=k&expires=1",
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"[{{"URI": "{}"}}]"#, cdn))
            .create_async()
            .await;
        let _file = server
            .mock("GET", "/cdn/mymod.zip")
            .with_status(200)
            .with_body("PK")
            .create_async()
            .await;
        let _info = server
            .mock("GET", "/v1/games/gamex/mods/42/files/7.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "My Mod", "version": "1.2"}"#)
            .create_async()
            .await;

        let data = DataRoot::new();
        let config = data.path().join("user_config.yaml");
        let mut yaml = fs::read_to_string(&config).unwrap();
        yaml.push_str(&format!("nexus_api_key: secret\napi_url: {}\n", server.url()));
        fs::write(&config, yaml).unwrap();

        download(
            RealRuntime,
            Some(data.path()),
            None,
            "nxm://gamex/mods/42/files/7?key=k&expires=1",
        )
        .await
        .unwrap();

        assert_eq!(fs::read_to_string(data.archive("mymod.zip")).unwrap(), "PK");
        let ledger = DownloadLedgerStore::new(&RealRuntime, &data.downloads())
            .load()
            .unwrap();
        let record = &ledger.mods["mymod.zip"];
        assert_eq!(record.name.as_deref(), Some("My Mod"));
        assert_eq!(record.version.as_deref(), Some("1.2"));
        assert_eq!(ledger.info.unwrap().game.as_deref(), Some("Game X"));
    }

    #[tokio::test]
    async fn test_download_requires_api_key() {
        let data = DataRoot::new();
        let err = download(
            RealRuntime,
            Some(data.path()),
            Some("gamex"),
            "nxm://gamex/mods/42/files/7",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("No Nexus API key"));
    }
}
