use anyhow::Result;
use std::path::PathBuf;

use super::GameContext;
use super::config::build_catalog;
use crate::runtime::Runtime;

/// Check every staged mod against the catalog and record new versions.
#[tracing::instrument(skip(runtime, data_dir))]
pub async fn check_updates<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let catalog = build_catalog(&ctx.user)?;
    let report = ctx.manager().check_updates(&catalog).await?;

    for update in &report.updates {
        println!("{}: new version {}", update.mod_name, update.new_version);
        if let Some(changelog) = update.changelog.as_deref().filter(|c| !c.is_empty()) {
            for line in changelog.lines() {
                println!("    {}", line);
            }
        }
    }
    for failure in &report.failures {
        eprintln!("warning: could not check {}: {}", failure.mod_name, failure.message);
    }
    if report.updates.is_empty() && report.failures.is_empty() {
        println!("All {} checked mod(s) are up to date.", report.checked);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::DataRoot;
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::ledger::{DownloadLedgerStore, DownloadRecord, LedgerInfo, StagingLedgerStore};
    use crate::runtime::RealRuntime;
    use std::fs;

    #[tokio::test]
    async fn test_check_updates_records_new_version() {
        let mut server = mockito::Server::new_async().await;
        let _info = server
            .mock("GET", "/v1/games/gamex/mods/42.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "1.1"}"#)
            .create_async()
            .await;
        let _logs = server
            .mock("GET", "/v1/games/gamex/mods/42/changelogs.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"1.1": ["Fixed crash"]}"#)
            .create_async()
            .await;

        let data = DataRoot::new();
        let config = data.path().join("user_config.yaml");
        let mut yaml = fs::read_to_string(&config).unwrap();
        yaml.push_str(&format!("api_url: {}\n", server.url()));
        fs::write(&config, yaml).unwrap();

        write_zip(&data.archive("mymod.zip"), &[("MyModFolder/a.txt", "a")]);
        DownloadLedgerStore::new(&RealRuntime, &data.downloads())
            .record_download(
                "mymod.zip",
                DownloadRecord {
                    name: Some("My Mod".into()),
                    version: Some("1.0".into()),
                    mod_id: Some("42".into()),
                    ..DownloadRecord::default()
                },
                Some(LedgerInfo {
                    game: Some("Game X".into()),
                    nexus_game_id: Some("gamex".into()),
                }),
            )
            .unwrap();
        super::super::install(RealRuntime, Some(data.path()), "gamex", "mymod.zip", None)
            .await
            .unwrap();

        check_updates(RealRuntime, Some(data.path()), "gamex")
            .await
            .unwrap();

        let record = StagingLedgerStore::new(&RealRuntime, &data.staging())
            .get("My Mod")
            .unwrap();
        assert_eq!(record.new_version.as_deref(), Some("1.1"));
        assert_eq!(record.changelog, "Fixed crash");
    }
}
