use anyhow::Result;
use std::path::PathBuf;

use super::GameContext;
use crate::archive::Inspection;
use crate::cleanup::{new_shared, spawn_ctrl_c_handler};
use crate::deploy::RootOutcome;
use crate::runtime::Runtime;

/// Print every staged mod with its status, drift and pending update.
#[tracing::instrument(skip(runtime, data_dir))]
pub fn list<R: Runtime + 'static>(runtime: R, data_dir: Option<PathBuf>, game: &str) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let manager = ctx.manager();
    let states = manager.mod_states()?;

    if states.is_empty() {
        println!("No mods installed.");
    }
    for state in &states {
        let mut line = format!(
            "{:<8} {} {}",
            state.status.to_string(),
            state.name,
            state.version.as_deref().unwrap_or("(unknown)")
        );
        if state.update_available
            && let Some(new) = &state.new_version
        {
            line.push_str(&format!(" (update: {})", new));
        }
        if state.has_drift() {
            line.push_str(&format!(" [missing: {}]", state.missing_files.join(", ")));
        }
        println!("{}", line);
    }

    let summary = manager.summary()?;
    println!(
        "{} enabled, {} disabled, {}/{} downloads installed",
        summary.enabled, summary.disabled, summary.downloads_installed, summary.downloads_available
    );
    Ok(())
}

/// Describe an archive's installer options, if any.
#[tracing::instrument(skip(runtime, data_dir))]
pub fn inspect<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
    file_name: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    match ctx.manager().inspect(file_name)? {
        Inspection::Plain => println!("{}: plain archive", file_name),
        Inspection::MultiOption {
            module_name,
            options,
        } => {
            println!("{}: {} ({} options)", file_name, module_name, options.len());
            for option in options {
                println!("  {} [{}]", option.name, option.source_folder);
                println!("      {}", option.description);
            }
        }
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, data_dir))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
    file_name: &str,
    option: Option<&str>,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;

    let cleanup = new_shared();
    let ctrl_c = spawn_ctrl_c_handler(cleanup.clone());

    let manager = ctx.manager().with_cleanup(cleanup);
    let selected = manager.select_option(file_name, option)?;
    let result = manager.install(file_name, selected.as_ref());
    ctrl_c.abort();

    let outcome = result?;
    println!(
        "Installed '{}': {} ({})",
        outcome.mod_name,
        outcome.manifest.join(", "),
        outcome.status
    );
    if !outcome.removed_roots.is_empty() {
        println!("Removed old files: {}", outcome.removed_roots.join(", "));
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, data_dir))]
pub fn set_enabled<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
    mod_name: &str,
    enabled: bool,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let report = ctx.manager().set_enabled(mod_name, enabled)?;

    for root in &report.roots {
        if let RootOutcome::Skipped { reason } = &root.outcome {
            println!("Skipped {}: {}", root.root, reason);
        }
    }
    if report.committed {
        println!(
            "{} '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            mod_name
        );
    } else {
        println!("Nothing could be linked; '{}' stays disabled", mod_name);
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, data_dir))]
pub fn uninstall<R: Runtime + 'static>(
    runtime: R,
    data_dir: Option<PathBuf>,
    game: &str,
    mod_name: &str,
) -> Result<()> {
    let ctx = GameContext::load(runtime, data_dir, game)?;
    let removed = ctx.manager().uninstall(mod_name)?;
    println!("Uninstalled '{}' ({} root(s) removed)", mod_name, removed.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::DataRoot;
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::ledger::{ModStatus, StagingLedgerStore};
    use crate::runtime::RealRuntime;

    #[tokio::test]
    async fn test_install_list_uninstall() {
        let data = DataRoot::new();
        write_zip(&data.archive("mymod.zip"), &[("MyModFolder/a.txt", "a")]);

        install(RealRuntime, Some(data.path()), "Game X", "mymod.zip", None)
            .await
            .unwrap();
        let ledger = StagingLedgerStore::new(&RealRuntime, &data.staging());
        assert_eq!(ledger.get("mymod").unwrap().status, ModStatus::Disabled);

        list(RealRuntime, Some(data.path()), "gamex").unwrap();
        inspect(RealRuntime, Some(data.path()), "gamex", "mymod.zip").unwrap();

        uninstall(RealRuntime, Some(data.path()), "gamex", "mymod").unwrap();
        assert!(ledger.load().unwrap().mods.is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_unknown_option() {
        let data = DataRoot::new();
        write_zip(&data.archive("mymod.zip"), &[("MyModFolder/a.txt", "a")]);

        let err = install(
            RealRuntime,
            Some(data.path()),
            "gamex",
            "mymod.zip",
            Some("Red"),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no installer options"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enable_and_disable() {
        let data = DataRoot::new();
        write_zip(&data.archive("mymod.zip"), &[("MyModFolder/a.txt", "a")]);
        install(RealRuntime, Some(data.path()), "gamex", "mymod.zip", None)
            .await
            .unwrap();

        set_enabled(RealRuntime, Some(data.path()), "gamex", "mymod", true).unwrap();
        assert!(data.mods().join("MyModFolder").is_symlink());

        set_enabled(RealRuntime, Some(data.path()), "gamex", "mymod", false).unwrap();
        assert!(!data.mods().join("MyModFolder").exists());
    }
}
