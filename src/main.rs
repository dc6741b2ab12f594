use anyhow::Result;
use clap::Parser;
use nomm::commands;
use std::path::PathBuf;

/// nomm - mod manager for staged, symlinked game mods
///
/// Archives are extracted into a per-game staging folder and enabled by
/// linking their top-level entries into the game's mod folder.
///
/// Settings are read from user_config.yaml and game_configs/*.yaml under the
/// data directory. NOMM_API_KEY overrides the stored Nexus API key.
///
/// Examples:
///   nomm --game "Baldur's Gate 3" list
///   nomm --game bg3 install MyMod-1-0.zip --option "Main File"
///   nomm download "nxm://baldursgate3/mods/42/files/7?key=..&expires=.."
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Game name or Nexus game id, as in game_configs/*.yaml
    #[arg(long, short = 'g', env = "NOMM_GAME", value_name = "GAME", global = true)]
    pub game: Option<String>,

    /// Data directory holding the configs (default: <data dir>/nomm)
    #[arg(long = "data-dir", env = "NOMM_DATA_DIR", value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List staged mods with status, missing files and pending updates
    List,

    /// List archives in the downloads folder
    Downloads,

    /// Show whether an archive is plain or offers installer options
    Inspect(ArchiveArgs),

    /// Extract an archive into staging and record it
    Install(InstallArgs),

    /// Link a staged mod into the game
    Enable(ModArgs),

    /// Remove a staged mod's links from the game
    Disable(ModArgs),

    /// Remove a mod's links, staged files and record
    Uninstall(ModArgs),

    /// Delete a downloaded archive and its record
    RemoveDownload(ArchiveArgs),

    /// Look for new versions of staged mods
    CheckUpdates,

    /// Download an nxm:// link into the game's downloads folder
    Download(DownloadArgs),

    /// Report changes in the downloads folder until interrupted
    Watch,
}

#[derive(clap::Args, Debug)]
pub struct ArchiveArgs {
    /// Archive file name inside the downloads folder
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Archive file name inside the downloads folder
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Installer option to stage, for multi-option archives
    #[arg(long, short = 'o', value_name = "NAME")]
    pub option: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ModArgs {
    /// Mod name as shown by `nomm list`
    #[arg(value_name = "MOD")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// nxm://<game>/mods/<mod_id>/files/<file_id>?key=..&expires=..
    #[arg(value_name = "NXM_URL")]
    pub link: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = nomm::runtime::RealRuntime;
    let data_dir = cli.data_dir;
    let game = cli.game.as_deref();

    match cli.command {
        Commands::List => commands::list(runtime, data_dir, commands::require_game(game)?)?,
        Commands::Downloads => {
            commands::downloads(runtime, data_dir, commands::require_game(game)?)?
        }
        Commands::Inspect(args) => commands::inspect(
            runtime,
            data_dir,
            commands::require_game(game)?,
            &args.archive,
        )?,
        Commands::Install(args) => {
            commands::install(
                runtime,
                data_dir,
                commands::require_game(game)?,
                &args.archive,
                args.option.as_deref(),
            )
            .await?
        }
        Commands::Enable(args) => commands::set_enabled(
            runtime,
            data_dir,
            commands::require_game(game)?,
            &args.name,
            true,
        )?,
        Commands::Disable(args) => commands::set_enabled(
            runtime,
            data_dir,
            commands::require_game(game)?,
            &args.name,
            false,
        )?,
        Commands::Uninstall(args) => commands::uninstall(
            runtime,
            data_dir,
            commands::require_game(game)?,
            &args.name,
        )?,
        Commands::RemoveDownload(args) => commands::remove_download(
            runtime,
            data_dir,
            commands::require_game(game)?,
            &args.archive,
        )?,
        Commands::CheckUpdates => {
            commands::check_updates(runtime, data_dir, commands::require_game(game)?).await?
        }
        Commands::Download(args) => {
            commands::download(runtime, data_dir, game, &args.link).await?
        }
        Commands::Watch => {
            commands::watch(runtime, data_dir, commands::require_game(game)?).await?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from([
            "nomm", "--game", "gamex", "install", "mymod.zip", "--option", "Blue",
        ])
        .unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.archive, "mymod.zip");
                assert_eq!(args.option.as_deref(), Some("Blue"));
            }
            _ => panic!("Expected Install command"),
        }
        assert_eq!(cli.game.as_deref(), Some("gamex"));
    }

    #[test]
    fn test_cli_global_args_after_subcommand() {
        let cli =
            Cli::try_parse_from(["nomm", "list", "--game", "gamex", "--data-dir", "/tmp/nomm"])
                .unwrap();
        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/nomm")));
    }

    #[test]
    fn test_cli_subcommand_names() {
        assert!(matches!(
            Cli::try_parse_from(["nomm", "remove-download", "a.zip"]).unwrap().command,
            Commands::RemoveDownload(_)
        ));
        assert!(matches!(
            Cli::try_parse_from(["nomm", "check-updates"]).unwrap().command,
            Commands::CheckUpdates
        ));
        assert!(matches!(
            Cli::try_parse_from(["nomm", "download", "nxm://g/mods/1/files/2"])
                .unwrap()
                .command,
            Commands::Download(_)
        ));
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["nomm"]).is_err());
        assert!(Cli::try_parse_from(["nomm", "enable"]).is_err());
    }
}
