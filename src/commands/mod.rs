//! Command handlers behind the `nomm` binary.
//!
//! Each handler resolves the game's configuration, runs one use case on a
//! [`ModManager`] and prints the result.

use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::application::ModManager;
use crate::archive::Archives;
use crate::config::{ConfigStore, GameConfig, GamePaths, UserConfig, data_root};
use crate::runtime::Runtime;

pub mod config;
mod downloads;
mod mods;
mod updates;

pub use downloads::{download, downloads, remove_download, watch};
pub use mods::{inspect, install, list, set_enabled, uninstall};
pub use updates::check_updates;

/// Everything resolved for one game.
pub struct GameContext<R: Runtime> {
    pub runtime: R,
    pub user: UserConfig,
    pub game: GameConfig,
    pub paths: GamePaths,
    pub archives: Archives,
}

impl<R: Runtime + 'static> GameContext<R> {
    #[tracing::instrument(skip(runtime, data_dir))]
    pub fn load(runtime: R, data_dir: Option<PathBuf>, game: &str) -> Result<Self> {
        let root = data_root(&runtime, data_dir)?;
        debug!("Using data root {:?}", root);

        let store = ConfigStore::new(&runtime, root);
        let user = store.load_user()?;
        let game = store.find_game(game)?;
        let paths = GamePaths::resolve(&user, &game)?;
        debug!("Resolved paths for '{}': {:?}", game.name, paths);

        Ok(Self {
            runtime,
            user,
            game,
            paths,
            archives: Archives::new(),
        })
    }

    pub fn manager(&self) -> ModManager<'_, R, Archives> {
        ModManager::new(&self.runtime, &self.archives, self.paths.clone()).with_settings(&self.user)
    }
}

/// The `--game` value, or an error naming the command that needs it.
pub fn require_game(game: Option<&str>) -> Result<&str> {
    game.filter(|g| !g.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("--game is required (or set NOMM_GAME)"))
}
