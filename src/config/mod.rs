//! User and per-game configuration.
//!
//! Layout under the data root (`<data_dir>/nomm` unless overridden):
//!
//! - `user_config.yaml`: API key, download/staging roots and engine settings.
//! - `game_configs/*.yaml`: one file per game with its install and mod paths.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ledger::ReinstallStatus;
use crate::nexus::DEFAULT_API_URL;
use crate::runtime::Runtime;

pub const API_KEY_ENV: &str = "NOMM_API_KEY";
pub const DATA_DIR_ENV: &str = "NOMM_DATA_DIR";
pub const USER_CONFIG_FILE: &str = "user_config.yaml";
pub const GAME_CONFIGS_DIR: &str = "game_configs";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexus_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_path: Option<PathBuf>,
    pub reinstall_status: ReinstallStatus,
    pub network_timeout_secs: u64,
    pub archive_timeout_secs: u64,
    pub api_url: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            nexus_api_key: None,
            download_path: None,
            staging_path: None,
            reinstall_status: ReinstallStatus::default(),
            network_timeout_secs: 30,
            archive_timeout_secs: 600,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl UserConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs.max(1))
    }
}

/// One `game_configs/*.yaml` document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct GameConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_path: Option<PathBuf>,
    /// Mod folder relative to `game_path`.
    #[serde(default)]
    pub mods_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nexus_game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl GameConfig {
    /// True when `query` names this game by slug or by Nexus game id.
    pub fn matches(&self, query: &str) -> bool {
        let target = slug(query);
        if !target.is_empty() && slug(&self.name) == target {
            return true;
        }
        self.nexus_game_id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(query.trim()))
    }
}

/// Lowercase ASCII letters and digits only: "Baldur's Gate 3" -> "baldursgate3".
pub fn slug(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Directories one game's mods live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePaths {
    pub staging_dir: PathBuf,
    pub downloads_dir: PathBuf,
    /// Mod folder inside the game install; `None` until the game is located.
    pub destination_dir: Option<PathBuf>,
}

impl GamePaths {
    pub fn resolve(user: &UserConfig, game: &GameConfig) -> Result<Self> {
        let staging_root = user
            .staging_path
            .as_ref()
            .ok_or_else(|| Error::Config("staging_path is not set in user_config.yaml".into()))?;

        let downloads_dir = match (&game.downloads_path, &user.download_path) {
            (Some(path), _) => path.clone(),
            (None, Some(root)) => root.join(&game.name),
            (None, None) => {
                return Err(Error::Config(format!(
                    "No downloads folder for '{}': set downloads_path in its game config or download_path in user_config.yaml",
                    game.name
                )));
            }
        };

        Ok(Self {
            staging_dir: staging_root.join(&game.name),
            downloads_dir,
            destination_dir: game.game_path.as_ref().map(|p| p.join(&game.mods_path)),
        })
    }

    pub fn destination(&self) -> Result<&Path> {
        self.destination_dir
            .as_deref()
            .ok_or_else(|| Error::Config("game_path is not set for this game".into()))
    }
}

/// The data root: the explicit override, else `<data_dir>/nomm`.
pub fn data_root<R: Runtime>(runtime: &R, override_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(expand_home(runtime, &dir));
    }
    runtime
        .data_dir()
        .map(|dir| dir.join("nomm"))
        .ok_or_else(|| Error::Config("Cannot determine the user data directory".into()))
}

/// Replace a leading `~` with the home directory.
pub fn expand_home<R: Runtime>(runtime: &R, path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => runtime
            .home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Reads configuration documents from one data root.
pub struct ConfigStore<'a, R: Runtime> {
    runtime: &'a R,
    root: PathBuf,
}

impl<'a, R: Runtime> ConfigStore<'a, R> {
    pub fn new(runtime: &'a R, root: PathBuf) -> Self {
        Self { runtime, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load `user_config.yaml`. A missing file gives the defaults.
    /// `NOMM_API_KEY` takes precedence over the stored key.
    #[tracing::instrument(skip(self))]
    pub fn load_user(&self) -> Result<UserConfig> {
        let path = self.root.join(USER_CONFIG_FILE);
        let mut config = if self.runtime.exists(&path) {
            let content = self
                .runtime
                .read_to_string(&path)
                .map_err(|e| Error::Config(format!("Cannot read {:?}: {:#}", path, e)))?;
            if content.trim().is_empty() {
                UserConfig::default()
            } else {
                serde_yaml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Cannot parse {:?}: {}", path, e)))?
            }
        } else {
            debug!("No user config at {:?}; using defaults", path);
            UserConfig::default()
        };

        if let Ok(key) = self.runtime.env_var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            config.nexus_api_key = Some(key);
        }

        config.download_path = config
            .download_path
            .map(|p| expand_home(self.runtime, &p));
        config.staging_path = config.staging_path.map(|p| expand_home(self.runtime, &p));
        Ok(config)
    }

    /// Every readable game config, in file name order. Broken files are skipped.
    pub fn games(&self) -> Result<Vec<GameConfig>> {
        let dir = self.root.join(GAME_CONFIGS_DIR);
        if !self.runtime.is_dir(&dir) {
            return Ok(Vec::new());
        }

        let mut files = self
            .runtime
            .read_dir(&dir)
            .map_err(|e| Error::Config(format!("Cannot list {:?}: {:#}", dir, e)))?;
        files.sort();

        let mut games = Vec::new();
        for file in files {
            let is_yaml = file
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !is_yaml {
                continue;
            }
            let parsed = self
                .runtime
                .read_to_string(&file)
                .and_then(|content| Ok(serde_yaml::from_str::<GameConfig>(&content)?));
            match parsed {
                Ok(mut game) => {
                    game.game_path = game.game_path.map(|p| expand_home(self.runtime, &p));
                    game.downloads_path =
                        game.downloads_path.map(|p| expand_home(self.runtime, &p));
                    games.push(game);
                }
                Err(e) => warn!("Skipping game config {:?}: {:#}", file, e),
            }
        }
        Ok(games)
    }

    /// Find a game by name slug or Nexus game id.
    pub fn find_game(&self, query: &str) -> Result<GameConfig> {
        self.games()?
            .into_iter()
            .find(|game| game.matches(query))
            .ok_or_else(|| Error::Config(format!("No game config matches '{}'", query)))
    }
}
