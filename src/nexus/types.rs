use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mod page data returned by `/v1/games/{game}/mods/{id}.json`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ModInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One file of a mod, from `/files/{file_id}.json`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub changelog_html: Option<String>,
}

/// A mirror offered by `download_link.json`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadLink {
    #[serde(rename = "URI")]
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Changelog text for one version: either a list of lines or a single block.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChangelogEntry {
    Lines(Vec<String>),
    Text(String),
}

impl ChangelogEntry {
    pub fn into_text(self) -> String {
        match self {
            ChangelogEntry::Lines(lines) => lines.join("\n"),
            ChangelogEntry::Text(text) => text,
        }
    }
}

/// Changelogs keyed by version string.
pub type Changelogs = BTreeMap<String, ChangelogEntry>;
