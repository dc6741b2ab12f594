use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Game identity shared by both ledgers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub nexus_game_id: Option<String>,
}

/// Contents of `<downloads>/.downloads.nomm.yaml`, keyed by archive file name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DownloadLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<LedgerInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mods: BTreeMap<String, DownloadRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub changelog: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub mod_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_link: Option<String>,
}

/// Contents of `<staging>/.staging.nomm.yaml`, keyed by mod name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StagingLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<LedgerInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mods: BTreeMap<String, StagingRecord>,
}

impl StagingLedger {
    /// Roots listed by mods other than `except`, mapped to the first mod listing them.
    /// With `enabled_only` only enabled mods count.
    pub fn root_owners(&self, except: &str, enabled_only: bool) -> BTreeMap<String, String> {
        let mut owners = BTreeMap::new();
        for (name, record) in &self.mods {
            if name == except || (enabled_only && !record.status.is_enabled()) {
                continue;
            }
            for root in &record.mod_files {
                owners.entry(root.clone()).or_insert_with(|| name.clone());
            }
        }
        owners
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModStatus {
    Enabled,
    #[default]
    Disabled,
}

impl ModStatus {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            ModStatus::Enabled
        } else {
            ModStatus::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == ModStatus::Enabled
    }
}

impl fmt::Display for ModStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModStatus::Enabled => write!(f, "enabled"),
            ModStatus::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct StagingRecord {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub changelog: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_link: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub mod_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub new_version: Option<String>,
    /// Top-level names this mod placed directly under the staging dir.
    #[serde(default, deserialize_with = "null_as_default")]
    pub mod_files: Vec<String>,
    #[serde(default)]
    pub status: ModStatus,
}

/// Accept `42`, `"42"`, `1.5` or null for fields hand-edited or written by other tools.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(
        Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }),
    )
}

/// An explicit `mods: null` or `mod_files: ~` reads as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
