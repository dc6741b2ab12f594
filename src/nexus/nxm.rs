//! `nxm://` link parsing.

use anyhow::{Context, Result, bail};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A parsed `nxm://<game>/mods/<mod_id>/files/<file_id>?key=..&expires=..` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NxmLink {
    /// Nexus game domain, lowercased.
    pub game: String,
    pub mod_id: String,
    pub file_id: String,
    pub key: Option<String>,
    pub expires: Option<String>,
}

impl NxmLink {
    pub fn parse(link: &str) -> Result<Self> {
        let url = Url::parse(link.trim()).with_context(|| format!("Invalid nxm link: {}", link))?;

        if url.scheme() != "nxm" {
            bail!("Not an nxm link: {}", link);
        }

        let game = url
            .host_str()
            .filter(|h| !h.is_empty())
            .with_context(|| format!("nxm link has no game: {}", link))?
            .to_lowercase();

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        let (mod_id, file_id) = match segments.as_slice() {
            ["mods", mod_id, "files", file_id, ..] => (mod_id.to_string(), file_id.to_string()),
            _ => bail!(
                "Expected nxm://<game>/mods/<mod_id>/files/<file_id>, got {}",
                link
            ),
        };

        let mut key = None;
        let mut expires = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "key" => key = Some(value.into_owned()),
                "expires" => expires = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            game,
            mod_id,
            file_id,
            key,
            expires,
        })
    }

    /// Public mod page for this link.
    pub fn mod_link(&self) -> String {
        format!("https://www.nexusmods.com/{}/mods/{}", self.game, self.mod_id)
    }
}

impl FromStr for NxmLink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NxmLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nxm://{}/mods/{}/files/{}",
            self.game, self.mod_id, self.file_id
        )
    }
}
