use anyhow::Result;
use log::debug;

use crate::config::UserConfig;
use crate::http::{HttpClient, build_client};
use crate::nexus::NexusClient;

/// Nexus catalog client configured from the user config.
pub fn build_catalog(user: &UserConfig) -> Result<NexusClient> {
    let key = user.nexus_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
    if let Some(key) = key {
        debug!("Using Nexus API key: {}", mask(key));
    }

    let client = build_client(key, user.network_timeout())?;
    let http = HttpClient::new(client, user.network_timeout());
    Ok(NexusClient::new(http, Some(user.api_url.clone())))
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
