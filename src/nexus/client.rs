use anyhow::{Result, bail};
use async_trait::async_trait;
use log::debug;

use super::nxm::NxmLink;
use super::types::{Changelogs, DownloadLink, FileInfo, ModInfo};
use crate::http::HttpClient;

pub const DEFAULT_API_URL: &str = "https://api.nexusmods.com";

/// Remote mod catalog queried by the update sweep and the download worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModCatalog: Send + Sync {
    async fn mod_info(&self, game: &str, mod_id: &str) -> Result<ModInfo>;
    async fn changelogs(&self, game: &str, mod_id: &str) -> Result<Changelogs>;
    async fn file_info(&self, game: &str, mod_id: &str, file_id: &str) -> Result<FileInfo>;
    async fn download_links(&self, link: &NxmLink) -> Result<Vec<DownloadLink>>;
    fn api_url(&self) -> &str;
}

pub struct NexusClient {
    pub http: HttpClient,
    pub api_url: String,
}

impl NexusClient {
    #[tracing::instrument(skip(http, api_url))]
    pub fn new(http: HttpClient, api_url: Option<String>) -> Self {
        let api_url = api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self { http, api_url }
    }

    fn mod_url(&self, game: &str, mod_id: &str) -> String {
        format!("{}/v1/games/{}/mods/{}", self.api_url, game, mod_id)
    }
}

#[async_trait]
impl ModCatalog for NexusClient {
    #[tracing::instrument(skip(self))]
    async fn mod_info(&self, game: &str, mod_id: &str) -> Result<ModInfo> {
        let url = format!("{}.json", self.mod_url(game, mod_id));
        debug!("Fetching mod info from {}...", url);
        self.http.get_json(&url).await
    }

    #[tracing::instrument(skip(self))]
    async fn changelogs(&self, game: &str, mod_id: &str) -> Result<Changelogs> {
        let url = format!("{}/changelogs.json", self.mod_url(game, mod_id));
        debug!("Fetching changelogs from {}...", url);
        self.http.get_json(&url).await
    }

    #[tracing::instrument(skip(self))]
    async fn file_info(&self, game: &str, mod_id: &str, file_id: &str) -> Result<FileInfo> {
        let url = format!("{}/files/{}.json", self.mod_url(game, mod_id), file_id);
        debug!("Fetching file info from {}...", url);
        self.http.get_json(&url).await
    }

    #[tracing::instrument(skip(self, link))]
    async fn download_links(&self, link: &NxmLink) -> Result<Vec<DownloadLink>> {
        let url = format!(
            "{}/files/{}/download_link.json",
            self.mod_url(&link.game, &link.mod_id),
            link.file_id
        );
        debug!("Resolving download link for {}...", link);

        let mut query = Vec::new();
        if let Some(key) = &link.key {
            query.push(("key", key.as_str()));
        }
        if let Some(expires) = &link.expires {
            query.push(("expires", expires.as_str()));
        }

        let links: Vec<DownloadLink> = self.http.get_json_with_query(&url, &query).await?;
        if links.is_empty() {
            bail!("No download mirrors available for {}", link);
        }
        Ok(links)
    }

    fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;

    fn nexus(server: &mockito::Server) -> NexusClient {
        NexusClient::new(
            HttpClient::new(Client::new(), Duration::from_secs(5)),
            Some(format!("{}/", server.url())),
        )
    }

    #[test]
    fn test_default_api_url() {
        let client = NexusClient::new(
            HttpClient::new(Client::new(), Duration::from_secs(5)),
            None,
        );
        assert_eq!(client.api_url(), DEFAULT_API_URL);
    }

    #[tokio::test]
    async fn test_mod_info() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/games/gamex/mods/42.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "My Mod", "version": "1.1", "mod_id": 42}"#)
            .create_async()
            .await;

        let info = nexus(&server).mod_info("gamex", "42").await.unwrap();

        mock.assert_async().await;
        assert_eq!(info.version.as_deref(), Some("1.1"));
        assert_eq!(info.name.as_deref(), Some("My Mod"));
    }

    #[tokio::test]
    async fn test_changelogs() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/games/gamex/mods/42/changelogs.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"1.1": ["Fixed crash", "Faster load"]}"#)
            .create_async()
            .await;

        let logs = nexus(&server).changelogs("gamex", "42").await.unwrap();
        assert_eq!(
            logs["1.1"].clone().into_text(),
            "Fixed crash\nFaster load"
        );
    }

    #[tokio::test]
    async fn test_file_info() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/games/gamex/mods/42/files/7.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "Main File", "version": "2.0", "changelog_html": "<p>hi</p>"}"#)
            .create_async()
            .await;

        let info = nexus(&server).file_info("gamex", "42", "7").await.unwrap();
        assert_eq!(info.name.as_deref(), Some("Main File"));
        assert_eq!(info.changelog_html.as_deref(), Some("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_download_links_pass_key_and_expiry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/v1/games/gamex/mods/42/files/7/download_link.json?key=abc&expires=99",
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name": "CDN", "URI": "https://cdn.example/files/mymod.zip"}]"#)
            .create_async()
            .await;

        let link = NxmLink::parse("nxm://gamex/mods/42/files/7?key=abc&expires=99").unwrap();
        let links = nexus(&server).download_links(&link).await.unwrap();

        mock.assert_async().await;
        assert_eq!(links[0].uri, "https://cdn.example/files/mymod.zip");
    }

    #[tokio::test]
    async fn test_download_links_empty_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/games/gamex/mods/42/files/7/download_link.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let link = NxmLink::parse("nxm://gamex/mods/42/files/7").unwrap();
        let err = nexus(&server).download_links(&link).await.unwrap_err();
        assert!(err.to_string().contains("No download mirrors"));
    }

    #[tokio::test]
    async fn test_forbidden_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/games/gamex/mods/42.json")
            .with_status(403)
            .create_async()
            .await;

        let err = nexus(&server).mod_info("gamex", "42").await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }
}
