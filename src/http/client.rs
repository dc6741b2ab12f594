//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, RETRY_DELAY_MS, check_retryable, is_retryable};

pub const APPLICATION_NAME: &str = "Nomm";
pub const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a reqwest client carrying the Nexus API headers.
pub fn build_client(api_key: Option<&str>, connect_timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        let mut value =
            HeaderValue::from_str(key.trim()).context("API key contains invalid characters")?;
        value.set_sensitive(true);
        headers.insert("apikey", value);
    }
    headers.insert("application-name", HeaderValue::from_static(APPLICATION_NAME));
    headers.insert(
        "application-version",
        HeaderValue::from_static(APPLICATION_VERSION),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("{}/{}", APPLICATION_NAME, APPLICATION_VERSION))
            .context("Invalid user agent")?,
    );

    Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// HTTP client with built-in retry logic for network operations.
///
/// `timeout` bounds each JSON request as a whole and each read while
/// streaming a download, so large files are not cut off.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Performs a GET request and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    /// Performs a GET request with query parameters and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .timeout(self.timeout)
                .send()
                .await
                .context("Failed to send request")?;

            let response = response.error_for_status().map_err(check_retryable)?;

            response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")
        })
        .await
    }

    /// Downloads `url` into the writer made by `create_writer`.
    /// Automatically retries on transient errors; every attempt starts a fresh writer.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);
        self.with_retry("Download", || self.download_file_once(url, &create_writer))
            .await
    }

    /// Single download attempt without retry.
    async fn download_file_once<W, F>(&self, url: &str, create_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| anyhow!("Timed out waiting for the server after {}s", self.timeout.as_secs()))?
            .context("Failed to start download request")?;

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        loop {
            let chunk = tokio::time::timeout(self.timeout, response.chunk())
                .await
                .map_err(|_| anyhow!("Download stalled for {}s", self.timeout.as_secs()))?
                .context("Failed to read chunk from download stream")?;
            let Some(chunk) = chunk else {
                break;
            };
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({:#}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                        );
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::NonRetryableError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> HttpClient {
        HttpClient::new(Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/v1/games/gamex/mods/42.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "My Mod", "version": "1.1"}"#)
            .create_async()
            .await;

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct ModInfo {
            name: String,
            version: String,
        }

        let result: ModInfo = client()
            .get_json(&format!("{}/v1/games/gamex/mods/42.json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.version, "1.1");
    }

    #[tokio::test]
    async fn test_get_json_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/missing.json")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result: Result<serde_json::Value> = client()
            .get_json(&format!("{}/missing.json", server.url()))
            .await;

        mock.assert_async().await;
        assert!(result.unwrap_err().downcast_ref::<NonRetryableError>().is_some());
    }

    #[tokio::test]
    async fn test_get_json_with_query() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/download_link.json?key=abc&expires=123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"URI": "https://cdn/x.zip"}]"#)
            .create_async()
            .await;

        let result: serde_json::Value = client()
            .get_json_with_query(
                &format!("{}/download_link.json", server.url()),
                &[("key", "abc"), ("expires", "123")],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result[0]["URI"], "https://cdn/x.zip");
    }

    #[tokio::test]
    async fn test_build_client_sends_api_headers() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/validate.json")
            .match_header("apikey", "secret")
            .match_header("Application-Name", "Nomm")
            .match_header("Application-Version", APPLICATION_VERSION)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let http = HttpClient::new(
            build_client(Some("secret"), Duration::from_secs(5)).unwrap(),
            Duration::from_secs(5),
        );
        let _: serde_json::Value = http
            .get_json(&format!("{}/validate.json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_build_client_rejects_bad_key() {
        assert!(build_client(Some("bad\nkey"), Duration::from_secs(1)).is_err());
        assert!(build_client(None, Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/mymod.zip")
            .with_status(200)
            .with_body("zip bytes!")
            .create_async()
            .await;

        let bytes = client()
            .download_file(&format!("{}/mymod.zip", server.url()), || {
                Ok(std::io::sink())
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 10);
    }

    #[tokio::test]
    async fn test_download_file_forbidden() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/mymod.zip")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let result = client()
            .download_file(&format!("{}/mymod.zip", server.url()), || {
                Ok(std::io::sink())
            })
            .await;

        mock.assert_async().await;
        assert!(result.unwrap_err().to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient_errors() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();

        let result = client()
            .with_retry("test", || {
                let count = counter.clone();
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err::<&str, _>(anyhow!("connection reset"))
                    } else {
                        Ok("success after retries")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success after retries");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_retries() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();

        let result = client()
            .with_retry("test", || {
                let count = counter.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow!("connection timeout"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), MAX_RETRIES);
    }
}
