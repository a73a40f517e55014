use std::time::Duration;

use reqwest::{Client, StatusCode};
use semver::Version;
use tracing::{debug, info, warn};

use super::model::UpdateManifest;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::version::is_newer;

/// Result of a manifest check that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestOutcome {
    UpdateAvailable(UpdateManifest),
    NoUpdate,
}

/// Fetches the "latest release" descriptor.
#[derive(Debug, Clone)]
pub struct ManifestClient {
    client: Client,
    endpoint: String,
}

impl ManifestClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the manifest and compare it with `current`, giving up after
    /// `timeout` with [`UpdaterError::Timeout`].
    pub async fn fetch(&self, current: &Version, timeout: Duration) -> UpdaterResult<ManifestOutcome> {
        info!("Checking for updates at {}", self.endpoint);

        let manifest = tokio::time::timeout(timeout, self.fetch_manifest())
            .await
            .map_err(|_| {
                warn!("Update check timed out after {:?}", timeout);
                UpdaterError::Timeout(timeout)
            })??;

        let Some(manifest) = manifest else {
            info!("Update server returned no manifest");
            return Ok(ManifestOutcome::NoUpdate);
        };

        if is_newer(&manifest.version, current) {
            info!("Update available: {} -> {}", current, manifest.version);
            Ok(ManifestOutcome::UpdateAvailable(manifest))
        } else {
            info!(
                "Already on latest version (current {}, latest {})",
                current, manifest.version
            );
            Ok(ManifestOutcome::NoUpdate)
        }
    }

    async fn fetch_manifest(&self) -> UpdaterResult<Option<UpdateManifest>> {
        let response = self.client.get(&self.endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                let remaining = response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                warn!("Update endpoint refused access (rate limit remaining: {})", remaining);
            }
            return Err(UpdaterError::HttpStatus {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!("Manifest body: {} bytes", body.len());
        UpdateManifest::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::{category_of, ErrorCategory};
    use crate::core::http::build_http_client;

    fn client_for(server: &mockito::Server) -> ManifestClient {
        let http = build_http_client("updater-tests", None).unwrap();
        ManifestClient::new(http, format!("{}/latest.json", server.url()))
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    const BODY: &str = r#"{
        "version": "1.2.0",
        "notes": "New",
        "pub_date": "2024-05-01T10:00:00Z",
        "platforms": { "windows-x86_64": { "url": "https://example.com/setup.exe" } }
    }"#;

    #[tokio::test]
    async fn newer_manifest_is_available() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/latest.json")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let outcome = client_for(&server)
            .fetch(&v("1.0.0"), Duration::from_secs(5))
            .await
            .unwrap();
        match outcome {
            ManifestOutcome::UpdateAvailable(m) => assert_eq!(m.version, v("1.2.0")),
            ManifestOutcome::NoUpdate => panic!("expected an update"),
        }
    }

    #[tokio::test]
    async fn equal_or_older_manifest_is_no_update() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/latest.json")
            .with_status(200)
            .with_body(BODY)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        let same = client.fetch(&v("1.2.0"), Duration::from_secs(5)).await.unwrap();
        let older = client.fetch(&v("2.0.0"), Duration::from_secs(5)).await.unwrap();
        assert_eq!(same, ManifestOutcome::NoUpdate);
        assert_eq!(older, ManifestOutcome::NoUpdate);
    }

    #[tokio::test]
    async fn null_body_is_no_update() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/latest.json")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let outcome = client_for(&server)
            .fetch(&v("1.0.0"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, ManifestOutcome::NoUpdate);
    }

    #[tokio::test]
    async fn http_statuses_are_classified() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server);

        for (status, category) in [
            (404, ErrorCategory::EndpointUnavailable),
            (403, ErrorCategory::AccessDenied),
            (502, ErrorCategory::Server),
        ] {
            let m = server
                .mock("GET", "/latest.json")
                .with_status(status)
                .create_async()
                .await;
            let err = client.fetch(&v("1.0.0"), Duration::from_secs(5)).await.unwrap_err();
            assert_eq!(category_of(&err), category, "status {}", status);
            m.remove_async().await;
        }
    }

    #[tokio::test]
    async fn malformed_manifest_is_format_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/latest.json")
            .with_status(200)
            .with_body(r#"{ "version": "1.2.0", "notes": "no platforms" }"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .fetch(&v("1.0.0"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(category_of(&err), ErrorCategory::ManifestFormat);
    }

    #[tokio::test]
    async fn silent_endpoint_times_out_at_the_bound() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let http = build_http_client("updater-tests", None).unwrap();
        let client = ManifestClient::new(http, format!("http://{}/latest.json", addr));

        let started = std::time::Instant::now();
        let err = client
            .fetch(&v("1.0.0"), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
