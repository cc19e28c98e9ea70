//! reqwest-backed clients for the pro backend and avatar file server.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use taskmill_jobs::{AvatarFetcher, FetchError, RevocationApi, RevocationApiError, RevocationResponse};

/// Request body of `POST /get_pro_revocations`.
#[derive(Debug, Serialize)]
struct RevocationRequest {
    version: u8,
    ticket: u64,
}

/// Client for the pro backend revocation endpoint.
#[derive(Debug, Clone)]
pub struct HttpRevocationApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRevocationApi {
    /// `timeout` bounds a whole request; keep it below the job timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/get_pro_revocations", self.base_url)
    }
}

#[async_trait]
impl RevocationApi for HttpRevocationApi {
    async fn get_revocations(&self, ticket: u64) -> Result<RevocationResponse, RevocationApiError> {
        let resp = self
            .client
            .post(self.url())
            .json(&RevocationRequest { version: 0, ticket })
            .send()
            .await
            .map_err(|e| RevocationApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "revocation endpoint returned an error status");
            return Ok(RevocationResponse::status(status.as_u16()));
        }

        resp.json::<RevocationResponse>()
            .await
            .map_err(|e| RevocationApiError::Decode(e.to_string()))
    }
}

/// Plain GET downloader for avatar files.
#[derive(Debug, Clone)]
pub struct HttpAvatarFetcher {
    client: reqwest::Client,
}

impl HttpAvatarFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AvatarFetcher for HttpAvatarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("{url} returned {status}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
