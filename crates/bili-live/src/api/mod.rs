//! Account status query client.

mod models;

pub use models::{AccountProfile, LIVE_STATUS_STREAMING, LiveRoom, UserInfoResponse};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{LiveError, Result};

/// Default user info endpoint.
pub const DEFAULT_USER_INFO_URL: &str = "https://api.bilibili.com/x/space/acc/info";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Source of fresh account status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current public profile (including live room) of `account_id`.
    async fn fetch_profile(&self, account_id: u64) -> Result<AccountProfile>;
}

/// HTTP client for the user info endpoint.
#[derive(Debug, Clone)]
pub struct BiliApiClient {
    client: Client,
    user_info_url: String,
    timeout: Duration,
}

impl Default for BiliApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_USER_INFO_URL, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl BiliApiClient {
    pub fn new(user_info_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(Client::new(), user_info_url, timeout)
    }

    pub fn with_client(client: Client, user_info_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            user_info_url: user_info_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl StatusSource for BiliApiClient {
    async fn fetch_profile(&self, account_id: u64) -> Result<AccountProfile> {
        let resp: UserInfoResponse = self
            .client
            .get(&self.user_info_url)
            .query(&[("mid", account_id)])
            .header(reqwest::header::USER_AGENT, DEFAULT_UA)
            .header(reqwest::header::REFERER, "https://space.bilibili.com")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LiveError::status_query(account_id, format!("request failed: {e}")))?
            .json()
            .await
            .map_err(|e| LiveError::status_query(account_id, format!("invalid response: {e}")))?;

        if resp.code != 0 {
            debug!(account_id, code = resp.code, message = %resp.message, "User info API returned error");
            return Err(LiveError::status_query(
                account_id,
                format!("code {}: {}", resp.code, resp.message),
            ));
        }

        resp.data
            .ok_or_else(|| LiveError::status_query(account_id, "missing data field"))
    }
}
