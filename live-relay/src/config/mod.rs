//! Relay configuration.
//!
//! Loaded once at startup from a TOML file:
//!
//! ```toml
//! polling_interval_secs = 60
//! danmu_forward_keywords = ["【", "同传"]
//!
//! [[subscriptions]]
//! group_id = 123456
//! accounts = [407106379, 1]
//!
//! [sink]
//! type = "webhook"
//! url = "https://example.com/hook"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use bili_live::ConnectionConfig;
use bili_live::api::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_INFO_URL};
use bili_live::connection::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_ATTEMPTS, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT, DEFAULT_WS_URL,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default status polling interval in seconds.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 60;

/// Default config file name.
pub const DEFAULT_CONFIG_PATH: &str = "live-relay.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Seconds between status polls.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Chat messages containing any of these are relayed.
    #[serde(default)]
    pub danmu_forward_keywords: Vec<String>,

    /// Group to account subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub sink: SinkConfig,

    /// Log filter directive, overridden by `RUST_LOG` and the CLI.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_polling_interval() -> u64 {
    DEFAULT_POLLING_INTERVAL_SECS
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: DEFAULT_POLLING_INTERVAL_SECS,
            danmu_forward_keywords: Vec::new(),
            subscriptions: Vec::new(),
            api: ApiConfig::default(),
            connection: ConnectionSettings::default(),
            sink: SinkConfig::default(),
            log_filter: None,
        }
    }
}

/// One subscriber group and the accounts it follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub group_id: i64,
    #[serde(default)]
    pub accounts: Vec<u64>,
}

/// Status API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub user_info_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            user_info_url: DEFAULT_USER_INFO_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Live message connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub url: String,
    pub heartbeat_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ConnectionSettings {
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            max_attempts: self.max_attempts,
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Write notifications to the log.
    #[default]
    Log,
    /// POST notifications as JSON.
    Webhook(WebhookSinkConfig),
}

/// Webhook sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSinkConfig {
    pub url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl RelayConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_secs == 0 {
            return Err(Error::config("polling_interval_secs must be greater than 0"));
        }

        if self.danmu_forward_keywords.iter().any(|k| k.is_empty()) {
            return Err(Error::config(
                "danmu_forward_keywords must not contain empty strings",
            ));
        }

        let mut groups = HashSet::new();
        for entry in &self.subscriptions {
            if !groups.insert(entry.group_id) {
                return Err(Error::config(format!(
                    "group {} is listed more than once",
                    entry.group_id
                )));
            }
            if entry.accounts.contains(&0) {
                return Err(Error::config(format!(
                    "group {} follows invalid account id 0",
                    entry.group_id
                )));
            }
        }

        if self.api.request_timeout_secs == 0 {
            return Err(Error::config("api.request_timeout_secs must be greater than 0"));
        }

        let conn = &self.connection;
        if conn.max_attempts == 0 {
            return Err(Error::config("connection.max_attempts must be at least 1"));
        }
        if conn.heartbeat_interval_secs == 0
            || conn.connect_timeout_secs == 0
            || conn.write_timeout_secs == 0
        {
            return Err(Error::config(
                "connection heartbeat interval, connect timeout and write timeout must be greater than 0",
            ));
        }
        if conn.read_timeout_secs <= conn.heartbeat_interval_secs {
            return Err(Error::config(
                "connection.read_timeout_secs must exceed heartbeat_interval_secs",
            ));
        }

        if let SinkConfig::Webhook(webhook) = &self.sink
            && webhook.url.is_empty()
        {
            return Err(Error::config("sink.url is required for the webhook sink"));
        }

        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL: &str = r#"
        polling_interval_secs = 30
        danmu_forward_keywords = ["【", "同传"]
        log_filter = "live_relay=debug"

        [[subscriptions]]
        group_id = 100
        accounts = [1, 2]

        [[subscriptions]]
        group_id = 200
        accounts = [2]

        [api]
        request_timeout_secs = 3

        [connection]
        heartbeat_interval_secs = 20
        connect_timeout_secs = 15
        read_timeout_secs = 30

        [sink]
        type = "webhook"
        url = "https://example.com/hook"
        bearer_token = "secret"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = RelayConfig::from_toml(FULL).unwrap();

        assert_eq!(config.polling_interval(), Duration::from_secs(30));
        assert_eq!(config.danmu_forward_keywords, vec!["【", "同传"]);
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(config.subscriptions[0].accounts, vec![1, 2]);
        assert_eq!(config.api.user_info_url, DEFAULT_USER_INFO_URL);
        assert_eq!(config.api.request_timeout_secs, 3);
        assert_eq!(config.connection.url, DEFAULT_WS_URL);
        assert_eq!(config.connection.max_attempts, 10);
        assert_eq!(
            config.connection.to_connection_config().connect_timeout,
            Duration::from_secs(15)
        );
        assert_eq!(config.log_filter.as_deref(), Some("live_relay=debug"));

        let SinkConfig::Webhook(webhook) = &config.sink else {
            panic!("expected webhook sink");
        };
        assert_eq!(webhook.bearer_token.as_deref(), Some("secret"));
        assert_eq!(webhook.timeout_secs, 10);
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_toml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.sink, SinkConfig::Log);

        let conn = config.connection.to_connection_config();
        assert_eq!(conn, ConnectionConfig::default());
    }

    #[rstest]
    #[case("polling_interval_secs = 0")]
    #[case("danmu_forward_keywords = [\"ok\", \"\"]")]
    #[case("[[subscriptions]]\ngroup_id = 1\naccounts = [1]\n[[subscriptions]]\ngroup_id = 1\naccounts = [2]")]
    #[case("[[subscriptions]]\ngroup_id = 1\naccounts = [0]")]
    #[case("[connection]\nmax_attempts = 0")]
    #[case("[connection]\nconnect_timeout_secs = 0")]
    #[case("[connection]\nheartbeat_interval_secs = 30\nread_timeout_secs = 30")]
    #[case("[sink]\ntype = \"webhook\"\nurl = \"\"")]
    fn test_invalid_config_is_rejected(#[case] content: &str) {
        assert!(matches!(
            RelayConfig::from_toml(content),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_field_is_a_toml_error() {
        assert!(matches!(
            RelayConfig::from_toml("polling_interval = 5"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.subscriptions[1].group_id, 200);

        assert!(matches!(
            RelayConfig::load(dir.path().join("missing.toml")),
            Err(Error::Configuration(_))
        ));
    }
}
