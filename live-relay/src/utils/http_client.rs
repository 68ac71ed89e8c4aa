//! Shared HTTP/TLS setup.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

/// Install the process-wide rustls crypto provider.
///
/// Both reqwest (no-provider rustls build) and the WebSocket connector need
/// one before the first TLS handshake.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client with the given per-request timeout.
pub fn try_build_client(timeout: Duration) -> reqwest::Result<Client> {
    install_rustls_provider();
    Client::builder().timeout(timeout).build()
}

/// Like [`try_build_client`], falling back to reqwest defaults on failure.
///
/// The fallback client has no timeout of its own, so callers also set one
/// per request.
pub fn build_client(timeout: Duration) -> Client {
    try_build_client(timeout).unwrap_or_else(|error| {
        warn!(
            error = %error,
            timeout_secs = timeout.as_secs(),
            "Failed to build HTTP client; falling back to reqwest defaults"
        );
        Client::new()
    })
}
