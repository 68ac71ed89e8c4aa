//! Logging setup with local timezone timestamps.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "live_relay=info,bili_live=info";

/// Formats timestamps in the local timezone instead of UTC.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Pick the filter: `RUST_LOG` first, then `directive`, then the default.
fn build_filter(directive: Option<&str>) -> crate::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(directive.unwrap_or(DEFAULT_LOG_FILTER))
        .map_err(|e| crate::Error::config(format!("Invalid filter directive: {}", e)))
}

/// Install the global subscriber.
///
/// `json` switches the console output to one JSON object per line.
pub fn init_logging(directive: Option<&str>, json: bool) -> crate::Result<()> {
    let filter = build_filter(directive)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_timer(LocalTimer))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
            .try_init()
    };

    result.map_err(|e| {
        crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
    })
}
