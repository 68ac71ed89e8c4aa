//! Live relay: watches followed streamers and relays their live status and
//! selected chat messages to subscriber groups.
//!
//! ## Components
//!
//! - [`monitor::StatusPoller`] - periodic status poll with transition detection
//! - [`registry::ConnectionRegistry`] - one live connection per account
//! - [`pipeline::Dispatcher`] - single consumer of all events
//! - [`subscription::SubscriptionIndex`] - group/account mapping
//! - [`notification`] - message formatting and sinks
//! - [`service::LiveRelay`] - owns and wires everything above

pub mod accounts;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod subscription;
pub mod utils;

pub use error::{Error, Result};
pub use service::{LiveRelay, RelayParts};
