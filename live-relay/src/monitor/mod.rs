//! Live status monitoring.

mod poller;

pub use poller::{StatusPoller, detect_transition};
