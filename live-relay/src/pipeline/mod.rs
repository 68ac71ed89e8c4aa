//! Event pipeline.
//!
//! One bounded FIFO fed by the status poller and every live connection,
//! drained by a single [`Dispatcher`].

mod dispatcher;
mod events;

pub use dispatcher::Dispatcher;
pub use events::PipelineEvent;

use tokio::sync::mpsc;

/// Queue capacity. Producers wait when it is full.
pub const DEFAULT_PIPELINE_CAPACITY: usize = 1024;

pub fn channel(capacity: usize) -> (mpsc::Sender<PipelineEvent>, mpsc::Receiver<PipelineEvent>) {
    mpsc::channel(capacity)
}
