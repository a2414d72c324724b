//! Human-input channel contract used by the PAUSE verdict (spec §4.2, §5).

use async_trait::async_trait;
use std::time::Duration;

/// A channel the executor can wait on for a human's reply to a PAUSE
/// question. `wait` must honour cancellation and return `None` on timeout.
#[async_trait]
pub trait HumanInputChannel: Send + Sync {
    async fn wait(&self, question: &str, timeout: Duration) -> Option<String>;
}
