//! Append-only, ordered session event stream (spec §4.9).
//!
//! Grounded on the teacher's `AuditLogService` (`services/*`): a thin
//! service wrapping a shared, lock-protected log plus a side-effecting
//! `update` call per append. Here the side effect is the
//! [`SessionManager`] port rather than a concrete store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::models::event::{EventType, SessionEvent};
use crate::domain::ports::SessionManager;
use crate::infrastructure::logging::SecretScrubbingLayer;

/// Append-only event log for one run.
///
/// When `debug` is false, `content` is stripped from every appended event
/// before it is stored or forwarded to the session manager -- only
/// metadata (model, token counts, timing, verdicts, trust) survives. When
/// `debug` is true, content is kept but still passed through
/// [`SecretScrubbingLayer`] -- provider API keys and bearer tokens are
/// redacted regardless of the debug flag (spec §4.9, §4.11).
pub struct SessionEventLogger {
    events: RwLock<Vec<SessionEvent>>,
    sequence: AtomicU64,
    debug: bool,
    session_manager: Arc<dyn SessionManager>,
    scrubber: SecretScrubbingLayer,
}

impl SessionEventLogger {
    pub fn new(debug: bool, session_manager: Arc<dyn SessionManager>) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(1),
            debug,
            session_manager,
            scrubber: SecretScrubbingLayer::new(),
        }
    }

    /// Mint the next monotonic sequence id. Exposed so callers can mint a
    /// correlation id shared by a tool-call/tool-result event pair before
    /// either event is appended.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn append(&self, mut event: SessionEvent) -> SessionEvent {
        if !self.debug {
            event.content = None;
        } else if let Some(content) = &event.content {
            event.content = Some(self.scrubber.scrub_message(content));
        }
        if let Err(e) = self.session_manager.update(&event).await {
            warn!(error = %e, "session manager update failed for event {}", event.sequence);
        }
        debug!(event_type = ?event.event_type, sequence = event.sequence, "session event");
        let mut events = self.events.write().await;
        events.push(event.clone());
        event
    }

    /// Build and append an event in one call, minting its sequence id.
    pub async fn log(
        &self,
        event_type: EventType,
        goal: Option<String>,
        step: Option<String>,
        agent: Option<String>,
        tool: Option<String>,
        correlation_id: Option<String>,
        content: Option<String>,
        metadata: serde_json::Value,
    ) -> SessionEvent {
        let event = SessionEvent {
            sequence: self.next_sequence(),
            timestamp: Utc::now(),
            event_type,
            correlation_id,
            goal,
            step,
            agent,
            tool,
            content,
            metadata,
        };
        self.append(event).await
    }

    pub async fn events(&self) -> Vec<SessionEvent> {
        self.events.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullSessionManager;

    #[tokio::test]
    async fn sequence_is_strictly_increasing() {
        let logger = SessionEventLogger::new(true, Arc::new(NullSessionManager));
        let a = logger
            .log(EventType::System, None, None, None, None, None, Some("a".into()), serde_json::Value::Null)
            .await;
        let b = logger
            .log(EventType::System, None, None, None, None, None, Some("b".into()), serde_json::Value::Null)
            .await;
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn non_debug_strips_content_but_keeps_metadata() {
        let logger = SessionEventLogger::new(false, Arc::new(NullSessionManager));
        let event = logger
            .log(
                EventType::Assistant,
                None,
                None,
                None,
                None,
                None,
                Some("sensitive response text".into()),
                serde_json::json!({"model": "test"}),
            )
            .await;
        assert!(event.content.is_none());
        assert_eq!(event.metadata["model"], "test");
    }

    #[tokio::test]
    async fn debug_still_scrubs_secrets_from_kept_content() {
        let logger = SessionEventLogger::new(true, Arc::new(NullSessionManager));
        let event = logger
            .log(
                EventType::ToolResult,
                None,
                None,
                None,
                None,
                None,
                Some("key sk-ant-REDACTED in use".into()),
                serde_json::Value::Null,
            )
            .await;
        let content = event.content.expect("debug run keeps content");
        assert!(!content.contains("sk-ant-REDACTED"));
        assert!(content.contains("[API_KEY_REDACTED]"));
    }
}
