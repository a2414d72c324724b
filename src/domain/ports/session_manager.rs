//! Session persistence contract (spec §1, §4.9: "session persistence
//! backends" are an external collaborator). The event logger calls
//! `update` on every append; a real implementation might fsync to disk or
//! write to a remote store. [`NullSessionManager`] discards updates.

use async_trait::async_trait;

use crate::domain::error::VigilError;
use crate::domain::models::event::SessionEvent;

#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn update(&self, event: &SessionEvent) -> Result<(), VigilError>;
}

#[derive(Default)]
pub struct NullSessionManager;

#[async_trait]
impl SessionManager for NullSessionManager {
    async fn update(&self, _event: &SessionEvent) -> Result<(), VigilError> {
        Ok(())
    }
}
