use std::time::Duration;

use thiserror::Error;

use crate::models::message::NotificationType;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to connect to broker: {0}")]
    Connection(#[source] lapin::Error),

    #[error("failed to declare queue topology: {0}")]
    Topology(#[source] lapin::Error),

    #[error("broker operation failed: {0}")]
    Broker(#[from] lapin::Error),

    #[error("delivery stream closed by broker")]
    StreamClosed,

    #[error("consumer cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed notification job: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: NotificationType,
        #[source]
        source: serde_json::Error,
    },

    #[error("no handler registered for notification type: {0}")]
    UnsupportedType(NotificationType),

    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("sender failure: {0}")]
    Sender(#[source] anyhow::Error),
}

impl DispatchError {
    // A permanent failure cannot succeed on retry; the retry policy routes
    // it straight to the dead-letter queue without touching the budget.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Payload { .. } | Self::UnsupportedType(_)
        )
    }
}
