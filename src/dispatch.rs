use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Error;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::{
    error::DispatchError,
    models::message::{NotificationJob, NotificationType},
};

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, title: &str, body: &str, destinations: &[String]) -> Result<(), Error>;
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, job: &NotificationJob) -> Result<(), DispatchError>;
}

// Routes a decoded job to the handler registered for its type. Delivery is
// at-least-once: a redelivery after a lost ack reaches the sender again, so
// recipients may see duplicates unless the downstream de-duplicates.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<NotificationType, Box<dyn NotificationHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn with_handler(
        mut self,
        kind: NotificationType,
        handler: Box<dyn NotificationHandler>,
    ) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub async fn dispatch(&self, job: &NotificationJob) -> Result<(), DispatchError> {
        let handler = self
            .handlers
            .get(&job.kind)
            .ok_or(DispatchError::UnsupportedType(job.kind))?;

        debug!(job_id = %job.id, kind = %job.kind, "Dispatching notification job");

        handler.handle(job).await
    }

    // A hung sender must not block the loop forever; elapsing the limit is a
    // transient failure like any other sender error.
    pub async fn dispatch_with_timeout(
        &self,
        job: &NotificationJob,
        limit: Duration,
    ) -> Result<(), DispatchError> {
        match timeout(limit, self.dispatch(job)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(limit)),
        }
    }
}

pub struct SmsHandler {
    sender: Arc<dyn SmsSender>,
}

impl SmsHandler {
    pub fn new(sender: Arc<dyn SmsSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationHandler for SmsHandler {
    async fn handle(&self, job: &NotificationJob) -> Result<(), DispatchError> {
        let payload = job.sms_payload().map_err(|e| DispatchError::Payload {
            kind: job.kind,
            source: e,
        })?;

        let content = payload.payload;

        self.sender
            .send(
                &content.notification.title,
                &content.notification.body,
                &content.destinations,
            )
            .await
            .map_err(DispatchError::Sender)
    }
}
