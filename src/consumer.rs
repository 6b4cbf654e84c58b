use std::time::Duration;

use futures_util::StreamExt;
use lapin::message::Delivery;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::rbmq::{RabbitMqClient, retry_count_from},
    dispatch::Dispatcher,
    error::{ConsumerError, DispatchError},
    models::{
        message::NotificationJob,
        retry::{RetryDecision, RetryPolicy},
    },
};

// One delivery is processed at a time; the broker buffers at most the
// prefetch count beyond that. Scaling out means running more worker
// processes against the same queue, which is safe because the broker
// arbitrates deliveries between them.
pub struct NotificationConsumer {
    broker: RabbitMqClient,
    dispatcher: Dispatcher,
    retry_policy: RetryPolicy,
    dispatch_timeout: Duration,
}

impl NotificationConsumer {
    pub fn new(
        broker: RabbitMqClient,
        dispatcher: Dispatcher,
        retry_policy: RetryPolicy,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            dispatcher,
            retry_policy,
            dispatch_timeout,
        }
    }

    // Cancellation is cooperative and only observed between deliveries, so
    // the loop never abandons a dispatch midway.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        let mut deliveries = self.broker.create_consumer().await?;

        info!(queue = %self.broker.queue_name(), "Consumer started");

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cancellation requested, stopping consumer");
                    return Err(ConsumerError::Cancelled);
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        warn!(error = %e, "Failed to read delivery from broker");
                        continue;
                    }
                    None => return Err(ConsumerError::StreamClosed),
                },
            };

            self.handle_delivery(delivery).await?;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), ConsumerError> {
        let retry_count = retry_count_from(&delivery.properties);

        let failure = match NotificationJob::decode(&delivery.data) {
            Ok(job) => {
                match self
                    .dispatcher
                    .dispatch_with_timeout(&job, self.dispatch_timeout)
                    .await
                {
                    Ok(()) => {
                        self.broker.acknowledge(delivery.delivery_tag).await?;
                        info!(job_id = %job.id, kind = %job.kind, retry_count, "Notification delivered");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(
                            job_id = %job.id,
                            kind = %job.kind,
                            retry_count,
                            error = %e,
                            "Dispatch failed"
                        );
                        e
                    }
                }
            }
            Err(e) => {
                warn!(retry_count, error = %e, "Failed to decode notification job");
                DispatchError::Decode(e)
            }
        };

        match self.retry_policy.decide(&failure, retry_count) {
            RetryDecision::Requeue {
                retry_count: next_count,
                delay,
            } => {
                match self
                    .broker
                    .publish_retry(&delivery.data, next_count, delay)
                    .await
                {
                    Ok(()) => {
                        self.broker.reject(delivery.delivery_tag, false).await?;
                        info!(
                            retry_count = next_count,
                            delay_ms = delay.as_millis() as u64,
                            "Job requeued with backoff"
                        );
                    }
                    Err(e) => {
                        // The original delivery goes back to the broker so the
                        // job is not lost when the requeue publish fails.
                        error!(error = %e, "Requeue publish failed, returning delivery to broker");
                        self.broker.reject(delivery.delivery_tag, true).await?;
                    }
                }
            }
            RetryDecision::DeadLetter => {
                match self
                    .broker
                    .publish_to_dlq(&delivery.data, retry_count, &failure.to_string())
                    .await
                {
                    Ok(()) => {
                        self.broker.acknowledge(delivery.delivery_tag).await?;
                        warn!(retry_count, error = %failure, "Job dead-lettered");
                    }
                    Err(e) => {
                        error!(error = %e, "Dead-letter publish failed, returning delivery to broker");
                        self.broker.reject(delivery.delivery_tag, true).await?;
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn close(&self) -> Result<(), ConsumerError> {
        self.broker.close().await
    }
}
