use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::info;

use crate::{config::Config, error::ConsumerError};

pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
pub const FAILURE_REASON_HEADER: &str = "x-failure-reason";
pub const FAILED_AT_HEADER: &str = "x-failed-at";

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    queue_name: String,
    retry_queue_name: String,
    dead_letter_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, ConsumerError> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(ConsumerError::Connection)?;

        let channel = connection
            .create_channel()
            .await
            .map_err(ConsumerError::Connection)?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(ConsumerError::Topology)?;

        channel
            .queue_declare(
                &config.notification_queue_name,
                durable_queue(),
                FieldTable::default(),
            )
            .await
            .map_err(ConsumerError::Topology)?;

        let retry_queue_name = format!("{}.retry", config.notification_queue_name);

        // Messages published here with a per-message TTL are routed back onto
        // the work queue through the default exchange once the TTL elapses,
        // which is what turns the computed backoff into a real delay.
        let mut retry_args = FieldTable::default();
        retry_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString("".into()),
        );
        retry_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(config.notification_queue_name.as_str().into()),
        );

        channel
            .queue_declare(&retry_queue_name, durable_queue(), retry_args)
            .await
            .map_err(ConsumerError::Topology)?;

        channel
            .queue_declare(
                &config.dead_letter_queue_name,
                durable_queue(),
                FieldTable::default(),
            )
            .await
            .map_err(ConsumerError::Topology)?;

        info!(
            queue = %config.notification_queue_name,
            retry_queue = %retry_queue_name,
            dead_letter_queue = %config.dead_letter_queue_name,
            prefetch_count = config.prefetch_count,
            "Broker topology declared"
        );

        Ok(Self {
            connection,
            channel,
            queue_name: config.notification_queue_name.clone(),
            retry_queue_name,
            dead_letter_queue_name: config.dead_letter_queue_name.clone(),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub async fn create_consumer(&self) -> Result<Consumer, ConsumerError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "notification_worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), ConsumerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), ConsumerError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;

        Ok(())
    }

    pub async fn publish_retry(
        &self,
        body: &[u8],
        retry_count: u32,
        delay: Duration,
    ) -> Result<(), ConsumerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            RETRY_COUNT_HEADER.into(),
            AMQPValue::LongInt(retry_count as i32),
        );

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_headers(headers)
            .with_expiration(delay.as_millis().to_string().into());

        self.channel
            .basic_publish(
                "",
                &self.retry_queue_name,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?;

        Ok(())
    }

    // The body is published untouched so a dead-lettered job can be inspected
    // and replayed as-is; failure context travels in headers.
    pub async fn publish_to_dlq(
        &self,
        body: &[u8],
        retry_count: u32,
        failure_reason: &str,
    ) -> Result<(), ConsumerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            RETRY_COUNT_HEADER.into(),
            AMQPValue::LongInt(retry_count as i32),
        );
        headers.insert(
            FAILURE_REASON_HEADER.into(),
            AMQPValue::LongString(failure_reason.into()),
        );
        headers.insert(
            FAILED_AT_HEADER.into(),
            AMQPValue::LongString(
                Utc::now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
                    .as_str()
                    .into(),
            ),
        );

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_headers(headers);

        self.channel
            .basic_publish(
                "",
                &self.dead_letter_queue_name,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?;

        Ok(())
    }

    pub async fn close(&self) -> Result<(), ConsumerError> {
        if self.channel.status().connected() {
            self.channel.close(200, "worker shutdown").await?;
        }

        if self.connection.status().connected() {
            self.connection.close(200, "worker shutdown").await?;
        }

        Ok(())
    }
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

// Absent, negative, or non-integer headers read as zero.
pub fn retry_count_from(properties: &BasicProperties) -> u32 {
    let Some(headers) = properties.headers() else {
        return 0;
    };

    headers
        .inner()
        .iter()
        .find(|(name, _)| name.as_str() == RETRY_COUNT_HEADER)
        .map(|(_, value)| match value {
            AMQPValue::ShortInt(n) => i64::from(*n).max(0) as u32,
            AMQPValue::LongInt(n) => i64::from(*n).max(0) as u32,
            AMQPValue::LongLongInt(n) => (*n).max(0) as u32,
            _ => 0,
        })
        .unwrap_or(0)
}
