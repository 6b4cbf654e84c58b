use std::{collections::HashMap, time::Instant};

use chrono::Utc;
use lapin::{Connection, ConnectionProperties};
use tracing::debug;

use crate::{
    config::Config,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    config: Config,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let broker_health = self.check_broker().await;
        checks.insert("message_broker".to_string(), broker_health);

        let status = if checks
            .values()
            .all(|check| check.status == HealthStatus::Healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let started = Instant::now();

        match Connection::connect(&self.config.rabbitmq_url, ConnectionProperties::default()).await
        {
            Ok(connection) => {
                let elapsed = started.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");

                let _ = connection.close(200, "health check").await;

                ServiceHealth::healthy(elapsed)
            }
            Err(e) => ServiceHealth::unhealthy(e.to_string()),
        }
    }
}
