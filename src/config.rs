use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryPolicy;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub notification_queue_name: String,
    pub dead_letter_queue_name: String,
    pub prefetch_count: u16,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: u64,

    pub sms_gateway_url: String,
    pub sms_gateway_username: String,
    pub sms_gateway_password: String,

    pub server_port: u16,
}

fn default_max_retries() -> u32 {
    3
}

fn default_dispatch_timeout_seconds() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }
}
