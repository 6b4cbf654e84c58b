use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    config::Config,
    dispatch::SmsSender,
    models::sms::{SmsGatewayRequest, TextMessage},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SmsGatewayClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl SmsGatewayClient {
    pub fn new(config: &Config) -> Self {
        info!(gateway = %config.sms_gateway_url, "SMS gateway client initialized");

        Self {
            http_client: Client::new(),
            base_url: config.sms_gateway_url.trim_end_matches('/').to_string(),
            username: config.sms_gateway_username.clone(),
            password: config.sms_gateway_password.clone(),
        }
    }
}

#[async_trait]
impl SmsSender for SmsGatewayClient {
    async fn send(&self, title: &str, body: &str, destinations: &[String]) -> Result<(), Error> {
        let url = format!("{}/message", self.base_url);

        debug!(recipients = destinations.len(), "Sending SMS through gateway");

        let request = SmsGatewayRequest {
            text_message: TextMessage {
                text: format!("{}\n{}", title, body),
            },
            phone_numbers: destinations.to_vec(),
        };

        let response = self
            .http_client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            info!(recipients = destinations.len(), "SMS sent");
            Ok(())
        } else {
            let error_text = response.text().await?;
            Err(anyhow!("SMS gateway returned {}: {}", status, error_text))
        }
    }
}
