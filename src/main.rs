use std::sync::Arc;

use anyhow::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use notification_worker::{
    api::run_api_server,
    clients::{rbmq::RabbitMqClient, sms::SmsGatewayClient},
    config::Config,
    consumer::NotificationConsumer,
    dispatch::{Dispatcher, SmsHandler},
    error::ConsumerError,
    models::message::NotificationType,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("notification_worker=info")),
        )
        .json()
        .init();

    let config = Config::load()?;

    // Topology failures are fatal to startup and surface to the supervisor.
    let broker = RabbitMqClient::connect(&config).await?;

    let sms_sender = Arc::new(SmsGatewayClient::new(&config));
    let dispatcher = Dispatcher::new().with_handler(
        NotificationType::Sms,
        Box::new(SmsHandler::new(sms_sender)),
    );

    let consumer = Arc::new(NotificationConsumer::new(
        broker,
        dispatcher,
        config.retry_policy(),
        config.dispatch_timeout(),
    ));

    let api_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = run_api_server(api_config).await {
            error!(error = %e, "Health check server exited");
        }
    });

    let shutdown = CancellationToken::new();

    let mut worker = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        let shutdown = shutdown.clone();
        async move { consumer.run(shutdown).await }
    });

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping consumer");
            shutdown.cancel();
            None
        }
        result = &mut worker => Some(result),
    };

    let result = match finished {
        Some(result) => result?,
        None => worker.await?,
    };

    match result {
        Ok(()) | Err(ConsumerError::Cancelled) => info!("Consumer stopped"),
        Err(e) => {
            error!(error = %e, "Consumer exited with error");
            consumer.close().await?;
            return Err(e.into());
        }
    }

    consumer.close().await?;

    info!("Notification worker stopped");

    Ok(())
}
