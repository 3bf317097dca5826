use std::time::Duration;

use tokio_util::sync::CancellationToken;

use relay_api::SubscribeOptions;
use relay_api_server::{IndexPage, index, status_routes};
use relay_engine::{ConsumerEngine, FailurePolicy, MessageLogger, consumer_metrics};
use relay_kafka::{KafkaConfig, KafkaConsumer};

use crate::cmd::{cancel_on_signal, spawn_linked};
use crate::config::ConsumerArgs;
use crate::error::ServerError;

pub async fn run(args: ConsumerArgs) -> Result<(), ServerError> {
    tracing::info!(
        brokers = ?args.broker.brokers,
        topic = %args.topic,
        group = %args.group_id,
        "relay consumer starting"
    );

    let token = CancellationToken::new();
    let (recorder, view) = consumer_metrics();

    let mut engine = ConsumerEngine::new(
        "consumer",
        Box::new(KafkaConsumer::new(KafkaConfig::new(
            args.broker.brokers.clone(),
            "relay-consumer",
        ))),
        SubscribeOptions::new(&args.topic, &args.group_id),
        FailurePolicy::Degraded {
            retry_backoff: Duration::from_secs(args.retry_secs),
        },
        recorder,
    );

    let consumer_token = token.clone();
    let consumer = spawn_linked(&token, async move {
        engine.run(&MessageLogger, &consumer_token).await
    });

    let app = index(status_routes(view), IndexPage::Consumer);
    let api = spawn_linked(&token, relay_api_server::run(args.port, app, token.clone()));

    let signal = cancel_on_signal(token.clone()).await;
    token.cancel();

    let consumed = consumer.await?;
    let served = api.await?;
    signal?;
    consumed?;
    served?;
    Ok(())
}
