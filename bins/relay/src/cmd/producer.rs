use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relay_api_server::{IndexPage, SendState, index, send_routes};
use relay_engine::EventPublisher;
use relay_kafka::{KafkaConfig, KafkaProducer};

use crate::cmd::{cancel_on_signal, spawn_linked};
use crate::config::ProducerArgs;
use crate::error::ServerError;

pub async fn run(args: ProducerArgs) -> Result<(), ServerError> {
    tracing::info!(brokers = ?args.broker.brokers, topic = %args.topic, "relay producer starting");

    let producer = KafkaProducer::new(&KafkaConfig::new(
        args.broker.brokers.clone(),
        "relay-producer",
    ))?;
    let publisher = Arc::new(EventPublisher::new(Arc::new(producer)));

    // The API comes up regardless; sends fail with 500 until the broker is reachable.
    if let Err(e) = publisher.connect().await {
        tracing::error!(error = %e, "producer connect failed");
    }

    let token = CancellationToken::new();
    let app = index(
        send_routes(SendState {
            publisher: publisher.clone(),
            topic: args.topic.clone(),
        }),
        IndexPage::Producer,
    );
    let api = spawn_linked(&token, relay_api_server::run(args.port, app, token.clone()));

    let signal = cancel_on_signal(token.clone()).await;
    token.cancel();

    let served = api.await?;
    if let Err(e) = publisher.disconnect().await {
        tracing::warn!(error = %e, "producer disconnect failed");
    }
    signal?;
    served?;
    Ok(())
}
