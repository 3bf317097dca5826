use tokio_util::sync::CancellationToken;

use relay_api::SubscribeOptions;
use relay_engine::{ChangeEventLogger, ConsumerEngine, FailurePolicy, consumer_metrics};
use relay_kafka::{KafkaConfig, KafkaConsumer};

use crate::cmd::{cancel_on_signal, spawn_linked};
use crate::config::DbChangesArgs;
use crate::error::ServerError;

/// Change-event logger. Any broker error ends the process with status 1.
pub async fn run(args: DbChangesArgs) -> Result<(), ServerError> {
    tracing::info!(
        brokers = ?args.broker.brokers,
        topic = %args.db_changes_topic,
        group = %args.db_changes_group_id,
        "db changes consumer starting"
    );

    let token = CancellationToken::new();
    // Nothing reads these; the fatal policy never records errors.
    let (recorder, _view) = consumer_metrics();

    let mut engine = ConsumerEngine::new(
        "db-changes",
        Box::new(KafkaConsumer::new(KafkaConfig::new(
            args.broker.brokers.clone(),
            "relay-db-changes-consumer",
        ))),
        SubscribeOptions::new(&args.db_changes_topic, &args.db_changes_group_id),
        FailurePolicy::Fatal,
        recorder,
    );

    let consumer_token = token.clone();
    let consumer = spawn_linked(&token, async move {
        engine.run(&ChangeEventLogger, &consumer_token).await
    });

    let signal = cancel_on_signal(token.clone()).await;
    token.cancel();

    consumer.await??;
    signal
}
