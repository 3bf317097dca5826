use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relay_api::SubscribeOptions;
use relay_api_server::{IndexPage, SendState, auth_routes, index, send_routes, status_routes};
use relay_broker_memory::MemoryBroker;
use relay_engine::{
    AuthService, ChangeEventLogger, ChangeNotifier, ConsumerEngine, EventPublisher, FailurePolicy,
    InMemoryDirectory, MessageLogger, consumer_metrics,
};

use crate::cmd::{cancel_on_signal, spawn_linked};
use crate::config::{StandaloneArgs, load_users};
use crate::error::ServerError;

/// Every role in one process, wired to an in-memory broker, behind a single
/// HTTP listener.
pub async fn run(args: StandaloneArgs) -> Result<(), ServerError> {
    let users = match &args.users {
        Some(path) => load_users(path)?,
        None => {
            tracing::warn!("no users file given, every login will be rejected");
            Vec::new()
        }
    };

    let broker = MemoryBroker::new(args.partitions);
    let token = CancellationToken::new();

    // --- Consumers ---
    let (recorder, view) = consumer_metrics();
    let mut messages = ConsumerEngine::new(
        "consumer",
        Box::new(broker.consumer()),
        SubscribeOptions::new(&args.topic, &args.group_id),
        FailurePolicy::degraded(),
        recorder,
    );
    let (db_recorder, _db_view) = consumer_metrics();
    let mut db_changes = ConsumerEngine::new(
        "db-changes",
        Box::new(broker.consumer()),
        SubscribeOptions::new(&args.db_changes_topic, &args.db_changes_group_id),
        FailurePolicy::Fatal,
        db_recorder,
    );

    let messages_token = token.clone();
    let messages_task = spawn_linked(&token, async move {
        messages.run(&MessageLogger, &messages_token).await
    });
    let db_token = token.clone();
    let db_task = spawn_linked(&token, async move {
        db_changes.run(&ChangeEventLogger, &db_token).await
    });

    // --- Publishers ---
    let publisher = Arc::new(EventPublisher::new(Arc::new(broker.producer())));
    publisher.connect().await?;

    let auth = AuthService::new(
        Arc::new(InMemoryDirectory::new(users)),
        ChangeNotifier::new(publisher.clone(), &args.db_changes_topic),
    );

    // --- HTTP ---
    let app = status_routes(view)
        .merge(send_routes(SendState {
            publisher: publisher.clone(),
            topic: args.topic.clone(),
        }))
        .merge(auth_routes(Arc::new(auth)));
    let app = index(app, IndexPage::Standalone);
    let api = spawn_linked(&token, relay_api_server::run(args.port, app, token.clone()));

    tracing::info!(
        port = args.port,
        topic = %args.topic,
        db_changes_topic = %args.db_changes_topic,
        partitions = args.partitions,
        "relay standalone ready"
    );

    let signal = cancel_on_signal(token.clone()).await;
    token.cancel();

    let consumed = messages_task.await?;
    let db_consumed = db_task.await?;
    let served = api.await?;
    if let Err(e) = publisher.disconnect().await {
        tracing::warn!(error = %e, "publisher disconnect failed");
    }
    signal?;
    consumed?;
    db_consumed?;
    served?;
    Ok(())
}
