use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relay_api_server::{IndexPage, auth_routes, index};
use relay_engine::{AuthService, ChangeNotifier, EventPublisher, InMemoryDirectory};
use relay_kafka::{KafkaConfig, KafkaProducer};

use crate::cmd::{cancel_on_signal, spawn_linked};
use crate::config::{AuthArgs, load_users};
use crate::error::ServerError;

pub async fn run(args: AuthArgs) -> Result<(), ServerError> {
    let users = load_users(&args.users)?;
    tracing::info!(
        users = users.len(),
        file = %args.users.display(),
        brokers = ?args.broker.brokers,
        topic = %args.db_changes_topic,
        "relay auth starting"
    );

    let producer = KafkaProducer::new(&KafkaConfig::new(
        args.broker.brokers.clone(),
        "relay-auth-cdc-producer",
    ))?;
    let publisher = Arc::new(EventPublisher::new(Arc::new(producer)));
    // Logins never depend on the broker, so a failed connect is only logged.
    if let Err(e) = publisher.connect().await {
        tracing::error!(error = %e, "change event producer connect failed");
    }

    let auth = AuthService::new(
        Arc::new(InMemoryDirectory::new(users)),
        ChangeNotifier::new(publisher.clone(), &args.db_changes_topic),
    );

    let token = CancellationToken::new();
    let app = index(auth_routes(Arc::new(auth)), IndexPage::Auth);
    let api = spawn_linked(&token, relay_api_server::run(args.port, app, token.clone()));

    let signal = cancel_on_signal(token.clone()).await;
    token.cancel();

    let served = api.await?;
    if let Err(e) = publisher.disconnect().await {
        tracing::warn!(error = %e, "change event producer disconnect failed");
    }
    signal?;
    served?;
    Ok(())
}
