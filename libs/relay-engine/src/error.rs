use relay_api::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("connect: {0}")]
    Connect(BrokerError),

    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish to '{topic}': {source}")]
    Broker { topic: String, source: BrokerError },

    #[error("disconnect: {0}")]
    Disconnect(BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// Raised only under `FailurePolicy::Fatal`.
    #[error("consumer '{consumer}' terminated: {source}")]
    Fatal { consumer: String, source: BrokerError },
}
