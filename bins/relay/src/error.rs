#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("broker: {0}")]
    Broker(#[from] relay_api::BrokerError),

    #[error("publisher: {0}")]
    Publish(#[from] relay_engine::PublishError),

    #[error("{0}")]
    Consumer(#[from] relay_engine::ConsumerError),

    #[error("http: {0}")]
    Serve(#[from] relay_api_server::ServeError),

    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
