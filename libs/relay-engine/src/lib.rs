//! Publish and consume side of the change-event relay.
//!
//! - [`EventPublisher`] / [`ChangeNotifier`]: append events to a topic.
//! - [`ConsumerEngine`]: one consumer loop, parameterised by a
//!   [`FailurePolicy`] and a [`RecordHandler`].
//! - [`metrics`]: the consumer's health and throughput, one writer and many
//!   readers.
//! - [`auth`]: the login flow that emits `TOKEN_CREATED` events.

pub mod auth;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod publisher;

pub use auth::{
    AuthError, AuthService, InMemoryDirectory, LoginSuccess, User, UserDirectory, UserRecord,
};
pub use consumer::{ConsumerEngine, ConsumerState, FailurePolicy};
pub use error::{ConsumerError, PublishError};
pub use handler::{ChangeEventLogger, HandleOutcome, MessageLogger, RecordHandler};
pub use metrics::{
    HealthReport, HealthStatus, LastMessage, MetricsRecorder, MetricsSnapshot, MetricsView,
    consumer_metrics,
};
pub use publisher::{ChangeNotifier, EventPublisher};
