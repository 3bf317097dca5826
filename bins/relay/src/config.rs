use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use relay_engine::UserRecord;

use crate::error::ServerError;

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Change-event relay: publish, consume and observe events over Kafka"
)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume the message topic and serve health/metrics (keeps running on broker errors)
    Consumer(ConsumerArgs),
    /// Consume and log change events (exits on broker errors)
    DbChanges(DbChangesArgs),
    /// Serve POST /send
    Producer(ProducerArgs),
    /// Serve login/profile and publish TOKEN_CREATED change events
    Auth(AuthArgs),
    /// All roles in one process over an in-memory broker
    Standalone(StandaloneArgs),
}

#[derive(Args, Clone, Debug)]
pub struct BrokerArgs {
    /// Kafka bootstrap servers, comma separated.
    #[arg(long, default_value = "kafka:9092", env = "KAFKA_BROKERS", value_delimiter = ',')]
    pub brokers: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ConsumerArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    #[arg(long, default_value = "test-topic", env = "KAFKA_TOPIC")]
    pub topic: String,

    #[arg(long, default_value = "relay-group", env = "KAFKA_GROUP_ID")]
    pub group_id: String,

    /// Seconds between reconnect attempts after a broker error.
    #[arg(long, default_value_t = 5, env = "RELAY_RETRY_SECS")]
    pub retry_secs: u64,

    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,
}

#[derive(Args, Clone, Debug)]
pub struct DbChangesArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    #[arg(long, default_value = "db-changes", env = "KAFKA_DB_CHANGES_TOPIC")]
    pub db_changes_topic: String,

    #[arg(long, default_value = "db-changes-group", env = "KAFKA_DB_CHANGES_GROUP_ID")]
    pub db_changes_group_id: String,
}

#[derive(Args, Clone, Debug)]
pub struct ProducerArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    #[arg(long, default_value = "test-topic", env = "KAFKA_TOPIC")]
    pub topic: String,

    #[arg(long, default_value_t = 4000, env = "PORT")]
    pub port: u16,
}

#[derive(Args, Clone, Debug)]
pub struct AuthArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    #[arg(long, default_value = "db-changes", env = "KAFKA_DB_CHANGES_TOPIC")]
    pub db_changes_topic: String,

    /// TOML file with `[[users]]` entries.
    #[arg(long, default_value = "users.toml", env = "RELAY_USERS")]
    pub users: PathBuf,

    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,
}

#[derive(Args, Clone, Debug)]
pub struct StandaloneArgs {
    #[arg(long, default_value = "test-topic", env = "KAFKA_TOPIC")]
    pub topic: String,

    #[arg(long, default_value = "relay-group", env = "KAFKA_GROUP_ID")]
    pub group_id: String,

    #[arg(long, default_value = "db-changes", env = "KAFKA_DB_CHANGES_TOPIC")]
    pub db_changes_topic: String,

    #[arg(long, default_value = "db-changes-group", env = "KAFKA_DB_CHANGES_GROUP_ID")]
    pub db_changes_group_id: String,

    /// Optional users file; without it every login is rejected.
    #[arg(long, env = "RELAY_USERS")]
    pub users: Option<PathBuf>,

    /// Partitions per topic of the in-memory broker.
    #[arg(long, default_value_t = 1)]
    pub partitions: usize,

    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,
}

// ---- Users file ----

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

pub fn parse_users(content: &str) -> Result<Vec<UserRecord>, toml::de::Error> {
    toml::from_str::<UsersFile>(content).map(|f| f.users)
}

pub fn load_users(path: &Path) -> Result<Vec<UserRecord>, ServerError> {
    let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
        context: "read",
        detail: format!("'{}': {e}", path.display()),
    })?;
    parse_users(&content).map_err(|e| ServerError::Config {
        context: "parse",
        detail: format!("'{}': {e}", path.display()),
    })
}
