//! Login flow: the collaborator that publishes `TOKEN_CREATED` change events.
//!
//! The user store sits behind [`UserDirectory`]. Whatever happens to the
//! change event, a login that matched a user succeeds.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use relay_api::{ChangeEvent, EventType, iso_timestamp, now_iso};

use crate::publisher::ChangeNotifier;

pub type DirectoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: DateTime<Utc>,
}

fn serialize_iso<S: serde::Serializer>(
    at: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(*at))
}

#[derive(Debug, thiserror::Error)]
#[error("user directory: {0}")]
pub struct DirectoryError(pub String);

/// Opaque user and token store.
pub trait UserDirectory: Send + Sync {
    /// User whose name and SHA-256 password hash (lowercase hex) both match.
    fn find_by_credentials<'a>(
        &'a self,
        username: &'a str,
        password_sha256: &'a str,
    ) -> DirectoryFuture<'a, Option<User>>;

    fn store_token<'a>(&'a self, user_id: u64, token: &'a str) -> DirectoryFuture<'a, ()>;

    /// Owner of `token`.
    fn find_by_token<'a>(&'a self, token: &'a str) -> DirectoryFuture<'a, Option<User>>;
}

// ═══════════════════════════════════════════════════════════════
//  InMemoryDirectory
// ═══════════════════════════════════════════════════════════════

/// One entry of the users file.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub password_sha256: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    passwords: HashMap<u64, String>,
    /// token → owning user id.
    tokens: HashMap<String, u64>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    tables: RwLock<Tables>,
}

impl InMemoryDirectory {
    pub fn new(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let mut tables = Tables::default();
        for record in records {
            tables
                .passwords
                .insert(record.id, record.password_sha256.to_ascii_lowercase());
            tables.users.push(User {
                id: record.id,
                username: record.username,
                created_at: record.created_at.unwrap_or_else(Utc::now),
            });
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn user_count(&self) -> usize {
        self.read().users.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("user directory read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("user directory write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl UserDirectory for InMemoryDirectory {
    fn find_by_credentials<'a>(
        &'a self,
        username: &'a str,
        password_sha256: &'a str,
    ) -> DirectoryFuture<'a, Option<User>> {
        Box::pin(async move {
            let tables = self.read();
            let user = tables.users.iter().find(|u| {
                u.username == username
                    && tables
                        .passwords
                        .get(&u.id)
                        .is_some_and(|hash| hash == password_sha256)
            });
            Ok(user.cloned())
        })
    }

    fn store_token<'a>(&'a self, user_id: u64, token: &'a str) -> DirectoryFuture<'a, ()> {
        Box::pin(async move {
            let mut tables = self.write();
            if !tables.users.iter().any(|u| u.id == user_id) {
                return Err(DirectoryError(format!("unknown user id {user_id}")));
            }
            tables.tokens.insert(token.to_string(), user_id);
            Ok(())
        })
    }

    fn find_by_token<'a>(&'a self, token: &'a str) -> DirectoryFuture<'a, Option<User>> {
        Box::pin(async move {
            let tables = self.read();
            let Some(user_id) = tables.tokens.get(token) else {
                return Ok(None);
            };
            Ok(tables.users.iter().find(|u| u.id == *user_id).cloned())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  AuthService
// ═══════════════════════════════════════════════════════════════

/// Lowercase hex SHA-256 of a password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSuccess {
    pub user_id: u64,
    pub username: String,
    pub token: String,
}

pub struct AuthService {
    directory: Arc<dyn UserDirectory>,
    notifier: ChangeNotifier,
}

impl AuthService {
    pub fn new(directory: Arc<dyn UserDirectory>, notifier: ChangeNotifier) -> Self {
        Self { directory, notifier }
    }

    /// Verify credentials and issue a session token.
    ///
    /// The `TOKEN_CREATED` event is sent after the token is stored; its
    /// outcome never changes the result.
    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        ip: Option<&str>,
    ) -> Result<LoginSuccess, AuthError> {
        let (Some(username), Some(password)) = (
            username.filter(|s| !s.is_empty()),
            password.filter(|s| !s.is_empty()),
        ) else {
            return Err(AuthError::MissingCredentials);
        };

        let hash = hash_password(password);
        let Some(user) = self.directory.find_by_credentials(username, &hash).await? else {
            log_activity(None, username, "login_failed", ip);
            return Err(AuthError::InvalidCredentials);
        };

        let token = generate_token();
        self.directory.store_token(user.id, &token).await?;
        log_activity(Some(user.id), &user.username, "login_success", ip);

        let event = ChangeEvent::new("api", EventType::TokenCreated, "tokens")
            .with_user(Some(user.id.to_string()), user.username.clone())
            .with_field("token", token.clone());
        self.notifier.notify(event).await;

        Ok(LoginSuccess {
            user_id: user.id,
            username: user.username,
            token,
        })
    }

    pub async fn profile(&self, token: Option<&str>) -> Result<User, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
        self.directory
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)
    }
}

fn log_activity(user_id: Option<u64>, username: &str, action: &str, ip: Option<&str>) {
    tracing::info!(
        target: "auth",
        timestamp = %now_iso(),
        user_id,
        username,
        action,
        ip,
        "user activity"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::EventPublisher;
    use relay_broker_memory::MemoryBroker;

    fn alice() -> UserRecord {
        UserRecord {
            id: 1,
            username: "alice".to_string(),
            password_sha256: hash_password("secret"),
            created_at: None,
        }
    }

    async fn service(broker: &MemoryBroker) -> AuthService {
        let publisher = Arc::new(EventPublisher::new(Arc::new(broker.producer())));
        publisher.connect().await.unwrap();
        AuthService::new(
            Arc::new(InMemoryDirectory::new([alice()])),
            ChangeNotifier::new(publisher, "db-changes"),
        )
    }

    #[test]
    fn password_hash_is_lowercase_sha256_hex() {
        assert_eq!(
            hash_password("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn tokens_are_64_hex_chars_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn login_issues_token_and_publishes_event() {
        let broker = MemoryBroker::default();
        let auth = service(&broker).await;

        let ok = auth
            .login(Some("alice"), Some("secret"), Some("127.0.0.1"))
            .await
            .unwrap();
        assert_eq!(ok.user_id, 1);
        assert_eq!(ok.username, "alice");

        let records = broker.records("db-changes");
        assert_eq!(records.len(), 1);
        let event: serde_json::Value = serde_json::from_slice(&records[0].value).unwrap();
        assert_eq!(event["source"], "api");
        assert_eq!(event["eventType"], "TOKEN_CREATED");
        assert_eq!(event["table"], "tokens");
        assert_eq!(event["userId"], "1");
        assert_eq!(event["username"], "alice");
        assert_eq!(event["token"], ok.token.as_str());

        let user = auth.profile(Some(ok.token.as_str())).await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected() {
        let broker = MemoryBroker::default();
        let auth = service(&broker).await;

        for (u, p) in [(None, Some("secret")), (Some("alice"), None), (Some(""), Some("x"))] {
            assert!(matches!(
                auth.login(u, p, None).await,
                Err(AuthError::MissingCredentials)
            ));
        }
        assert!(broker.records("db-changes").is_empty());
    }

    #[tokio::test]
    async fn wrong_password_publishes_nothing() {
        let broker = MemoryBroker::default();
        let auth = service(&broker).await;

        assert!(matches!(
            auth.login(Some("alice"), Some("wrong"), None).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(broker.records("db-changes").is_empty());
    }

    #[tokio::test]
    async fn profile_requires_a_known_token() {
        let broker = MemoryBroker::default();
        let auth = service(&broker).await;

        assert!(matches!(auth.profile(None).await, Err(AuthError::MissingToken)));
        assert!(matches!(auth.profile(Some("nope")).await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn storing_token_for_unknown_user_fails() {
        let directory = InMemoryDirectory::new([alice()]);
        assert!(directory.store_token(42, "t").await.is_err());
        assert_eq!(directory.user_count(), 1);
    }
}
