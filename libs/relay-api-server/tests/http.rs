use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use relay_api::{BrokerError, BrokerFuture, BrokerProducer, Delivery};
use relay_api_server::{IndexPage, SendState, auth_routes, index, send_routes, status_routes};
use relay_broker_memory::MemoryBroker;
use relay_engine::auth::hash_password;
use relay_engine::{
    AuthService, ChangeNotifier, EventPublisher, InMemoryDirectory, UserRecord, consumer_metrics,
};

/// Producer that counts sends and never reaches a broker.
#[derive(Default)]
struct SpyProducer {
    sends: AtomicUsize,
    fail: bool,
}

impl BrokerProducer for SpyProducer {
    fn connect(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn send(&self, _topic: &str, _payload: Vec<u8>) -> BrokerFuture<'_, Delivery> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(BrokerError::publish("leader not available"))
            } else {
                Ok(Delivery { partition: 0, offset: 0 })
            }
        })
    }

    fn disconnect(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

fn send_app(spy: Arc<SpyProducer>) -> Router {
    send_routes(SendState {
        publisher: Arc::new(EventPublisher::new(spy)),
        topic: "test-topic".to_string(),
    })
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ═══════════════════════════════════════════════════════════════
//  POST /send
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn send_without_message_never_reaches_publisher() {
    let spy = Arc::new(SpyProducer::default());

    for body in [
        json!({}),
        json!({ "message": "" }),
        json!({ "message": null }),
        json!({ "message": 5 }),
    ] {
        let (status, value) = call(send_app(spy.clone()), post_json("/send", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "message is required");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/send")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = call(send_app(spy.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(spy.sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn send_publishes_message() {
    let spy = Arc::new(SpyProducer::default());
    let (status, value) = call(
        send_app(spy.clone()),
        post_json("/send", json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({ "status": "sent", "topic": "test-topic", "message": "hello" }));
    assert_eq!(spy.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_failure_is_a_generic_500() {
    let spy = Arc::new(SpyProducer {
        fail: true,
        ..SpyProducer::default()
    });
    let (status, value) =
        call(send_app(spy), post_json("/send", json!({ "message": "hello" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["error"], "failed to send message");
}

// ═══════════════════════════════════════════════════════════════
//  Status
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn status_reports_ok_then_sticky_degraded() {
    let (mut recorder, view) = consumer_metrics();
    let app = status_routes(view);

    let (status, health) = call(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["kafkaError"], Value::Null);
    assert!(health["timestamp"].as_str().unwrap().ends_with('Z'));

    recorder.record_message("test-topic", "hello");
    recorder.record_error("connection: broker unavailable");
    recorder.record_message("test-topic", "again");

    let (_, health) = call(app.clone(), get("/health")).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["kafkaError"], "connection: broker unavailable");

    let (_, metrics) = call(app.clone(), get("/metrics")).await;
    assert_eq!(metrics["messagesConsumed"], 2);
    assert_eq!(metrics["lastMessage"]["value"], "again");
    assert_eq!(metrics["lastError"], "connection: broker unavailable");

    let (_, last) = call(app, get("/last-message")).await;
    assert_eq!(last["lastMessage"]["topic"], "test-topic");
    assert_eq!(last["lastMessage"]["value"], "again");
}

#[tokio::test]
async fn last_message_is_null_before_any_record() {
    let (_recorder, view) = consumer_metrics();
    let (status, last) = call(status_routes(view), get("/last-message")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last, json!({ "lastMessage": null }));
}

#[tokio::test]
async fn index_page_is_html() {
    let (_recorder, view) = consumer_metrics();
    let app = index(status_routes(view), IndexPage::Consumer);
    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(std::str::from_utf8(&body).unwrap().contains("/last-message"));
}

// ═══════════════════════════════════════════════════════════════
//  Auth
// ═══════════════════════════════════════════════════════════════

async fn auth_app(broker: &MemoryBroker) -> Router {
    let publisher = Arc::new(EventPublisher::new(Arc::new(broker.producer())));
    publisher.connect().await.unwrap();
    let directory = InMemoryDirectory::new([UserRecord {
        id: 1,
        username: "alice".to_string(),
        password_sha256: hash_password("secret"),
        created_at: None,
    }]);
    auth_routes(Arc::new(AuthService::new(
        Arc::new(directory),
        ChangeNotifier::new(publisher, "db-changes"),
    )))
}

#[tokio::test]
async fn login_then_profile() {
    let broker = MemoryBroker::default();
    let app = auth_app(&broker).await;

    let (status, login) = call(
        app.clone(),
        post_json("/api/login", json!({ "username": "alice", "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["userId"], 1);
    assert_eq!(login["username"], "alice");
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(broker.records("db-changes").len(), 1);

    let request = Request::builder()
        .uri("/api/profile")
        .header("x-auth-token", &token)
        .body(Body::empty())
        .unwrap();
    let (status, profile) = call(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["id"], 1);
    assert_eq!(profile["user"]["username"], "alice");
    assert!(profile["user"]["createdAt"].is_string());
}

#[tokio::test]
async fn login_errors_map_to_status_codes() {
    let broker = MemoryBroker::default();
    let app = auth_app(&broker).await;

    let (status, value) = call(
        app.clone(),
        post_json("/api/login", json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "username and password are required");

    let (status, value) = call(
        app.clone(),
        post_json("/api/login", json!({ "username": "alice", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value["error"], "invalid credentials");

    let (status, value) = call(app.clone(), get("/api/profile")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value["error"], "missing token");

    let request = Request::builder()
        .uri("/api/profile")
        .header("x-auth-token", "bogus")
        .body(Body::empty())
        .unwrap();
    let (status, value) = call(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value["error"], "invalid token");

    assert!(broker.records("db-changes").is_empty());
}

#[tokio::test]
async fn login_succeeds_when_change_event_cannot_be_sent() {
    let broker = MemoryBroker::default();
    let app = auth_app(&broker).await;
    broker.set_available(false);

    let (status, login) = call(
        app,
        post_json("/api/login", json!({ "username": "alice", "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["username"], "alice");
}
