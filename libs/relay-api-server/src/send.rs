use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use relay_engine::EventPublisher;

use crate::error_response;

/// Publisher and destination topic behind `POST /send`.
#[derive(Clone)]
pub struct SendState {
    pub publisher: Arc<EventPublisher>,
    pub topic: String,
}

#[derive(Deserialize)]
struct SendRequest {
    message: Option<String>,
}

#[derive(Serialize)]
struct SendResponse<'a> {
    status: &'static str,
    topic: &'a str,
    message: &'a str,
}

pub fn send_routes(state: SendState) -> Router {
    Router::new()
        .route("/send", post(handle_send))
        .with_state(state)
}

/// The body is parsed by hand: anything that does not yield a non-empty
/// string `message` is a 400, and the publisher is not touched.
async fn handle_send(State(state): State<SendState>, body: Bytes) -> Response {
    let message = serde_json::from_slice::<SendRequest>(&body)
        .ok()
        .and_then(|r| r.message)
        .filter(|m| !m.is_empty());
    let Some(message) = message else {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    };

    match state.publisher.publish_text(&state.topic, &message).await {
        Ok(delivery) => {
            tracing::info!(
                topic = %state.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                message = %message,
                "message sent"
            );
            Json(SendResponse {
                status: "sent",
                topic: &state.topic,
                message: &message,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(topic = %state.topic, error = %e, "failed to send message");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to send message")
        }
    }
}
