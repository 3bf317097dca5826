use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};

use relay_engine::{AuthError, AuthService, User};

use crate::error_response;

const TOKEN_HEADER: &str = "x-auth-token";

#[derive(Default, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct ProfileResponse {
    user: User,
}

/// `POST /api/login` and `GET /api/profile`.
pub fn auth_routes(auth: Arc<AuthService>) -> Router {
    Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/profile", get(handle_profile))
        .with_state(auth)
}

async fn handle_login(
    State(auth): State<Arc<AuthService>>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    body: Bytes,
) -> Response {
    // A body that is not a JSON object is treated like one without credentials.
    let request: LoginRequest = serde_json::from_slice(&body).unwrap_or_default();
    let ip = peer.map(|Extension(ConnectInfo(addr))| addr.ip().to_string());

    match auth
        .login(
            request.username.as_deref(),
            request.password.as_deref(),
            ip.as_deref(),
        )
        .await
    {
        Ok(success) => Json(success).into_response(),
        Err(e) => auth_error(e),
    }
}

async fn handle_profile(State(auth): State<Arc<AuthService>>, headers: HeaderMap) -> Response {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    match auth.profile(token).await {
        Ok(user) => Json(ProfileResponse { user }).into_response(),
        Err(e) => auth_error(e),
    }
}

fn auth_error(e: AuthError) -> Response {
    let status = match &e {
        AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Directory(inner) => {
            tracing::error!(error = %inner, "auth request failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };
    error_response(status, &e.to_string())
}
