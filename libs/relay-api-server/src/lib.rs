//! HTTP surface of the relay: consumer status, message sending and login.
//!
//! Each role contributes a [`Router`]; binaries merge what they need, add an
//! [`index`] page and hand the result to [`run`].

mod auth;
mod send;
mod status;

use std::net::SocketAddr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

pub use auth::auth_routes;
pub use send::{SendState, send_routes};
pub use status::status_routes;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("bind :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("serve: {0}")]
    Serve(std::io::Error),
}

/// Serve `app` on `0.0.0.0:port` until `shutdown` is cancelled.
pub async fn run(port: u16, app: Router, shutdown: CancellationToken) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| ServeError::Bind { port, source })?;

    tracing::info!(port, "http server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .map_err(ServeError::Serve)?;

    tracing::info!(port, "http server stopped");
    Ok(())
}

/// `{"error": message}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  GET /
// ═══════════════════════════════════════════════════════════════

/// Landing page flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPage {
    Consumer,
    Producer,
    Auth,
    Standalone,
}

impl IndexPage {
    fn html(self) -> &'static str {
        match self {
            IndexPage::Consumer => concat!(
                "<h1>Relay Consumer</h1>\n",
                "<ul>\n",
                "  <li><a href=\"/health\">/health</a></li>\n",
                "  <li><a href=\"/metrics\">/metrics</a></li>\n",
                "  <li><a href=\"/last-message\">/last-message</a></li>\n",
                "</ul>\n",
            ),
            IndexPage::Producer => concat!(
                "<h1>Relay Producer</h1>\n",
                "<p>Send messages using POST /send</p>\n",
                "<pre>\nPOST /send\n{\n  \"message\": \"hello from producer\"\n}\n</pre>\n",
            ),
            IndexPage::Auth => concat!(
                "<h1>Relay Auth</h1>\n",
                "<pre>\nPOST /api/login {\"username\": \"...\", \"password\": \"...\"}\n",
                "GET  /api/profile  (x-auth-token header)\n</pre>\n",
            ),
            IndexPage::Standalone => concat!(
                "<h1>Relay (standalone)</h1>\n",
                "<ul>\n",
                "  <li><a href=\"/health\">/health</a></li>\n",
                "  <li><a href=\"/metrics\">/metrics</a></li>\n",
                "  <li><a href=\"/last-message\">/last-message</a></li>\n",
                "  <li>POST /send</li>\n",
                "  <li>POST /api/login, GET /api/profile</li>\n",
                "</ul>\n",
            ),
        }
    }
}

/// Add the `GET /` landing page to `router`.
pub fn index(router: Router, page: IndexPage) -> Router {
    router.route("/", get(move || async move { Html(page.html()) }))
}
