//! HTTP listener: healthcheck, metrics exposition, and the webhook sink.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tracing::warn;

use ingress::UpdateDispatcher;
use telegram_api::Update;

const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// State for the webhook sink.
#[derive(Clone)]
pub struct WebhookSink {
    pub dispatcher: Arc<UpdateDispatcher>,
    pub secret_token: String,
}

/// Build the router. The webhook route is only mounted when running an
/// ingress role in webhook mode.
pub fn router(webhook: Option<(String, WebhookSink)>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics));

    if let Some((path, sink)) = webhook {
        router = router.route(&format!("/{path}"), post(webhook_sink).with_state(sink));
    }
    router
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> String {
    botmetrics::gather_text()
}

/// Webhook sink: authenticate with the platform secret header, decode the
/// update, hand it to the dispatcher.
async fn webhook_sink(
    State(sink): State<WebhookSink>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !sink.secret_token.is_empty() {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != sink.secret_token {
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "undecodable webhook update");
            return StatusCode::BAD_REQUEST;
        }
    };

    sink.dispatcher.dispatch(update);
    StatusCode::OK
}

/// `:8080` style addresses bind on all interfaces.
pub fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        return format!("0.0.0.0:{port}");
    }
    addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_normalization() {
        assert_eq!(normalize_listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
