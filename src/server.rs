//! Webhook HTTP surface.
//!
//! Telegram only knows the webhook URL, so the route is served under a
//! secret path segment (the bot token unless configured otherwise).

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, warn};

use crate::collector::dispatcher::{Ack, Dispatcher};
use crate::telegram::update::Update;

pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route("/", get(status))
        .route(&format!("/{}", webhook_path.trim_matches('/')), post(webhook))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: &str, webhook_path: &str) -> Result<()> {
    let app = router(state, webhook_path);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Webhook server stopped");
    Ok(())
}

async fn status() -> Json<Ack> {
    Json(Ack::ok("All your base are belong to us!"))
}

/// Decode and dispatch one update. Only server errors are reported as a
/// non-2xx status, so the upstream redelivers those and nothing else.
pub async fn webhook(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<Ack>) {
    let ack = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            debug!(update_id = update.update_id, "update received");
            state.dispatcher.handle(update).await
        }
        Err(e) => {
            warn!("Rejecting undecodable update: {}", e);
            Ack::not_acceptable("Sent entity is not update")
        }
    };

    let code = if ack.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (code, Json(ack))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::access::AccessControl;
    use crate::collector::Broadcaster;
    use crate::config::BroadcastMode;
    use crate::store::Store;
    use async_trait::async_trait;

    /// Broadcaster that refuses every call.
    struct Offline;

    #[async_trait]
    impl Broadcaster for Offline {
        async fn send(&self, _text: &str) -> Result<i32> {
            anyhow::bail!("offline")
        }
        async fn reply(&self, _text: &str, _target: i32) -> Result<i32> {
            anyhow::bail!("offline")
        }
        async fn edit(&self, _id: i32, _text: &str) -> Result<()> {
            anyhow::bail!("offline")
        }
        async fn delete(&self, _id: i32) -> Result<()> {
            anyhow::bail!("offline")
        }
        async fn forward(&self, _chat: i64, _id: i32) -> Result<i32> {
            anyhow::bail!("offline")
        }
        async fn answer(&self, _chat: i64, _reply_to: i32, _text: &str) -> Result<()> {
            anyhow::bail!("offline")
        }
    }

    async fn state() -> Arc<AppState> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let access = AccessControl::load(store.clone(), &[]).await.unwrap();
        access.set_chat_follow(-100, 1, true).await.unwrap();
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(Offline),
            access,
            "CollectorBot",
            BroadcastMode::Send,
        );
        Arc::new(AppState { dispatcher })
    }

    fn body(json: &str) -> Bytes {
        Bytes::from(json.to_string())
    }

    #[tokio::test]
    async fn test_malformed_payload_acknowledged_as_not_acceptable() {
        let (code, Json(ack)) = webhook(State(state().await), body("not json")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(ack.status, 406);
    }

    #[tokio::test]
    async fn test_ignored_message_returns_ok() {
        let payload = r#"{
            "update_id": 1,
            "message": {
                "message_id": 10,
                "date": 1,
                "chat": { "id": -100, "type": "group", "title": "G" },
                "from": { "id": 5, "is_bot": false, "first_name": "A" },
                "text": "hello"
            }
        }"#;
        let (code, Json(ack)) = webhook(State(state().await), body(payload)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(ack.status, 200);
    }

    #[tokio::test]
    async fn test_failed_broadcast_returns_server_error() {
        let payload = r##"{
            "update_id": 2,
            "message": {
                "message_id": 11,
                "date": 1,
                "chat": { "id": -100, "type": "group", "title": "G" },
                "from": { "id": 5, "is_bot": false, "first_name": "A" },
                "text": "#a51 keep",
                "entities": [ { "type": "hashtag", "offset": 0, "length": 4 } ]
            }
        }"##;
        let (code, Json(ack)) = webhook(State(state().await), body(payload)).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ack.status, 500);
    }

    #[tokio::test]
    async fn test_status_route() {
        let Json(ack) = status().await;
        assert_eq!(ack.status, 200);
    }
}
