// HTTP and WebSocket wiring: the publish endpoint and the per-subscriber
// serving loop.
use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_broker::Registry;
use relay_wire::Envelope;

/// Builds the relay's router: `POST /publish` and `GET /subscribe`.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/publish", post(publish))
        .route("/subscribe", get(subscribe))
        .with_state(registry)
}

// Publish is stateless: decode one envelope, fan out, acknowledge.
// Method and body validation are handled by the router and the Json
// extractor; neither failure mode touches registry state.
async fn publish(
    State(registry): State<Registry>,
    Json(envelope): Json<Envelope>,
) -> &'static str {
    let delivered = registry.broadcast(&envelope);
    tracing::debug!(delivered, "published envelope");
    "okay"
}

async fn subscribe(ws: WebSocketUpgrade, State(registry): State<Registry>) -> Response {
    ws.on_upgrade(move |socket| async move {
        // A peer that hung up politely surfaces as Ok and is not worth a
        // log line; everything else is an operational error.
        if let Err(err) = serve_subscriber(registry, socket).await {
            tracing::warn!(error = %err, "subscription serving loop failed");
        }
    })
}

// Bridges one subscriber's mailbox to one websocket until the mailbox
// closes, the peer leaves, or a write fails.
async fn serve_subscriber(registry: Registry, mut socket: WebSocket) -> Result<()> {
    let mut subscription = registry.register();
    tracing::debug!(subscriber = %subscription.id(), "subscriber registered");
    // The subscription unregisters itself when dropped, so the registry
    // entry is released on every exit path.
    loop {
        tokio::select! {
            queued = subscription.recv() => {
                let Some(envelope) = queued else {
                    // Mailbox closed by the registry.
                    break;
                };
                let frame = envelope.to_json().context("encode envelope")?;
                socket
                    .send(Message::Text(frame.into()))
                    .await
                    .context("write frame")?;
            }
            inbound = socket.recv() => {
                match inbound {
                    // Clean close from the peer is a non-error outcome.
                    None | Some(Ok(Message::Close(_))) => return Ok(()),
                    // Subscribers are not expected to send data; ignore it.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err).context("read from subscriber"),
                }
            }
        }
    }
    let close = CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    };
    let _ = socket.send(Message::Close(Some(close))).await;
    Ok(())
}
