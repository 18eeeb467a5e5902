//! Per-poll live-update broadcast channels.
//!
//! The channel registry is owned exclusively by the bus and keyed by the
//! poll's unguessable channel id. Channels are opened at poll creation (and
//! re-opened for every open poll at startup), torn down a grace period after
//! the poll ends. Delivery is best-effort, at-most-once, with no backlog:
//! a subscriber joining after a publish resynchronizes via `get_poll`.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blindpoll::Poll;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 32;

/// The message pushed to every subscriber of a poll's channel.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PollUpdate {
    pub channel_id: String,
    pub tally: IndexMap<String, u64>,
    pub ended: bool,
}

impl PollUpdate {
    fn from_poll(poll: &Poll) -> Self {
        PollUpdate {
            channel_id: poll.channel_id.clone(),
            tally: poll.tally.clone(),
            ended: poll.ended,
        }
    }
}

#[derive(Clone)]
pub struct LiveUpdateBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<PollUpdate>>>>,
    close_grace: Duration,
}

impl LiveUpdateBus {
    pub fn new(close_grace: Duration) -> Self {
        LiveUpdateBus {
            channels: Arc::new(Mutex::new(HashMap::new())),
            close_grace,
        }
    }

    /// Open the channel for a poll. Idempotent.
    pub fn open(&self, channel_id: &str) {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel_id.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
    }

    /// Subscribe to a poll's channel; `None` once it has been torn down.
    pub fn subscribe(&self, channel_id: &str) -> Option<broadcast::Receiver<PollUpdate>> {
        let channels = self.channels.lock().unwrap();
        channels.get(channel_id).map(|tx| tx.subscribe())
    }

    /// Send the poll's current state to every connected subscriber.
    pub fn publish(&self, poll: &Poll) {
        let channels = self.channels.lock().unwrap();
        if let Some(tx) = channels.get(&poll.channel_id) {
            // a send error only means nobody is listening right now
            let _ = tx.send(PollUpdate::from_poll(poll));
        }
    }

    /// Publish the final state, then keep the channel alive for the grace
    /// period so slow subscribers still receive the terminal message, then
    /// tear it down. New subscriptions are refused after teardown.
    pub fn close(&self, poll: &Poll) {
        self.publish(poll);

        let channels = Arc::clone(&self.channels);
        let channel_id = poll.channel_id.clone();
        let grace = self.close_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            channels.lock().unwrap().remove(&channel_id);
            tracing::debug!(channel_id = %channel_id, "live channel torn down");
        });
    }
}

/// `GET {ws_route}/poll/{channel_id}` — upgrade and stream updates.
pub async fn poll_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.bus.subscribe(&channel_id) {
        Some(rx) => ws.on_upgrade(move |socket| pump(socket, rx)),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn pump(mut socket: WebSocket, mut rx: broadcast::Receiver<PollUpdate>) {
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    let payload = serde_json::to_string(&update).unwrap();
                    if socket.send(Message::Text(payload)).await.is_err() {
                        // client disconnected; it is simply dropped
                        break;
                    }
                }
                // at-most-once delivery: skipped messages are not replayed
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                // channel torn down after the grace period
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(_)) => continue,
                _ => break,
            },
        }
    }
    let _ = socket.close().await;
}
