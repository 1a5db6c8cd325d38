//! `/ws` live push (spec §6). One axum websocket per subscriber; inbound
//! client frames drive subscribe/unsubscribe/ping, outbound
//! [`otpgw_bus::PushMessage`]s are forwarded as text frames (a
//! [`otpgw_bus::PushMessage::Keepalive`] becomes a protocol ping).
//!
//! [`otpgw_bus::LivePush`] has no incremental "add one topic" call: each
//! `subscribe` replaces the subscriber's entry (and its channel) wholesale.
//! So a client `subscribe`/`unsubscribe` re-registers with the full,
//! locally-tracked topic set and swaps in the freshly returned receiver.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use otpgw_bus::PushMessage;

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe { channel: Option<String> },
    Unsubscribe { channel: Option<String> },
    Ping,
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscriber_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    let mut topics: HashSet<String> = HashSet::new();
    let mut rx = state.gateway.live_push.subscribe(subscriber_id.clone(), Vec::new()).await;
    let _ = sink.send(Message::Text(serde_json::json!({"type": "connected"}).to_string().into())).await;

    loop {
        tokio::select! {
            push = rx.recv() => {
                let Some(push) = push else { break };
                match push {
                    PushMessage::Keepalive => {
                        if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    PushMessage::Payload { topic, data } => {
                        let envelope = serde_json::json!({"type": topic, "data": data});
                        if sink.send(Message::Text(envelope.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                state.gateway.live_push.touch(&subscriber_id).await;

                let text = match frame {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    Message::Pong(_) => continue,
                    _ => continue,
                };

                let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) else {
                    debug!(subscriber = %subscriber_id, "unrecognized live push client message");
                    continue;
                };

                let reply = match msg {
                    ClientMessage::Subscribe { channel } => {
                        if let Some(channel) = channel {
                            topics.insert(channel);
                            rx = state.gateway.live_push.subscribe(subscriber_id.clone(), topics.iter().cloned().collect()).await;
                        }
                        serde_json::json!({"type": "subscribed"})
                    }
                    ClientMessage::Unsubscribe { channel } => {
                        if let Some(channel) = &channel {
                            topics.remove(channel);
                        } else {
                            topics.clear();
                        }
                        rx = state.gateway.live_push.subscribe(subscriber_id.clone(), topics.iter().cloned().collect()).await;
                        serde_json::json!({"type": "unsubscribed"})
                    }
                    ClientMessage::Ping => serde_json::json!({"type": "pong"}),
                };

                if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.gateway.live_push.unsubscribe(&subscriber_id).await;
}
