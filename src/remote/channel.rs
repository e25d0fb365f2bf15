//! Persistent WebSocket to the analysis service.
//!
//! One background task owns the socket. When the connection drops it waits a
//! flat delay and connects again from scratch, so at most one socket is ever
//! open. Outbound messages sent while disconnected are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::detection::{FillInstruction, FillValue};
use crate::fill::FillReporter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    FormAnalysis {
        #[serde(default)]
        data: serde_json::Value,
    },
    NextAction {
        #[serde(default)]
        data: serde_json::Value,
    },
    AlternativeStrategy {
        #[serde(default)]
        data: serde_json::Value,
    },
    Ack {
        #[serde(default)]
        field: String,
        #[serde(default)]
        status: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundMessage {
    FieldFilled {
        field_name: String,
        value: serde_json::Value,
    },
    Error {
        error: String,
        field: serde_json::Value,
    },
}

#[derive(Default)]
struct ChannelState {
    connected: AtomicBool,
    attempts: AtomicU64,
}

pub struct DuplexChannel {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    state: Arc<ChannelState>,
    task: JoinHandle<()>,
}

impl DuplexChannel {
    /// Start the connection task. Inbound messages arrive on the returned receiver.
    pub fn spawn(
        url: url::Url,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ChannelState::default());

        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                connection_loop(url, reconnect_delay, state, out_rx, in_tx).await;
            })
        };

        (
            Self {
                outbound: out_tx,
                state,
                task,
            },
            in_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Connection attempts made so far, successful or not.
    pub fn connection_attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Queue a message for the live socket. Returns false when it was dropped.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_connected() {
            tracing::debug!(?message, "duplex channel disconnected; message dropped");
            return false;
        }
        self.outbound.send(message).is_ok()
    }
}

impl Drop for DuplexChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FillReporter for DuplexChannel {
    fn field_filled(&self, field: &str, value: Option<&FillValue>) {
        let value = match value {
            Some(FillValue::Bool(b)) => serde_json::Value::Bool(*b),
            Some(FillValue::Text(s)) => serde_json::Value::String(s.clone()),
            None => serde_json::Value::Null,
        };
        self.send(OutboundMessage::FieldFilled {
            field_name: field.to_string(),
            value,
        });
    }

    fn field_failed(&self, error: &str, instruction: &FillInstruction) {
        self.send(OutboundMessage::Error {
            error: error.to_string(),
            field: serde_json::to_value(instruction).unwrap_or_default(),
        });
    }
}

async fn connection_loop(
    url: url::Url,
    reconnect_delay: Duration,
    state: Arc<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
) {
    loop {
        state.attempts.fetch_add(1, Ordering::SeqCst);
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                // Anything queued before this connection belongs to a dead socket.
                while outbound.try_recv().is_ok() {}
                state.connected.store(true, Ordering::SeqCst);
                tracing::info!(url = %url, "connected to analysis service");

                let (mut sink, mut source) = ws.split();
                loop {
                    tokio::select! {
                        incoming = source.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<InboundMessage>(text.as_str()) {
                                    Ok(msg) => {
                                        tracing::trace!(?msg, "duplex message received");
                                        if inbound.send(msg).is_err() {
                                            tracing::debug!("inbound receiver dropped");
                                        }
                                    }
                                    Err(e) => tracing::warn!(error = %e, "unrecognised duplex message"),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                tracing::error!(error = %e, "duplex socket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                        outgoing = outbound.recv() => match outgoing {
                            Some(msg) => {
                                let json = match serde_json::to_string(&msg) {
                                    Ok(j) => j,
                                    Err(e) => {
                                        tracing::error!(error = %e, "failed to encode duplex message");
                                        continue;
                                    }
                                };
                                if let Err(e) = sink.send(Message::Text(json.into())).await {
                                    tracing::error!(error = %e, "duplex send failed");
                                    break;
                                }
                            }
                            None => {
                                state.connected.store(false, Ordering::SeqCst);
                                return;
                            }
                        },
                    }
                }
                state.connected.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "duplex connect failed");
            }
        }
        tracing::info!(delay_ms = reconnect_delay.as_millis() as u64, "duplex channel reconnecting");
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_are_typed() {
        let ack: InboundMessage =
            serde_json::from_str(r##"{"type":"ack","field":"#email","status":"success"}"##).unwrap();
        assert_eq!(
            ack,
            InboundMessage::Ack {
                field: "#email".into(),
                status: Some("success".into())
            }
        );
        let next: InboundMessage =
            serde_json::from_str(r#"{"type":"next_action","data":{"action":"complete"}}"#).unwrap();
        assert!(matches!(next, InboundMessage::NextAction { .. }));
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn outbound_messages_use_action_tag() {
        let msg = OutboundMessage::FieldFilled {
            field_name: "#email".into(),
            value: "ada@example.com".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"action": "field_filled", "field_name": "#email", "value": "ada@example.com"})
        );
    }
}
