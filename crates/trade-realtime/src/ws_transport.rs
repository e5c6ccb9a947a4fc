//! WebSocket transport.
//!
//! Frames are JSON text messages of the form `{"event": ..., "data": ...}`.

use crate::events::reason;
use crate::messages::Frame;
use crate::transport::{
    RealtimeTransport, TransportEvent, TransportEventSender, TransportOptions, TransportSession,
};
use crate::{RealtimeError, RealtimeResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Outbound queue depth per session.
const OUTBOUND_CAPACITY: usize = 100;

/// How long to wait for a pong before declaring the link dead.
fn pong_timeout(ping_interval: Duration) -> Duration {
    ping_interval.saturating_mul(2)
}

/// Realtime transport over a WebSocket connection.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn open(
        &self,
        url: &str,
        options: &TransportOptions,
        events: TransportEventSender,
    ) -> RealtimeResult<Box<dyn TransportSession>> {
        Url::parse(url)?;
        if options.ping_interval.is_zero() {
            return Err(RealtimeError::Config(
                "ping interval must be greater than zero".to_string(),
            ));
        }
        if options.connect_timeout.is_zero() {
            return Err(RealtimeError::Config(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        info!(url = %url, "Connecting to realtime server");

        let timeout_ms = options.connect_timeout.as_millis() as u64;
        let (ws_stream, _) = tokio::time::timeout(options.connect_timeout, connect_async(url))
            .await
            .map_err(|_| RealtimeError::Timeout(timeout_ms))??;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let shutdown = Arc::new(Notify::new());

        // Writer: drains the outbound queue, stops after a close frame.
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() || is_close {
                    break;
                }
            }
        });

        let _ = events.send(TransportEvent::Connected);

        // Reader: relays frames, answers pings, keeps the heartbeat.
        let reader_tx = out_tx.clone();
        let reader_shutdown = shutdown.clone();
        let ping_interval = options.ping_interval;
        let pong_timeout = pong_timeout(ping_interval);
        tokio::spawn(async move {
            let mut heartbeat = interval(ping_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            heartbeat.tick().await;
            let mut last_pong = Instant::now();

            let disconnect_reason = loop {
                tokio::select! {
                    _ = reader_shutdown.notified() => break reason::CLIENT_DISCONNECT,
                    _ = heartbeat.tick() => {
                        if last_pong.elapsed() > pong_timeout {
                            warn!("No pong from realtime server");
                            break reason::PING_TIMEOUT;
                        }
                        if reader_tx.try_send(Message::Ping(Vec::new().into())).is_err() {
                            debug!("Outbound queue full, skipping ping");
                        }
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => match Frame::from_json(&text) {
                            Ok(frame) => {
                                let _ = events.send(TransportEvent::Message {
                                    event: frame.event,
                                    payload: frame.data,
                                });
                            }
                            Err(e) => warn!(error = %e, "Failed to parse realtime frame"),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = reader_tx.try_send(Message::Pong(data));
                        }
                        Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                        Some(Ok(Message::Close(_))) => {
                            info!("Realtime server closed the connection");
                            break reason::SERVER_DISCONNECT;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break reason::TRANSPORT_ERROR;
                        }
                        None => break reason::TRANSPORT_CLOSE,
                    }
                }
            };

            if disconnect_reason != reason::CLIENT_DISCONNECT {
                writer_handle.abort();
            }
            let _ = events.send(TransportEvent::Disconnected {
                reason: disconnect_reason.to_string(),
            });
        });

        Ok(Box::new(WsSession {
            out_tx,
            shutdown,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A live WebSocket session.
struct WsSession {
    out_tx: mpsc::Sender<Message>,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
}

impl TransportSession for WsSession {
    fn emit(&self, event: &str, payload: Value) -> RealtimeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        let json = Frame::new(event, payload).to_json()?;
        self.out_tx
            .try_send(Message::Text(json.into()))
            .map_err(|e| RealtimeError::Send(e.to_string()))
    }

    fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.out_tx.try_send(Message::Close(None));
        self.shutdown.notify_one();
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
