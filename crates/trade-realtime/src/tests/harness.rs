//! Test harness for connection manager scenarios.
//!
//! Provides:
//! - MockTransport: a scripted transport that records every open, and can
//!   hold opens pending or run a hook just before one resolves
//! - OpenedSession: handle for injecting transport events into one session
//! - EventLog: records listener invocations in order
//! - RecordingSurface: collects notifications

use crate::notification::{Notification, NotificationSurface};
use crate::transport::{
    RealtimeTransport, TransportEvent, TransportEventSender, TransportOptions, TransportSession,
};
use crate::{ConnectionManager, RealtimeConfig, RealtimeError, RealtimeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Config with fast, test-sized reconnect settings.
pub fn test_config(max_reconnect_attempts: u32, reconnect_base_delay_ms: u64) -> RealtimeConfig {
    RealtimeConfig {
        url: "ws://realtime.test/socket".to_string(),
        max_reconnect_attempts,
        reconnect_base_delay_ms,
        ..Default::default()
    }
}

/// One session handed out by [`MockTransport`].
pub struct OpenedSession {
    events: TransportEventSender,
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
    disconnected: Arc<AtomicBool>,
}

impl OpenedSession {
    /// Transport confirms the link.
    pub fn confirm_link(&self) {
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Server emits a named event.
    pub fn server_event(&self, event: &str, payload: Value) {
        let _ = self.events.send(TransportEvent::Message {
            event: event.to_string(),
            payload,
        });
    }

    /// Transport reports the link is gone.
    pub fn drop_link(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Everything the manager emitted on this session.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    /// Names of everything the manager emitted on this session.
    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Whether the manager severed this session.
    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

struct MockSession {
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
    disconnected: Arc<AtomicBool>,
}

impl TransportSession for MockSession {
    fn emit(&self, event: &str, payload: Value) -> RealtimeResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        self.emitted.lock().push((event.to_string(), payload));
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

// A real socket closes when its session is dropped, including inside a
// cancelled open.
impl Drop for MockSession {
    fn drop(&mut self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

type OpenHook = Box<dyn FnOnce() + Send>;

/// Scripted transport. Opens succeed unless failures are queued with
/// [`MockTransport::fail_next_opens`].
#[derive(Default)]
pub struct MockTransport {
    sessions: Mutex<Vec<Arc<OpenedSession>>>,
    open_attempts: Mutex<Vec<Instant>>,
    failures_pending: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    before_resolve: Mutex<Option<OpenHook>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` opens fail synchronously.
    pub fn fail_next_opens(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Keep successful opens pending until the returned gate is notified.
    ///
    /// The session is registered before waiting, so an open cancelled at the
    /// gate still shows up in [`MockTransport::session`].
    pub fn hold_opens(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Let opens resolve immediately again.
    pub fn release_opens(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.notify_waiters();
        }
    }

    /// Run `hook` inside the next successful open, right before it resolves.
    pub fn before_next_open_resolves(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_resolve.lock() = Some(Box::new(hook));
    }

    /// Number of open calls, failed ones included.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.lock().len()
    }

    /// Instants of every open call.
    pub fn open_times(&self) -> Vec<Instant> {
        self.open_attempts.lock().clone()
    }

    /// Number of sessions successfully opened.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn session(&self, index: usize) -> Arc<OpenedSession> {
        self.sessions.lock()[index].clone()
    }

    pub fn last_session(&self) -> Arc<OpenedSession> {
        self.sessions
            .lock()
            .last()
            .cloned()
            .expect("no session opened yet")
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn open(
        &self,
        _url: &str,
        _options: &TransportOptions,
        events: TransportEventSender,
    ) -> RealtimeResult<Box<dyn TransportSession>> {
        self.open_attempts.lock().push(Instant::now());

        let pending = self.failures_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_pending.store(pending - 1, Ordering::SeqCst);
            return Err(RealtimeError::Connection("connection refused".to_string()));
        }

        let emitted = Arc::new(Mutex::new(Vec::new()));
        let disconnected = Arc::new(AtomicBool::new(false));
        self.sessions.lock().push(Arc::new(OpenedSession {
            events,
            emitted: emitted.clone(),
            disconnected: disconnected.clone(),
        }));

        let session = MockSession {
            emitted,
            disconnected,
        };

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let hook = self.before_resolve.lock().take();
        if let Some(hook) = hook {
            hook();
        }

        Ok(Box::new(session))
    }
}

/// Records listener invocations across several events, in dispatch order.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl EventLog {
    pub fn attach(manager: &ConnectionManager, events: &[&str]) -> Self {
        let log = Self::default();
        for event in events {
            let entries = log.entries.clone();
            let name = event.to_string();
            manager.on(event, move |payload| {
                entries.lock().push((name.clone(), payload.clone()));
            });
        }
        log
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}

/// Notification surface that keeps everything it is shown.
#[derive(Default)]
pub struct RecordingSurface {
    shown: Mutex<Vec<Notification>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }
}

impl NotificationSurface for RecordingSurface {
    fn notify(&self, notification: &Notification) {
        self.shown.lock().push(notification.clone());
    }
}

/// Build a manager over a mock transport.
pub fn manager_with(
    config: RealtimeConfig,
    transport: Arc<MockTransport>,
    token: Option<&str>,
) -> ConnectionManager {
    ConnectionManager::new(config, transport, token.map(str::to_string))
}
