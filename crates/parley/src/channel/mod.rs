//! Persistent realtime channel with automatic reconnection.
//!
//! A [`RealtimeChannel`] keeps one connection to a room open on a background
//! task. When the connection drops without [`RealtimeChannel::disconnect`]
//! being called, the task waits according to its [`ReconnectPolicy`] and
//! connects again, re-joining the same room.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──open──▶ Open
//!      ▲                           │                 │
//!      └──────── close / error ────┴─────────────────┘
//!                (reconnect after delay unless disconnect() was called)
//! ```
//!
//! Incoming frames are decoded into [`ChannelEvent`]s and handed to every
//! handler subscribed to the event's [`EventKind`], in registration order.
//! Connection failures are logged, never returned.

mod connector;
mod frame;
mod registry;

pub use connector::{ConnectFuture, Connection, Connector, FrameSink, FrameStream, WsConnector};
pub use frame::{ChannelEvent, ChatRequest, ChatResponse, ErrorData, EventKind, Processing};
pub use registry::{EventHandler, SubscriptionId, SubscriptionRegistry};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::retry::{RetryConfig, Sleeper, TokioSleeper};
use crate::conversation::Mode;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
}

/// When and how often to reconnect after an unrequested close.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Wait before the first reconnect.
    pub delay: Duration,
    /// Upper bound for any wait.
    pub max_delay: Duration,
    /// Growth per consecutive failed attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    pub jitter: bool,
    /// Consecutive failed connects before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter: false,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wait before reconnecting after `failures` consecutive failed connects.
    pub fn delay_for(&self, failures: u32) -> Duration {
        RetryConfig {
            max_attempts: 1,
            initial_delay: self.delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
        .delay_for_attempt(failures)
    }
}

// ── Channel ────────────────────────────────────────────────────────

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    sleeper: Arc<dyn Sleeper>,
    policy: ReconnectPolicy,
    registry: Mutex<SubscriptionRegistry>,
    state: watch::Sender<ChannelState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Client end of the realtime protocol. Cheap to clone; clones share the
/// connection and the handler registry.
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    session: Arc<tokio::sync::Mutex<Option<Session>>>,
}

impl RealtimeChannel {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self::with_sleeper(connector, policy, Arc::new(TokioSleeper))
    }

    /// Like [`new`](Self::new), with reconnect delays routed through `sleeper`.
    pub fn with_sleeper(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                sleeper,
                policy,
                registry: Mutex::new(SubscriptionRegistry::new()),
                state,
                outbound: Mutex::new(None),
            }),
            session: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Channel over a WebSocket at `url`.
    pub fn websocket(url: impl Into<String>, token: Option<String>, policy: ReconnectPolicy) -> Self {
        Self::new(Arc::new(WsConnector::new(url, token)), policy)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Wait until the channel reaches `state`.
    pub async fn wait_for_state(&self, state: ChannelState) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `shared`, so the wait cannot fail while `self` exists.
        let _ = rx.wait_for(|s| *s == state).await;
    }

    /// Connect to `room_id`, replacing any existing connection.
    ///
    /// Returns once the background task is started; use
    /// [`wait_for_state`](Self::wait_for_state) to wait for `Open`.
    pub async fn connect(&self, room_id: impl Into<String>) {
        let room_id = room_id.into();
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.cancel.cancel();
            let _ = old.task.await;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(self.shared.clone(), room_id, cancel.clone()));
        *session = Some(Session { cancel, task });
    }

    /// Close the connection. No reconnect follows.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.cancel.cancel();
            let _ = old.task.await;
            info!("Realtime channel disconnected");
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        lock(&self.shared.registry).subscribe(kind, Arc::new(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.registry).unsubscribe(id)
    }

    /// Decode one raw frame and invoke its handlers synchronously.
    pub fn dispatch(&self, raw: &str) {
        self.shared.dispatch(raw);
    }

    /// Relay a user message to `room_id`.
    ///
    /// Returns `false` (and drops the frame) unless the channel is `Open`.
    pub fn send(&self, message: &str, mode: Mode, room_id: &str) -> bool {
        self.send_event(&ChannelEvent::message(message, mode, room_id))
    }

    /// Send any encodable event. Same delivery rules as [`send`](Self::send).
    pub fn send_event(&self, event: &ChannelEvent) -> bool {
        if self.state() != ChannelState::Open {
            debug!("Dropping {} frame: channel not open", event.kind().as_wire());
            return false;
        }
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        match lock(&self.shared.outbound).as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    fn dispatch(&self, raw: &str) {
        let event = match ChannelEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping realtime frame: {e}");
                return;
            }
        };
        if let ChannelEvent::Unknown { kind, .. } = &event {
            debug!("Received unknown realtime event type '{kind}'");
        }

        let handlers = lock(&self.registry).handlers_for(event.kind());
        for handler in handlers {
            handler(&event);
        }
    }

    /// Drive one open connection until it closes or `cancel` fires.
    async fn run_connection(&self, connection: Connection, room_id: &str, cancel: &CancellationToken) {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let join = match ChannelEvent::join_room(room_id).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };
        if let Err(e) = sink.send(join).await {
            warn!("Failed to join room {room_id}: {e}");
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        self.set_state(ChannelState::Open);
        info!("Realtime channel open (room {room_id})");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                Some(frame) = rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        warn!("Realtime send failed: {e}");
                        break;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(raw)) => self.dispatch(&raw),
                    Some(Err(e)) => {
                        warn!("Realtime connection error: {e}");
                        break;
                    }
                    None => {
                        info!("Realtime connection closed by peer");
                        break;
                    }
                },
            }
        }

        *lock(&self.outbound) = None;
    }
}

/// Connect, run, and reconnect until cancelled or out of attempts.
async fn supervise(shared: Arc<Shared>, room_id: String, cancel: CancellationToken) {
    let mut failures: u32 = 0;
    loop {
        shared.set_state(ChannelState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = shared.connector.connect() => result,
        };

        match connected {
            Ok(connection) => {
                failures = 0;
                shared.run_connection(connection, &room_id, &cancel).await;
            }
            Err(e) => {
                failures += 1;
                warn!("Realtime connect failed ({failures}): {e}");
            }
        }
        shared.set_state(ChannelState::Disconnected);

        if cancel.is_cancelled() {
            break;
        }
        if let Some(max) = shared.policy.max_attempts
            && failures >= max
        {
            warn!("Giving up on room {room_id} after {failures} failed connect(s)");
            break;
        }

        let delay = shared.policy.delay_for(failures.saturating_sub(1));
        info!("Reconnecting to room {room_id} in {delay:?}");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.sleeper.sleep(delay) => {}
        }
    }
    shared.set_state(ChannelState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::connector::memory::MemoryConnector;
    use super::*;
    use crate::api::retry::RecordingSleeper;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn channel(connector: &Arc<MemoryConnector>, sleeper: &RecordingSleeper) -> RealtimeChannel {
        RealtimeChannel::with_sleeper(
            connector.clone(),
            ReconnectPolicy::default(),
            Arc::new(sleeper.clone()),
        )
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn response_frame_reaches_single_subscriber() {
        let connector = Arc::new(MemoryConnector::new());
        let channel = channel(&connector, &RecordingSleeper::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.subscribe(EventKind::MessageResponse, move |event| {
            if let ChannelEvent::MessageResponse { data } = event {
                sink.lock().unwrap().push(data.response.clone());
            }
        });

        channel.dispatch(r#"{"type":"message-response","data":{"response":"x"}}"#);
        assert_eq!(*seen.lock().unwrap(), ["x"]);
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames() {
        let connector = Arc::new(MemoryConnector::new());
        let channel = channel(&connector, &RecordingSleeper::new());
        let unknown = Arc::new(AtomicUsize::new(0));
        let counter = unknown.clone();
        channel.subscribe(EventKind::Unknown, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.dispatch(r#"{"type":"typing"}"#);
        channel.dispatch("{not json");
        assert_eq!(unknown.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_may_subscribe_during_dispatch() {
        let connector = Arc::new(MemoryConnector::new());
        let channel = channel(&connector, &RecordingSleeper::new());
        let inner = channel.clone();
        channel.subscribe(EventKind::Error, move |_| {
            inner.subscribe(EventKind::Error, |_| {});
        });
        channel.dispatch(r#"{"type":"error","data":{"message":"x"}}"#);
        assert_eq!(lock(&channel.shared.registry).len(), 2);
    }

    #[tokio::test]
    async fn send_is_dropped_unless_open() {
        let connector = Arc::new(MemoryConnector::new());
        let channel = channel(&connector, &RecordingSleeper::new());
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!channel.send("hello", Mode::Chat, "r1"));
    }

    #[tokio::test]
    async fn joins_room_then_relays_messages() {
        let connector = Arc::new(MemoryConnector::new());
        let mut peer = connector.queue();
        let channel = channel(&connector, &RecordingSleeper::new());

        channel.connect("r1").await;
        channel.wait_for_state(ChannelState::Open).await;
        assert!(channel.send("hello", Mode::Chat, "r1"));

        let join = peer.outbound.next().await.unwrap();
        assert_eq!(ChannelEvent::decode(&join).unwrap(), ChannelEvent::join_room("r1"));
        let msg = peer.outbound.next().await.unwrap();
        assert_eq!(
            ChannelEvent::decode(&msg).unwrap(),
            ChannelEvent::message("hello", Mode::Chat, "r1")
        );

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn incoming_frames_are_dispatched() {
        let connector = Arc::new(MemoryConnector::new());
        let peer = connector.queue();
        let channel = channel(&connector, &RecordingSleeper::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        channel.subscribe(EventKind::MessageProcessing, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.connect("r1").await;
        peer.inbound
            .unbounded_send(Ok(r#"{"type":"message-processing","data":{"status":"processing"}}"#.into()))
            .unwrap();
        eventually(|| seen.load(Ordering::SeqCst) == 1).await;

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn unrequested_close_schedules_reconnect() {
        let connector = Arc::new(MemoryConnector::new());
        let peer = connector.queue();
        let sleeper = RecordingSleeper::new();
        let channel = channel(&connector, &sleeper);

        channel.connect("r1").await;
        channel.wait_for_state(ChannelState::Open).await;
        drop(peer);

        eventually(|| connector.connects() == 2).await;
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(3000)]);
        assert_eq!(channel.state(), ChannelState::Connecting);

        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_does_not_reconnect() {
        let connector = Arc::new(MemoryConnector::new());
        let _peer = connector.queue();
        let sleeper = RecordingSleeper::new();
        let channel = channel(&connector, &sleeper);

        channel.connect("r1").await;
        channel.wait_for_state(ChannelState::Open).await;
        channel.disconnect().await;

        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(sleeper.delays().is_empty());
        assert_eq!(connector.connects(), 1);
        assert!(!channel.send("late", Mode::Chat, "r1"));
    }

    #[tokio::test]
    async fn connection_error_also_reconnects() {
        let connector = Arc::new(MemoryConnector::new());
        let peer = connector.queue();
        let sleeper = RecordingSleeper::new();
        let channel = channel(&connector, &sleeper);

        channel.connect("r1").await;
        channel.wait_for_state(ChannelState::Open).await;
        peer.inbound
            .unbounded_send(Err(Error::channel("reset by peer")))
            .unwrap();

        eventually(|| connector.connects() == 2).await;
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(3000)]);
        channel.disconnect().await;
    }

    #[test]
    fn reconnect_backoff_grows_when_configured() {
        let policy = ReconnectPolicy {
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(3));
        assert_eq!(policy.delay_for(1), Duration::from_secs(6));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(ReconnectPolicy::default().delay_for(5), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn connect_replaces_open_connection() {
        let connector = Arc::new(MemoryConnector::new());
        let mut first = connector.queue();
        let mut second = connector.queue();
        let sleeper = RecordingSleeper::new();
        let channel = channel(&connector, &sleeper);

        channel.connect("r1").await;
        channel.wait_for_state(ChannelState::Open).await;
        let join = first.outbound.next().await.unwrap();
        assert_eq!(ChannelEvent::decode(&join).unwrap(), ChannelEvent::join_room("r1"));

        channel.connect("r2").await;
        // The old connection is closed, not left dangling.
        assert!(first.outbound.next().await.is_none());

        channel.wait_for_state(ChannelState::Open).await;
        let join = second.outbound.next().await.unwrap();
        assert_eq!(ChannelEvent::decode(&join).unwrap(), ChannelEvent::join_room("r2"));
        assert_eq!(connector.connects(), 2);
        assert!(sleeper.delays().is_empty());

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let connector = Arc::new(MemoryConnector::new());
        connector.queue_failure("refused");
        connector.queue_failure("refused");
        let sleeper = RecordingSleeper::new();
        let channel = RealtimeChannel::with_sleeper(
            connector.clone(),
            ReconnectPolicy::default().with_max_attempts(2),
            Arc::new(sleeper.clone()),
        );

        channel.connect("r1").await;
        eventually(|| connector.connects() == 2).await;
        eventually(|| channel.state() == ChannelState::Disconnected).await;

        // Give the supervisor a chance to misbehave before checking it stopped.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.connects(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(3000)]);
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!channel.send("hello", Mode::Chat, "r1"));
    }
}
