//! Feed manager actor.
//!
//! One task owns the transport session, the subscribed topic list and the
//! connection state. The [`FeedManager`] handle talks to it over a bounded
//! command channel and reads state through `watch` snapshots, so nothing is
//! shared mutably between tasks.
//!
//! Lifecycle:
//! 1. `connect()` opens a session and waits for the namespace acknowledgement,
//!    retrying with exponential backoff
//! 2. Subscribe/unsubscribe calls are transmitted immediately while connected,
//!    and queued in issuance order otherwise
//! 3. On a dropped connection the manager reconnects (when enabled), replays
//!    the full subscribed list, then applies the queued calls

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConnectPolicy, FeedConfig, WireSchema};
use crate::connectors::{
    Connector, InboundFrame, OutboundEvent, SessionCredential, TransportError, TransportSession,
};
use crate::events::{ConnectionState, EventSender, EventStream, FeedEvent, Operation};
use crate::subscriptions::{dedup, Topic, TopicLabels};
use crate::watchers::LivenessTracker;

use super::backoff::Backoff;
use super::dispatch::Dispatcher;
use super::shutdown::{Shutdown, ShutdownSignal};
use super::FeedError;

/// Settings used by the manager actor.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub connect: ConnectPolicy,
    pub wire: WireSchema,
    pub event_buffer: usize,
    pub command_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect: ConnectPolicy::default(),
            wire: WireSchema::default(),
            event_buffer: 1024,
            command_buffer: 256,
        }
    }
}

impl From<&FeedConfig> for ManagerConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            connect: config.connect.clone(),
            wire: config.wire.clone(),
            event_buffer: config.event_buffer,
            command_buffer: config.command_buffer,
        }
    }
}

enum Command {
    Connect(oneshot::Sender<Result<(), FeedError>>),
    Subscribe(Vec<Topic>, oneshot::Sender<()>),
    Unsubscribe(Vec<Topic>, oneshot::Sender<()>),
    Probe(oneshot::Sender<()>),
}

/// Subscription call held until the connection is up.
#[derive(Debug)]
enum Deferred {
    Subscribe(Vec<Topic>),
    Unsubscribe(Vec<Topic>),
}

impl Deferred {
    fn topics(&self) -> &[Topic] {
        match self {
            Deferred::Subscribe(topics) | Deferred::Unsubscribe(topics) => topics,
        }
    }

    fn topics_mut(&mut self) -> &mut Vec<Topic> {
        match self {
            Deferred::Subscribe(topics) | Deferred::Unsubscribe(topics) => topics,
        }
    }
}

enum Wake {
    Shutdown,
    Command(Option<Command>),
    Frame(Option<Result<InboundFrame, TransportError>>),
    Deadline,
}

enum Attempt<S> {
    Connected(S),
    Failed(TransportError),
    Cancelled,
}

/// Handle to the feed manager. Cheap to clone.
#[derive(Clone)]
pub struct FeedManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    subscribed: watch::Receiver<Vec<Topic>>,
    events: EventSender,
    labels: TopicLabels,
    liveness: LivenessTracker,
    shutdown: Shutdown,
    actor: Arc<Mutex<Option<JoinHandle<()>>>>,
    endpoint: String,
}

impl FeedManager {
    /// Starts the manager actor. Nothing is opened until `connect()`.
    pub fn spawn<C: Connector>(
        connector: C,
        config: ManagerConfig,
        credential: Option<SessionCredential>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (subscribed_tx, subscribed_rx) = watch::channel(Vec::new());
        let events = EventSender::new(config.event_buffer);
        let labels = TopicLabels::new();
        let liveness = LivenessTracker::new();
        let shutdown = Shutdown::new();
        let endpoint = connector.endpoint();

        let actor = Actor {
            backoff: Backoff::new(config.connect.backoff_base, config.connect.backoff_max),
            connector,
            policy: config.connect,
            wire: config.wire,
            credential,
            session: None,
            subscribed: Vec::new(),
            deferred: VecDeque::new(),
            connect_waiters: Vec::new(),
            has_connected: false,
            commands: command_rx,
            state_tx,
            subscribed_tx,
            events: events.clone(),
            dispatcher: Dispatcher::new(labels.clone()),
            liveness: liveness.clone(),
            shutdown: shutdown.signal(),
        };
        let handle = tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            state: state_rx,
            subscribed: subscribed_rx,
            events,
            labels,
            liveness,
            shutdown,
            actor: Arc::new(Mutex::new(Some(handle))),
            endpoint,
        }
    }

    /// Connects, retrying up to the configured number of attempts.
    ///
    /// Returns immediately when already connected. After a successful
    /// connect following an earlier connection, subscriptions are replayed.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Connect(tx)).await?;
        rx.await.map_err(|_| FeedError::Closed)?
    }

    /// Subscribes to `topics`. Resolves once the call was transmitted, or
    /// queued when not connected.
    pub async fn subscribe(&self, topics: Vec<Topic>) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Subscribe(topics, tx)).await?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    /// Unsubscribes from `topics`. Transmit failures are reported as
    /// `FeedEvent::TransmitFailed`; the topics are removed regardless.
    pub async fn unsubscribe(&self, topics: Vec<Topic>) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Unsubscribe(topics, tx)).await?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    /// Asks the server for a snapshot of every subscribed topic.
    /// Skipped while disconnected or when nothing is subscribed.
    pub async fn probe(&self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Probe(tx)).await?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), FeedError> {
        if self.shutdown.is_triggered() {
            return Err(FeedError::Closed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| FeedError::Closed)
    }

    /// Stops the actor and releases the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        self.shutdown.trigger();
        let actor = self.actor.lock().take();
        if let Some(actor) = actor {
            if let Err(e) = actor.await {
                error!("[feed] Manager task failed: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every connection state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Snapshot of the subscribed topics in subscription order.
    pub fn subscribed(&self) -> Vec<Topic> {
        self.subscribed.borrow().clone()
    }

    /// Opens a new consumer of feed events.
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn labels(&self) -> TopicLabels {
        self.labels.clone()
    }

    pub fn liveness(&self) -> LivenessTracker {
        self.liveness.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for FeedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("subscribed", &self.subscribed.borrow().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Actor<C: Connector> {
    connector: C,
    policy: ConnectPolicy,
    wire: WireSchema,
    credential: Option<SessionCredential>,
    session: Option<C::Session>,
    subscribed: Vec<Topic>,
    deferred: VecDeque<Deferred>,
    connect_waiters: Vec<oneshot::Sender<Result<(), FeedError>>>,
    has_connected: bool,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    subscribed_tx: watch::Sender<Vec<Topic>>,
    events: EventSender,
    dispatcher: Dispatcher,
    liveness: LivenessTracker,
    shutdown: ShutdownSignal,
    backoff: Backoff,
}

impl<C: Connector> Actor<C> {
    async fn run(mut self) {
        debug!("[feed] Manager started for {}", self.connector.endpoint());

        loop {
            let wake = match self.session.as_mut() {
                Some(session) => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Wake::Shutdown,
                    command = self.commands.recv() => Wake::Command(command),
                    frame = session.recv() => Wake::Frame(frame),
                },
                None => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Wake::Shutdown,
                    command = self.commands.recv() => Wake::Command(command),
                },
            };

            match wake {
                Wake::Shutdown | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Frame(frame) => self.handle_frame(frame).await,
                Wake::Deadline => {}
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                if self.session.is_some() {
                    let _ = reply.send(Ok(()));
                    return;
                }
                self.connect_waiters.push(reply);
                let attempts = self.policy.max_retries;
                if let Err(e) = self.connect_cycle(Some(attempts)).await {
                    debug!("[feed] connect() failed: {}", e);
                }
            }
            Command::Subscribe(topics, ack) => {
                if self.session.is_some() {
                    self.subscribe_now(topics).await;
                } else {
                    self.defer(Deferred::Subscribe(topics));
                }
                let _ = ack.send(());
            }
            Command::Unsubscribe(topics, ack) => {
                if self.session.is_some() {
                    self.unsubscribe_now(topics).await;
                } else {
                    self.defer(Deferred::Unsubscribe(topics));
                }
                let _ = ack.send(());
            }
            Command::Probe(ack) => {
                if self.session.is_some() {
                    self.probe_now().await;
                } else {
                    debug!("[feed] Probe skipped while disconnected");
                }
                let _ = ack.send(());
            }
        }
    }

    /// Handles a command received while a connect cycle is in progress.
    fn defer_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => self.connect_waiters.push(reply),
            Command::Subscribe(topics, ack) => {
                self.defer(Deferred::Subscribe(topics));
                let _ = ack.send(());
            }
            Command::Unsubscribe(topics, ack) => {
                self.defer(Deferred::Unsubscribe(topics));
                let _ = ack.send(());
            }
            Command::Probe(ack) => {
                debug!("[feed] Probe skipped while connecting");
                let _ = ack.send(());
            }
        }
    }

    /// Queues a call, keeping only the latest pending call per topic. Calls
    /// that would not change the subscribed list are dropped, so the queue
    /// never holds more entries than there are distinct topics.
    fn defer(&mut self, mut call: Deferred) {
        let topics = dedup(call.topics());
        for queued in self.deferred.iter_mut() {
            queued.topics_mut().retain(|topic| !topics.contains(topic));
        }
        self.deferred.retain(|queued| !queued.topics().is_empty());

        let subscribe = matches!(call, Deferred::Subscribe(_));
        *call.topics_mut() = topics
            .into_iter()
            .filter(|topic| self.subscribed.contains(topic) != subscribe)
            .collect();
        if call.topics().is_empty() {
            trace!("[feed] Nothing to queue");
            return;
        }

        debug!("[feed] Queued until connected: {:?}", call);
        self.deferred.push_back(call);
    }

    // ========== Connecting ==========

    async fn connect_cycle(&mut self, max_attempts: Option<u32>) -> Result<(), FeedError> {
        let result = self.try_connect(max_attempts).await;
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
        result
    }

    async fn try_connect(&mut self, max_attempts: Option<u32>) -> Result<(), FeedError> {
        let endpoint = self.connector.endpoint();
        self.set_state(ConnectionState::Connecting);
        self.backoff.reset();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            info!(
                "[feed] Connecting to {} (attempt {}{})",
                endpoint,
                attempt,
                max_attempts.map(|max| format!("/{}", max)).unwrap_or_default()
            );

            let error = match self.attempt().await {
                Attempt::Connected(session) => {
                    info!("[feed] Connected to {} on attempt {}", endpoint, attempt);
                    self.session = Some(session);
                    self.on_connected().await;
                    return Ok(());
                }
                Attempt::Cancelled => {
                    info!("[feed] Connect to {} cancelled", endpoint);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(FeedError::Closed);
                }
                Attempt::Failed(error) => error,
            };
            warn!("[feed] Connect attempt {} failed: {}", attempt, error);

            if max_attempts.is_some_and(|max| attempt >= max) {
                self.set_state(ConnectionState::Disconnected);
                let failure = FeedError::ConnectFailure {
                    url: endpoint,
                    attempts: attempt,
                    last_error: error.to_string(),
                };
                error!("[feed] {}", failure);
                return Err(failure);
            }

            let delay = self.backoff.next_delay();
            info!("[feed] Retrying in {}ms", delay.as_millis());
            if !self.pause(delay).await {
                self.set_state(ConnectionState::Disconnected);
                return Err(FeedError::Closed);
            }
        }
    }

    /// Opens one session and waits for its acknowledgement. The session is
    /// closed on every path that does not return it.
    async fn attempt(&mut self) -> Attempt<C::Session> {
        let deadline = Instant::now() + self.policy.timeout;

        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Attempt::Cancelled,
            result = timeout_at(deadline, self.connector.open(self.credential.as_ref())) => result,
        };
        let mut session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Attempt::Failed(e),
            Err(_) => return Attempt::Failed(self.timed_out()),
        };

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                command = self.commands.recv() => Wake::Command(command),
                _ = sleep_until(deadline) => Wake::Deadline,
                frame = session.recv() => Wake::Frame(frame),
            };

            let failure = match wake {
                Wake::Shutdown | Wake::Command(None) => {
                    session.close().await;
                    return Attempt::Cancelled;
                }
                Wake::Command(Some(command)) => {
                    self.defer_command(command);
                    continue;
                }
                Wake::Deadline => self.timed_out(),
                Wake::Frame(Some(Ok(InboundFrame::Connected))) => return Attempt::Connected(session),
                Wake::Frame(Some(Ok(InboundFrame::Keepalive))) => continue,
                Wake::Frame(Some(Ok(InboundFrame::Event { name, data }))) => {
                    self.handle_event(&name, &data);
                    continue;
                }
                Wake::Frame(Some(Ok(InboundFrame::Disconnected(reason)))) => {
                    TransportError::ConnectionClosed(reason)
                }
                Wake::Frame(Some(Err(e))) => e,
                Wake::Frame(None) => {
                    TransportError::ConnectionClosed("Stream ended before acknowledgement".to_string())
                }
            };
            session.close().await;
            return Attempt::Failed(failure);
        }
    }

    fn timed_out(&self) -> TransportError {
        TransportError::ConnectionFailed(format!(
            "No acknowledgement within {}s",
            self.policy.timeout.as_secs_f64()
        ))
    }

    /// Waits out a backoff delay, queuing commands meanwhile. Returns false
    /// when shutdown interrupted the wait.
    async fn pause(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                command = self.commands.recv() => Wake::Command(command),
                _ = sleep_until(deadline) => Wake::Deadline,
            };
            match wake {
                Wake::Deadline => return true,
                Wake::Command(Some(command)) => self.defer_command(command),
                _ => return false,
            }
        }
    }

    async fn on_connected(&mut self) {
        self.backoff.reset();

        let authenticate = self
            .credential
            .as_ref()
            .map(|credential| OutboundEvent::new(self.wire.authenticate_event.clone(), credential.bearer()));
        if let Some(event) = authenticate {
            if let Err(e) = self.send_event(event).await {
                warn!("[feed] Authentication event not sent: {}", e);
            }
        }

        let reconnect = self.has_connected;
        self.has_connected = true;

        let mut replayed = 0;
        if reconnect && !self.subscribed.is_empty() {
            let topics = self.subscribed.clone();
            info!("[feed] Resubscribing {} topic(s)", topics.len());
            let events = self.subscribe_events(&topics);
            self.transmit(Operation::Subscribe, events, topics.len()).await;
            replayed = topics.len();
        }

        if !self.deferred.is_empty() {
            debug!("[feed] Applying {} queued call(s)", self.deferred.len());
        }
        while let Some(call) = self.deferred.pop_front() {
            match call {
                Deferred::Subscribe(topics) => self.subscribe_now(topics).await,
                Deferred::Unsubscribe(topics) => self.unsubscribe_now(topics).await,
            }
        }

        self.set_state(ConnectionState::Connected);
        let timestamp = Utc::now();
        if reconnect {
            self.events.publish(FeedEvent::Reconnected {
                resubscribed: replayed,
                timestamp,
            });
        } else {
            self.events.publish(FeedEvent::Connected { timestamp });
        }
    }

    async fn on_disconnected(&mut self, reason: String) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.set_state(ConnectionState::Disconnected);

        let will_retry = self.policy.auto_reconnect && !self.shutdown.is_cancelled();
        warn!(
            "[feed] Disconnected: {}{}",
            reason,
            if will_retry { " (reconnecting)" } else { "" }
        );
        self.events.publish(FeedEvent::Disconnected {
            reason,
            will_retry,
            timestamp: Utc::now(),
        });

        if !will_retry {
            return;
        }
        match self.connect_cycle(self.policy.reconnect_attempts).await {
            Ok(()) => {}
            Err(FeedError::Closed) => debug!("[feed] Reconnect interrupted by shutdown"),
            Err(e) => {
                error!("[feed] Reconnect gave up, idle until connect() is called: {}", e);
                self.events.publish(FeedEvent::Disconnected {
                    reason: e.to_string(),
                    will_retry: false,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    // ========== Inbound ==========

    async fn handle_frame(&mut self, frame: Option<Result<InboundFrame, TransportError>>) {
        match frame {
            Some(Ok(InboundFrame::Event { name, data })) => self.handle_event(&name, &data),
            Some(Ok(InboundFrame::Keepalive)) => trace!("[feed] Keepalive"),
            Some(Ok(InboundFrame::Connected)) => debug!("[feed] Repeated connect acknowledgement"),
            Some(Ok(InboundFrame::Disconnected(reason))) => self.on_disconnected(reason).await,
            Some(Err(e)) => self.on_disconnected(e.to_string()).await,
            None => self.on_disconnected("Stream ended".to_string()).await,
        }
    }

    fn handle_event(&mut self, name: &str, data: &Value) {
        let dispatched = self.dispatcher.dispatch(name, data, Utc::now());
        if dispatched.qualifying {
            self.liveness.observe(Instant::now());
        }
        for event in dispatched.events {
            self.events.publish(event);
        }
    }

    // ========== Outbound ==========

    fn topic_payload(&self, topics: &[Topic]) -> Value {
        let mut payload = Map::new();
        payload.insert(self.wire.topic_key.clone(), json!(topics));
        Value::Object(payload)
    }

    fn subscribe_events(&self, topics: &[Topic]) -> Vec<OutboundEvent> {
        let payload = self.topic_payload(topics);
        let mut events: Vec<OutboundEvent> = std::iter::once(&self.wire.subscribe_event)
            .chain(&self.wire.fallback_subscribe_events)
            .map(|name| OutboundEvent::new(name.clone(), payload.clone()))
            .collect();
        if self.credential.is_some() {
            events.push(OutboundEvent::new(
                self.wire.positions_subscribe_event.clone(),
                payload,
            ));
        }
        events
    }

    fn unsubscribe_events(&self, topics: &[Topic]) -> Vec<OutboundEvent> {
        let payload = self.topic_payload(topics);
        let mut events = vec![OutboundEvent::new(
            self.wire.unsubscribe_event.clone(),
            payload.clone(),
        )];
        if self.credential.is_some() {
            events.push(OutboundEvent::new(
                self.wire.positions_unsubscribe_event.clone(),
                payload,
            ));
        }
        events
    }

    async fn subscribe_now(&mut self, topics: Vec<Topic>) {
        let topics = dedup(&topics);
        if topics.is_empty() {
            return;
        }

        let events = self.subscribe_events(&topics);
        self.transmit(Operation::Subscribe, events, topics.len()).await;

        let before = self.subscribed.len();
        for topic in topics {
            if !self.subscribed.contains(&topic) {
                self.subscribed.push(topic);
            }
        }
        info!(
            "[feed] Subscribed: {} new, {} total",
            self.subscribed.len() - before,
            self.subscribed.len()
        );
        self.publish_subscribed();
    }

    async fn unsubscribe_now(&mut self, topics: Vec<Topic>) {
        let topics = dedup(&topics);
        if topics.is_empty() {
            return;
        }

        let events = self.unsubscribe_events(&topics);
        self.transmit(Operation::Unsubscribe, events, topics.len()).await;

        let before = self.subscribed.len();
        self.subscribed.retain(|topic| !topics.contains(topic));
        info!(
            "[feed] Unsubscribed: {} removed, {} total",
            before - self.subscribed.len(),
            self.subscribed.len()
        );
        self.publish_subscribed();
    }

    async fn probe_now(&mut self) {
        if self.subscribed.is_empty() || self.wire.probe_events.is_empty() {
            trace!("[feed] Nothing to probe");
            return;
        }

        let mut payload = Map::new();
        payload.insert(self.wire.topic_key.clone(), json!(self.subscribed));
        payload.insert("marketSlugs".to_string(), json!([]));
        let payload = Value::Object(payload);

        let events = self
            .wire
            .probe_events
            .iter()
            .map(|name| OutboundEvent::new(name.clone(), payload.clone()))
            .collect();
        debug!("[feed] Probing {} topic(s)", self.subscribed.len());
        self.transmit(Operation::Probe, events, self.subscribed.len()).await;
    }

    /// Sends `events` in order, stopping at the first failure. Failures are
    /// logged and published, never returned.
    async fn transmit(&mut self, operation: Operation, events: Vec<OutboundEvent>, topics: usize) {
        for event in events {
            let name = event.name.clone();
            if let Err(e) = self.send_event(event).await {
                let failure = FeedError::TransmitFailure {
                    operation,
                    reason: e.to_string(),
                };
                warn!("[feed] {} ({} topic(s), event {})", failure, topics, name);
                self.events.publish(FeedEvent::TransmitFailed {
                    operation,
                    topics,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return;
            }
        }
    }

    async fn send_event(&mut self, event: OutboundEvent) -> Result<(), TransportError> {
        match self.session.as_mut() {
            Some(session) => session.send(event).await,
            None => Err(TransportError::SendFailed("Not connected".to_string())),
        }
    }

    // ========== State ==========

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("[feed] State: {} -> {}", previous, state);
        }
    }

    fn publish_subscribed(&self) {
        self.subscribed_tx.send_replace(self.subscribed.clone());
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(FeedError::Closed));
        }
        if !self.deferred.is_empty() {
            debug!("[feed] Dropping {} queued call(s)", self.deferred.len());
        }
        info!("[feed] Manager stopped");
    }
}
