use crate::connection::{Client, ClientId, ClientInfo, UserId};
use crate::error::{Error, Result, SseErrorKind};
use crate::message::{BroadcastMessage, Event, MessageScope, HEARTBEAT};
use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fixed configuration of a hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Outbound buffer per client, in events
    pub buffer_size: usize,
    /// Cap on connected clients across all users
    pub max_clients: Option<usize>,
    /// Cap on connected clients per user; the oldest is evicted to make room
    pub max_clients_per_user: Option<usize>,
    pub heartbeat_interval: Duration,
    pub register_queue_size: usize,
    pub unregister_queue_size: usize,
    pub broadcast_queue_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            max_clients: None,
            max_clients_per_user: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            register_queue_size: 100,
            unregister_queue_size: 100,
            broadcast_queue_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubStatus {
    #[default]
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

/// Point-in-time snapshot of the hub.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub status: HubStatus,
    pub total_clients: usize,
    pub connected_users: usize,
    pub clients_per_user: HashMap<UserId, usize>,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub events_sent: u64,
    pub events_dropped: u64,
    pub uptime_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

struct Registration {
    client: Client,
    // Oldest client of the same user, already disconnected, to drop first
    evicted: Option<ClientId>,
}

struct Receivers {
    register: Receiver<Registration>,
    unregister: Receiver<ClientId>,
    broadcast: Receiver<BroadcastMessage>,
}

/// Everything the event loop owns. Only the loop takes the write lock;
/// queries read through the same lock.
#[derive(Default)]
struct HubState {
    status: HubStatus,
    clients: HashMap<ClientId, Client>,
    // Per user, in registration order (oldest first)
    user_clients: HashMap<UserId, Vec<ClientId>>,
    connections_opened: u64,
    connections_closed: u64,
    events_sent: u64,
    events_dropped: u64,
    started: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl HubState {
    fn insert(&mut self, client: Client) {
        let id = client.id().to_string();
        self.user_clients
            .entry(client.user_id().to_string())
            .or_default()
            .push(id.clone());
        self.clients.insert(id, client);
        self.connections_opened += 1;
    }

    /// Removes and disconnects a client. Unknown IDs are ignored.
    fn remove(&mut self, client_id: &str) -> Option<Client> {
        let client = self.clients.remove(client_id)?;

        if let Some(ids) = self.user_clients.get_mut(client.user_id()) {
            ids.retain(|id| id != client_id);
            if ids.is_empty() {
                self.user_clients.remove(client.user_id());
            }
        }

        client.disconnect();
        self.connections_closed += 1;
        Some(client)
    }

    fn user_client_count(&self, user_id: &str) -> usize {
        self.user_clients.get(user_id).map_or(0, Vec::len)
    }

    fn oldest_client(&self, user_id: &str) -> Option<&ClientId> {
        self.user_clients.get(user_id)?.first()
    }

    /// Resolves a scope to the currently registered, de-duplicated client IDs.
    fn targets(&self, scope: MessageScope<'_>) -> Vec<ClientId> {
        let candidates: Vec<&ClientId> = match scope {
            MessageScope::Clients(ids) => ids.iter().collect(),
            MessageScope::Users(user_ids) => user_ids
                .iter()
                .filter_map(|user_id| self.user_clients.get(user_id))
                .flatten()
                .collect(),
            MessageScope::Broadcast => self.clients.keys().collect(),
        };

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|id| self.clients.contains_key(*id) && seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Try-sends to each target. A full or closed buffer drops the event for
    /// that client only.
    fn deliver(&mut self, targets: &[ClientId], event: &Event) {
        for id in targets {
            let Some(client) = self.clients.get(id) else {
                continue;
            };
            match client.try_send(event.clone()) {
                Ok(()) => self.events_sent += 1,
                Err(TrySendError::Full(_)) => {
                    self.events_dropped += 1;
                    debug!("SSE client {id} buffer full, dropping event {}", event.id);
                }
                Err(TrySendError::Closed(_)) => {
                    self.events_dropped += 1;
                    debug!("SSE client {id} receiver closed, dropping event {}", event.id);
                }
            }
        }
    }

    fn disconnect_all(&mut self) {
        for client in self.clients.values() {
            client.disconnect();
        }
        self.connections_closed += self.clients.len() as u64;
        self.clients.clear();
        self.user_clients.clear();
    }

    fn stats(&self) -> HubStats {
        HubStats {
            status: self.status,
            total_clients: self.clients.len(),
            connected_users: self.user_clients.len(),
            clients_per_user: self
                .user_clients
                .iter()
                .map(|(user_id, ids)| (user_id.clone(), ids.len()))
                .collect(),
            connections_opened: self.connections_opened,
            connections_closed: self.connections_closed,
            events_sent: self.events_sent,
            events_dropped: self.events_dropped,
            uptime_seconds: self.started.map_or(0, |started| started.elapsed().as_secs()),
            started_at: self.started_at,
            last_heartbeat: self.last_heartbeat,
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let listed: usize = self.user_clients.values().map(Vec::len).sum();
        listed == self.clients.len()
            && self.user_clients.iter().all(|(user_id, ids)| {
                !ids.is_empty()
                    && ids.iter().all(|id| {
                        self.clients
                            .get(id)
                            .is_some_and(|client| client.user_id() == user_id)
                    })
            })
    }
}

fn read(state: &RwLock<HubState>) -> RwLockReadGuard<'_, HubState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &RwLock<HubState>) -> RwLockWriteGuard<'_, HubState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-process SSE broadcast engine.
///
/// One event loop task, started by `run`, owns every mutation of the
/// client maps. Callers talk to it through bounded queues and get an error
/// straight away when a queue is full instead of waiting.
pub struct Hub {
    config: HubConfig,
    state: Arc<RwLock<HubState>>,
    register_tx: Sender<Registration>,
    unregister_tx: Sender<ClientId>,
    broadcast_tx: Sender<BroadcastMessage>,
    receivers: Mutex<Option<Receivers>>,
    // Admitted registrations the loop has not inserted yet
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let (register_tx, register) = mpsc::channel(config.register_queue_size.max(1));
        let (unregister_tx, unregister) = mpsc::channel(config.unregister_queue_size.max(1));
        let (broadcast_tx, broadcast) = mpsc::channel(config.broadcast_queue_size.max(1));

        Self {
            config,
            state: Arc::new(RwLock::new(HubState::default())),
            register_tx,
            unregister_tx,
            broadcast_tx,
            receivers: Mutex::new(Some(Receivers {
                register,
                unregister,
                broadcast,
            })),
            pending: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Starts the event loop. It runs until `ctx` is cancelled or
    /// `shutdown` is called, then disconnects every client.
    pub fn run(&self, ctx: CancellationToken) -> Result<JoinHandle<()>> {
        let receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::new(SseErrorKind::ServiceAlreadyRunning))?;

        {
            let mut state = write(&self.state);
            state.status = HubStatus::Running;
            state.started = Some(Instant::now());
            state.started_at = Some(Utc::now());
        }
        info!(
            "SSE hub running (buffer={}, max_clients={:?}, max_clients_per_user={:?}, heartbeat={:?})",
            self.config.buffer_size,
            self.config.max_clients,
            self.config.max_clients_per_user,
            self.config.heartbeat_interval,
        );

        let event_loop = EventLoop {
            state: Arc::clone(&self.state),
            pending: Arc::clone(&self.pending),
            max_clients: self.config.max_clients,
            max_clients_per_user: self.config.max_clients_per_user,
            heartbeat_interval: self.config.heartbeat_interval,
            receivers,
            ctx,
            shutdown: self.shutdown.clone(),
        };
        Ok(tokio::spawn(event_loop.run()))
    }

    /// Signals the event loop to stop. Repeated calls have no further effect.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down SSE hub");
        self.shutdown.cancel();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.status() == HubStatus::Running && !self.shutdown.is_cancelled() {
            Ok(())
        } else {
            Err(SseErrorKind::ServiceNotRunning.into())
        }
    }

    /// Admits a client and queues it for the event loop.
    ///
    /// Fails with `MaxClientsReached` when the global cap is reached, counting
    /// registrations still queued for the loop. When the user is at the
    /// per-user cap their oldest client is disconnected before the new one is
    /// queued.
    pub fn register_client(&self, client: Client) -> Result<()> {
        self.ensure_running()?;

        let evicted = {
            let state = read(&self.state);
            // Taken under the read lock so the loop cannot move a pending
            // registration into the map in between
            let pending = self.pending.fetch_add(1, Ordering::SeqCst);

            if let Some(max) = self.config.max_clients {
                if state.clients.len() + pending >= max {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    warn!(
                        "Rejecting SSE client for user {}: {max} clients connected",
                        client.user_id()
                    );
                    return Err(SseErrorKind::MaxClientsReached.into());
                }
            }

            match self.config.max_clients_per_user {
                Some(max) if state.user_client_count(client.user_id()) >= max => state
                    .oldest_client(client.user_id())
                    .and_then(|id| state.clients.get(id))
                    .map(|oldest| {
                        info!(
                            "User {} reached {max} SSE clients, evicting {}",
                            client.user_id(),
                            oldest.id()
                        );
                        oldest.disconnect();
                        oldest.id().to_string()
                    }),
                _ => None,
            }
        };

        self.register_tx
            .try_send(Registration { client, evicted })
            .map_err(|e| {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                match e {
                    TrySendError::Full(_) => {
                        warn!("SSE registration queue is full");
                        Error::new(SseErrorKind::RegistrationQueueFull)
                    }
                    TrySendError::Closed(_) => Error::new(SseErrorKind::ServiceNotRunning),
                }
            })
    }

    /// Queues removal of a client. Unknown or already removed IDs are a
    /// no-op once processed.
    pub fn unregister_client(&self, client_id: &str) {
        match self.unregister_tx.try_send(client_id.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(client_id)) => {
                // Removal must not be lost, so wait for room off the caller's path
                let tx = self.unregister_tx.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            let _ = tx.send(client_id).await;
                        });
                    }
                    Err(_) => warn!("SSE unregister queue full, dropping removal of {client_id}"),
                }
            }
            Err(TrySendError::Closed(_)) => {
                trace!("SSE hub stopped; nothing to unregister for {client_id}");
            }
        }
    }

    /// Queues an event for delivery.
    pub fn broadcast(&self, message: BroadcastMessage) -> Result<()> {
        self.ensure_running()?;

        self.broadcast_tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!("SSE broadcast queue is full");
                Error::new(SseErrorKind::BroadcastQueueFull)
            }
            TrySendError::Closed(_) => Error::new(SseErrorKind::ServiceNotRunning),
        })
    }

    pub fn status(&self) -> HubStatus {
        read(&self.state).status
    }

    pub fn is_running(&self) -> bool {
        self.status() == HubStatus::Running
    }

    pub fn stats(&self) -> HubStats {
        read(&self.state).stats()
    }

    pub fn client_count(&self) -> usize {
        read(&self.state).clients.len()
    }

    pub fn get_client(&self, client_id: &str) -> Option<ClientInfo> {
        read(&self.state).clients.get(client_id).map(Client::info)
    }

    pub fn user_client_count(&self, user_id: &str) -> usize {
        read(&self.state).user_client_count(user_id)
    }

    /// Users with at least one connected client, sorted.
    pub fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = read(&self.state).user_clients.keys().cloned().collect();
        users.sort_unstable();
        users
    }

    /// A user's clients, oldest first.
    pub fn user_clients(&self, user_id: &str) -> Vec<ClientInfo> {
        let state = read(&self.state);
        state
            .user_clients
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.clients.get(id))
            .map(Client::info)
            .collect()
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct EventLoop {
    state: Arc<RwLock<HubState>>,
    pending: Arc<AtomicUsize>,
    max_clients: Option<usize>,
    max_clients_per_user: Option<usize>,
    heartbeat_interval: Duration,
    receivers: Receivers,
    ctx: CancellationToken,
    shutdown: CancellationToken,
}

impl EventLoop {
    async fn run(mut self) {
        let period = if self.heartbeat_interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.heartbeat_interval
        };
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.ctx.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
                Some(registration) = self.receivers.register.recv() => self.register(registration),
                Some(client_id) = self.receivers.unregister.recv() => self.unregister(&client_id),
                Some(message) = self.receivers.broadcast.recv() => self.broadcast(message),
                _ = heartbeat.tick() => self.heartbeat(),
            }
        }

        self.teardown();
    }

    fn register(&mut self, registration: Registration) {
        let Registration { client, evicted } = registration;
        let mut state = write(&self.state);
        self.pending.fetch_sub(1, Ordering::SeqCst);

        if let Some(evicted) = evicted {
            if state.remove(&evicted).is_some() {
                debug!("Evicted SSE client {evicted}");
            }
        }

        if let Some(max) = self.max_clients_per_user {
            while state.user_client_count(client.user_id()) >= max.max(1) {
                let Some(oldest) = state.oldest_client(client.user_id()).cloned() else {
                    break;
                };
                debug!("Evicted SSE client {oldest}");
                state.remove(&oldest);
            }
        }

        // The connection went away while the registration was queued
        if client.is_disconnected() {
            debug!("Skipping registration of disconnected SSE client {}", client.id());
            return;
        }

        if let Some(max) = self.max_clients {
            if state.clients.len() >= max {
                warn!(
                    "Dropping SSE client {} for user {}: {max} clients connected",
                    client.id(),
                    client.user_id()
                );
                client.disconnect();
                return;
            }
        }

        debug!(
            "Registered SSE client {} for user {}",
            client.id(),
            client.user_id()
        );
        state.insert(client);
    }

    fn unregister(&mut self, client_id: &str) {
        if write(&self.state).remove(client_id).is_some() {
            debug!("Unregistered SSE client {client_id}");
        }
    }

    fn broadcast(&mut self, message: BroadcastMessage) {
        let event = message.event.clone().with_defaults();
        let mut state = write(&self.state);
        let targets = state.targets(message.scope());
        trace!(
            "Broadcasting SSE event {} ({}) to {} client(s)",
            event.id,
            event.event_type,
            targets.len()
        );
        state.deliver(&targets, &event);
    }

    fn heartbeat(&mut self) {
        let now = Utc::now();
        let event = Event::new(HEARTBEAT, json!({ "timestamp": now })).with_defaults();
        let mut state = write(&self.state);
        let targets = state.targets(MessageScope::Broadcast);
        state.deliver(&targets, &event);
        state.last_heartbeat = Some(now);
    }

    fn teardown(&mut self) {
        let mut state = write(&self.state);
        state.status = HubStatus::ShuttingDown;
        let count = state.clients.len();
        state.disconnect_all();
        state.status = HubStatus::Stopped;
        info!("SSE hub stopped, disconnected {count} client(s)");
    }
}
