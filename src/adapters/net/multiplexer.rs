//! Connection Multiplexer - Single-Task Accept/Readiness Loop
//!
//! One control task owns the broker and market listeners plus the set
//! of connections armed for read readiness. It never reads from a
//! client: a ready connection is disarmed (moved to `Dispatched`) and
//! handed to the drain pool, and is re-armed only when the worker
//! reports back through the completion channel. That channel is also
//! what wakes the loop, so a re-armed connection is watched again
//! immediately.
//!
//! Accept failures (for example descriptor exhaustion) pause both
//! listeners with an exponential backoff instead of re-polling a
//! listener that stays ready.
//!
//! Backpressure: the drain queue is bounded. When it is full, ready
//! connections wait in a backlog owned by the control task; since a
//! connection has at most one pending dispatch, the backlog never holds
//! more entries than there are connections.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, trace, warn};

use super::state::ConnectionState;
use super::worker_pool::{DrainContext, DrainOutcome, DrainTask, WorkerPool};
use crate::adapters::metrics::RouterMetrics;
use crate::config::{NetworkConfig, WorkerConfig};
use crate::domain::{ClientId, ClientRole, Connection, DisconnectReason, RouterError};
use crate::ports::{MessageProcessor, RegistrationListener};

/// First pause after an accept failure.
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
/// Longest pause between accept attempts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);
/// Upper bound on delivering the routing id to a new client.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound listeners, ready to run.
pub struct ConnectionMultiplexer {
    broker: TcpListener,
    market: TcpListener,
    broker_addr: SocketAddr,
    market_addr: SocketAddr,
    network: NetworkConfig,
    workers: WorkerConfig,
}

/// Readiness report for an armed connection.
enum Readiness {
    Readable(u64),
    Idle(u64),
    Failed(u64, io::Error),
}

/// What woke the control loop.
enum Event<'a> {
    Shutdown,
    Accepted(io::Result<(TcpStream, SocketAddr)>, u16),
    Ready(Readiness),
    Completed(DrainOutcome),
    Capacity(mpsc::Permit<'a, DrainTask>),
    ResumeAccept,
}

/// Accept pause after consecutive failures, doubling up to a cap.
#[derive(Debug, Default)]
struct AcceptBackoff {
    failures: u32,
    resume_at: Option<Instant>,
}

impl AcceptBackoff {
    /// Record a failure at `now` and return the pause it starts.
    fn on_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(16);
        let delay = ACCEPT_BACKOFF_BASE
            .saturating_mul(2u32.pow(exponent))
            .min(ACCEPT_BACKOFF_MAX);
        self.resume_at = Some(now + delay);
        delay
    }

    fn on_success(&mut self) {
        self.failures = 0;
    }

    fn resume(&mut self) {
        self.resume_at = None;
    }

    const fn is_paused(&self) -> bool {
        self.resume_at.is_some()
    }
}

struct Slot {
    connection: Arc<Connection>,
    client_id: ClientId,
    role: ClientRole,
    state: ConnectionState,
}

impl Slot {
    /// Move to the terminal state.
    fn close(&mut self) {
        if let Err(e) = self.state.transition(ConnectionState::Closed) {
            error!(client_id = %self.client_id, error = %e, "Close for a connection already closed");
        }
    }
}

/// Control-task state: tracked connections and armed registrations.
struct Reactor {
    slots: HashMap<u64, Slot>,
    armed: FuturesUnordered<BoxFuture<'static, Readiness>>,
    backlog: VecDeque<DrainTask>,
    backoff: AcceptBackoff,
    next_serial: u64,
    listener: Arc<dyn RegistrationListener>,
    metrics: Arc<RouterMetrics>,
    broker_port: u16,
    idle_timeout: Option<Duration>,
    announce_id: bool,
    nodelay: bool,
}

impl ConnectionMultiplexer {
    /// Bind both listeners.
    ///
    /// # Errors
    /// `RouterError::Bind` if either address cannot be bound. This is the
    /// only fatal error of the router.
    pub async fn bind(network: &NetworkConfig, workers: &WorkerConfig) -> Result<Self, RouterError> {
        let broker = bind_listener(network.broker_address(), ClientRole::Broker).await?;
        let market = bind_listener(network.market_address(), ClientRole::Market).await?;

        let broker_addr = local_addr(&broker, ClientRole::Broker)?;
        let market_addr = local_addr(&market, ClientRole::Market)?;
        info!(broker = %broker_addr, market = %market_addr, "Listening for broker and market clients");

        Ok(Self {
            broker,
            market,
            broker_addr,
            market_addr,
            network: network.clone(),
            workers: workers.clone(),
        })
    }

    pub const fn broker_addr(&self) -> SocketAddr {
        self.broker_addr
    }

    pub const fn market_addr(&self) -> SocketAddr {
        self.market_addr
    }

    /// Run the control loop until `shutdown_rx` fires.
    ///
    /// On shutdown every tracked connection is disconnected through the
    /// listener, the drain queue is closed, in-flight drains get the
    /// configured grace period, and both listeners are closed.
    #[instrument(skip_all, fields(broker = %self.broker_addr, market = %self.market_addr))]
    pub async fn run(
        self,
        listener: Arc<dyn RegistrationListener>,
        processor: Arc<dyn MessageProcessor>,
        metrics: Arc<RouterMetrics>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let Self {
            broker,
            market,
            broker_addr,
            market_addr,
            network,
            workers,
        } = self;

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(DrainContext {
            listener: Arc::clone(&listener),
            processor,
            metrics: Arc::clone(&metrics),
            buffer_size: workers.buffer_size,
        });
        let pool = WorkerPool::spawn(workers.worker_count(), workers.queue_capacity, ctx, outcome_tx);

        let mut reactor = Reactor {
            slots: HashMap::new(),
            armed: FuturesUnordered::new(),
            backlog: VecDeque::new(),
            backoff: AcceptBackoff::default(),
            next_serial: 0,
            listener,
            metrics,
            broker_port: broker_addr.port(),
            idle_timeout: network.idle_timeout(),
            announce_id: network.announce_id,
            nodelay: network.nodelay,
        };

        info!(workers = pool.size(), "Router event loop started");

        loop {
            let has_backlog = !reactor.backlog.is_empty();
            let has_armed = !reactor.armed.is_empty();
            let accepting = !reactor.backoff.is_paused();
            let resume_at = reactor.backoff.resume_at.unwrap_or_else(Instant::now);

            let event = tokio::select! {
                _ = shutdown_rx.recv() => Event::Shutdown,
                Some(outcome) = outcome_rx.recv() => Event::Completed(outcome),
                Some(ready) = reactor.armed.next(), if has_armed => Event::Ready(ready),
                Ok(permit) = pool.reserve(), if has_backlog => Event::Capacity(permit),
                () = tokio::time::sleep_until(resume_at), if !accepting => Event::ResumeAccept,
                accepted = broker.accept(), if accepting => Event::Accepted(accepted, broker_addr.port()),
                accepted = market.accept(), if accepting => Event::Accepted(accepted, market_addr.port()),
            };

            match event {
                Event::Shutdown => break,
                Event::Accepted(accepted, port) => reactor.accept(accepted, port),
                Event::Ready(ready) => reactor.on_ready(ready, &pool),
                Event::Completed(outcome) => reactor.complete(outcome),
                Event::Capacity(permit) => reactor.flush_one(permit),
                Event::ResumeAccept => reactor.backoff.resume(),
            }
        }

        info!("Router event loop stopping");
        reactor.shutdown();
        pool.shutdown(workers.shutdown_grace()).await;
        drop(broker);
        drop(market);
        info!("Listeners closed");
    }
}

impl Reactor {
    fn accept(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>, port: u16) {
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                self.metrics.accept_errors.inc();
                let pause = self.backoff.on_failure(Instant::now());
                warn!(
                    port,
                    error = %e,
                    backoff_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX),
                    "Failed to accept connection"
                );
                return;
            }
        };
        self.backoff.on_success();

        let serial = self.next_serial;
        self.next_serial += 1;

        let connection = match Connection::new(serial, stream) {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                self.metrics.accept_errors.inc();
                warn!(peer = %peer, error = %e, "Connection lost before registration");
                return;
            }
        };
        if let Err(e) = connection.configure(self.nodelay) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let client_id = match self.listener.on_connected(Arc::clone(&connection), port) {
            Ok(id) => id,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Connection rejected");
                connection.retire();
                if let Err(e) = connection.shutdown() {
                    debug!(peer = %peer, error = %e, "Error closing rejected connection");
                }
                return;
            }
        };

        if self.announce_id {
            announce(Arc::clone(&connection), client_id.clone());
        }

        let mut slot = Slot {
            connection,
            client_id,
            role: ClientRole::from_port(port, self.broker_port),
            state: ConnectionState::Accepted,
        };
        if let Err(e) = slot.state.transition(ConnectionState::AwaitingRead) {
            error!(error = %e, "Fresh connection could not be armed");
            return;
        }

        self.arm(serial, &slot.connection);
        self.slots.insert(serial, slot);
    }

    /// Register interest in read readiness for one connection.
    fn arm(&self, serial: u64, connection: &Arc<Connection>) {
        let connection = Arc::clone(connection);
        let idle_timeout = self.idle_timeout;

        self.armed.push(Box::pin(async move {
            let result = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, connection.readable()).await {
                    Ok(result) => result,
                    Err(_) => return Readiness::Idle(serial),
                },
                None => connection.readable().await,
            };
            match result {
                Ok(()) => Readiness::Readable(serial),
                Err(e) => Readiness::Failed(serial, e),
            }
        }));
    }

    fn on_ready(&mut self, ready: Readiness, pool: &WorkerPool) {
        match ready {
            Readiness::Readable(serial) => self.dispatch(serial, pool),
            Readiness::Idle(serial) => {
                if let Some(slot) = self.slots.get(&serial) {
                    info!(client_id = %slot.client_id, "Idle timeout, disconnecting client");
                }
                self.close_slot(serial, DisconnectReason::Idle);
            }
            Readiness::Failed(serial, e) => {
                warn!(serial, error = %e, "Readiness wait failed");
                self.close_slot(serial, DisconnectReason::Failure);
            }
        }
    }

    /// Disarm a ready connection and hand it to the pool.
    fn dispatch(&mut self, serial: u64, pool: &WorkerPool) {
        let Some(slot) = self.slots.get_mut(&serial) else {
            return;
        };
        if let Err(e) = slot.state.transition(ConnectionState::Dispatched) {
            error!(client_id = %slot.client_id, error = %e, "Readiness for a connection not awaiting read");
            return;
        }

        let task = DrainTask {
            slot: serial,
            connection: Arc::clone(&slot.connection),
            client_id: slot.client_id.clone(),
            role: slot.role,
        };

        // Keep FIFO order behind already-waiting connections.
        if !self.backlog.is_empty() {
            self.push_backlog(task);
            return;
        }

        match pool.try_submit(task) {
            Ok(()) => trace!(serial, "Dispatched to drain pool"),
            Err(TrySendError::Full(task)) => self.push_backlog(task),
            Err(TrySendError::Closed(task)) => {
                error!(client_id = %task.client_id, "Drain queue closed");
                self.close_slot(task.slot, DisconnectReason::Failure);
            }
        }
    }

    fn push_backlog(&mut self, task: DrainTask) {
        self.backlog.push_back(task);
        self.metrics.dispatch_backlog.set(self.backlog.len() as i64);
    }

    fn flush_one(&mut self, permit: mpsc::Permit<'_, DrainTask>) {
        if let Some(task) = self.backlog.pop_front() {
            permit.send(task);
        }
        self.metrics.dispatch_backlog.set(self.backlog.len() as i64);
    }

    fn complete(&mut self, outcome: DrainOutcome) {
        match outcome {
            DrainOutcome::Rearm(serial) => {
                let Some(slot) = self.slots.get_mut(&serial) else {
                    return;
                };
                if let Err(e) = slot.state.transition(ConnectionState::AwaitingRead) {
                    error!(client_id = %slot.client_id, error = %e, "Re-arm for a connection not dispatched");
                    return;
                }
                let connection = Arc::clone(&slot.connection);
                self.arm(serial, &connection);
            }
            DrainOutcome::Closed(serial) => {
                if let Some(mut slot) = self.slots.remove(&serial) {
                    slot.close();
                    trace!(client_id = %slot.client_id, "Registration dropped");
                }
            }
        }
    }

    /// Disconnect a connection from the control task (idle, failed wait).
    fn close_slot(&mut self, serial: u64, reason: DisconnectReason) {
        if let Some(mut slot) = self.slots.remove(&serial) {
            slot.close();
            super::disconnect(self.listener.as_ref(), &self.metrics, &slot.connection, reason);
        }
    }

    /// Cancel every registration and close every tracked connection.
    fn shutdown(&mut self) {
        self.armed = FuturesUnordered::new();
        self.backlog.clear();
        self.metrics.dispatch_backlog.set(0);

        let tracked = self.slots.len();
        for (_, mut slot) in self.slots.drain() {
            slot.close();
            super::disconnect(
                self.listener.as_ref(),
                &self.metrics,
                &slot.connection,
                DisconnectReason::Shutdown,
            );
        }
        info!(connections = tracked, "Closed tracked connections");
    }
}

/// Tell a freshly registered client its routing identifier.
///
/// Runs on its own task; the control loop never waits on a client write.
fn announce(connection: Arc<Connection>, client_id: ClientId) {
    tokio::spawn(async move {
        let line = format!("{client_id}\n");
        match tokio::time::timeout(ANNOUNCE_TIMEOUT, connection.send(line.as_bytes())).await {
            Ok(Ok(())) => trace!(client_id = %client_id, "Routing id announced"),
            Ok(Err(e)) => warn!(client_id = %client_id, error = %e, "Failed to announce routing id"),
            Err(_) => warn!(client_id = %client_id, "Routing id announcement timed out"),
        }
    });
}

async fn bind_listener(address: String, role: ClientRole) -> Result<TcpListener, RouterError> {
    match TcpListener::bind(&address).await {
        Ok(listener) => Ok(listener),
        Err(source) => Err(RouterError::Bind { role, address, source }),
    }
}

fn local_addr(listener: &TcpListener, role: ClientRole) -> Result<SocketAddr, RouterError> {
    listener.local_addr().map_err(|source| RouterError::Bind {
        role,
        address: "<unknown>".to_string(),
        source,
    })
}
