//! Drain Worker Pool - Bounded Read Tasks Off the Control Task
//!
//! A fixed set of tokio tasks pulls `DrainTask`s from one bounded
//! queue. Each task performs a single non-blocking read of at most one
//! buffer, hands the bytes to the message processor and reports back
//! to the control task whether the connection should be re-armed or
//! has been torn down. Nothing that goes wrong inside a drain (I/O
//! error, processor error, panic) leaves the task boundary.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::metrics::RouterMetrics;
use crate::domain::{ClientId, ClientRole, Connection, DisconnectReason};
use crate::ports::{InboundChunk, MessageProcessor, RegistrationListener};

/// One dispatched readiness event.
#[derive(Debug)]
pub struct DrainTask {
    /// Multiplexer slot (connection serial).
    pub slot: u64,
    pub connection: Arc<Connection>,
    pub client_id: ClientId,
    pub role: ClientRole,
}

/// Result of a drain, reported back to the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Connection is healthy; arm it for the next read.
    Rearm(u64),
    /// Connection was torn down; drop its registration.
    Closed(u64),
}

/// Everything a drain needs besides the task itself.
pub struct DrainContext {
    pub listener: Arc<dyn RegistrationListener>,
    pub processor: Arc<dyn MessageProcessor>,
    pub metrics: Arc<RouterMetrics>,
    /// Maximum bytes per read.
    pub buffer_size: usize,
}

enum DrainStep {
    Continue,
    EndOfStream,
    Failed,
}

/// Fixed-size pool of drain workers.
pub struct WorkerPool {
    queue: mpsc::Sender<DrainTask>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of `queue_capacity` tasks.
    pub fn spawn(
        size: usize,
        queue_capacity: usize,
        ctx: Arc<DrainContext>,
        outcomes: mpsc::UnboundedSender<DrainOutcome>,
    ) -> Self {
        let (queue, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&ctx),
                    outcomes.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), queue_capacity, "Drain worker pool started");
        Self { queue, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task without waiting. A full or closed queue hands the
    /// task back.
    pub fn try_submit(&self, task: DrainTask) -> Result<(), TrySendError<DrainTask>> {
        self.queue.try_send(task)
    }

    /// Wait for room in the queue.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, DrainTask>, SendError<()>> {
        self.queue.reserve().await
    }

    /// Stop accepting tasks and give in-flight drains `grace` to finish.
    ///
    /// Workers still running after the grace period are left to finish
    /// on their own.
    pub async fn shutdown(self, grace: Duration) {
        let Self { queue, workers } = self;
        drop(queue);

        match tokio::time::timeout(grace, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Drain worker ended abnormally");
                    }
                }
                info!("Drain worker pool stopped");
            }
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "Drain workers still busy after grace period"
            ),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DrainTask>>>,
    ctx: Arc<DrainContext>,
    outcomes: mpsc::UnboundedSender<DrainOutcome>,
) {
    let mut buffer = vec![0u8; ctx.buffer_size.max(1)];
    debug!(worker_id, "Drain worker started");

    loop {
        let task = queue.lock().await.recv().await;
        let Some(task) = task else { break };

        let outcome = run_drain(&ctx, task, &mut buffer).await;
        // The control task is gone during shutdown.
        let _ = outcomes.send(outcome);
    }

    debug!(worker_id, "Drain worker stopped");
}

/// Execute one drain and map it to an outcome.
///
/// End-of-stream and every failure run the disconnect path here, on the
/// worker, so the control task never blocks on teardown.
pub async fn run_drain(ctx: &DrainContext, task: DrainTask, buffer: &mut [u8]) -> DrainOutcome {
    let started = Instant::now();
    let step = match AssertUnwindSafe(drain_once(ctx, &task, buffer))
        .catch_unwind()
        .await
    {
        Ok(step) => step,
        Err(_) => {
            error!(client_id = %task.client_id, "Drain task panicked");
            DrainStep::Failed
        }
    };

    ctx.metrics.drains_total.inc();
    ctx.metrics
        .drain_latency_us
        .observe(started.elapsed().as_micros() as f64);

    match step {
        DrainStep::Continue => DrainOutcome::Rearm(task.slot),
        DrainStep::EndOfStream => {
            super::disconnect(
                ctx.listener.as_ref(),
                &ctx.metrics,
                &task.connection,
                DisconnectReason::EndOfStream,
            );
            DrainOutcome::Closed(task.slot)
        }
        DrainStep::Failed => {
            ctx.metrics.drain_failures.inc();
            super::disconnect(
                ctx.listener.as_ref(),
                &ctx.metrics,
                &task.connection,
                DisconnectReason::Failure,
            );
            DrainOutcome::Closed(task.slot)
        }
    }
}

async fn drain_once(ctx: &DrainContext, task: &DrainTask, buffer: &mut [u8]) -> DrainStep {
    match task.connection.try_read(buffer) {
        Ok(0) => {
            debug!(client_id = %task.client_id, "Peer closed connection");
            DrainStep::EndOfStream
        }
        Ok(n) => {
            ctx.metrics.record_bytes(task.role, n);
            let chunk = InboundChunk {
                client_id: &task.client_id,
                role: task.role,
                payload: &buffer[..n],
            };
            match ctx.processor.process(chunk).await {
                Ok(()) => DrainStep::Continue,
                Err(e) => {
                    warn!(client_id = %task.client_id, error = %e, "Processor rejected inbound chunk");
                    DrainStep::Failed
                }
            }
        }
        // Spurious readiness; tokio has cleared it, so re-arming waits for real data.
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            DrainStep::Continue
        }
        Err(e) => {
            warn!(client_id = %task.client_id, error = %e, "Error reading from client");
            DrainStep::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::adapters::processing::ChannelProcessor;
    use crate::usecases::{Router, RoutingTable};

    struct PanickingProcessor;

    #[async_trait]
    impl MessageProcessor for PanickingProcessor {
        async fn process(&self, _chunk: InboundChunk<'_>) -> anyhow::Result<()> {
            panic!("decoder bug");
        }
    }

    struct Harness {
        router: Arc<Router>,
        task: DrainTask,
        client: TcpStream,
    }

    async fn harness() -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let metrics = Arc::new(RouterMetrics::new().unwrap());
        let router = Arc::new(Router::new(Arc::new(RoutingTable::new(port)), port, metrics));
        let connection = Arc::new(Connection::new(3, server).unwrap());
        let client_id = router.on_connected(Arc::clone(&connection), port).unwrap();

        Harness {
            router,
            task: DrainTask {
                slot: 3,
                connection,
                client_id,
                role: ClientRole::Broker,
            },
            client,
        }
    }

    fn context(router: &Arc<Router>, processor: Arc<dyn MessageProcessor>, buffer_size: usize) -> DrainContext {
        DrainContext {
            listener: Arc::clone(router) as Arc<dyn RegistrationListener>,
            processor,
            metrics: Arc::new(RouterMetrics::new().unwrap()),
            buffer_size,
        }
    }

    #[tokio::test]
    async fn test_data_is_processed_and_rearmed() {
        let mut h = harness().await;
        let (processor, mut rx) = ChannelProcessor::new(8);
        let ctx = context(&h.router, Arc::new(processor), 1024);

        h.client.write_all(b"hello").await.unwrap();
        h.task.connection.readable().await.unwrap();

        let id = h.task.client_id.clone();
        let mut buffer = vec![0u8; ctx.buffer_size];
        let outcome = run_drain(&ctx, h.task, &mut buffer).await;

        assert_eq!(outcome, DrainOutcome::Rearm(3));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.client_id, id);
        assert_eq!(message.payload, b"hello");
    }

    #[tokio::test]
    async fn test_single_read_is_bounded_by_buffer() {
        let mut h = harness().await;
        let (processor, mut rx) = ChannelProcessor::new(8);
        let ctx = context(&h.router, Arc::new(processor), 4);

        h.client.write_all(b"0123456789").await.unwrap();
        h.task.connection.readable().await.unwrap();

        let mut buffer = vec![0u8; ctx.buffer_size];
        assert_eq!(run_drain(&ctx, h.task, &mut buffer).await, DrainOutcome::Rearm(3));
        assert_eq!(rx.recv().await.unwrap().payload.len(), 4);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_end_of_stream_disconnects() {
        let h = harness().await;
        let (processor, _rx) = ChannelProcessor::new(8);
        let ctx = context(&h.router, Arc::new(processor), 1024);
        let id = h.task.client_id.clone();
        let connection = Arc::clone(&h.task.connection);

        drop(h.client);
        connection.readable().await.unwrap();

        let mut buffer = vec![0u8; ctx.buffer_size];
        assert_eq!(run_drain(&ctx, h.task, &mut buffer).await, DrainOutcome::Closed(3));
        assert!(h.router.client_role(&id).unwrap_err().is_not_found());
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_processor_panic_is_contained() {
        let mut h = harness().await;
        let ctx = context(&h.router, Arc::new(PanickingProcessor), 1024);
        let id = h.task.client_id.clone();

        h.client.write_all(b"boom").await.unwrap();
        h.task.connection.readable().await.unwrap();

        let mut buffer = vec![0u8; ctx.buffer_size];
        assert_eq!(run_drain(&ctx, h.task, &mut buffer).await, DrainOutcome::Closed(3));
        assert!(!h.router.table().contains_client(&id));
        assert_eq!(ctx.metrics.drain_failures.get(), 1);
    }
}
