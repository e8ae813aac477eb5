//! Session manager - the connection lifecycle state machine
//!
//! Owns the current connection handle (or none) and drives the
//! connect / fail / backoff-reconnect / give-up transitions. On each
//! successful connect the handle generation is bumped, the attempt counter
//! resets, and the three duties are rebound to the new link. A failure
//! reported by any duty tears the stale handle down exactly once; reports
//! tagged with an older generation are dropped, so a handle swap racing an
//! in-flight duty operation never double-counts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::duty::{
    heartbeat_loop, inbound_loop, publisher_loop, BoundReader, FailureReport, FailureReporter,
    Link, MessageHandler, SharedLink,
};
use crate::error::LinkError;
use crate::policy::ReconnectPolicy;
use crate::transport::Transport;

/// Immutable configuration for one session. Constructed once at startup and
/// passed to the manager; there are no process-wide mutable settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint URI, e.g. `ws://localhost:5950`.
    pub uri: String,
    /// Maximum reconnect retries before the session is terminal.
    pub max_reconnect_attempts: u32,
    /// When false, the first failure of any kind ends the session.
    pub auto_reconnect: bool,
    /// Liveness probe period.
    pub heartbeat_period: Duration,
    /// Status publish period.
    pub publish_period: Duration,
    /// Backoff exponent base, seconds.
    pub backoff_base_secs: u64,
    /// Backoff ceiling, seconds.
    pub backoff_cap_secs: u64,
    /// Host identifier carried in status messages.
    pub host: String,
    /// Instance number carried in status messages.
    pub instance: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            uri: "ws://localhost:5950".to_string(),
            max_reconnect_attempts: 5,
            auto_reconnect: true,
            heartbeat_period: Duration::from_secs(10),
            publish_period: Duration::from_secs(5),
            backoff_base_secs: 2,
            backoff_cap_secs: 30,
            host: "Pier1".to_string(),
            instance: 1,
        }
    }
}

/// Lifecycle state of the session. A connection handle exists if and only if
/// the state is `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { generation: u64 },
    Backoff { attempt: u32, delay: Duration },
    Terminated,
}

enum ConnectedOutcome {
    Shutdown,
    Failed(LinkError),
}

/// The state machine. Sole owner of the current link: the only component
/// that may replace or close it.
pub struct SessionManager<T: Transport> {
    config: SessionConfig,
    policy: ReconnectPolicy,
    transport: T,
    link: SharedLink,
    state: Arc<RwLock<SessionState>>,
    events_tx: broadcast::Sender<SessionState>,
    shutdown_tx: broadcast::Sender<()>,
    failure_tx: mpsc::UnboundedSender<FailureReport>,
    failure_rx: StdMutex<Option<mpsc::UnboundedReceiver<FailureReport>>>,
    rebind_tx: mpsc::UnboundedSender<BoundReader>,
    rebind_rx: StdMutex<Option<mpsc::UnboundedReceiver<BoundReader>>>,
    on_message: MessageHandler,
    started: AtomicBool,
    stopped: AtomicBool,
    run_handle: StdMutex<Option<JoinHandle<Result<(), LinkError>>>>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let policy = ReconnectPolicy {
            max_attempts: config.max_reconnect_attempts,
            base_secs: config.backoff_base_secs,
            cap_secs: config.backoff_cap_secs,
        };
        let (events_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (rebind_tx, rebind_rx) = mpsc::unbounded_channel();

        Self {
            config,
            policy,
            transport,
            link: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            events_tx,
            shutdown_tx,
            failure_tx,
            failure_rx: StdMutex::new(Some(failure_rx)),
            rebind_tx,
            rebind_rx: StdMutex::new(Some(rebind_rx)),
            on_message: Arc::new(|text| info!(message = %text.trim_end(), "received")),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            run_handle: StdMutex::new(None),
        }
    }

    /// Replace the default (logging) inbound delivery callback.
    pub fn with_message_handler(
        mut self,
        handler: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Arc::new(handler);
        self
    }

    /// Begin the session. Idempotent: a second call is a no-op. Returns
    /// immediately; the duties and the state machine run as background tasks.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start() called on a running session");
            return;
        }

        let failure_rx = self.failure_rx.lock().unwrap().take();
        let rebind_rx = self.rebind_rx.lock().unwrap().take();
        let (Some(failure_rx), Some(rebind_rx)) = (failure_rx, rebind_rx) else {
            return;
        };

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.run(failure_rx, rebind_rx).await });
        *self.run_handle.lock().unwrap() = Some(handle);
    }

    /// Request termination. Safe to call from any state, any number of times;
    /// all duty suspension points (including a blocked receive) are cancelled
    /// and the active handle, if any, is closed exactly once.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Await the terminal state. `Ok(())` after `stop()`, the terminal error
    /// when the reconnect policy gave up.
    pub async fn wait(&self) -> Result<(), LinkError> {
        let handle = self.run_handle.lock().unwrap().take();
        match handle {
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| Err(LinkError::Internal(format!("session task: {}", e)))),
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Ordered stream of state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events_tx.subscribe()
    }

    /// Handle duties use to report connection failures.
    pub fn reporter(&self) -> FailureReporter {
        FailureReporter::new(self.failure_tx.clone())
    }

    async fn run(
        self: Arc<Self>,
        mut failure_rx: mpsc::UnboundedReceiver<FailureReport>,
        rebind_rx: mpsc::UnboundedReceiver<BoundReader>,
    ) -> Result<(), LinkError> {
        let reporter = self.reporter();
        let duties = vec![
            tokio::spawn(heartbeat_loop(
                Arc::clone(&self.link),
                self.config.heartbeat_period,
                reporter.clone(),
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(publisher_loop(
                Arc::clone(&self.link),
                self.config.host.clone(),
                self.config.instance,
                self.config.publish_period,
                reporter.clone(),
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(inbound_loop(
                rebind_rx,
                Arc::clone(&self.on_message),
                reporter,
                self.shutdown_tx.subscribe(),
            )),
        ];

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut attempts: u32 = 0;
        let mut generation: u64 = 0;

        let result = loop {
            // Covers a stop() issued before this task subscribed.
            if self.stopped.load(Ordering::SeqCst) {
                break Ok(());
            }
            self.set_state(SessionState::Connecting).await;
            info!(uri = %self.config.uri, "connecting");

            let connected = tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                result = self.transport.connect(&self.config.uri) => result,
            };

            let cause = match connected {
                Ok((writer, reader)) => {
                    generation += 1;
                    attempts = 0;
                    *self.link.write().await = Some(Link {
                        generation,
                        writer: Arc::new(Mutex::new(writer)),
                    });
                    if self.rebind_tx.send(BoundReader { generation, reader }).is_err() {
                        break Err(LinkError::Internal("inbound duty is gone".to_string()));
                    }
                    self.set_state(SessionState::Connected { generation }).await;
                    info!(uri = %self.config.uri, generation, "connected");

                    match self
                        .watch_connected(generation, &mut shutdown, &mut failure_rx)
                        .await
                    {
                        ConnectedOutcome::Shutdown => break Ok(()),
                        ConnectedOutcome::Failed(error) => {
                            self.teardown().await;
                            error
                        }
                    }
                }
                Err(e) => {
                    warn!(uri = %self.config.uri, error = %e, "connect failed");
                    e
                }
            };

            if !self.config.auto_reconnect {
                error!(error = %cause, "auto-reconnect disabled, session is terminal");
                break Err(cause);
            }

            let decision = self.policy.decide(attempts);
            if !decision.should_retry {
                error!(attempts, error = %cause, "reconnect attempts exhausted");
                break Err(LinkError::AttemptsExhausted { attempts });
            }
            attempts += 1;
            self.set_state(SessionState::Backoff {
                attempt: attempts,
                delay: decision.delay,
            })
            .await;
            info!(
                attempt = attempts,
                delay_secs = decision.delay.as_secs(),
                cause = %cause,
                "backing off before reconnect"
            );

            tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                _ = tokio::time::sleep(decision.delay) => {}
            }
        };

        // Terminal: stop the duties, close any in-flight handle, then publish
        // the final state.
        let _ = self.shutdown_tx.send(());
        for duty in &duties {
            duty.abort();
        }
        for duty in duties {
            let _ = duty.await;
        }
        self.teardown().await;
        self.set_state(SessionState::Terminated).await;
        info!("session terminated");
        result
    }

    /// Wait for the first failure report against the current generation.
    /// Reports for older generations are stale and dropped.
    async fn watch_connected(
        &self,
        generation: u64,
        shutdown: &mut broadcast::Receiver<()>,
        failure_rx: &mut mpsc::UnboundedReceiver<FailureReport>,
    ) -> ConnectedOutcome {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return ConnectedOutcome::Shutdown,
                report = failure_rx.recv() => match report {
                    Some(report) if report.generation == generation => {
                        warn!(generation, error = %report.error, "connection failure reported");
                        return ConnectedOutcome::Failed(report.error);
                    }
                    Some(report) => {
                        debug!(
                            reported = report.generation,
                            current = generation,
                            "ignoring stale failure report"
                        );
                    }
                    None => return ConnectedOutcome::Shutdown,
                },
            }
        }
    }

    /// Take the current link out of the shared cell and close it. The take is
    /// atomic, so a handle is never closed twice.
    async fn teardown(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            info!(generation = link.generation, "closing connection");
            link.writer.lock().await.close().await;
        }
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state.clone();
        let _ = self.events_tx.send(state);
    }
}
