//! The three concurrent duties: heartbeat, inbound consumption, publishing
//!
//! Each duty runs as its own long-lived task for the lifetime of the session.
//! The session manager is the only writer of the shared link cell; duties read
//! the current link at the start of each operation and tolerate it going away
//! mid-operation by reporting a generation-tagged failure instead of crashing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::message::StatusMessage;
use crate::transport::{ReadHalf, WriteHalf};

/// One bound connection, identified by its generation token. Generations are
/// monotonic; a failure report tagged with an older generation is stale.
#[derive(Clone)]
pub struct Link {
    pub generation: u64,
    pub writer: Arc<Mutex<Box<dyn WriteHalf>>>,
}

/// The single shared mutable resource: the current link, or none.
pub type SharedLink = Arc<RwLock<Option<Link>>>;

/// Read half handed to the inbound duty on each successful connect.
pub struct BoundReader {
    pub generation: u64,
    pub reader: Box<dyn ReadHalf>,
}

/// A connection failure observed by one duty, tagged with the generation of
/// the link it was operating on.
#[derive(Debug)]
pub struct FailureReport {
    pub generation: u64,
    pub error: LinkError,
}

/// Cloneable handle duties use to signal the session manager.
#[derive(Clone)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<FailureReport>,
}

impl FailureReporter {
    pub fn new(tx: mpsc::UnboundedSender<FailureReport>) -> Self {
        Self { tx }
    }

    /// Report a failure for the given handle generation. Never blocks; a
    /// report sent after the manager is gone is dropped.
    pub fn report(&self, generation: u64, error: LinkError) {
        let _ = self.tx.send(FailureReport { generation, error });
    }
}

/// Callback invoked with each inbound message.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Periodically probe the current link for liveness. A failed probe is
/// reported and the duty idles until the manager binds a new link; it never
/// retries sends itself. Skipped ticks never bunch up, so at most one probe
/// is in flight at a time.
pub async fn heartbeat_loop(
    link: SharedLink,
    period: Duration,
    reporter: FailureReporter,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let Some(current) = link.read().await.clone() else {
            continue;
        };

        let mut writer = current.writer.lock().await;
        match writer.ping().await {
            Ok(()) => debug!(generation = current.generation, "liveness probe sent"),
            Err(e) => {
                warn!(generation = current.generation, error = %e, "liveness probe failed");
                reporter.report(current.generation, e);
            }
        }
    }
    debug!("heartbeat duty stopped");
}

/// Periodically publish a status message through the current link. A tick
/// with no bound link is skipped silently: fire-and-forget, no queuing.
pub async fn publisher_loop(
    link: SharedLink,
    host: String,
    instance: u32,
    period: Duration,
    reporter: FailureReporter,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let Some(current) = link.read().await.clone() else {
            continue;
        };

        let line = match StatusMessage::polling(&host, instance).encode() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode status message");
                continue;
            }
        };

        let mut writer = current.writer.lock().await;
        match writer.send(line).await {
            Ok(()) => debug!(generation = current.generation, "status message published"),
            Err(e) => {
                warn!(generation = current.generation, error = %e, "publish failed");
                reporter.report(current.generation, e);
            }
        }
    }
    debug!("publisher duty stopped");
}

enum InboundStep {
    Shutdown,
    Rebind(Option<BoundReader>),
    Message(Result<Option<String>, LinkError>),
}

/// Drain inbound messages from the current read half. On close or error the
/// failure is reported and the duty waits for the manager to rebind it to the
/// next connection's reader.
pub async fn inbound_loop(
    mut rebind: mpsc::UnboundedReceiver<BoundReader>,
    on_message: MessageHandler,
    reporter: FailureReporter,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut current: Option<BoundReader> = None;

    loop {
        let step = match current.as_mut() {
            Some(bound) => tokio::select! {
                _ = shutdown.recv() => InboundStep::Shutdown,
                next = rebind.recv() => InboundStep::Rebind(next),
                msg = bound.reader.recv() => InboundStep::Message(msg),
            },
            None => tokio::select! {
                _ = shutdown.recv() => InboundStep::Shutdown,
                next = rebind.recv() => InboundStep::Rebind(next),
            },
        };

        match step {
            InboundStep::Shutdown => break,
            InboundStep::Rebind(None) => break,
            InboundStep::Rebind(Some(bound)) => {
                debug!(generation = bound.generation, "inbound duty rebound");
                current = Some(bound);
            }
            InboundStep::Message(result) => {
                if let Some(bound) = current.take() {
                    match result {
                        Ok(Some(text)) => {
                            on_message(text);
                            current = Some(bound);
                        }
                        Ok(None) => {
                            info!(generation = bound.generation, "stream closed by remote");
                            reporter.report(bound.generation, LinkError::StreamClosed);
                        }
                        Err(e) => {
                            warn!(generation = bound.generation, error = %e, "receive failed");
                            reporter.report(bound.generation, e);
                        }
                    }
                }
            }
        }
    }
    debug!("inbound duty stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingWriter {
        sends: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl WriteHalf for CountingWriter {
        async fn send(&mut self, _text: String) -> Result<(), LinkError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LinkError::Send("broken".into()))
            } else {
                Ok(())
            }
        }

        async fn ping(&mut self) -> Result<(), LinkError> {
            self.send(String::new()).await
        }

        async fn close(&mut self) {}
    }

    fn shared(link: Option<Link>) -> SharedLink {
        Arc::new(RwLock::new(link))
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_skips_ticks_without_a_link() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = tokio::spawn(publisher_loop(
            shared(None),
            "Pier1".to_string(),
            1,
            Duration::from_secs(5),
            FailureReporter::new(tx),
            shutdown_tx.subscribe(),
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err(), "no failures without a link");

        let _ = shutdown_tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_reports_send_failure_with_generation() {
        let sends = Arc::new(AtomicU32::new(0));
        let writer = CountingWriter {
            sends: Arc::clone(&sends),
            fail: true,
        };
        let link = Link {
            generation: 7,
            writer: Arc::new(Mutex::new(Box::new(writer) as Box<dyn WriteHalf>)),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = tokio::spawn(publisher_loop(
            shared(Some(link)),
            "Pier1".to_string(),
            1,
            Duration::from_secs(5),
            FailureReporter::new(tx),
            shutdown_tx.subscribe(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let report = rx.recv().await.expect("failure report");
        assert_eq!(report.generation, 7);
        assert!(matches!(report.error, LinkError::Send(_)));
        assert!(sends.load(Ordering::SeqCst) >= 1);

        let _ = shutdown_tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_probes_on_period() {
        let sends = Arc::new(AtomicU32::new(0));
        let writer = CountingWriter {
            sends: Arc::clone(&sends),
            fail: false,
        };
        let link = Link {
            generation: 1,
            writer: Arc::new(Mutex::new(Box::new(writer) as Box<dyn WriteHalf>)),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = tokio::spawn(heartbeat_loop(
            shared(Some(link)),
            Duration::from_secs(10),
            FailureReporter::new(tx),
            shutdown_tx.subscribe(),
        ));

        // First tick fires immediately, then every 10s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sends.load(Ordering::SeqCst), 3);
        assert!(rx.try_recv().is_err());

        let _ = shutdown_tx.send(());
        handle.await.unwrap();
    }
}
