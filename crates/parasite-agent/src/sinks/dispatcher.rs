//! Background sink dispatcher
//!
//! ```text
//! controller ──try_send──► bounded queue ──► worker ──► persistence / ledger / repository
//!                 │
//!                 └─ full ──► dropped (counted, logged)
//! ```
//!
//! The worker handles one event at a time. A failing or slow collaborator
//! delays only the queue, never an agent cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{SinkError, SinkEvent, Sinks};

#[derive(Debug, Default)]
struct DispatchCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub emitted: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable sending side
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkEvent>,
    counters: Arc<DispatchCounters>,
}

impl SinkHandle {
    /// Queue an event without waiting; returns false when it was dropped
    pub fn emit(&self, event: SinkEvent) -> bool {
        let kind = event.kind();
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = kind, "Sink queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = kind, "Sink worker stopped, dropping event");
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

/// Receiving side; finishes once every [`SinkHandle`] is dropped
pub struct SinkWorker {
    handle: JoinHandle<()>,
    counters: Arc<DispatchCounters>,
}

impl SinkWorker {
    /// Wait for the queue to drain
    pub async fn finish(self) -> DispatchStats {
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Sink worker panicked");
        }
        let stats = self.counters.snapshot();
        info!(
            emitted = stats.emitted,
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "Sink worker finished"
        );
        stats
    }
}

pub struct SinkDispatcher;

impl SinkDispatcher {
    /// Spawn the worker on the current runtime
    pub fn spawn(sinks: Sinks, capacity: usize) -> (SinkHandle, SinkWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(DispatchCounters::default());

        let handle = tokio::spawn(run_worker(sinks, rx, counters.clone()));

        (
            SinkHandle {
                tx,
                counters: counters.clone(),
            },
            SinkWorker { handle, counters },
        )
    }
}

async fn run_worker(sinks: Sinks, mut rx: mpsc::Receiver<SinkEvent>, counters: Arc<DispatchCounters>) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind();
        match deliver(&sinks, event).await {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(event = kind, error = %err, "Sink call failed");
            }
        }
    }
    debug!("Sink queue closed");
}

async fn deliver(sinks: &Sinks, event: SinkEvent) -> Result<(), SinkError> {
    match event {
        SinkEvent::Reasoning {
            agent_id,
            text,
            decision,
            context,
        } => {
            sinks
                .persistence
                .log_reasoning(&agent_id, &text, decision, context)
                .await?;
        }
        SinkEvent::Infection {
            attacker_id,
            target_id,
            suggestion,
            accepted,
            reason,
        } => {
            sinks
                .persistence
                .log_infection(&attacker_id, &target_id, &suggestion, accepted, &reason)
                .await?;
        }
        SinkEvent::Mutation(mutation) => {
            sinks.persistence.log_mutation(&mutation).await?;
        }
        SinkEvent::Proof { subject_hash } => match sinks.ledger.record_proof(&subject_hash).await? {
            Some(reference) => debug!(hash = %subject_hash, reference = %reference, "Proof recorded"),
            None => debug!(hash = %subject_hash, "Ledger returned no reference"),
        },
        SinkEvent::Commit {
            agent_id,
            path,
            content,
            message,
        } => {
            let revision = sinks.repository.commit_artifact(&path, &content, &message).await?;
            sinks
                .persistence
                .log_commit(&agent_id, &path, revision, &message)
                .await?;
        }
    }
    Ok(())
}
