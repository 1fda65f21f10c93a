//! Delayed deletion of persisted documents.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{
    sync::{Mutex, MutexGuard, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    domain::document::PersistedFile,
    infra::storage::{DocumentStorage, StorageError},
};

/// Persisted documents are kept for two hours.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(7200);

struct PendingDeletion {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Counts from [`Janitor::sweep_existing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub scheduled: usize,
}

/// Owns one cancellable timer per persisted file.
///
/// Scheduling a file that already has a timer replaces it. Timers are plain
/// tokio tasks; [`Janitor::shutdown`] aborts whatever is still pending.
///
/// A timer deletes only while holding the file lock and only if it is still
/// the current timer for its file.
#[derive(Clone)]
pub struct Janitor {
    storage: Arc<DocumentStorage>,
    retention: Duration,
    pending: Arc<DashMap<String, PendingDeletion>>,
    generation: Arc<AtomicU64>,
    files: Arc<Mutex<()>>,
}

impl Janitor {
    pub fn new(storage: Arc<DocumentStorage>) -> Self {
        Self::with_retention(storage, RETENTION_WINDOW)
    }

    pub fn with_retention(storage: Arc<DocumentStorage>, retention: Duration) -> Self {
        Self {
            storage,
            retention,
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            files: Arc::new(Mutex::new(())),
        }
    }

    /// Hold across writing a document and scheduling it, so an expiring
    /// timer for the same name cannot delete the replacement.
    pub async fn lock_files(&self) -> MutexGuard<'_, ()> {
        self.files.lock().await
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_scheduled(&self, file_name: &str) -> bool {
        self.pending.contains_key(file_name)
    }

    /// Schedule deletion at the file's own deadline.
    pub fn schedule(&self, file: &PersistedFile) {
        let delay = file.remaining(OffsetDateTime::now_utc());
        self.schedule_in(file.file_name(), delay);
    }

    pub fn schedule_in(&self, file_name: String, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let storage = self.storage.clone();
        let pending = self.pending.clone();
        let files = self.files.clone();
        let name = file_name.clone();

        let handle = tokio::spawn(async move {
            // Wait until the entry is registered so cleanup below cannot race the insert.
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;

            let _files = files.lock().await;
            let current = pending
                .get(&name)
                .is_some_and(|entry| entry.generation == generation);
            if !current {
                debug!(
                    target = "printpage::janitor",
                    file = %name,
                    "timer superseded, keeping document"
                );
                return;
            }
            delete_now(&storage, &name).await;
            pending.remove_if(&name, |_, entry| entry.generation == generation);
        });

        if let Some(previous) = self
            .pending
            .insert(file_name.clone(), PendingDeletion { generation, handle })
        {
            previous.handle.abort();
        }
        let _ = armed_tx.send(());

        debug!(
            target = "printpage::janitor",
            file = %file_name,
            delay_secs = delay.as_secs(),
            "deletion scheduled"
        );
    }

    /// Drop a pending timer. Returns `false` when nothing was scheduled.
    pub fn cancel(&self, file_name: &str) -> bool {
        match self.pending.remove(file_name) {
            Some((_, entry)) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Adopt documents left over from a previous run: delete the expired ones
    /// and schedule the rest for their remaining time.
    pub async fn sweep_existing(&self) -> Result<SweepReport, StorageError> {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for entry in self.storage.list().await? {
            let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
            if age >= self.retention {
                delete_now(&self.storage, &entry.file_name).await;
                report.deleted += 1;
            } else {
                self.schedule_in(entry.file_name, self.retention - age);
                report.scheduled += 1;
            }
        }

        info!(
            target = "printpage::janitor",
            deleted = report.deleted,
            scheduled = report.scheduled,
            "swept output directory"
        );
        Ok(report)
    }

    /// Abort every pending timer.
    pub fn shutdown(&self) {
        let names: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            self.cancel(&name);
        }
    }
}

async fn delete_now(storage: &DocumentStorage, file_name: &str) {
    match storage.delete(file_name).await {
        Ok(true) => {
            metrics::counter!("printpage_janitor_deleted_total").increment(1);
            info!(
                target = "printpage::janitor",
                file = %file_name,
                "expired document deleted"
            );
        }
        Ok(false) => {
            debug!(
                target = "printpage::janitor",
                file = %file_name,
                "expired document already gone"
            );
        }
        Err(err) => {
            warn!(
                target = "printpage::janitor",
                file = %file_name,
                error = %err,
                "failed to delete expired document"
            );
        }
    }
}
