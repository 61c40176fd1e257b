use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{ProductId, UserBehaviorSnapshot},
    services::{clock::Clock, tracker::BehaviorTracker},
};

pub type SharedTracker = Arc<Mutex<BehaviorTracker>>;

/// Shortest period the flush task runs at
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// A resident tracker and when a request last touched it
struct Resident {
    tracker: SharedTracker,
    // Milliseconds since the registry's epoch
    last_access_ms: AtomicU64,
}

/// Read-only view of a session, resident or persisted
#[derive(Debug, Clone)]
pub struct SessionView {
    pub open_view: Option<ProductId>,
    pub snapshot: UserBehaviorSnapshot,
    pub resident: bool,
}

/// Resident session trackers, one mutex per session key.
///
/// Every read-modify-write of a session goes through that session's mutex, so
/// the single-open-view and bounded-log invariants hold under concurrent requests.
///
/// Only tracking operations make a session resident. Reads go through `view`
/// and `snapshot`, which fall back to the store without loading the session.
/// Sessions nobody has touched for the idle threshold are torn down by the
/// flush task (see `spawn_flush_task`).
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Resident>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
}

/// Handle for stopping the periodic flush task
pub struct FlushTaskHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl FlushTaskHandle {
    /// Stops the task after a final teardown of every resident session
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Flush task join error");
        }
    }
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            clock,
            epoch: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self, resident: &Resident) -> SharedTracker {
        resident
            .last_access_ms
            .store(self.elapsed_ms(), Ordering::Relaxed);
        resident.tracker.clone()
    }

    /// Opens (or resumes) a session. Without a key a new one is generated.
    pub async fn open(&self, session_key: Option<String>) -> (String, SharedTracker) {
        let key = session_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let tracker = self.get_or_resume(&key).await;
        (key, tracker)
    }

    /// The resident tracker for `session_key`, resuming it from the store if needed.
    ///
    /// This is the entry point for every tracking operation. A resumed session
    /// keeps its persisted history under a fresh `session_id` and stays resident
    /// until it is ended or goes idle.
    pub async fn get_or_resume(&self, session_key: &str) -> SharedTracker {
        if let Some(resident) = self.sessions.read().await.get(session_key) {
            return self.touch(resident);
        }

        let tracker =
            BehaviorTracker::resume(session_key, self.store.clone(), self.clock.clone()).await;

        // Another request may have resumed the same key while we were loading
        let mut sessions = self.sessions.write().await;
        let resident = sessions.entry(session_key.to_string()).or_insert_with(|| {
            tracing::info!(session_key = %session_key, "Session opened");
            Resident {
                tracker: Arc::new(Mutex::new(tracker)),
                last_access_ms: AtomicU64::new(0),
            }
        });
        self.touch(resident)
    }

    /// The resident tracker for `session_key`, or `NotFound`
    pub async fn get(&self, session_key: &str) -> AppResult<SharedTracker> {
        self.sessions
            .read()
            .await
            .get(session_key)
            .map(|resident| self.touch(resident))
            .ok_or_else(|| AppError::NotFound(format!("Session {} is not open", session_key)))
    }

    /// Current state of a session without making it resident.
    ///
    /// A resident session answers from memory, including its open view. Otherwise
    /// the persisted snapshot is read from the store as-is. `Ok(None)` means the
    /// key is unknown to both.
    pub async fn view(&self, session_key: &str) -> AppResult<Option<SessionView>> {
        let resident = self
            .sessions
            .read()
            .await
            .get(session_key)
            .map(|resident| self.touch(resident));

        if let Some(tracker) = resident {
            let tracker = tracker.lock().await;
            return Ok(Some(SessionView {
                open_view: tracker.open_view(),
                snapshot: tracker.snapshot().clone(),
                resident: true,
            }));
        }

        let persisted = self.store.load(session_key).await?;
        Ok(persisted.map(|snapshot| SessionView {
            open_view: None,
            snapshot,
            resident: false,
        }))
    }

    /// Copy of a session's snapshot, without making the session resident
    pub async fn snapshot(&self, session_key: &str) -> AppResult<Option<UserBehaviorSnapshot>> {
        Ok(self.view(session_key).await?.map(|view| view.snapshot))
    }

    /// Tears a session down: closes its open view, persists it, and evicts it
    pub async fn end(&self, session_key: &str) -> AppResult<()> {
        let resident = self
            .sessions
            .write()
            .await
            .remove(session_key)
            .ok_or_else(|| AppError::NotFound(format!("Session {} is not open", session_key)))?;

        resident.tracker.lock().await.shutdown().await;
        tracing::info!(session_key = %session_key, "Session ended");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn resident(sessions: &HashMap<String, Resident>) -> Vec<SharedTracker> {
        sessions.values().map(|r| r.tracker.clone()).collect()
    }

    /// Tears down every session untouched for at least `idle`.
    ///
    /// The registry stays write-locked until the evicted sessions are persisted,
    /// so a request for one of them resumes from its final snapshot.
    /// Returns the number of sessions evicted.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now_ms = self.elapsed_ms();
        let idle_ms = idle.as_millis() as u64;

        let mut sessions = self.sessions.write().await;
        let idle_keys: Vec<String> = sessions
            .iter()
            .filter(|(_, r)| {
                now_ms.saturating_sub(r.last_access_ms.load(Ordering::Relaxed)) >= idle_ms
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &idle_keys {
            if let Some(resident) = sessions.remove(key) {
                resident.tracker.lock().await.shutdown().await;
                tracing::info!(session_key = %key, "Evicted idle session");
            }
        }
        idle_keys.len()
    }

    /// Persists every resident session that changed since its last save
    pub async fn flush_all(&self) {
        let trackers = Self::resident(&*self.sessions.read().await);
        let mut flushed = 0;
        for tracker in &trackers {
            let mut tracker = tracker.lock().await;
            if tracker.is_dirty() {
                tracker.flush().await;
                flushed += 1;
            }
        }
        tracing::debug!(sessions = trackers.len(), flushed, "Flushed resident sessions");
    }

    /// Closes open views and persists every resident session
    pub async fn shutdown_all(&self) {
        let trackers = Self::resident(&*self.sessions.read().await);
        for tracker in &trackers {
            tracker.lock().await.shutdown().await;
        }
        tracing::info!(sessions = trackers.len(), "Persisted sessions for shutdown");
    }

    /// Spawns the periodic flush task.
    ///
    /// Every `interval` (never shorter than `MIN_FLUSH_INTERVAL`) the task first
    /// tears down sessions idle for `idle_timeout`, then persists the remaining
    /// dirty ones. Stopping it through the returned handle shuts every resident
    /// session down.
    pub fn spawn_flush_task(
        self: Arc<Self>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> FlushTaskHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let interval = interval.max(MIN_FLUSH_INTERVAL);

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                idle_secs = idle_timeout.as_secs(),
                "Session flush task started"
            );
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.evict_idle(idle_timeout).await;
                        self.flush_all().await;
                    }
                    _ = shutdown_rx.recv() => {
                        self.shutdown_all().await;
                        tracing::info!("Session flush task stopped");
                        break;
                    }
                }
            }
        });

        FlushTaskHandle { shutdown_tx, task }
    }
}
