use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::db::SessionStore;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::UserBehaviorSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Session(String),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Session(key) => write!(f, "session:{}", key),
        }
    }
}

/// Creates a Redis client for session storage
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous snapshot writes
struct SnapshotWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Session snapshots stored as JSON strings under `session:{key}`
///
/// Writes go through a background task so a slow or failing Redis never
/// blocks behavior capture.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<SnapshotWriteMessage>,
    ttl: u64,
}

/// Handle for gracefully shutting down the snapshot writer
pub struct SessionWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SessionWriterHandle {
    /// Signals the writer task to drain pending writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Session writer shutdown signal sent");
    }
}

impl RedisSessionStore {
    /// Creates a store and spawns its background writer task
    pub fn new(redis_client: Client, ttl: u64) -> (Self, SessionWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::writer_task(client, write_rx, shutdown_rx).await;
        });

        let store = Self {
            redis_client,
            write_tx,
            ttl,
        };

        (store, SessionWriterHandle { shutdown_tx })
    }

    /// Processes snapshot writes until shutdown, then flushes what is left
    async fn writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<SnapshotWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Session writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::warn!(error = %e, "Failed to persist session snapshot");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::warn!(error = %e, "Failed to flush session snapshot during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Session writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: SnapshotWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_key: &str) -> AppResult<Option<UserBehaviorSnapshot>> {
        let key = StoreKey::Session(session_key.to_string());
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let stored: Option<String> = conn.get(key.to_string()).await?;

        match stored {
            Some(json) => {
                let snapshot = serde_json::from_str(&json).map_err(|e| {
                    AppError::Persistence(format!("Snapshot deserialization error: {}", e))
                })?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Queues the snapshot for writing; returns once it is queued
    async fn save(&self, session_key: &str, snapshot: &UserBehaviorSnapshot) -> AppResult<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| AppError::Persistence(format!("Snapshot serialization error: {}", e)))?;

        let msg = SnapshotWriteMessage {
            key: StoreKey::Session(session_key.to_string()).to_string(),
            value: json,
            ttl: self.ttl,
        };

        self.write_tx
            .send(msg)
            .map_err(|e| AppError::Persistence(format!("Session writer unavailable: {}", e)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_display() {
        let key = StoreKey::Session("abc-123".to_string());
        assert_eq!(format!("{}", key), "session:abc-123");
    }

    #[tokio::test]
    async fn test_save_after_writer_stopped_reports_persistence_error() {
        let client = create_redis_client("redis://localhost:6379").unwrap();
        let (store, handle) = RedisSessionStore::new(client, 60);

        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let result = store.save("stopped", &UserBehaviorSnapshot::new()).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        if std::env::var("REDIS_URL").is_err() {
            // Needs a live Redis; set REDIS_URL to run.
            return;
        }

        let client = create_redis_client(&redis_url).unwrap();
        let (store, _handle) = RedisSessionStore::new(client.clone(), 60);

        let snapshot = UserBehaviorSnapshot::new();
        store.save("test_roundtrip", &snapshot).await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let loaded = store.load("test_roundtrip").await.unwrap();
        assert_eq!(loaded, Some(snapshot));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del("session:test_roundtrip").await.unwrap();
    }
}
