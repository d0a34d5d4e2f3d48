//! Two-tier persistence: a SQLite local tier that is always written first and
//! a remote tier that is attempted afterwards under a bounded timeout.
//!
//! Reads go remote first and fall back to the local tier. A local copy whose
//! latest write never reached the remote is served directly, so a stale
//! remote document cannot shadow it.

use anyhow::anyhow;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::{self, Dataset, PendingSync};
use crate::remote::{RemoteError, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadTier {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierRead<T> {
    pub value: T,
    pub tier: ReadTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub digest: String,
}

/// Result of a write-through. The local write always happened; `remote`
/// says whether the remote tier has the same version.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub digest: String,
    pub remote: Result<Ack, RemoteError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub dataset: Dataset,
    pub digest: String,
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn report(&self, dataset: Dataset) -> SyncReport {
        SyncReport {
            dataset,
            digest: self.digest.clone(),
            synced: self.remote.is_ok(),
            error: self.remote.as_ref().err().map(|e| e.to_string()),
        }
    }
}

pub struct Gateway {
    local: Mutex<Connection>,
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(conn: Connection, remote: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self {
            local: Mutex::new(conn),
            remote,
            timeout,
        }
    }

    pub fn remote_description(&self) -> String {
        self.remote.describe()
    }

    /// Runs `f` against the local tier. The lock is never held across an await.
    pub fn with_local<R>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<R>,
    ) -> anyhow::Result<R> {
        let conn = self
            .local
            .lock()
            .map_err(|_| anyhow!("local store lock poisoned"))?;
        f(&conn)
    }

    async fn fetch_remote(
        &self,
        class_id: &str,
        dataset: Dataset,
    ) -> Result<Option<serde_json::Value>, RemoteError> {
        tokio::time::timeout(self.timeout, self.remote.fetch_dataset(class_id, dataset))
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))?
    }

    /// Read contract: remote, then local. `None` means neither tier has data.
    pub async fn read<T: DeserializeOwned>(
        &self,
        class_id: &str,
        dataset: Dataset,
    ) -> Option<TierRead<T>> {
        let pending = self
            .with_local(|c| db::sync_is_pending(c, class_id, dataset))
            .unwrap_or(false);

        if pending {
            info!(
                class_id,
                dataset = dataset.key(),
                "local copy has unsynced changes; serving local tier"
            );
        } else {
            match self.fetch_remote(class_id, dataset).await {
                Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                    Ok(value) => {
                        return Some(TierRead {
                            value,
                            tier: ReadTier::Remote,
                        })
                    }
                    Err(e) => warn!(
                        class_id,
                        dataset = dataset.key(),
                        error = %e,
                        "remote payload has unexpected shape; falling back to local tier"
                    ),
                },
                Ok(None) => debug!(
                    class_id,
                    dataset = dataset.key(),
                    "remote tier has no data; falling back to local tier"
                ),
                Err(e) => warn!(
                    class_id,
                    dataset = dataset.key(),
                    error = %e,
                    "remote read failed; falling back to local tier"
                ),
            }
        }

        self.read_local(class_id, dataset).map(|value| TierRead {
            value,
            tier: ReadTier::Local,
        })
    }

    pub fn read_local<T: DeserializeOwned>(&self, class_id: &str, dataset: Dataset) -> Option<T> {
        let stored = match self.with_local(|c| db::dataset_get(c, class_id, dataset)) {
            Ok(v) => v?,
            Err(e) => {
                warn!(class_id, dataset = dataset.key(), error = %e, "local read failed");
                return None;
            }
        };
        match serde_json::from_str(&stored.payload) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    class_id,
                    dataset = dataset.key(),
                    error = %e,
                    "local payload has unexpected shape"
                );
                None
            }
        }
    }

    /// Local write first and unconditionally, then one bounded remote attempt.
    pub async fn write<T: Serialize>(
        &self,
        class_id: &str,
        dataset: Dataset,
        value: &T,
    ) -> anyhow::Result<WriteOutcome> {
        let json = serde_json::to_value(value)?;
        let payload = serde_json::to_string(&json)?;
        let digest = self.with_local(|c| db::dataset_put(c, class_id, dataset, &payload))?;
        let remote = self.push(class_id, dataset, &json, &digest).await;
        Ok(WriteOutcome { digest, remote })
    }

    async fn push(
        &self,
        class_id: &str,
        dataset: Dataset,
        json: &serde_json::Value,
        digest: &str,
    ) -> Result<Ack, RemoteError> {
        let attempt = tokio::time::timeout(
            self.timeout,
            self.remote.upsert_dataset(class_id, dataset, json),
        )
        .await
        .map_err(|_| RemoteError::Timeout(self.timeout))
        .and_then(|r| r);

        let bookkeeping = match &attempt {
            Ok(()) => self.with_local(|c| db::sync_mark_pushed(c, class_id, dataset, digest)),
            Err(e) => {
                warn!(
                    class_id,
                    dataset = dataset.key(),
                    error = %e,
                    "remote write failed; local copy kept as pending"
                );
                self.with_local(|c| db::sync_mark_failed(c, class_id, dataset, &e.to_string()))
            }
        };
        if let Err(e) = bookkeeping {
            warn!(class_id, dataset = dataset.key(), error = %e, "failed to record sync state");
        }

        attempt.map(|()| Ack {
            digest: digest.to_string(),
        })
    }

    pub fn pending(&self, class_id: &str) -> anyhow::Result<Vec<PendingSync>> {
        self.with_local(|c| db::sync_pending(c, class_id))
    }

    /// Re-pushes every pending dataset of a class once.
    pub async fn flush(&self, class_id: &str) -> anyhow::Result<Vec<SyncReport>> {
        let pending = self.pending(class_id)?;
        let mut reports = Vec::with_capacity(pending.len());
        for item in pending {
            let Some(stored) = self.with_local(|c| db::dataset_get(c, class_id, item.dataset))?
            else {
                continue;
            };
            let json: serde_json::Value = serde_json::from_str(&stored.payload)?;
            let remote = self.push(class_id, item.dataset, &json, &stored.digest).await;
            let outcome = WriteOutcome {
                digest: stored.digest,
                remote,
            };
            reports.push(outcome.report(item.dataset));
        }
        info!(
            class_id,
            flushed = reports.iter().filter(|r| r.synced).count(),
            failed = reports.iter().filter(|r| !r.synced).count(),
            "sync flush finished"
        );
        Ok(reports)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::remote::memory::MemoryRemote;

    pub(crate) fn memory_gateway() -> (Arc<Gateway>, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::default());
        let conn = db::open_in_memory().expect("in-memory db");
        let gateway = Gateway::new(conn, remote.clone(), Duration::from_millis(200));
        (Arc::new(gateway), remote)
    }
}
