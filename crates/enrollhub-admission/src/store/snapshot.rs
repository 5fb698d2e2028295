//! JSON snapshot of the admission store.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use enrollhub_core::error::AppError;
use enrollhub_core::result::AppResult;
use enrollhub_entity::allocation::Allocation;
use enrollhub_entity::resource::Resource;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted resource rows and allocations.
///
/// The ledger is not part of the snapshot; it is rebuilt from the
/// allocations on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Resource rows, including `held`.
    pub resources: Vec<Resource>,
    /// Every allocation, active and cancelled.
    pub allocations: Vec<Allocation>,
}

impl StoreSnapshot {
    /// Build a snapshot stamped with the current time.
    pub fn new(resources: Vec<Resource>, allocations: Vec<Allocation>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            resources,
            allocations,
        }
    }

    /// Write the snapshot to `path`, replacing any previous file.
    ///
    /// The document is written next to the target and renamed over it.
    pub async fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!(
            path = %path.display(),
            resources = self.resources.len(),
            allocations = self.allocations.len(),
            "Store snapshot saved"
        );
        Ok(())
    }

    /// Read a snapshot from `path`. Returns `None` when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Option<Self>> {
        let path = path.as_ref();
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Self = serde_json::from_slice(&body)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AppError::validation(format!(
                "Unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        Ok(Some(snapshot))
    }
}
