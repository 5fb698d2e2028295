//! Seed and snapshot file locations.

use serde::{Deserialize, Serialize};

/// Where the in-memory collaborators and stores load and persist their data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file with catalog resources and directory consumers.
    #[serde(default)]
    pub seed_path: Option<String>,
    /// JSON file holding the resource and allocation tables between runs.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}
