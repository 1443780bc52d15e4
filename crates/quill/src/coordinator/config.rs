use std::path::PathBuf;
use std::time::Duration;

/// Coordinator tuning knobs.
///
/// The caps bound in-memory tables; each is enforced at its insert point.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Address the coordinator listens on. Port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Location of the catalog database.
    pub db_path: PathBuf,
    /// Maximum concurrent client/storage-node sessions.
    pub max_sessions: usize,
    /// Maximum registered users.
    pub max_users: usize,
    /// Maximum registered storage nodes.
    pub max_nodes: usize,
    /// Maximum outstanding sentence locks.
    pub max_locks: usize,
    /// How long a storage node may go without a heartbeat before its
    /// `alive` bit is cleared.
    pub liveness_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: PathBuf::from("data/coordinator.db"),
            max_sessions: 100,
            max_users: 100,
            max_nodes: 10,
            max_locks: 100,
            liveness_timeout: Duration::from_secs(15),
        }
    }
}
