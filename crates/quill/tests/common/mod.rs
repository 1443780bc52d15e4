//! Test cluster: one coordinator plus N storage nodes on loopback.

use std::time::Duration;

use quill::{Client, Coordinator, CoordinatorConfig, StorageConfig, StorageServer};
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub struct Cluster {
    pub coordinator_addr: String,
    dir: TempDir,
    nodes: Vec<JoinHandle<quill::Result<()>>>,
}

impl Cluster {
    pub async fn start(nodes: usize) -> Cluster {
        let dir = tempfile::tempdir().unwrap();
        let config = CoordinatorConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: dir.path().join("coordinator.db"),
            // tests never want surprise expiry; liveness has unit coverage
            liveness_timeout: Duration::from_secs(60),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::bind(config).await.unwrap();
        let coordinator_addr = coordinator.local_addr().to_string();
        tokio::spawn(coordinator.run());

        let mut cluster = Cluster {
            coordinator_addr,
            dir,
            nodes: Vec::new(),
        };
        for _ in 0..nodes {
            cluster.add_node().await;
        }
        cluster
    }

    /// Starts another storage node, returning its coordinator-assigned id.
    pub async fn add_node(&mut self) -> u32 {
        let index = self.nodes.len() + 1;
        let config = StorageConfig {
            coordinator_addr: self.coordinator_addr.clone(),
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: self.dir.path().join(format!("node{index}")),
            heartbeat_interval: Duration::from_secs(2),
        };
        let server = StorageServer::start(config).await.unwrap();
        let id = server.node_id();
        self.nodes.push(tokio::spawn(server.run()));
        id
    }

    /// Tears a node's serve loop down, closing its listener. The
    /// coordinator keeps believing the node is alive (heartbeats run on a
    /// separate task), which is exactly what connection-level failover
    /// tests want.
    pub async fn kill_node(&mut self, index: usize) {
        self.nodes[index].abort();
        // give the abort a moment to drop the listener
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    pub async fn client(&self, username: &str) -> Client {
        Client::connect(&self.coordinator_addr, username)
            .await
            .unwrap()
    }
}
