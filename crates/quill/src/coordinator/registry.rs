//! In-memory storage-node registry.
//!
//! Node ids are monotonic and never reused; records are never removed for
//! the life of the process. The `alive` bit is authoritative for placement
//! and lookups.

use quill_msg::Endpoint;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub struct StorageNode {
    pub id: u32,
    pub addr: Endpoint,
    pub alive: bool,
    pub last_heartbeat: OffsetDateTime,
    /// Files whose primary is this node. Placement input only; may drift
    /// from the catalog and that is fine.
    pub file_count: u32,
}

#[derive(Debug)]
pub struct NodeRegistry {
    nodes: Vec<StorageNode>,
    next_id: u32,
    cap: usize,
}

impl NodeRegistry {
    pub fn new(cap: usize) -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 1,
            cap,
        }
    }

    /// Registers a node, returning its fresh id, or `None` at the cap.
    pub fn register(&mut self, addr: Endpoint, now: OffsetDateTime) -> Option<u32> {
        if self.nodes.len() >= self.cap {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(StorageNode {
            id,
            addr,
            alive: true,
            last_heartbeat: now,
            file_count: 0,
        });
        Some(id)
    }

    pub fn get(&self, id: u32) -> Option<&StorageNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut StorageNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// The node's endpoint, only while it is alive.
    pub fn alive_endpoint(&self, id: u32) -> Option<Endpoint> {
        self.get(id).filter(|n| n.alive).map(|n| n.addr.clone())
    }

    /// Placement: the alive node with the fewest files, smallest id on ties.
    pub fn pick_primary(&self) -> Option<&StorageNode> {
        self.nodes
            .iter()
            .filter(|n| n.alive)
            .min_by_key(|n| (n.file_count, n.id))
    }

    /// Replica placement: the first alive node other than the primary, in
    /// id order.
    pub fn pick_replica(&self, primary_id: u32) -> Option<&StorageNode> {
        self.nodes
            .iter()
            .filter(|n| n.alive && n.id != primary_id)
            .min_by_key(|n| n.id)
    }

    pub fn add_file(&mut self, id: u32) {
        if let Some(node) = self.get_mut(id) {
            node.file_count += 1;
        }
    }

    pub fn remove_file(&mut self, id: u32) {
        if let Some(node) = self.get_mut(id) {
            node.file_count = node.file_count.saturating_sub(1);
        }
    }

    /// Records a heartbeat, reviving the node if it was marked dead.
    pub fn heartbeat(&mut self, id: u32, now: OffsetDateTime) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.alive = true;
                node.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    /// Clears the `alive` bit of nodes silent since before `cutoff`,
    /// returning the ids that just went dead.
    pub fn expire(&mut self, cutoff: OffsetDateTime) -> Vec<u32> {
        let mut dead = Vec::new();
        for node in &mut self.nodes {
            if node.alive && node.last_heartbeat < cutoff {
                node.alive = false;
                dead.push(node.id);
            }
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
