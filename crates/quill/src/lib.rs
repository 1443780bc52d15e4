//! A distributed collaborative document store.
//!
//! Three kinds of processes cooperate:
//!
//! - the [`Coordinator`] owns the authoritative file catalog, the storage
//!   node registry, and the sentence lock table, and brokers every request;
//! - [`StorageServer`] nodes hold file bytes, undo snapshots, and
//!   checkpoint blobs;
//! - [`Client`]s talk to the coordinator and are redirected to storage
//!   nodes for content I/O.
//!
//! Content never flows through the coordinator; it hands out endpoints and
//! enforces naming, access control, placement, and sentence-level mutual
//! exclusion.

#![forbid(unsafe_code)]

pub mod client;
pub mod coordinator;
pub mod error;
pub mod storage;
mod timefmt;

pub use client::Client;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::Error;
pub use storage::{StorageConfig, StorageServer};

pub use quill_msg as msg;
pub use quill_transport as transport;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
