//! The coordinator: catalog, node registry, lock table, and the server
//! loop that brokers every client and storage-node request.
//!
//! Concurrency model: each accepted connection gets its own task reading
//! framed messages in order; all shared state sits in one [`State`] behind
//! a single coordinator-wide mutex, held for the duration of one message
//! handler. Deliberately coarse: metadata operations are cheap, content
//! I/O never passes through here.

pub mod catalog;
pub mod config;
pub mod handlers;
pub mod locks;
pub mod registry;
pub mod users;

pub use config::CoordinatorConfig;
pub use handlers::State;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quill_transport::{Listener, Transport};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Opaque identity of one accepted connection.
///
/// Sentence locks are held by sessions, not users: two connections of the
/// same user must not share locks, so the token is allocated at accept
/// time and never reused within a process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session {}", self.0)
    }
}

/// The coordinator process: bound listener plus shared state.
pub struct Coordinator {
    config: CoordinatorConfig,
    state: Arc<Mutex<State>>,
    listener: Listener,
    local_addr: SocketAddr,
    active_sessions: Arc<AtomicUsize>,
}

impl Coordinator {
    /// Opens the catalog and binds the listening socket.
    pub async fn bind(config: CoordinatorConfig) -> crate::Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if parent != Path::new("") {
                std::fs::create_dir_all(parent)?;
            }
        }
        let state = State::new(&config)?;
        let listener = Listener::bind(config.bind_addr.as_str()).await?;
        let local_addr = listener.local_addr()?;
        log::info!("coordinator listening on {local_addr}");
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(state)),
            listener,
            local_addr,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves forever: accepts sessions and runs the liveness reaper.
    pub async fn run(self) -> crate::Result<()> {
        tokio::spawn(reap_dead_nodes(
            Arc::clone(&self.state),
            self.config.liveness_timeout,
        ));

        let mut next_session = 0u64;
        loop {
            let (transport, peer) = self.listener.accept().await?;
            if self.active_sessions.load(Ordering::SeqCst) >= self.config.max_sessions {
                log::warn!("session limit reached, dropping connection from {peer}");
                continue;
            }
            next_session += 1;
            let session = SessionId(next_session);
            log::debug!("connection from {peer} as {session}");
            let guard = SessionGuard::new(Arc::clone(&self.active_sessions));
            tokio::spawn(serve_session(
                Arc::clone(&self.state),
                transport,
                session,
                guard,
            ));
        }
    }
}

/// Keeps the active-session count honest on every exit path.
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve_session(
    state: Arc<Mutex<State>>,
    mut transport: Transport,
    session: SessionId,
    _guard: SessionGuard,
) {
    loop {
        match transport.recv().await {
            Ok(Some(msg)) => {
                log::debug!(
                    "{session}: request type={} user={} file={}",
                    msg.tag,
                    msg.username,
                    msg.filename
                );
                let resp = {
                    let mut state = state.lock().await;
                    state.handle(session, &msg)
                };
                if let Err(err) = transport.send(resp).await {
                    log::debug!("{session}: send failed: {err}");
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::debug!("{session}: receive failed: {err}");
                break;
            }
        }
    }

    // Best-effort lock release is the only automatic release path.
    let freed = state.lock().await.locks.release_session(session);
    if !freed.is_empty() {
        log::info!("{session} disconnected, released {} lock(s)", freed.len());
    } else {
        log::debug!("{session} disconnected");
    }
}

/// Flips the `alive` bit of nodes whose heartbeats went silent.
async fn reap_dead_nodes(state: Arc<Mutex<State>>, timeout: Duration) {
    let period = (timeout / 3).max(Duration::from_secs(1));
    let timeout = time::Duration::seconds(timeout.as_secs().max(1) as i64);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let cutoff = OffsetDateTime::now_utc() - timeout;
        let dead = state.lock().await.registry.expire(cutoff);
        for id in dead {
            log::warn!("storage node {id} missed heartbeats, marked dead");
        }
    }
}
