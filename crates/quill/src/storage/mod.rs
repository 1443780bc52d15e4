//! The storage node: registers with the coordinator, heartbeats, and
//! serves content operations.
//!
//! The node trusts that requests were authorized by the coordinator. It
//! only re-checks names (they become path components) and otherwise
//! applies content operations directly.

pub mod store;

pub use store::{FileInfo, NodeStore, RevertOutcome, UndoOutcome};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quill_msg::name::{validate_name, validate_tag};
use quill_msg::text::{split_sentences, split_words};
use quill_msg::{
    CheckpointCmd, Endpoint, Message, NodeAssigned, OpCode, Status, WireString,
};
use quill_transport::{Listener, Transport};
use tokio::sync::Mutex;

use crate::timefmt;

/// Storage node settings.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Coordinator to register with.
    pub coordinator_addr: String,
    /// Address to serve content on. Port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Data directory root.
    pub data_dir: PathBuf,
    /// Heartbeat cadence; must stay comfortably under the coordinator's
    /// liveness timeout.
    pub heartbeat_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: "127.0.0.1:8080".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: PathBuf::from("data/storage"),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// A running storage node: bound listener, registered with the coordinator.
pub struct StorageServer {
    config: StorageConfig,
    listener: Listener,
    local_addr: SocketAddr,
    store: Arc<Mutex<NodeStore>>,
    node_id: u32,
    coordinator: Transport,
}

impl StorageServer {
    /// Opens the store, binds the listener, and registers with the
    /// coordinator, obtaining this node's id.
    pub async fn start(config: StorageConfig) -> crate::Result<Self> {
        let store = NodeStore::open(&config.data_dir)?;
        let listener = Listener::bind(config.bind_addr.as_str()).await?;
        let local_addr = listener.local_addr()?;

        let mut coordinator = Transport::connect(config.coordinator_addr.as_str()).await?;
        let advert = Endpoint::new(local_addr.ip().to_string(), local_addr.port());
        let resp = coordinator
            .call(Message::request(
                OpCode::RegisterNode,
                "",
                "",
                advert.to_string(),
            ))
            .await?;
        if !resp.is_ok() {
            return Err(crate::Error::Remote {
                code: resp.status()?,
                message: resp.error.to_string(),
            });
        }
        let assigned: NodeAssigned = resp.payload.parse()?;
        log::info!("storage node {} serving {advert}", assigned.id);

        Ok(Self {
            config,
            listener,
            local_addr,
            store: Arc::new(Mutex::new(store)),
            node_id: assigned.id,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Serves forever: heartbeats on the registration connection, content
    /// sessions on the listener.
    pub async fn run(self) -> crate::Result<()> {
        let StorageServer {
            config,
            listener,
            store,
            node_id,
            coordinator,
            ..
        } = self;

        tokio::spawn(send_heartbeats(
            coordinator,
            node_id,
            config.heartbeat_interval,
        ));

        loop {
            let (transport, peer) = listener.accept().await?;
            log::debug!("content connection from {peer}");
            tokio::spawn(serve_session(Arc::clone(&store), transport));
        }
    }
}

async fn send_heartbeats(mut coordinator: Transport, node_id: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let beat = Message::request(
            OpCode::Heartbeat,
            "",
            "",
            NodeAssigned { id: node_id }.to_string(),
        );
        if let Err(err) = coordinator.call(beat).await {
            log::warn!("heartbeat to coordinator failed: {err}");
            return;
        }
    }
}

async fn serve_session(store: Arc<Mutex<NodeStore>>, mut transport: Transport) {
    loop {
        let msg = match transport.recv().await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(err) => {
                log::debug!("content session ended: {err}");
                break;
            }
        };
        let result = if msg.op() == Some(OpCode::Stream) {
            stream_file(&store, &mut transport, &msg).await
        } else {
            let resp = {
                let store = store.lock().await;
                handle(&store, &msg)
            };
            transport.send(resp).await.map_err(crate::Error::from)
        };
        if let Err(err) = result {
            log::debug!("content session ended: {err}");
            break;
        }
    }
}

/// Handles one request, mapping internal failures to `server_error`.
fn handle(store: &NodeStore, msg: &Message) -> Message {
    let Some(op) = msg.op() else {
        return Message {
            tag: msg.tag,
            username: WireString::default(),
            filename: WireString::default(),
            payload: WireString::default(),
            status: Status::InvalidParam as u32,
            error: "Unknown command".into(),
        };
    };
    match dispatch(store, op, msg) {
        Ok(resp) => resp,
        Err(err) => {
            log::error!("storage {op} failed: {err}");
            Message::reply_err(op, Status::ServerError, "internal server error")
        }
    }
}

fn dispatch(store: &NodeStore, op: OpCode, msg: &Message) -> crate::Result<Message> {
    // Authorization happened at the coordinator; names still get checked
    // because they become path components here.
    if msg.username.is_empty() || validate_name(msg.filename.as_str()).is_err() {
        return Ok(Message::reply_err(
            op,
            Status::PermissionDenied,
            "Invalid request parameters",
        ));
    }
    let name = msg.filename.as_str();

    let resp = match op {
        OpCode::Create => {
            if store.create(name)? {
                log::info!("file created: {name}");
                Message::reply_ok(op, "File created")
            } else {
                Message::reply_err(op, Status::FileExists, "File already exists")
            }
        }
        OpCode::Read => match store.load(name)? {
            Some(content) => Message::reply_ok(op, content),
            None => Message::reply_err(op, Status::FileNotFound, "Failed to read file"),
        },
        OpCode::Write => write_content(store, op, name, msg.payload.as_str())?,
        OpCode::Delete => {
            if store.remove(name)? {
                log::info!("file deleted: {name}");
                Message::reply_ok(op, "File deleted")
            } else {
                Message::reply_err(op, Status::FileNotFound, "Failed to delete file")
            }
        }
        OpCode::Info => match store.info(name)? {
            Some(info) => Message::reply_ok(
                op,
                format!(
                    "Words: {} | Characters: {} | Sentences: {} | Modified: {}",
                    info.words,
                    info.chars,
                    info.sentences,
                    timefmt::format_system_time(info.modified)
                ),
            ),
            None => Message::reply_err(op, Status::FileNotFound, "File metadata not found"),
        },
        OpCode::Undo => match store.undo(name)? {
            UndoOutcome::Done => {
                log::info!("undo performed: {name}");
                Message::reply_ok(op, "Undo successful")
            }
            UndoOutcome::NoHistory => {
                Message::reply_err(op, Status::FileNotFound, "No undo history available")
            }
            UndoOutcome::NoFile => {
                Message::reply_err(op, Status::FileNotFound, "Current file not found")
            }
        },
        OpCode::Replicate => {
            store.save(name, msg.payload.as_str(), false)?;
            log::info!("replicated: {name}");
            Message::reply_ok(op, "Replicated successfully")
        }
        OpCode::Checkpoint | OpCode::ListCheckpoints | OpCode::Revert => {
            checkpoint_ops(store, op, name, msg.payload.as_str())?
        }
        _ => Message::reply_err(
            op,
            Status::InvalidParam,
            "coordinator operation sent to a storage node",
        ),
    };
    Ok(resp)
}

/// WRITE carries either full replacement content or a `sentence|word|text`
/// word edit; a payload that parses as the latter is treated as one.
fn write_content(
    store: &NodeStore,
    op: OpCode,
    name: &str,
    payload: &str,
) -> crate::Result<Message> {
    if let Some((sentence, word, text)) = parse_word_edit(payload) {
        let Some(content) = store.load(name)? else {
            return Ok(Message::reply_err(op, Status::FileNotFound, "File not found"));
        };
        let mut sentences = split_sentences(&content);
        if sentence >= sentences.len() {
            return Ok(Message::reply_err(
                op,
                Status::InvalidParam,
                "Invalid sentence number",
            ));
        }
        let mut words = split_words(&sentences[sentence]);
        if word >= words.len() {
            return Ok(Message::reply_err(
                op,
                Status::InvalidParam,
                "Invalid word index",
            ));
        }
        words[word] = text.to_string();
        sentences[sentence] = words.join(" ");
        store.save(name, &sentences.join(" "), true)?;
    } else {
        store.save(name, payload, true)?;
    }
    log::info!("file written: {name}");
    Ok(Message::reply_ok(op, "Write successful"))
}

fn parse_word_edit(payload: &str) -> Option<(usize, usize, &str)> {
    let mut parts = payload.splitn(3, '|');
    let sentence = parts.next()?.parse().ok()?;
    let word = parts.next()?.parse().ok()?;
    let text = parts.next()?;
    Some((sentence, word, text))
}

fn checkpoint_ops(
    store: &NodeStore,
    op: OpCode,
    name: &str,
    payload: &str,
) -> crate::Result<Message> {
    let cmd_text = match op {
        OpCode::ListCheckpoints => "LIST".to_string(),
        OpCode::Revert if !payload.starts_with("REVERT|") => format!("REVERT|{payload}"),
        _ => payload.to_string(),
    };
    let cmd: CheckpointCmd = match cmd_text.parse() {
        Ok(cmd) => cmd,
        Err(_) => {
            return Ok(Message::reply_err(
                op,
                Status::InvalidParam,
                "Invalid checkpoint command",
            ))
        }
    };
    if let Some(tag) = cmd.tag() {
        if validate_tag(tag).is_err() {
            return Ok(Message::reply_err(op, Status::InvalidParam, "Invalid tag"));
        }
    }

    let resp = match cmd {
        CheckpointCmd::Create(tag) => {
            if store.checkpoint_create(name, &tag)? {
                log::info!("checkpoint created: {name} tag={tag}");
                Message::reply_ok(op, format!("Checkpoint '{tag}' created"))
            } else {
                Message::reply_err(op, Status::FileNotFound, "File not found")
            }
        }
        CheckpointCmd::List => {
            let mut out = String::from("Checkpoints:\n");
            for (tag, modified) in store.checkpoint_list(name)? {
                out.push_str(&format!(
                    "  {tag} - {}\n",
                    timefmt::format_system_time(modified)
                ));
            }
            Message::reply_ok(op, out)
        }
        CheckpointCmd::Revert(tag) => match store.checkpoint_revert(name, &tag)? {
            RevertOutcome::Done => {
                log::info!("reverted: {name} to tag={tag}");
                Message::reply_ok(op, format!("Reverted to checkpoint '{tag}'"))
            }
            RevertOutcome::NoCheckpoint => {
                Message::reply_err(op, Status::CheckpointNotFound, "Checkpoint not found")
            }
        },
    };
    Ok(resp)
}

async fn stream_file(
    store: &Mutex<NodeStore>,
    transport: &mut Transport,
    msg: &Message,
) -> crate::Result<()> {
    const OP: OpCode = OpCode::Stream;
    let loaded = {
        let store = store.lock().await;
        if msg.username.is_empty() || validate_name(msg.filename.as_str()).is_err() {
            Err(Message::reply_err(
                OP,
                Status::PermissionDenied,
                "Invalid request parameters",
            ))
        } else {
            match store.load(msg.filename.as_str()) {
                Ok(Some(content)) => Ok(content),
                Ok(None) => Err(Message::reply_err(
                    OP,
                    Status::FileNotFound,
                    "Failed to read file",
                )),
                Err(err) => {
                    log::error!("storage STREAM failed: {err}");
                    Err(Message::reply_err(
                        OP,
                        Status::ServerError,
                        "internal server error",
                    ))
                }
            }
        }
    };

    match loaded {
        Err(resp) => transport.send(resp).await?,
        Ok(content) => {
            transport.send(Message::reply_ok(OP, "STREAM_START")).await?;
            for sentence in split_sentences(&content) {
                for word in split_words(&sentence) {
                    transport
                        .send(Message::reply_ok(OpCode::StreamWord, word))
                        .await?;
                }
            }
            transport
                .send(Message::reply_ok(OpCode::StreamEnd, ""))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> (tempfile::TempDir, NodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn req(op: OpCode, file: &str, payload: &str) -> Message {
        Message::request(op, "alice", file, payload)
    }

    #[test]
    fn rejects_requests_failing_basic_validation() {
        let (_dir, store) = node();
        let anonymous = Message::request(OpCode::Read, "", "doc", "");
        assert_eq!(
            handle(&store, &anonymous).status().unwrap(),
            Status::PermissionDenied
        );
        let traversal = req(OpCode::Read, "../etc", "");
        assert_eq!(
            handle(&store, &traversal).status().unwrap(),
            Status::PermissionDenied
        );
    }

    #[test]
    fn create_write_read_cycle() {
        let (_dir, store) = node();
        assert!(handle(&store, &req(OpCode::Create, "doc", "")).is_ok());
        let dup = handle(&store, &req(OpCode::Create, "doc", ""));
        assert_eq!(dup.status().unwrap(), Status::FileExists);

        assert!(handle(&store, &req(OpCode::Write, "doc", "One. Two.")).is_ok());
        let read = handle(&store, &req(OpCode::Read, "doc", ""));
        assert_eq!(read.payload.as_str(), "One. Two.");

        let missing = handle(&store, &req(OpCode::Read, "nope", ""));
        assert_eq!(missing.status().unwrap(), Status::FileNotFound);
    }

    #[test]
    fn word_edit_rewrites_one_word() {
        let (_dir, store) = node();
        store.save("doc", "alpha beta gamma. second one.", false).unwrap();
        assert!(handle(&store, &req(OpCode::Write, "doc", "0|1|BETA")).is_ok());
        assert_eq!(
            store.load("doc").unwrap().as_deref(),
            Some("alpha BETA gamma. second one.")
        );

        let bad_sentence = handle(&store, &req(OpCode::Write, "doc", "9|0|x"));
        assert_eq!(bad_sentence.status().unwrap(), Status::InvalidParam);
        let bad_word = handle(&store, &req(OpCode::Write, "doc", "0|9|x"));
        assert_eq!(bad_word.status().unwrap(), Status::InvalidParam);
    }

    #[test]
    fn write_snapshots_undo_state() {
        let (_dir, store) = node();
        store.save("doc", "before.", false).unwrap();
        handle(&store, &req(OpCode::Write, "doc", "after."));
        assert!(handle(&store, &req(OpCode::Undo, "doc", "")).is_ok());
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("before."));
    }

    #[test]
    fn replicate_overwrites_without_undo() {
        let (_dir, store) = node();
        store.save("doc", "old.", false).unwrap();
        assert!(handle(&store, &req(OpCode::Replicate, "doc", "pushed.")).is_ok());
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("pushed."));
        let undo = handle(&store, &req(OpCode::Undo, "doc", ""));
        assert_eq!(undo.status().unwrap(), Status::FileNotFound);
    }

    #[test]
    fn checkpoint_commands() {
        let (_dir, store) = node();
        store.save("doc", "v1 text.", false).unwrap();
        assert!(handle(&store, &req(OpCode::Checkpoint, "doc", "CREATE|v1")).is_ok());
        store.save("doc", "v2 text.", false).unwrap();

        let list = handle(&store, &req(OpCode::ListCheckpoints, "doc", ""));
        assert!(list.payload.contains("v1"));

        assert!(handle(&store, &req(OpCode::Revert, "doc", "v1")).is_ok());
        assert_eq!(store.load("doc").unwrap().as_deref(), Some("v1 text."));

        let missing = handle(&store, &req(OpCode::Revert, "doc", "nope"));
        assert_eq!(missing.status().unwrap(), Status::CheckpointNotFound);

        let garbage = handle(&store, &req(OpCode::Checkpoint, "doc", "SAVE|v1"));
        assert_eq!(garbage.status().unwrap(), Status::InvalidParam);
    }

    #[test]
    fn coordinator_ops_are_rejected() {
        let (_dir, store) = node();
        let resp = handle(&store, &req(OpCode::WriteLock, "doc", "0"));
        assert_eq!(resp.status().unwrap(), Status::InvalidParam);
    }

    #[test]
    fn word_edit_parser() {
        assert_eq!(parse_word_edit("0|2|hello"), Some((0, 2, "hello")));
        assert_eq!(parse_word_edit("1|0|a|b"), Some((1, 0, "a|b")));
        assert_eq!(parse_word_edit("plain content"), None);
        assert_eq!(parse_word_edit("1|x|y"), None);
        assert_eq!(parse_word_edit("1|2"), None);
    }
}
