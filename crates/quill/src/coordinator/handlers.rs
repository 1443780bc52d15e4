//! Request dispatch over the coordinator state.
//!
//! Every handler runs with the coordinator-wide mutex held (see the server
//! loop in [`super`]), so each one is plain sequential code: validate,
//! consult the catalog and registry, mutate, reply. Database errors bubble
//! out of the handlers and collapse to a generic `server_error` in
//! [`State::handle`]; the cause goes to the log, never to the peer.

use quill_msg::name::{validate_name, validate_tag, validate_username};
use quill_msg::{
    AccessMask, CheckpointCmd, Endpoint, GrantArg, Message, NodeAssigned, OpCode, Redirect, Status,
    WireString,
};
use time::OffsetDateTime;

use super::catalog::{Catalog, FileEntry};
use super::config::CoordinatorConfig;
use super::locks::{Acquire, LockTable};
use super::registry::NodeRegistry;
use super::users::{Registration, UserDirectory};
use super::SessionId;
use crate::timefmt;

/// All coordinator-owned mutable state. One instance lives behind the
/// coordinator-wide mutex.
pub struct State {
    pub catalog: Catalog,
    pub registry: NodeRegistry,
    pub locks: LockTable,
    pub users: UserDirectory,
}

fn fail(op: OpCode, status: Status, text: impl Into<WireString>) -> crate::Result<Message> {
    Ok(Message::reply_err(op, status, text))
}

fn ok(op: OpCode, payload: impl Into<WireString>) -> crate::Result<Message> {
    Ok(Message::reply_ok(op, payload))
}

impl State {
    pub fn new(config: &CoordinatorConfig) -> crate::Result<Self> {
        let catalog = Catalog::open(&config.db_path)?;
        Ok(Self::with_catalog(catalog, config))
    }

    pub fn with_catalog(catalog: Catalog, config: &CoordinatorConfig) -> Self {
        Self {
            catalog,
            registry: NodeRegistry::new(config.max_nodes),
            locks: LockTable::new(config.max_locks),
            users: UserDirectory::new(config.max_users),
        }
    }

    /// Handles one request, always producing a response. Malformed input
    /// maps to `invalid_param`; internal failures map to `server_error`.
    pub fn handle(&mut self, session: SessionId, msg: &Message) -> Message {
        let Some(op) = msg.op() else {
            log::warn!("{session}: unknown tag {:?}", msg.tag.as_str());
            return Message {
                tag: msg.tag,
                username: WireString::default(),
                filename: WireString::default(),
                payload: WireString::default(),
                status: Status::InvalidParam as u32,
                error: "Unknown command".into(),
            };
        };

        let result = match op {
            OpCode::RegisterNode => self.register_node(msg),
            OpCode::RegisterClient => self.register_client(msg),
            OpCode::Create => self.create(msg, false),
            OpCode::CreateFolder => self.create(msg, true),
            OpCode::Read | OpCode::Info | OpCode::Stream => self.lookup_read(op, msg),
            OpCode::WriteLock => self.write_lock(session, msg),
            OpCode::WriteCommit => self.write_commit(session, msg),
            OpCode::Delete => self.delete(msg),
            OpCode::View => self.view(msg),
            OpCode::List => self.list_users(),
            OpCode::AddAccess => self.add_access(msg),
            OpCode::RemAccess => self.rem_access(msg),
            OpCode::Undo => self.undo(msg),
            OpCode::Checkpoint => self.checkpoint(op, msg, msg.payload.as_str()),
            OpCode::ListCheckpoints => self.checkpoint(op, msg, "LIST"),
            OpCode::Revert => {
                let payload = msg.payload.as_str();
                let cmd = if payload.starts_with("REVERT|") {
                    payload.to_string()
                } else {
                    format!("REVERT|{payload}")
                };
                self.checkpoint(op, msg, &cmd)
            }
            OpCode::RequestAccess => self.request_access(msg),
            OpCode::ViewRequests => self.view_requests(msg),
            OpCode::ApproveAccess => self.resolve_access(op, msg, "approved"),
            OpCode::RejectAccess => self.resolve_access(op, msg, "rejected"),
            OpCode::Heartbeat => self.heartbeat(msg),
            OpCode::Write | OpCode::Replicate | OpCode::StreamWord | OpCode::StreamEnd => fail(
                op,
                Status::InvalidParam,
                "storage node operation sent to the coordinator",
            ),
        };

        match result {
            Ok(resp) => resp,
            Err(err) => {
                log::error!("{session}: {op} failed: {err}");
                Message::reply_err(op, Status::ServerError, "internal server error")
            }
        }
    }

    fn register_node(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::RegisterNode;
        let addr: Endpoint = match msg.payload.parse() {
            Ok(addr) => addr,
            Err(_) => return fail(OP, Status::InvalidParam, "expected <host>:<port>"),
        };
        match self.registry.register(addr.clone(), OffsetDateTime::now_utc()) {
            Some(id) => {
                log::info!("storage node registered: id={id} addr={addr}");
                ok(OP, NodeAssigned { id }.to_string())
            }
            None => fail(OP, Status::StorageUnavailable, "node registry is full"),
        }
    }

    fn register_client(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::RegisterClient;
        let user = msg.username.as_str();
        if let Err(err) = validate_username(user) {
            return fail(OP, Status::InvalidParam, err.to_string());
        }
        match self.users.register(user, OffsetDateTime::now_utc()) {
            Registration::Full => fail(OP, Status::ServerError, "user directory is full"),
            Registration::Added => {
                log::info!("client registered: {user}");
                ok(OP, "Registered successfully")
            }
            Registration::Known => ok(OP, "Registered successfully"),
        }
    }

    fn create(&mut self, msg: &Message, is_folder: bool) -> crate::Result<Message> {
        let op = if is_folder {
            OpCode::CreateFolder
        } else {
            OpCode::Create
        };
        let name = msg.filename.as_str();
        let user = msg.username.as_str();
        if let Err(err) = validate_name(name) {
            return fail(op, Status::InvalidParam, err.to_string());
        }
        if !self.users.contains(user) {
            return fail(op, Status::UserNotFound, "User not registered");
        }
        if self.catalog.exists(name)? {
            let what = if is_folder { "Folder" } else { "File" };
            return fail(op, Status::FileExists, format!("{what} already exists"));
        }

        let Some(primary) = self.registry.pick_primary() else {
            return fail(op, Status::StorageUnavailable, "No storage node available");
        };
        let (primary_id, primary_ep) = (primary.id, primary.addr.clone());
        let replica = if is_folder {
            None
        } else {
            self.registry
                .pick_replica(primary_id)
                .map(|n| (n.id, n.addr.clone()))
        };

        self.catalog.insert_file(
            name,
            user,
            primary_id,
            replica.as_ref().map(|(id, _)| *id),
            is_folder,
            timefmt::now_unix(),
        )?;
        self.registry.add_file(primary_id);

        log::info!("{} created: {name} by {user} on node {primary_id}",
            if is_folder { "folder" } else { "file" });
        if is_folder {
            ok(op, format!("Folder created: {name}"))
        } else {
            let redirect =
                Redirect::new(primary_ep).with_replica(replica.map(|(_, addr)| addr));
            ok(op, redirect.to_string())
        }
    }

    /// READ, INFO, and STREAM are the same lookup: read permission, then
    /// the primary endpoint with the replica as a failover hint.
    fn lookup_read(&mut self, op: OpCode, msg: &Message) -> crate::Result<Message> {
        let name = msg.filename.as_str();
        if let Err(err) = validate_name(name) {
            return fail(op, Status::InvalidParam, err.to_string());
        }
        let Some(entry) = self.catalog.get(name)? else {
            return fail(op, Status::FileNotFound, "File not found");
        };
        if !self
            .catalog
            .has_permission(name, msg.username.as_str(), AccessMask::read_only())?
        {
            return fail(op, Status::PermissionDenied, "No read permission");
        }
        let Some(redirect) = self.failover_endpoints(&entry) else {
            return fail(op, Status::StorageUnavailable, "Storage node not available");
        };
        self.catalog.touch_accessed(name, timefmt::now_unix())?;
        ok(op, redirect.to_string())
    }

    fn write_lock(&mut self, session: SessionId, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::WriteLock;
        let Ok(sentence) = msg.payload.trim().parse::<u32>() else {
            return fail(OP, Status::InvalidParam, "Invalid sentence number");
        };
        let name = msg.filename.as_str();
        let user = msg.username.as_str();
        if let Err(err) = validate_name(name) {
            return fail(OP, Status::InvalidParam, err.to_string());
        }
        let Some(entry) = self.catalog.get(name)? else {
            return fail(OP, Status::FileNotFound, "File not found");
        };
        if !self
            .catalog
            .has_permission(name, user, AccessMask::write_only())?
        {
            return fail(OP, Status::PermissionDenied, "No write permission");
        }
        // Writes go to the primary only; a dead primary cannot take them.
        let Some(primary) = self.registry.alive_endpoint(entry.primary_node) else {
            return fail(OP, Status::StorageUnavailable, "Storage node not available");
        };
        let replica = entry
            .replica_node
            .and_then(|id| self.registry.alive_endpoint(id));

        match self
            .locks
            .acquire(name, sentence, user, session, OffsetDateTime::now_utc())
        {
            Acquire::Busy { holder } => {
                return fail(
                    OP,
                    Status::Locked,
                    format!("Sentence {sentence} locked by {holder} (different session)"),
                );
            }
            Acquire::TableFull => return fail(OP, Status::ServerError, "Lock table full"),
            Acquire::Granted => {
                log::info!("lock acquired: {name}[{sentence}] by {user} ({session})");
            }
            Acquire::Reacquired => {}
        }

        let redirect = Redirect::new(primary)
            .with_replica(replica)
            .with_sentence(sentence);
        ok(OP, redirect.to_string())
    }

    fn write_commit(&mut self, session: SessionId, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::WriteCommit;
        let Ok(sentence) = msg.payload.trim().parse::<u32>() else {
            return fail(OP, Status::InvalidParam, "Invalid sentence number");
        };
        let name = msg.filename.as_str();
        let user = msg.username.as_str();
        if self.locks.release(name, sentence, user, session) {
            self.catalog.touch_modified(name, timefmt::now_unix())?;
            log::info!("lock released: {name}[{sentence}] by {user} ({session})");
        }
        // A commit for a lock not held may legitimately arrive after a
        // session crash; it is acknowledged as a no-op.
        ok(OP, "")
    }

    fn delete(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::Delete;
        let name = msg.filename.as_str();
        let user = msg.username.as_str();
        if let Err(err) = validate_name(name) {
            return fail(OP, Status::InvalidParam, err.to_string());
        }
        let Some(entry) = self.catalog.get(name)? else {
            return fail(OP, Status::FileNotFound, "File not found");
        };
        if entry.owner != user {
            return fail(OP, Status::NotOwner, "Only owner can delete file");
        }

        // Collect endpoints before the entry goes away; the client is
        // responsible for telling both nodes to drop the bytes.
        let redirect = self.failover_endpoints(&entry);

        self.catalog.remove_file(name)?;
        self.locks.release_file(name);
        self.registry.remove_file(entry.primary_node);

        log::info!("file deleted: {name} by {user}");
        let payload = redirect.map(|r| r.to_string()).unwrap_or_default();
        ok(OP, payload)
    }

    fn view(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::View;
        let mut show_all = false;
        let mut detailed = false;
        for token in msg.payload.split_whitespace() {
            match token {
                "all" => show_all = true,
                "long" => detailed = true,
                _ if token.starts_with('-') => {
                    show_all |= token.contains('a');
                    detailed |= token.contains('l');
                }
                _ => {}
            }
        }

        let rows = self.catalog.list(msg.username.as_str(), show_all)?;
        if rows.is_empty() {
            return ok(OP, "No files found\n");
        }
        let mut out = String::new();
        for row in rows {
            if detailed {
                out.push_str(&format!(
                    "{} {:<30} {:<15} {:>5}w {:>3}s  {}\n",
                    if row.is_folder { "d" } else { "-" },
                    row.name,
                    row.owner,
                    row.word_count,
                    row.sentence_count,
                    timefmt::format_unix(row.created_at),
                ));
            } else if row.is_folder {
                out.push_str(&format!("[DIR] {}\n", row.name));
            } else {
                out.push_str(&format!("{}\n", row.name));
            }
        }
        ok(OP, out)
    }

    fn list_users(&mut self) -> crate::Result<Message> {
        let mut out = String::from("Registered Users:\n");
        for name in self.users.names() {
            out.push_str(&format!("  - {name}\n"));
        }
        ok(OpCode::List, out)
    }

    fn add_access(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::AddAccess;
        let arg: GrantArg = match msg.payload.parse() {
            Ok(arg) => arg,
            Err(_) => return fail(OP, Status::InvalidParam, "expected <user>|<perms>"),
        };
        let name = msg.filename.as_str();
        let Some(owner) = self.catalog.owner_of(name)? else {
            return fail(OP, Status::FileNotFound, "File not found");
        };
        if owner != msg.username.as_str() {
            return fail(OP, Status::NotOwner, "Only owner can grant access");
        }
        if arg.user == owner {
            return fail(OP, Status::InvalidParam, "Owner already has full access");
        }
        if !self.users.contains(&arg.user) {
            return fail(OP, Status::UserNotFound, "Target user not found");
        }
        self.catalog.grant(name, &arg.user, arg.perms.bits())?;
        log::info!(
            "access granted: {name} to {} ({}) by {owner}",
            arg.user,
            arg.perms
        );
        ok(OP, format!("Access granted to {}", arg.user))
    }

    fn rem_access(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::RemAccess;
        let target = msg.payload.trim();
        if target.is_empty() {
            return fail(OP, Status::InvalidParam, "expected a user name");
        }
        let name = msg.filename.as_str();
        let Some(owner) = self.catalog.owner_of(name)? else {
            return fail(OP, Status::FileNotFound, "File not found");
        };
        if owner != msg.username.as_str() {
            return fail(OP, Status::NotOwner, "Only owner can revoke access");
        }
        self.catalog.revoke(name, target)?;
        log::info!("access revoked: {name} from {target} by {owner}");
        ok(OP, format!("Access revoked from {target}"))
    }

    fn undo(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::Undo;
        let name = msg.filename.as_str();
        let Some(entry) = self.catalog.get(name)? else {
            return fail(OP, Status::FileNotFound, "File not found");
        };
        if !self
            .catalog
            .has_permission(name, msg.username.as_str(), AccessMask::write_only())?
        {
            return fail(OP, Status::PermissionDenied, "No write permission");
        }
        // Undo rewrites the primary's content.
        let Some(primary) = self.registry.alive_endpoint(entry.primary_node) else {
            return fail(OP, Status::StorageUnavailable, "Storage node not available");
        };
        let replica = entry
            .replica_node
            .and_then(|id| self.registry.alive_endpoint(id));
        ok(OP, Redirect::new(primary).with_replica(replica).to_string())
    }

    /// The checkpoint family: authorization plus endpoint lookup, with a
    /// catalog row recorded on CREATE and verified on REVERT.
    fn checkpoint(&mut self, op: OpCode, msg: &Message, cmd_text: &str) -> crate::Result<Message> {
        let cmd: CheckpointCmd = match cmd_text.parse() {
            Ok(cmd) => cmd,
            Err(_) => return fail(op, Status::InvalidParam, "Invalid checkpoint command"),
        };
        let name = msg.filename.as_str();
        let user = msg.username.as_str();
        if let Some(tag) = cmd.tag() {
            if let Err(err) = validate_tag(tag) {
                return fail(op, Status::InvalidParam, err.to_string());
            }
        }
        let Some(entry) = self.catalog.get(name)? else {
            return fail(op, Status::FileNotFound, "File not found");
        };
        let required = match cmd {
            CheckpointCmd::Revert(_) => AccessMask::write_only(),
            _ => AccessMask::read_only(),
        };
        if !self.catalog.has_permission(name, user, required)? {
            let verb = if required.write() { "write" } else { "read" };
            return fail(op, Status::PermissionDenied, format!("No {verb} permission"));
        }

        let redirect = match cmd {
            // Reverting rewrites content, so it needs the primary.
            CheckpointCmd::Revert(ref tag) => {
                if !self.catalog.checkpoint_exists(name, tag)? {
                    return fail(op, Status::CheckpointNotFound, "Checkpoint not found");
                }
                let Some(primary) = self.registry.alive_endpoint(entry.primary_node) else {
                    return fail(op, Status::StorageUnavailable, "Storage node not available");
                };
                let replica = entry
                    .replica_node
                    .and_then(|id| self.registry.alive_endpoint(id));
                Redirect::new(primary).with_replica(replica)
            }
            _ => {
                let Some(redirect) = self.failover_endpoints(&entry) else {
                    return fail(op, Status::StorageUnavailable, "Storage node not available");
                };
                redirect
            }
        };

        if let CheckpointCmd::Create(ref tag) = cmd {
            let locator = format!("{name}.{tag}");
            self.catalog
                .record_checkpoint(name, tag, &locator, timefmt::now_unix())?;
            log::info!("checkpoint recorded: {name} tag={tag} by {user}");
        }

        ok(op, redirect.with_cmd(cmd.to_string()).to_string())
    }

    fn request_access(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::RequestAccess;
        let text = msg.payload.trim();
        let text = text.strip_prefix("REQUEST|").unwrap_or(text);
        let bits = if text.is_empty() || text == "REQUEST" {
            1
        } else {
            match text.parse::<u8>() {
                Ok(bits) => bits,
                Err(_) => return fail(OP, Status::InvalidParam, "Invalid access type"),
            }
        };
        if AccessMask::from_bits(bits).is_none() {
            return fail(OP, Status::InvalidParam, "Invalid access type");
        }
        let name = msg.filename.as_str();
        if !self.catalog.exists(name)? {
            return fail(OP, Status::FileNotFound, "File not found");
        }
        self.catalog
            .insert_request(name, msg.username.as_str(), bits, timefmt::now_unix())?;
        ok(OP, "Access request submitted")
    }

    fn view_requests(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::ViewRequests;
        let rows = self.catalog.pending_requests(msg.username.as_str())?;
        let mut out = String::from("Pending Access Requests:\n");
        for row in rows {
            let perms = AccessMask::from_bits(row.access_type)
                .map(|m| m.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!(
                "  {} requests {perms} access to {}\n",
                row.requester, row.file
            ));
        }
        ok(OP, out)
    }

    /// APPROVEACCESS / REJECTACCESS update the request row only; handing
    /// out an actual grant stays an explicit ADDACCESS.
    fn resolve_access(&mut self, op: OpCode, msg: &Message, status: &str) -> crate::Result<Message> {
        let requester = msg.payload.trim();
        if requester.is_empty() {
            return fail(op, Status::InvalidParam, "expected a user name");
        }
        let name = msg.filename.as_str();
        let Some(owner) = self.catalog.owner_of(name)? else {
            return fail(op, Status::FileNotFound, "File not found");
        };
        if owner != msg.username.as_str() {
            return fail(op, Status::NotOwner, "Only owner can resolve requests");
        }
        let changed = self.catalog.resolve_request(name, requester, status)?;
        if changed == 0 {
            return fail(
                op,
                Status::InvalidParam,
                format!("No pending request from {requester}"),
            );
        }
        ok(op, format!("Request {status}"))
    }

    fn heartbeat(&mut self, msg: &Message) -> crate::Result<Message> {
        const OP: OpCode = OpCode::Heartbeat;
        let id: NodeAssigned = match msg.payload.parse() {
            Ok(id) => id,
            Err(_) => return fail(OP, Status::InvalidParam, "expected SS_ID:<n>"),
        };
        if self.registry.heartbeat(id.id, OffsetDateTime::now_utc()) {
            ok(OP, "")
        } else {
            fail(OP, Status::InvalidParam, "unknown storage node")
        }
    }

    /// Primary endpoint with replica hint; falls back to the replica alone
    /// when the primary is dead. `None` when neither node is alive.
    fn failover_endpoints(&self, entry: &FileEntry) -> Option<Redirect> {
        let primary = self.registry.alive_endpoint(entry.primary_node);
        let replica = entry
            .replica_node
            .and_then(|id| self.registry.alive_endpoint(id));
        match (primary, replica) {
            (Some(primary), replica) => Some(Redirect::new(primary).with_replica(replica)),
            (None, Some(replica)) => Some(Redirect::new(replica)),
            (None, None) => None,
        }
    }
}
