//! Client-side protocol driver.
//!
//! A [`Client`] owns one coordinator session (which is also its lock-holder
//! identity) and opens short-lived storage-node connections as redirects
//! come back. Dropping the client closes the session, which releases any
//! sentence locks it still holds.

use quill_msg::name::{validate_name, validate_username};
use quill_msg::text::{split_sentences, split_words};
use quill_msg::{AccessMask, CheckpointCmd, Endpoint, GrantArg, Message, OpCode, Redirect, Status};
use quill_transport::Transport;

use crate::Error;

pub struct Client {
    transport: Transport,
    username: String,
}

fn remote_err(resp: &Message) -> Error {
    match resp.status() {
        Ok(code) => Error::Remote {
            code,
            message: resp.error.to_string(),
        },
        Err(err) => Error::Msg(err),
    }
}

fn expect_ok(resp: &Message) -> crate::Result<()> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(remote_err(resp))
    }
}

impl Client {
    /// Connects to the coordinator and registers `username`.
    pub async fn connect(coordinator_addr: &str, username: &str) -> crate::Result<Self> {
        validate_username(username)?;
        let mut transport = Transport::connect(coordinator_addr).await?;
        let resp = transport
            .call(Message::request(OpCode::RegisterClient, username, "", ""))
            .await?;
        expect_ok(&resp)?;
        log::debug!("registered as {username}");
        Ok(Self {
            transport,
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// One coordinator round trip; non-success statuses become errors.
    async fn call(&mut self, op: OpCode, filename: &str, payload: &str) -> crate::Result<Message> {
        let req = Message::request(op, self.username.as_str(), filename, payload);
        let resp = self.transport.call(req).await?;
        expect_ok(&resp)?;
        Ok(resp)
    }

    async fn call_redirect(
        &mut self,
        op: OpCode,
        filename: &str,
        payload: &str,
    ) -> crate::Result<Redirect> {
        let resp = self.call(op, filename, payload).await?;
        Ok(resp.payload.parse()?)
    }

    /// Connects to the redirect's primary, falling back to the replica when
    /// the primary connection cannot be established.
    async fn connect_storage(redirect: &Redirect, fallback: bool) -> crate::Result<Transport> {
        match Self::connect_endpoint(&redirect.primary).await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                if fallback {
                    if let Some(replica) = &redirect.replica {
                        log::warn!(
                            "primary {} unreachable ({err}), trying replica {replica}",
                            redirect.primary
                        );
                        return Self::connect_endpoint(replica).await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn connect_endpoint(endpoint: &Endpoint) -> crate::Result<Transport> {
        match Transport::connect((endpoint.host.as_str(), endpoint.port)).await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                log::debug!("connect to {endpoint} failed: {err}");
                Err(Error::Remote {
                    code: Status::ConnectionFailed,
                    message: format!("cannot reach storage node {endpoint}"),
                })
            }
        }
    }

    /// One storage-node round trip carrying this client's identity.
    async fn storage_call(
        &self,
        redirect: &Redirect,
        op: OpCode,
        filename: &str,
        payload: &str,
        fallback: bool,
    ) -> crate::Result<Message> {
        let mut conn = Self::connect_storage(redirect, fallback).await?;
        let req = Message::request(op, self.username.as_str(), filename, payload);
        let resp = conn.call(req).await?;
        expect_ok(&resp)?;
        Ok(resp)
    }

    /// Best-effort push of `payload` to the replica, if there is one.
    async fn replicate(&self, redirect: &Redirect, filename: &str, payload: &str) {
        let Some(replica) = &redirect.replica else {
            return;
        };
        let target = Redirect::new(replica.clone());
        if let Err(err) = self
            .storage_call(&target, OpCode::Replicate, filename, payload, false)
            .await
        {
            log::warn!("replication of {filename} to {replica} failed: {err}");
        }
    }

    /// Creates an empty file, materializing it on its primary node and,
    /// best-effort, on the replica.
    pub async fn create(&mut self, name: &str) -> crate::Result<()> {
        validate_name(name)?;
        let redirect = self.call_redirect(OpCode::Create, name, "").await?;
        self.storage_call(&redirect, OpCode::Create, name, "", false)
            .await?;
        if let Some(replica) = redirect.replica.clone() {
            let target = Redirect::new(replica.clone());
            if let Err(err) = self
                .storage_call(&target, OpCode::Create, name, "", false)
                .await
            {
                log::warn!("creating {name} on replica {replica} failed: {err}");
            }
        }
        Ok(())
    }

    pub async fn create_folder(&mut self, name: &str) -> crate::Result<String> {
        validate_name(name)?;
        let resp = self.call(OpCode::CreateFolder, name, "").await?;
        Ok(resp.payload.0)
    }

    pub async fn read(&mut self, name: &str) -> crate::Result<String> {
        let redirect = self.call_redirect(OpCode::Read, name, "").await?;
        let resp = self
            .storage_call(&redirect, OpCode::Read, name, "", true)
            .await?;
        Ok(resp.payload.0)
    }

    pub async fn info(&mut self, name: &str) -> crate::Result<String> {
        let redirect = self.call_redirect(OpCode::Info, name, "").await?;
        let resp = self
            .storage_call(&redirect, OpCode::Info, name, "", true)
            .await?;
        Ok(resp.payload.0)
    }

    /// Streams the file word by word, invoking `on_word` per word.
    pub async fn stream(
        &mut self,
        name: &str,
        mut on_word: impl FnMut(&str),
    ) -> crate::Result<()> {
        let redirect = self.call_redirect(OpCode::Stream, name, "").await?;
        let mut conn = Self::connect_storage(&redirect, true).await?;
        let resp = conn
            .call(Message::request(
                OpCode::Stream,
                self.username.as_str(),
                name,
                "",
            ))
            .await?;
        expect_ok(&resp)?;
        loop {
            let Some(msg) = conn.recv().await? else {
                return Err(Error::Transport(quill_transport::TransportError::Closed));
            };
            match msg.op() {
                Some(OpCode::StreamWord) => on_word(msg.payload.as_str()),
                Some(OpCode::StreamEnd) => return Ok(()),
                _ => {
                    return Err(Error::InvalidState(format!(
                        "unexpected message in word stream: {}",
                        msg.tag
                    )))
                }
            }
        }
    }

    /// Deletes the file: coordinator first, then best-effort removal of the
    /// bytes on both nodes.
    pub async fn delete(&mut self, name: &str) -> crate::Result<()> {
        let resp = self.call(OpCode::Delete, name, "").await?;
        let Ok(redirect) = resp.payload.parse::<Redirect>() else {
            // No node endpoint came back (both dead); the catalog entry is
            // gone, the bytes get cleaned up when the nodes return.
            return Ok(());
        };
        if let Err(err) = self
            .storage_call(&redirect, OpCode::Delete, name, "", false)
            .await
        {
            log::warn!("deleting {name} on primary failed: {err}");
        }
        if let Some(replica) = redirect.replica.clone() {
            let target = Redirect::new(replica);
            if let Err(err) = self
                .storage_call(&target, OpCode::Delete, name, "", false)
                .await
            {
                log::warn!("deleting {name} on replica failed: {err}");
            }
        }
        Ok(())
    }

    pub async fn view(&mut self, flags: &str) -> crate::Result<String> {
        let resp = self.call(OpCode::View, "", flags).await?;
        Ok(resp.payload.0)
    }

    pub async fn list_users(&mut self) -> crate::Result<String> {
        let resp = self.call(OpCode::List, "", "").await?;
        Ok(resp.payload.0)
    }

    pub async fn undo(&mut self, name: &str) -> crate::Result<String> {
        let redirect = self.call_redirect(OpCode::Undo, name, "").await?;
        let resp = self
            .storage_call(&redirect, OpCode::Undo, name, "", false)
            .await?;
        Ok(resp.payload.0)
    }

    pub async fn add_access(
        &mut self,
        name: &str,
        user: &str,
        perms: AccessMask,
    ) -> crate::Result<String> {
        let arg = GrantArg {
            user: user.to_string(),
            perms,
        };
        let resp = self.call(OpCode::AddAccess, name, &arg.to_string()).await?;
        Ok(resp.payload.0)
    }

    pub async fn remove_access(&mut self, name: &str, user: &str) -> crate::Result<String> {
        let resp = self.call(OpCode::RemAccess, name, user).await?;
        Ok(resp.payload.0)
    }

    pub async fn request_access(&mut self, name: &str, perms: AccessMask) -> crate::Result<String> {
        let resp = self
            .call(OpCode::RequestAccess, name, &perms.bits().to_string())
            .await?;
        Ok(resp.payload.0)
    }

    pub async fn view_requests(&mut self) -> crate::Result<String> {
        let resp = self.call(OpCode::ViewRequests, "", "").await?;
        Ok(resp.payload.0)
    }

    pub async fn approve_access(&mut self, name: &str, requester: &str) -> crate::Result<String> {
        let resp = self.call(OpCode::ApproveAccess, name, requester).await?;
        Ok(resp.payload.0)
    }

    pub async fn reject_access(&mut self, name: &str, requester: &str) -> crate::Result<String> {
        let resp = self.call(OpCode::RejectAccess, name, requester).await?;
        Ok(resp.payload.0)
    }

    /// Creates a named checkpoint of the file's current content.
    pub async fn checkpoint(&mut self, name: &str, tag: &str) -> crate::Result<String> {
        let cmd = CheckpointCmd::Create(tag.to_string()).to_string();
        let redirect = self.call_redirect(OpCode::Checkpoint, name, &cmd).await?;
        let cmd = redirect.cmd.clone().unwrap_or(cmd);
        let resp = self
            .storage_call(&redirect, OpCode::Checkpoint, name, &cmd, false)
            .await?;
        Ok(resp.payload.0)
    }

    pub async fn list_checkpoints(&mut self, name: &str) -> crate::Result<String> {
        let redirect = self.call_redirect(OpCode::ListCheckpoints, name, "").await?;
        let cmd = redirect.cmd.clone().unwrap_or_else(|| "LIST".to_string());
        let resp = self
            .storage_call(&redirect, OpCode::Checkpoint, name, &cmd, true)
            .await?;
        Ok(resp.payload.0)
    }

    pub async fn revert(&mut self, name: &str, tag: &str) -> crate::Result<String> {
        let cmd = CheckpointCmd::Revert(tag.to_string()).to_string();
        let redirect = self.call_redirect(OpCode::Checkpoint, name, &cmd).await?;
        let cmd = redirect.cmd.clone().unwrap_or(cmd);
        let resp = self
            .storage_call(&redirect, OpCode::Checkpoint, name, &cmd, false)
            .await?;
        Ok(resp.payload.0)
    }

    /// Acquires the sentence lock, returning the endpoints to edit against.
    pub async fn lock_sentence(&mut self, name: &str, sentence: u32) -> crate::Result<Redirect> {
        self.call_redirect(OpCode::WriteLock, name, &sentence.to_string())
            .await
    }

    /// Releases the sentence lock (the commit half of the write protocol).
    pub async fn commit_sentence(&mut self, name: &str, sentence: u32) -> crate::Result<()> {
        self.call(OpCode::WriteCommit, name, &sentence.to_string())
            .await?;
        Ok(())
    }

    /// The full two-phase write: lock, read current content, let `edit`
    /// rewrite the target sentence, push the new content to the primary,
    /// best-effort replicate, then commit.
    ///
    /// Appending (index == sentence count) is only allowed on an empty
    /// document; otherwise the index must address an existing sentence.
    pub async fn write_sentence<F>(
        &mut self,
        name: &str,
        sentence: u32,
        edit: F,
    ) -> crate::Result<()>
    where
        F: FnOnce(&str) -> String,
    {
        let redirect = self.lock_sentence(name, sentence).await?;

        let read = self
            .storage_call(&redirect, OpCode::Read, name, "", true)
            .await;
        let content = match read {
            Ok(resp) => resp.payload.0,
            Err(err) => {
                // Give the lock back rather than squatting on it until the
                // session closes.
                let _ = self.commit_sentence(name, sentence).await;
                return Err(err);
            }
        };

        let mut sentences = split_sentences(&content);
        let idx = sentence as usize;
        let appendable = sentences.is_empty() && idx == 0;
        if idx >= sentences.len() && !appendable {
            let _ = self.commit_sentence(name, sentence).await;
            return Err(Error::InvalidState(format!(
                "sentence index {sentence} out of range (document has {})",
                sentences.len()
            )));
        }

        let current = sentences.get(idx).map(String::as_str).unwrap_or("");
        let replacement = edit(current);
        if idx == sentences.len() {
            sentences.push(replacement);
        } else {
            sentences[idx] = replacement;
        }
        let new_content = sentences.join(" ");

        self.storage_call(&redirect, OpCode::Write, name, &new_content, false)
            .await?;
        self.replicate(&redirect, name, &new_content).await;
        self.commit_sentence(name, sentence).await
    }

    /// Convenience wrapper replacing one sentence outright.
    pub async fn replace_sentence(
        &mut self,
        name: &str,
        sentence: u32,
        text: &str,
    ) -> crate::Result<()> {
        self.write_sentence(name, sentence, |_| text.to_string())
            .await
    }

    /// Replaces one word inside a sentence, client-side, mirroring the
    /// word-edit grammar storage nodes accept directly.
    pub async fn replace_word(
        &mut self,
        name: &str,
        sentence: u32,
        word: usize,
        text: &str,
    ) -> crate::Result<()> {
        let text = text.to_string();
        let mut bad_word = false;
        let result = self
            .write_sentence(name, sentence, |current| {
                let mut words = split_words(current);
                if word < words.len() {
                    words[word] = text;
                } else if word == words.len() {
                    words.push(text);
                } else {
                    bad_word = true;
                }
                words.join(" ")
            })
            .await;
        if bad_word {
            return Err(Error::InvalidState(format!(
                "word index {word} out of range"
            )));
        }
        result
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .finish()
    }
}
