//! Payload grammars.
//!
//! Payloads are small ASCII strings inside the envelope's payload field.
//! Each grammar gets a typed struct with `Display` for building and
//! `FromStr` for parsing, so handlers never do ad-hoc string surgery.

use std::fmt;
use std::str::FromStr;

use crate::access::AccessMask;
use crate::MsgError;

fn malformed(kind: &'static str, text: &str) -> MsgError {
    MsgError::MalformedPayload {
        kind,
        text: text.to_string(),
    }
}

/// A storage node address, `<host>:<port>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| malformed("endpoint", s))?;
        if host.is_empty() {
            return Err(malformed("endpoint", s));
        }
        let port = port.parse().map_err(|_| malformed("endpoint", s))?;
        Ok(Self::new(host, port))
    }
}

/// Coordinator-to-client redirect:
/// `SS:<ip>:<port>[|REPLICA:<ip>:<port>][|SENTENCE:<n> or |CMD:<subcmd>]`.
///
/// `CMD` is always the last segment and its value may itself contain `|`
/// (checkpoint sub-commands do).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub primary: Endpoint,
    pub replica: Option<Endpoint>,
    pub sentence: Option<u32>,
    pub cmd: Option<String>,
}

impl Redirect {
    pub fn new(primary: Endpoint) -> Self {
        Self {
            primary,
            replica: None,
            sentence: None,
            cmd: None,
        }
    }

    pub fn with_replica(mut self, replica: Option<Endpoint>) -> Self {
        self.replica = replica;
        self
    }

    pub fn with_sentence(mut self, sentence: u32) -> Self {
        self.sentence = Some(sentence);
        self
    }

    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = Some(cmd.into());
        self
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SS:{}", self.primary)?;
        if let Some(replica) = &self.replica {
            write!(f, "|REPLICA:{replica}")?;
        }
        if let Some(sentence) = self.sentence {
            write!(f, "|SENTENCE:{sentence}")?;
        }
        if let Some(cmd) = &self.cmd {
            write!(f, "|CMD:{cmd}")?;
        }
        Ok(())
    }
}

impl FromStr for Redirect {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // CMD swallows the rest of the payload, including any '|'.
        let (head, cmd) = match s.split_once("|CMD:") {
            Some((head, cmd)) => (head, Some(cmd.to_string())),
            None => (s, None),
        };

        let mut segments = head.split('|');
        let primary = segments
            .next()
            .and_then(|seg| seg.strip_prefix("SS:"))
            .ok_or_else(|| malformed("redirect", s))?
            .parse()?;

        let mut redirect = Redirect::new(primary);
        redirect.cmd = cmd;
        for segment in segments {
            if let Some(replica) = segment.strip_prefix("REPLICA:") {
                redirect.replica = Some(replica.parse()?);
            } else if let Some(sentence) = segment.strip_prefix("SENTENCE:") {
                redirect.sentence =
                    Some(sentence.parse().map_err(|_| malformed("redirect", s))?);
            } else {
                return Err(malformed("redirect", s));
            }
        }
        Ok(redirect)
    }
}

/// ADDACCESS argument: `<target_user>|<perms>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantArg {
    pub user: String,
    pub perms: AccessMask,
}

impl fmt::Display for GrantArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.user, self.perms.bits())
    }
}

impl FromStr for GrantArg {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, perms) = s.split_once('|').ok_or_else(|| malformed("grant", s))?;
        if user.is_empty() {
            return Err(malformed("grant", s));
        }
        let bits: u8 = perms.parse().map_err(|_| malformed("grant", s))?;
        let perms = AccessMask::from_bits(bits).ok_or_else(|| malformed("grant", s))?;
        Ok(Self {
            user: user.to_string(),
            perms,
        })
    }
}

/// Checkpoint sub-command: `CREATE|<tag>`, `LIST`, or `REVERT|<tag>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointCmd {
    Create(String),
    List,
    Revert(String),
}

impl CheckpointCmd {
    pub fn tag(&self) -> Option<&str> {
        match self {
            CheckpointCmd::Create(tag) | CheckpointCmd::Revert(tag) => Some(tag),
            CheckpointCmd::List => None,
        }
    }
}

impl fmt::Display for CheckpointCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointCmd::Create(tag) => write!(f, "CREATE|{tag}"),
            CheckpointCmd::List => f.write_str("LIST"),
            CheckpointCmd::Revert(tag) => write!(f, "REVERT|{tag}"),
        }
    }
}

impl FromStr for CheckpointCmd {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('|') {
            None if s == "LIST" => Ok(CheckpointCmd::List),
            Some(("CREATE", tag)) if !tag.is_empty() => Ok(CheckpointCmd::Create(tag.to_string())),
            Some(("REVERT", tag)) if !tag.is_empty() => Ok(CheckpointCmd::Revert(tag.to_string())),
            _ => Err(malformed("checkpoint command", s)),
        }
    }
}

/// Registration reply to a storage node: `SS_ID:<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeAssigned {
    pub id: u32,
}

impl fmt::Display for NodeAssigned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SS_ID:{}", self.id)
    }
}

impl FromStr for NodeAssigned {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix("SS_ID:")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| malformed("node id", s))?;
        Ok(Self { id })
    }
}
