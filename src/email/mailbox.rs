//! Mailbox session abstraction: trait + IMAP and mock implementations.
//!
//! `MailboxClient` covers the lifecycle of one batch run:
//! `connect` → `search_unseen` → (`fetch`, `mark_seen`)* → `close`.
//! - `ImapMailbox` uses the `imap` crate over native-tls (IMAPS).
//! - `MockMailbox` keeps messages in memory and records every call.

use std::collections::HashSet;
use std::net::TcpStream;

use crate::config::MailboxConfig;

use super::error::{EmailError, EmailResult};

// ── RawMessage ──────────────────────────────────────────────────────────

/// A raw RFC 5322 message as fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Mailbox-assigned identifier (IMAP UID).
    pub id: String,
    /// Raw message bytes.
    pub data: Vec<u8>,
}

/// Where a mailbox session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Logged in with the inbox selected.
    Selected,
    Closed,
}

// ── MailboxClient trait ─────────────────────────────────────────────────

/// One stateful mailbox session.
///
/// Operations are issued strictly one at a time; the session has no
/// concurrent-access contract.
pub trait MailboxClient {
    /// Open the session and select the configured mailbox.
    fn connect(&mut self) -> EmailResult<()>;

    /// Identifiers of all unseen messages, in ascending order.
    fn search_unseen(&mut self) -> EmailResult<Vec<String>>;

    /// Fetch the full raw message for one identifier.
    fn fetch(&mut self, id: &str) -> EmailResult<RawMessage>;

    /// Set `\Seen` on one identifier.
    fn mark_seen(&mut self, id: &str) -> EmailResult<()>;

    /// Best-effort teardown. Never fails; problems are logged.
    fn close(&mut self);

    fn state(&self) -> SessionState;
}

// ── ImapMailbox ─────────────────────────────────────────────────────────

type ImapSession = imap::Session<native_tls::TlsStream<TcpStream>>;

/// IMAP mailbox over implicit TLS, addressed by UID.
pub struct ImapMailbox {
    config: MailboxConfig,
    session: Option<ImapSession>,
    state: SessionState,
}

impl ImapMailbox {
    /// Create a new IMAP mailbox client (does not connect yet).
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            session: None,
            state: SessionState::Disconnected,
        }
    }

    fn session(&mut self) -> EmailResult<&mut ImapSession> {
        self.session.as_mut().ok_or_else(|| EmailError::Connection {
            message: "mailbox session is not open".to_string(),
        })
    }

    fn fetch_query(&self) -> &'static str {
        if self.config.peek { "BODY.PEEK[]" } else { "RFC822" }
    }
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("mailbox", &self.config.mailbox)
            .field("state", &self.state)
            .finish()
    }
}

impl MailboxClient for ImapMailbox {
    fn connect(&mut self) -> EmailResult<()> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| EmailError::Connection {
                message: format!("TLS connector build failed: {e}"),
            })?;

        let addr = (&*self.config.host, self.config.port);
        let client = imap::connect(addr, &self.config.host, &tls).map_err(|e| {
            EmailError::Connection {
                message: format!("IMAP connection to {} failed: {e}", self.config.host),
            }
        })?;

        let mut session = client
            .login(&self.config.user, &self.config.password)
            .map_err(|e| EmailError::Authentication {
                message: format!("IMAP login failed: {}", e.0),
            })?;

        if let Err(e) = session.select(&self.config.mailbox) {
            session.logout().ok();
            return Err(EmailError::Connection {
                message: format!("IMAP SELECT {} failed: {e}", self.config.mailbox),
            });
        }

        tracing::debug!(host = %self.config.host, mailbox = %self.config.mailbox, "IMAP session selected");
        self.session = Some(session);
        self.state = SessionState::Selected;
        Ok(())
    }

    fn search_unseen(&mut self) -> EmailResult<Vec<String>> {
        let uids = self
            .session()?
            .uid_search("UNSEEN")
            .map_err(|e| EmailError::Connection {
                message: format!("IMAP UID SEARCH UNSEEN failed: {e}"),
            })?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids.into_iter().map(|u| u.to_string()).collect())
    }

    fn fetch(&mut self, id: &str) -> EmailResult<RawMessage> {
        let uid: u32 = id.parse().map_err(|_| EmailError::Fetch {
            id: id.to_string(),
            message: "not a valid IMAP UID".to_string(),
        })?;
        let query = self.fetch_query();

        let fetches = self
            .session()?
            .uid_fetch(uid.to_string(), query)
            .map_err(|e| EmailError::Fetch {
                id: id.to_string(),
                message: format!("UID FETCH {query} failed: {e}"),
            })?;

        let data = fetches
            .iter()
            .find_map(|f: &imap::types::Fetch| f.body().map(|body: &[u8]| body.to_vec()))
            .ok_or_else(|| EmailError::Fetch {
                id: id.to_string(),
                message: "server returned no message body".to_string(),
            })?;

        Ok(RawMessage {
            id: id.to_string(),
            data,
        })
    }

    fn mark_seen(&mut self, id: &str) -> EmailResult<()> {
        self.session()?
            .uid_store(id, "+FLAGS (\\Seen)")
            .map_err(|e| EmailError::Store {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                tracing::warn!("IMAP CLOSE failed: {e}");
            }
            if let Err(e) = session.logout() {
                tracing::warn!("IMAP LOGOUT failed: {e}");
            }
        }
        self.state = SessionState::Closed;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

// ── MockMailbox ─────────────────────────────────────────────────────────

/// In-memory mailbox for unit and integration testing.
///
/// Push raw messages to simulate incoming mail; inspect `fetched()`,
/// `marked_seen()` and `close_count()` to verify what the pipeline did.
/// Like an IMAP server answering `RFC822`, a fetch marks the message seen
/// unless the mock was built with `peek()`.
#[derive(Debug)]
pub struct MockMailbox {
    messages: Vec<RawMessage>,
    seen: HashSet<String>,
    peek: bool,
    connect_error: Option<String>,
    search_error: Option<String>,
    broken_ids: HashSet<String>,
    broken_mark_seen: HashSet<String>,
    fetched: Vec<String>,
    marked_seen: Vec<String>,
    close_count: usize,
    state: SessionState,
}

impl MockMailbox {
    /// Create an empty mock mailbox.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            seen: HashSet::new(),
            peek: false,
            connect_error: None,
            search_error: None,
            broken_ids: HashSet::new(),
            broken_mark_seen: HashSet::new(),
            fetched: Vec::new(),
            marked_seen: Vec::new(),
            close_count: 0,
            state: SessionState::Disconnected,
        }
    }

    /// Fetches leave the seen flag untouched.
    pub fn peek(mut self) -> Self {
        self.peek = true;
        self
    }

    /// Make `connect()` fail with the given message.
    pub fn failing_connect(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    /// Make `search_unseen()` fail with the given message.
    pub fn failing_search(mut self, message: &str) -> Self {
        self.search_error = Some(message.to_string());
        self
    }

    /// Push a raw message; it starts out unseen.
    pub fn push(&mut self, id: &str, data: impl Into<Vec<u8>>) {
        self.messages.push(RawMessage {
            id: id.to_string(),
            data: data.into(),
        });
    }

    /// Make `fetch(id)` fail.
    pub fn break_fetch(&mut self, id: &str) {
        self.broken_ids.insert(id.to_string());
    }

    /// Make `mark_seen(id)` fail.
    pub fn break_mark_seen(&mut self, id: &str) {
        self.broken_mark_seen.insert(id.to_string());
    }

    pub fn fetched(&self) -> &[String] {
        &self.fetched
    }

    pub fn marked_seen(&self) -> &[String] {
        &self.marked_seen
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn ensure_selected(&self) -> EmailResult<()> {
        if self.state == SessionState::Selected {
            Ok(())
        } else {
            Err(EmailError::Connection {
                message: "mailbox session is not open".to_string(),
            })
        }
    }
}

impl Default for MockMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxClient for MockMailbox {
    fn connect(&mut self) -> EmailResult<()> {
        if let Some(message) = &self.connect_error {
            return Err(EmailError::Connection {
                message: message.clone(),
            });
        }
        self.state = SessionState::Selected;
        Ok(())
    }

    fn search_unseen(&mut self) -> EmailResult<Vec<String>> {
        self.ensure_selected()?;
        if let Some(message) = &self.search_error {
            return Err(EmailError::Connection {
                message: message.clone(),
            });
        }
        Ok(self
            .messages
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .map(|m| m.id.clone())
            .collect())
    }

    fn fetch(&mut self, id: &str) -> EmailResult<RawMessage> {
        self.ensure_selected()?;
        self.fetched.push(id.to_string());
        if self.broken_ids.contains(id) {
            return Err(EmailError::Fetch {
                id: id.to_string(),
                message: "simulated fetch failure".to_string(),
            });
        }
        let raw = self
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| EmailError::Fetch {
                id: id.to_string(),
                message: "no such message".to_string(),
            })?;
        if !self.peek {
            self.seen.insert(id.to_string());
        }
        Ok(raw)
    }

    fn mark_seen(&mut self, id: &str) -> EmailResult<()> {
        self.ensure_selected()?;
        if self.broken_mark_seen.contains(id) {
            return Err(EmailError::Store {
                id: id.to_string(),
                message: "simulated STORE failure".to_string(),
            });
        }
        self.marked_seen.push(id.to_string());
        self.seen.insert(id.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.close_count += 1;
        self.state = SessionState::Closed;
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
