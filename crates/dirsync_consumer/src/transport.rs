//! Transport abstraction over the provider connection.
//!
//! The consumer only ever talks to a provider through
//! [`ProviderTransport`], so the protocol state machine can be driven
//! by the in-process [`MockProvider`] in tests exactly as it would be
//! by a network client.

use crate::config::ConsumerConfig;
use crate::error::{SyncError, SyncResult};
use dirsync_protocol::{SyncReply, SyncRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A stream of replies to one sync request.
///
/// `next_reply` blocks until the provider sends the next item; the
/// stream ends with a done marker, after which further calls are a
/// transport error.
pub trait ReplyStream: Send {
    /// Returns the next reply from the provider.
    fn next_reply(&mut self) -> SyncResult<SyncReply>;
}

/// A connection to one remote provider.
pub trait ProviderTransport: Send + Sync {
    /// Connects and binds to the provider.
    fn connect(&self, config: &ConsumerConfig) -> SyncResult<()>;

    /// Returns true while the connection is usable.
    fn is_connected(&self) -> bool;

    /// Issues a sync request and returns its reply stream.
    fn search(&self, request: &SyncRequest) -> SyncResult<Box<dyn ReplyStream>>;

    /// Tears the connection down.
    fn close(&self);
}

/// In-process provider fake driven by scripted reply sessions.
///
/// Each call to [`search`](ProviderTransport::search) consumes one
/// scripted session and replays it reply by reply; every request is
/// recorded so tests can assert on cookies and reload hints.
#[derive(Default)]
pub struct MockProvider {
    connected: AtomicBool,
    accept_connections: AtomicBool,
    expected_bind: Mutex<Option<(String, String)>>,
    sessions: Mutex<VecDeque<Vec<SyncReply>>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl MockProvider {
    /// Creates a provider that accepts connections.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            accept_connections: AtomicBool::new(true),
            expected_bind: Mutex::new(None),
            sessions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requires future connects to bind with these credentials.
    pub fn require_bind(&self, bind_dn: impl Into<String>, credentials: impl Into<String>) {
        *self.expected_bind.lock() = Some((bind_dn.into(), credentials.into()));
    }

    /// Scripts the replies for the next unscripted search.
    pub fn script_session(&self, replies: Vec<SyncReply>) {
        self.sessions.lock().push_back(replies);
    }

    /// Controls whether future connect attempts succeed.
    pub fn set_accept_connections(&self, accept: bool) {
        self.accept_connections.store(accept, Ordering::SeqCst);
        if !accept {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Returns every request issued so far, in order.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of scripted sessions not yet consumed.
    pub fn pending_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl ProviderTransport for MockProvider {
    fn connect(&self, config: &ConsumerConfig) -> SyncResult<()> {
        if !self.accept_connections.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable(format!(
                "connection refused: {}",
                config.peer_address()
            )));
        }

        if let Some((bind_dn, credentials)) = self.expected_bind.lock().as_ref() {
            if config.bind_dn != *bind_dn || config.credentials != *credentials {
                return Err(SyncError::BindFailed(format!(
                    "invalid credentials for {}",
                    config.bind_dn
                )));
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn search(&self, request: &SyncRequest) -> SyncResult<Box<dyn ReplyStream>> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }

        self.requests.lock().push(request.clone());

        let replies = self
            .sessions
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::transport_retryable("no scripted session"))?;

        Ok(Box::new(MockReplyStream {
            replies: replies.into(),
        }))
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct MockReplyStream {
    replies: VecDeque<SyncReply>,
}

impl ReplyStream for MockReplyStream {
    fn next_reply(&mut self) -> SyncResult<SyncReply> {
        self.replies
            .pop_front()
            .ok_or_else(|| SyncError::transport_retryable("connection closed mid-stream"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_model::{AliasDerefMode, Dn, Filter, Scope};
    use dirsync_protocol::{SyncDoneMessage, SyncMode};

    fn request() -> SyncRequest {
        SyncRequest {
            base: Dn::parse("dc=example").unwrap(),
            scope: Scope::Subtree,
            filter: Filter::present("objectclass"),
            attributes: Vec::new(),
            deref: AliasDerefMode::Never,
            size_limit: 0,
            time_limit_secs: 0,
            mode: SyncMode::RefreshOnly,
            cookie: None,
            reload_hint: false,
        }
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig::new("p1", "provider", 10389, Dn::parse("dc=example").unwrap())
    }

    #[test]
    fn connect_respects_acceptance() {
        let provider = MockProvider::new();

        provider.connect(&config()).unwrap();
        assert!(provider.is_connected());

        provider.set_accept_connections(false);
        assert!(!provider.is_connected());
        assert!(provider.connect(&config()).is_err());

        provider.set_accept_connections(true);
        provider.connect(&config()).unwrap();
        assert!(provider.is_connected());
    }

    #[test]
    fn bind_credentials_are_checked() {
        let provider = MockProvider::new();
        provider.require_bind("cn=repl,dc=example", "secret");

        let rejected = provider.connect(&config());
        assert!(matches!(rejected, Err(SyncError::BindFailed(_))));
        assert!(!provider.is_connected());

        let bound = config().with_bind("cn=repl,dc=example", "secret");
        provider.connect(&bound).unwrap();
        assert!(provider.is_connected());
    }

    #[test]
    fn scripted_session_replays_in_order() {
        let provider = MockProvider::new();
        provider.connect(&config()).unwrap();
        provider.script_session(vec![SyncReply::Done(SyncDoneMessage::success(None))]);

        let mut stream = provider.search(&request()).unwrap();
        assert!(matches!(stream.next_reply(), Ok(SyncReply::Done(_))));
        assert!(stream.next_reply().is_err());

        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.pending_sessions(), 0);
    }

    #[test]
    fn search_requires_connection_and_script() {
        let provider = MockProvider::new();

        assert!(provider.search(&request()).is_err());

        provider.connect(&config()).unwrap();
        assert!(provider.search(&request()).is_err());
    }
}
