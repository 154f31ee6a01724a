//! Consumer and replication configuration.

use dirsync_model::{AliasDerefMode, Dn, Filter, Scope};
use dirsync_protocol::SyncMode;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default refresh interval for RefreshOnly polling.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default response timeout for provider round-trips.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum age of log entries before purge, in days.
pub const DEFAULT_LOG_MAX_AGE_DAYS: u32 = 7;

/// Startup validation failures.
///
/// These are fatal: they surface before any connection attempt and are
/// never produced once the engine is running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No replica id was configured.
    #[error("replica id is not specified")]
    MissingReplicaId,

    /// A peer has no remote host.
    #[error("peer {0}: remote host is not specified")]
    MissingHost(String),

    /// A peer's port is invalid.
    #[error("peer {0}: invalid remote port 0")]
    InvalidPort(String),

    /// The peer list is empty.
    #[error("no peer replicas configured")]
    NoPeers,

    /// Two peers (or a peer and this replica) share an id.
    #[error("duplicate replica id: {0}")]
    DuplicateReplicaId(String),

    /// Two peers share a host:port address.
    #[error("duplicate peer address: {0}")]
    DuplicatePeerAddress(String),

    /// The response timeout is zero.
    #[error("invalid response timeout")]
    InvalidResponseTimeout,

    /// The log max age is zero.
    #[error("invalid log max age: {0}")]
    InvalidLogMaxAge(u32),
}

/// Where the resumption cookie is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieBackend {
    /// A flat file `<dir>/<replica_id>`, length-prefixed raw bytes.
    File {
        /// Directory holding per-replica cookie files.
        dir: PathBuf,
    },
    /// A single attribute value on a local configuration entry.
    Entry {
        /// The configuration entry holding the cookie attribute.
        config_entry_dn: Dn,
    },
}

/// Configuration of one consumer session against one remote provider.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Id of this consumer session (unique across peers).
    pub replica_id: String,
    /// Remote provider host.
    pub remote_host: String,
    /// Remote provider port.
    pub remote_port: u16,
    /// Base DN of the replicated area.
    pub base_dn: Dn,
    /// Content filter.
    pub filter: Filter,
    /// Attributes to request; empty means all.
    pub attributes: Vec<String>,
    /// Search scope.
    pub scope: Scope,
    /// Alias dereferencing policy forwarded to the provider.
    pub deref: AliasDerefMode,
    /// Search size limit; 0 means unlimited.
    pub search_size_limit: u32,
    /// Search time limit in seconds; 0 means unlimited.
    pub search_timeout_secs: u32,
    /// Whether to upgrade the connection to TLS.
    pub use_tls: bool,
    /// Bind identity.
    pub bind_dn: String,
    /// Bind credential.
    pub credentials: String,
    /// RefreshOnly polling interval, also the reconnect backoff.
    pub refresh_interval: Duration,
    /// Response timeout for provider round-trips.
    pub response_timeout: Duration,
    /// Synchronization mode.
    pub mode: SyncMode,
    /// Cookie persistence backend.
    pub cookie_backend: CookieBackend,
}

impl ConsumerConfig {
    /// Creates a config with defaults for everything but the peer
    /// coordinates.
    pub fn new(
        replica_id: impl Into<String>,
        remote_host: impl Into<String>,
        remote_port: u16,
        base_dn: Dn,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            remote_host: remote_host.into(),
            remote_port,
            base_dn,
            filter: Filter::present("objectclass"),
            attributes: Vec::new(),
            scope: Scope::Subtree,
            deref: AliasDerefMode::Never,
            search_size_limit: 0,
            search_timeout_secs: 0,
            use_tls: false,
            bind_dn: String::new(),
            credentials: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            mode: SyncMode::RefreshAndPersist,
            cookie_backend: CookieBackend::File {
                dir: PathBuf::from("cookies"),
            },
        }
    }

    /// Sets the content filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the requested attributes.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the bind identity and credential.
    pub fn with_bind(mut self, bind_dn: impl Into<String>, credentials: impl Into<String>) -> Self {
        self.bind_dn = bind_dn.into();
        self.credentials = credentials.into();
        self
    }

    /// Sets the synchronization mode.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the refresh interval (and reconnect backoff).
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Enables TLS on the connection.
    pub fn with_tls(mut self) -> Self {
        self.use_tls = true;
        self
    }

    /// Sets the cookie persistence backend.
    pub fn with_cookie_backend(mut self, backend: CookieBackend) -> Self {
        self.cookie_backend = backend;
        self
    }

    /// Returns the peer address as `host:port`.
    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// Top-level replication configuration: this replica plus its peers.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Id of the local replica.
    pub replica_id: String,
    /// Consumer sessions to run, one per peer.
    pub peers: Vec<ConsumerConfig>,
    /// Maximum age of stored log entries before purge, in days.
    pub log_max_age_days: u32,
    /// Response timeout applied to peers that did not set one.
    pub response_timeout: Duration,
}

impl ReplicationConfig {
    /// Creates a configuration for the given local replica id.
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            peers: Vec::new(),
            log_max_age_days: DEFAULT_LOG_MAX_AGE_DAYS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Adds a peer consumer config.
    pub fn with_peer(mut self, peer: ConsumerConfig) -> Self {
        self.peers.push(peer);
        self
    }

    /// Sets the log max age in days.
    pub fn with_log_max_age_days(mut self, days: u32) -> Self {
        self.log_max_age_days = days;
        self
    }

    /// Validates the configuration.
    ///
    /// This is the only fatal error path of the engine; anything that
    /// passes here is survivable at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replica_id.trim().is_empty() {
            return Err(ConfigError::MissingReplicaId);
        }

        if self.log_max_age_days == 0 {
            return Err(ConfigError::InvalidLogMaxAge(self.log_max_age_days));
        }

        if self.response_timeout.is_zero() {
            return Err(ConfigError::InvalidResponseTimeout);
        }

        if self.peers.is_empty() {
            return Err(ConfigError::NoPeers);
        }

        let mut ids = HashSet::new();
        ids.insert(self.replica_id.clone());

        let mut addresses: HashMap<String, ()> = HashMap::new();

        for peer in &self.peers {
            if peer.replica_id.trim().is_empty() {
                return Err(ConfigError::MissingReplicaId);
            }

            if !ids.insert(peer.replica_id.clone()) {
                return Err(ConfigError::DuplicateReplicaId(peer.replica_id.clone()));
            }

            if peer.remote_host.trim().is_empty() {
                return Err(ConfigError::MissingHost(peer.replica_id.clone()));
            }

            if peer.remote_port == 0 {
                return Err(ConfigError::InvalidPort(peer.replica_id.clone()));
            }

            if addresses.insert(peer.peer_address(), ()).is_some() {
                return Err(ConfigError::DuplicatePeerAddress(peer.peer_address()));
            }
        }

        Ok(())
    }
}
