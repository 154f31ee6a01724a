//! Session supervision and reconnect.
//!
//! The supervisor runs one background thread per configured peer. Each
//! thread owns its consumer session outright: it connects, runs sync
//! rounds, and on any failure backs off for the peer's refresh interval
//! before trying again, indefinitely. `stop` interrupts every backoff
//! sleep, disconnects the sessions and joins the threads.

use crate::config::{ConsumerConfig, ReplicationConfig};
use crate::consumer::SyncConsumer;
use crate::error::{SyncError, SyncResult};
use crate::transport::ProviderTransport;
use dirsync_model::EntryStore;
use dirsync_oplog::ReplicationLog;
use dirsync_protocol::SyncMode;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Interruptible stop signal shared by the session threads.
#[derive(Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl Shutdown {
    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps up to `timeout`, waking early on stop. Returns true if
    /// the supervisor is stopping.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn trigger(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }
}

/// Runs and supervises one consumer session per configured peer.
pub struct ReplicationSupervisor<T: ProviderTransport + 'static> {
    consumers: Vec<Arc<SyncConsumer<T>>>,
    shutdown: Arc<Shutdown>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: ProviderTransport + 'static> ReplicationSupervisor<T> {
    /// Validates the configuration and builds one consumer per peer.
    ///
    /// `make_transport` supplies the provider connection for each peer.
    /// Validation failures are the engine's only fatal errors; nothing
    /// past this point takes the supervisor down.
    pub fn new<F>(
        config: ReplicationConfig,
        store: Arc<dyn EntryStore>,
        log: Arc<dyn ReplicationLog>,
        mut make_transport: F,
    ) -> SyncResult<Self>
    where
        F: FnMut(&ConsumerConfig) -> Arc<T>,
    {
        config.validate()?;

        let mut consumers = Vec::with_capacity(config.peers.len());
        for peer in &config.peers {
            let transport = make_transport(peer);
            consumers.push(Arc::new(SyncConsumer::new(
                peer.clone(),
                store.clone(),
                log.clone(),
                transport,
            )?));
        }

        Ok(Self {
            consumers,
            shutdown: Arc::new(Shutdown::default()),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Returns the supervised consumer sessions.
    pub fn consumers(&self) -> &[Arc<SyncConsumer<T>>] {
        &self.consumers
    }

    /// Spawns one session thread per peer.
    pub fn start(&self) -> SyncResult<()> {
        let mut handles = self.handles.lock();

        for consumer in &self.consumers {
            let consumer = consumer.clone();
            let shutdown = self.shutdown.clone();
            let name = format!("dirsync-{}", consumer.config().replica_id);

            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || run_session(consumer, shutdown))
                .map_err(|e| {
                    SyncError::transport_fatal(format!("failed to spawn session thread: {e}"))
                })?;

            handles.push(handle);
        }

        info!(peers = self.consumers.len(), "replication supervisor started");
        Ok(())
    }

    /// Stops every session and joins the threads.
    pub fn stop(&self) {
        self.shutdown.trigger();

        for consumer in &self.consumers {
            consumer.disconnect();
        }

        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("session thread panicked");
            }
        }

        info!("replication supervisor stopped");
    }
}

fn run_session<T: ProviderTransport>(consumer: Arc<SyncConsumer<T>>, shutdown: Arc<Shutdown>) {
    let peer = consumer.config().peer_address();
    let interval = consumer.config().refresh_interval;

    'outer: while !shutdown.is_stopped() {
        if !consumer.connect() {
            if shutdown.wait(interval) {
                break;
            }
            continue;
        }

        loop {
            match consumer.start_sync() {
                Ok(()) => {
                    if consumer.config().mode == SyncMode::RefreshAndPersist {
                        // the persist stream only ends when the
                        // connection does; reconnect after backoff
                        warn!(%peer, "persist stream ended, reconnecting");
                        break;
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(%peer, error = %e, "sync session failed, reconnecting");
                    break;
                }
                Err(e) => {
                    // reconnection still happens, but a non-transient
                    // failure likely needs operator attention
                    error!(%peer, error = %e, "sync session failed, reconnecting");
                    break;
                }
            }

            // RefreshOnly: poll again on the same connection
            if shutdown.wait(interval) {
                break 'outer;
            }
        }

        consumer.disconnect();

        if shutdown.wait(interval) {
            break;
        }
    }

    consumer.disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieBackend;
    use crate::transport::MockProvider;
    use dirsync_model::{Dn, MemoryDirectory};
    use dirsync_oplog::MemoryReplicationLog;
    use dirsync_protocol::{SyncDoneMessage, SyncReply};
    use std::time::Instant;
    use tempfile::TempDir;

    fn peer(id: &str, cookies: &TempDir, interval: Duration) -> ConsumerConfig {
        ConsumerConfig::new(id, "provider", 10389, Dn::parse("dc=example").unwrap())
            .with_mode(SyncMode::RefreshOnly)
            .with_refresh_interval(interval)
            .with_cookie_backend(CookieBackend::File {
                dir: cookies.path().join(id),
            })
    }

    fn supervisor(
        config: ReplicationConfig,
        provider: Arc<MockProvider>,
    ) -> ReplicationSupervisor<MockProvider> {
        ReplicationSupervisor::new(
            config,
            Arc::new(MemoryDirectory::new()),
            Arc::new(MemoryReplicationLog::new()),
            |_| provider.clone(),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let provider = Arc::new(MockProvider::new());
        let result = ReplicationSupervisor::new(
            ReplicationConfig::new("local"),
            Arc::new(MemoryDirectory::new()) as Arc<dyn dirsync_model::EntryStore>,
            Arc::new(MemoryReplicationLog::new()) as Arc<dyn ReplicationLog>,
            |_| provider.clone(),
        );

        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn stop_interrupts_backoff_promptly() {
        let cookies = TempDir::new().unwrap();
        let config = ReplicationConfig::new("local").with_peer(peer(
            "p1",
            &cookies,
            Duration::from_secs(60),
        ));

        let provider = Arc::new(MockProvider::new());
        provider.set_accept_connections(false);

        let sup = supervisor(config, provider);
        sup.start().unwrap();

        // let the thread hit the connect failure and enter its backoff
        std::thread::sleep(Duration::from_millis(50));

        let begin = Instant::now();
        sup.stop();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn refresh_only_polls_until_stopped() {
        let cookies = TempDir::new().unwrap();
        let config = ReplicationConfig::new("local").with_peer(peer(
            "p1",
            &cookies,
            Duration::from_millis(5),
        ));

        let provider = Arc::new(MockProvider::new());
        for _ in 0..50 {
            provider.script_session(vec![SyncReply::Done(SyncDoneMessage::success(None))]);
        }

        let sup = supervisor(config, provider.clone());
        sup.start().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        sup.stop();

        // several polls happened, each with its own request
        assert!(provider.requests().len() >= 2);
        assert_eq!(sup.consumers().len(), 1);
    }

    #[test]
    fn reconnects_after_refused_connections() {
        let cookies = TempDir::new().unwrap();
        let config = ReplicationConfig::new("local").with_peer(peer(
            "p1",
            &cookies,
            Duration::from_millis(5),
        ));

        let provider = Arc::new(MockProvider::new());
        provider.set_accept_connections(false);
        for _ in 0..50 {
            provider.script_session(vec![SyncReply::Done(SyncDoneMessage::success(None))]);
        }

        let sup = supervisor(config, provider.clone());
        sup.start().unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(provider.requests().is_empty());

        provider.set_accept_connections(true);
        std::thread::sleep(Duration::from_millis(100));
        sup.stop();

        assert!(!provider.requests().is_empty());
    }
}
