//! The synchronization consumer state machine.
//!
//! One `SyncConsumer` owns one session against one remote provider. It
//! issues the sync search, pumps the reply stream, applies each change
//! to the local store, records the applied operation in the replication
//! log and persists the resumption cookie after the work it
//! acknowledges is committed.
//!
//! The session is single-threaded by construction: one thread calls
//! `start_sync` and everything downstream of it, so notifications from
//! a session are applied strictly in arrival order.

use crate::config::ConsumerConfig;
use crate::cookie::CookieStore;
use crate::delete::{delete_entries, delete_recursive};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::diff_entries;
use crate::transport::ProviderTransport;
use dirsync_model::{AttributeChange, Dn, Entry, EntryStore, StoreError};
use dirsync_oplog::{Csn, CsnFactory, Operation, ReplicationLog};
use dirsync_protocol::{
    ChangeNotification, ChangeType, ModDn, ResultCode, SyncDoneMessage, SyncInfoMessage, SyncMode,
    SyncReply, SyncRequest,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Modifier recorded in CSNs issued for replicated changes.
const REPL_MODIFIER: &str = "replication";

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// No usable connection to the provider.
    Disconnected,
    /// Connected and bound, no sync request in flight.
    Connected,
    /// Refresh phase: consuming the provider's change backlog.
    Syncing,
    /// Persist phase: refresh done, changes stream as they happen.
    Persisting,
}

/// Counters describing what a session has applied so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries created locally.
    pub entries_added: u64,
    /// Entries reconciled via modify.
    pub entries_modified: u64,
    /// Entries moved and/or renamed.
    pub entries_moved: u64,
    /// Entries (or subtrees) deleted.
    pub entries_deleted: u64,
    /// Cookies persisted.
    pub cookies_stored: u64,
}

#[derive(Default)]
struct Counters {
    added: AtomicU64,
    modified: AtomicU64,
    moved: AtomicU64,
    deleted: AtomicU64,
    cookies: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            entries_added: self.added.load(Ordering::Relaxed),
            entries_modified: self.modified.load(Ordering::Relaxed),
            entries_moved: self.moved.load(Ordering::Relaxed),
            entries_deleted: self.deleted.load(Ordering::Relaxed),
            cookies_stored: self.cookies.load(Ordering::Relaxed),
        }
    }
}

/// A consumer session against one remote provider.
pub struct SyncConsumer<T: ProviderTransport> {
    config: ConsumerConfig,
    store: Arc<dyn EntryStore>,
    log: Arc<dyn ReplicationLog>,
    csn_factory: CsnFactory,
    transport: Arc<T>,
    cookie_store: CookieStore,
    cookie: Mutex<Option<Vec<u8>>>,
    last_saved: Mutex<Option<Vec<u8>>>,
    state: RwLock<ConsumerState>,
    counters: Counters,
}

impl<T: ProviderTransport> SyncConsumer<T> {
    /// Creates a consumer session.
    ///
    /// Opens the cookie backend immediately so a misconfigured cookie
    /// directory surfaces before the first connection attempt.
    pub fn new(
        config: ConsumerConfig,
        store: Arc<dyn EntryStore>,
        log: Arc<dyn ReplicationLog>,
        transport: Arc<T>,
    ) -> SyncResult<Self> {
        let cookie_store = CookieStore::open(&config.cookie_backend, &config.replica_id, store.clone())?;
        let csn_factory = CsnFactory::new(config.replica_id.clone());

        Ok(Self {
            config,
            store,
            log,
            csn_factory,
            transport,
            cookie_store,
            cookie: Mutex::new(None),
            last_saved: Mutex::new(None),
            state: RwLock::new(ConsumerState::Disconnected),
            counters: Counters::default(),
        })
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.read()
    }

    /// Returns a snapshot of the session counters.
    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    /// Returns the cookie the session currently holds in memory.
    pub fn current_cookie(&self) -> Option<Vec<u8>> {
        self.cookie.lock().clone()
    }

    /// Attempts to connect and bind to the provider.
    ///
    /// Failure is reported, not raised: the supervisor treats an
    /// unreachable provider as "stale but running" and retries.
    pub fn connect(&self) -> bool {
        match self.transport.connect(&self.config) {
            Ok(()) => {
                info!(peer = %self.config.peer_address(), "connected to provider");
                *self.state.write() = ConsumerState::Connected;
                true
            }
            Err(e) => {
                warn!(peer = %self.config.peer_address(), error = %e, "failed to connect");
                false
            }
        }
    }

    /// Runs one synchronization session.
    ///
    /// In `RefreshOnly` mode this returns after the refresh round-trip;
    /// in `RefreshAndPersist` it returns only when the stream ends
    /// (provider gone, stop requested, or a non-success done marker).
    pub fn start_sync(&self) -> SyncResult<()> {
        {
            let mut cookie = self.cookie.lock();
            if cookie.is_none() {
                *cookie = self.cookie_store.load();
                if let Some(c) = cookie.as_deref() {
                    debug!(len = c.len(), "resuming from persisted cookie");
                }
            }
        }

        self.do_sync_search(false)
    }

    /// Persists the in-flight cookie and tears the connection down.
    pub fn disconnect(&self) {
        if let Some(cookie) = self.cookie.lock().take() {
            if let Err(e) = self.persist_cookie(&cookie) {
                warn!(error = %e, "failed to persist cookie on disconnect");
            }
        }
        *self.last_saved.lock() = None;

        self.transport.close();
        *self.state.write() = ConsumerState::Disconnected;
        info!(peer = %self.config.peer_address(), "disconnected");
    }

    fn build_request(&self, reload_hint: bool) -> SyncRequest {
        let cookie = if reload_hint {
            // a reload starts from nothing regardless of what we hold
            None
        } else {
            self.cookie.lock().clone().filter(|c| !c.is_empty())
        };

        SyncRequest {
            base: self.config.base_dn.clone(),
            scope: self.config.scope,
            filter: self.config.filter.clone(),
            attributes: self.config.attributes.clone(),
            deref: self.config.deref,
            size_limit: self.config.search_size_limit,
            time_limit_secs: self.config.search_timeout_secs,
            mode: self.config.mode,
            cookie,
            reload_hint,
        }
    }

    fn do_sync_search(&self, reload_hint: bool) -> SyncResult<()> {
        let request = self.build_request(reload_hint);
        debug!(
            base = %request.base,
            mode = ?request.mode,
            has_cookie = request.cookie.is_some(),
            reload_hint,
            "issuing sync request"
        );

        let mut stream = self.transport.search(&request)?;
        *self.state.write() = ConsumerState::Syncing;

        loop {
            match stream.next_reply()? {
                SyncReply::Entry(notification) => {
                    let dn = notification.entry.dn().clone();
                    let cookie = notification.cookie.clone();

                    // one bad notification must not take the session down
                    match self.apply_notification(notification) {
                        Ok(()) => {
                            // acknowledge only what was applied: keeping
                            // the old cookie replays the skipped change
                            // after a restart instead of losing it
                            if let Some(cookie) = cookie {
                                self.store_cookie(cookie);
                            }
                        }
                        Err(e) => {
                            warn!(%dn, error = %e, "skipping unappliable notification");
                        }
                    }
                }
                SyncReply::Info(info) => {
                    if let Err(e) = self.handle_sync_info(info) {
                        warn!(error = %e, "skipping unappliable sync-info message");
                    }
                }
                SyncReply::Done(done) => return self.handle_done(done),
            }
        }
    }

    fn apply_notification(&self, notification: ChangeNotification) -> SyncResult<()> {
        let ChangeNotification {
            change,
            entry,
            entry_uuid,
            ..
        } = notification;

        match change {
            ChangeType::Add => self.apply_add(entry, entry_uuid)?,

            ChangeType::Modify => self.apply_modify(entry, entry_uuid)?,

            ChangeType::ModDn(mod_dn) => {
                // the snapshot carries the pre-move DN; the identity map
                // wins when it knows better (a replayed batch may)
                let dn = self
                    .log
                    .dn_for_uuid(&entry_uuid)
                    .unwrap_or_else(|| entry.dn().clone());
                self.apply_mod_dn(dn, mod_dn, entry_uuid)?;
            }

            ChangeType::Delete => {
                let dn = self
                    .log
                    .dn_for_uuid(&entry_uuid)
                    .unwrap_or_else(|| entry.dn().clone());

                let removed = delete_recursive(self.store.as_ref(), &dn)?;
                let operation = Operation::delete_entry(self.next_csn(), dn);
                self.log.append(&operation)?;
                self.log.remove_uuid(&entry_uuid);
                self.counters.deleted.fetch_add(removed as u64, Ordering::Relaxed);
            }

            ChangeType::Present => {
                debug!(dn = %entry.dn(), "entry present on provider");
            }
        }

        Ok(())
    }

    fn apply_add(&self, entry: Entry, entry_uuid: uuid::Uuid) -> SyncResult<()> {
        let dn = entry.dn().clone();

        match self.store.add(entry.clone()) {
            Ok(()) => {
                let operation = Operation::add_entry(self.next_csn(), entry);
                self.log.append(&operation)?;
                self.log.put_uuid(entry_uuid, dn);
                self.counters.added.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            // a full refresh re-sends entries we already hold
            Err(StoreError::EntryExists(_)) => self.apply_modify(entry, entry_uuid),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_modify(&self, remote: Entry, entry_uuid: uuid::Uuid) -> SyncResult<()> {
        let dn = remote.dn().clone();

        let local = match self.store.lookup(&dn) {
            Ok(local) => local,
            // modified upstream before we ever saw the add
            Err(StoreError::NoSuchEntry(_)) => return self.apply_add(remote, entry_uuid),
            Err(e) => return Err(e.into()),
        };

        let changes = diff_entries(&local, &remote);
        if changes.is_empty() {
            return Ok(());
        }

        // one atomic modify, one composite in the log
        self.store.modify(&dn, &changes)?;

        let csn = self.next_csn();
        let children = changes
            .into_iter()
            .map(|change| match change {
                AttributeChange::Add(a) => Operation::add_attribute(csn.clone(), dn.clone(), a),
                AttributeChange::Remove(a) => Operation::remove_attribute(csn.clone(), dn.clone(), a),
                AttributeChange::Replace(a) => Operation::replace_attribute(csn.clone(), dn.clone(), a),
            })
            .collect();

        let composite = Operation::composite(csn, dn.clone(), children)?;
        self.log.append(&composite)?;
        self.log.put_uuid(entry_uuid, dn);
        self.counters.modified.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn apply_mod_dn(&self, dn: Dn, mod_dn: ModDn, entry_uuid: uuid::Uuid) -> SyncResult<()> {
        let new_dn = match mod_dn {
            ModDn::Move { new_parent } => {
                self.store.move_entry(&dn, &new_parent)?;

                let operation = Operation::move_entry(self.next_csn(), dn.clone(), new_parent.clone());
                self.log.append(&operation)?;
                dn.under(&new_parent)
            }

            ModDn::Rename {
                new_rdn,
                delete_old_rdn,
            } => {
                self.store.rename(&dn, &new_rdn, delete_old_rdn)?;

                let operation =
                    Operation::rename(self.next_csn(), dn.clone(), new_rdn.clone(), delete_old_rdn);
                self.log.append(&operation)?;
                dn.with_rdn(new_rdn)
            }

            ModDn::MoveAndRename {
                new_parent,
                new_rdn,
                delete_old_rdn,
            } => {
                self.store
                    .move_and_rename(&dn, &new_parent, &new_rdn, delete_old_rdn)?;

                // one transfer unit: the move and the rename share a CSN
                let csn = self.next_csn();
                let children = vec![
                    Operation::move_entry(csn.clone(), dn.clone(), new_parent.clone()),
                    Operation::rename(
                        csn.clone(),
                        dn.under(&new_parent),
                        new_rdn.clone(),
                        delete_old_rdn,
                    ),
                ];
                let composite = Operation::composite(csn, dn.clone(), children)?;
                self.log.append(&composite)?;
                new_parent.child(new_rdn)
            }
        };

        self.log.put_uuid(entry_uuid, new_dn);
        self.counters.moved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn handle_sync_info(&self, info: SyncInfoMessage) -> SyncResult<()> {
        debug!(
            refresh_deletes = info.refresh_deletes,
            uuids = info.entry_uuids.len(),
            refresh_done = info.refresh_done,
            "sync-info message"
        );

        // an empty set is skipped: an empty present list would read as
        // "delete everything", which no provider means by it
        if !info.entry_uuids.is_empty() {
            let removed = delete_entries(
                self.store.as_ref(),
                &self.config.base_dn,
                &info.entry_uuids,
                !info.refresh_deletes,
            )?;
            self.counters.deleted.fetch_add(removed as u64, Ordering::Relaxed);
        }

        if let Some(cookie) = info.cookie {
            self.store_cookie(cookie);
        }

        if info.refresh_done && self.config.mode == SyncMode::RefreshAndPersist {
            info!(peer = %self.config.peer_address(), "refresh complete, entering persist phase");
            *self.state.write() = ConsumerState::Persisting;
        }

        Ok(())
    }

    fn handle_done(&self, done: SyncDoneMessage) -> SyncResult<()> {
        if let Some(cookie) = done.cookie {
            self.store_cookie(cookie);
        }

        match done.result {
            ResultCode::Success => {
                debug!(peer = %self.config.peer_address(), "sync session finished");
                Ok(())
            }

            ResultCode::NoSuchObject => {
                warn!(
                    base = %self.config.base_dn,
                    "replicated base does not exist on the provider"
                );
                if self.config.mode == SyncMode::RefreshAndPersist {
                    self.disconnect();
                }
                Err(SyncError::transport_retryable(
                    "replicated base missing on provider",
                ))
            }

            ResultCode::RefreshRequired => self.handle_refresh_required(),

            ResultCode::Other(code) => {
                warn!(code, "provider ended session with an error");
                Err(SyncError::Protocol(format!(
                    "unexpected provider result code {code}"
                )))
            }
        }
    }

    /// The stored cookie predates the provider's retained history; the
    /// only safe recovery is a full reload.
    ///
    /// The cookie is cleared before the local wipe: if the process dies
    /// mid-wipe, the next start finds no cookie and simply runs another
    /// full transfer, instead of resuming from a token that claims the
    /// wiped content still exists.
    fn handle_refresh_required(&self) -> SyncResult<()> {
        warn!(
            peer = %self.config.peer_address(),
            "cookie too stale to resume, reloading the replicated area"
        );

        *self.cookie.lock() = None;
        *self.last_saved.lock() = None;
        self.cookie_store.clear()?;

        let removed = delete_recursive(self.store.as_ref(), &self.config.base_dn)?;
        debug!(removed, "wiped replicated area for reload");

        self.do_sync_search(true)
    }

    fn store_cookie(&self, cookie: Vec<u8>) {
        if let Err(e) = self.persist_cookie(&cookie) {
            // losing a cookie write costs a replayed batch, not correctness
            warn!(error = %e, "failed to persist cookie");
        }
        *self.cookie.lock() = Some(cookie);
    }

    fn persist_cookie(&self, cookie: &[u8]) -> SyncResult<()> {
        let mut last_saved = self.last_saved.lock();

        if last_saved.as_deref() == Some(cookie) {
            return Ok(());
        }

        self.cookie_store.save(cookie)?;
        *last_saved = Some(cookie.to_vec());
        self.counters.cookies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn next_csn(&self) -> Csn {
        self.csn_factory.next(REPL_MODIFIER)
    }
}
