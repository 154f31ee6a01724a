//! End-to-end consumer scenarios against the in-process provider fake.

use dirsync_consumer::{
    ConsumerConfig, CookieBackend, MockProvider, ReplicationConfig, ReplicationSupervisor,
    SyncConsumer,
};
use dirsync_model::{sys, Dn, Entry, EntryStore, MemoryDirectory};
use dirsync_oplog::{MemoryReplicationLog, ReplicationLog};
use dirsync_protocol::{
    ChangeNotification, ChangeType, ResultCode, SyncDoneMessage, SyncInfoMessage, SyncMode,
    SyncReply,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn entry(name: &str, uuid: Uuid) -> Entry {
    let mut e = Entry::new(dn(name));
    e.put_values(sys::ENTRY_UUID, [uuid.to_string()]);
    e.put_values("objectclass", ["person"]);
    e.put_values("cn", [name]);
    e
}

fn add(name: &str, uuid: Uuid) -> SyncReply {
    SyncReply::Entry(ChangeNotification::new(
        ChangeType::Add,
        entry(name, uuid),
        uuid,
    ))
}

fn config(cookies: &TempDir) -> ConsumerConfig {
    ConsumerConfig::new("peer-1", "provider", 10389, dn("dc=example"))
        .with_mode(SyncMode::RefreshOnly)
        .with_cookie_backend(CookieBackend::File {
            dir: cookies.path().to_path_buf(),
        })
}

fn consumer(
    cookies: &TempDir,
    provider: Arc<MockProvider>,
    store: Arc<MemoryDirectory>,
    log: Arc<MemoryReplicationLog>,
) -> SyncConsumer<MockProvider> {
    SyncConsumer::new(
        config(cookies),
        store as Arc<dyn EntryStore>,
        log as Arc<dyn ReplicationLog>,
        provider,
    )
    .unwrap()
}

#[test]
fn full_refresh_then_incremental_round() {
    init_logging();
    let cookies = TempDir::new().unwrap();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryDirectory::new());
    let log = Arc::new(MemoryReplicationLog::new());

    let suffix = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    // first session: the full refresh
    provider.script_session(vec![
        add("dc=example", suffix),
        add("uid=alice,dc=example", alice),
        SyncReply::Done(SyncDoneMessage::success(Some(b"after-refresh".to_vec()))),
    ]);
    // second session: one incremental change against the cookie
    provider.script_session(vec![
        add("uid=bob,dc=example", bob),
        SyncReply::Done(SyncDoneMessage::success(Some(b"after-bob".to_vec()))),
    ]);

    let c = consumer(&cookies, provider.clone(), store.clone(), log.clone());
    assert!(c.connect());
    c.start_sync().unwrap();
    c.start_sync().unwrap();

    assert!(store.exists(&dn("uid=alice,dc=example")).unwrap());
    assert!(store.exists(&dn("uid=bob,dc=example")).unwrap());
    assert_eq!(log.log_size(), 3);

    let requests = provider.requests();
    assert_eq!(requests[0].cookie, None);
    assert_eq!(requests[1].cookie, Some(b"after-refresh".to_vec()));
}

#[test]
fn restart_resumes_from_persisted_cookie_and_replays_idempotently() {
    init_logging();
    let cookies = TempDir::new().unwrap();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryDirectory::new());
    let log = Arc::new(MemoryReplicationLog::new());

    let suffix = Uuid::new_v4();
    let alice = Uuid::new_v4();

    provider.script_session(vec![
        add("dc=example", suffix),
        add("uid=alice,dc=example", alice),
        SyncReply::Done(SyncDoneMessage::success(Some(b"checkpoint".to_vec()))),
    ]);

    {
        let c = consumer(&cookies, provider.clone(), store.clone(), log.clone());
        assert!(c.connect());
        c.start_sync().unwrap();
        c.disconnect();
    }

    // "restart": a fresh consumer over the same store, log and cookie
    // directory; the provider replays the last batch past the cookie
    provider.script_session(vec![
        add("uid=alice,dc=example", alice),
        SyncReply::Done(SyncDoneMessage::success(Some(b"checkpoint-2".to_vec()))),
    ]);

    let c = consumer(&cookies, provider.clone(), store.clone(), log.clone());
    assert!(c.connect());
    c.start_sync().unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].cookie, Some(b"checkpoint".to_vec()));

    // the replayed add landed as a no-op
    assert_eq!(store.len(), 2);
    let e = store.lookup(&dn("uid=alice,dc=example")).unwrap();
    assert!(e.get("cn").unwrap().contains_value("uid=alice,dc=example"));
}

#[test]
fn stale_cookie_forces_wipe_and_reload() {
    init_logging();
    let cookies = TempDir::new().unwrap();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryDirectory::new());
    let log = Arc::new(MemoryReplicationLog::new());

    let suffix = Uuid::new_v4();
    let old = Uuid::new_v4();
    let new = Uuid::new_v4();

    store.add(entry("dc=example", suffix)).unwrap();
    store.add(entry("uid=old,dc=example", old)).unwrap();

    provider.script_session(vec![
        add("dc=example", suffix),
        SyncReply::Done(SyncDoneMessage::success(Some(b"doomed".to_vec()))),
    ]);
    // the resume attempt is rejected as too stale
    provider.script_session(vec![SyncReply::Done(SyncDoneMessage::failure(
        ResultCode::RefreshRequired,
    ))]);
    // the reload re-sends current content from scratch
    provider.script_session(vec![
        add("dc=example", suffix),
        add("uid=new,dc=example", new),
        SyncReply::Done(SyncDoneMessage::success(Some(b"rebased".to_vec()))),
    ]);

    let c = consumer(&cookies, provider.clone(), store.clone(), log.clone());
    assert!(c.connect());
    c.start_sync().unwrap();
    c.start_sync().unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].cookie, Some(b"doomed".to_vec()));
    assert_eq!(requests[2].cookie, None);
    assert!(requests[2].reload_hint);

    assert!(!store.exists(&dn("uid=old,dc=example")).unwrap());
    assert!(store.exists(&dn("uid=new,dc=example")).unwrap());
    assert_eq!(c.current_cookie(), Some(b"rebased".to_vec()));
}

#[test]
fn deletion_sets_prune_the_replicated_area() {
    init_logging();
    let cookies = TempDir::new().unwrap();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryDirectory::new());
    let log = Arc::new(MemoryReplicationLog::new());

    let suffix = Uuid::new_v4();
    let keep = Uuid::new_v4();
    let gone_a = Uuid::new_v4();
    let gone_b = Uuid::new_v4();

    store.add(entry("dc=example", suffix)).unwrap();
    store.add(entry("uid=keep,dc=example", keep)).unwrap();
    store.add(entry("uid=gone-a,dc=example", gone_a)).unwrap();
    store.add(entry("uid=gone-b,dc=example", gone_b)).unwrap();

    // delete set: exactly these were removed upstream
    provider.script_session(vec![
        SyncReply::Info(SyncInfoMessage {
            cookie: Some(b"c1".to_vec()),
            refresh_deletes: true,
            entry_uuids: vec![gone_a, gone_b],
            refresh_done: true,
        }),
        SyncReply::Done(SyncDoneMessage::success(None)),
    ]);

    let c = consumer(&cookies, provider.clone(), store.clone(), log.clone());
    assert!(c.connect());
    c.start_sync().unwrap();

    assert!(store.exists(&dn("uid=keep,dc=example")).unwrap());
    assert!(!store.exists(&dn("uid=gone-a,dc=example")).unwrap());
    assert!(!store.exists(&dn("uid=gone-b,dc=example")).unwrap());
    assert_eq!(c.stats().entries_deleted, 2);
}

#[test]
fn supervised_peer_converges_and_stops_cleanly() {
    init_logging();
    let cookies = TempDir::new().unwrap();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryDirectory::new());
    let log = Arc::new(MemoryReplicationLog::new());

    let suffix = Uuid::new_v4();
    provider.script_session(vec![
        add("dc=example", suffix),
        SyncReply::Done(SyncDoneMessage::success(Some(b"c1".to_vec()))),
    ]);
    for _ in 0..20 {
        provider.script_session(vec![SyncReply::Done(SyncDoneMessage::success(Some(
            b"c1".to_vec(),
        )))]);
    }

    let replication = ReplicationConfig::new("local")
        .with_peer(config(&cookies).with_refresh_interval(Duration::from_millis(5)));

    let sup = ReplicationSupervisor::new(
        replication,
        store.clone() as Arc<dyn EntryStore>,
        log as Arc<dyn ReplicationLog>,
        |_| provider.clone(),
    )
    .unwrap();

    sup.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    sup.stop();

    assert!(store.exists(&dn("dc=example")).unwrap());
    assert!(provider.requests().len() >= 2);
    // the later polls resumed from the first session's cookie
    assert_eq!(provider.requests()[1].cookie, Some(b"c1".to_vec()));
}
