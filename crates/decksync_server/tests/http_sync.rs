//! Clients syncing with a server through the HTTP transport.

use decksync_engine::{
    full, HttpTransport, LoopbackClient, MediaManifest, MediaSyncConfig, MediaSyncOutcome,
    MediaSyncSession, SyncConfig, SyncError, SyncOutcome, SyncSession, SyncTransport,
};
use decksync_protocol::{Graves, StartRequest};
use decksync_server::{ServerConfig, SyncServer};
use decksync_store::{Note, RecordStore};
use decksync_testkit::prelude::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;

type Transport = HttpTransport<LoopbackClient<Arc<SyncServer>>>;

fn transport(server: &Arc<SyncServer>) -> Transport {
    HttpTransport::new("https://sync.example.org", LoopbackClient::new(Arc::clone(server)))
}

fn session(server: &Arc<SyncServer>) -> SyncSession<Transport> {
    SyncSession::new(
        SyncConfig::new("tests,1").with_maintenance(false),
        transport(server),
    )
}

fn serve(store: RecordStore, config: ServerConfig) -> Arc<SyncServer> {
    Arc::new(SyncServer::new(config, store))
}

#[test]
fn two_clients_converge_through_the_server() {
    let mut stores = cloned_collections(3);
    let server = serve(stores.pop().unwrap(), ServerConfig::default().with_chunk_size(2));
    let b = stores.pop().unwrap();
    let a = stores.pop().unwrap();

    for nid in 1..=3 {
        add_note(&a, nid, &format!("a{nid}"), &["from a", "back"]);
    }
    touch(&a);
    assert_eq!(session(&server).sync(&a).unwrap(), SyncOutcome::Success);

    add_note(&b, 50, "b50", &["from b", "back"]);
    touch_after(&b, server.with_store(|s| s.meta().unwrap().mtime));
    assert_eq!(session(&server).sync(&b).unwrap(), SyncOutcome::Success);
    assert_eq!(b.count::<Note>().unwrap(), 4);

    assert_eq!(session(&server).sync(&a).unwrap(), SyncOutcome::Success);
    assert_eq!(a.count::<Note>().unwrap(), 4);
    assert_eq!(a.sanity_digest().unwrap(), b.sanity_digest().unwrap());

    assert_eq!(session(&server).sync(&a).unwrap(), SyncOutcome::NoChanges);
    assert_eq!(server.with_store(|s| s.usn().unwrap()), 3);
}

#[test]
fn login_is_required_when_auth_is_on() {
    let (client, store) = twin_collections();
    let server = serve(
        store,
        ServerConfig::default()
            .with_auth(b"server secret".to_vec())
            .with_account("alice", "pw"),
    );
    add_note(&client, 1, "g1", &["front", "back"]);
    touch(&client);

    let anonymous = session(&server);
    assert_eq!(anonymous.sync(&client).unwrap(), SyncOutcome::BadAuth);

    let wrong = transport(&server);
    assert!(matches!(
        wrong.login("alice", "guess"),
        Err(SyncError::AuthenticationFailed(_))
    ));

    let authed = session(&server);
    authed.transport().login("alice", "pw").unwrap();
    assert_eq!(authed.sync(&client).unwrap(), SyncOutcome::Success);
}

#[test]
fn unreachable_server_is_bad_auth() {
    let (client, store) = twin_collections();
    let server = serve(store, ServerConfig::default());
    let session = session(&server);
    session.transport().close();
    touch(&client);

    assert_eq!(session.sync(&client).unwrap(), SyncOutcome::BadAuth);
}

#[test]
fn second_session_gets_409_and_leaves_the_first_alone() {
    let (client, store) = twin_collections();
    let server = serve(store, ServerConfig::default());

    let holder = transport(&server);
    holder
        .start(&StartRequest {
            min_usn: 0,
            local_newer: false,
            graves: Graves::default(),
        })
        .unwrap();

    add_note(&client, 1, "g1", &["front", "back"]);
    touch(&client);
    let err = session(&server).sync(&client).unwrap_err();
    assert!(matches!(err, SyncError::Http { status: 409, .. }));
    assert_eq!(server.active_session(), Some(holder.session_key()));
    assert!(server.in_session());

    holder.abort().unwrap();
    assert!(!server.in_session());
    assert_eq!(session(&server).sync(&client).unwrap(), SyncOutcome::Success);
}

#[test]
fn maintenance_mode_aborts_with_message() {
    let (client, store) = twin_collections();
    let server = serve(
        store,
        ServerConfig::default()
            .with_maintenance(true)
            .with_message("upgrading"),
    );
    touch(&client);

    assert_eq!(
        session(&server).sync(&client).unwrap(),
        SyncOutcome::ServerAbort {
            message: "upgrading".into()
        }
    );
}

#[test]
fn full_upload_after_schema_change() {
    let (client, store) = twin_collections();
    let server = serve(store, ServerConfig::default());
    add_note(&client, 1, "g1", &["front", "back"]);
    client.bump_schema().unwrap();

    let session = session(&server);
    assert_eq!(session.sync(&client).unwrap(), SyncOutcome::FullSync);

    full::full_upload(session.transport().as_ref(), &client).unwrap();
    assert_eq!(server.with_store(|s| s.count::<Note>().unwrap()), 1);
    assert_eq!(session.sync(&client).unwrap(), SyncOutcome::NoChanges);
}

#[test]
fn oversized_upload_is_refused() {
    let (client, store) = twin_collections();
    let server = serve(store, ServerConfig::default().with_max_upload_bytes(16));

    let err = full::full_upload(&transport(&server), &client).unwrap_err();
    assert!(matches!(err, SyncError::Http { status: 413, .. }));
    assert_eq!(server.with_store(|s| s.count::<Note>().unwrap()), 0);
}

#[test]
fn media_syncs_over_http() {
    let (_, store) = twin_collections();
    let server = serve(store, ServerConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("media");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("a.png"), b"png").unwrap();
    server.media().put_file("remote.mp3", b"mp3".to_vec());

    let manifest = MediaManifest::open_in_memory().unwrap();
    let media = MediaSyncSession::new(MediaSyncConfig::new(), Arc::new(transport(&server)));
    assert_eq!(
        media.sync(&manifest, &folder).unwrap(),
        MediaSyncOutcome::Synced { downloaded: 1, removed: 0, uploaded: 1 }
    );
    assert_eq!(server.media().file("a.png").unwrap(), b"png");
    assert_eq!(std::fs::read(folder.join("remote.mp3")).unwrap(), b"mp3");
    assert_eq!(media.sync(&manifest, &folder).unwrap(), MediaSyncOutcome::NoChanges);
}
