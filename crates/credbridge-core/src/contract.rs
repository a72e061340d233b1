//! Behaviour every `CredentialStore` must show, runnable against the
//! in-memory fake or a live OS store.
//!
//! Checks use hosts under `<namespace>.credbridge.invalid` so a live run never
//! touches real entries, and each check removes what it wrote.

use crate::{
    credential::{Credentials, ServerDescriptor},
    storage::{CredentialError, CredentialStore},
};

fn server(namespace: &str, suffix: &str) -> ServerDescriptor {
    let url = format!("https://{namespace}.credbridge.invalid{suffix}");
    match ServerDescriptor::parse(&url) {
        Ok(server) => server,
        Err(err) => panic!("contract server {url:?} should parse: {err}"),
    }
}

fn forget(store: &dyn CredentialStore, server: &ServerDescriptor) {
    // Best effort; the entry may legitimately be absent.
    let _ = store.delete(server);
}

fn expect_not_found<T: std::fmt::Debug>(result: Result<T, CredentialError>, what: &str) {
    match result {
        Err(err) if err.is_not_found() => {}
        other => panic!("{what}: expected NotFound, got {other:?}"),
    }
}

pub fn round_trip(store: &dyn CredentialStore, namespace: &str) {
    let s = server(namespace, "/round-trip");
    forget(store, &s);

    store
        .add(&s, &Credentials::new("alice", "secret1"))
        .expect("add should succeed");
    let got = store.get(&s).expect("get should succeed");
    assert_eq!(got, Credentials::new("alice", "secret1"));

    forget(store, &s);
}

pub fn last_write_wins(store: &dyn CredentialStore, namespace: &str) {
    let s = server(namespace, "/overwrite");
    forget(store, &s);

    store
        .add(&s, &Credentials::new("alice", "s1"))
        .expect("first add should succeed");
    store
        .add(&s, &Credentials::new("bob", "s2"))
        .expect("second add should succeed");
    let got = store.get(&s).expect("get should succeed");
    assert_eq!(got, Credentials::new("bob", "s2"));

    forget(store, &s);
}

pub fn missing_is_not_found(store: &dyn CredentialStore, namespace: &str) {
    let s = server(namespace, "/never-added");
    forget(store, &s);

    expect_not_found(store.get(&s), "get of unknown server");
}

pub fn delete_then_get_fails(store: &dyn CredentialStore, namespace: &str) {
    let s = server(namespace, "/deleted");
    forget(store, &s);

    store
        .add(&s, &Credentials::new("carol", "s3"))
        .expect("add should succeed");
    store.delete(&s).expect("delete should succeed");
    expect_not_found(store.get(&s), "get after delete");
}

pub fn delete_missing_fails(store: &dyn CredentialStore, namespace: &str) {
    let s = server(namespace, "/delete-missing");
    forget(store, &s);

    expect_not_found(store.delete(&s), "delete of unknown server");
}

/// Port and path are part of the lookup key, in both directions: a bare host
/// neither shadows nor clears its port and path variants.
pub fn port_and_path_isolate(store: &dyn CredentialStore, namespace: &str) {
    let base = server(namespace, "");
    let default_port = server(namespace, ":443");
    let other_port = server(namespace, ":5000");
    let other_path = server(namespace, "/v2");
    let all = [&base, &default_port, &other_port, &other_path];
    for s in all {
        forget(store, s);
    }

    store
        .add(&base, &Credentials::new("dave", "s4"))
        .expect("add should succeed");
    expect_not_found(store.get(&default_port), "get with explicit default port");
    expect_not_found(store.get(&other_port), "get with different port");
    expect_not_found(store.get(&other_path), "get with different path");
    forget(store, &base);

    store
        .add(&other_port, &Credentials::new("erin", "s5"))
        .expect("add with port should succeed");
    store
        .add(&other_path, &Credentials::new("frank", "s6"))
        .expect("add with path should succeed");
    expect_not_found(store.get(&base), "get of bare host beside variants");

    store
        .add(&base, &Credentials::new("grace", "s7"))
        .expect("add of bare host should succeed");
    assert_eq!(
        store.get(&other_port).expect("port variant should survive"),
        Credentials::new("erin", "s5")
    );
    assert_eq!(
        store.get(&other_path).expect("path variant should survive"),
        Credentials::new("frank", "s6")
    );
    assert_eq!(
        store.get(&base).expect("bare host should read back"),
        Credentials::new("grace", "s7")
    );

    store.delete(&base).expect("delete of bare host should succeed");
    store
        .get(&other_port)
        .expect("port variant should survive delete of bare host");
    store
        .get(&other_path)
        .expect("path variant should survive delete of bare host");

    for s in all {
        forget(store, s);
    }
}

pub fn check_all(store: &dyn CredentialStore, namespace: &str) {
    round_trip(store, namespace);
    last_write_wins(store, namespace);
    missing_is_not_found(store, namespace);
    delete_then_get_fails(store, namespace);
    delete_missing_fails(store, namespace);
    port_and_path_isolate(store, namespace);
}
