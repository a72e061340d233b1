use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::instrument;

use super::{CredentialError, CredentialStore};
use crate::credential::{Credentials, Protocol, ServerDescriptor};

type EntryKey = (Protocol, String, String, u16);

/// In-memory credential store for tests and the `memory` backend.
/// Entries are keyed the way the Keychain keys internet passwords:
/// protocol, host, path and port.
///
/// The Secret Service and Credential Manager stores key on the URL string
/// instead, so `registry.example.com` and `https://registry.example.com/`
/// share an entry here but are separate entries there.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<HashMap<EntryKey, Credentials>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<EntryKey, Credentials>>, CredentialError> {
        self.inner
            .lock()
            .map_err(|err| CredentialError::Platform(format!("lock poisoned: {err}")))
    }
}

fn entry_key(server: &ServerDescriptor) -> EntryKey {
    (
        server.protocol(),
        server.host().to_string(),
        server.path().to_string(),
        server.port(),
    )
}

impl CredentialStore for InMemoryCredentialStore {
    #[instrument(skip_all, fields(server = %server))]
    fn add(
        &self,
        server: &ServerDescriptor,
        credentials: &Credentials,
    ) -> Result<(), CredentialError> {
        self.entries()?
            .insert(entry_key(server), credentials.clone());
        Ok(())
    }

    #[instrument(skip_all, fields(server = %server))]
    fn get(&self, server: &ServerDescriptor) -> Result<Credentials, CredentialError> {
        self.entries()?
            .get(&entry_key(server))
            .cloned()
            .ok_or(CredentialError::NotFound)
    }

    #[instrument(skip_all, fields(server = %server))]
    fn delete(&self, server: &ServerDescriptor) -> Result<(), CredentialError> {
        self.entries()?
            .remove(&entry_key(server))
            .map(|_| ())
            .ok_or(CredentialError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn satisfies_store_contract() {
        let store = InMemoryCredentialStore::new();
        contract::check_all(&store, "memory-test");
    }

    #[test]
    fn clones_share_entries() {
        let store = InMemoryCredentialStore::new();
        let server = ServerDescriptor::parse("https://registry.example.com").expect("parse");
        store
            .add(&server, &Credentials::new("alice", "secret1"))
            .expect("add should succeed");

        let clone = store.clone();
        assert_eq!(
            clone.get(&server).expect("get via clone"),
            Credentials::new("alice", "secret1")
        );
    }

    #[test]
    fn bare_and_explicit_https_share_an_entry() {
        let store = InMemoryCredentialStore::new();
        let bare = ServerDescriptor::parse("registry.example.com").expect("parse");
        let explicit = ServerDescriptor::parse("https://registry.example.com/").expect("parse");

        store
            .add(&bare, &Credentials::new("alice", "s1"))
            .expect("add should succeed");
        assert_eq!(store.get(&explicit).expect("get").username, "alice");
    }

    #[test]
    fn explicit_default_port_is_its_own_entry() {
        let store = InMemoryCredentialStore::new();
        let explicit = ServerDescriptor::parse("https://h.example:443").expect("parse");
        let implicit = ServerDescriptor::parse("https://h.example").expect("parse");

        store
            .add(&explicit, &Credentials::new("alice", "s1"))
            .expect("add should succeed");
        assert!(store
            .get(&implicit)
            .expect_err("port 443 is not the same key as no port")
            .is_not_found());
        assert_eq!(store.get(&explicit).expect("get").username, "alice");
    }

    #[test]
    fn scheme_is_part_of_the_key() {
        let store = InMemoryCredentialStore::new();
        let https = ServerDescriptor::parse("https://registry.example.com").expect("parse");
        let http = ServerDescriptor::parse("http://registry.example.com").expect("parse");

        store
            .add(&https, &Credentials::new("alice", "s1"))
            .expect("add should succeed");
        assert!(store.get(&http).expect_err("http is separate").is_not_found());
    }
}
