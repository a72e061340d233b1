//! Secret Service (D-Bus) adapter.
//!
//! Items are written under the `io.docker.Credentials` schema and tagged
//! `docker_cli=1`, so other clients on the same bus never collide with them.
//! Every call opens its own session on the bus and drops it on return.

use std::collections::HashMap;

use credbridge_core::{CredentialError, CredentialStore, Credentials, ServerDescriptor};
use secret_service::{
    blocking::{Item, SecretService},
    EncryptionType,
};
use tracing::{debug, instrument};

/// Schema name shared with other docker credential helpers.
pub const SCHEMA_NAME: &str = "io.docker.Credentials";

// libsecret records the schema of an item in this attribute.
const SCHEMA_ATTRIBUTE: &str = "xdg:schema";
const SERVER_ATTRIBUTE: &str = "server";
const USERNAME_ATTRIBUTE: &str = "username";
const TAG_ATTRIBUTE: &str = "docker_cli";
const TAG_VALUE: &str = "1";
const CONTENT_TYPE: &str = "text/plain";

/// Credential store backed by the freedesktop Secret Service.
#[derive(Debug, Clone)]
pub struct SecretServiceStore {
    collection: String,
}

impl SecretServiceStore {
    /// `collection` is the alias new items are created in, usually `default`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }
}

impl Default for SecretServiceStore {
    fn default() -> Self {
        Self::new("default")
    }
}

fn connect() -> Result<SecretService<'static>, CredentialError> {
    SecretService::connect(EncryptionType::Dh).map_err(CredentialError::backend)
}

/// Attributes used to look up this tool's items for a server.
fn lookup_attributes(server: &str) -> HashMap<&str, &str> {
    HashMap::from([(SERVER_ATTRIBUTE, server), (TAG_ATTRIBUTE, TAG_VALUE)])
}

/// Lookup attributes narrowed to items written under our schema.
fn scoped_attributes(server: &str) -> HashMap<&str, &str> {
    let mut attributes = lookup_attributes(server);
    attributes.insert(SCHEMA_ATTRIBUTE, SCHEMA_NAME);
    attributes
}

fn item_attributes<'a>(server: &'a str, username: &'a str) -> HashMap<&'a str, &'a str> {
    let mut attributes = scoped_attributes(server);
    attributes.insert(USERNAME_ATTRIBUTE, username);
    attributes
}

fn has_schema(attributes: &HashMap<String, String>) -> bool {
    attributes.get(SCHEMA_ATTRIBUTE).map(String::as_str) == Some(SCHEMA_NAME)
}

/// Pick the only candidate, refusing to guess between several.
fn single_match<T>(server: &ServerDescriptor, mut candidates: Vec<T>) -> Result<T, CredentialError> {
    match candidates.len() {
        0 => Err(CredentialError::NotFound),
        1 => candidates.pop().ok_or(CredentialError::NotFound),
        count => Err(CredentialError::Ambiguous {
            server: server.to_string(),
            count,
        }),
    }
}

/// An item left over from an earlier `add` under another username.
fn is_stale(attributes: &HashMap<String, String>, username: &str) -> bool {
    attributes.get(USERNAME_ATTRIBUTE).map(String::as_str) != Some(username)
}

/// Search the whole service and unlock whatever matched locked.
fn search<'a>(
    service: &'a SecretService<'_>,
    attributes: HashMap<&str, &str>,
) -> Result<Vec<Item<'a>>, CredentialError> {
    let found = service
        .search_items(attributes)
        .map_err(CredentialError::backend)?;

    if !found.locked.is_empty() {
        let locked: Vec<&Item<'_>> = found.locked.iter().collect();
        service
            .unlock_all(&locked)
            .map_err(CredentialError::backend)?;
    }

    Ok(found.unlocked.into_iter().chain(found.locked).collect())
}

/// Delete every item carrying our schema for `server`, returning how many went.
fn clear(service: &SecretService<'_>, server: &ServerDescriptor) -> Result<usize, CredentialError> {
    let items = search(service, scoped_attributes(server.url()))?;
    let count = items.len();
    for item in items {
        item.delete().map_err(CredentialError::backend)?;
    }
    Ok(count)
}

impl CredentialStore for SecretServiceStore {
    #[instrument(skip_all, fields(server = %server, collection = %self.collection))]
    fn add(
        &self,
        server: &ServerDescriptor,
        credentials: &Credentials,
    ) -> Result<(), CredentialError> {
        let service = connect()?;
        let collection = service
            .get_collection_by_alias(&self.collection)
            .map_err(CredentialError::backend)?;
        if collection.is_locked().map_err(CredentialError::backend)? {
            collection.unlock().map_err(CredentialError::backend)?;
        }

        // Write before removing anything so a failed create keeps the old entry.
        // `replace` overwrites an item with identical attributes in place.
        collection
            .create_item(
                server.url(),
                item_attributes(server.url(), &credentials.username),
                credentials.secret.as_bytes(),
                true,
                CONTENT_TYPE,
            )
            .map_err(CredentialError::backend)?;

        let mut replaced = 0usize;
        for item in search(&service, scoped_attributes(server.url()))? {
            let attributes = item.get_attributes().map_err(CredentialError::backend)?;
            if is_stale(&attributes, &credentials.username) {
                item.delete().map_err(CredentialError::backend)?;
                replaced += 1;
            }
        }

        debug!(replaced, "stored credentials");
        Ok(())
    }

    #[instrument(skip_all, fields(server = %server))]
    fn get(&self, server: &ServerDescriptor) -> Result<Credentials, CredentialError> {
        let service = connect()?;

        let mut candidates = Vec::new();
        for item in search(&service, lookup_attributes(server.url()))? {
            let attributes = item.get_attributes().map_err(CredentialError::backend)?;
            if has_schema(&attributes) {
                candidates.push((item, attributes));
            } else {
                debug!("skipping item from a foreign schema");
            }
        }

        let (item, attributes) = single_match(server, candidates)?;
        let secret = item.get_secret().map_err(CredentialError::backend)?;
        let secret = String::from_utf8(secret).map_err(|_| {
            CredentialError::Platform("stored secret is not valid UTF-8".to_string())
        })?;
        let username = attributes
            .get(USERNAME_ATTRIBUTE)
            .cloned()
            .unwrap_or_default();

        debug!("found credentials");
        Ok(Credentials { username, secret })
    }

    #[instrument(skip_all, fields(server = %server))]
    fn delete(&self, server: &ServerDescriptor) -> Result<(), CredentialError> {
        let service = connect()?;
        match clear(&service, server)? {
            0 => Err(CredentialError::NotFound),
            removed => {
                debug!(removed, "deleted credentials");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerDescriptor {
        ServerDescriptor::parse("https://registry.example.com:5000/v2").expect("parse")
    }

    #[test]
    fn lookup_is_scoped_by_server_and_tag() {
        let attributes = lookup_attributes("https://registry.example.com");
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["server"], "https://registry.example.com");
        assert_eq!(attributes["docker_cli"], "1");
    }

    #[test]
    fn stored_items_carry_schema_and_username() {
        let attributes = item_attributes("https://registry.example.com", "alice");
        assert_eq!(attributes["xdg:schema"], SCHEMA_NAME);
        assert_eq!(attributes["username"], "alice");
        assert_eq!(attributes["docker_cli"], "1");
        assert_eq!(attributes["server"], "https://registry.example.com");
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let ours = HashMap::from([(SCHEMA_ATTRIBUTE.to_string(), SCHEMA_NAME.to_string())]);
        let theirs = HashMap::from([(
            SCHEMA_ATTRIBUTE.to_string(),
            "org.gnome.keyring.NetworkPassword".to_string(),
        )]);
        assert!(has_schema(&ours));
        assert!(!has_schema(&theirs));
        assert!(!has_schema(&HashMap::new()));
    }

    #[test]
    fn only_other_usernames_are_stale() {
        let stored = |username: &str| {
            HashMap::from([
                (SCHEMA_ATTRIBUTE.to_string(), SCHEMA_NAME.to_string()),
                (USERNAME_ATTRIBUTE.to_string(), username.to_string()),
            ])
        };
        assert!(!is_stale(&stored("bob"), "bob"));
        assert!(is_stale(&stored("alice"), "bob"));
        assert!(is_stale(&HashMap::new(), "bob"));
    }

    #[test]
    fn no_candidates_is_not_found() {
        let err = single_match::<u8>(&server(), Vec::new()).expect_err("empty");
        assert!(err.is_not_found());
    }

    #[test]
    fn one_candidate_wins() {
        assert_eq!(single_match(&server(), vec![7]).expect("single"), 7);
    }

    #[test]
    fn several_candidates_are_ambiguous() {
        let err = single_match(&server(), vec![1, 2, 3]).expect_err("ambiguous");
        match err {
            CredentialError::Ambiguous { server, count } => {
                assert_eq!(server, "https://registry.example.com:5000/v2");
                assert_eq!(count, 3);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }
}
