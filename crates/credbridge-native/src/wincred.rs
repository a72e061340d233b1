//! Windows Credential Manager adapter.
//!
//! Each server is one generic credential whose target name is the server URL,
//! user name is the username and blob is the secret.

use credbridge_core::{CredentialError, CredentialStore, Credentials, ServerDescriptor};
use keyring::{windows::WinCredential, Entry};
use tracing::{debug, instrument};

const SERVICE: &str = "credbridge";

fn keyring_err(err: keyring::Error) -> CredentialError {
    match err {
        keyring::Error::NoEntry => CredentialError::NotFound,
        other => CredentialError::backend(other),
    }
}

/// Entry addressed by target name only; the user part is filled on write.
fn entry(server: &ServerDescriptor, username: &str) -> Result<Entry, CredentialError> {
    Entry::new_with_target(server.url(), SERVICE, username).map_err(keyring_err)
}

/// Credential store backed by the Windows Credential Manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct WincredStore;

impl WincredStore {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialStore for WincredStore {
    #[instrument(skip_all, fields(server = %server))]
    fn add(
        &self,
        server: &ServerDescriptor,
        credentials: &Credentials,
    ) -> Result<(), CredentialError> {
        entry(server, &credentials.username)?
            .set_password(&credentials.secret)
            .map_err(keyring_err)?;
        debug!("stored credentials");
        Ok(())
    }

    #[instrument(skip_all, fields(server = %server))]
    fn get(&self, server: &ServerDescriptor) -> Result<Credentials, CredentialError> {
        let entry = entry(server, SERVICE)?;
        let secret = entry.get_password().map_err(keyring_err)?;

        // The user name lives on the stored credential, not on the lookup entry.
        let stored = entry
            .get_credential()
            .downcast_ref::<WinCredential>()
            .ok_or_else(|| CredentialError::Platform("unexpected keyring backend".to_string()))?
            .get_credential()
            .map_err(keyring_err)?;

        debug!("found credentials");
        Ok(Credentials {
            username: stored.username,
            secret,
        })
    }

    #[instrument(skip_all, fields(server = %server))]
    fn delete(&self, server: &ServerDescriptor) -> Result<(), CredentialError> {
        entry(server, SERVICE)?
            .delete_credential()
            .map_err(keyring_err)?;
        debug!("deleted credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_maps_to_not_found() {
        assert!(keyring_err(keyring::Error::NoEntry).is_not_found());
    }

    #[test]
    fn other_errors_pass_through() {
        let err = keyring_err(keyring::Error::TooLong("target".into(), 32767));
        assert!(matches!(err, CredentialError::Backend(_)));
    }
}
