//! Native credential store adapters.
//!
//! Exactly one adapter is compiled per target: the Keychain on macOS, the
//! Secret Service on other Unix systems and the Credential Manager on Windows.

use credbridge_core::{CredentialError, CredentialStore, InMemoryCredentialStore};
use tracing::debug;

pub mod config;

#[cfg(target_os = "macos")]
pub mod keychain;
#[cfg(all(unix, not(target_os = "macos")))]
pub mod secretservice;
#[cfg(windows)]
pub mod wincred;

pub use config::{Backend, StoreConfig};

/// Build the store selected by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn CredentialStore>, CredentialError> {
    match config.backend {
        Backend::Memory => {
            debug!("using in-memory credential store");
            Ok(Box::new(InMemoryCredentialStore::new()))
        }
        Backend::Native => platform_store(config),
    }
}

/// The host's credential store with default settings.
pub fn native_store() -> Result<Box<dyn CredentialStore>, CredentialError> {
    open_store(&StoreConfig::default())
}

#[cfg(target_os = "macos")]
fn platform_store(_config: &StoreConfig) -> Result<Box<dyn CredentialStore>, CredentialError> {
    debug!("using macOS keychain");
    Ok(Box::new(keychain::KeychainStore::new()))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_store(config: &StoreConfig) -> Result<Box<dyn CredentialStore>, CredentialError> {
    let collection = &config.secret_service.collection;
    debug!(%collection, "using secret service");
    Ok(Box::new(secretservice::SecretServiceStore::new(
        collection.clone(),
    )))
}

#[cfg(windows)]
fn platform_store(_config: &StoreConfig) -> Result<Box<dyn CredentialStore>, CredentialError> {
    debug!("using windows credential manager");
    Ok(Box::new(wincred::WincredStore::new()))
}

#[cfg(not(any(unix, windows)))]
fn platform_store(_config: &StoreConfig) -> Result<Box<dyn CredentialStore>, CredentialError> {
    Err(CredentialError::Unsupported(std::env::consts::OS))
}
