use std::error::Error as StdError;

use thiserror::Error;

use crate::credential::{Credentials, ServerDescriptor};

mod memory;

pub use memory::InMemoryCredentialStore;

/// Errors produced by credential store implementations.
///
/// The model is flat: apart from `NotFound`, callers can only show the
/// message, not branch on why the platform refused.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No entry exists for the requested server.
    #[error("credentials not found in native keychain")]
    NotFound,
    /// The server URL could not be decomposed into a descriptor.
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServer { url: String, reason: String },
    /// More than one stored entry matches the server.
    #[error("{count} credential entries match {server}")]
    Ambiguous { server: String, count: usize },
    /// A Keychain status code and the platform's message for it.
    #[error("{message}")]
    Keychain { status: i32, message: String },
    /// A native error object, passed through untouched.
    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync + 'static>),
    /// Any other failure, already reduced to a message.
    #[error("{0}")]
    Platform(String),
    /// This target has no native credential store.
    #[error("no native credential store on {0}")]
    Unsupported(&'static str),
}

impl CredentialError {
    /// Wrap a platform error object.
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Three-operation contract over an OS credential store.
///
/// Every call is a synchronous round trip to the store; implementations keep
/// no state between calls and may block on an unlock or consent prompt.
pub trait CredentialStore: Send + Sync {
    /// Store credentials for a server, replacing whatever was there.
    fn add(&self, server: &ServerDescriptor, credentials: &Credentials)
        -> Result<(), CredentialError>;

    /// Retrieve the username and secret stored for a server.
    fn get(&self, server: &ServerDescriptor) -> Result<Credentials, CredentialError>;

    /// Remove the credentials stored for a server.
    fn delete(&self, server: &ServerDescriptor) -> Result<(), CredentialError>;
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn keychain_error_displays_platform_message() {
        let err = CredentialError::Keychain {
            status: -25293,
            message: "The user name or passphrase you entered is not correct.".into(),
        };
        assert_eq!(
            err.to_string(),
            "The user name or passphrase you entered is not correct."
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn backend_error_is_transparent() {
        let err = CredentialError::backend(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "org.freedesktop.DBus.Error.ServiceUnknown",
        ));
        assert_eq!(err.to_string(), "org.freedesktop.DBus.Error.ServiceUnknown");
    }

    #[test]
    fn only_not_found_is_classified() {
        assert!(CredentialError::NotFound.is_not_found());
        assert!(!CredentialError::Platform("boom".into()).is_not_found());
        assert!(!CredentialError::Ambiguous {
            server: "https://example.com".into(),
            count: 2,
        }
        .is_not_found());
    }
}
