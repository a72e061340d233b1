//! Core abstractions for credbridge: the credential data model and the
//! store contract every native backend implements.
//! This crate is intentionally small and has no platform dependencies.

pub mod credential;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod contract;

pub use credential::{Credentials, Protocol, ServerDescriptor};
pub use storage::{CredentialError, CredentialStore, InMemoryCredentialStore};
