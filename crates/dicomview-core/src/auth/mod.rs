//! Authentication state and credential storage.
//!
//! This module provides:
//! - `Session`: the owned token/identity record behind an `AuthSession`
//! - `SessionStore`: persistence backends (`FileSessionStore`, `MemorySessionStore`)
//! - `CredentialStore`: optional OS keychain storage for a remembered password

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionState, SessionStore};
