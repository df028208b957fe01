use anyhow::{Context, Result};
use keyring::Entry;

/// Keychain service under which remembered passwords are filed
const SERVICE_NAME: &str = "dicomview";

/// A remembered login password in the OS keychain, one entry per username.
///
/// Only the password lives here; tokens stay in the session file.
pub struct CredentialStore {
    username: String,
    entry: Entry,
}

impl CredentialStore {
    pub fn for_user(username: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, username)
            .with_context(|| format!("Failed to open keychain entry for {}", username))?;
        Ok(Self {
            username: username.to_string(),
            entry,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn remember(&self, password: &str) -> Result<()> {
        self.entry
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// The stored password, or `None` when nothing was remembered.
    pub fn recall(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read password from keychain"),
        }
    }

    /// Returns whether an entry existed.
    pub fn forget(&self) -> Result<bool> {
        match self.entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }
}
