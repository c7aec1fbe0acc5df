//! Server configuration.

use decksync_engine::DEFAULT_CHUNK_SIZE;
use decksync_protocol::PROTOCOL_VERSION;
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Rows per chunk page sent to clients.
    pub chunk_size: usize,
    /// Oldest protocol version accepted.
    pub min_protocol_version: u32,
    /// Largest accepted full upload, in bytes.
    pub max_upload_bytes: usize,
    /// Whether requests must carry a valid host key.
    pub require_auth: bool,
    /// Secret used to sign host keys. A random one is used when absent.
    pub auth_secret: Option<Vec<u8>>,
    /// Lifetime of issued host keys.
    pub token_expiry: Duration,
    /// Accounts allowed to log in, user name to password.
    pub accounts: BTreeMap<String, String>,
    /// Message shown to clients in the meta step.
    pub message: String,
    /// Refuse every sync with `message`.
    pub maintenance: bool,
}

impl ServerConfig {
    /// Creates a configuration that accepts anonymous clients.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_protocol_version: PROTOCOL_VERSION,
            max_upload_bytes: 250 * 1024 * 1024,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(30 * 24 * 60 * 60),
            accounts: BTreeMap::new(),
            message: String::new(),
            maintenance: false,
        }
    }

    /// Sets the rows per chunk page.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the oldest accepted protocol version.
    pub fn with_min_protocol_version(mut self, version: u32) -> Self {
        self.min_protocol_version = version;
        self
    }

    /// Sets the full upload limit.
    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Enables authentication with the given signing secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the host key lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Adds an account.
    pub fn with_account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.accounts.insert(username.into(), password.into());
        self
    }

    /// Sets the message shown to clients.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Puts the server in maintenance mode.
    pub fn with_maintenance(mut self, maintenance: bool) -> Self {
        self.maintenance = maintenance;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.min_protocol_version, PROTOCOL_VERSION);
        assert!(!config.require_auth);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_chunk_size(0)
            .with_auth(vec![1, 2, 3, 4])
            .with_account("alice", "pw")
            .with_maintenance(true);

        assert_eq!(config.chunk_size, 1);
        assert!(config.require_auth);
        assert_eq!(config.auth_secret, Some(vec![1, 2, 3, 4]));
        assert_eq!(config.accounts.get("alice").map(String::as_str), Some("pw"));
        assert!(config.maintenance);
    }
}
