//! Host keys for the sync server.
//!
//! A host key is issued by the `hostKey` endpoint after a successful
//! login and presented with every later request. Keys are signed with
//! HMAC-SHA256 and carry their issue time for expiration checking.
//!
//! ## Key Format
//!
//! `<user>.<issued>.<signature>` where `issued` is the issue time in Unix
//! milliseconds as 16 hex digits and `signature` is the 64 hex digit
//! HMAC-SHA256 over `<user>.<issued>`.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Host key lifetime.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Creates a configuration with a random secret. Keys issued with it
    /// do not survive a restart.
    pub fn ephemeral() -> Self {
        Self::new(rand::random::<[u8; 32]>().to_vec())
    }

    /// Sets the host key lifetime.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and validates host keys.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a host key for `username`.
    pub fn create_token(&self, username: &str) -> String {
        self.create_token_at(username, now_millis())
    }

    fn create_token_at(&self, username: &str, issued: u64) -> String {
        let payload = format!("{username}.{issued:016x}");
        let signature = to_hex(&self.sign(payload.as_bytes()));
        format!("{payload}.{signature}")
    }

    /// Validates a host key and returns the user it was issued to.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed host key".into()))?;
        let (username, issued) = payload
            .rsplit_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed host key".into()))?;

        let signature = from_hex(signature)
            .ok_or_else(|| ServerError::NotAuthorized("malformed signature".into()))?;
        self.mac()
            .chain_update(payload.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let issued = u64::from_str_radix(issued, 16)
            .map_err(|_| ServerError::NotAuthorized("malformed issue time".into()))?;
        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now_millis() > issued.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("host key expired".into()));
        }

        Ok(username.to_string())
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        self.mac().chain_update(data).finalize().into_bytes().into()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.config.secret).expect("HMAC can take key of any size")
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
