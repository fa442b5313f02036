//! Session credential supplied by the wallet-login collaborator.
//!
//! The core never signs anything itself. It only attaches an opaque session
//! token to the handshake and to privileged subscriptions when one exists.

use serde_json::{json, Value};

/// Environment variable holding the session token.
pub const SESSION_ENV: &str = "LIMITLESS_SESSION";

/// Opaque session token for authenticated feeds.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    token: String,
}

impl SessionCredential {
    /// Creates a credential. Blank tokens are rejected.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        (!token.is_empty()).then_some(Self { token })
    }

    /// Loads the credential from `LIMITLESS_SESSION`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var(SESSION_ENV).ok().and_then(Self::new)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Cookie` header sent with the WebSocket upgrade.
    pub fn cookie_header(&self) -> String {
        format!("limitless_session={}", self.token)
    }

    /// Auth object attached to the namespace connect packet.
    pub fn namespace_auth(&self) -> Value {
        json!({ "token": self.token })
    }

    /// Payload of the `authenticate` event sent after connecting.
    pub fn bearer(&self) -> Value {
        Value::String(format!("Bearer {}", self.token))
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts() {
        let creds = SessionCredential::new("secret_session_value").unwrap();
        let debug_str = format!("{:?}", creds);
        assert!(!debug_str.contains("secret_session_value"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_blank_token_is_absent() {
        assert!(SessionCredential::new("   ").is_none());
        assert!(SessionCredential::new("").is_none());
    }

    #[test]
    fn test_handshake_values() {
        let creds = SessionCredential::new(" abc ").unwrap();
        assert_eq!(creds.token(), "abc");
        assert_eq!(creds.cookie_header(), "limitless_session=abc");
        assert_eq!(creds.bearer(), Value::String("Bearer abc".to_string()));
        assert_eq!(creds.namespace_auth()["token"], "abc");
    }
}
