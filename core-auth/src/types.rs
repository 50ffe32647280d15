use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OAuth 2.0 token set.
///
/// # Security
///
/// The `Debug` implementation redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
///
/// let tokens = OAuthTokens::new("ya29.a0...".to_string(), Some("1//0g...".to_string()), 3600);
/// assert!(!tokens.is_expired());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Present when offline access was granted
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Build a token set expiring `expires_in` seconds from now.
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// Expired, or expiring within the next minute.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(60)
    }

    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(buffer_seconds)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// How a Drive session may be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Always run the browser authorization flow.
    Interactive,
    /// Reuse the cached credential, refreshing it when expired; prompt only
    /// when nothing usable is cached.
    SilentCached,
    /// Reuse the cached credential or fail with `NoCachedCredential`.
    SilentOnly,
}

impl SessionMode {
    pub fn allows_prompt(&self) -> bool {
        !matches!(self, SessionMode::SilentOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_debug_is_redacted() {
        let tokens = OAuthTokens::new("secret-access".into(), Some("secret-refresh".into()), 3600);
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_expiry_uses_buffer() {
        let tokens = OAuthTokens::new("a".into(), None, 30);
        assert!(tokens.is_expired());
        assert!(!tokens.is_expired_with_buffer(0));

        let fresh = OAuthTokens::new("a".into(), None, 3600);
        assert!(!fresh.is_expired());
    }

    #[test]
    fn test_can_refresh() {
        assert!(OAuthTokens::new("a".into(), Some("r".into()), 1).can_refresh());
        assert!(!OAuthTokens::new("a".into(), Some(" ".into()), 1).can_refresh());
        assert!(!OAuthTokens::new("a".into(), None, 1).can_refresh());
    }

    #[test]
    fn test_session_mode_prompting() {
        assert!(SessionMode::Interactive.allows_prompt());
        assert!(SessionMode::SilentCached.allows_prompt());
        assert!(!SessionMode::SilentOnly.allows_prompt());
    }
}
