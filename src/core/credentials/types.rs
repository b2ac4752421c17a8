//! Credential and provider-kind types

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Provider kind a deployment or credential belongs to.
///
/// OAuth kinds borrow tokens from the corresponding CLI's credential cache;
/// `OpenAi` stands in for any backend that takes a static API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Static-key OpenAI-compatible backend
    #[serde(rename = "openai")]
    OpenAi,
    /// Qwen backend authenticated via the qwen-code CLI's OAuth cache
    QwenOauth,
    /// Gemini backend authenticated via the Gemini CLI's OAuth cache
    GeminiOauth,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::QwenOauth => "qwen-oauth",
            ProviderKind::GeminiOauth => "gemini-oauth",
        };
        f.write_str(name)
    }
}

/// An access credential for one provider kind.
///
/// Credentials are snapshots: the dispatch engine holds one only for the
/// duration of a single provider call and re-acquires on retry. The store
/// is the sole owner of the long-lived copy.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Provider this credential authenticates against
    pub kind: ProviderKind,
    /// Bearer token material
    pub access_token: String,
    /// When the access token stops being accepted (None = non-expiring key)
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh material, when the provider supports refresh
    pub refresh_token: Option<String>,
    /// Provider-supplied API base override (Qwen's `resource_url`)
    pub resource_url: Option<String>,
    /// Cache file this credential was loaded from, if any
    pub source_path: Option<PathBuf>,
}

impl Credential {
    /// Create a non-expiring static-key credential.
    pub fn static_key(kind: ProviderKind, access_token: impl Into<String>) -> Self {
        Self {
            kind,
            access_token: access_token.into(),
            expires_at: None,
            refresh_token: None,
            resource_url: None,
            source_path: None,
        }
    }

    /// Whether the credential is still valid `margin` from now.
    ///
    /// A credential inside the safety margin is treated as expired so a
    /// call started now cannot outlive its token.
    pub fn valid_for(&self, margin: std::time::Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => {
                let margin = ChronoDuration::from_std(margin)
                    .unwrap_or_else(|_| ChronoDuration::seconds(30));
                Utc::now() + margin < expires_at
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn static_key_never_expires() {
        let cred = Credential::static_key(ProviderKind::OpenAi, "sk-abc");
        assert!(cred.valid_for(Duration::from_secs(3600)));
    }

    #[test]
    fn margin_counts_as_expired() {
        let mut cred = Credential::static_key(ProviderKind::QwenOauth, "tok");
        cred.expires_at = Some(Utc::now() + ChronoDuration::seconds(10));

        assert!(cred.valid_for(Duration::from_secs(0)));
        assert!(!cred.valid_for(Duration::from_secs(30)));
    }

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::QwenOauth.to_string(), "qwen-oauth");
        assert_eq!(ProviderKind::GeminiOauth.to_string(), "gemini-oauth");
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
    }
}
