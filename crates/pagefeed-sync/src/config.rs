use std::num::NonZeroU64;

use serde::Deserialize;

/// Settings for the post-batch storage re-sync call.
///
/// An absent or blank `endpoint` disables the call; batches then report the
/// sync outcome as `skipped`.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "SyncConfig::default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "SyncConfig::default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
    /// Extra attempts after a transport error. Zero by default: a reply lost
    /// after the endpoint accepted the request would otherwise re-trigger the
    /// sync, so retries are opt-in.
    #[serde(default = "SyncConfig::default_max_retries")]
    pub max_retries: usize,
}

impl SyncConfig {
    fn default_auth_scheme() -> String {
        "Bearer".to_string()
    }

    fn default_timeout_secs() -> NonZeroU64 {
        NonZeroU64::new(30).expect("sync timeout default must be non-zero")
    }

    fn default_max_retries() -> usize {
        0
    }

    /// Returns the configured endpoint when it is present and non-blank.
    pub fn enabled_endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// Value for the `Authorization` header, if a token is configured.
    pub fn authorization(&self) -> Option<String> {
        let token = self.token.as_deref().map(str::trim)?;
        if token.is_empty() {
            return None;
        }
        let scheme = self.auth_scheme.trim();
        if scheme.is_empty() {
            Some(token.to_string())
        } else {
            Some(format!("{scheme} {token}"))
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            auth_scheme: Self::default_auth_scheme(),
            timeout_secs: Self::default_timeout_secs(),
            max_retries: Self::default_max_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_endpoint_counts_as_disabled() {
        let cfg = SyncConfig {
            endpoint: Some("   ".to_string()),
            ..SyncConfig::default()
        };
        assert_eq!(cfg.enabled_endpoint(), None);
    }

    #[test]
    fn authorization_prefixes_scheme() {
        let cfg = SyncConfig {
            token: Some("abc123".to_string()),
            ..SyncConfig::default()
        };
        assert_eq!(cfg.authorization().as_deref(), Some("Bearer abc123"));

        let token_scheme = SyncConfig {
            token: Some("abc123".to_string()),
            auth_scheme: "Token".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(token_scheme.authorization().as_deref(), Some("Token abc123"));
    }

    #[test]
    fn retries_are_opt_in() {
        assert_eq!(SyncConfig::default().max_retries, 0);
    }

    #[test]
    fn missing_token_sends_no_authorization() {
        assert_eq!(SyncConfig::default().authorization(), None);
    }
}
