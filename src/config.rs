//! Configuration types.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::notify::Language;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project base URL, without trailing slash.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: SecretString,
    /// Table holding one profile row per user.
    pub profiles_table: String,
    /// Table mapping users to roles.
    pub roles_table: String,
    /// Storage bucket for profile pictures.
    pub avatar_bucket: String,
    /// Where password-reset links should land, if set.
    pub reset_redirect: Option<String>,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: SecretString::from(anon_key.into()),
            profiles_table: "profiles".to_string(),
            roles_table: "user_roles".to_string(),
            avatar_bucket: "profile-pictures".to_string(),
            reset_redirect: None,
        }
    }
}

/// Limits applied by the onboarding wizard.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Largest accepted avatar file.
    pub avatar_max_bytes: u64,
    /// Lifetime of the signed avatar URL stored on the profile.
    pub avatar_url_ttl: Duration,
    /// Object name (without extension) under the per-user folder.
    pub avatar_object_name: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            avatar_max_bytes: 2 * 1024 * 1024,
            avatar_url_ttl: Duration::from_secs(60 * 60 * 24 * 365), // 1 year
            avatar_object_name: "avatar".to_string(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub onboarding: OnboardingConfig,
    pub language: Language,
    pub http_addr: SocketAddr,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let url = required("KRISHI_SUPABASE_URL")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "KRISHI_SUPABASE_URL".to_string(),
                message: format!("expected an http(s) URL, got {url}"),
            });
        }

        let mut backend = BackendConfig::new(url, required("KRISHI_SUPABASE_ANON_KEY")?);
        if let Some(table) = lookup("KRISHI_PROFILES_TABLE") {
            backend.profiles_table = table;
        }
        if let Some(table) = lookup("KRISHI_ROLES_TABLE") {
            backend.roles_table = table;
        }
        if let Some(bucket) = lookup("KRISHI_AVATAR_BUCKET") {
            backend.avatar_bucket = bucket;
        }
        backend.reset_redirect = lookup("KRISHI_RESET_REDIRECT").filter(|s| !s.is_empty());

        let language = match lookup("KRISHI_LANGUAGE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KRISHI_LANGUAGE".to_string(),
                message: format!("unknown language {raw:?}, expected bn or en"),
            })?,
            None => Language::default(),
        };

        let http_addr = lookup("KRISHI_HTTP_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let http_addr = http_addr
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "KRISHI_HTTP_ADDR".to_string(),
                message: format!("{e}"),
            })?;

        Ok(Self {
            backend,
            onboarding: OnboardingConfig::default(),
            language,
            http_addr,
        })
    }
}
