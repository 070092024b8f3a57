//! Hosted backend contract for authentication, the profile table and object storage.
//!
//! Everything durable lives behind this trait. The wizard, the resolver and
//! the auth surface only ever talk to `dyn Backend`.

pub mod supabase;

pub use supabase::SupabaseBackend;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackendError;
use crate::onboarding::model::{Profile, ProfileFields};

/// Identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    /// Name given at sign-up, if any.
    pub display_name: Option<String>,
}

/// A logged-in visitor. Owned by the backend; read-only here.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Role assigned to a user in the role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Unknown role names are treated as ordinary users.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// Backend-agnostic interface to the hosted service.
///
/// Every call is a single attempt; retries are the caller's business.
#[async_trait]
pub trait Backend: Send + Sync {
    // ── Auth ────────────────────────────────────────────────────────

    /// Register a new account. Returns the session when the backend signs the
    /// new user in immediately, `None` when it waits for e-mail confirmation.
    async fn create_account(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError>;

    async fn sign_in(&self, email: &str, password: &SecretString)
    -> Result<Session, BackendError>;

    /// Send a password-reset link to `email`.
    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError>;

    /// Session currently held, if any. An expired session is refreshed
    /// once when it carries a refresh token, and dropped otherwise.
    async fn current_session(&self) -> Option<Session>;

    /// End the current session. Always clears the local session, even when
    /// the backend call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    // ── Tables ──────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError>;

    /// `onboarding_completed` of the user's profile, `None` when no row
    /// exists. Reads that column only; a null value counts as `false`.
    async fn onboarding_completed(&self, user_id: Uuid) -> Result<Option<bool>, BackendError>;

    /// Update the user's profile row, inserting it when none matches.
    async fn upsert_profile(
        &self,
        user_id: Uuid,
        fields: &ProfileFields,
    ) -> Result<(), BackendError>;

    /// Highest role of the user; `None` when no role row exists.
    async fn get_role(&self, user_id: Uuid) -> Result<Option<Role>, BackendError>;

    // ── Storage ─────────────────────────────────────────────────────

    /// Store `bytes` at `path` in the avatar bucket.
    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), BackendError>;

    /// Signed, time-limited URL for an object in the avatar bucket.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BackendError>;
}
