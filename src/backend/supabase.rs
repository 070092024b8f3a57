//! Supabase backend: GoTrue auth, PostgREST tables and Storage over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthUser, Backend, Role, Session};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::onboarding::model::{Profile, ProfileFields};

/// Client for one Supabase project. Holds the visitor's session in memory.
pub struct SupabaseBackend {
    config: BackendConfig,
    client: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl SupabaseBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            session: RwLock::new(None),
        }
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{endpoint}", self.config.url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    fn object_url(&self, kind: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{kind}{}/{path}",
            self.config.url,
            self.config.avatar_bucket
        )
    }

    /// Request with `apikey` and a bearer token: the session's access token
    /// when signed in (refreshed first if expired), the anon key otherwise.
    async fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = match self.current_session().await.as_ref() {
            Some(session) => session.access_token.expose_secret().to_string(),
            None => self.config.anon_key.expose_secret().to_string(),
        };
        self.client
            .request(method, url)
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    /// Exchange a refresh token for a new session. Sent with the anon key,
    /// never with the expired access token.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<Session, BackendError> {
        let resp = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(self.config.anon_key.expose_secret())
            .json(&serde_json::json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await?;
        let wire: WireSession = check(resp).await?.json().await?;
        Ok(wire.into_session())
    }

    async fn store_session(&self, session: Session) -> Session {
        *self.session.write().await = Some(session.clone());
        session
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
            "data": { "full_name": display_name },
        });
        let resp = self
            .request(Method::POST, self.auth_url("signup"))
            .await
            .json(&body)
            .send()
            .await?;
        let value: serde_json::Value = check(resp).await?.json().await?;

        // Without auto-confirm the backend answers with the bare user.
        if value.get("access_token").is_none() {
            tracing::info!("Account created, awaiting e-mail confirmation");
            return Ok(None);
        }

        let wire: WireSession = serde_json::from_value(value)
            .map_err(|e| BackendError::InvalidResponse(format!("signup session: {e}")))?;
        let session = wire.into_session();
        tracing::info!(user_id = %session.user.id, "Account created and signed in");
        Ok(Some(self.store_session(session).await))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, BackendError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
        });
        let resp = self
            .request(Method::POST, self.auth_url("token"))
            .await
            .query(&[("grant_type", "password")])
            .json(&body)
            .send()
            .await?;
        let wire: WireSession = check(resp).await?.json().await?;
        let session = wire.into_session();
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(self.store_session(session).await)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        let mut req = self
            .request(Method::POST, self.auth_url("recover"))
            .await
            .json(&serde_json::json!({ "email": email }));
        if let Some(redirect) = &self.config.reset_redirect {
            req = req.query(&[("redirect_to", redirect.as_str())]);
        }
        check(req.send().await?).await?;
        tracing::info!("Password reset requested");
        Ok(())
    }

    /// The held session. An expired one is refreshed once with its refresh
    /// token; when that is missing or refused the session is dropped.
    async fn current_session(&self) -> Option<Session> {
        let held = self.session.read().await.clone()?;
        match held.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => {}
            _ => return Some(held),
        }

        let user_id = held.user.id;
        let Some(refresh_token) = held.refresh_token else {
            tracing::debug!(%user_id, "Held session has expired");
            *self.session.write().await = None;
            return None;
        };

        match self.refresh(&refresh_token).await {
            Ok(session) => {
                tracing::info!(%user_id, "Session refreshed");
                Some(self.store_session(session).await)
            }
            Err(e) => {
                tracing::warn!(%user_id, "Session refresh failed, signing out locally: {}", e);
                *self.session.write().await = None;
                None
            }
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let resp = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(user_id = %session.user.id, "Signed out");
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        let resp = self
            .request(Method::GET, self.rest_url(&self.config.profiles_table))
            .await
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .send()
            .await?;
        let rows: Vec<Profile> = check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn onboarding_completed(&self, user_id: Uuid) -> Result<Option<bool>, BackendError> {
        #[derive(Deserialize)]
        struct CompletionRow {
            #[serde(default)]
            onboarding_completed: Option<bool>,
        }

        let resp = self
            .request(Method::GET, self.rest_url(&self.config.profiles_table))
            .await
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "onboarding_completed".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<CompletionRow> = check(resp).await?.json().await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.onboarding_completed.unwrap_or(false)))
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        fields: &ProfileFields,
    ) -> Result<(), BackendError> {
        let table = &self.config.profiles_table;

        let resp = self
            .request(Method::PATCH, self.rest_url(table))
            .await
            .query(&[("user_id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await?;
        let updated: Vec<serde_json::Value> = check(resp).await?.json().await?;
        if !updated.is_empty() {
            tracing::info!(%user_id, "Profile updated");
            return Ok(());
        }

        let mut row = serde_json::to_value(fields)
            .map_err(|e| BackendError::InvalidResponse(format!("profile payload: {e}")))?;
        if let Some(obj) = row.as_object_mut() {
            obj.insert("user_id".to_string(), serde_json::json!(user_id));
        }
        let resp = self
            .request(Method::POST, self.rest_url(table))
            .await
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(%user_id, "Profile inserted");
        Ok(())
    }

    async fn get_role(&self, user_id: Uuid) -> Result<Option<Role>, BackendError> {
        #[derive(Deserialize)]
        struct RoleRow {
            role: String,
        }

        let resp = self
            .request(Method::GET, self.rest_url(&self.config.roles_table))
            .await
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "role".to_string())])
            .send()
            .await?;
        let rows: Vec<RoleRow> = check(resp).await?.json().await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let admin = rows.iter().any(|r| Role::from_name(&r.role) == Role::Admin);
        Ok(Some(if admin { Role::Admin } else { Role::User }))
    }

    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), BackendError> {
        let storage_err = |reason: String| BackendError::Storage {
            path: path.to_string(),
            reason,
        };

        let resp = self
            .request(Method::POST, self.object_url("", path))
            .await
            .header("Content-Type", content_type)
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(|e| storage_err(e.to_string()))?;
        check(resp).await.map_err(|e| storage_err(e.to_string()))?;
        tracing::debug!(path, "Object uploaded");
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BackendError> {
        #[derive(Deserialize)]
        struct Signed {
            #[serde(rename = "signedURL", alias = "signedUrl")]
            signed_url: String,
        }

        let resp = self
            .request(Method::POST, self.object_url("sign/", path))
            .await
            .json(&serde_json::json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;
        let signed: Signed = check(resp).await?.json().await?;

        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.config.url, signed.signed_url))
        }
    }
}

/// Pass successful responses through; turn the rest into errors. Client
/// errors keep the server's message for the visitor.
async fn check(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::warn!(status = status.as_u16(), %message, "Backend request failed");

    if status.is_client_error() {
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(BackendError::Http(format!("{status}: {message}")))
    }
}

/// Pull a readable message out of an error body. GoTrue, PostgREST and
/// Storage each use a different field for it.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: WireUser,
}

impl WireSession {
    fn into_session(self) -> Session {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => DateTime::<Utc>::from_timestamp(at, 0),
            (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
            (None, None) => None,
        };
        let display_name = self
            .user
            .user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Session {
            user: AuthUser {
                id: self.user.id,
                email: self.user.email,
                display_name,
            },
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at,
        }
    }
}
