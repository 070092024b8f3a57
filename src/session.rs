//! Session and role resolver. Decides where a visitor belongs.
//!
//! Anonymous visitors go to the login surface, administrators to the admin
//! surface, signed-in users with an unfinished profile to the onboarding
//! wizard and everyone else to the main application. While any lookup the
//! decision depends on is still in flight the answer is `Loading`; nothing is
//! redirected early.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::{AuthUser, Backend, Role};
use crate::error::BackendError;

/// A value that may still be loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Pending,
    Ready(T),
}

/// What is known about the visitor so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub user: Lookup<Option<AuthUser>>,
    pub role: Lookup<Option<Role>>,
    /// `onboarding_completed` of the profile; a missing profile counts as
    /// not completed.
    pub profile_completed: Lookup<bool>,
}

impl SessionView {
    /// Nothing fetched yet.
    pub fn loading() -> Self {
        Self {
            user: Lookup::Pending,
            role: Lookup::Pending,
            profile_completed: Lookup::Pending,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: Lookup::Ready(None),
            role: Lookup::Ready(None),
            profile_completed: Lookup::Ready(false),
        }
    }

    pub fn signed_in(user: AuthUser, role: Option<Role>, profile_completed: bool) -> Self {
        Self {
            user: Lookup::Ready(Some(user)),
            role: Lookup::Ready(role),
            profile_completed: Lookup::Ready(profile_completed),
        }
    }
}

/// Where the visitor should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// Lookups outstanding: show a neutral spinner.
    Loading,
    Login,
    Admin,
    Onboarding,
    Home {
        /// Set right after a visitor finished onboarding.
        new_signup: bool,
    },
}

impl Destination {
    /// Path of the surface, or `None` while loading.
    pub fn path(&self) -> Option<&'static str> {
        match self {
            Self::Loading => None,
            Self::Login | Self::Onboarding => Some("/auth"),
            Self::Admin => Some("/admin"),
            Self::Home { new_signup: false } => Some("/"),
            Self::Home { new_signup: true } => Some("/?new_signup=true"),
        }
    }
}

/// Surfaces a visitor can enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    Admin,
    Auth,
}

/// Decide the destination for a visitor.
///
/// Precedence: anonymous → login; admin → admin surface, even when the admin's
/// own profile is unfinished; unfinished profile → onboarding; else home.
pub fn resolve(view: &SessionView) -> Destination {
    let user = match &view.user {
        Lookup::Pending => return Destination::Loading,
        Lookup::Ready(user) => user,
    };
    if user.is_none() {
        return Destination::Login;
    }

    match view.role {
        Lookup::Pending => return Destination::Loading,
        Lookup::Ready(Some(Role::Admin)) => return Destination::Admin,
        Lookup::Ready(_) => {}
    }

    match view.profile_completed {
        Lookup::Pending => Destination::Loading,
        Lookup::Ready(false) => Destination::Onboarding,
        Lookup::Ready(true) => Destination::Home { new_signup: false },
    }
}

/// Guard for entering `route`. Entries resolve through [`resolve`], except
/// that the admin surface sends signed-in non-admins to the home path.
pub fn resolve_route(route: Route, view: &SessionView) -> Destination {
    let destination = resolve(view);
    match (route, destination) {
        (Route::Admin, Destination::Onboarding) => Destination::Home { new_signup: false },
        _ => destination,
    }
}

/// Fetches what [`resolve`] needs from the backend.
pub struct SessionResolver {
    backend: Arc<dyn Backend>,
}

impl SessionResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Look up session, role and profile status. Reads only.
    pub async fn snapshot(&self) -> Result<SessionView, BackendError> {
        let Some(session) = self.backend.current_session().await else {
            return Ok(SessionView::anonymous());
        };
        let user_id = session.user.id;

        let role = self.backend.get_role(user_id).await?;
        let completed = self
            .backend
            .onboarding_completed(user_id)
            .await?
            .unwrap_or(false);

        tracing::debug!(%user_id, ?role, completed, "Session resolved");
        Ok(SessionView::signed_in(session.user, role, completed))
    }

    pub async fn destination(&self, route: Route) -> Result<Destination, BackendError> {
        let view = self.snapshot().await?;
        Ok(resolve_route(route, &view))
    }
}
