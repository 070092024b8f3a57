//! Auth surface: login, password reset and the hand-off into onboarding.

use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::BackendError;
use crate::notify::{Message, Notice, Notifier};
use crate::session::Destination;

/// Which form the auth surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthMode {
    Login,
    ForgotPassword { reset_sent: bool },
    /// The onboarding wizard.
    SignUp,
}

/// State of the auth surface for one visitor.
pub struct AuthFlow {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    mode: AuthMode,
    signed_in: bool,
    onboarding_completed: bool,
    just_signed_up: bool,
}

impl AuthFlow {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            mode: AuthMode::Login,
            signed_in: false,
            onboarding_completed: false,
            just_signed_up: false,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Check the held session's onboarding status. A signed-in visitor whose
    /// profile is missing or unfinished is switched to the wizard.
    pub async fn enter(&mut self) -> Result<(), BackendError> {
        let Some(session) = self.backend.current_session().await else {
            self.signed_in = false;
            self.onboarding_completed = false;
            return Ok(());
        };
        self.signed_in = true;

        self.onboarding_completed = self
            .backend
            .onboarding_completed(session.user.id)
            .await?
            .unwrap_or(false);
        if !self.onboarding_completed {
            tracing::info!(user_id = %session.user.id, "Profile unfinished, continuing onboarding");
            self.mode = AuthMode::SignUp;
        }
        Ok(())
    }

    /// Where the auth surface sends the visitor next.
    pub fn destination(&self) -> Destination {
        if self.signed_in && self.onboarding_completed {
            Destination::Home {
                new_signup: self.just_signed_up,
            }
        } else if self.mode == AuthMode::SignUp {
            Destination::Onboarding
        } else {
            Destination::Login
        }
    }

    pub fn show_login(&mut self) {
        if !self.signed_in {
            self.mode = AuthMode::Login;
        }
    }

    pub fn show_forgot_password(&mut self) {
        if !self.signed_in {
            self.mode = AuthMode::ForgotPassword { reset_sent: false };
        }
    }

    pub fn start_sign_up(&mut self) {
        self.mode = AuthMode::SignUp;
    }

    /// Sign in with e-mail and password. Returns whether it succeeded.
    pub async fn log_in(&mut self, email: &str, password: &SecretString) -> bool {
        match self.backend.sign_in(email.trim(), password).await {
            Ok(_) => {
                if let Err(e) = self.enter().await {
                    tracing::warn!("Onboarding check after login failed: {}", e);
                }
                true
            }
            Err(e) => {
                tracing::warn!("Login failed: {}", e);
                self.notifier
                    .notify(Notice::remote_error(&e, Message::LoginFailed));
                false
            }
        }
    }

    /// Ask for a password-reset mail. An empty address is refused locally.
    pub async fn request_reset(&mut self, email: &str) {
        let email = email.trim();
        if email.is_empty() {
            self.notifier.notify(Notice::error(Message::ProvideEmail));
            return;
        }
        match self.backend.request_password_reset(email).await {
            Ok(()) => {
                self.mode = AuthMode::ForgotPassword { reset_sent: true };
                self.notifier.notify(Notice::success(Message::ResetSent));
            }
            Err(e) => {
                tracing::warn!("Password reset request failed: {}", e);
                self.notifier
                    .notify(Notice::remote_error(&e, Message::ResetFailed));
            }
        }
    }

    /// Completion hook for the wizard.
    pub fn onboarding_finished(&mut self) {
        self.signed_in = true;
        self.onboarding_completed = true;
        self.just_signed_up = true;
    }

    pub async fn sign_out(&mut self) -> Result<(), BackendError> {
        self.signed_in = false;
        self.onboarding_completed = false;
        self.just_signed_up = false;
        self.mode = AuthMode::Login;
        self.backend.sign_out().await
    }
}
