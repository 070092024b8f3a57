//! Drives the wizard state machine against the backend.
//!
//! Visitor events go through [`transition`]; the resulting effects are carried
//! out one at a time and their outcomes are fed back as events. Each external
//! call is awaited before the next event is looked at.

use std::collections::VecDeque;
use std::sync::Arc;

use uuid::Uuid;

use super::model::{AvatarFile, ProfileFields};
use super::state::{Effect, Event, WizardState, transition};
use crate::backend::Backend;
use crate::config::OnboardingConfig;
use crate::error::BackendError;
use crate::notify::Notifier;

type Callback = Box<dyn Fn() + Send + Sync>;

/// Hooks into the surrounding shell.
pub struct WizardCallbacks {
    /// Called once, after the profile has been saved.
    pub on_complete: Callback,
    /// Called when the visitor leaves for the login form.
    pub on_back_to_login: Callback,
}

impl WizardCallbacks {
    pub fn new(
        on_complete: impl Fn() + Send + Sync + 'static,
        on_back_to_login: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_complete: Box::new(on_complete),
            on_back_to_login: Box::new(on_back_to_login),
        }
    }
}

impl Default for WizardCallbacks {
    fn default() -> Self {
        Self::new(|| {}, || {})
    }
}

/// Drives one onboarding attempt.
pub struct OnboardingWizard {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    config: OnboardingConfig,
    callbacks: WizardCallbacks,
    state: WizardState,
}

impl OnboardingWizard {
    /// Start a wizard for whoever is visiting: at account creation when
    /// there is no session, at the first profile step otherwise.
    pub async fn start(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        config: OnboardingConfig,
        callbacks: WizardCallbacks,
    ) -> Self {
        let state = match backend.current_session().await {
            Some(session) => {
                tracing::info!(user_id = %session.user.id, "Resuming onboarding for signed-in user");
                WizardState::for_session(&session.user, config.avatar_max_bytes)
            }
            None => WizardState::new_account(config.avatar_max_bytes),
        };
        Self {
            backend,
            notifier,
            config,
            callbacks,
            state,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    /// Feed one visitor event through the machine, performing every effect
    /// it causes before returning.
    pub async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let placeholder = WizardState::new_account(self.config.avatar_max_bytes);
            let current = std::mem::replace(&mut self.state, placeholder);
            let (next, effects) = transition(current, event);
            self.state = next;

            for effect in effects {
                if let Some(follow_up) = self.run_effect(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn run_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::CreateAccount {
                email,
                password,
                display_name,
            } => match self
                .backend
                .create_account(&email, &password, &display_name)
                .await
            {
                Ok(_) => Some(Event::AccountCreated),
                Err(e) => {
                    tracing::warn!("Account creation failed: {}", e);
                    Some(Event::AccountCreationFailed {
                        message: e.user_message().map(str::to_string),
                    })
                }
            },
            Effect::RenderAvatarPreview(file) => {
                match tokio::task::spawn_blocking(move || file.data_url()).await {
                    Ok(url) => Some(Event::AvatarPreviewReady(url)),
                    Err(e) => {
                        tracing::warn!("Avatar preview failed: {}", e);
                        None
                    }
                }
            }
            Effect::SaveProfile { fields, avatar } => match self.save_profile(fields, avatar).await
            {
                Ok(()) => Some(Event::ProfileSaved),
                Err(e) => {
                    tracing::warn!("Profile save failed: {}", e);
                    Some(Event::ProfileSaveFailed)
                }
            },
            Effect::Notify(notice) => {
                self.notifier.notify(notice);
                None
            }
            Effect::Completed => {
                tracing::info!("Onboarding completed");
                (self.callbacks.on_complete)();
                None
            }
            Effect::ReturnToLogin => {
                (self.callbacks.on_back_to_login)();
                None
            }
        }
    }

    async fn save_profile(
        &self,
        mut fields: ProfileFields,
        avatar: Option<AvatarFile>,
    ) -> Result<(), BackendError> {
        let session = self
            .backend
            .current_session()
            .await
            .ok_or(BackendError::NoSession)?;
        let user_id = session.user.id;

        if let Some(file) = avatar {
            fields.avatar_url = self.upload_avatar(user_id, file).await;
        }

        self.backend.upsert_profile(user_id, &fields).await?;
        tracing::info!(%user_id, "Profile saved");
        Ok(())
    }

    /// Upload the avatar and sign a long-lived URL for it. Any failure just
    /// leaves the profile without a picture.
    async fn upload_avatar(&self, user_id: Uuid, file: AvatarFile) -> Option<String> {
        let path = format!(
            "{user_id}/{}.{}",
            self.config.avatar_object_name,
            file.extension()
        );

        if let Err(e) = self
            .backend
            .upload_object(&path, file.bytes, &file.mime, true)
            .await
        {
            tracing::warn!(%path, "Avatar upload failed, continuing without it: {}", e);
            return None;
        }

        match self
            .backend
            .signed_url(&path, self.config.avatar_url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(%path, "Signing avatar URL failed, continuing without it: {}", e);
                None
            }
        }
    }
}
