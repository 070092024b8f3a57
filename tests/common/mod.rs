//! Shared test fixtures: an in-memory backend that records every call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use krishi_onboard::backend::{AuthUser, Backend, Role, Session};
use krishi_onboard::error::BackendError;
use krishi_onboard::onboarding::{
    AvatarFile, Challenge, Event, FarmerType, FarmingMethod, IrrigationSource, LandOwnership,
    LandSize, Profile, ProfileFields,
};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which calls should fail.
#[derive(Default)]
pub struct Failures {
    pub create_account: Option<BackendError>,
    pub sign_in: Option<BackendError>,
    pub reset: Option<BackendError>,
    pub upsert: Option<BackendError>,
    pub upload: Option<BackendError>,
    pub signed_url: Option<BackendError>,
}

/// A recorded upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: String,
    pub size: usize,
    pub content_type: String,
    pub overwrite: bool,
}

/// In-memory backend. Sign-up signs the new user in immediately unless
/// `confirm_email` is set.
#[derive(Default)]
pub struct StubBackend {
    pub failures: Mutex<Failures>,
    pub confirm_email: bool,
    pub session: Mutex<Option<Session>>,
    pub profiles: Mutex<HashMap<Uuid, Profile>>,
    pub roles: Mutex<HashMap<Uuid, Role>>,
    pub saved: Mutex<Vec<ProfileFields>>,
    pub uploads: Mutex<Vec<Upload>>,
    pub reset_requests: Mutex<Vec<String>>,
    pub create_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend holding a live session for a fresh user.
    pub fn signed_in(name: &str, email: &str) -> Self {
        let backend = Self::new();
        *backend.session.lock().unwrap() = Some(session_for(Uuid::new_v4(), name, email));
        backend
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.session.lock().unwrap().as_ref().map(|s| s.user.id)
    }

    pub fn set_role(&self, user_id: Uuid, role: Role) {
        self.roles.lock().unwrap().insert(user_id, role);
    }

    pub fn set_profile_completed(&self, user_id: Uuid, completed: bool) {
        self.profiles
            .lock()
            .unwrap()
            .insert(user_id, blank_profile(user_id, completed));
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<ProfileFields> {
        self.saved.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn create_account(
        &self,
        email: &str,
        _password: &SecretString,
        display_name: &str,
    ) -> Result<Option<Session>, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().unwrap().create_account.take() {
            return Err(e);
        }
        if self.confirm_email {
            return Ok(None);
        }
        let session = session_for(Uuid::new_v4(), display_name, email);
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(Some(session))
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().unwrap().sign_in.take() {
            return Err(e);
        }
        if password.expose_secret().is_empty() {
            return Err(BackendError::Rejected {
                status: 400,
                message: "Invalid login credentials".into(),
            });
        }
        let session = session_for(Uuid::new_v4(), "", email);
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        if let Some(e) = self.failures.lock().unwrap().reset.take() {
            return Err(e);
        }
        self.reset_requests.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }

    async fn onboarding_completed(&self, user_id: Uuid) -> Result<Option<bool>, BackendError> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|p| p.onboarding_completed))
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        fields: &ProfileFields,
    ) -> Result<(), BackendError> {
        if let Some(e) = self.failures.lock().unwrap().upsert.take() {
            return Err(e);
        }
        self.saved.lock().unwrap().push(fields.clone());
        let mut profile = blank_profile(user_id, fields.onboarding_completed);
        profile.full_name = Some(fields.full_name.clone());
        profile.avatar_url = fields.avatar_url.clone();
        self.profiles.lock().unwrap().insert(user_id, profile);
        Ok(())
    }

    async fn get_role(&self, user_id: Uuid) -> Result<Option<Role>, BackendError> {
        Ok(self.roles.lock().unwrap().get(&user_id).copied())
    }

    async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), BackendError> {
        if let Some(e) = self.failures.lock().unwrap().upload.take() {
            return Err(e);
        }
        self.uploads.lock().unwrap().push(Upload {
            path: path.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
            overwrite,
        });
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BackendError> {
        if let Some(e) = self.failures.lock().unwrap().signed_url.take() {
            return Err(e);
        }
        Ok(format!(
            "https://stub.local/sign/{path}?expires={}",
            ttl.as_secs()
        ))
    }
}

pub fn session_for(id: Uuid, name: &str, email: &str) -> Session {
    Session {
        user: AuthUser {
            id,
            email: Some(email.to_string()),
            display_name: (!name.is_empty()).then(|| name.to_string()),
        },
        access_token: SecretString::from("token".to_string()),
        refresh_token: None,
        expires_at: None,
    }
}

pub fn blank_profile(user_id: Uuid, completed: bool) -> Profile {
    Profile {
        user_id,
        full_name: None,
        phone: None,
        email: None,
        district: None,
        upazila: None,
        farmer_type: None,
        land_size_category: None,
        land_ownership: None,
        irrigation_source: None,
        farming_method: None,
        biggest_challenges: None,
        onboarding_completed: completed,
        avatar_url: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn png(size: usize) -> AvatarFile {
    AvatarFile::new("photo.png", "image/png", vec![0x89; size])
}

/// Events filling in a valid account step.
pub fn account_events() -> Vec<Event> {
    vec![
        Event::SetFullName("Rahim Uddin".into()),
        Event::SetEmail("rahim@example.com".into()),
        Event::SetPhone("01712-345678".into()),
        Event::SetPassword(SecretString::from("secret1".to_string())),
        Event::SetConfirmPassword(SecretString::from("secret1".to_string())),
        Event::SelectDistrict("Bogura".into()),
        Event::SelectUpazila("Sherpur".into()),
    ]
}

/// Events answering the four questionnaire steps, each followed by Next,
/// ending with the final save.
pub fn questionnaire_events() -> Vec<Event> {
    vec![
        Event::ToggleFarmerType(FarmerType::Crop),
        Event::ToggleFarmerType(FarmerType::Poultry),
        Event::Next,
        Event::SelectLandSize(LandSize::OneToFive),
        Event::SelectLandOwnership(LandOwnership::Own),
        Event::SelectIrrigationSource(IrrigationSource::Tubewell),
        Event::Next,
        Event::SelectFarmingMethod(FarmingMethod::Mixed),
        Event::Next,
        Event::ToggleChallenge(Challenge::MarketPrice),
        Event::Next,
    ]
}
