//! End-to-end tests: wizard driver, session resolver and auth surface against
//! an in-memory backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use secrecy::SecretString;
use tokio::time::timeout;

use common::{StubBackend, TEST_TIMEOUT, account_events, png, questionnaire_events};
use krishi_onboard::auth::{AuthFlow, AuthMode};
use krishi_onboard::backend::{Backend, Role};
use krishi_onboard::config::OnboardingConfig;
use krishi_onboard::error::BackendError;
use krishi_onboard::notify::{Message, Notice, NoticeKind, Notifier, RecordingNotifier};
use krishi_onboard::onboarding::{
    AvatarFile, Event, FarmerType, OnboardingWizard, WizardCallbacks, WizardStep,
};
use krishi_onboard::session::{Destination, Route, SessionResolver};

struct Harness {
    backend: Arc<StubBackend>,
    notices: Arc<RecordingNotifier>,
    completions: Arc<AtomicUsize>,
    back_to_login: Arc<AtomicUsize>,
    wizard: OnboardingWizard,
}

impl Harness {
    async fn start(backend: StubBackend) -> Self {
        let backend = Arc::new(backend);
        let notices = Arc::new(RecordingNotifier::new());
        let completions = Arc::new(AtomicUsize::new(0));
        let back_to_login = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&completions);
        let back = Arc::clone(&back_to_login);
        let callbacks = WizardCallbacks::new(
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                back.fetch_add(1, Ordering::SeqCst);
            },
        );

        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let notifier: Arc<dyn Notifier> = notices.clone();
        let wizard =
            OnboardingWizard::start(dyn_backend, notifier, OnboardingConfig::default(), callbacks)
                .await;

        Self {
            backend,
            notices,
            completions,
            back_to_login,
            wizard,
        }
    }

    async fn send_all(&mut self, events: Vec<Event>) {
        for event in events {
            timeout(TEST_TIMEOUT, self.wizard.dispatch(event))
                .await
                .expect("dispatch timed out");
        }
    }

    fn step(&self) -> WizardStep {
        self.wizard.state().step()
    }
}

// ── Wizard ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_signup_creates_account_once_and_saves_profile() {
    let mut h = Harness::start(StubBackend::new()).await;
    assert_eq!(h.step(), WizardStep::CreateAccount);

    h.send_all(account_events()).await;
    assert!(h.wizard.state().can_advance());
    h.send_all(vec![Event::Next]).await;

    assert_eq!(h.backend.creates(), 1);
    assert_eq!(h.step(), WizardStep::FarmerType);
    assert!(h.wizard.state().account_created());
    assert!(!h.wizard.state().can_go_back());
    assert_eq!(
        h.notices.drain(),
        vec![Notice::success(Message::AccountCreated)]
    );

    h.send_all(questionnaire_events()).await;

    assert_eq!(h.backend.creates(), 1, "no second account creation");
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert!(h.wizard.state().is_completed());

    let saved = h.backend.saved();
    assert_eq!(saved.len(), 1);
    let fields = &saved[0];
    assert!(fields.onboarding_completed);
    assert_eq!(fields.full_name, "Rahim Uddin");
    assert_eq!(fields.email, "rahim@example.com");
    assert_eq!(fields.district, "Bogura");
    assert_eq!(fields.upazila, "Sherpur");
    assert_eq!(fields.farmer_type, vec![FarmerType::Crop, FarmerType::Poultry]);
    assert_eq!(fields.avatar_url, None);

    let payload = serde_json::to_value(fields).unwrap();
    assert!(payload.get("avatar_url").is_none());
    assert!(payload.get("password").is_none());
}

#[tokio::test]
async fn invalid_account_step_never_calls_backend() {
    let mut h = Harness::start(StubBackend::new()).await;
    h.send_all(account_events()).await;
    h.send_all(vec![
        Event::SetConfirmPassword(SecretString::from("different".to_string())),
        Event::Next,
    ])
    .await;

    assert_eq!(h.backend.creates(), 0);
    assert_eq!(h.step(), WizardStep::CreateAccount);
}

#[tokio::test]
async fn failed_account_creation_stays_on_first_step() {
    let backend = StubBackend::new();
    backend.failures.lock().unwrap().create_account = Some(BackendError::Rejected {
        status: 422,
        message: "User already registered".into(),
    });
    let mut h = Harness::start(backend).await;

    h.send_all(account_events()).await;
    h.send_all(vec![Event::Next]).await;

    assert_eq!(h.step(), WizardStep::CreateAccount);
    assert!(!h.wizard.state().is_busy());
    assert_eq!(
        h.notices.drain(),
        vec![Notice::error(Message::Remote("User already registered".into()))]
    );

    // Retry goes through.
    h.send_all(vec![Event::Next]).await;
    assert_eq!(h.backend.creates(), 2);
    assert_eq!(h.step(), WizardStep::FarmerType);
}

#[tokio::test]
async fn transport_failure_uses_generic_message() {
    let backend = StubBackend::new();
    backend.failures.lock().unwrap().create_account =
        Some(BackendError::Http("connection refused".into()));
    let mut h = Harness::start(backend).await;

    h.send_all(account_events()).await;
    h.send_all(vec![Event::Next]).await;

    let notices = h.notices.drain();
    assert_eq!(notices, vec![Notice::error(Message::AccountCreateFailed)]);
}

#[tokio::test]
async fn avatar_is_uploaded_and_signed() {
    let mut h = Harness::start(StubBackend::new()).await;
    h.send_all(account_events()).await;
    h.send_all(vec![Event::StageAvatar(png(1024))]).await;

    let preview = h.wizard.state().draft().avatar_preview.clone();
    assert!(preview.unwrap().starts_with("data:image/png;base64,"));

    h.send_all(vec![Event::Next]).await;
    h.send_all(questionnaire_events()).await;

    let user_id = h.backend.user_id().unwrap();
    let uploads = h.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, format!("{user_id}/avatar.png"));
    assert_eq!(uploads[0].size, 1024);
    assert_eq!(uploads[0].content_type, "image/png");
    assert!(uploads[0].overwrite);

    let saved = h.backend.saved();
    let url = saved[0].avatar_url.as_deref().unwrap();
    assert!(url.contains(&format!("{user_id}/avatar.png")));
    assert!(url.ends_with(&format!("expires={}", 365 * 24 * 60 * 60)));
}

#[tokio::test]
async fn avatar_path_stays_in_user_folder() {
    let mut h = Harness::start(StubBackend::new()).await;
    h.send_all(account_events()).await;
    let file = AvatarFile::new("x./../../../other-bucket/pwn", "image/png", vec![0x89; 64]);
    h.send_all(vec![Event::StageAvatar(file), Event::Next]).await;
    h.send_all(questionnaire_events()).await;

    let user_id = h.backend.user_id().unwrap();
    let uploads = h.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, format!("{user_id}/avatar.png"));
}

#[tokio::test]
async fn avatar_upload_failure_does_not_block_completion() {
    let backend = StubBackend::new();
    backend.failures.lock().unwrap().upload = Some(BackendError::Storage {
        path: "x".into(),
        reason: "bucket missing".into(),
    });
    let mut h = Harness::start(backend).await;

    h.send_all(account_events()).await;
    h.send_all(vec![Event::StageAvatar(png(64)), Event::Next]).await;
    h.send_all(questionnaire_events()).await;

    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    let saved = h.backend.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].avatar_url, None);
}

#[tokio::test]
async fn rejected_avatar_is_not_staged() {
    let mut h = Harness::start(StubBackend::new()).await;
    h.send_all(vec![
        Event::StageAvatar(png(3 * 1024 * 1024)),
        Event::StageAvatar(AvatarFile::new(
            "notes.pdf",
            "application/pdf",
            vec![1, 2, 3],
        )),
    ])
    .await;

    assert!(h.wizard.state().draft().avatar.is_none());
    assert_eq!(
        h.notices.drain(),
        vec![
            Notice::error(Message::ImageTooLarge),
            Notice::error(Message::ImageOnly),
        ]
    );
}

#[tokio::test]
async fn failed_save_stays_on_last_step_and_can_retry() {
    let backend = StubBackend::new();
    backend.failures.lock().unwrap().upsert = Some(BackendError::Rejected {
        status: 403,
        message: "row-level security".into(),
    });
    let mut h = Harness::start(backend).await;

    h.send_all(account_events()).await;
    h.send_all(vec![Event::Next]).await;
    h.notices.drain();
    h.send_all(questionnaire_events()).await;

    assert_eq!(h.step(), WizardStep::Challenges);
    assert!(!h.wizard.state().is_completed());
    assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    assert_eq!(h.notices.drain(), vec![Notice::error(Message::SaveFailed)]);
    // Answers survive the failure.
    assert_eq!(
        h.wizard.state().draft().farmer_types,
        vec![FarmerType::Crop, FarmerType::Poultry]
    );

    h.send_all(vec![Event::Next]).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.saved().len(), 1);
    assert_eq!(h.backend.creates(), 1);
}

#[tokio::test]
async fn finishing_without_session_fails() {
    let backend = StubBackend {
        confirm_email: true,
        ..StubBackend::new()
    };
    let mut h = Harness::start(backend).await;

    h.send_all(account_events()).await;
    h.send_all(vec![Event::Next]).await;
    assert_eq!(h.step(), WizardStep::FarmerType);

    h.send_all(questionnaire_events()).await;

    assert_eq!(h.step(), WizardStep::Challenges);
    assert!(h.backend.saved().is_empty());
    assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    assert!(h.notices.drain().contains(&Notice::error(Message::SaveFailed)));
}

#[tokio::test]
async fn signed_in_user_starts_at_first_profile_step() {
    let backend = StubBackend::signed_in("Karim Mia", "karim@example.com");
    let mut h = Harness::start(backend).await;

    assert_eq!(h.step(), WizardStep::FarmerType);
    assert_eq!(h.wizard.state().draft().full_name, "Karim Mia");
    assert_eq!(h.wizard.state().draft().email, "karim@example.com");
    assert!(!h.wizard.state().can_go_back());
    assert!(!h.wizard.state().can_return_to_login());

    h.send_all(questionnaire_events()).await;

    assert_eq!(h.backend.creates(), 0);
    let saved = h.backend.saved();
    assert_eq!(saved[0].full_name, "Karim Mia");
    // Session users never entered a phone or location.
    assert_eq!(saved[0].phone, "");
    assert_eq!(saved[0].district, "");
}

#[tokio::test]
async fn back_to_login_only_before_account_exists() {
    let mut h = Harness::start(StubBackend::new()).await;
    h.send_all(vec![Event::BackToLogin]).await;
    assert_eq!(h.back_to_login.load(Ordering::SeqCst), 1);

    h.send_all(account_events()).await;
    h.send_all(vec![Event::Next, Event::BackToLogin]).await;
    assert_eq!(h.back_to_login.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_after_completion_are_ignored() {
    let mut h = Harness::start(StubBackend::signed_in("A", "a@b.co")).await;
    h.send_all(questionnaire_events()).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);

    h.send_all(vec![Event::Next, Event::Back]).await;
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.saved().len(), 1);
}

// ── Resolver ────────────────────────────────────────────────────────

#[tokio::test]
async fn resolver_routes_by_session_role_and_profile() {
    let backend = Arc::new(StubBackend::new());
    let resolver = SessionResolver::new(backend.clone());

    assert_eq!(
        resolver.destination(Route::Home).await.unwrap(),
        Destination::Login
    );

    *backend.session.lock().unwrap() = Some(common::session_for(
        uuid::Uuid::new_v4(),
        "Farmer",
        "f@example.com",
    ));
    let user_id = backend.user_id().unwrap();

    // No profile row yet.
    assert_eq!(
        resolver.destination(Route::Home).await.unwrap(),
        Destination::Onboarding
    );
    assert_eq!(
        resolver.destination(Route::Admin).await.unwrap(),
        Destination::Home { new_signup: false }
    );

    backend.set_profile_completed(user_id, true);
    assert_eq!(
        resolver.destination(Route::Home).await.unwrap(),
        Destination::Home { new_signup: false }
    );

    backend.set_role(user_id, Role::Admin);
    backend.set_profile_completed(user_id, false);
    assert_eq!(
        resolver.destination(Route::Home).await.unwrap(),
        Destination::Admin
    );
}

// ── Auth surface ────────────────────────────────────────────────────

fn auth_flow(backend: Arc<StubBackend>) -> (AuthFlow, Arc<RecordingNotifier>) {
    let notices = Arc::new(RecordingNotifier::new());
    let notifier: Arc<dyn Notifier> = notices.clone();
    (AuthFlow::new(backend, notifier), notices)
}

#[tokio::test]
async fn login_failure_reports_server_message() {
    let backend = Arc::new(StubBackend::new());
    let (mut flow, notices) = auth_flow(backend.clone());

    let ok = flow
        .log_in("rahim@example.com", &SecretString::from(String::new()))
        .await;

    assert!(!ok);
    assert_eq!(flow.mode(), AuthMode::Login);
    let notices = notices.drain();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Error);
    assert_eq!(
        notices[0].message,
        Message::Remote("Invalid login credentials".into())
    );
}

#[tokio::test]
async fn login_with_unfinished_profile_switches_to_wizard() {
    let backend = Arc::new(StubBackend::new());
    let (mut flow, _) = auth_flow(backend.clone());

    assert!(
        flow.log_in("rahim@example.com", &SecretString::from("secret1".to_string()))
            .await
    );
    assert_eq!(flow.mode(), AuthMode::SignUp);
    assert_eq!(flow.destination(), Destination::Onboarding);

    flow.onboarding_finished();
    assert_eq!(flow.destination(), Destination::Home { new_signup: true });
}

#[tokio::test]
async fn login_with_finished_profile_goes_home() {
    let backend = Arc::new(StubBackend::new());
    let (mut flow, _) = auth_flow(backend.clone());
    assert!(flow.log_in("a@b.co", &SecretString::from("pw1234".to_string())).await);

    let user_id = backend.user_id().unwrap();
    backend.set_profile_completed(user_id, true);
    flow.enter().await.unwrap();

    assert_eq!(flow.destination(), Destination::Home { new_signup: false });
}

#[tokio::test]
async fn entering_with_unfinished_profile_resumes_wizard() {
    let backend = Arc::new(StubBackend::signed_in("Rahim", "rahim@example.com"));
    backend.set_profile_completed(backend.user_id().unwrap(), false);
    let (mut flow, _) = auth_flow(backend.clone());

    flow.enter().await.unwrap();
    assert_eq!(flow.mode(), AuthMode::SignUp);
    assert_eq!(flow.destination(), Destination::Onboarding);
}

#[tokio::test]
async fn reset_requires_an_email() {
    let backend = Arc::new(StubBackend::new());
    let (mut flow, notices) = auth_flow(backend.clone());
    flow.show_forgot_password();

    flow.request_reset("   ").await;
    assert!(backend.reset_requests.lock().unwrap().is_empty());
    assert_eq!(notices.drain(), vec![Notice::error(Message::ProvideEmail)]);

    flow.request_reset(" rahim@example.com ").await;
    assert_eq!(
        *backend.reset_requests.lock().unwrap(),
        vec!["rahim@example.com".to_string()]
    );
    assert_eq!(flow.mode(), AuthMode::ForgotPassword { reset_sent: true });
    assert_eq!(notices.drain(), vec![Notice::success(Message::ResetSent)]);
}

#[tokio::test]
async fn reset_failure_keeps_form_open() {
    let backend = Arc::new(StubBackend::new());
    backend.failures.lock().unwrap().reset = Some(BackendError::Http("timeout".into()));
    let (mut flow, notices) = auth_flow(backend.clone());
    flow.show_forgot_password();

    flow.request_reset("rahim@example.com").await;

    assert_eq!(flow.mode(), AuthMode::ForgotPassword { reset_sent: false });
    assert_eq!(notices.drain(), vec![Notice::error(Message::ResetFailed)]);
}

#[tokio::test]
async fn sign_out_returns_to_login() {
    let backend = Arc::new(StubBackend::signed_in("A", "a@b.co"));
    let (mut flow, _) = auth_flow(backend.clone());
    flow.enter().await.unwrap();
    assert_eq!(flow.mode(), AuthMode::SignUp);

    flow.sign_out().await.unwrap();

    assert_eq!(flow.mode(), AuthMode::Login);
    assert_eq!(flow.destination(), Destination::Login);
    assert!(backend.current_session().await.is_none());
    assert_eq!(backend.sign_out_calls.load(Ordering::SeqCst), 1);
}
