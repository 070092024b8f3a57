//! HTTP shell exposing the resolver, the auth surface and the wizard to a front-end.
//!
//! Serves a single local visitor, so all state lives in one [`AppState`].
//! Every mutating response carries the notices raised while handling it.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthFlow, AuthMode};
use crate::backend::Backend;
use crate::config::OnboardingConfig;
use crate::error::{Error, Result};
use crate::notify::{Language, Notifier, RecordingNotifier, RenderedNotice};
use crate::onboarding::{
    AvatarFile, Challenge, Event, FarmerType, FarmingMethod, IrrigationSource, LandOwnership,
    LandSize, OnboardingWizard, WizardCallbacks, WizardState, WizardStep,
};
use crate::session::{Destination, Route, SessionResolver};

/// Signals raised by wizard callbacks, applied to the auth surface after
/// each dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellSignal {
    OnboardingComplete,
    BackToLogin,
}

/// Shared state for all routes. Locks are taken wizard first, then auth.
pub struct AppState {
    backend: Arc<dyn Backend>,
    notices: Arc<RecordingNotifier>,
    language: Language,
    onboarding: OnboardingConfig,
    resolver: SessionResolver,
    auth: Mutex<AuthFlow>,
    wizard: Mutex<Option<OnboardingWizard>>,
    signal_tx: mpsc::UnboundedSender<ShellSignal>,
    signal_rx: Mutex<mpsc::UnboundedReceiver<ShellSignal>>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn Backend>,
        language: Language,
        onboarding: OnboardingConfig,
    ) -> Arc<Self> {
        let notices = Arc::new(RecordingNotifier::new());
        let notifier: Arc<dyn Notifier> = notices.clone();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            resolver: SessionResolver::new(Arc::clone(&backend)),
            auth: Mutex::new(AuthFlow::new(Arc::clone(&backend), notifier)),
            backend,
            notices,
            language,
            onboarding,
            wizard: Mutex::new(None),
            signal_tx,
            signal_rx: Mutex::new(signal_rx),
        })
    }

    fn drain_notices(&self) -> Vec<RenderedNotice> {
        self.notices
            .drain()
            .into_iter()
            .map(|n| n.render(self.language))
            .collect()
    }

    async fn start_wizard(&self) -> OnboardingWizard {
        let complete_tx = self.signal_tx.clone();
        let back_tx = self.signal_tx.clone();
        let callbacks = WizardCallbacks::new(
            move || {
                let _ = complete_tx.send(ShellSignal::OnboardingComplete);
            },
            move || {
                let _ = back_tx.send(ShellSignal::BackToLogin);
            },
        );
        let notifier: Arc<dyn Notifier> = self.notices.clone();
        OnboardingWizard::start(
            Arc::clone(&self.backend),
            notifier,
            self.onboarding.clone(),
            callbacks,
        )
        .await
    }
}

// ── Views ───────────────────────────────────────────────────────────

/// Wizard state as seen by the front-end. Never carries password material.
#[derive(Debug, Serialize)]
pub struct WizardView {
    pub step: WizardStep,
    pub step_index: usize,
    pub step_title: &'static str,
    pub is_last_step: bool,
    pub can_advance: bool,
    pub can_go_back: bool,
    pub can_return_to_login: bool,
    pub busy: bool,
    pub preview_pending: bool,
    pub avatar_preview: Option<String>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub district: Option<String>,
    pub upazila: Option<String>,
    pub farmer_types: Vec<FarmerType>,
    pub land_size: Option<LandSize>,
    pub land_ownership: Option<LandOwnership>,
    pub irrigation_source: Option<IrrigationSource>,
    pub farming_method: Option<FarmingMethod>,
    pub challenges: Vec<Challenge>,
}

impl WizardView {
    fn new(state: &WizardState, lang: Language) -> Self {
        let draft = state.draft();
        Self {
            step: state.step(),
            step_index: state.step().index(),
            step_title: state.step().title(lang),
            is_last_step: state.step().is_last(),
            can_advance: state.can_advance(),
            can_go_back: state.can_go_back(),
            can_return_to_login: state.can_return_to_login(),
            busy: state.is_busy(),
            preview_pending: state.is_preview_pending(),
            avatar_preview: draft.avatar_preview.clone(),
            full_name: draft.full_name.clone(),
            email: draft.email.clone(),
            phone: draft.phone.clone(),
            district: draft.district.clone(),
            upazila: draft.upazila.clone(),
            farmer_types: draft.farmer_types.clone(),
            land_size: draft.land_size,
            land_ownership: draft.land_ownership,
            irrigation_source: draft.irrigation_source,
            farming_method: draft.farming_method,
            challenges: draft.challenges.clone(),
        }
    }
}

/// One choice of an option set.
#[derive(Debug, Serialize)]
pub struct OptionView {
    pub value: &'static str,
    pub label: &'static str,
}

fn catalog<T>(
    all: &'static [T],
    value: fn(&T) -> &'static str,
    label: fn(&T, Language) -> &'static str,
    lang: Language,
) -> Vec<OptionView> {
    all.iter()
        .map(|o| OptionView {
            value: value(o),
            label: label(o, lang),
        })
        .collect()
}

/// Every option set of the questionnaire, labelled for the shell's language.
#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub farmer_types: Vec<OptionView>,
    pub land_sizes: Vec<OptionView>,
    pub land_ownership: Vec<OptionView>,
    pub irrigation_sources: Vec<OptionView>,
    pub farming_methods: Vec<OptionView>,
    pub challenges: Vec<OptionView>,
}

impl OptionsResponse {
    fn new(lang: Language) -> Self {
        Self {
            farmer_types: catalog(FarmerType::ALL, FarmerType::as_str, FarmerType::label, lang),
            land_sizes: catalog(LandSize::ALL, LandSize::as_str, LandSize::label, lang),
            land_ownership: catalog(
                LandOwnership::ALL,
                LandOwnership::as_str,
                LandOwnership::label,
                lang,
            ),
            irrigation_sources: catalog(
                IrrigationSource::ALL,
                IrrigationSource::as_str,
                IrrigationSource::label,
                lang,
            ),
            farming_methods: catalog(
                FarmingMethod::ALL,
                FarmingMethod::as_str,
                FarmingMethod::label,
                lang,
            ),
            challenges: catalog(Challenge::ALL, Challenge::as_str, Challenge::label, lang),
        }
    }
}

#[derive(Debug, Serialize)]
struct DestinationResponse {
    destination: Destination,
    path: Option<&'static str>,
}

impl From<Destination> for DestinationResponse {
    fn from(destination: Destination) -> Self {
        Self {
            path: destination.path(),
            destination,
        }
    }
}

#[derive(Debug, Serialize)]
struct WizardResponse {
    wizard: Option<WizardView>,
    destination: DestinationResponse,
    notices: Vec<RenderedNotice>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    mode: AuthMode,
    destination: DestinationResponse,
    notices: Vec<RenderedNotice>,
}

// ── Requests ────────────────────────────────────────────────────────

/// A visitor action on the wizard.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WizardCommand {
    SetFullName(String),
    SetEmail(String),
    SetPhone(String),
    SetPassword(String),
    SetConfirmPassword(String),
    SelectDistrict(String),
    SelectUpazila(String),
    StageAvatar {
        file_name: String,
        mime: String,
        /// File content, base64.
        data: String,
    },
    ToggleFarmerType(FarmerType),
    SelectLandSize(LandSize),
    SelectLandOwnership(LandOwnership),
    SelectIrrigationSource(IrrigationSource),
    SelectFarmingMethod(FarmingMethod),
    ToggleChallenge(Challenge),
    Next,
    Back,
    BackToLogin,
}

impl TryFrom<WizardCommand> for Event {
    type Error = Error;

    fn try_from(cmd: WizardCommand) -> Result<Self> {
        Ok(match cmd {
            WizardCommand::SetFullName(v) => Event::SetFullName(v),
            WizardCommand::SetEmail(v) => Event::SetEmail(v),
            WizardCommand::SetPhone(v) => Event::SetPhone(v),
            WizardCommand::SetPassword(v) => Event::SetPassword(SecretString::from(v)),
            WizardCommand::SetConfirmPassword(v) => {
                Event::SetConfirmPassword(SecretString::from(v))
            }
            WizardCommand::SelectDistrict(v) => Event::SelectDistrict(v),
            WizardCommand::SelectUpazila(v) => Event::SelectUpazila(v),
            WizardCommand::StageAvatar {
                file_name,
                mime,
                data,
            } => {
                let bytes = STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| Error::Request(format!("avatar data is not valid base64: {e}")))?;
                Event::StageAvatar(AvatarFile::new(file_name, mime, bytes))
            }
            WizardCommand::ToggleFarmerType(v) => Event::ToggleFarmerType(v),
            WizardCommand::SelectLandSize(v) => Event::SelectLandSize(v),
            WizardCommand::SelectLandOwnership(v) => Event::SelectLandOwnership(v),
            WizardCommand::SelectIrrigationSource(v) => Event::SelectIrrigationSource(v),
            WizardCommand::SelectFarmingMethod(v) => Event::SelectFarmingMethod(v),
            WizardCommand::ToggleChallenge(v) => Event::ToggleChallenge(v),
            WizardCommand::Next => Event::Next,
            WizardCommand::Back => Event::Back,
            WizardCommand::BackToLogin => Event::BackToLogin,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DestinationQuery {
    route: Option<Route>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct ResetRequest {
    email: String,
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: String,
}

// ── Errors ──────────────────────────────────────────────────────────

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Request(_) => StatusCode::BAD_REQUEST,
            Error::Backend(e) => {
                tracing::warn!("Backend lookup failed: {}", e);
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /api/destination?route=home|admin|auth
async fn get_destination(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DestinationQuery>,
) -> Result<Json<DestinationResponse>> {
    let route = query.route.unwrap_or(Route::Home);
    let destination = match route {
        Route::Auth => {
            let mut auth = state.auth.lock().await;
            auth.enter().await?;
            auth.destination()
        }
        other => state.resolver.destination(other).await?,
    };
    Ok(Json(destination.into()))
}

/// GET /api/options
async fn get_options(State(state): State<Arc<AppState>>) -> Json<OptionsResponse> {
    Json(OptionsResponse::new(state.language))
}

/// GET /api/wizard
async fn get_wizard(State(state): State<Arc<AppState>>) -> Json<WizardResponse> {
    let mut wizard = state.wizard.lock().await;
    let auth = state.auth.lock().await;
    if onboarding_done(&auth) {
        *wizard = None;
    } else if wizard.is_none() {
        *wizard = Some(state.start_wizard().await);
    }
    let view = wizard.as_ref().map(|w| WizardView::new(w.state(), state.language));
    let destination = auth.destination();
    Json(WizardResponse {
        wizard: view,
        destination: destination.into(),
        notices: state.drain_notices(),
    })
}

/// POST /api/wizard/events
async fn post_wizard_event(
    State(state): State<Arc<AppState>>,
    Json(cmd): Json<WizardCommand>,
) -> Result<Json<WizardResponse>> {
    let event = Event::try_from(cmd)?;

    let mut wizard = state.wizard.lock().await;
    let mut auth = state.auth.lock().await;
    if onboarding_done(&auth) {
        // Finished visitors never get a fresh wizard.
        *wizard = None;
    } else if wizard.is_none() {
        *wizard = Some(state.start_wizard().await);
    }
    if let Some(w) = wizard.as_mut() {
        w.dispatch(event).await;
    }

    let mut signals = state.signal_rx.lock().await;
    while let Ok(signal) = signals.try_recv() {
        match signal {
            ShellSignal::OnboardingComplete => auth.onboarding_finished(),
            ShellSignal::BackToLogin => auth.show_login(),
        }
        // Either way this onboarding attempt is over.
        *wizard = None;
    }

    Ok(Json(WizardResponse {
        wizard: wizard
            .as_ref()
            .map(|w| WizardView::new(w.state(), state.language)),
        destination: auth.destination().into(),
        notices: state.drain_notices(),
    }))
}

fn onboarding_done(auth: &AuthFlow) -> bool {
    matches!(auth.destination(), Destination::Home { .. })
}

fn auth_response(state: &AppState, auth: &AuthFlow) -> Json<AuthResponse> {
    Json(AuthResponse {
        mode: auth.mode(),
        destination: auth.destination().into(),
        notices: state.drain_notices(),
    })
}

/// POST /api/auth/login
async fn post_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Json<AuthResponse> {
    let mut wizard = state.wizard.lock().await;
    let mut auth = state.auth.lock().await;
    if auth.log_in(&req.email, &SecretString::from(req.password)).await {
        // A fresh session restarts onboarding from the session's point of view.
        *wizard = None;
    }
    auth_response(&state, &auth)
}

/// POST /api/auth/reset
async fn post_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetRequest>,
) -> Json<AuthResponse> {
    let mut auth = state.auth.lock().await;
    auth.request_reset(&req.email).await;
    auth_response(&state, &auth)
}

/// POST /api/auth/mode
async fn post_mode(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<AuthResponse>> {
    let mut auth = state.auth.lock().await;
    match req.mode.as_str() {
        "login" => auth.show_login(),
        "forgot_password" => auth.show_forgot_password(),
        "sign_up" => auth.start_sign_up(),
        other => return Err(Error::Request(format!("unknown mode: {other}"))),
    }
    Ok(auth_response(&state, &auth))
}

/// POST /api/auth/logout
async fn post_logout(State(state): State<Arc<AppState>>) -> Json<AuthResponse> {
    let mut wizard = state.wizard.lock().await;
    let mut auth = state.auth.lock().await;
    if let Err(e) = auth.sign_out().await {
        tracing::warn!("Sign-out call failed, session dropped locally: {}", e);
    }
    *wizard = None;
    auth_response(&state, &auth)
}

/// Build the shell's REST routes.
pub fn app_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/destination", get(get_destination))
        .route("/api/options", get(get_options))
        .route("/api/wizard", get(get_wizard))
        .route("/api/wizard/events", post(post_wizard_event))
        .route("/api/auth/login", post(post_login))
        .route("/api/auth/reset", post(post_reset))
        .route("/api/auth/mode", post(post_mode))
        .route("/api/auth/logout", post(post_logout))
        .with_state(state)
}

/// Routes plus request tracing and a permissive CORS policy for the
/// front-end dev server.
pub fn router(state: Arc<AppState>) -> Router {
    app_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}
