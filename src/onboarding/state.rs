//! Onboarding wizard state machine.
//!
//! Five linear steps: CreateAccount → FarmerType → FarmInfo → FarmingMethod →
//! Challenges. [`transition`] is pure: it takes the current state and one
//! event and returns the next state plus the side effects the driver must
//! perform. Results of those side effects come back in as events.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::model::{
    AvatarFile, Challenge, FarmerType, FarmingMethod, IrrigationSource, LandOwnership, LandSize,
    ProfileFields, toggle,
};
use super::validate;
use crate::backend::AuthUser;
use crate::error::AvatarError;
use crate::notify::{Language, Message, Notice};

/// The steps of the wizard, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    CreateAccount = 0,
    FarmerType = 1,
    FarmInfo = 2,
    FarmingMethod = 3,
    Challenges = 4,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        Self::CreateAccount,
        Self::FarmerType,
        Self::FarmInfo,
        Self::FarmingMethod,
        Self::Challenges,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Get the next step, if any.
    pub fn next(&self) -> Option<WizardStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Get the previous step, if any.
    pub fn prev(&self) -> Option<WizardStep> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Whether leaving this step forward finishes onboarding.
    pub fn is_last(&self) -> bool {
        matches!(self, Self::Challenges)
    }

    pub fn title(&self, lang: Language) -> &'static str {
        let (bn, en) = match self {
            Self::CreateAccount => ("অ্যাকাউন্ট তৈরি", "Create Account"),
            Self::FarmerType => ("কৃষকের ধরন", "Farmer Type"),
            Self::FarmInfo => ("খামারের তথ্য", "Farm Info"),
            Self::FarmingMethod => ("চাষের ধরন", "Farming Method"),
            Self::Challenges => ("সমস্যা চিহ্নিত", "Challenges"),
        };
        match lang {
            Language::Bn => bn,
            Language::En => en,
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreateAccount => "create_account",
            Self::FarmerType => "farmer_type",
            Self::FarmInfo => "farm_info",
            Self::FarmingMethod => "farming_method",
            Self::Challenges => "challenges",
        };
        write!(f, "{s}")
    }
}

/// In-memory answers for one onboarding attempt. Never persisted partially.
#[derive(Debug)]
pub struct Draft {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub district: Option<String>,
    pub upazila: Option<String>,
    pub farmer_types: Vec<FarmerType>,
    pub land_size: Option<LandSize>,
    pub land_ownership: Option<LandOwnership>,
    pub irrigation_source: Option<IrrigationSource>,
    pub farming_method: Option<FarmingMethod>,
    pub challenges: Vec<Challenge>,
    pub avatar: Option<AvatarFile>,
    pub avatar_preview: Option<String>,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            email: String::new(),
            phone: String::new(),
            password: SecretString::from(String::new()),
            confirm_password: SecretString::from(String::new()),
            district: None,
            upazila: None,
            farmer_types: Vec::new(),
            land_size: None,
            land_ownership: None,
            irrigation_source: None,
            farming_method: None,
            challenges: Vec::new(),
            avatar: None,
            avatar_preview: None,
        }
    }
}

impl Draft {
    /// Profile columns for the final save. `None` while any required answer
    /// is missing. The avatar URL is filled in by the driver after upload.
    pub fn profile_fields(&self) -> Option<ProfileFields> {
        Some(ProfileFields {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            district: self.district.clone().unwrap_or_default(),
            upazila: self.upazila.clone().unwrap_or_default(),
            farmer_type: non_empty(&self.farmer_types)?,
            land_size_category: self.land_size?,
            land_ownership: self.land_ownership?,
            irrigation_source: self.irrigation_source?,
            farming_method: self.farming_method?,
            biggest_challenges: non_empty(&self.challenges)?,
            onboarding_completed: true,
            avatar_url: None,
        })
    }
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

/// Input to the state machine: visitor actions and results of side effects.
#[derive(Debug)]
pub enum Event {
    SetFullName(String),
    SetEmail(String),
    SetPhone(String),
    SetPassword(SecretString),
    SetConfirmPassword(SecretString),
    /// Picking a district clears the upazila.
    SelectDistrict(String),
    SelectUpazila(String),
    StageAvatar(AvatarFile),
    AvatarPreviewReady(String),
    ToggleFarmerType(FarmerType),
    SelectLandSize(LandSize),
    SelectLandOwnership(LandOwnership),
    SelectIrrigationSource(IrrigationSource),
    SelectFarmingMethod(FarmingMethod),
    ToggleChallenge(Challenge),
    Next,
    Back,
    BackToLogin,
    AccountCreated,
    AccountCreationFailed { message: Option<String> },
    ProfileSaved,
    ProfileSaveFailed,
}

/// Work the driver must carry out after a transition.
#[derive(Debug)]
pub enum Effect {
    CreateAccount {
        email: String,
        password: SecretString,
        display_name: String,
    },
    RenderAvatarPreview(AvatarFile),
    SaveProfile {
        fields: ProfileFields,
        avatar: Option<AvatarFile>,
    },
    Notify(Notice),
    Completed,
    ReturnToLogin,
}

/// Complete wizard state.
#[derive(Debug)]
pub struct WizardState {
    step: WizardStep,
    /// Lowest step reachable with Back.
    floor: WizardStep,
    draft: Draft,
    avatar_max_bytes: u64,
    busy: bool,
    preview_pending: bool,
    account_created: bool,
    completed: bool,
}

impl WizardState {
    /// Fresh visitor: starts at account creation.
    pub fn new_account(avatar_max_bytes: u64) -> Self {
        Self {
            step: WizardStep::CreateAccount,
            floor: WizardStep::CreateAccount,
            draft: Draft::default(),
            avatar_max_bytes,
            busy: false,
            preview_pending: false,
            account_created: false,
            completed: false,
        }
    }

    /// Visitor with a session: the account exists, so start at the first
    /// profile step with name and email taken from the session.
    pub fn for_session(user: &AuthUser, avatar_max_bytes: u64) -> Self {
        let mut state = Self::new_account(avatar_max_bytes);
        state.step = WizardStep::FarmerType;
        state.floor = WizardStep::FarmerType;
        state.account_created = true;
        state.draft.full_name = user.display_name.clone().unwrap_or_default();
        state.draft.email = user.email.clone().unwrap_or_default();
        state
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// An external call is outstanding; visitor input is ignored.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_preview_pending(&self) -> bool {
        self.preview_pending
    }

    pub fn account_created(&self) -> bool {
        self.account_created
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether the "next"/"finish" control is enabled.
    pub fn can_advance(&self) -> bool {
        !self.busy && !self.completed && validate::can_advance(self.step, &self.draft)
    }

    pub fn can_go_back(&self) -> bool {
        !self.busy && !self.completed && self.step > self.floor
    }

    /// "Return to login" is offered only before an account exists.
    pub fn can_return_to_login(&self) -> bool {
        !self.busy && !self.completed && !self.account_created
    }

    /// Apply one event. See [`transition`].
    pub fn apply(mut self, event: Event) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        if self.completed {
            tracing::debug!(?event, "wizard already completed, ignoring event");
            return (self, effects);
        }

        match event {
            Event::AccountCreated if self.busy => {
                self.busy = false;
                self.account_created = true;
                self.step = WizardStep::FarmerType;
                self.floor = WizardStep::FarmerType;
                effects.push(Effect::Notify(Notice::success(Message::AccountCreated)));
            }
            Event::AccountCreationFailed { message } if self.busy => {
                self.busy = false;
                let message = match message {
                    Some(text) if !text.trim().is_empty() => Message::Remote(text),
                    _ => Message::AccountCreateFailed,
                };
                effects.push(Effect::Notify(Notice::error(message)));
            }
            Event::ProfileSaved if self.busy => {
                self.busy = false;
                self.completed = true;
                self.draft = Draft::default();
                effects.push(Effect::Completed);
            }
            Event::ProfileSaveFailed if self.busy => {
                self.busy = false;
                effects.push(Effect::Notify(Notice::error(Message::SaveFailed)));
            }
            Event::AvatarPreviewReady(url) => {
                if self.preview_pending {
                    self.draft.avatar_preview = Some(url);
                    self.preview_pending = false;
                }
            }
            event if self.busy => {
                tracing::debug!(?event, step = %self.step, "wizard busy, ignoring event");
            }
            event => self.apply_input(event, &mut effects),
        }

        (self, effects)
    }

    fn apply_input(&mut self, event: Event, effects: &mut Vec<Effect>) {
        type Step = WizardStep;

        let draft = &mut self.draft;
        match (self.step, event) {
            (Step::CreateAccount, Event::SetFullName(v)) => draft.full_name = v,
            (Step::CreateAccount, Event::SetEmail(v)) => draft.email = v,
            (Step::CreateAccount, Event::SetPhone(v)) => draft.phone = v,
            (Step::CreateAccount, Event::SetPassword(v)) => draft.password = v,
            (Step::CreateAccount, Event::SetConfirmPassword(v)) => draft.confirm_password = v,
            (Step::CreateAccount, Event::SelectDistrict(v)) => {
                if draft.district.as_deref() != Some(v.as_str()) {
                    draft.upazila = None;
                }
                draft.district = Some(v);
            }
            (Step::CreateAccount, Event::SelectUpazila(v)) => {
                if draft.district.is_some() {
                    draft.upazila = Some(v);
                }
            }
            (Step::CreateAccount, Event::StageAvatar(file)) => {
                match validate::check_avatar(&file, self.avatar_max_bytes) {
                    Ok(()) => {
                        draft.avatar = Some(file.clone());
                        draft.avatar_preview = None;
                        self.preview_pending = true;
                        effects.push(Effect::RenderAvatarPreview(file));
                    }
                    Err(err) => {
                        tracing::debug!(%err, "avatar rejected");
                        let message = match err {
                            AvatarError::NotAnImage { .. } => Message::ImageOnly,
                            AvatarError::TooLarge { .. } => Message::ImageTooLarge,
                        };
                        effects.push(Effect::Notify(Notice::error(message)));
                    }
                }
            }
            (Step::FarmerType, Event::ToggleFarmerType(v)) => toggle(&mut draft.farmer_types, v),
            (Step::FarmInfo, Event::SelectLandSize(v)) => draft.land_size = Some(v),
            (Step::FarmInfo, Event::SelectLandOwnership(v)) => draft.land_ownership = Some(v),
            (Step::FarmInfo, Event::SelectIrrigationSource(v)) => draft.irrigation_source = Some(v),
            (Step::FarmingMethod, Event::SelectFarmingMethod(v)) => draft.farming_method = Some(v),
            (Step::Challenges, Event::ToggleChallenge(v)) => toggle(&mut draft.challenges, v),
            (_, Event::Next) => self.advance(effects),
            (_, Event::Back) => {
                if self.can_go_back() {
                    if let Some(prev) = self.step.prev() {
                        self.step = prev;
                    }
                }
            }
            (_, Event::BackToLogin) => {
                if self.can_return_to_login() {
                    effects.push(Effect::ReturnToLogin);
                }
            }
            (step, event) => {
                tracing::debug!(?event, %step, "event not accepted at this step");
            }
        }
    }

    fn advance(&mut self, effects: &mut Vec<Effect>) {
        if !self.can_advance() {
            return;
        }

        match self.step {
            WizardStep::CreateAccount if !self.account_created => {
                self.busy = true;
                effects.push(Effect::CreateAccount {
                    email: self.draft.email.trim().to_string(),
                    password: SecretString::from(self.draft.password.expose_secret().to_string()),
                    display_name: self.draft.full_name.trim().to_string(),
                });
            }
            WizardStep::Challenges => {
                if let Some(fields) = self.draft.profile_fields() {
                    self.busy = true;
                    effects.push(Effect::SaveProfile {
                        fields,
                        avatar: self.draft.avatar.clone(),
                    });
                }
            }
            step => {
                if let Some(next) = step.next() {
                    self.step = next;
                }
            }
        }
    }
}

/// `(state, event) -> (state, effects)`.
pub fn transition(state: WizardState, event: Event) -> (WizardState, Vec<Effect>) {
    state.apply(event)
}
