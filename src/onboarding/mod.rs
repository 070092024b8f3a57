//! Onboarding wizard: account creation plus the farm profile questionnaire.
//!
//! The wizard is a linear, five-step form. Each step has a validity
//! predicate gating "next"; account creation happens when leaving the first
//! step and the profile is saved when leaving the last. Once the save
//! succeeds the profile is marked `onboarding_completed` and control returns
//! to the shell through a callback.

pub mod model;
pub mod state;
pub mod validate;
pub mod wizard;

pub use model::{
    AvatarFile, Challenge, FarmerType, FarmingMethod, IrrigationSource, LandOwnership, LandSize,
    Profile, ProfileFields,
};
pub use state::{Draft, Effect, Event, WizardState, WizardStep, transition};
pub use wizard::{OnboardingWizard, WizardCallbacks};
