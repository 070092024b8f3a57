//! Per-step validity predicates for the onboarding wizard.
//!
//! A step may be left forward only when its predicate holds; the "next"
//! control is disabled otherwise. All checks are local, no network.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::ExposeSecret;

use super::model::AvatarFile;
use super::state::{Draft, WizardStep};
use crate::error::AvatarError;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Minimum number of digits in a phone number.
pub const MIN_PHONE_DIGITS: usize = 11;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// `local@domain.tld`, no whitespace, exactly one `@` per side.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn phone_digit_count(phone: &str) -> usize {
    phone.chars().filter(|c| c.is_ascii_digit()).count()
}

/// Account step: name, email, password pair, phone and location.
pub fn account_ready(draft: &Draft) -> bool {
    let password = draft.password.expose_secret();
    !draft.full_name.trim().is_empty()
        && is_valid_email(draft.email.trim())
        && password.chars().count() >= MIN_PASSWORD_LEN
        && password == draft.confirm_password.expose_secret()
        && phone_digit_count(&draft.phone) >= MIN_PHONE_DIGITS
        && draft.district.is_some()
        && draft.upazila.is_some()
}

/// Whether `step` may be left forward with the current draft.
pub fn can_advance(step: WizardStep, draft: &Draft) -> bool {
    match step {
        WizardStep::CreateAccount => account_ready(draft),
        WizardStep::FarmerType => !draft.farmer_types.is_empty(),
        WizardStep::FarmInfo => {
            draft.land_size.is_some()
                && draft.land_ownership.is_some()
                && draft.irrigation_source.is_some()
        }
        WizardStep::FarmingMethod => draft.farming_method.is_some(),
        WizardStep::Challenges => !draft.challenges.is_empty(),
    }
}

/// Accept or refuse a picked avatar file. The MIME check runs first.
pub fn check_avatar(file: &AvatarFile, max_bytes: u64) -> Result<(), AvatarError> {
    if !file.mime.starts_with("image/") {
        return Err(AvatarError::NotAnImage {
            mime: file.mime.clone(),
        });
    }
    if file.size() > max_bytes {
        return Err(AvatarError::TooLarge {
            size: file.size(),
            max: max_bytes,
        });
    }
    Ok(())
}
