//! KrishiOS farmer onboarding: session routing and the sign-up wizard.

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod notify;
pub mod onboarding;
pub mod routes;
pub mod session;
