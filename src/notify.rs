//! Transient user notifications ("toasts") and their localized text.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Display language for notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Bn,
    En,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bn" => Ok(Self::Bn),
            "en" => Ok(Self::En),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Whether a notice reports success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

/// What a notice says, independent of language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    AccountCreated,
    AccountCreateFailed,
    SaveFailed,
    ImageOnly,
    ImageTooLarge,
    ProvideEmail,
    ResetSent,
    LoginFailed,
    ResetFailed,
    /// Server-supplied text, shown as is.
    Remote(String),
}

/// A one-line transient notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: Message,
}

impl Notice {
    pub fn success(message: Message) -> Self {
        Self {
            kind: NoticeKind::Success,
            message,
        }
    }

    pub fn error(message: Message) -> Self {
        Self {
            kind: NoticeKind::Error,
            message,
        }
    }

    /// Error notice for a remote failure: the server's text when it has a
    /// user-safe one, `fallback` otherwise.
    pub fn remote_error(err: &crate::error::BackendError, fallback: Message) -> Self {
        match err.user_message() {
            Some(text) => Self::error(Message::Remote(text.to_string())),
            None => Self::error(fallback),
        }
    }

    /// Resolve title and description for `lang`.
    pub fn render(&self, lang: Language) -> RenderedNotice {
        let bn = lang == Language::Bn;
        let pick = |b: &str, e: &str| if bn { b.to_string() } else { e.to_string() };
        let error_title = || pick("ত্রুটি", "Error");

        let (title, description) = match &self.message {
            Message::AccountCreated => (
                pick("✅ অ্যাকাউন্ট তৈরি হয়েছে!", "✅ Account created!"),
                pick(
                    "এখন আপনার কৃষি প্রোফাইল সম্পন্ন করুন।",
                    "Now complete your farming profile.",
                ),
            ),
            Message::ResetSent => (
                pick("✅ ইমেইল পাঠানো হয়েছে", "✅ Email sent"),
                pick(
                    "পাসওয়ার্ড রিসেট লিংক আপনার ইমেইলে পাঠানো হয়েছে।",
                    "A password reset link has been sent to your email.",
                ),
            ),
            Message::AccountCreateFailed => (
                error_title(),
                pick("অ্যাকাউন্ট তৈরি করতে সমস্যা হয়েছে", "Failed to create account"),
            ),
            Message::SaveFailed => (
                error_title(),
                pick(
                    "তথ্য সংরক্ষণে সমস্যা হয়েছে",
                    "Failed to save profile information",
                ),
            ),
            Message::ImageOnly => (
                error_title(),
                pick("শুধুমাত্র ছবি আপলোড করুন", "Please upload an image file only"),
            ),
            Message::ImageTooLarge => (
                error_title(),
                pick("ছবি ২MB এর কম হতে হবে", "Image size must be under 2MB"),
            ),
            Message::ProvideEmail => (
                error_title(),
                pick("অনুগ্রহ করে ইমেইল দিন", "Please enter your email"),
            ),
            Message::LoginFailed => (
                error_title(),
                pick("লগইন করতে সমস্যা হয়েছে", "Failed to log in"),
            ),
            Message::ResetFailed => (
                error_title(),
                pick(
                    "রিসেট লিংক পাঠাতে সমস্যা হয়েছে",
                    "Failed to send the reset link",
                ),
            ),
            Message::Remote(text) => (error_title(), text.clone()),
        };

        RenderedNotice {
            kind: self.kind,
            title,
            description,
        }
    }
}

/// A notice with its text resolved for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub description: String,
}

/// Sink for notices. Implementations present them however the shell does.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Keeps notices until drained. The HTTP shell hands them to the front-end
/// with each response.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every notice recorded so far.
    pub fn drain(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        tracing::debug!(?notice, "notice recorded");
        match self.notices.lock() {
            Ok(mut guard) => guard.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}
