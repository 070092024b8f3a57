//! Farmer profile data model: option sets, the persisted record, the upsert
//! payload and the staged avatar.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notify::Language;

/// Declares a closed option set with its wire value and Bangla/English labels.
macro_rules! option_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $value:literal, $bn:literal, $en:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant,)+
        }

        impl $name {
            /// Every option, in display order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Value stored in the profile table.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value,)+
                }
            }

            /// Label shown next to the option.
            pub fn label(&self, lang: Language) -> &'static str {
                match (*self, lang) {
                    $(
                        (Self::$variant, Language::Bn) => $bn,
                        (Self::$variant, Language::En) => $en,
                    )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

option_set! {
    /// What the farmer produces. Multi-select.
    FarmerType {
        Crop => "crop", "ফসল", "Crops";
        Cattle => "cattle", "গবাদিপশু", "Cattle";
        Poultry => "poultry", "পোল্ট্রি", "Poultry";
        Mixed => "mixed", "মিশ্র", "Mixed";
    }
}

option_set! {
    /// Total land or farm size, in bigha.
    LandSize {
        Under1 => "under_1", "১ বিঘার কম", "Under 1 bigha";
        OneToFive => "1_to_5", "১–৫ বিঘা", "1-5 bigha";
        FiveToTwenty => "5_to_20", "৫–২০ বিঘা", "5-20 bigha";
        Over20 => "over_20", "২০+ বিঘা", "20+ bigha";
        NoLand => "no_land", "শুধু খামার (জমি নেই)", "Farm only (no land)";
    }
}

option_set! {
    LandOwnership {
        Own => "own", "নিজের", "Own";
        Lease => "lease", "লিজ", "Lease";
        Mixed => "mixed", "মিশ্র", "Mixed";
    }
}

option_set! {
    IrrigationSource {
        Tubewell => "tubewell", "টিউবওয়েল", "Tube well";
        Pond => "pond", "পুকুর/খাল", "Pond/Canal";
        Rain => "rain", "বৃষ্টি নির্ভর", "Rain-fed";
        Unknown => "unknown", "জানি না", "Not sure";
    }
}

option_set! {
    FarmingMethod {
        Organic => "organic", "জৈব", "Organic";
        Chemical => "chemical", "কেমিক্যাল", "Chemical";
        Mixed => "mixed", "মিশ্র", "Mixed";
    }
}

option_set! {
    /// Biggest problems the farmer faces. Multi-select.
    Challenge {
        LowYield => "low_yield", "কম ফলন", "Low yield";
        Disease => "disease", "রোগ", "Disease";
        MarketPrice => "market_price", "বাজার মূল্য", "Market price";
        HighCost => "high_cost", "বেশি খরচ", "High costs";
        Water => "water", "পানি সমস্যা", "Water shortage";
        LivestockDisease => "livestock_disease", "পশুর অসুখ", "Livestock disease";
    }
}

/// Toggle `value` in an insertion-ordered multi-select: remove it if present,
/// append it otherwise.
pub fn toggle<T: PartialEq>(selected: &mut Vec<T>, value: T) {
    if let Some(pos) = selected.iter().position(|v| *v == value) {
        selected.remove(pos);
    } else {
        selected.push(value);
    }
}

/// Profile row as read back from the backend.
///
/// Rows may be created by the backend with most columns empty, so every
/// answer is optional here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub upazila: Option<String>,
    #[serde(default)]
    pub farmer_type: Option<Vec<FarmerType>>,
    #[serde(default)]
    pub land_size_category: Option<LandSize>,
    #[serde(default)]
    pub land_ownership: Option<LandOwnership>,
    #[serde(default)]
    pub irrigation_source: Option<IrrigationSource>,
    #[serde(default)]
    pub farming_method: Option<FarmingMethod>,
    #[serde(default)]
    pub biggest_challenges: Option<Vec<Challenge>>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Columns written when onboarding finishes.
///
/// `avatar_url` is omitted from the payload entirely when absent so that an
/// existing picture is never overwritten with null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub district: String,
    pub upazila: String,
    pub farmer_type: Vec<FarmerType>,
    pub land_size_category: LandSize,
    pub land_ownership: LandOwnership,
    pub irrigation_source: IrrigationSource,
    pub farming_method: FarmingMethod,
    pub biggest_challenges: Vec<Challenge>,
    pub onboarding_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A local image picked as profile picture, held until onboarding finishes.
#[derive(Clone, PartialEq, Eq)]
pub struct AvatarFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for AvatarFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarFile")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl AvatarFile {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Extension used for the stored object: the file name's last
    /// dot-segment, else the MIME subtype, else `img`. Only plain ASCII
    /// alphanumeric extensions are taken, so the object path cannot escape
    /// the user's folder.
    pub fn extension(&self) -> &str {
        fn plain(ext: &str) -> Option<&str> {
            (!ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric())).then_some(ext)
        }

        self.file_name
            .rsplit_once('.')
            .and_then(|(_, ext)| plain(ext))
            .or_else(|| self.mime.split_once('/').and_then(|(_, sub)| plain(sub)))
            .unwrap_or("img")
    }

    /// `data:` URL suitable for an `<img>` preview.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}
