use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a saved address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    #[default]
    Home,
    Work,
    Other,
}

impl AddressKind {
    pub const fn label(self) -> &'static str {
        match self {
            AddressKind::Home => "home",
            AddressKind::Work => "work",
            AddressKind::Other => "other",
        }
    }
}

/// A customer's saved service address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: u64,
    pub owner_id: u64,
    #[serde(rename = "type")]
    pub kind: AddressKind,
    pub full_address: String,
    #[serde(default)]
    pub unit_no: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Input for add/update; the backend keys on the presence of `id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressPayload {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, rename = "type")]
    pub kind: AddressKind,
    pub full_address: String,
    #[serde(default)]
    pub unit_no: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub country: String,
    pub zip_code: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Urgency class of a service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TierTag {
    Emergency,
    Scheduled,
    /// Tags this client version does not know about still round-trip.
    Other(String),
}

impl TierTag {
    pub fn label(&self) -> &str {
        match self {
            TierTag::Emergency => "Emergency",
            TierTag::Scheduled => "Scheduled",
            TierTag::Other(tag) => tag,
        }
    }
}

impl From<String> for TierTag {
    fn from(value: String) -> Self {
        match value.trim() {
            "Emergency" | "emergency" => TierTag::Emergency,
            "Scheduled" | "scheduled" => TierTag::Scheduled,
            _ => TierTag::Other(value),
        }
    }
}

impl From<TierTag> for String {
    fn from(value: TierTag) -> Self {
        value.label().to_string()
    }
}

/// Immutable tier reference data fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTier {
    pub tier_id: u32,
    pub tag: TierTag,
    /// `-1` is the "1-4 hrs" sentinel.
    pub duration_hours: i8,
    pub is_schedulable: bool,
    pub payable_amount: u32,
    pub refund_amount: u32,
}

impl ServiceTier {
    pub fn duration_label(&self) -> String {
        if self.duration_hours < 0 {
            "1-4 hrs".to_string()
        } else {
            format!("{} hrs", self.duration_hours)
        }
    }
}

/// Read-only provider projection returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: u64,
    pub name: String,
    pub rating_avg: f32,
    pub review_count: u32,
    pub distance_miles: f32,
    pub is_available: bool,
    pub service_radius: f32,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// How the submission names its provider: an explicit reservation or
/// backend auto-match. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
    Manual(u64),
    AutoMatch,
}

impl ProviderChoice {
    pub fn provider_id(self) -> Option<u64> {
        match self {
            ProviderChoice::Manual(id) => Some(id),
            ProviderChoice::AutoMatch => None,
        }
    }
}

/// In-progress booking selection for one wizard session.
///
/// A provider is only valid for the address it was matched against, so any
/// address change clears the provider choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookingDraft {
    pub selected_service_ids: BTreeSet<u64>,
    pub selected_tier: Option<ServiceTier>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub selected_address_id: Option<u64>,
    pub provider_choice: Option<ProviderChoice>,
}

impl BookingDraft {
    pub fn select_address(&mut self, address_id: u64) {
        if self.selected_address_id != Some(address_id) {
            self.provider_choice = None;
        }
        self.selected_address_id = Some(address_id);
    }

    pub fn clear_address(&mut self) {
        self.selected_address_id = None;
        self.provider_choice = None;
    }

    pub fn tier_tag(&self) -> Option<&TierTag> {
        self.selected_tier.as_ref().map(|tier| &tier.tag)
    }

    pub fn selected_provider_id(&self) -> Option<u64> {
        self.provider_choice.and_then(ProviderChoice::provider_id)
    }
}
