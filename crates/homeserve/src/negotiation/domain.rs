use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::domain::TierTag;

/// Which side of the negotiation a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Provider,
    /// An employee assigned by the provider.
    Member,
}

impl PartyKind {
    pub const fn label(self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Provider => "provider",
            PartyKind::Member => "member",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(PartyKind::Customer),
            "provider" => Some(PartyKind::Provider),
            "member" | "employee" => Some(PartyKind::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyRef {
    pub id: u64,
    pub name: String,
    pub kind: PartyKind,
}

/// Lifecycle states of a request.
///
/// `pending -> {accepted | declined}`, `accepted -> {on_hold | in_progress |
/// cancelled}`, `on_hold -> {accepted | declined}`, `in_progress ->
/// completed`. `declined`, `cancelled`, and `completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    OnHold,
    InProgress,
    Cancelled,
    Completed,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
            RequestStatus::OnHold => "on_hold",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
        }
    }

    /// The backend is inconsistent about separators; both spellings parse.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "declined" => Some(RequestStatus::Declined),
            "on_hold" => Some(RequestStatus::OnHold),
            "in_progress" => Some(RequestStatus::InProgress),
            "cancelled" | "canceled" => Some(RequestStatus::Cancelled),
            "completed" => Some(RequestStatus::Completed),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Declined | RequestStatus::Cancelled | RequestStatus::Completed
        )
    }

    pub const fn can_accept(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::OnHold)
    }

    pub const fn can_decline(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::OnHold)
    }

    /// Counter-proposals are open on `on_hold`, and on `pending` only when
    /// the tier is schedulable.
    pub fn can_propose(self, tier: &TierTag) -> bool {
        match self {
            RequestStatus::OnHold => true,
            RequestStatus::Pending => *tier == TierTag::Scheduled,
            _ => false,
        }
    }

    pub fn allowed_actions(self, tier: &TierTag) -> Vec<RequestAction> {
        let mut actions = Vec::new();
        if self.can_propose(tier) {
            actions.push(RequestAction::Propose);
        }
        if self.can_accept() {
            actions.push(RequestAction::Accept);
        }
        if self.can_decline() {
            actions.push(RequestAction::Decline);
        }
        actions.push(RequestAction::History);
        actions
    }

    pub const fn headline(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Waiting for the provider to respond",
            RequestStatus::Accepted => "Schedule confirmed",
            RequestStatus::Declined => "This request was declined",
            RequestStatus::OnHold => "A schedule change is awaiting a response",
            RequestStatus::InProgress => "Work is in progress",
            RequestStatus::Cancelled => "This request was cancelled",
            RequestStatus::Completed => "This request is completed",
        }
    }
}

/// Buttons a details view may offer for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Propose,
    Accept,
    Decline,
    History,
}

/// Answer recorded on a handshake entry. Wire values 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeAnswer {
    Pending,
    Accepted,
    Declined,
}

impl HandshakeAnswer {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(HandshakeAnswer::Pending),
            1 => Some(HandshakeAnswer::Accepted),
            2 => Some(HandshakeAnswer::Declined),
            _ => None,
        }
    }

    pub const fn wire_value(self) -> u8 {
        match self {
            HandshakeAnswer::Pending => 0,
            HandshakeAnswer::Accepted => 1,
            HandshakeAnswer::Declined => 2,
        }
    }
}

/// One schedule counter-offer in the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeEntry {
    pub id: u64,
    pub request_id: u64,
    pub sender: u64,
    pub sender_type: PartyKind,
    pub receiver: u64,
    pub receiver_type: PartyKind,
    pub new_schedule: DateTime<Utc>,
    pub answer: HandshakeAnswer,
    pub final_status: Option<RequestStatus>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// The live proposal is the most recent entry by `created_at`, ties broken
/// by the higher id. Array position is never authoritative.
pub fn current_proposal(entries: &[HandshakeEntry]) -> Option<&HandshakeEntry> {
    entries.iter().max_by_key(|entry| (entry.created_at, entry.id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAddress {
    pub full_address: String,
    pub unit_no: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// Fully-parsed request as the negotiation machine sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDetails {
    pub id: u64,
    pub display_id: String,
    pub status: RequestStatus,
    pub customer: PartyRef,
    pub provider: Option<PartyRef>,
    pub member: Option<PartyRef>,
    pub tier_tag: TierTag,
    pub schedule_time: DateTime<Utc>,
    pub address: RequestAddress,
    pub description: String,
    pub files: Vec<Attachment>,
    pub handshakes: Vec<HandshakeEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestDetails {
    pub fn current_proposal(&self) -> Option<&HandshakeEntry> {
        current_proposal(&self.handshakes)
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            request_id: self.id,
            display_id: self.display_id.clone(),
            status: self.status.label(),
            headline: self.status.headline(),
            actions: self.status.allowed_actions(&self.tier_tag),
        }
    }
}

/// Presentation-ready status block returned with every details read.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: u64,
    pub display_id: String,
    pub status: &'static str,
    pub headline: &'static str,
    pub actions: Vec<RequestAction>,
}
