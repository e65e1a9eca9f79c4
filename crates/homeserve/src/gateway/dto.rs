//! Wire representations of backend responses.
//!
//! The backend sends loosely-typed payloads; everything here converts them
//! into the strict domain types with explicit missing/malformed handling.
//! A malformed attachment list degrades to "no attachments" rather than
//! failing the whole read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::booking::domain::TierTag;
use crate::negotiation::domain::{
    Attachment, HandshakeAnswer, HandshakeEntry, PartyKind, PartyRef, RequestAddress,
    RequestDetails, RequestStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyDto {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl PartyDto {
    fn into_domain(self) -> Result<PartyRef, GatewayError> {
        let kind = PartyKind::from_wire(&self.kind)
            .ok_or_else(|| GatewayError::Malformed(format!("unknown party type '{}'", self.kind)))?;
        Ok(PartyRef {
            id: self.id,
            name: self.name,
            kind,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeDto {
    pub id: u64,
    pub request_id: u64,
    pub sender: u64,
    pub sender_type: String,
    pub receiver: u64,
    pub receiver_type: String,
    pub new_schedule: DateTime<Utc>,
    pub is_accepted: u8,
    #[serde(default)]
    pub final_status: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl HandshakeDto {
    pub fn into_domain(self) -> Result<HandshakeEntry, GatewayError> {
        let sender_type = PartyKind::from_wire(&self.sender_type).ok_or_else(|| {
            GatewayError::Malformed(format!("unknown sender type '{}'", self.sender_type))
        })?;
        let receiver_type = PartyKind::from_wire(&self.receiver_type).ok_or_else(|| {
            GatewayError::Malformed(format!("unknown receiver type '{}'", self.receiver_type))
        })?;
        let answer = HandshakeAnswer::from_wire(self.is_accepted).ok_or_else(|| {
            GatewayError::Malformed(format!("unknown handshake answer {}", self.is_accepted))
        })?;
        let final_status = match self.final_status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(RequestStatus::from_wire(raw).ok_or_else(|| {
                GatewayError::Malformed(format!("unknown request status '{raw}'"))
            })?),
        };

        Ok(HandshakeEntry {
            id: self.id,
            request_id: self.request_id,
            sender: self.sender,
            sender_type,
            receiver: self.receiver,
            receiver_type,
            new_schedule: self.new_schedule,
            answer,
            final_status,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDetailsDto {
    pub id: u64,
    /// Human-facing request number, e.g. "REQ-000042".
    pub request_id: String,
    pub status: String,
    pub customer: PartyDto,
    #[serde(default)]
    pub provider: Option<PartyDto>,
    #[serde(default)]
    pub member: Option<PartyDto>,
    pub service_tier_tag: String,
    pub schedule_time: DateTime<Utc>,
    pub full_address: String,
    #[serde(default)]
    pub unit_no: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default)]
    pub description: String,
    /// JSON-encoded attachment list; tolerated when absent or malformed.
    #[serde(default)]
    pub files: Option<String>,
    #[serde(default)]
    pub handshakes: Vec<HandshakeDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestDetailsDto {
    pub fn into_domain(self) -> Result<RequestDetails, GatewayError> {
        let status = RequestStatus::from_wire(&self.status).ok_or_else(|| {
            GatewayError::Malformed(format!("unknown request status '{}'", self.status))
        })?;
        let customer = self.customer.into_domain()?;
        let provider = self.provider.map(PartyDto::into_domain).transpose()?;
        let member = self.member.map(PartyDto::into_domain).transpose()?;
        let handshakes = self
            .handshakes
            .into_iter()
            .map(HandshakeDto::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestDetails {
            id: self.id,
            display_id: self.request_id,
            status,
            customer,
            provider,
            member,
            tier_tag: TierTag::from(self.service_tier_tag),
            schedule_time: self.schedule_time,
            address: RequestAddress {
                full_address: self.full_address,
                unit_no: self.unit_no,
                city: self.city,
                state: self.state,
                zip_code: self.zip_code,
            },
            description: self.description,
            files: parse_attachments(self.files.as_deref()),
            handshakes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Lenient attachment decoding: anything that does not parse as a list of
/// attachments counts as "no attachments".
pub fn parse_attachments(raw: Option<&str>) -> Vec<Attachment> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<Attachment>>(raw).unwrap_or_default()
}
