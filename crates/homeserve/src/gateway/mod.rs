//! Port to the remote backend.
//!
//! Everything the booking wizard and the negotiation machine need from the
//! server goes through [`RemoteGateway`]. The trait is consumed through
//! generics and `Arc` so tests and the demo service can supply in-memory
//! implementations. Time-sensitive reads always carry the caller's UTC
//! offset in minutes.

pub mod dto;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::domain::{Address, AddressPayload, Provider, TierTag};
use crate::negotiation::domain::PartyKind;
use dto::{HandshakeDto, RequestDetailsDto};

/// Failure taxonomy for gateway calls.
///
/// Validation never appears here: required-field checks happen before a call
/// is issued, so only transport and backend outcomes are modeled.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("session is no longer valid")]
    Auth,
    #[error("backend rejected the action: {0}")]
    Conflict(String),
    #[error("malformed payload from backend: {0}")]
    Malformed(String),
}

/// One draft field mirrored to the backend for cross-reload continuity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionField {
    ServiceIds(Vec<u64>),
    ServiceTierId(u32),
    ScheduleTime(DateTime<Utc>),
    AddressId(u64),
}

/// Parameters for a provider search, all taken from the current draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuery {
    pub address_id: u64,
    pub tier: TierTag,
    pub schedule_time: DateTime<Utc>,
}

/// Full payload assembled by the wizard at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestPayload {
    pub service_ids: Vec<u64>,
    pub service_tier_id: u32,
    pub schedule_time: DateTime<Utc>,
    pub address_id: u64,
    /// `None` means auto-match: the backend assigns the best provider.
    pub provider_id: Option<u64>,
    pub contact_person: String,
    pub phone: String,
    pub description: String,
    pub files: Vec<String>,
}

/// Payload for a schedule counter-offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub request_id: u64,
    pub message: String,
    pub purpose_time: DateTime<Utc>,
    pub receiver: u64,
    pub receiver_type: PartyKind,
    pub tz_offset_minutes: i32,
}

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_addresses(&self) -> Result<Vec<Address>, GatewayError>;
    /// Add or update, keyed by presence of `payload.id`.
    async fn save_address(&self, payload: AddressPayload) -> Result<Address, GatewayError>;
    async fn delete_address(&self, id: u64) -> Result<(), GatewayError>;

    async fn search_providers(&self, query: ProviderQuery)
        -> Result<Vec<Provider>, GatewayError>;
    async fn reserve_provider(&self, provider_id: u64) -> Result<(), GatewayError>;

    async fn store_session_field(&self, field: SessionField) -> Result<(), GatewayError>;

    async fn create_request(
        &self,
        payload: CreateRequestPayload,
    ) -> Result<RequestDetailsDto, GatewayError>;
    async fn fetch_request_details(
        &self,
        request_id: u64,
        party: PartyKind,
        tz_offset_minutes: i32,
    ) -> Result<RequestDetailsDto, GatewayError>;

    async fn accept_request(&self, request_id: u64) -> Result<(), GatewayError>;
    async fn decline_request(
        &self,
        request_id: u64,
        reason: String,
        receiver: u64,
    ) -> Result<(), GatewayError>;
    async fn propose_new_time(
        &self,
        proposal: ProposalPayload,
    ) -> Result<HandshakeDto, GatewayError>;
}
