//! Scripted in-memory gateway shared by the unit test modules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::booking::domain::{Address, AddressPayload, Provider};
use crate::gateway::dto::{HandshakeDto, PartyDto, RequestDetailsDto};
use crate::gateway::{
    CreateRequestPayload, GatewayError, ProposalPayload, ProviderQuery, RemoteGateway,
    SessionField,
};
use crate::negotiation::domain::PartyKind;

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    pub fail_session_writes: AtomicBool,
    pub session_expired: AtomicBool,
    pub fail_reserve: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_save: AtomicBool,
    pub conflict_on_accept: AtomicBool,
    pub conflict_on_decline: AtomicBool,
    pub next_address_id: AtomicU64,
    pub addresses: Mutex<Vec<Address>>,
    pub providers: Mutex<Vec<Provider>>,
    pub session_writes: Mutex<Vec<SessionField>>,
    pub reserved: Mutex<Vec<u64>>,
    pub created: Mutex<Vec<CreateRequestPayload>>,
    pub proposals: Mutex<Vec<ProposalPayload>>,
    pub declines: Mutex<Vec<(u64, String, u64)>>,
    pub accepts: Mutex<Vec<u64>>,
    pub details: Mutex<Option<RequestDetailsDto>>,
    pub detail_fetches: AtomicU64,
}

impl ScriptedGateway {
    pub fn shared() -> Arc<Self> {
        let gateway = Self::default();
        gateway.next_address_id.store(100, Ordering::Relaxed);
        Arc::new(gateway)
    }

    pub fn seed_providers(&self, providers: Vec<Provider>) {
        *self.providers.lock().expect("providers mutex poisoned") = providers;
    }

    pub fn seed_details(&self, dto: RequestDetailsDto) {
        *self.details.lock().expect("details mutex poisoned") = Some(dto);
    }

    pub fn set_detail_status(&self, status: &str) {
        let mut guard = self.details.lock().expect("details mutex poisoned");
        if let Some(dto) = guard.as_mut() {
            dto.status = status.to_string();
        }
    }
}

pub(crate) fn sample_provider(id: u64, name: &str) -> Provider {
    Provider {
        id,
        name: name.to_string(),
        rating_avg: 4.6,
        review_count: 12,
        distance_miles: 3.2,
        is_available: true,
        service_radius: 25.0,
        image_url: None,
    }
}

pub(crate) fn sample_details_dto(id: u64, status: &str) -> RequestDetailsDto {
    let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
    RequestDetailsDto {
        id,
        request_id: format!("REQ-{id:06}"),
        status: status.to_string(),
        customer: PartyDto {
            id: 7,
            name: "Dana Whitfield".to_string(),
            kind: "customer".to_string(),
        },
        provider: Some(PartyDto {
            id: 41,
            name: "Lakeside Plumbing".to_string(),
            kind: "provider".to_string(),
        }),
        member: None,
        service_tier_tag: "Scheduled".to_string(),
        schedule_time: now + chrono::Duration::hours(30),
        full_address: "123 Main St".to_string(),
        unit_no: None,
        city: "Dallas".to_string(),
        state: "TX".to_string(),
        zip_code: "75201".to_string(),
        description: "Kitchen sink leak".to_string(),
        files: None,
        handshakes: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    async fn list_addresses(&self) -> Result<Vec<Address>, GatewayError> {
        if self.fail_list.load(Ordering::Relaxed) {
            return Err(GatewayError::Network("list unavailable".into()));
        }
        Ok(self.addresses.lock().expect("address mutex poisoned").clone())
    }

    async fn save_address(&self, payload: AddressPayload) -> Result<Address, GatewayError> {
        if self.fail_save.load(Ordering::Relaxed) {
            return Err(GatewayError::Network("save unavailable".into()));
        }
        let mut guard = self.addresses.lock().expect("address mutex poisoned");
        let id = payload
            .id
            .unwrap_or_else(|| self.next_address_id.fetch_add(1, Ordering::Relaxed));
        let address = Address {
            id,
            owner_id: 7,
            kind: payload.kind,
            full_address: payload.full_address,
            unit_no: payload.unit_no,
            city: payload.city,
            state: payload.state,
            country: payload.country,
            zip_code: payload.zip_code,
            latitude: payload.latitude,
            longitude: payload.longitude,
        };
        guard.retain(|existing| existing.id != id);
        guard.push(address.clone());
        Ok(address)
    }

    async fn delete_address(&self, id: u64) -> Result<(), GatewayError> {
        let mut guard = self.addresses.lock().expect("address mutex poisoned");
        guard.retain(|existing| existing.id != id);
        Ok(())
    }

    async fn search_providers(&self, _query: ProviderQuery) -> Result<Vec<Provider>, GatewayError> {
        Ok(self.providers.lock().expect("providers mutex poisoned").clone())
    }

    async fn reserve_provider(&self, provider_id: u64) -> Result<(), GatewayError> {
        if self.fail_reserve.load(Ordering::Relaxed) {
            return Err(GatewayError::Network("reserve unavailable".into()));
        }
        self.reserved
            .lock()
            .expect("reserve mutex poisoned")
            .push(provider_id);
        Ok(())
    }

    async fn store_session_field(&self, field: SessionField) -> Result<(), GatewayError> {
        if self.session_expired.load(Ordering::Relaxed) {
            return Err(GatewayError::Auth);
        }
        if self.fail_session_writes.load(Ordering::Relaxed) {
            return Err(GatewayError::Network("mirror down".into()));
        }
        self.session_writes
            .lock()
            .expect("session mutex poisoned")
            .push(field);
        Ok(())
    }

    async fn create_request(
        &self,
        payload: CreateRequestPayload,
    ) -> Result<RequestDetailsDto, GatewayError> {
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(GatewayError::Network("create unavailable".into()));
        }
        self.created
            .lock()
            .expect("create mutex poisoned")
            .push(payload);
        let dto = sample_details_dto(900, "pending");
        self.seed_details(dto.clone());
        Ok(dto)
    }

    async fn fetch_request_details(
        &self,
        request_id: u64,
        _party: PartyKind,
        _tz_offset_minutes: i32,
    ) -> Result<RequestDetailsDto, GatewayError> {
        self.detail_fetches.fetch_add(1, Ordering::Relaxed);
        let guard = self.details.lock().expect("details mutex poisoned");
        match guard.as_ref() {
            Some(dto) if dto.id == request_id => Ok(dto.clone()),
            _ => Err(GatewayError::Network("no such request".into())),
        }
    }

    async fn accept_request(&self, request_id: u64) -> Result<(), GatewayError> {
        if self.conflict_on_accept.load(Ordering::Relaxed) {
            return Err(GatewayError::Conflict("already handled".into()));
        }
        self.accepts
            .lock()
            .expect("accept mutex poisoned")
            .push(request_id);
        self.set_detail_status("accepted");
        Ok(())
    }

    async fn decline_request(
        &self,
        request_id: u64,
        reason: String,
        receiver: u64,
    ) -> Result<(), GatewayError> {
        if self.conflict_on_decline.load(Ordering::Relaxed) {
            return Err(GatewayError::Conflict("already handled".into()));
        }
        self.declines
            .lock()
            .expect("decline mutex poisoned")
            .push((request_id, reason, receiver));
        self.set_detail_status("declined");
        Ok(())
    }

    async fn propose_new_time(
        &self,
        proposal: ProposalPayload,
    ) -> Result<HandshakeDto, GatewayError> {
        let mut details = self.details.lock().expect("details mutex poisoned");
        let created_at = Utc::now();
        let entry = HandshakeDto {
            id: 1 + details
                .as_ref()
                .map(|dto| dto.handshakes.len() as u64)
                .unwrap_or(0),
            request_id: proposal.request_id,
            sender: 7,
            sender_type: "customer".to_string(),
            receiver: proposal.receiver,
            receiver_type: "provider".to_string(),
            new_schedule: proposal.purpose_time,
            is_accepted: 0,
            final_status: None,
            notes: proposal.message.clone(),
            created_at,
        };
        if let Some(dto) = details.as_mut() {
            dto.handshakes.push(entry.clone());
            dto.status = "on hold".to_string();
        }
        drop(details);
        self.proposals
            .lock()
            .expect("proposal mutex poisoned")
            .push(proposal);
        Ok(entry)
    }
}
