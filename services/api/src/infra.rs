use async_trait::async_trait;
use chrono::Utc;
use homeserve::booking::{Address, AddressPayload, Provider};
use homeserve::gateway::dto::{HandshakeDto, PartyDto, RequestDetailsDto};
use homeserve::gateway::{
    CreateRequestPayload, GatewayError, ProposalPayload, ProviderQuery, RemoteGateway,
    SessionField,
};
use homeserve::negotiation::{PartyKind, RequestStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Demo/test stand-in for the real backend: one customer, a seeded provider
/// pool, and request records that follow the negotiation transition rules.
pub(crate) struct InMemoryGateway {
    inner: Mutex<GatewayState>,
}

struct GatewayState {
    addresses: Vec<Address>,
    providers: Vec<Provider>,
    requests: HashMap<u64, RequestDetailsDto>,
    session_fields: Vec<SessionField>,
    next_address_id: u64,
    next_request_id: u64,
    next_handshake_id: u64,
}

const CUSTOMER_ID: u64 = 7;
const CUSTOMER_NAME: &str = "Dana Whitfield";

fn seed_providers() -> Vec<Provider> {
    vec![
        Provider {
            id: 41,
            name: "Lakeside Plumbing".to_string(),
            rating_avg: 4.8,
            review_count: 212,
            distance_miles: 3.1,
            is_available: true,
            service_radius: 25.0,
            image_url: None,
        },
        Provider {
            id: 42,
            name: "Metro Electric".to_string(),
            rating_avg: 4.5,
            review_count: 96,
            distance_miles: 6.4,
            is_available: true,
            service_radius: 40.0,
            image_url: None,
        },
        Provider {
            id: 43,
            name: "North Dallas HVAC".to_string(),
            rating_avg: 4.2,
            review_count: 57,
            distance_miles: 9.8,
            is_available: false,
            service_radius: 30.0,
            image_url: None,
        },
    ]
}

impl InMemoryGateway {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(GatewayState {
                addresses: Vec::new(),
                providers: seed_providers(),
                requests: HashMap::new(),
                session_fields: Vec::new(),
                next_address_id: 100,
                next_request_id: 900,
                next_handshake_id: 1,
            }),
        }
    }

    pub(crate) fn session_field_count(&self) -> usize {
        self.inner
            .lock()
            .expect("gateway mutex poisoned")
            .session_fields
            .len()
    }

    fn status_of(dto: &RequestDetailsDto) -> Result<RequestStatus, GatewayError> {
        RequestStatus::from_wire(&dto.status)
            .ok_or_else(|| GatewayError::Malformed(format!("bad stored status '{}'", dto.status)))
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn list_addresses(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(self.inner.lock().expect("gateway mutex poisoned").addresses.clone())
    }

    async fn save_address(&self, payload: AddressPayload) -> Result<Address, GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        let id = payload.id.unwrap_or_else(|| {
            let id = state.next_address_id;
            state.next_address_id += 1;
            id
        });
        let address = Address {
            id,
            owner_id: CUSTOMER_ID,
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
        state.addresses.retain(|existing| existing.id != id);
        state.addresses.push(address.clone());
        Ok(address)
    }

    async fn delete_address(&self, id: u64) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        state.addresses.retain(|existing| existing.id != id);
        Ok(())
    }

    async fn search_providers(&self, _query: ProviderQuery) -> Result<Vec<Provider>, GatewayError> {
        let state = self.inner.lock().expect("gateway mutex poisoned");
        Ok(state
            .providers
            .iter()
            .filter(|provider| provider.is_available)
            .cloned()
            .collect())
    }

    async fn reserve_provider(&self, provider_id: u64) -> Result<(), GatewayError> {
        let state = self.inner.lock().expect("gateway mutex poisoned");
        let reservable = state
            .providers
            .iter()
            .any(|provider| provider.id == provider_id && provider.is_available);
        if reservable {
            Ok(())
        } else {
            Err(GatewayError::Conflict(format!(
                "provider {provider_id} is not available"
            )))
        }
    }

    async fn store_session_field(&self, field: SessionField) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        state.session_fields.push(field);
        Ok(())
    }

    async fn create_request(
        &self,
        payload: CreateRequestPayload,
    ) -> Result<RequestDetailsDto, GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");

        let provider = match payload.provider_id {
            Some(id) => state.providers.iter().find(|provider| provider.id == id),
            // Auto-match: the backend picks the best available provider.
            None => state.providers.iter().find(|provider| provider.is_available),
        }
        .cloned();

        let address = state
            .addresses
            .iter()
            .find(|address| address.id == payload.address_id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Conflict(format!("address {} does not exist", payload.address_id))
            })?;

        let id = state.next_request_id;
        state.next_request_id += 1;
        let now = Utc::now();

        let dto = RequestDetailsDto {
            id,
            request_id: format!("REQ-{id:06}"),
            status: "pending".to_string(),
            customer: PartyDto {
                id: CUSTOMER_ID,
                name: CUSTOMER_NAME.to_string(),
                kind: "customer".to_string(),
            },
            provider: provider.map(|provider| PartyDto {
                id: provider.id,
                name: provider.name,
                kind: "provider".to_string(),
            }),
            member: None,
            service_tier_tag: if payload.service_tier_id == 1 {
                "Emergency".to_string()
            } else {
                "Scheduled".to_string()
            },
            schedule_time: payload.schedule_time,
            full_address: address.full_address,
            unit_no: address.unit_no,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            description: payload.description,
            files: serde_json::to_string(
                &payload
                    .files
                    .iter()
                    .map(|url| serde_json::json!({ "name": url, "url": url }))
                    .collect::<Vec<_>>(),
            )
            .ok(),
            handshakes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        state.requests.insert(id, dto.clone());
        Ok(dto)
    }

    async fn fetch_request_details(
        &self,
        request_id: u64,
        _party: PartyKind,
        _tz_offset_minutes: i32,
    ) -> Result<RequestDetailsDto, GatewayError> {
        let state = self.inner.lock().expect("gateway mutex poisoned");
        state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| GatewayError::Network(format!("request {request_id} not found")))
    }

    async fn accept_request(&self, request_id: u64) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        let dto = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| GatewayError::Network(format!("request {request_id} not found")))?;
        let status = Self::status_of(dto)?;
        if !status.can_accept() {
            return Err(GatewayError::Conflict(format!(
                "request is already {}",
                status.label()
            )));
        }
        dto.status = "accepted".to_string();
        dto.updated_at = Utc::now();
        Ok(())
    }

    async fn decline_request(
        &self,
        request_id: u64,
        _reason: String,
        _receiver: u64,
    ) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        let dto = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| GatewayError::Network(format!("request {request_id} not found")))?;
        let status = Self::status_of(dto)?;
        if !status.can_decline() {
            return Err(GatewayError::Conflict(format!(
                "request is already {}",
                status.label()
            )));
        }
        dto.status = "declined".to_string();
        dto.updated_at = Utc::now();
        Ok(())
    }

    async fn propose_new_time(
        &self,
        proposal: ProposalPayload,
    ) -> Result<HandshakeDto, GatewayError> {
        let mut state = self.inner.lock().expect("gateway mutex poisoned");
        let handshake_id = state.next_handshake_id;
        state.next_handshake_id += 1;

        let dto = state
            .requests
            .get_mut(&proposal.request_id)
            .ok_or_else(|| {
                GatewayError::Network(format!("request {} not found", proposal.request_id))
            })?;
        let status = Self::status_of(dto)?;
        if status.is_terminal() {
            return Err(GatewayError::Conflict(format!(
                "request is already {}",
                status.label()
            )));
        }

        let entry = HandshakeDto {
            id: handshake_id,
            request_id: proposal.request_id,
            sender: CUSTOMER_ID,
            sender_type: "customer".to_string(),
            receiver: proposal.receiver,
            receiver_type: proposal.receiver_type.label().to_string(),
            new_schedule: proposal.purpose_time,
            is_accepted: 0,
            final_status: None,
            notes: proposal.message,
            created_at: Utc::now(),
        };
        dto.handshakes.push(entry.clone());
        dto.status = "on hold".to_string();
        dto.updated_at = entry.created_at;
        Ok(entry)
    }
}
