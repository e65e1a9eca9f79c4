use crate::infra::{AppState, InMemoryGateway};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use homeserve::booking::{
    Address, AddressPayload, AddressSaved, BookingWizard, ContactDetails, DraftSummary,
    MatchState, Provider, ServiceTier, WizardStep,
};
use homeserve::error::AppError;
use homeserve::negotiation::{
    PartyKind, RequestDetails, RequestEvent, RequestNegotiationMachine, RequestStatusView,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

type SharedMachine = Arc<Mutex<RequestNegotiationMachine<InMemoryGateway>>>;

/// One demo booking session plus the shared backend stand-in. Negotiation
/// machines are held per request id so their in-flight guard and cached
/// details span successive calls.
#[derive(Clone)]
pub(crate) struct ApiContext {
    pub(crate) gateway: Arc<InMemoryGateway>,
    pub(crate) wizard: Arc<Mutex<BookingWizard<InMemoryGateway>>>,
    pub(crate) negotiations: Arc<Mutex<HashMap<u64, SharedMachine>>>,
}

pub(crate) fn api_router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/v1/booking/summary", get(summary_endpoint))
        .route("/api/v1/booking/services", post(select_services_endpoint))
        .route("/api/v1/booking/tier", post(choose_tier_endpoint))
        .route("/api/v1/booking/schedule", post(pick_schedule_endpoint))
        .route("/api/v1/booking/emergency", post(emergency_endpoint))
        .route(
            "/api/v1/booking/addresses",
            get(list_addresses_endpoint).post(save_address_endpoint),
        )
        .route(
            "/api/v1/booking/addresses/:address_id",
            delete(delete_address_endpoint),
        )
        .route(
            "/api/v1/booking/addresses/:address_id/select",
            post(select_address_endpoint),
        )
        .route(
            "/api/v1/booking/providers/search",
            post(search_providers_endpoint),
        )
        .route(
            "/api/v1/booking/providers/:provider_id/reserve",
            post(reserve_provider_endpoint),
        )
        .route("/api/v1/booking/providers/auto", post(auto_match_endpoint))
        .route("/api/v1/booking/contact", post(contact_endpoint))
        .route("/api/v1/booking/submit", post(submit_endpoint))
        .route("/api/v1/booking/back", post(back_endpoint))
        .route("/api/v1/requests/:request_id", get(request_details_endpoint))
        .route(
            "/api/v1/requests/:request_id/accept",
            post(accept_request_endpoint),
        )
        .route(
            "/api/v1/requests/:request_id/decline",
            post(decline_request_endpoint),
        )
        .route(
            "/api/v1/requests/:request_id/propose",
            post(propose_time_endpoint),
        )
        .route(
            "/api/v1/requests/:request_id/events",
            post(request_event_endpoint),
        )
        .with_state(context)
}

pub(crate) fn with_health_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Serialize)]
pub(crate) struct StepResponse {
    pub(crate) step: WizardStep,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectServicesRequest {
    pub(crate) service_ids: BTreeSet<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PickScheduleRequest {
    pub(crate) schedule_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmergencyDecisionRequest {
    pub(crate) confirm: bool,
    #[serde(default)]
    pub(crate) emergency_tier: Option<ServiceTier>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchProvidersRequest {
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactRequest {
    pub(crate) contact_person: String,
    pub(crate) phone: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestResponse {
    pub(crate) request: RequestDetails,
    pub(crate) status: RequestStatusView,
}

impl RequestResponse {
    fn from_details(details: &RequestDetails) -> Self {
        Self {
            status: details.status_view(),
            request: details.clone(),
        }
    }
}

/// Offset is always computed client-side; the demo endpoints take it as a
/// query parameter and default to UTC.
#[derive(Debug, Deserialize)]
pub(crate) struct TzQuery {
    #[serde(default)]
    pub(crate) tz: i32,
}

pub(crate) async fn summary_endpoint(
    State(context): State<ApiContext>,
) -> Json<DraftSummary> {
    let wizard = context.wizard.lock().await;
    Json(wizard.summary())
}

pub(crate) async fn select_services_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<SelectServicesRequest>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.select_services(payload.service_ids).await?;
    Ok(Json(StepResponse { step: wizard.step() }))
}

pub(crate) async fn choose_tier_endpoint(
    State(context): State<ApiContext>,
    Json(tier): Json<ServiceTier>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.choose_tier(tier).await?;
    Ok(Json(StepResponse { step: wizard.step() }))
}

pub(crate) async fn pick_schedule_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<PickScheduleRequest>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    let step = wizard
        .pick_schedule_time(payload.schedule_time, Utc::now())
        .await?;
    Ok(Json(StepResponse { step }))
}

pub(crate) async fn emergency_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<EmergencyDecisionRequest>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    let step = if payload.confirm {
        let tier = payload
            .emergency_tier
            .ok_or(homeserve::booking::BookingError::StepIncomplete {
                missing: "emergency tier",
            })?;
        wizard.confirm_emergency(tier).await?
    } else {
        wizard.decline_emergency()?
    };
    Ok(Json(StepResponse { step }))
}

pub(crate) async fn list_addresses_endpoint(
    State(context): State<ApiContext>,
) -> Result<Json<Vec<Address>>, AppError> {
    let mut wizard = context.wizard.lock().await;
    let addresses = wizard.refresh_addresses().await?;
    Ok(Json(addresses.to_vec()))
}

pub(crate) async fn save_address_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<AddressPayload>,
) -> Result<Json<AddressSaved>, AppError> {
    let mut wizard = context.wizard.lock().await;
    let saved = wizard.save_address(payload).await?;
    Ok(Json(saved))
}

pub(crate) async fn delete_address_endpoint(
    State(context): State<ApiContext>,
    Path(address_id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.remove_address(address_id).await?;
    Ok(Json(json!({ "deleted": address_id })))
}

pub(crate) async fn select_address_endpoint(
    State(context): State<ApiContext>,
    Path(address_id): Path<u64>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.choose_address(address_id).await?;
    Ok(Json(StepResponse { step: wizard.step() }))
}

pub(crate) async fn search_providers_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<SearchProvidersRequest>,
) -> Result<Json<Vec<Provider>>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.search_providers().await?;

    let providers = match payload.name.as_deref() {
        Some(needle) => wizard
            .matcher()
            .filter_by_name(needle)
            .into_iter()
            .cloned()
            .collect(),
        None => match wizard.matcher().state() {
            MatchState::Populated(providers) => providers.clone(),
            _ => Vec::new(),
        },
    };
    Ok(Json(providers))
}

pub(crate) async fn reserve_provider_endpoint(
    State(context): State<ApiContext>,
    Path(provider_id): Path<u64>,
) -> Result<Json<DraftSummary>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.reserve_provider(provider_id).await?;
    Ok(Json(wizard.summary()))
}

pub(crate) async fn auto_match_endpoint(
    State(context): State<ApiContext>,
) -> Result<Json<DraftSummary>, AppError> {
    let mut wizard = context.wizard.lock().await;
    wizard.choose_auto_match()?;
    Ok(Json(wizard.summary()))
}

pub(crate) async fn contact_endpoint(
    State(context): State<ApiContext>,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<StepResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    if wizard.step() == WizardStep::ProviderSelection {
        wizard.proceed_to_contact()?;
    }
    wizard.set_contact(ContactDetails {
        contact_person: payload.contact_person,
        phone: payload.phone,
        description: payload.description,
        files: payload.files,
    })?;
    Ok(Json(StepResponse { step: wizard.step() }))
}

pub(crate) async fn submit_endpoint(
    State(context): State<ApiContext>,
) -> Result<Json<RequestResponse>, AppError> {
    let mut wizard = context.wizard.lock().await;
    let details = wizard.submit().await?;
    Ok(Json(RequestResponse::from_details(&details)))
}

pub(crate) async fn back_endpoint(
    State(context): State<ApiContext>,
) -> Json<StepResponse> {
    let mut wizard = context.wizard.lock().await;
    Json(StepResponse { step: wizard.back() })
}

async fn machine_for(context: &ApiContext, request_id: u64) -> SharedMachine {
    let mut machines = context.negotiations.lock().await;
    machines
        .entry(request_id)
        .or_insert_with(|| {
            Arc::new(Mutex::new(RequestNegotiationMachine::new(
                context.gateway.clone(),
                request_id,
                PartyKind::Customer,
            )))
        })
        .clone()
}

pub(crate) async fn request_details_endpoint(
    State(context): State<ApiContext>,
    Path(request_id): Path<u64>,
    Query(query): Query<TzQuery>,
) -> Result<Json<RequestResponse>, AppError> {
    let machine = machine_for(&context, request_id).await;
    let mut machine = machine.lock().await;
    let details = machine.fetch_details(query.tz).await?;
    Ok(Json(RequestResponse::from_details(details)))
}

pub(crate) async fn accept_request_endpoint(
    State(context): State<ApiContext>,
    Path(request_id): Path<u64>,
    Query(query): Query<TzQuery>,
) -> Result<Json<RequestResponse>, AppError> {
    let machine = machine_for(&context, request_id).await;
    let mut machine = machine.lock().await;
    machine.fetch_details(query.tz).await?;
    let details = machine.accept(query.tz).await?;
    Ok(Json(RequestResponse::from_details(details)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeclineRequest {
    pub(crate) reason: String,
    pub(crate) receiver: u64,
}

pub(crate) async fn decline_request_endpoint(
    State(context): State<ApiContext>,
    Path(request_id): Path<u64>,
    Query(query): Query<TzQuery>,
    Json(payload): Json<DeclineRequest>,
) -> Result<Json<RequestResponse>, AppError> {
    let machine = machine_for(&context, request_id).await;
    let mut machine = machine.lock().await;
    machine.fetch_details(query.tz).await?;
    let details = machine
        .decline(&payload.reason, payload.receiver, query.tz)
        .await?;
    Ok(Json(RequestResponse::from_details(details)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposeRequest {
    pub(crate) message: String,
    pub(crate) purpose_time: DateTime<Utc>,
    pub(crate) receiver: u64,
}

pub(crate) async fn propose_time_endpoint(
    State(context): State<ApiContext>,
    Path(request_id): Path<u64>,
    Query(query): Query<TzQuery>,
    Json(payload): Json<ProposeRequest>,
) -> Result<Json<RequestResponse>, AppError> {
    let machine = machine_for(&context, request_id).await;
    let mut machine = machine.lock().await;
    machine.fetch_details(query.tz).await?;
    let details = machine
        .propose_new_time(
            &payload.message,
            payload.purpose_time,
            payload.receiver,
            PartyKind::Provider,
            query.tz,
        )
        .await?;
    Ok(Json(RequestResponse::from_details(details)))
}

pub(crate) async fn request_event_endpoint(
    State(context): State<ApiContext>,
    Path(request_id): Path<u64>,
    Query(query): Query<TzQuery>,
    Json(event): Json<RequestEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    let machine = machine_for(&context, request_id).await;
    let mut machine = machine.lock().await;
    let refetched = machine.handle_event(event, query.tz).await?;
    Ok(Json(json!({ "refetched": refetched })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use homeserve::booking::TierTag;
    use homeserve::config::BookingConfig;
    use homeserve::negotiation::RequestAction;

    fn context() -> ApiContext {
        let gateway = Arc::new(InMemoryGateway::new());
        let wizard = BookingWizard::new(gateway.clone(), &BookingConfig::default());
        ApiContext {
            gateway,
            wizard: Arc::new(Mutex::new(wizard)),
            negotiations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn scheduled_tier() -> ServiceTier {
        ServiceTier {
            tier_id: 2,
            tag: TierTag::Scheduled,
            duration_hours: -1,
            is_schedulable: true,
            payable_amount: 4900,
            refund_amount: 2000,
        }
    }

    fn address_payload() -> AddressPayload {
        AddressPayload {
            id: None,
            full_address: "123 Main St".to_string(),
            city: "Dallas".to_string(),
            state: "TX".to_string(),
            country: "US".to_string(),
            zip_code: "75201".to_string(),
            ..AddressPayload::default()
        }
    }

    async fn submit_booking(context: &ApiContext) -> RequestResponse {
        select_services_endpoint(
            State(context.clone()),
            Json(SelectServicesRequest {
                service_ids: BTreeSet::from([3]),
            }),
        )
        .await
        .expect("services");
        choose_tier_endpoint(State(context.clone()), Json(scheduled_tier()))
            .await
            .expect("tier");
        pick_schedule_endpoint(
            State(context.clone()),
            Json(PickScheduleRequest {
                schedule_time: Utc::now() + Duration::hours(30),
            }),
        )
        .await
        .expect("schedule");
        let Json(saved) = save_address_endpoint(State(context.clone()), Json(address_payload()))
            .await
            .expect("address");
        select_address_endpoint(State(context.clone()), Path(saved.address.id))
            .await
            .expect("select");
        auto_match_endpoint(State(context.clone())).await.expect("auto");
        contact_endpoint(
            State(context.clone()),
            Json(ContactRequest {
                contact_person: "Dana Whitfield".to_string(),
                phone: "214-555-0188".to_string(),
                description: "Kitchen sink leak".to_string(),
                files: Vec::new(),
            }),
        )
        .await
        .expect("contact");
        let Json(response) = submit_endpoint(State(context.clone())).await.expect("submit");
        response
    }

    #[tokio::test]
    async fn booking_flow_creates_a_pending_request() {
        let context = context();
        let response = submit_booking(&context).await;

        assert_eq!(response.status.status, "pending");
        assert!(response.request.provider.is_some());

        // Draft cleared; the next session starts at service selection.
        let Json(summary) = summary_endpoint(State(context.clone())).await;
        assert!(summary.service_ids.is_empty());
        assert_eq!(summary.step, "service_selection");
    }

    #[tokio::test]
    async fn on_hold_request_offers_the_full_action_set() {
        let context = context();
        let created = submit_booking(&context).await;

        let Json(response) = propose_time_endpoint(
            State(context.clone()),
            Path(created.request.id),
            Query(TzQuery { tz: -300 }),
            Json(ProposeRequest {
                message: "Saturday instead?".to_string(),
                purpose_time: Utc::now() + Duration::hours(72),
                receiver: 41,
            }),
        )
        .await
        .expect("proposes");

        assert_eq!(response.status.status, "on_hold");
        assert_eq!(
            response.status.actions,
            vec![
                RequestAction::Propose,
                RequestAction::Accept,
                RequestAction::Decline,
                RequestAction::History,
            ]
        );
        assert_eq!(response.request.handshakes.len(), 1);
    }

    #[tokio::test]
    async fn health_routes_reflect_readiness() {
        use axum::body::{to_bytes, Body};
        use axum::http::Request;
        use metrics_exporter_prometheus::PrometheusBuilder;
        use std::sync::atomic::{AtomicBool, Ordering};
        use tower::ServiceExt;

        let readiness = Arc::new(AtomicBool::new(false));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let app = with_health_routes(api_router(context())).layer(Extension(state));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::Relaxed);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("status"), Some(&serde_json::json!("ok")));
    }

    #[tokio::test]
    async fn negotiation_state_is_held_per_request_across_calls() {
        let context = context();
        let created = submit_booking(&context).await;

        request_details_endpoint(
            State(context.clone()),
            Path(created.request.id),
            Query(TzQuery { tz: 0 }),
        )
        .await
        .expect("details fetched");

        // The earlier call's fetch is still cached on the shared machine.
        let machine = machine_for(&context, created.request.id).await;
        assert!(machine.lock().await.details().is_some());

        let again = machine_for(&context, created.request.id).await;
        assert!(Arc::ptr_eq(&machine, &again));

        let other = machine_for(&context, created.request.id + 1).await;
        assert!(!Arc::ptr_eq(&machine, &other));
    }

    #[tokio::test]
    async fn second_decline_reports_already_handled() {
        let context = context();
        let created = submit_booking(&context).await;

        decline_request_endpoint(
            State(context.clone()),
            Path(created.request.id),
            Query(TzQuery { tz: 0 }),
            Json(DeclineRequest {
                reason: "Found another provider".to_string(),
                receiver: 41,
            }),
        )
        .await
        .expect("first decline lands");

        let err = decline_request_endpoint(
            State(context.clone()),
            Path(created.request.id),
            Query(TzQuery { tz: 0 }),
            Json(DeclineRequest {
                reason: "Changed my mind again".to_string(),
                receiver: 41,
            }),
        )
        .await
        .expect_err("request is terminal");

        // Declined is terminal, so the local transition table blocks the call.
        assert!(matches!(
            err,
            AppError::Negotiation(homeserve::negotiation::NegotiationError::InvalidTransition {
                ..
            })
        ));
    }
}
