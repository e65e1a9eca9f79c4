use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::address::{AddressManager, AddressSaved};
use super::domain::{AddressPayload, BookingDraft, ProviderChoice, ServiceTier, TierTag};
use super::draft::SessionDraftStore;
use super::emergency::EmergencyWindow;
use super::matcher::{MatchState, ProviderMatcher};
use super::BookingError;
use crate::config::BookingConfig;
use crate::gateway::{CreateRequestPayload, GatewayError, ProviderQuery, RemoteGateway};
use crate::negotiation::domain::RequestDetails;

/// Steps of the booking flow, strictly ordered. The emergency confirmation
/// is its own state rather than an imperative dialog so the whole flow is
/// drivable without a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    ServiceSelection,
    ServiceTier,
    AwaitingEmergencyConfirmation,
    AddressSelection,
    ProviderSelection,
    ContactAndPayment,
}

impl WizardStep {
    pub const fn label(self) -> &'static str {
        match self {
            WizardStep::ServiceSelection => "service_selection",
            WizardStep::ServiceTier => "service_tier",
            WizardStep::AwaitingEmergencyConfirmation => "awaiting_emergency_confirmation",
            WizardStep::AddressSelection => "address_selection",
            WizardStep::ProviderSelection => "provider_selection",
            WizardStep::ContactAndPayment => "contact_and_payment",
        }
    }

    const fn previous(self) -> Option<Self> {
        match self {
            WizardStep::ServiceSelection => None,
            WizardStep::ServiceTier => Some(WizardStep::ServiceSelection),
            WizardStep::AwaitingEmergencyConfirmation => Some(WizardStep::ServiceTier),
            WizardStep::AddressSelection => Some(WizardStep::ServiceTier),
            WizardStep::ProviderSelection => Some(WizardStep::AddressSelection),
            WizardStep::ContactAndPayment => Some(WizardStep::ProviderSelection),
        }
    }
}

/// Contact block collected on the final step.
#[derive(Debug, Clone, Serialize)]
pub struct ContactDetails {
    pub contact_person: String,
    pub phone: String,
    pub description: String,
    pub files: Vec<String>,
}

/// Read-only echo of the draft for the review step.
#[derive(Debug, Clone, Serialize)]
pub struct DraftSummary {
    pub step: &'static str,
    pub service_ids: Vec<u64>,
    pub tier: Option<String>,
    pub tier_duration: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub address_id: Option<u64>,
    pub provider: Option<String>,
}

/// The booking wizard: drives the draft store, emergency policy, address
/// manager, and provider matcher through the ordered steps and produces the
/// final create-request call.
pub struct BookingWizard<G> {
    gateway: Arc<G>,
    store: SessionDraftStore<G>,
    addresses: AddressManager<G>,
    matcher: ProviderMatcher<G>,
    window: EmergencyWindow,
    step: WizardStep,
    pending_time: Option<DateTime<Utc>>,
    contact: Option<ContactDetails>,
}

impl<G> BookingWizard<G>
where
    G: RemoteGateway,
{
    pub fn new(gateway: Arc<G>, config: &BookingConfig) -> Self {
        Self {
            store: SessionDraftStore::new(gateway.clone()),
            addresses: AddressManager::new(gateway.clone()),
            matcher: ProviderMatcher::new(gateway.clone(), config),
            window: EmergencyWindow::from_config(config),
            gateway,
            step: WizardStep::ServiceSelection,
            pending_time: None,
            contact: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &BookingDraft {
        self.store.draft()
    }

    pub fn saved_addresses(&self) -> &[super::domain::Address] {
        self.addresses.addresses()
    }

    pub fn matcher(&self) -> &ProviderMatcher<G> {
        &self.matcher
    }

    pub fn matcher_mut(&mut self) -> &mut ProviderMatcher<G> {
        &mut self.matcher
    }

    pub fn selected_request_id(&self) -> Option<u64> {
        self.store.selected_request_id()
    }

    /// Discards the in-progress draft and restarts at service selection.
    /// Called when the backend session is invalidated; a stale draft must
    /// not survive into the next login.
    pub fn abandon(&mut self) -> WizardStep {
        self.store.clear();
        self.store.set_selected_request_id(None);
        self.pending_time = None;
        self.contact = None;
        self.matcher.reset();
        self.step = WizardStep::ServiceSelection;
        self.step
    }

    fn auth_guard<T>(&mut self, result: Result<T, BookingError>) -> Result<T, BookingError> {
        if matches!(&result, Err(BookingError::Gateway(GatewayError::Auth))) {
            warn!("backend session invalidated; discarding in-progress draft");
            self.abandon();
        }
        result
    }

    /// Back navigation is always allowed and never discards data entered in
    /// later steps; a declined emergency pick is the one exception since the
    /// time was never committed.
    pub fn back(&mut self) -> WizardStep {
        if self.step == WizardStep::AwaitingEmergencyConfirmation {
            self.pending_time = None;
        }
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        self.step
    }

    pub async fn select_services(&mut self, ids: BTreeSet<u64>) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ServiceSelection)?;
        let written = self.store.record_services(ids).await;
        self.auth_guard(written)?;
        self.step = WizardStep::ServiceTier;
        Ok(())
    }

    pub async fn choose_tier(&mut self, tier: ServiceTier) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ServiceTier)?;
        let written = self.store.record_tier(tier).await;
        self.auth_guard(written)?;
        Ok(())
    }

    /// Confirms a date/time pick. The emergency window is evaluated here,
    /// once; a pick inside the window on a schedulable tier parks the wizard
    /// in the confirmation state instead of committing the time.
    pub async fn pick_schedule_time(
        &mut self,
        time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<WizardStep, BookingError> {
        self.ensure_step(WizardStep::ServiceTier)?;
        let tier = self
            .store
            .draft()
            .selected_tier
            .clone()
            .ok_or(BookingError::StepIncomplete {
                missing: "service tier",
            })?;

        if self.window.requires_confirmation(time, now, &tier) {
            self.pending_time = Some(time);
            self.step = WizardStep::AwaitingEmergencyConfirmation;
            return Ok(self.step);
        }

        let written = self.store.record_schedule_time(time).await;
        self.auth_guard(written)?;
        self.step = WizardStep::AddressSelection;
        Ok(self.step)
    }

    /// The user accepted the emergency upgrade: the tier is forced to the
    /// given Emergency tier and the parked time is committed.
    pub async fn confirm_emergency(
        &mut self,
        emergency_tier: ServiceTier,
    ) -> Result<WizardStep, BookingError> {
        self.ensure_step(WizardStep::AwaitingEmergencyConfirmation)?;
        if emergency_tier.tag != TierTag::Emergency {
            return Err(BookingError::NotAnEmergencyTier);
        }
        let time = self.pending_time.ok_or(BookingError::StepIncomplete {
            missing: "schedule time",
        })?;

        let written = self.store.record_tier(emergency_tier).await;
        self.auth_guard(written)?;
        let written = self.store.record_schedule_time(time).await;
        self.auth_guard(written)?;
        self.pending_time = None;
        self.step = WizardStep::AddressSelection;
        info!("schedule inside emergency window; tier forced to Emergency");
        Ok(self.step)
    }

    /// The user declined the upgrade: the parked time is dropped and the
    /// time picker re-opens.
    pub fn decline_emergency(&mut self) -> Result<WizardStep, BookingError> {
        self.ensure_step(WizardStep::AwaitingEmergencyConfirmation)?;
        self.pending_time = None;
        self.step = WizardStep::ServiceTier;
        Ok(self.step)
    }

    pub async fn refresh_addresses(&mut self) -> Result<&[super::domain::Address], BookingError> {
        let refreshed = self.addresses.refresh().await.map(|_| ());
        self.auth_guard(refreshed)?;
        Ok(self.addresses.addresses())
    }

    pub async fn save_address(
        &mut self,
        payload: AddressPayload,
    ) -> Result<AddressSaved, BookingError> {
        let saved = self.addresses.save(payload, self.store.draft_mut()).await;
        self.auth_guard(saved)
    }

    pub async fn remove_address(&mut self, address_id: u64) -> Result<(), BookingError> {
        let removed = self.addresses.remove(address_id, self.store.draft_mut()).await;
        self.auth_guard(removed)
    }

    pub async fn choose_address(&mut self, address_id: u64) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::AddressSelection)?;
        let known = self
            .addresses
            .addresses()
            .iter()
            .any(|address| address.id == address_id);
        if !known {
            return Err(BookingError::UnknownAddress(address_id));
        }

        let written = self.store.record_address(address_id).await;
        self.auth_guard(written)?;
        self.matcher.reset();
        self.step = WizardStep::ProviderSelection;
        Ok(())
    }

    fn provider_query(&self) -> Result<ProviderQuery, BookingError> {
        let draft = self.store.draft();
        let address_id = draft
            .selected_address_id
            .ok_or(BookingError::StepIncomplete {
                missing: "address selection",
            })?;
        let tier = draft.tier_tag().cloned().ok_or(BookingError::StepIncomplete {
            missing: "service tier",
        })?;
        let schedule_time = draft.schedule_time.ok_or(BookingError::StepIncomplete {
            missing: "schedule time",
        })?;
        Ok(ProviderQuery {
            address_id,
            tier,
            schedule_time,
        })
    }

    pub async fn search_providers(&mut self) -> Result<&MatchState, BookingError> {
        self.ensure_step(WizardStep::ProviderSelection)?;
        let query = self.provider_query()?;
        let searched = self.matcher.search(query).await.map(|_| ());
        self.auth_guard(searched)?;
        Ok(self.matcher.state())
    }

    pub async fn reserve_provider(&mut self, provider_id: u64) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ProviderSelection)?;
        let reserved = self
            .matcher
            .reserve(provider_id, self.store.draft_mut())
            .await;
        self.auth_guard(reserved)
    }

    /// Lets the backend assign the best provider. Mutually exclusive with a
    /// manual reservation within one submission.
    pub fn choose_auto_match(&mut self) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ProviderSelection)?;
        if self.matcher.reservation_in_flight() {
            return Err(BookingError::ReservationInFlight);
        }
        self.store.set_provider_choice(Some(ProviderChoice::AutoMatch));
        Ok(())
    }

    pub fn proceed_to_contact(&mut self) -> Result<WizardStep, BookingError> {
        self.ensure_step(WizardStep::ProviderSelection)?;
        if self.store.draft().provider_choice.is_none() {
            return Err(BookingError::StepIncomplete {
                missing: "provider choice",
            });
        }
        self.step = WizardStep::ContactAndPayment;
        Ok(self.step)
    }

    pub fn set_contact(&mut self, contact: ContactDetails) -> Result<(), BookingError> {
        self.ensure_step(WizardStep::ContactAndPayment)?;
        if contact.contact_person.trim().is_empty() {
            return Err(BookingError::MissingField {
                field: "contact_person",
            });
        }
        if contact.phone.trim().is_empty() {
            return Err(BookingError::MissingField { field: "phone" });
        }
        self.contact = Some(contact);
        Ok(())
    }

    pub fn summary(&self) -> DraftSummary {
        let draft = self.store.draft();
        DraftSummary {
            step: self.step.label(),
            service_ids: draft.selected_service_ids.iter().copied().collect(),
            tier: draft.tier_tag().map(|tag| tag.label().to_string()),
            tier_duration: draft
                .selected_tier
                .as_ref()
                .map(ServiceTier::duration_label),
            schedule_time: draft.schedule_time,
            address_id: draft.selected_address_id,
            provider: draft.provider_choice.map(|choice| match choice {
                ProviderChoice::Manual(id) => id.to_string(),
                ProviderChoice::AutoMatch => "auto".to_string(),
            }),
        }
    }

    /// Assembles the create-request payload and submits it. Success clears
    /// the draft and hands the new request id over for negotiation; failure
    /// preserves the draft so the user can resubmit.
    pub async fn submit(&mut self) -> Result<RequestDetails, BookingError> {
        self.ensure_step(WizardStep::ContactAndPayment)?;
        let contact = self.contact.clone().ok_or(BookingError::StepIncomplete {
            missing: "contact details",
        })?;

        let draft = self.store.draft();
        let tier = draft.selected_tier.clone().ok_or(BookingError::StepIncomplete {
            missing: "service tier",
        })?;
        let schedule_time = draft.schedule_time.ok_or(BookingError::StepIncomplete {
            missing: "schedule time",
        })?;
        let address_id = draft
            .selected_address_id
            .ok_or(BookingError::StepIncomplete {
                missing: "address selection",
            })?;
        let choice = draft.provider_choice.ok_or(BookingError::StepIncomplete {
            missing: "provider choice",
        })?;

        let payload = CreateRequestPayload {
            service_ids: draft.selected_service_ids.iter().copied().collect(),
            service_tier_id: tier.tier_id,
            schedule_time,
            address_id,
            provider_id: choice.provider_id(),
            contact_person: contact.contact_person,
            phone: contact.phone,
            description: contact.description,
            files: contact.files,
        };

        let created = self
            .gateway
            .create_request(payload)
            .await
            .map_err(BookingError::from);
        let dto = self.auth_guard(created)?;
        let details = dto.into_domain()?;

        self.store.clear();
        self.store.set_selected_request_id(Some(details.id));
        self.contact = None;
        self.step = WizardStep::ServiceSelection;
        info!(request_id = details.id, "booking request created");
        Ok(details)
    }

    fn ensure_step(&self, expected: WizardStep) -> Result<(), BookingError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(BookingError::WrongStep {
                step: expected.label(),
            })
        }
    }
}
