use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{BookingDraft, ProviderChoice, ServiceTier};
use super::BookingError;
use crate::gateway::{RemoteGateway, SessionField};

/// Session-scoped draft with write-through mirroring.
///
/// Every field write goes to the backend first and only lands in the local
/// draft once the mirror call succeeds, so a failed write can never let the
/// wizard advance on top of stale server state.
pub struct SessionDraftStore<G> {
    gateway: Arc<G>,
    draft: BookingDraft,
    selected_request_id: Option<u64>,
}

impl<G> SessionDraftStore<G>
where
    G: RemoteGateway,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            draft: BookingDraft::default(),
            selected_request_id: None,
        }
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    // Mutation outside the mirrored setters is reserved for the wizard,
    // which only touches the local-only provider choice this way.
    pub(crate) fn draft_mut(&mut self) -> &mut BookingDraft {
        &mut self.draft
    }

    pub async fn record_services(&mut self, ids: BTreeSet<u64>) -> Result<(), BookingError> {
        if ids.is_empty() {
            return Err(BookingError::MissingField {
                field: "service selection",
            });
        }
        self.mirror(SessionField::ServiceIds(ids.iter().copied().collect()))
            .await?;
        self.draft.selected_service_ids = ids;
        Ok(())
    }

    pub async fn record_tier(&mut self, tier: ServiceTier) -> Result<(), BookingError> {
        self.mirror(SessionField::ServiceTierId(tier.tier_id)).await?;
        self.draft.selected_tier = Some(tier);
        Ok(())
    }

    pub async fn record_schedule_time(&mut self, time: DateTime<Utc>) -> Result<(), BookingError> {
        self.mirror(SessionField::ScheduleTime(time)).await?;
        self.draft.schedule_time = Some(time);
        Ok(())
    }

    /// Mirrors the address selection and applies the provider invalidation
    /// rule to the local draft.
    pub async fn record_address(&mut self, address_id: u64) -> Result<(), BookingError> {
        self.mirror(SessionField::AddressId(address_id)).await?;
        self.draft.select_address(address_id);
        Ok(())
    }

    /// Provider choice is local-only: the reservation call is owned by the
    /// matcher, not the session mirror.
    pub fn set_provider_choice(&mut self, choice: Option<ProviderChoice>) {
        self.draft.provider_choice = choice;
    }

    pub fn selected_request_id(&self) -> Option<u64> {
        self.selected_request_id
    }

    pub fn set_selected_request_id(&mut self, request_id: Option<u64>) {
        self.selected_request_id = request_id;
    }

    /// Discards the draft after a successful submission or a forced logout.
    pub fn clear(&mut self) {
        self.draft = BookingDraft::default();
    }

    async fn mirror(&self, field: SessionField) -> Result<(), BookingError> {
        if let Err(err) = self.gateway.store_session_field(field).await {
            warn!(%err, "session field mirror rejected; step will not advance");
            return Err(err.into());
        }
        Ok(())
    }
}
