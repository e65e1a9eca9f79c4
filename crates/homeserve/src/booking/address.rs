use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::domain::{Address, AddressPayload, BookingDraft};
use super::BookingError;
use crate::gateway::RemoteGateway;

/// Outcome of a successful add/update.
#[derive(Debug, Clone, Serialize)]
pub struct AddressSaved {
    pub address: Address,
    /// True when the saved address was the draft's selected one; the caller
    /// must close the provider list and require re-selection.
    pub selection_invalidated: bool,
}

/// CRUD over the customer's saved addresses.
///
/// Validation happens before any network call; a failed call leaves the
/// cached list exactly as it was.
pub struct AddressManager<G> {
    gateway: Arc<G>,
    addresses: Vec<Address>,
}

impl<G> AddressManager<G>
where
    G: RemoteGateway,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            addresses: Vec::new(),
        }
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub async fn refresh(&mut self) -> Result<&[Address], BookingError> {
        let fresh = self.gateway.list_addresses().await?;
        self.addresses = fresh;
        Ok(&self.addresses)
    }

    /// Add (no id) or update (id present). On success the list is refreshed
    /// and, when the changed address was selected in the draft, the provider
    /// choice is invalidated.
    pub async fn save(
        &mut self,
        payload: AddressPayload,
        draft: &mut BookingDraft,
    ) -> Result<AddressSaved, BookingError> {
        validate(&payload)?;

        let saved = self.gateway.save_address(payload).await?;
        self.refresh().await?;

        let selection_invalidated = draft.selected_address_id == Some(saved.id);
        if selection_invalidated {
            draft.provider_choice = None;
            info!(address_id = saved.id, "selected address changed; provider selection reset");
        }

        Ok(AddressSaved {
            address: saved,
            selection_invalidated,
        })
    }

    pub async fn remove(
        &mut self,
        address_id: u64,
        draft: &mut BookingDraft,
    ) -> Result<(), BookingError> {
        self.gateway.delete_address(address_id).await?;
        self.refresh().await?;

        if draft.selected_address_id == Some(address_id) {
            draft.clear_address();
        }
        Ok(())
    }
}

fn validate(payload: &AddressPayload) -> Result<(), BookingError> {
    if payload.full_address.trim().is_empty() {
        return Err(BookingError::MissingField {
            field: "full_address",
        });
    }
    if payload.city.trim().is_empty() {
        return Err(BookingError::MissingField { field: "city" });
    }
    if payload.state.trim().is_empty() {
        return Err(BookingError::MissingField { field: "state" });
    }
    if payload.zip_code.trim().is_empty() {
        return Err(BookingError::MissingField { field: "zip_code" });
    }
    Ok(())
}
