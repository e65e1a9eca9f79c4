//! Booking wizard: the multi-step selection flow that ends in a
//! create-request call.

pub mod address;
pub mod domain;
pub mod draft;
pub mod emergency;
pub mod matcher;
pub mod wizard;

pub use address::{AddressManager, AddressSaved};
pub use domain::{
    Address, AddressKind, AddressPayload, BookingDraft, Provider, ProviderChoice, ServiceTier,
    TierTag,
};
pub use draft::SessionDraftStore;
pub use emergency::{EmergencyAssessment, EmergencyWindow};
pub use matcher::{MatchState, ProviderMatcher, SearchTicket};
pub use wizard::{BookingWizard, ContactDetails, DraftSummary, WizardStep};

use crate::gateway::GatewayError;

/// Error raised anywhere in the booking flow.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Client-side validation; never reaches the gateway.
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("step '{step}' is not active")]
    WrongStep { step: &'static str },
    #[error("the current step is missing required selections: {missing}")]
    StepIncomplete { missing: &'static str },
    #[error("a provider reservation is already in flight")]
    ReservationInFlight,
    #[error("provider {0} is not in the current result set")]
    UnknownProvider(u64),
    #[error("address {0} is not in the saved list")]
    UnknownAddress(u64),
    #[error("confirmation tier must carry the Emergency tag")]
    NotAnEmergencyTier,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
