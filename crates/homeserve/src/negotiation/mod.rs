//! Request negotiation: lifecycle transitions and the handshake audit trail
//! for an already-created request.

pub mod domain;
pub mod events;
pub mod machine;

pub use domain::{
    current_proposal, Attachment, HandshakeAnswer, HandshakeEntry, PartyKind, PartyRef,
    RequestAction, RequestAddress, RequestDetails, RequestStatus, RequestStatusView,
};
pub use events::RequestEvent;
pub use machine::{NegotiationError, RequestNegotiationMachine};
