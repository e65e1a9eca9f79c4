//! Booking and negotiation core for the HomeServe marketplace.
//!
//! The crate is split along the two flows that carry real invariants: the
//! booking wizard (service selection through request submission) and the
//! request negotiation machine (accept / decline / propose-new-time). Both
//! talk to the backend exclusively through the [`gateway::RemoteGateway`]
//! port so they can be exercised end to end without a network.

pub mod booking;
pub mod config;
pub mod error;
pub mod gateway;
pub mod negotiation;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;
