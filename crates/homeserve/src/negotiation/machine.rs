use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::domain::{PartyKind, RequestDetails};
use super::events::RequestEvent;
use crate::gateway::{GatewayError, ProposalPayload, RemoteGateway};

/// Error raised by negotiation actions.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// Client-side validation; never reaches the gateway.
    #[error("a decline reason is required")]
    EmptyDeclineReason,
    #[error("cannot {action} a request that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },
    #[error("another action is still in flight for this request")]
    ActionInFlight,
    #[error("this request was already handled")]
    AlreadyHandled,
    #[error("request details have not been loaded yet")]
    NotLoaded,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Lifecycle driver for one already-created request.
///
/// Exactly one machine owns a request's client-side state at a time. Accept
/// and decline are modal: while one call is in flight, no second action may
/// start for the same request. The backend stays authoritative; on a
/// conflict the machine refetches instead of trusting its local state, and
/// it never retries on its own.
pub struct RequestNegotiationMachine<G> {
    gateway: Arc<G>,
    request_id: u64,
    party: PartyKind,
    details: Option<RequestDetails>,
    in_flight: bool,
}

impl<G> RequestNegotiationMachine<G>
where
    G: RemoteGateway,
{
    pub fn new(gateway: Arc<G>, request_id: u64, party: PartyKind) -> Self {
        Self {
            gateway,
            request_id,
            party,
            details: None,
            in_flight: false,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn details(&self) -> Option<&RequestDetails> {
        self.details.as_ref()
    }

    pub fn action_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Idempotent read; always safe to retry. Used for the initial load and
    /// for every refresh after an action or push signal.
    pub async fn fetch_details(
        &mut self,
        tz_offset_minutes: i32,
    ) -> Result<&RequestDetails, NegotiationError> {
        let dto = self
            .gateway
            .fetch_request_details(self.request_id, self.party, tz_offset_minutes)
            .await?;
        let details = dto.into_domain()?;
        Ok(self.details.insert(details))
    }

    pub async fn accept(
        &mut self,
        tz_offset_minutes: i32,
    ) -> Result<&RequestDetails, NegotiationError> {
        let status = self.loaded_status()?;
        if !status.can_accept() {
            return Err(NegotiationError::InvalidTransition {
                action: "accept",
                status: status.label(),
            });
        }
        self.guard_in_flight()?;

        let outcome = self.gateway.accept_request(self.request_id).await;
        self.in_flight = false;

        match outcome {
            Ok(()) => {
                info!(request_id = self.request_id, "request accepted");
                self.fetch_details(tz_offset_minutes).await
            }
            Err(GatewayError::Conflict(reason)) => {
                warn!(request_id = self.request_id, %reason, "accept conflicted; refetching");
                self.fetch_details(tz_offset_minutes).await?;
                Err(NegotiationError::AlreadyHandled)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Declining is irreversible; the reason must be non-empty and is
    /// validated before any call is issued.
    pub async fn decline(
        &mut self,
        reason: &str,
        receiver: u64,
        tz_offset_minutes: i32,
    ) -> Result<&RequestDetails, NegotiationError> {
        if reason.trim().is_empty() {
            return Err(NegotiationError::EmptyDeclineReason);
        }
        let status = self.loaded_status()?;
        if !status.can_decline() {
            return Err(NegotiationError::InvalidTransition {
                action: "decline",
                status: status.label(),
            });
        }
        self.guard_in_flight()?;

        let outcome = self
            .gateway
            .decline_request(self.request_id, reason.trim().to_string(), receiver)
            .await;
        self.in_flight = false;

        match outcome {
            Ok(()) => {
                info!(request_id = self.request_id, "request declined");
                self.fetch_details(tz_offset_minutes).await
            }
            Err(GatewayError::Conflict(conflict)) => {
                warn!(request_id = self.request_id, %conflict, "decline conflicted; refetching");
                self.fetch_details(tz_offset_minutes).await?;
                Err(NegotiationError::AlreadyHandled)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Appends a handshake entry; the status itself does not change until
    /// the counterpart answers.
    pub async fn propose_new_time(
        &mut self,
        message: &str,
        new_time: DateTime<Utc>,
        receiver: u64,
        receiver_type: PartyKind,
        tz_offset_minutes: i32,
    ) -> Result<&RequestDetails, NegotiationError> {
        let details = self.details.as_ref().ok_or(NegotiationError::NotLoaded)?;
        if !details.status.can_propose(&details.tier_tag) {
            return Err(NegotiationError::InvalidTransition {
                action: "propose a new time for",
                status: details.status.label(),
            });
        }
        self.guard_in_flight()?;

        let outcome = self
            .gateway
            .propose_new_time(ProposalPayload {
                request_id: self.request_id,
                message: message.to_string(),
                purpose_time: new_time,
                receiver,
                receiver_type,
                tz_offset_minutes,
            })
            .await;
        self.in_flight = false;

        match outcome {
            Ok(entry) => {
                info!(
                    request_id = self.request_id,
                    handshake_id = entry.id,
                    "schedule counter-offer recorded"
                );
                self.fetch_details(tz_offset_minutes).await
            }
            Err(GatewayError::Conflict(conflict)) => {
                warn!(request_id = self.request_id, %conflict, "proposal conflicted; refetching");
                self.fetch_details(tz_offset_minutes).await?;
                Err(NegotiationError::AlreadyHandled)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reacts to a push signal. Returns whether the event was for this
    /// request (and therefore triggered a refetch).
    pub async fn handle_event(
        &mut self,
        event: RequestEvent,
        tz_offset_minutes: i32,
    ) -> Result<bool, NegotiationError> {
        match event {
            RequestEvent::Changed { request_id } if request_id == self.request_id => {
                self.fetch_details(tz_offset_minutes).await?;
                Ok(true)
            }
            RequestEvent::Changed { .. } => Ok(false),
        }
    }

    fn loaded_status(&self) -> Result<super::domain::RequestStatus, NegotiationError> {
        self.details
            .as_ref()
            .map(|details| details.status)
            .ok_or(NegotiationError::NotLoaded)
    }

    fn guard_in_flight(&mut self) -> Result<(), NegotiationError> {
        if self.in_flight {
            return Err(NegotiationError::ActionInFlight);
        }
        self.in_flight = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::domain::RequestStatus;
    use crate::test_support::{sample_details_dto, ScriptedGateway};
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    const TZ: i32 = -300;

    fn machine(gateway: Arc<ScriptedGateway>) -> RequestNegotiationMachine<ScriptedGateway> {
        RequestNegotiationMachine::new(gateway, 900, PartyKind::Customer)
    }

    #[tokio::test]
    async fn fetch_is_idempotent() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "on hold"));
        let mut machine = machine(gateway);

        let first = machine.fetch_details(TZ).await.expect("loads").clone();
        let second = machine.fetch_details(TZ).await.expect("loads").clone();

        assert_eq!(first.status, RequestStatus::OnHold);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn accept_transitions_and_refetches() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "pending"));
        let mut machine = machine(gateway.clone());
        machine.fetch_details(TZ).await.expect("loads");

        let details = machine.accept(TZ).await.expect("accepts");

        assert_eq!(details.status, RequestStatus::Accepted);
        assert_eq!(
            gateway.accepts.lock().expect("accept mutex poisoned").as_slice(),
            &[900]
        );
    }

    #[tokio::test]
    async fn accept_from_terminal_state_is_rejected_locally() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "completed"));
        let mut machine = machine(gateway.clone());
        machine.fetch_details(TZ).await.expect("loads");

        let err = machine.accept(TZ).await.expect_err("terminal");

        assert!(matches!(err, NegotiationError::InvalidTransition { .. }));
        assert!(gateway.accepts.lock().expect("accept mutex poisoned").is_empty());
    }

    #[tokio::test]
    async fn empty_decline_reason_never_reaches_the_gateway() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "pending"));
        let mut machine = machine(gateway.clone());
        machine.fetch_details(TZ).await.expect("loads");

        let err = machine.decline("   \t", 41, TZ).await.expect_err("blank");

        assert!(matches!(err, NegotiationError::EmptyDeclineReason));
        assert!(gateway.declines.lock().expect("decline mutex poisoned").is_empty());
    }

    #[tokio::test]
    async fn conflict_refetches_and_reports_already_handled() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "pending"));
        let mut machine = machine(gateway.clone());
        machine.fetch_details(TZ).await.expect("loads");

        // The other party got there first.
        gateway.set_detail_status("declined");
        gateway.conflict_on_accept.store(true, Ordering::Relaxed);

        let err = machine.accept(TZ).await.expect_err("conflicted");

        assert!(matches!(err, NegotiationError::AlreadyHandled));
        assert_eq!(
            machine.details().map(|details| details.status),
            Some(RequestStatus::Declined)
        );
        assert!(!machine.action_in_flight());
    }

    #[tokio::test]
    async fn propose_appends_a_handshake_and_keeps_on_hold() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "on hold"));
        let mut machine = machine(gateway);
        machine.fetch_details(TZ).await.expect("loads");

        let new_time = Utc::now() + Duration::hours(48);
        let details = machine
            .propose_new_time("How about Saturday?", new_time, 41, PartyKind::Provider, TZ)
            .await
            .expect("proposes")
            .clone();

        assert_eq!(details.status, RequestStatus::OnHold);
        assert_eq!(details.handshakes.len(), 1);
        let proposal = details.current_proposal().expect("has a proposal");
        assert_eq!(proposal.new_schedule, new_time);
        assert_eq!(proposal.notes, "How about Saturday?");
    }

    #[tokio::test]
    async fn propose_on_pending_emergency_is_rejected() {
        let gateway = ScriptedGateway::shared();
        let mut dto = sample_details_dto(900, "pending");
        dto.service_tier_tag = "Emergency".to_string();
        gateway.seed_details(dto);
        let mut machine = machine(gateway);
        machine.fetch_details(TZ).await.expect("loads");

        let err = machine
            .propose_new_time("Later?", Utc::now(), 41, PartyKind::Provider, TZ)
            .await
            .expect_err("not proposable");
        assert!(matches!(err, NegotiationError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn change_event_for_this_request_triggers_refetch() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_details(sample_details_dto(900, "pending"));
        let mut machine = machine(gateway.clone());
        machine.fetch_details(TZ).await.expect("loads");

        gateway.set_detail_status("accepted");
        let fetched_before = gateway.detail_fetches.load(Ordering::Relaxed);

        let handled = machine
            .handle_event(RequestEvent::Changed { request_id: 900 }, TZ)
            .await
            .expect("handled");
        assert!(handled);
        assert_eq!(
            machine.details().map(|details| details.status),
            Some(RequestStatus::Accepted)
        );

        let ignored = machine
            .handle_event(RequestEvent::Changed { request_id: 901 }, TZ)
            .await
            .expect("handled");
        assert!(!ignored);
        assert_eq!(gateway.detail_fetches.load(Ordering::Relaxed), fetched_before + 1);
    }
}
