use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::domain::{BookingDraft, Provider, ProviderChoice};
use super::BookingError;
use crate::config::BookingConfig;
use crate::gateway::{GatewayError, ProviderQuery, RemoteGateway};

/// Search lifecycle for the current address selection.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchState {
    Idle,
    Loading,
    Populated(Vec<Provider>),
    Empty,
}

/// Ties a search response back to the selection that issued it. A response
/// whose ticket no longer matches the matcher's epoch is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket {
    epoch: u64,
}

#[derive(Debug, Clone)]
struct PendingSearch {
    query: ProviderQuery,
    due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationState {
    Idle,
    Pending(u64),
}

/// Provider search and reservation for one address selection.
pub struct ProviderMatcher<G> {
    gateway: Arc<G>,
    state: MatchState,
    epoch: u64,
    pending: Option<PendingSearch>,
    debounce: Duration,
    reservation: ReservationState,
}

impl<G> ProviderMatcher<G>
where
    G: RemoteGateway,
{
    pub fn new(gateway: Arc<G>, config: &BookingConfig) -> Self {
        Self {
            gateway,
            state: MatchState::Idle,
            epoch: 0,
            pending: None,
            debounce: Duration::milliseconds(config.search_debounce_ms),
            reservation: ReservationState::Idle,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Queues a search behind the debounce window, replacing any search that
    /// was already waiting.
    pub fn schedule_search(&mut self, query: ProviderQuery, now: DateTime<Utc>) {
        self.pending = Some(PendingSearch {
            query,
            due_at: now + self.debounce,
        });
    }

    /// Takes the pending search once its debounce window has elapsed.
    pub fn due_search(&mut self, now: DateTime<Utc>) -> Option<ProviderQuery> {
        match &self.pending {
            Some(pending) if pending.due_at <= now => {
                self.pending.take().map(|pending| pending.query)
            }
            _ => None,
        }
    }

    /// Marks the start of a search. Bumping the epoch cancels interest in any
    /// response still in flight for an earlier selection.
    pub fn begin_search(&mut self) -> SearchTicket {
        self.epoch += 1;
        self.state = MatchState::Loading;
        SearchTicket { epoch: self.epoch }
    }

    /// Applies a search response. Stale responses are discarded, never merged.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        response: Result<Vec<Provider>, GatewayError>,
    ) -> Result<(), BookingError> {
        if ticket.epoch != self.epoch {
            debug!(
                stale_epoch = ticket.epoch,
                current_epoch = self.epoch,
                "discarding provider response for a superseded selection"
            );
            return Ok(());
        }

        match response {
            Ok(providers) if providers.is_empty() => {
                self.state = MatchState::Empty;
                Ok(())
            }
            Ok(providers) => {
                self.state = MatchState::Populated(providers);
                Ok(())
            }
            Err(err) => {
                self.state = MatchState::Idle;
                Err(err.into())
            }
        }
    }

    /// Convenience wrapper used when the caller does not need to interleave
    /// selections: begin, await the gateway, complete.
    pub async fn search(&mut self, query: ProviderQuery) -> Result<&MatchState, BookingError> {
        let ticket = self.begin_search();
        let response = self.gateway.search_providers(query).await;
        self.complete_search(ticket, response)?;
        Ok(&self.state)
    }

    /// Client-side, case-insensitive substring filter over the fetched list.
    /// Never triggers a network call.
    pub fn filter_by_name(&self, needle: &str) -> Vec<&Provider> {
        let needle = needle.to_lowercase();
        match &self.state {
            MatchState::Populated(providers) => providers
                .iter()
                .filter(|provider| provider.name.to_lowercase().contains(&needle))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn reservation_in_flight(&self) -> bool {
        matches!(self.reservation, ReservationState::Pending(_))
    }

    /// Reserves a provider. At most one reservation may be in flight; the
    /// draft's choice is set optimistically and reverted when the call fails.
    pub async fn reserve(
        &mut self,
        provider_id: u64,
        draft: &mut BookingDraft,
    ) -> Result<(), BookingError> {
        if self.reservation_in_flight() {
            return Err(BookingError::ReservationInFlight);
        }
        let known = match &self.state {
            MatchState::Populated(providers) => {
                providers.iter().any(|provider| provider.id == provider_id)
            }
            _ => false,
        };
        if !known {
            return Err(BookingError::UnknownProvider(provider_id));
        }

        self.reservation = ReservationState::Pending(provider_id);
        draft.provider_choice = Some(ProviderChoice::Manual(provider_id));

        let outcome = self.gateway.reserve_provider(provider_id).await;
        self.reservation = ReservationState::Idle;

        match outcome {
            Ok(()) => {
                info!(provider_id, "provider reserved");
                Ok(())
            }
            Err(err) => {
                draft.provider_choice = None;
                Err(err.into())
            }
        }
    }

    /// Called when the address selection changes: the old result set and any
    /// in-flight response are no longer of interest.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.state = MatchState::Idle;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::domain::TierTag;
    use crate::test_support::{sample_provider, ScriptedGateway};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn query(address_id: u64) -> ProviderQuery {
        ProviderQuery {
            address_id,
            tier: TierTag::Scheduled,
            schedule_time: Utc.with_ymd_and_hms(2026, 3, 15, 15, 0, 0).unwrap(),
        }
    }

    fn matcher(gateway: Arc<ScriptedGateway>) -> ProviderMatcher<ScriptedGateway> {
        ProviderMatcher::new(gateway, &BookingConfig::default())
    }

    #[tokio::test]
    async fn search_populates_or_reports_empty() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_providers(vec![sample_provider(41, "Lakeside Plumbing")]);
        let mut matcher = matcher(gateway.clone());

        let state = matcher.search(query(10)).await.expect("search runs");
        assert!(matches!(state, MatchState::Populated(list) if list.len() == 1));

        gateway.seed_providers(Vec::new());
        let state = matcher.search(query(10)).await.expect("search runs");
        assert_eq!(state, &MatchState::Empty);
    }

    #[test]
    fn stale_response_for_prior_address_is_discarded() {
        let gateway = ScriptedGateway::shared();
        let mut matcher = matcher(gateway);

        let ticket_a = matcher.begin_search();
        let ticket_b = matcher.begin_search();

        matcher
            .complete_search(ticket_a, Ok(vec![sample_provider(1, "Stale Crew")]))
            .expect("stale completion is a no-op");
        assert_eq!(matcher.state(), &MatchState::Loading);

        matcher
            .complete_search(ticket_b, Ok(vec![sample_provider(2, "Fresh Crew")]))
            .expect("fresh completion lands");
        assert!(matches!(
            matcher.state(),
            MatchState::Populated(list) if list[0].id == 2
        ));
    }

    #[test]
    fn reset_cancels_interest_in_in_flight_response() {
        let gateway = ScriptedGateway::shared();
        let mut matcher = matcher(gateway);

        let ticket = matcher.begin_search();
        matcher.reset();
        matcher
            .complete_search(ticket, Ok(vec![sample_provider(1, "Late Crew")]))
            .expect("late completion is a no-op");

        assert_eq!(matcher.state(), &MatchState::Idle);
    }

    #[test]
    fn name_filter_is_case_insensitive_substring() {
        let gateway = ScriptedGateway::shared();
        let mut matcher = matcher(gateway);
        let ticket = matcher.begin_search();
        matcher
            .complete_search(
                ticket,
                Ok(vec![
                    sample_provider(1, "Lakeside Plumbing"),
                    sample_provider(2, "Metro Electric"),
                ]),
            )
            .expect("completion lands");

        let hits = matcher.filter_by_name("LAKE");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert!(matcher.filter_by_name("roof").is_empty());
    }

    #[test]
    fn debounce_holds_search_until_due() {
        let gateway = ScriptedGateway::shared();
        let mut matcher = matcher(gateway);
        let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();

        matcher.schedule_search(query(10), t0);
        assert!(matcher.due_search(t0 + Duration::milliseconds(100)).is_none());

        // A replacement restarts the window.
        matcher.schedule_search(query(11), t0 + Duration::milliseconds(200));
        assert!(matcher.due_search(t0 + Duration::milliseconds(400)).is_none());

        let due = matcher
            .due_search(t0 + Duration::milliseconds(500))
            .expect("window elapsed");
        assert_eq!(due.address_id, 11);
        assert!(matcher.due_search(t0 + Duration::seconds(1)).is_none());
    }

    #[tokio::test]
    async fn failed_reservation_reverts_the_draft_choice() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_providers(vec![sample_provider(41, "Lakeside Plumbing")]);
        gateway.fail_reserve.store(true, Ordering::Relaxed);
        let mut matcher = matcher(gateway);
        let mut draft = BookingDraft::default();

        matcher.search(query(10)).await.expect("search runs");
        let err = matcher
            .reserve(41, &mut draft)
            .await
            .expect_err("reserve fails");

        assert!(matches!(err, BookingError::Gateway(_)));
        assert!(draft.provider_choice.is_none());
        assert!(!matcher.reservation_in_flight());
    }

    #[tokio::test]
    async fn successful_reservation_records_the_choice() {
        let gateway = ScriptedGateway::shared();
        gateway.seed_providers(vec![sample_provider(41, "Lakeside Plumbing")]);
        let mut matcher = matcher(gateway.clone());
        let mut draft = BookingDraft::default();

        matcher.search(query(10)).await.expect("search runs");
        matcher.reserve(41, &mut draft).await.expect("reserves");

        assert_eq!(draft.selected_provider_id(), Some(41));
        assert_eq!(
            gateway.reserved.lock().expect("reserve mutex poisoned").as_slice(),
            &[41]
        );
    }

    #[tokio::test]
    async fn unknown_provider_cannot_be_reserved() {
        let gateway = ScriptedGateway::shared();
        let mut matcher = matcher(gateway);
        let mut draft = BookingDraft::default();

        let err = matcher
            .reserve(999, &mut draft)
            .await
            .expect_err("not in result set");
        assert!(matches!(err, BookingError::UnknownProvider(999)));
    }
}
