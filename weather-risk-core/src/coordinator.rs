//! Selection state → exactly one published risk profile.
//!
//! The coordinator is the only owner of the current [`QueryState`] and the
//! generation counter. Queries run on spawned tasks and report back over an
//! mpsc channel; a report is applied only when it carries the generation of
//! the query still in flight. Everything else is dropped without a trace in
//! the published state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::client::PredictionClient;
use crate::error::{FailureKind, PredictionError};
use crate::key::{DateSelection, LocationDateKey};
use crate::model::{Location, RawPredictionResponse};
use crate::normalize::{RiskProfile, normalize};

/// Monotonic query counter. Each issued query captures the value at issue time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// What the side panel shows.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    /// Panel closed, or open with nothing selected.
    Idle,
    Pending {
        key: LocationDateKey,
    },
    Ready {
        key: LocationDateKey,
        profile: RiskProfile,
    },
    /// `key` is `None` when the selection never formed a valid key.
    Failed {
        key: Option<LocationDateKey>,
        kind: FailureKind,
        message: String,
    },
}

impl QueryState {
    /// Profile to render. Anything but `Ready` renders as fully unresolved.
    pub fn profile(&self) -> RiskProfile {
        match self {
            QueryState::Ready { profile, .. } => *profile,
            _ => RiskProfile::unresolved(),
        }
    }

    pub fn key(&self) -> Option<&LocationDateKey> {
        match self {
            QueryState::Idle => None,
            QueryState::Pending { key } | QueryState::Ready { key, .. } => Some(key),
            QueryState::Failed { key, .. } => key.as_ref(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryState::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// What the user currently has picked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub panel_open: bool,
    pub location: Option<Location>,
    pub date: DateSelection,
}

/// Result of one query, tagged with the generation it was issued under.
#[derive(Debug)]
pub struct QueryOutcome {
    pub generation: Generation,
    pub key: LocationDateKey,
    pub result: Result<RawPredictionResponse, PredictionError>,
}

#[derive(Debug)]
struct InFlight {
    generation: Generation,
    cancel: CancellationToken,
}

/// Drives queries from selection changes.
///
/// Methods that issue a query spawn onto the ambient Tokio runtime and must be
/// called from within one.
pub struct QueryCoordinator {
    client: Arc<dyn PredictionClient>,
    reference_year: i32,
    selection: Selection,
    generation: Generation,
    in_flight: Option<InFlight>,
    outcomes_tx: mpsc::UnboundedSender<QueryOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<QueryOutcome>,
    published: watch::Sender<QueryState>,
}

impl QueryCoordinator {
    pub fn new(client: Arc<dyn PredictionClient>, reference_year: i32) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (published, _) = watch::channel(QueryState::Idle);

        Self {
            client,
            reference_year,
            selection: Selection::default(),
            generation: Generation::default(),
            in_flight: None,
            outcomes_tx,
            outcomes_rx,
            published,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> QueryState {
        self.published.borrow().clone()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.published.subscribe()
    }

    pub fn open_panel(&mut self) {
        if self.selection.panel_open {
            return;
        }

        self.selection.panel_open = true;
        self.issue_query();
    }

    /// Closing abandons the in-flight query; its result will never be applied.
    pub fn close_panel(&mut self) {
        if !self.selection.panel_open {
            return;
        }

        self.selection.panel_open = false;
        self.cancel_in_flight();
        self.generation = self.generation.next();
        self.publish(QueryState::Idle);
    }

    pub fn select_location(&mut self, location: Location) {
        if self.selection.location.as_ref() == Some(&location) {
            return;
        }

        self.selection.location = Some(location);
        if self.selection.panel_open {
            self.issue_query();
        }
    }

    pub fn select_date(&mut self, date: DateSelection) {
        if self.selection.date == date {
            return;
        }

        self.selection.date = date;
        if self.selection.panel_open {
            self.issue_query();
        }
    }

    /// A marker click: select the place and make sure the panel is open.
    pub fn show_location(&mut self, location: Location) {
        if self.selection.panel_open {
            self.select_location(location);
        } else {
            self.selection.location = Some(location);
            self.open_panel();
        }
    }

    /// Apply one outcome. Returns `true` if it was current and got published.
    pub fn handle_outcome(&mut self, outcome: QueryOutcome) -> bool {
        let is_current = outcome.generation == self.generation
            && self
                .in_flight
                .as_ref()
                .is_some_and(|f| f.generation == outcome.generation);

        if !is_current {
            tracing::debug!(
                received = outcome.generation.value(),
                current = self.generation.value(),
                key = %outcome.key,
                "discarding stale risk query result"
            );
            return false;
        }

        self.in_flight = None;

        let next = match outcome.result {
            Ok(raw) => QueryState::Ready {
                profile: normalize(&raw),
                key: outcome.key,
            },
            Err(err) => {
                tracing::warn!(
                    generation = outcome.generation.value(),
                    key = %outcome.key,
                    error = %err,
                    "risk query failed"
                );
                QueryState::Failed {
                    kind: err.kind(),
                    message: err.user_message(),
                    key: Some(outcome.key),
                }
            }
        };

        self.publish(next);
        true
    }

    /// Wait for the next reported outcome and apply it. Returns `false` at once
    /// when no query is in flight.
    pub async fn next_outcome(&mut self) -> bool {
        if self.in_flight.is_none() {
            return false;
        }

        match self.outcomes_rx.recv().await {
            Some(outcome) => self.handle_outcome(outcome),
            None => false,
        }
    }

    /// Apply outcomes until no query is in flight, then return the final state.
    pub async fn settle(&mut self) -> QueryState {
        while self.in_flight.is_some() {
            self.next_outcome().await;
        }

        self.state()
    }

    fn issue_query(&mut self) {
        self.cancel_in_flight();
        self.generation = self.generation.next();
        let generation = self.generation;

        let Some(location) = self.selection.location.as_ref() else {
            self.publish(QueryState::Idle);
            return;
        };

        let key = match LocationDateKey::from_selection(location, self.selection.date, self.reference_year)
        {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(generation = generation.value(), error = %err, "selection is not a valid query");
                let err = PredictionError::from(err);
                self.publish(QueryState::Failed {
                    key: None,
                    kind: err.kind(),
                    message: err.user_message(),
                });
                return;
            }
        };

        tracing::info!(generation = generation.value(), key = %key, "issuing risk query");
        self.publish(QueryState::Pending { key: key.clone() });

        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            generation,
            cancel: cancel.clone(),
        });

        let client = Arc::clone(&self.client);
        let tx = self.outcomes_tx.clone();

        tokio::spawn(async move {
            let request_key = key.clone();
            // Own task, so a panicking client surfaces as a JoinError instead
            // of silently swallowing the outcome.
            let mut request = tokio::spawn(async move { client.predict(&request_key).await });

            let joined = tokio::select! {
                biased;

                () = cancel.cancelled() => None,
                joined = &mut request => Some(joined),
            };

            let Some(joined) = joined else {
                request.abort();
                tracing::debug!(generation = generation.value(), "risk query abandoned");
                return;
            };

            let result = joined.unwrap_or_else(|err| Err(PredictionError::Crashed(err.to_string())));
            let _ = tx.send(QueryOutcome { generation, key, result });
        });
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }

    fn publish(&self, state: QueryState) {
        self.published.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{RiskValue, SENTINEL};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Reply = Result<RawPredictionResponse, PredictionError>;

    #[derive(Debug)]
    enum Script {
        Now(Reply),
        Gated(oneshot::Receiver<Reply>),
    }

    /// Answers each key from its own queue of scripted replies, so the order
    /// in which spawned queries get polled does not matter.
    #[derive(Debug, Default)]
    struct ScriptedClient {
        script: Mutex<Vec<(LocationDateKey, VecDeque<Script>)>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn push(&self, key: LocationDateKey, script: Script) {
            let mut scripts = self.script.lock().unwrap();
            match scripts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, queue)) => queue.push_back(script),
                None => scripts.push((key, VecDeque::from([script]))),
            }
        }

        fn reply(self, key: LocationDateKey, reply: Reply) -> Self {
            self.push(key, Script::Now(reply));
            self
        }

        fn gate(&self, key: LocationDateKey) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.push(key, Script::Gated(rx));
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PredictionClient for ScriptedClient {
        async fn predict(&self, key: &LocationDateKey) -> Result<RawPredictionResponse, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let next = self
                .script
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(k, _)| k == key)
                .and_then(|(_, queue)| queue.pop_front());

            match next {
                Some(Script::Now(reply)) => reply,
                Some(Script::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(PredictionError::Decode("gate dropped".into()))),
                None => Err(PredictionError::Decode(format!("unscripted call for {key}"))),
            }
        }
    }

    #[derive(Debug)]
    struct PanickingClient;

    #[async_trait]
    impl PredictionClient for PanickingClient {
        async fn predict(&self, _key: &LocationDateKey) -> Result<RawPredictionResponse, PredictionError> {
            panic!("scoring backend blew up");
        }
    }

    fn raw(value: serde_json::Value) -> RawPredictionResponse {
        serde_json::from_value(value).unwrap()
    }

    fn new_york() -> Location {
        Location::new(40.7128, -74.0060, "New York", "United States")
    }

    fn london() -> Location {
        Location::new(51.5074, -0.1278, "London", "United Kingdom")
    }

    fn june_15() -> DateSelection {
        DateSelection::new(5, 15)
    }

    fn key(location: &Location, date: DateSelection) -> LocationDateKey {
        LocationDateKey::from_selection(location, date, 2026).unwrap()
    }

    fn coordinator(client: &Arc<ScriptedClient>) -> QueryCoordinator {
        QueryCoordinator::new(client.clone() as Arc<dyn PredictionClient>, 2026)
    }

    #[tokio::test]
    async fn publishes_normalized_profile_for_selection() {
        let client = Arc::new(ScriptedClient::default().reply(
            key(&new_york(), june_15()),
            Ok(raw(json!({ "temperature": { "Very Hot": 80 } }))),
        ));
        let mut coordinator = coordinator(&client);

        coordinator.select_date(june_15());
        coordinator.show_location(new_york());

        let state = coordinator.settle().await;

        assert_eq!(state.key().map(|k| k.date_stamp()), Some("20260615"));
        assert_eq!(client.calls(), 1);

        let profile = state.profile();
        assert_eq!(profile.very_hot, RiskValue::Percent(80.0));
        assert_eq!(profile.very_cold, RiskValue::Percent(SENTINEL));
        assert_eq!(profile.cold, RiskValue::Percent(SENTINEL));
        assert_eq!(profile.mild, RiskValue::Percent(SENTINEL));
        assert_eq!(profile.warm_or_hot, RiskValue::Percent(SENTINEL));
        assert_eq!(profile.windy, RiskValue::Percent(SENTINEL));
        assert_eq!(profile.very_wet, RiskValue::Percent(SENTINEL));
    }

    #[tokio::test]
    async fn trigger_resets_to_pending_immediately() {
        let client = Arc::new(ScriptedClient::default());
        let _gate = client.gate(key(&new_york(), june_15()));
        let mut coordinator = coordinator(&client);

        coordinator.select_date(june_15());
        coordinator.show_location(new_york());

        let state = coordinator.state();
        assert!(state.is_pending());
        assert!(state.profile().is_fully_unresolved());
    }

    #[tokio::test]
    async fn later_selection_wins_even_if_earlier_answer_arrives_last() {
        let client = Arc::new(ScriptedClient::default());
        let gate_a = client.gate(key(&new_york(), june_15()));
        let gate_b = client.gate(key(&london(), june_15()));
        let mut coordinator = coordinator(&client);

        coordinator.select_date(june_15());
        coordinator.show_location(new_york());
        let generation_a = coordinator.generation();

        coordinator.select_location(london());
        assert!(coordinator.generation() > generation_a);

        gate_b
            .send(Ok(raw(json!({ "temperature": { "Very Cold": 42 } }))))
            .unwrap();
        let state = coordinator.settle().await;
        assert_eq!(state.profile().very_cold, RiskValue::Percent(42.0));

        // A was cancelled, so its gate may already be gone.
        let _ = gate_a.send(Ok(raw(json!({ "temperature": { "Very Hot": 99 } }))));

        // Even if A's answer reaches the coordinator, it must be ignored.
        let accepted = coordinator.handle_outcome(QueryOutcome {
            generation: generation_a,
            key: key(&new_york(), june_15()),
            result: Ok(raw(json!({ "temperature": { "Very Hot": 99 } }))),
        });

        assert!(!accepted);
        assert_eq!(coordinator.state(), state);
        assert_eq!(coordinator.state().profile().very_hot, RiskValue::Percent(SENTINEL));
    }

    #[tokio::test]
    async fn stale_failure_does_not_touch_state() {
        let client = Arc::new(
            ScriptedClient::default()
                .reply(
                    key(&new_york(), DateSelection::default()),
                    Ok(raw(json!({ "wind": { "Windy": 10 } }))),
                )
                .reply(
                    key(&new_york(), june_15()),
                    Ok(raw(json!({ "wind": { "Windy": 20 } }))),
                ),
        );
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        let first = coordinator.settle().await;
        assert_eq!(first.profile().windy, RiskValue::Percent(10.0));
        let stale_generation = coordinator.generation();

        coordinator.select_date(june_15());
        let second = coordinator.settle().await;
        assert_eq!(second.profile().windy, RiskValue::Percent(20.0));

        let accepted = coordinator.handle_outcome(QueryOutcome {
            generation: stale_generation,
            key: key(&new_york(), DateSelection::default()),
            result: Err(PredictionError::Decode("late".into())),
        });

        assert!(!accepted);
        assert!(!coordinator.state().is_failed());
        assert_eq!(coordinator.state(), second);
    }

    #[tokio::test]
    async fn duplicate_outcome_for_current_generation_is_ignored() {
        let client = Arc::new(ScriptedClient::default().reply(
            key(&new_york(), DateSelection::default()),
            Ok(raw(json!({ "wind": { "Windy": 10 } }))),
        ));
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        coordinator.settle().await;

        let accepted = coordinator.handle_outcome(QueryOutcome {
            generation: coordinator.generation(),
            key: key(&new_york(), DateSelection::default()),
            result: Ok(raw(json!({ "wind": { "Windy": 90 } }))),
        });

        assert!(!accepted);
        assert_eq!(coordinator.state().profile().windy, RiskValue::Percent(10.0));
    }

    #[tokio::test]
    async fn rapid_selection_changes_publish_only_the_last() {
        let client = Arc::new(ScriptedClient::default());
        let dates = [
            DateSelection::default(),
            DateSelection::new(5, 2),
            DateSelection::new(5, 3),
            DateSelection::new(5, 4),
        ];
        let gates: Vec<_> = dates.iter().map(|d| client.gate(key(&new_york(), *d))).collect();
        let mut coordinator = coordinator(&client);
        let mut updates = coordinator.subscribe();

        coordinator.show_location(new_york());
        for date in &dates[1..] {
            coordinator.select_date(*date);
        }

        // Release in reverse issue order.
        for (i, gate) in gates.into_iter().enumerate().rev() {
            let _ = gate.send(Ok(raw(json!({ "precipitation": { "Heavy": i as f64 } }))));
        }

        let state = coordinator.settle().await;
        assert_eq!(state.key().map(|k| k.date_stamp()), Some("20260604"));
        assert_eq!(state.profile().very_wet, RiskValue::Percent(3.0));

        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), state);
    }

    #[tokio::test]
    async fn transport_failure_sets_failed_with_unresolved_slots() {
        let client = Arc::new(ScriptedClient::default().reply(
            key(&new_york(), DateSelection::default()),
            Err(PredictionError::Status {
                status: 503,
                message: "unavailable".into(),
            }),
        ));
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        let state = coordinator.settle().await;

        assert!(state.is_failed());
        assert!(state.error().unwrap().contains("503"));
        assert!(state.profile().is_fully_unresolved());
        assert!(matches!(
            state,
            QueryState::Failed {
                kind: FailureKind::Transport,
                ..
            }
        ));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn decode_failure_is_treated_like_transport_failure() {
        let client = Arc::new(ScriptedClient::default().reply(
            key(&new_york(), DateSelection::default()),
            Err(PredictionError::Decode("eof".into())),
        ));
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        let state = coordinator.settle().await;

        assert!(state.is_failed());
        assert!(state.profile().is_fully_unresolved());
    }

    #[tokio::test]
    async fn impossible_date_fails_without_calling_the_service() {
        let client = Arc::new(ScriptedClient::default());
        let mut coordinator = coordinator(&client);

        coordinator.select_date(DateSelection::new(5, 31));
        coordinator.show_location(new_york());
        let state = coordinator.settle().await;

        assert!(state.is_failed());
        assert!(matches!(
            state,
            QueryState::Failed {
                key: None,
                kind: FailureKind::Decode,
                ..
            }
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn changes_while_closed_do_not_query() {
        let client = Arc::new(ScriptedClient::default());
        let mut coordinator = coordinator(&client);

        coordinator.select_location(new_york());
        coordinator.select_date(june_15());
        tokio::task::yield_now().await;

        assert_eq!(coordinator.state(), QueryState::Idle);
        assert_eq!(client.calls(), 0);
        assert!(!coordinator.selection().panel_open);
    }

    #[tokio::test]
    async fn opening_without_location_stays_idle() {
        let client = Arc::new(ScriptedClient::default());
        let mut coordinator = coordinator(&client);

        coordinator.open_panel();
        let state = coordinator.settle().await;

        assert_eq!(state, QueryState::Idle);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn reselecting_same_values_is_not_a_change() {
        let client = Arc::new(ScriptedClient::default().reply(
            key(&new_york(), DateSelection::default()),
            Ok(RawPredictionResponse::default()),
        ));
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        coordinator.settle().await;
        let generation = coordinator.generation();

        coordinator.select_location(new_york());
        coordinator.select_date(DateSelection::default());
        coordinator.show_location(new_york());

        assert_eq!(coordinator.generation(), generation);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn closing_discards_in_flight_result() {
        let client = Arc::new(ScriptedClient::default());
        let gate = client.gate(key(&new_york(), DateSelection::default()));
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        let generation = coordinator.generation();

        coordinator.close_panel();
        let _ = gate.send(Ok(raw(json!({ "temperature": { "Very Hot": 50 } }))));

        let accepted = coordinator.handle_outcome(QueryOutcome {
            generation,
            key: key(&new_york(), DateSelection::default()),
            result: Ok(raw(json!({ "temperature": { "Very Hot": 50 } }))),
        });

        assert!(!accepted);
        assert_eq!(coordinator.settle().await, QueryState::Idle);
        assert!(coordinator.generation() > generation);
    }

    #[tokio::test]
    async fn reopening_queries_again() {
        let client = Arc::new(
            ScriptedClient::default()
                .reply(
                    key(&new_york(), DateSelection::default()),
                    Ok(raw(json!({ "wind": { "Windy": 10 } }))),
                )
                .reply(
                    key(&new_york(), DateSelection::default()),
                    Ok(raw(json!({ "wind": { "Windy": 30 } }))),
                ),
        );
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        coordinator.settle().await;
        coordinator.close_panel();
        coordinator.open_panel();

        let state = coordinator.settle().await;
        assert_eq!(state.profile().windy, RiskValue::Percent(30.0));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn failure_then_new_selection_recovers() {
        let client = Arc::new(
            ScriptedClient::default()
                .reply(
                    key(&new_york(), DateSelection::default()),
                    Err(PredictionError::Decode("bad".into())),
                )
                .reply(
                    key(&london(), DateSelection::default()),
                    Ok(raw(json!({ "temperature": { "Mild": 55 } }))),
                ),
        );
        let mut coordinator = coordinator(&client);

        coordinator.show_location(new_york());
        assert!(coordinator.settle().await.is_failed());

        coordinator.select_location(london());
        let state = coordinator.settle().await;

        assert!(!state.is_failed());
        assert_eq!(state.error(), None);
        assert_eq!(state.profile().mild, RiskValue::Percent(55.0));
    }

    #[tokio::test]
    async fn panicking_client_settles_as_failed() {
        let mut coordinator = QueryCoordinator::new(Arc::new(PanickingClient), 2026);

        coordinator.show_location(new_york());
        let state = tokio::time::timeout(std::time::Duration::from_secs(5), coordinator.settle())
            .await
            .expect("settle must not hang when the client panics");

        assert!(matches!(state, QueryState::Failed { kind: FailureKind::Transport, .. }));
        assert!(state.profile().is_fully_unresolved());
        assert!(!coordinator.next_outcome().await);
    }

    #[tokio::test]
    async fn next_outcome_without_query_returns_at_once() {
        let client = Arc::new(ScriptedClient::default());
        let mut coordinator = coordinator(&client);

        let applied = tokio::time::timeout(std::time::Duration::from_secs(5), coordinator.next_outcome())
            .await
            .expect("nothing in flight");

        assert!(!applied);
        assert_eq!(coordinator.state(), QueryState::Idle);
    }
}
