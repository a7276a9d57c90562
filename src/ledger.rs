use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Hash of the empty chain: 64 zero hex characters.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Aggregate bucket used when an event is appended without an explicit id.
pub const GLOBAL_AGGREGATE: &str = "global";

/// A single entry in a ledger table. Immutable once appended: events are
/// never rewritten or removed, only verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEvent {
    /// Table-local sequence number, monotonically increasing from 0.
    pub sequence_id: u64,
    /// Free-form tag describing what happened.
    pub event_type: String,
    /// Logical grouping key; [GLOBAL_AGGREGATE] when none was given.
    pub aggregate_id: String,
    /// Canonical JSON payload (sorted object keys), exactly the bytes that
    /// were hashed.
    pub data: String,
    pub timestamp: DateTime<Utc>,
    /// Chain head at the time this event was appended.
    pub previous_hash: String,
    /// SHA-256 over `{sequence_id}{event_type}{data}{previous_hash}`.
    pub current_hash: String,
}

/// Outcome of a chain verification walk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_events: usize,
    pub invalid_events: Vec<InvalidEvent>,
}

/// One event whose stored hash does not match the recomputed chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidEvent {
    pub event_id: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

/// Deterministic serialization for event payloads: `serde_json::Map` keeps
/// its keys sorted, so encoding a [serde_json::Value] tree yields identical
/// bytes for semantically identical records.
pub fn canonical_json(data: &serde_json::Value) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "null".to_string())
}

fn event_hash(sequence_id: u64, event_type: &str, data: &str, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence_id.to_string().as_bytes());
    hasher.update(event_type.as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(previous_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// State record produced by an event-sourcing replay.
pub type ReplayState = serde_json::Map<String, serde_json::Value>;

type Handler = Box<dyn Fn(&mut ReplayState, &serde_json::Value)>;

/// Dispatch table for [LedgerTable::replay_events]: one handler per event
/// type. Events with no registered handler are skipped, so hosts grow the
/// table per domain event type without touching the fold itself.
#[derive(Default)]
pub struct ReplayDispatch {
    handlers: HashMap<String, Handler>,
}

impl ReplayDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `event_type`, replacing any previous one.
    pub fn on<F>(mut self, event_type: &str, handler: F) -> Self
    where
        F: Fn(&mut ReplayState, &serde_json::Value) + 'static,
    {
        self.handlers.insert(event_type.to_string(), Box::new(handler));
        self
    }

    /// The stock payment fold: `PAYMENT_RECEIVED` raises `balance` by the
    /// event's `amount`, `PAYMENT_SENT` lowers it.
    pub fn payments() -> Self {
        Self::new()
            .on("PAYMENT_RECEIVED", |state, data| {
                adjust_balance(state, data, 1.0);
            })
            .on("PAYMENT_SENT", |state, data| {
                adjust_balance(state, data, -1.0);
            })
    }

    fn apply(&self, state: &mut ReplayState, event_type: &str, data: &serde_json::Value) {
        if let Some(handler) = self.handlers.get(event_type) {
            handler(state, data);
        }
    }
}

/// Adds `sign * data.amount` onto `state.balance`.
pub fn adjust_balance(state: &mut ReplayState, data: &serde_json::Value, sign: f64) {
    let amount = data
        .get("amount")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    let balance = state
        .get("balance")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    if let Some(number) = serde_json::Number::from_f64(balance + sign * amount) {
        state.insert("balance".to_string(), serde_json::Value::Number(number));
    }
}

/// An append-only, hash-chained event log.
///
/// Every event's hash covers its predecessor's hash, so any rewrite of a
/// stored event breaks the chain from that point on.
pub struct LedgerTable {
    name: String,
    events: Vec<LedgerEvent>,
    /// Chain head: the hash of the most recent event, [GENESIS_HASH] while
    /// empty.
    current_hash: String,
    /// aggregate id → positions of that aggregate's events, in append order.
    aggregate_index: HashMap<String, Vec<usize>>,
}

impl LedgerTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            current_hash: GENESIS_HASH.to_string(),
            aggregate_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The chain head.
    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Appends an immutable event and advances the chain head.
    ///
    /// The payload is canonicalized before hashing so that semantically
    /// identical records always hash identically. Returns the assigned
    /// sequence id and the event's hash.
    pub fn append_event(
        &mut self,
        event_type: &str,
        data: &serde_json::Value,
        aggregate_id: Option<&str>,
    ) -> (u64, String) {
        let sequence_id = self.events.len() as u64;
        let aggregate_id = aggregate_id.unwrap_or(GLOBAL_AGGREGATE).to_string();
        let data = canonical_json(data);
        let previous_hash = self.current_hash.clone();
        let current_hash = event_hash(sequence_id, event_type, &data, &previous_hash);

        self.aggregate_index
            .entry(aggregate_id.clone())
            .or_default()
            .push(self.events.len());

        self.events.push(LedgerEvent {
            sequence_id,
            event_type: event_type.to_string(),
            aggregate_id,
            data,
            timestamp: Utc::now(),
            previous_hash,
            current_hash: current_hash.clone(),
        });
        self.current_hash = current_hash.clone();

        debug!(ledger = %self.name, sequence_id, event_type, "event appended");
        (sequence_id, current_hash)
    }

    /// Walks the chain from genesis, recomputing every hash forward.
    ///
    /// The expected hash of each event chains on the *recomputed* hash of the
    /// one before it; stored fields are never trusted during the walk. This
    /// means rewriting a `current_hash` together with the next event's
    /// `previous_hash` still surfaces as a mismatch, and also that a single
    /// tampered event invalidates every later index.
    pub fn verify_chain(&self) -> ChainVerification {
        let mut running = GENESIS_HASH.to_string();
        let mut invalid_events = Vec::new();

        for (i, event) in self.events.iter().enumerate() {
            let expected =
                event_hash(event.sequence_id, &event.event_type, &event.data, &running);
            if expected != event.current_hash {
                invalid_events.push(InvalidEvent {
                    event_id: i as u64,
                    expected_hash: expected.clone(),
                    actual_hash: event.current_hash.clone(),
                });
            }
            running = expected;
        }

        let verification = ChainVerification {
            valid: invalid_events.is_empty(),
            total_events: self.events.len(),
            invalid_events,
        };
        info!(
            ledger = %self.name,
            valid = verification.valid,
            total_events = verification.total_events,
            "chain verified"
        );
        verification
    }

    /// Chronological copies of events, optionally narrowed to one aggregate.
    pub fn get_events(&self, aggregate_id: Option<&str>) -> Vec<LedgerEvent> {
        match aggregate_id {
            Some(aggregate) => self
                .aggregate_index
                .get(aggregate)
                .map(|positions| {
                    positions
                        .iter()
                        .filter_map(|&position| self.events.get(position).cloned())
                        .collect()
                })
                .unwrap_or_default(),
            None => self.events.clone(),
        }
    }

    /// Folds the aggregate's events through `dispatch`, oldest first,
    /// starting from an empty state record (event sourcing).
    pub fn replay_events(&self, aggregate_id: &str, dispatch: &ReplayDispatch) -> ReplayState {
        let mut state = ReplayState::new();
        for event in self.get_events(Some(aggregate_id)) {
            let Ok(data) = serde_json::from_str::<serde_json::Value>(&event.data) else {
                continue;
            };
            dispatch.apply(&mut state, &event.event_type, &data);
        }
        state
    }
}

/// Owns every ledger table of a database. Construct one and pass it where it
/// is needed; [crate::database::Database] embeds one per instance, so
/// lifetime and test isolation stay explicit.
#[derive(Default)]
pub struct LedgerRegistry {
    tables: HashMap<String, LedgerTable>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new ledger table.
    ///
    /// # Errors
    /// [EngineError::AlreadyExists] if the name is taken.
    pub fn create_table(&mut self, name: &str) -> Result<&mut LedgerTable> {
        if self.tables.contains_key(name) {
            return Err(EngineError::AlreadyExists(name.to_string()));
        }
        info!(ledger = %name, "ledger table created");
        Ok(self
            .tables
            .entry(name.to_string())
            .or_insert_with(|| LedgerTable::new(name)))
    }

    pub fn get_table(&self, name: &str) -> Option<&LedgerTable> {
        self.tables.get(name)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut LedgerTable> {
        self.tables.get_mut(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_assigns_sequence_ids_and_links_hashes() {
        let mut ledger = LedgerTable::new("payments");

        let (id0, hash0) = ledger.append_event("DEPOSIT", &json!({"amount": 100}), None);
        let (id1, hash1) = ledger.append_event("WITHDRAW", &json!({"amount": 30}), None);

        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
        assert_ne!(hash0, hash1);
        assert_eq!(ledger.events()[0].previous_hash, GENESIS_HASH);
        assert_eq!(ledger.events()[1].previous_hash, hash0);
        assert_eq!(ledger.current_hash(), hash1);
    }

    #[test]
    fn test_canonical_data_is_key_order_independent() {
        let mut a = LedgerTable::new("a");
        let mut b = LedgerTable::new("b");

        let (_, hash_a) =
            a.append_event("E", &json!({"x": 1, "y": 2}), None);
        let (_, hash_b) =
            b.append_event("E", &json!({"y": 2, "x": 1}), None);

        assert_eq!(hash_a, hash_b);
        assert_eq!(a.events()[0].data, "{\"x\":1,\"y\":2}");
    }

    #[test]
    fn test_verify_chain_round_trip() {
        let mut ledger = LedgerTable::new("payments");
        for i in 0..5 {
            ledger.append_event("DEPOSIT", &json!({"amount": i}), Some("acct-1"));
        }

        let verification = ledger.verify_chain();
        assert!(verification.valid);
        assert_eq!(verification.total_events, 5);
        assert!(verification.invalid_events.is_empty());
    }

    #[test]
    fn test_verify_detects_data_tampering() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("DEPOSIT", &json!({"amount": 100}), None);
        ledger.append_event("DEPOSIT", &json!({"amount": 200}), None);
        ledger.append_event("DEPOSIT", &json!({"amount": 300}), None);

        ledger.events[1].data = "{\"amount\":9999}".to_string();

        let verification = ledger.verify_chain();
        assert!(!verification.valid);
        assert_eq!(verification.total_events, 3);
        // forward recomputation cascades past the tamper point
        let ids: Vec<u64> = verification
            .invalid_events
            .iter()
            .map(|e| e.event_id)
            .collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
    }

    #[test]
    fn test_verify_flags_tampered_tail_hash() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("DEPOSIT", &json!({"amount": 100}), None);
        ledger.append_event("DEPOSIT", &json!({"amount": 200}), None);

        ledger.events[1].current_hash = "f".repeat(64);

        let verification = ledger.verify_chain();
        assert!(!verification.valid);
        assert_eq!(verification.invalid_events.len(), 1);
        assert_eq!(verification.invalid_events[0].event_id, 1);
    }

    #[test]
    fn test_verify_detects_consistent_double_edit() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("DEPOSIT", &json!({"amount": 100}), None);
        ledger.append_event("DEPOSIT", &json!({"amount": 200}), None);

        // rewrite event 0's hash and stitch event 1's previous_hash to match;
        // the original stored-field verification would miss this
        let forged = "a".repeat(64);
        ledger.events[0].current_hash = forged.clone();
        ledger.events[1].previous_hash = forged;

        let verification = ledger.verify_chain();
        assert!(!verification.valid);
        assert_eq!(verification.invalid_events[0].event_id, 0);
    }

    #[test]
    fn test_get_events_filters_by_aggregate() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("DEPOSIT", &json!({"amount": 1}), Some("acct-1"));
        ledger.append_event("DEPOSIT", &json!({"amount": 2}), Some("acct-2"));
        ledger.append_event("DEPOSIT", &json!({"amount": 3}), Some("acct-1"));
        ledger.append_event("DEPOSIT", &json!({"amount": 4}), None);

        let all = ledger.get_events(None);
        assert_eq!(all.len(), 4);

        let acct1 = ledger.get_events(Some("acct-1"));
        assert_eq!(acct1.len(), 2);
        assert_eq!(acct1[0].sequence_id, 0);
        assert_eq!(acct1[1].sequence_id, 2);

        // defaulted events land in the global bucket
        let global = ledger.get_events(Some(GLOBAL_AGGREGATE));
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].sequence_id, 3);

        assert!(ledger.get_events(Some("unknown")).is_empty());
    }

    #[test]
    fn test_replay_balance_fold() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("DEPOSIT", &json!({"amount": 100}), Some("acct-1"));
        ledger.append_event("WITHDRAW", &json!({"amount": 30}), Some("acct-1"));
        ledger.append_event("NOTE", &json!({"text": "ignored"}), Some("acct-1"));

        let dispatch = ReplayDispatch::new()
            .on("DEPOSIT", |state, data| adjust_balance(state, data, 1.0))
            .on("WITHDRAW", |state, data| adjust_balance(state, data, -1.0));

        let state = ledger.replay_events("acct-1", &dispatch);
        assert_eq!(
            state.get("balance").and_then(serde_json::Value::as_f64),
            Some(70.0)
        );
    }

    #[test]
    fn test_replay_stock_payments_dispatch() {
        let mut ledger = LedgerTable::new("payments");
        ledger.append_event("PAYMENT_RECEIVED", &json!({"amount": 50}), Some("acct-9"));
        ledger.append_event("PAYMENT_SENT", &json!({"amount": 20}), Some("acct-9"));

        let state = ledger.replay_events("acct-9", &ReplayDispatch::payments());
        assert_eq!(
            state.get("balance").and_then(serde_json::Value::as_f64),
            Some(30.0)
        );
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = LedgerRegistry::new();
        registry.create_table("payments").unwrap();

        let result = registry.create_table("payments");
        assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
        assert_eq!(registry.list_tables(), vec!["payments"]);
    }
}
