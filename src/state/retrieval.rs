use crate::crawler::StopReason;
use crate::state::{Disposition, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Snapshot format version written into every persisted state
pub const SNAPSHOT_VERSION: u32 = 1;

/// Process counters carried across runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Pages fetched successfully
    pub pages_fetched: u64,

    /// Pages whose request failed without a block
    pub pages_failed: u64,

    /// Candidates returned by the extractor, valid or not
    pub items_seen: u64,
}

/// Where the crawl started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub url: String,
    pub started_at: DateTime<Utc>,
}

/// The durable, resumable record of retrieval progress
///
/// Records are kept in insertion order for deterministic export, with an
/// identifier index rebuilt whenever a snapshot is deserialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StateSnapshot")]
pub struct RetrievalState {
    version: u32,
    records: Vec<Record>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    dispositions: BTreeMap<String, Disposition>,
    counters: Counters,
    query: Option<QueryInfo>,
    next_page_url: Option<String>,
    last_stop: Option<StopReason>,
    saved_at: Option<DateTime<Utc>>,
}

/// Wire shape of a persisted snapshot
#[derive(Deserialize)]
struct StateSnapshot {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    dispositions: BTreeMap<String, Disposition>,
    #[serde(default)]
    counters: Counters,
    #[serde(default)]
    query: Option<QueryInfo>,
    #[serde(default)]
    next_page_url: Option<String>,
    #[serde(default)]
    last_stop: Option<StopReason>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

impl From<StateSnapshot> for RetrievalState {
    fn from(snapshot: StateSnapshot) -> Self {
        let mut state = Self {
            version: snapshot.version,
            records: Vec::with_capacity(snapshot.records.len()),
            index: HashMap::new(),
            dispositions: snapshot.dispositions,
            counters: snapshot.counters,
            query: snapshot.query,
            next_page_url: snapshot.next_page_url,
            last_stop: snapshot.last_stop,
            saved_at: snapshot.saved_at,
        };

        // A hand-edited snapshot may repeat an id; the first entry wins.
        for record in snapshot.records {
            if !state.index.contains_key(&record.id) {
                state.index.insert(record.id.clone(), state.records.len());
                state.records.push(record);
            }
        }

        state
    }
}

impl RetrievalState {
    /// Creates an empty state for a fresh run starting at `seed_url`
    pub fn new(seed_url: &str) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            query: Some(QueryInfo {
                url: seed_url.to_string(),
                started_at: Utc::now(),
            }),
            next_page_url: Some(seed_url.to_string()),
            ..Self::default()
        }
    }

    /// Inserts a record unless its identifier is already present
    ///
    /// New records start with a `Pending` disposition.
    ///
    /// # Returns
    ///
    /// `true` if the record was new, `false` if it was a duplicate (the
    /// existing entry is kept unchanged)
    pub fn insert(&mut self, record: Record) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }

        self.dispositions
            .entry(record.id.clone())
            .or_insert(Disposition::Pending);
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Number of distinct records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        match self.index.get(id) {
            Some(&i) => self.records.get_mut(i),
            None => None,
        }
    }

    /// Records in insertion order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn disposition(&self, id: &str) -> Option<Disposition> {
        self.dispositions.get(id).copied()
    }

    /// Sets the disposition for a record; last write wins
    pub fn set_disposition(&mut self, id: &str, disposition: Disposition) {
        self.dispositions.insert(id.to_string(), disposition);
    }

    pub fn dispositions(&self) -> &BTreeMap<String, Disposition> {
        &self.dispositions
    }

    /// Counts records per disposition; records without an entry count as pending
    pub fn disposition_counts(&self) -> BTreeMap<Disposition, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            let disposition = self
                .disposition(&record.id)
                .unwrap_or(Disposition::Pending);
            *counts.entry(disposition).or_insert(0) += 1;
        }
        counts
    }

    /// Identifiers of records whose artifact still needs acquiring, in insertion order
    pub fn ids_needing_acquisition(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| {
                self.disposition(&r.id)
                    .unwrap_or(Disposition::Pending)
                    .needs_acquisition()
            })
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn record_page_fetched(&mut self, items_seen: usize) {
        self.counters.pages_fetched += 1;
        self.counters.items_seen += items_seen as u64;
    }

    pub fn record_page_failed(&mut self) {
        self.counters.pages_failed += 1;
    }

    pub fn query(&self) -> Option<&QueryInfo> {
        self.query.as_ref()
    }

    /// The first page not yet consumed, `None` once the listing is exhausted
    pub fn next_page_url(&self) -> Option<&str> {
        self.next_page_url.as_deref()
    }

    pub fn set_next_page_url(&mut self, url: Option<String>) {
        self.next_page_url = url;
    }

    pub fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }

    pub fn set_last_stop(&mut self, reason: StopReason) {
        self.last_stop = Some(reason);
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// Stamps the state just before it is written out
    pub fn mark_saved(&mut self) {
        self.version = SNAPSHOT_VERSION;
        self.saved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CandidateRecord;

    fn record(title: &str) -> Record {
        Record::from_candidate(CandidateRecord {
            title: title.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_state_points_at_seed() {
        let state = RetrievalState::new("https://example.com/scholar?q=x");
        assert!(state.is_empty());
        assert_eq!(state.next_page_url(), Some("https://example.com/scholar?q=x"));
        assert_eq!(
            state.query().map(|q| q.url.as_str()),
            Some("https://example.com/scholar?q=x")
        );
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut state = RetrievalState::default();
        assert!(state.insert(record("Paper A")));
        assert!(!state.insert(record("Paper A")));
        assert_eq!(state.len(), 1);
        assert_eq!(state.dispositions().len(), 1);
    }

    #[test]
    fn test_duplicate_insert_keeps_existing_entry() {
        let mut state = RetrievalState::default();
        let mut first = record("Paper A");
        first.citations = 7;
        state.insert(first.clone());

        state.insert(record("Paper A"));
        assert_eq!(state.get(&first.id).unwrap().citations, 7);
    }

    #[test]
    fn test_new_records_are_pending() {
        let mut state = RetrievalState::default();
        let r = record("Paper A");
        state.insert(r.clone());
        assert_eq!(state.disposition(&r.id), Some(Disposition::Pending));
    }

    #[test]
    fn test_disposition_last_write_wins() {
        let mut state = RetrievalState::default();
        let r = record("Paper A");
        state.insert(r.clone());

        state.set_disposition(&r.id, Disposition::Failed);
        state.set_disposition(&r.id, Disposition::Downloaded);
        assert_eq!(state.disposition(&r.id), Some(Disposition::Downloaded));
        assert!(state.ids_needing_acquisition().is_empty());
    }

    #[test]
    fn test_ids_needing_acquisition_in_insertion_order() {
        let mut state = RetrievalState::default();
        let a = record("Paper A");
        let b = record("Paper B");
        let c = record("Paper C");
        state.insert(a.clone());
        state.insert(b.clone());
        state.insert(c.clone());
        state.set_disposition(&b.id, Disposition::Downloaded);

        assert_eq!(state.ids_needing_acquisition(), vec![a.id, c.id]);
    }

    #[test]
    fn test_snapshot_roundtrip_rebuilds_index() {
        let mut state = RetrievalState::new("https://example.com/");
        let r = record("Paper A");
        state.insert(r.clone());
        state.record_page_fetched(3);
        state.set_last_stop(StopReason::Exhausted);

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: RetrievalState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 1);
        assert!(restored.contains(&r.id));
        assert!(!restored.insert(record("Paper A")));
        assert_eq!(restored.counters().pages_fetched, 1);
        assert_eq!(restored.counters().items_seen, 3);
        assert_eq!(restored.last_stop(), Some(StopReason::Exhausted));
    }

    #[test]
    fn test_disposition_counts() {
        let mut state = RetrievalState::default();
        let a = record("Paper A");
        state.insert(a.clone());
        state.insert(record("Paper B"));
        state.set_disposition(&a.id, Disposition::InvalidFormat);

        let counts = state.disposition_counts();
        assert_eq!(counts.get(&Disposition::InvalidFormat), Some(&1));
        assert_eq!(counts.get(&Disposition::Pending), Some(&1));
    }
}
