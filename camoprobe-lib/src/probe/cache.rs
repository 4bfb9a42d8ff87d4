use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::key::ProbeKey;

/// Post-handshake record lengths of one key
///
/// Serialized as `null` while pending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "Option<Vec<usize>>")]
pub enum RecordLens {
    /// Claimed, probe in flight
    #[default]
    Pending,
    /// Lengths in arrival order, header included. May be empty.
    Resolved(Vec<usize>),
}

impl From<RecordLens> for Option<Vec<usize>> {
    fn from(lens: RecordLens) -> Self {
        match lens {
            RecordLens::Pending => None,
            RecordLens::Resolved(lens) => Some(lens),
        }
    }
}

/// Everything measured for one claimed key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProbeResult {
    pub record_lens: RecordLens,
    /// Duplicate CCS messages tolerated; absent until the CCS probe records it
    pub max_ccs_count: Option<i32>,
}

/// A cache entry together with its key, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    #[serde(flatten)]
    pub key: ProbeKey,
    #[serde(flatten)]
    pub result: ProbeResult,
}

/// Concurrent store of probe results keyed by [`ProbeKey`]
///
/// Claiming a key is the only way the prober decides to launch work for it,
/// so at most one probe pair is ever in flight per key.
#[derive(Debug)]
pub struct ProbeCache {
    entries: DashMap<ProbeKey, ProbeResult, RandomState>,
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeCache {
    pub fn new() -> Self {
        Self { entries: DashMap::with_hasher(RandomState::new()) }
    }

    /// Atomically claims `key`. Returns `false` if it was already claimed.
    pub fn try_claim(&self, key: &ProbeKey) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(ProbeResult::default());
                true
            }
        }
    }

    pub fn resolve_record_lens(&self, key: &ProbeKey, lens: Vec<usize>) {
        self.entries.entry(key.clone()).or_default().record_lens = RecordLens::Resolved(lens);
    }

    /// Resolves a still-pending key to an empty sequence.
    /// Returns `true` if the entry was pending.
    pub fn settle_pending(&self, key: &ProbeKey) -> bool {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.record_lens == RecordLens::Pending {
            entry.record_lens = RecordLens::Resolved(Vec::new());
            return true;
        }
        false
    }

    pub fn store_max_ccs_count(&self, key: &ProbeKey, count: i32) {
        self.entries.entry(key.clone()).or_default().max_ccs_count = Some(count);
    }

    pub fn lookup(&self, key: &ProbeKey) -> Option<ProbeResult> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Resolved record lengths, `None` while pending or absent
    pub fn record_lens(&self, key: &ProbeKey) -> Option<Vec<usize>> {
        self.entries
            .get(key)
            .and_then(|entry| Option::<Vec<usize>>::from(entry.record_lens.clone()))
    }

    pub fn max_ccs_count(&self, key: &ProbeKey) -> Option<i32> {
        self.entries.get(key).and_then(|entry| entry.max_ccs_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ordered by key
    pub fn snapshot(&self) -> Vec<ProbeReport> {
        let mut reports: Vec<ProbeReport> = self
            .entries
            .iter()
            .map(|entry| ProbeReport { key: entry.key().clone(), result: entry.value().clone() })
            .collect();
        reports.sort_by(|a, b| a.key.cmp(&b.key));
        reports
    }
}
