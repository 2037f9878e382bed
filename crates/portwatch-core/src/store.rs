use crate::criteria::{CriteriaStore, FilterCriteria, SortColumn, SortSpec};
use crate::pipeline::derive_indices;
use crate::{PortRecord, PortStats, RecordKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Latest raw snapshot. Replaced wholesale by a full discovery, merged by a
/// range scan.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<PortRecord>,
    last_refresh: Option<DateTime<Utc>>,
    revision: u64,
}

impl RecordStore {
    pub fn records(&self) -> &[PortRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_snapshot(&mut self, records: Vec<PortRecord>) {
        self.set_snapshot_at(records, Utc::now());
    }

    pub fn set_snapshot_at(&mut self, records: Vec<PortRecord>, at: DateTime<Utc>) {
        self.records = records;
        self.last_refresh = Some(at);
        self.revision = self.revision.wrapping_add(1);
    }

    /// Overwrites records sharing an identity triple in place and appends the
    /// rest in arrival order. Existing records missing from `incoming` stay.
    pub fn merge_snapshot(&mut self, incoming: Vec<PortRecord>) {
        let mut merged = self.records.clone();
        let mut positions: HashMap<RecordKey, usize> = merged
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.key(), idx))
            .collect();

        for record in incoming {
            match positions.get(&record.key()) {
                Some(&idx) => merged[idx] = record,
                None => {
                    positions.insert(record.key(), merged.len());
                    merged.push(record);
                }
            }
        }

        self.records = merged;
        self.last_refresh = Some(Utc::now());
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Sent to subscribers after any input to the derived view changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    Records { revision: u64 },
    Criteria { revision: u64 },
}

#[derive(Debug, Clone)]
struct DerivedCache {
    records_revision: u64,
    criteria_revision: u64,
    indices: Vec<usize>,
}

/// Borrowed, ordered view over the raw records.
#[derive(Debug, Clone, Copy)]
pub struct DerivedView<'a> {
    records: &'a [PortRecord],
    indices: &'a [usize],
}

impl<'a> DerivedView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&'a PortRecord> {
        self.indices
            .get(position)
            .and_then(|&idx| self.records.get(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a PortRecord> + 'a {
        let (records, indices) = (self.records, self.indices);
        indices.iter().map(move |&idx| &records[idx])
    }

    /// Rows `[start, end)` of the view, clamped to its length.
    pub fn slice(&self, start: usize, end: usize) -> impl Iterator<Item = &'a PortRecord> + 'a {
        let end = end.min(self.indices.len());
        let start = start.min(end);
        let (records, indices) = (self.records, self.indices);
        indices[start..end].iter().map(move |&idx| &records[idx])
    }

    pub fn position_of(&self, key: RecordKey) -> Option<usize> {
        self.iter().position(|record| record.key() == key)
    }
}

/// Record store plus criteria store plus the memoized derivation between them.
///
/// The derived order is recomputed lazily on the first read after either
/// store's revision moves.
#[derive(Debug, Default)]
pub struct PortView {
    records: RecordStore,
    criteria: CriteriaStore,
    cache: Option<DerivedCache>,
    computations: u64,
    subscribers: Vec<Sender<ViewChange>>,
}

impl PortView {
    pub fn new(sort: SortSpec) -> Self {
        Self {
            criteria: CriteriaStore::new(sort),
            ..Self::default()
        }
    }

    pub fn record_store(&self) -> &RecordStore {
        &self.records
    }

    pub fn criteria(&self) -> &CriteriaStore {
        &self.criteria
    }

    pub fn subscribe(&mut self) -> Receiver<ViewChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn set_snapshot(&mut self, records: Vec<PortRecord>) {
        self.records.set_snapshot(records);
        self.notify_records();
    }

    pub fn merge_snapshot(&mut self, records: Vec<PortRecord>) {
        self.records.merge_snapshot(records);
        self.notify_records();
    }

    pub fn set_search(&mut self, text: impl Into<String>) -> bool {
        let changed = self.criteria.set_search(text);
        self.notify_criteria(changed)
    }

    pub fn set_filters(&mut self, filters: FilterCriteria) -> bool {
        let changed = self.criteria.set_filters(filters);
        self.notify_criteria(changed)
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> bool {
        let changed = self.criteria.set_sort(sort);
        self.notify_criteria(changed)
    }

    pub fn toggle_sort(&mut self, column: SortColumn) -> bool {
        let changed = self.criteria.toggle_sort(column);
        self.notify_criteria(changed)
    }

    pub fn reset(&mut self) -> bool {
        let changed = self.criteria.reset();
        self.notify_criteria(changed)
    }

    pub fn reset_sort(&mut self) -> bool {
        let changed = self.criteria.reset_sort();
        self.notify_criteria(changed)
    }

    pub fn view(&mut self) -> DerivedView<'_> {
        self.refresh_cache();
        let indices = self
            .cache
            .as_ref()
            .map(|cache| cache.indices.as_slice())
            .unwrap_or(&[]);
        DerivedView {
            records: self.records.records(),
            indices,
        }
    }

    pub fn total_count(&self) -> usize {
        self.records.len()
    }

    pub fn filtered_count(&mut self) -> usize {
        self.view().len()
    }

    pub fn stats(&self) -> PortStats {
        PortStats::from_records(self.records.records())
    }

    /// How many times the pipeline actually ran.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    fn refresh_cache(&mut self) {
        let records_revision = self.records.revision();
        let criteria_revision = self.criteria.revision();
        let fresh = self.cache.as_ref().is_some_and(|cache| {
            cache.records_revision == records_revision
                && cache.criteria_revision == criteria_revision
        });
        if fresh {
            return;
        }

        let indices = derive_indices(
            self.records.records(),
            self.criteria.search(),
            self.criteria.filters(),
            self.criteria.sort(),
        );
        self.computations += 1;
        self.cache = Some(DerivedCache {
            records_revision,
            criteria_revision,
            indices,
        });
    }

    fn notify_records(&mut self) {
        let change = ViewChange::Records {
            revision: self.records.revision(),
        };
        self.broadcast(change);
    }

    fn notify_criteria(&mut self, changed: bool) -> bool {
        if changed {
            let change = ViewChange::Criteria {
                revision: self.criteria.revision(),
            };
            self.broadcast(change);
        }
        changed
    }

    fn broadcast(&mut self, change: ViewChange) {
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }
}
