use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{GradeRecord, RecordFilter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub filter: RecordFilter,
    pub version: u64,
}

/// Loaded snapshots keyed by query and store version. Stale versions are
/// dropped on the next insert.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<CacheKey, Arc<[GradeRecord]>>,
}

impl SnapshotCache {
    pub fn get(&self, filter: &RecordFilter, version: u64) -> Option<Arc<[GradeRecord]>> {
        let key = CacheKey {
            filter: filter.clone(),
            version,
        };
        self.entries.get(&key).cloned()
    }

    pub fn insert(&mut self, filter: RecordFilter, version: u64, records: Arc<[GradeRecord]>) {
        self.entries.retain(|key, _| key.version == version);
        self.entries.insert(CacheKey { filter, version }, records);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
