//! Persistence gateway
//!
//! Saves the records of one unit and reports how many were new, how many
//! were already stored and how many could not be written. Persistence
//! failures never abort a unit; they only show up in the counts and logs.

use super::traits::RecordSink;
use super::{PersistenceKey, PropertyRow};
use crate::model::ExtractedRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Per-batch save counts
///
/// `saved + duplicate + failed` always equals the number of records handed
/// to [`PersistenceGateway::save_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub saved: u64,
    pub duplicate: u64,
    pub failed: u64,
}

impl SaveOutcome {
    pub fn total(&self) -> u64 {
        self.saved + self.duplicate + self.failed
    }
}

/// Idempotent writer in front of a [`RecordSink`]
pub struct PersistenceGateway<S> {
    sink: S,
}

impl<S: RecordSink> PersistenceGateway<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Saves a unit's records, skipping the ones already stored
    ///
    /// Each record is checked for an existing copy first; a failed check
    /// counts that record as failed. The remaining records are written in
    /// one batch. Rows the database skips through its uniqueness constraint
    /// count as duplicates. If the batch fails, every record in it counts as
    /// failed and nothing is saved.
    pub fn save_records(&mut self, records: &[ExtractedRecord]) -> SaveOutcome {
        let mut outcome = SaveOutcome::default();
        let mut seen: HashSet<PersistenceKey> = HashSet::new();
        let mut pending = Vec::new();

        for record in records {
            let row = PropertyRow::from(record);
            let key = row.persistence_key();

            if key != PersistenceKey::Unverifiable && !seen.insert(key.clone()) {
                debug!("Duplicate within batch: {:?}", key);
                outcome.duplicate += 1;
                continue;
            }

            match self.sink.exists(&row) {
                Ok(true) => outcome.duplicate += 1,
                Ok(false) => pending.push(row),
                Err(e) => {
                    warn!("Duplicate check failed for {:?}: {}", key, e);
                    outcome.failed += 1;
                }
            }
        }

        if pending.is_empty() {
            return outcome;
        }

        let written = if pending.len() == 1 {
            self.sink
                .save_one(&pending[0])
                .map(|id| id.into_iter().collect::<Vec<_>>())
        } else {
            self.sink.save_batch(&pending)
        };

        match written {
            Ok(ids) => {
                let saved = ids.len() as u64;
                outcome.saved += saved;
                outcome.duplicate += pending.len() as u64 - saved;
            }
            Err(e) => {
                error!("Failed to save {} records: {}", pending.len(), e);
                outcome.failed += pending.len() as u64;
            }
        }

        outcome
    }
}
