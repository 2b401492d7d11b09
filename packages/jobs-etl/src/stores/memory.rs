//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{PersistenceError, PersistenceResult};
use crate::traits::store::UpsertStore;
use crate::types::{
    posting::{JobPosting, PostingStats, StoredPosting, UpsertOutcome},
    run::RunMetadata,
};

/// In-memory postings and run log.
///
/// Follows the same contract as the Postgres store, plus failure injection
/// for tests. Not suitable for production as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    postings: RwLock<HashMap<String, StoredPosting>>,
    runs: RwLock<Vec<RunMetadata>>,
    next_id: AtomicI64,

    /// URIs whose upsert fails with a record-level error
    failing_uris: RwLock<HashSet<String>>,

    /// When set, every write fails with a connection error
    connection_lost: AtomicBool,

    /// Upserts left before the connection is lost
    connection_budget: RwLock<Option<usize>>,

    /// URIs passed to `upsert`, in call order
    upserts: RwLock<Vec<String>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make upserts of `uri` fail with a record-level error.
    pub fn fail_on_uri(&self, uri: impl Into<String>) {
        write(&self.failing_uris).insert(uri.into());
    }

    /// Simulate losing (or regaining) the storage connection.
    pub fn set_connection_lost(&self, lost: bool) {
        self.connection_lost.store(lost, Ordering::SeqCst);
    }

    /// Let `upserts` more upserts through, then lose the connection.
    pub fn lose_connection_after(&self, upserts: usize) {
        *write(&self.connection_budget) = Some(upserts);
    }

    /// Get the number of stored postings.
    pub fn posting_count(&self) -> usize {
        read(&self.postings).len()
    }

    /// All stored postings, ordered by id.
    pub fn postings(&self) -> Vec<StoredPosting> {
        let mut all: Vec<_> = read(&self.postings).values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    /// Recorded runs, oldest first.
    pub fn runs(&self) -> Vec<RunMetadata> {
        read(&self.runs).clone()
    }

    /// URIs passed to `upsert`, in call order.
    pub fn upserted_uris(&self) -> Vec<String> {
        read(&self.upserts).clone()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        write(&self.postings).clear();
        write(&self.runs).clear();
        write(&self.upserts).clear();
    }

    fn check_connection(&self) -> PersistenceResult<()> {
        if self.connection_lost.load(Ordering::SeqCst) {
            return Err(PersistenceError::Connection(
                "connection to memory store lost".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UpsertStore for MemoryStore {
    async fn upsert(&self, posting: &JobPosting) -> PersistenceResult<UpsertOutcome> {
        write(&self.upserts).push(posting.position_uri.clone());
        {
            let mut budget = write(&self.connection_budget);
            if *budget == Some(0) {
                *budget = None;
                self.set_connection_lost(true);
            } else if let Some(remaining) = budget.as_mut() {
                *remaining -= 1;
            }
        }
        self.check_connection()?;

        if read(&self.failing_uris).contains(&posting.position_uri) {
            return Err(PersistenceError::Record {
                uri: posting.position_uri.clone(),
                message: "injected write failure".to_string(),
            });
        }

        let now = Utc::now();
        let mut postings = write(&self.postings);
        match postings.get_mut(&posting.position_uri) {
            Some(stored) => {
                stored.posting.merge_mutable_fields(posting);
                // Strictly later, even when the clock has not moved
                stored.updated_at = now.max(stored.updated_at + ChronoDuration::microseconds(1));
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                postings.insert(
                    posting.position_uri.clone(),
                    StoredPosting {
                        id,
                        posting: posting.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn record_run(&self, metadata: &RunMetadata) -> PersistenceResult<()> {
        self.check_connection()?;
        if !metadata.is_finalized() {
            return Err(PersistenceError::Query(format!(
                "run {} is not finalized",
                metadata.run_id
            )));
        }

        let mut runs = write(&self.runs);
        if runs.iter().any(|r| r.run_id == metadata.run_id) {
            return Err(PersistenceError::Query(format!(
                "run {} already recorded",
                metadata.run_id
            )));
        }
        runs.push(metadata.clone());
        Ok(())
    }

    async fn get_posting(&self, position_uri: &str) -> PersistenceResult<Option<StoredPosting>> {
        self.check_connection()?;
        Ok(read(&self.postings).get(position_uri).cloned())
    }

    async fn count_postings(&self) -> PersistenceResult<u64> {
        self.check_connection()?;
        Ok(read(&self.postings).len() as u64)
    }

    async fn statistics(&self) -> PersistenceResult<PostingStats> {
        self.check_connection()?;
        let postings = read(&self.postings);
        let now = Utc::now();
        let today = now.date_naive();
        let week_ago = now - ChronoDuration::days(7);

        let organizations: HashSet<&str> = postings
            .values()
            .filter_map(|p| p.posting.organization_name.as_deref())
            .collect();

        Ok(PostingStats {
            total_postings: postings.len() as i64,
            unique_organizations: organizations.len() as i64,
            postings_today: postings
                .values()
                .filter(|p| p.created_at.date_naive() == today)
                .count() as i64,
            postings_this_week: postings
                .values()
                .filter(|p| p.created_at >= week_ago)
                .count() as i64,
            first_created_at: postings.values().map(|p| p.created_at).min(),
            last_created_at: postings.values().map(|p| p.created_at).max(),
        })
    }

    async fn recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunMetadata>> {
        self.check_connection()?;
        let mut runs = read(&self.runs).clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}
