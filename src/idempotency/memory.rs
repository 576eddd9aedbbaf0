use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;

use super::{BeginOutcome, IdempotencyStore};
use crate::error::AppResult;

/// Size at which a claim first drops every expired record.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct StoredRecord {
    fingerprint: String,
    response: Option<Value>,
    expires_at: Instant,
}

impl StoredRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store. Claims do not survive a restart and are not shared between replicas.
#[derive(Clone, Default)]
pub struct MemoryIdempotencyStore(Arc<DashMap<(String, String), StoredRecord>>);

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired records.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.0.retain(|_, record| record.is_live(now));
    }

    fn id(scope: &str, key: &str) -> (String, String) {
        (scope.to_string(), key.to_string())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn begin(
        &self,
        scope: &str,
        key: &str,
        fingerprint: &str,
        lease: Duration,
    ) -> AppResult<BeginOutcome> {
        if self.0.len() >= SWEEP_THRESHOLD {
            self.cleanup();
        }

        let now = Instant::now();
        let fresh = StoredRecord {
            fingerprint: fingerprint.to_string(),
            response: None,
            expires_at: now + lease,
        };

        match self.0.entry(Self::id(scope, key)) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(BeginOutcome::Started)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get();
                if !record.is_live(now) {
                    occupied.insert(fresh);
                    return Ok(BeginOutcome::Started);
                }
                if record.fingerprint != fingerprint {
                    return Ok(BeginOutcome::Mismatch);
                }
                Ok(match &record.response {
                    Some(response) => BeginOutcome::Completed(response.clone()),
                    None => BeginOutcome::InFlight,
                })
            }
        }
    }

    async fn complete(
        &self,
        scope: &str,
        key: &str,
        response: &Value,
        ttl: Duration,
    ) -> AppResult<()> {
        if let Some(mut record) = self.0.get_mut(&Self::id(scope, key)) {
            record.response = Some(response.clone());
            record.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> AppResult<()> {
        self.0
            .remove_if(&Self::id(scope, key), |_, record| record.response.is_none());
        Ok(())
    }

    async fn lookup(&self, scope: &str, key: &str) -> AppResult<Option<Value>> {
        let now = Instant::now();
        Ok(self
            .0
            .get(&Self::id(scope, key))
            .filter(|record| record.is_live(now))
            .and_then(|record| record.response.clone()))
    }

    async fn record(
        &self,
        scope: &str,
        key: &str,
        response: &Value,
        ttl: Duration,
    ) -> AppResult<()> {
        self.0.insert(
            Self::id(scope, key),
            StoredRecord {
                fingerprint: String::new(),
                response: Some(response.clone()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
