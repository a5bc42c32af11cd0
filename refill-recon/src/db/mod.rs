//! Persistence port
//!
//! The pipeline core is pure; everything it needs from storage goes through
//! `VenueStore`. `PgVenueStore` is the production implementation,
//! `MemoryStore` backs tests and dry runs.

mod store;

pub use store::PgVenueStore;

use crate::error::PipelineResult;
use crate::pipeline::{BatchOutcome, ReconPipeline};
use crate::types::StatusInputs;
use refill_common::models::{CanonicalVenue, RawVenueRecord};
use refill_common::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Storage boundary for canonical venues
pub trait VenueStore {
    /// Load the full canonical set for matching against a batch
    fn load_existing(&self) -> impl std::future::Future<Output = Result<Vec<CanonicalVenue>>> + Send;

    /// Write created and updated venues; must be all-or-nothing
    fn upsert_batch(
        &self,
        venues: &[CanonicalVenue],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Load, reconcile, persist: the full cycle for one batch
pub async fn run_with_store<S: VenueStore>(
    pipeline: &ReconPipeline,
    store: &S,
    batch: &[RawVenueRecord],
    inputs: &StatusInputs,
) -> PipelineResult<BatchOutcome> {
    let existing = store.load_existing().await.map_err(crate::error::PipelineError::Store)?;
    info!(existing = existing.len(), "canonical set loaded");

    let outcome = pipeline.run(batch, &existing, inputs)?;

    store
        .upsert_batch(&outcome.venues)
        .await
        .map_err(crate::error::PipelineError::Store)?;
    Ok(outcome)
}

/// In-memory store for tests and `--dry-run`
#[derive(Default)]
pub struct MemoryStore {
    venues: Mutex<HashMap<Uuid, CanonicalVenue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.venues.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Option<CanonicalVenue> {
        let venues = self.venues.lock().ok()?;
        venues
            .values()
            .find(|v| v.external_id.as_deref() == Some(external_id))
            .cloned()
    }
}

impl VenueStore for MemoryStore {
    async fn load_existing(&self) -> Result<Vec<CanonicalVenue>> {
        let venues = self
            .venues
            .lock()
            .map_err(|_| refill_common::Error::Internal("memory store poisoned".to_string()))?;
        let mut all: Vec<CanonicalVenue> = venues.values().cloned().collect();
        // Deterministic order for callers and assertions
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn upsert_batch(&self, batch: &[CanonicalVenue]) -> Result<()> {
        let mut venues = self
            .venues
            .lock()
            .map_err(|_| refill_common::Error::Internal("memory store poisoned".to_string()))?;
        for venue in batch {
            venues.insert(venue.id, venue.clone());
        }
        Ok(())
    }
}
