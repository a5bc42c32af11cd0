//! Structured run report
//!
//! Accumulated by the orchestrator over one batch and handed to the
//! reporting collaborator as data; formatting is that collaborator's
//! concern. Per-record issues land here instead of aborting the batch.

use crate::error::RecordIssue;
use chrono::{DateTime, Utc};
use refill_common::models::VenueStatus;
use serde::Serialize;

/// Records entering and leaving one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageCount {
    pub stage: String,
    pub records_in: usize,
    pub records_out: usize,
}

/// One record excluded from persistence, with the reason
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineEntry {
    pub name: String,
    pub external_id: Option<String>,
    pub reason: RecordIssue,
    pub detail: String,
}

/// A cluster that carried multiple distinct external identifiers
#[derive(Debug, Clone, Serialize)]
pub struct MergeConflictEntry {
    pub venue_name: String,
    /// All identifiers kept as aliases for manual review
    pub external_ids: Vec<String>,
}

/// What caused a status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTrigger {
    /// Absent from every crawl for longer than the staleness window
    Staleness,
    /// Liveness checks failed on consecutive runs
    LivenessFailure,
    /// Externally supplied manual override (audited here)
    ManualOverride,
}

/// One applied status transition
#[derive(Debug, Clone, Serialize)]
pub struct StatusTransitionEntry {
    pub venue_name: String,
    pub external_id: Option<String>,
    pub from: VenueStatus,
    pub to: VenueStatus,
    pub trigger: StatusTrigger,
}

/// Complete report for one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records_in: usize,
    /// Dropped for empty name/address
    pub malformed: usize,
    /// Forwarded to the geocoding collaborator (coordinates absent)
    pub deferred_geocoding: usize,
    pub quarantined: Vec<QuarantineEntry>,
    pub clusters: usize,
    pub merge_conflicts: Vec<MergeConflictEntry>,
    /// Names of records excluded from clustering pending manual review
    pub manual_review: Vec<String>,
    pub status_transitions: Vec<StatusTransitionEntry>,
    pub venues_created: usize,
    pub venues_updated: usize,
    pub stages: Vec<StageCount>,
}

impl RunReport {
    pub fn new(records_in: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            records_in,
            malformed: 0,
            deferred_geocoding: 0,
            quarantined: Vec::new(),
            clusters: 0,
            merge_conflicts: Vec::new(),
            manual_review: Vec::new(),
            status_transitions: Vec::new(),
            venues_created: 0,
            venues_updated: 0,
            stages: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, stage: &str, records_in: usize, records_out: usize) {
        self.stages.push(StageCount {
            stage: stage.to_string(),
            records_in,
            records_out,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "in={} malformed={} quarantined={} deferred={} clusters={} conflicts={} created={} updated={} transitions={}",
            self.records_in,
            self.malformed,
            self.quarantined.len(),
            self.deferred_geocoding,
            self.clusters,
            self.merge_conflicts.len(),
            self.venues_created,
            self.venues_updated,
            self.status_transitions.len(),
        )
    }
}
