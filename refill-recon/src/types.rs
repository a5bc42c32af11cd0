//! Shared data contracts between pipeline stages
//!
//! Each stage consumes and produces these types only; no stage reaches into
//! another stage's internals.

use chrono::{DateTime, Utc};
use refill_common::models::{Coordinates, PriceInfo, StructuredHours};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A raw record after field normalization
///
/// Name and address are guaranteed non-empty; everything optional really is
/// optional. `categories` stays empty until the category-mapping stage runs.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedVenue {
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    pub raw_categories: Vec<String>,
    pub phone: Option<String>,
    pub price: Option<PriceInfo>,
    pub hours_raw: Option<String>,
    pub hours: Option<StructuredHours>,
    pub coordinates: Option<Coordinates>,
    /// Well-formed absolute http(s) URLs, deduplicated, at most 5
    pub images: Vec<String>,
    pub refill_items: Vec<String>,
    /// Matched the configured refill keyword set (name / tags / description)
    pub refill_relevant: bool,
    /// Standard categories, filled by the category mapper (then non-empty)
    pub categories: Vec<String>,
    /// Coordinates were absent; forward to the geocoding collaborator
    pub needs_geocoding: bool,
    pub crawled_at: DateTime<Utc>,
}

/// Outcome of coordinate validation for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateCheck {
    /// Inside the configured bounding box
    Valid,
    /// Present but outside the bounding box; quarantine
    OutOfRegion,
    /// Absent; forward flagged for geocoding-by-address
    Missing,
}

/// A set of batch records believed to denote one physical venue
///
/// Members are indexes into the validated batch. Formed by connected
/// components over the pairwise link graph, so members are not necessarily
/// all pairwise near-duplicates.
#[derive(Debug, Clone)]
pub struct DuplicateCluster {
    pub members: Vec<usize>,
    /// External id matched against an existing canonical venue, if any
    pub linked_external_id: Option<String>,
    /// All distinct external ids observed across members (sorted)
    pub external_ids: Vec<String>,
    /// Linked pairs with their similarity score (1.0 for decisive links:
    /// shared external id, identical phone)
    pub pair_scores: Vec<(usize, usize, f64)>,
}

impl DuplicateCluster {
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Externally supplied liveness evidence for one venue
///
/// The probes themselves (phone dialing, web lookup) live outside the core;
/// the pipeline only applies the decision table.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct LivenessSignal {
    pub phone_unreachable: bool,
    pub web_presence: bool,
}

impl LivenessSignal {
    /// Both evidence channels negative: counts toward closure
    pub fn indicates_closure(&self) -> bool {
        self.phone_unreachable && !self.web_presence
    }
}

/// External inputs to the status-lifecycle stage, keyed by external id
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StatusInputs {
    #[serde(default)]
    pub liveness: HashMap<String, LivenessSignal>,
    /// Manual overrides forcing Operating (the one sanctioned exception to
    /// terminal Closed); each use is recorded in the run report
    #[serde(default)]
    pub force_operating: HashSet<String>,
}
