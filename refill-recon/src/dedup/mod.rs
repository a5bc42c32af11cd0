//! Duplicate Detector stage
//!
//! Two-stage detection to bound cost: spatial grid bucketing (only records
//! in the same or adjacent cells are compared), then pairwise similarity
//! scoring within buckets. Clusters are connected components over the link
//! graph — transitive closure by design, trading occasional over-merging for
//! recall; the merge resolver tolerates clusters whose members are not all
//! pairwise near-duplicates.

pub mod similarity;

use crate::types::{DuplicateCluster, NormalizedVenue};
use petgraph::unionfind::UnionFind;
use refill_common::config::{BoundingBox, DedupConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Meters per degree of latitude (WGS84, close enough city-scale)
const METERS_PER_LAT_DEGREE: f64 = 111_320.0;

/// Result of clustering one validated batch
#[derive(Debug)]
pub struct ClusterResult {
    pub clusters: Vec<DuplicateCluster>,
    /// Indexes of records that lost their name in normalization; kept as
    /// singletons and flagged for manual review
    pub manual_review: Vec<usize>,
}

pub struct DuplicateDetector {
    config: DedupConfig,
    cell_lat_deg: f64,
    cell_lng_deg: f64,
}

impl DuplicateDetector {
    pub fn new(config: DedupConfig, region: &BoundingBox) -> Self {
        // Cell edge = max plausible duplicate distance, so adjacent-cell
        // comparison covers every pair within that distance
        let cell_lat_deg = config.max_duplicate_distance_m / METERS_PER_LAT_DEGREE;
        let meters_per_lng_degree =
            METERS_PER_LAT_DEGREE * region.center_lat().to_radians().cos();
        let cell_lng_deg = config.max_duplicate_distance_m / meters_per_lng_degree;

        Self {
            config,
            cell_lat_deg,
            cell_lng_deg,
        }
    }

    /// Partition a validated batch into duplicate clusters
    ///
    /// `known_external_ids` are ids already present in the canonical store;
    /// records carrying one short-circuit similarity scoring entirely and
    /// link directly to that identifier's cluster.
    ///
    /// All inputs are expected to carry Valid coordinates (the orchestrator
    /// quarantines or defers everything else first).
    pub fn cluster(
        &self,
        venues: &[NormalizedVenue],
        known_external_ids: &HashSet<String>,
    ) -> ClusterResult {
        let n = venues.len();
        let mut links: UnionFind<usize> = UnionFind::new(n);

        let names: Vec<String> = venues
            .iter()
            .map(|v| similarity::normalized_name(&v.name))
            .collect();

        let mut manual_review: Vec<usize> = Vec::new();
        let mut short_circuited: HashSet<usize> = HashSet::new();
        let mut linked_pairs: Vec<(usize, usize, f64)> = Vec::new();

        // Records sharing an external id are the same listing observed by
        // different crawl passes; link them without scoring.
        let mut by_external_id: HashMap<&str, usize> = HashMap::new();
        for (i, venue) in venues.iter().enumerate() {
            if let Some(id) = venue.external_id.as_deref() {
                if let Some(&first) = by_external_id.get(id) {
                    links.union(first, i);
                    linked_pairs.push((first, i, 1.0));
                } else {
                    by_external_id.insert(id, i);
                }
                if known_external_ids.contains(id) {
                    short_circuited.insert(i);
                }
            }
        }

        // Spatial bucketing over the remaining candidates
        let mut grid: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
        for (i, venue) in venues.iter().enumerate() {
            if names[i].is_empty() {
                manual_review.push(i);
                continue; // nameless records never cluster with anything
            }
            if short_circuited.contains(&i) {
                continue; // linked via external id, no recomputation
            }
            let Some(coords) = venue.coordinates else {
                continue;
            };
            let cell = (
                (coords.lat / self.cell_lat_deg).floor() as i64,
                (coords.lng / self.cell_lng_deg).floor() as i64,
            );
            grid.entry(cell).or_default().push(i);
        }

        let mut pairs_scored = 0usize;
        let mut pairs_linked = 0usize;

        for (&cell, members) in &grid {
            // Same cell plus the half of the 8 neighbors that sorts after it,
            // so every cell pair is visited exactly once
            for (di, dj) in [(0, 0), (0, 1), (1, -1), (1, 0), (1, 1)] {
                let neighbor = (cell.0 + di, cell.1 + dj);
                if neighbor == cell {
                    for (a, &i) in members.iter().enumerate() {
                        for &j in &members[a + 1..] {
                            pairs_scored += 1;
                            if let Some(score) = self.link_pair(venues, &names, i, j) {
                                links.union(i, j);
                                linked_pairs.push((i, j, score));
                                pairs_linked += 1;
                            }
                        }
                    }
                } else if let Some(others) = grid.get(&neighbor) {
                    for &i in members {
                        for &j in others {
                            pairs_scored += 1;
                            if let Some(score) = self.link_pair(venues, &names, i, j) {
                                links.union(i, j);
                                linked_pairs.push((i, j, score));
                                pairs_linked += 1;
                            }
                        }
                    }
                }
            }
        }

        // Connected components → clusters
        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..n {
            components.entry(links.find(i)).or_default().push(i);
        }

        let mut pair_scores_by_root: HashMap<usize, Vec<(usize, usize, f64)>> = HashMap::new();
        for &(i, j, score) in &linked_pairs {
            pair_scores_by_root
                .entry(links.find(i))
                .or_default()
                .push((i, j, score));
        }

        let clusters: Vec<DuplicateCluster> = components
            .into_iter()
            .map(|(root, mut members)| {
                members.sort_unstable();
                let external_ids: Vec<String> = members
                    .iter()
                    .filter_map(|&i| venues[i].external_id.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let linked_external_id = external_ids
                    .iter()
                    .find(|id| known_external_ids.contains(*id))
                    .cloned();
                DuplicateCluster {
                    members,
                    linked_external_id,
                    external_ids,
                    pair_scores: pair_scores_by_root.remove(&root).unwrap_or_default(),
                }
            })
            .collect();

        info!(
            records = n,
            buckets = grid.len(),
            pairs_scored,
            pairs_linked,
            clusters = clusters.len(),
            singletons = clusters.iter().filter(|c| c.is_singleton()).count(),
            "duplicate detection complete"
        );

        ClusterResult {
            clusters,
            manual_review,
        }
    }

    /// Decide whether one candidate pair is linked; returns the link score
    fn link_pair(
        &self,
        venues: &[NormalizedVenue],
        names: &[String],
        i: usize,
        j: usize,
    ) -> Option<f64> {
        let (a, b) = (&venues[i], &venues[j]);

        // Identical normalized phone is decisive on its own
        if let (Some(pa), Some(pb)) = (&a.phone, &b.phone) {
            if pa == pb {
                debug!(a = %a.name, b = %b.name, "linked by identical phone number");
                return Some(1.0);
            }
        }

        let (ca, cb) = (a.coordinates.as_ref()?, b.coordinates.as_ref()?);
        let score = similarity::pair_score(
            &self.config,
            &names[i],
            &names[j],
            ca,
            cb,
            &a.address,
            &b.address,
        );
        (score >= self.config.similarity_threshold).then_some(score)
    }
}
