//! Merge Resolver stage
//!
//! Collapses one duplicate cluster into a single canonical venue. Field
//! selection is deterministic: completeness-scored best member for identity
//! fields, majority vote for coordinates, recency precedence for scalar
//! attributes, union for set-valued attributes. Running the same cluster
//! twice yields the same venue.

use crate::error::{PipelineError, PipelineResult};
use crate::report::MergeConflictEntry;
use crate::types::{DuplicateCluster, NormalizedVenue};
use chrono::{DateTime, Utc};
use refill_common::models::{CanonicalVenue, Coordinates, VenueStatus};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cap on stored image URLs per venue
const MAX_IMAGES: usize = 5;

/// Result of resolving one cluster
#[derive(Debug)]
pub struct MergeOutcome {
    pub venue: CanonicalVenue,
    /// Present when the cluster carried multiple distinct external ids
    pub conflict: Option<MergeConflictEntry>,
    /// True when no existing canonical venue matched
    pub created: bool,
}

pub struct MergeResolver {
    /// Coordinate observations within this distance count as agreeing
    coordinate_tolerance_m: f64,
}

impl MergeResolver {
    pub fn new(coordinate_tolerance_m: f64) -> Self {
        Self {
            coordinate_tolerance_m,
        }
    }

    /// Resolve one cluster against an optional existing canonical venue
    ///
    /// # Algorithm
    /// 1. Order members by recency (latest crawl first).
    /// 2. Name and address come from the most complete member; completeness
    ///    ties break toward the most recent.
    /// 3. Coordinates: majority vote among observations agreeing within the
    ///    tolerance; no majority falls back to the most recent observation.
    /// 4. Scalar fields (phone, price, hours) take the first non-null value
    ///    in recency order, retaining the existing value when the batch has
    ///    none.
    /// 5. Categories, images and refill items are unions; images are ordered
    ///    best-member-first and capped.
    /// 6. More than one distinct external id is a merge conflict: the venue
    ///    keeps all ids (primary plus aliases) and is flagged for review.
    pub fn resolve(
        &self,
        cluster: &DuplicateCluster,
        batch: &[NormalizedVenue],
        existing: Option<&CanonicalVenue>,
        now: DateTime<Utc>,
    ) -> PipelineResult<MergeOutcome> {
        let mut members: Vec<&NormalizedVenue> =
            cluster.members.iter().map(|&i| &batch[i]).collect();
        if members.is_empty() {
            return Err(PipelineError::BatchInput(
                "cannot merge an empty cluster".to_string(),
            ));
        }
        // Latest crawl first; all precedence below leans on this order
        members.sort_by(|a, b| b.crawled_at.cmp(&a.crawled_at));

        let best = select_best(&members);

        let coordinates = match self.majority_coordinates(&members) {
            Some(c) => c,
            None => {
                existing.map(|e| e.coordinates).ok_or_else(|| {
                    PipelineError::BatchInput(format!(
                        "cluster for {:?} reached merge without coordinates",
                        best.name
                    ))
                })?
            }
        };

        // External id bookkeeping: cluster ids plus whatever the existing
        // venue already carries
        let mut all_ids: BTreeSet<String> = cluster.external_ids.iter().cloned().collect();
        if let Some(e) = existing {
            all_ids.extend(e.external_id.iter().cloned());
            all_ids.extend(e.alias_external_ids.iter().cloned());
        }
        let primary_id = existing
            .and_then(|e| e.external_id.clone())
            .or_else(|| cluster.linked_external_id.clone())
            .or_else(|| all_ids.iter().next().cloned());
        let aliases: Vec<String> = all_ids
            .iter()
            .filter(|id| Some(id.as_str()) != primary_id.as_deref())
            .cloned()
            .collect();

        let conflict = if all_ids.len() > 1 {
            warn!(
                venue = %best.name,
                external_ids = ?all_ids,
                "cluster carries multiple external ids, flagging for review"
            );
            Some(MergeConflictEntry {
                venue_name: best.name.clone(),
                external_ids: all_ids.iter().cloned().collect(),
            })
        } else {
            None
        };

        let mut categories: BTreeSet<String> = members
            .iter()
            .flat_map(|m| m.categories.iter().cloned())
            .collect();
        if let Some(e) = existing {
            categories.extend(e.categories.iter().cloned());
        }

        let phone = pick_scalar(&members, |m| m.phone.clone())
            .or_else(|| existing.and_then(|e| e.phone.clone()));
        let price = pick_scalar(&members, |m| m.price.clone())
            .or_else(|| existing.and_then(|e| e.price.clone()));
        let hours_raw = pick_scalar(&members, |m| m.hours_raw.clone())
            .or_else(|| existing.and_then(|e| e.hours_raw.clone()));
        let hours = pick_scalar(&members, |m| m.hours.clone())
            .or_else(|| existing.and_then(|e| e.hours.clone()));

        let images = merge_images(best, &members, existing);

        let mut refill_items: Vec<String> = Vec::new();
        for m in &members {
            for item in &m.refill_items {
                if !refill_items.contains(item) {
                    refill_items.push(item.clone());
                }
            }
        }
        if let Some(e) = existing {
            for item in &e.refill_items {
                if !refill_items.contains(item) {
                    refill_items.push(item.clone());
                }
            }
        }

        let last_seen_at = members
            .iter()
            .map(|m| m.crawled_at)
            .max()
            .unwrap_or(now);

        let needs_review = conflict.is_some() || existing.is_some_and(|e| e.needs_review);

        let venue = match existing {
            Some(e) => CanonicalVenue {
                id: e.id,
                external_id: primary_id,
                name: best.name.clone(),
                address: best.address.clone(),
                coordinates,
                categories: categories.into_iter().collect(),
                phone,
                price,
                hours_raw,
                hours,
                images,
                refill_items,
                status: e.status,
                needs_review,
                alias_external_ids: aliases,
                liveness_failures: e.liveness_failures,
                created_at: e.created_at,
                updated_at: now,
                last_seen_at,
            },
            None => CanonicalVenue {
                id: Uuid::new_v4(),
                external_id: primary_id,
                name: best.name.clone(),
                address: best.address.clone(),
                coordinates,
                categories: categories.into_iter().collect(),
                phone,
                price,
                hours_raw,
                hours,
                images,
                refill_items,
                status: VenueStatus::Operating,
                needs_review,
                alias_external_ids: aliases,
                liveness_failures: 0,
                created_at: now,
                updated_at: now,
                last_seen_at,
            },
        };

        // Weakest link across the cluster, for tuning the threshold
        let cohesion = cluster
            .pair_scores
            .iter()
            .map(|&(_, _, s)| s)
            .fold(f64::INFINITY, f64::min);
        debug!(
            venue = %venue.name,
            members = cluster.members.len(),
            cohesion = if cohesion.is_finite() { cohesion } else { 1.0 },
            price = ?venue.price.as_ref().map(|p| p.representative()),
            created = existing.is_none(),
            "cluster merged"
        );

        Ok(MergeOutcome {
            venue,
            conflict,
            created: existing.is_none(),
        })
    }

    /// Majority vote over member coordinates
    ///
    /// Observations within the tolerance of each other form a group; a group
    /// holding a strict majority wins, represented by its most recent member.
    /// Without a majority the most recent observation overall wins.
    fn majority_coordinates(&self, members: &[&NormalizedVenue]) -> Option<Coordinates> {
        // members are recency-descending, so index order is recency order
        let observed: Vec<Coordinates> =
            members.iter().filter_map(|m| m.coordinates).collect();
        if observed.is_empty() {
            return None;
        }

        // Equal-size groups keep the earlier anchor, i.e. the more recent one
        let mut best_group: Vec<usize> = Vec::new();
        for anchor in &observed {
            let group: Vec<usize> = observed
                .iter()
                .enumerate()
                .filter(|(_, c)| anchor.distance_m(c) <= self.coordinate_tolerance_m)
                .map(|(j, _)| j)
                .collect();
            if group.len() > best_group.len() {
                best_group = group;
            }
        }

        if best_group.len() * 2 > observed.len() {
            Some(observed[best_group[0]])
        } else {
            Some(observed[0])
        }
    }
}

/// Most complete member; completeness ties break toward the most recent
fn select_best<'a>(members: &[&'a NormalizedVenue]) -> &'a NormalizedVenue {
    // members are recency-descending, so a strictly-greater comparison
    // keeps the most recent among equals
    let mut best = members[0];
    let mut best_score = completeness(best);
    for &m in &members[1..] {
        let score = completeness(m);
        if score > best_score {
            best = m;
            best_score = score;
        }
    }
    best
}

/// Weighted field-presence score
fn completeness(v: &NormalizedVenue) -> f64 {
    let mut score = 0.0;
    if !v.name.trim().is_empty() {
        score += 1.0;
    }
    if !v.address.trim().is_empty() {
        score += 1.0;
    }
    if v.coordinates.is_some() {
        score += 2.0;
    }
    if v.phone.is_some() {
        score += 0.5;
    }
    if v.hours_raw.is_some() || v.hours.is_some() {
        score += 0.5;
    }
    if v.price.is_some() {
        score += 0.5;
    }
    if !v.images.is_empty() {
        score += 0.3;
    }
    if !v.refill_items.is_empty() {
        score += 0.3;
    }
    score
}

/// First non-null value in recency order
fn pick_scalar<T>(
    members: &[&NormalizedVenue],
    get: impl Fn(&NormalizedVenue) -> Option<T>,
) -> Option<T> {
    members.iter().find_map(|&m| get(m))
}

/// Union of image URLs: best member first, then the rest by recency, then
/// whatever the existing venue already holds, deduplicated and capped
fn merge_images(
    best: &NormalizedVenue,
    members: &[&NormalizedVenue],
    existing: Option<&CanonicalVenue>,
) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let mut push = |url: &String| {
        if images.len() < MAX_IMAGES && !images.contains(url) {
            images.push(url.clone());
        }
    };
    for url in &best.images {
        push(url);
    }
    for m in members {
        for url in &m.images {
            push(url);
        }
    }
    if let Some(e) = existing {
        for url in &e.images {
            push(url);
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use refill_common::models::PriceInfo;

    fn venue_at(name: &str, minutes_ago: i64) -> NormalizedVenue {
        NormalizedVenue {
            external_id: None,
            name: name.to_string(),
            address: "서울 강남구 테헤란로 123".to_string(),
            raw_categories: vec![],
            phone: None,
            price: None,
            hours_raw: None,
            hours: None,
            coordinates: Some(Coordinates::new(37.50, 127.03)),
            images: vec![],
            refill_items: vec![],
            refill_relevant: true,
            categories: vec!["고기".to_string()],
            needs_geocoding: false,
            crawled_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn cluster_of(n: usize) -> DuplicateCluster {
        DuplicateCluster {
            members: (0..n).collect(),
            linked_external_id: None,
            external_ids: vec![],
            pair_scores: vec![],
        }
    }

    fn resolver() -> MergeResolver {
        MergeResolver::new(30.0)
    }

    #[test]
    fn most_complete_member_supplies_identity_fields() {
        let mut sparse = venue_at("김스바베큐", 10);
        sparse.phone = None;
        let mut rich = venue_at("Kim's BBQ", 60);
        rich.phone = Some("02-1234-5678".to_string());
        rich.price = Some(PriceInfo {
            min_price: 15_000,
            max_price: 15_000,
            raw: "15,000원".to_string(),
        });
        rich.hours_raw = Some("11:00~22:00".to_string());

        let outcome = resolver()
            .resolve(&cluster_of(2), &[sparse, rich], None, Utc::now())
            .unwrap();
        // Older but more complete wins the name
        assert_eq!(outcome.venue.name, "Kim's BBQ");
    }

    #[test]
    fn completeness_tie_breaks_toward_most_recent() {
        let newer = venue_at("새이름", 5);
        let older = venue_at("옛이름", 120);
        let outcome = resolver()
            .resolve(&cluster_of(2), &[newer, older], None, Utc::now())
            .unwrap();
        assert_eq!(outcome.venue.name, "새이름");
    }

    #[test]
    fn coordinate_majority_vote_wins() {
        let mut a = venue_at("식당", 5);
        let mut b = venue_at("식당", 10);
        let mut c = venue_at("식당", 15);
        // a and b agree (~11 m apart), c is an outlier ~60 m away
        a.coordinates = Some(Coordinates::new(37.50000, 127.0300));
        b.coordinates = Some(Coordinates::new(37.50010, 127.0300));
        c.coordinates = Some(Coordinates::new(37.50054, 127.0300));

        let outcome = resolver()
            .resolve(&cluster_of(3), &[a, b, c], None, Utc::now())
            .unwrap();
        // Most recent member of the majority group
        assert_eq!(outcome.venue.coordinates.lat, 37.50000);
    }

    #[test]
    fn no_majority_falls_back_to_most_recent() {
        let mut a = venue_at("식당", 5);
        let mut b = venue_at("식당", 10);
        // ~60 m apart, no agreement
        a.coordinates = Some(Coordinates::new(37.50000, 127.0300));
        b.coordinates = Some(Coordinates::new(37.50054, 127.0300));

        let outcome = resolver()
            .resolve(&cluster_of(2), &[a, b], None, Utc::now())
            .unwrap();
        assert_eq!(outcome.venue.coordinates.lat, 37.50000);
    }

    #[test]
    fn categories_are_unioned() {
        let mut a = venue_at("식당", 5);
        a.categories = vec!["고기".to_string()];
        let mut b = venue_at("식당", 10);
        b.categories = vec!["한식".to_string()];

        let outcome = resolver()
            .resolve(&cluster_of(2), &[a, b], None, Utc::now())
            .unwrap();
        assert_eq!(outcome.venue.categories, vec!["고기", "한식"]);
    }

    #[test]
    fn scalar_fields_prefer_most_recent_non_null() {
        let mut newest = venue_at("식당", 1);
        newest.phone = None; // newest has no phone
        let mut middle = venue_at("식당", 30);
        middle.phone = Some("02-111-2222".to_string());
        let mut oldest = venue_at("식당", 90);
        oldest.phone = Some("02-999-8888".to_string());

        let outcome = resolver()
            .resolve(&cluster_of(3), &[newest, middle, oldest], None, Utc::now())
            .unwrap();
        assert_eq!(outcome.venue.phone.as_deref(), Some("02-111-2222"));
    }

    #[test]
    fn images_deduplicated_and_capped() {
        let mut a = venue_at("식당", 5);
        a.images = (0..4).map(|i| format!("https://img.example/{i}.jpg")).collect();
        let mut b = venue_at("식당", 10);
        b.images = (2..8).map(|i| format!("https://img.example/{i}.jpg")).collect();

        let outcome = resolver()
            .resolve(&cluster_of(2), &[a, b], None, Utc::now())
            .unwrap();
        assert_eq!(outcome.venue.images.len(), 5);
        let unique: BTreeSet<_> = outcome.venue.images.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn conflicting_external_ids_flag_review_and_keep_aliases() {
        let mut a = venue_at("식당", 5);
        a.external_id = Some("abc123".to_string());
        let mut b = venue_at("식당", 10);
        b.external_id = Some("xyz789".to_string());
        let cluster = DuplicateCluster {
            members: vec![0, 1],
            linked_external_id: None,
            external_ids: vec!["abc123".to_string(), "xyz789".to_string()],
            pair_scores: vec![],
        };

        let outcome = resolver()
            .resolve(&cluster, &[a, b], None, Utc::now())
            .unwrap();
        assert!(outcome.venue.needs_review);
        assert!(outcome.conflict.is_some());
        // Both ids survive: one primary, one alias
        let mut kept: Vec<String> = outcome.venue.alias_external_ids.clone();
        kept.extend(outcome.venue.external_id.clone());
        kept.sort();
        assert_eq!(kept, vec!["abc123", "xyz789"]);
    }

    #[test]
    fn update_preserves_identity_and_lifecycle_fields() {
        let now = Utc::now();
        let created = now - Duration::days(30);
        let existing = CanonicalVenue {
            id: Uuid::new_v4(),
            external_id: Some("dc-1".to_string()),
            name: "옛날집".to_string(),
            address: "서울 강남구".to_string(),
            coordinates: Coordinates::new(37.50, 127.03),
            categories: vec!["한식".to_string()],
            phone: Some("02-000-0000".to_string()),
            price: None,
            hours_raw: None,
            hours: None,
            images: vec![],
            refill_items: vec![],
            status: VenueStatus::OnHiatus,
            needs_review: false,
            alias_external_ids: vec![],
            liveness_failures: 1,
            created_at: created,
            updated_at: created,
            last_seen_at: created,
        };

        let mut observed = venue_at("옛날집", 5);
        observed.external_id = Some("dc-1".to_string());
        let cluster = DuplicateCluster {
            members: vec![0],
            linked_external_id: Some("dc-1".to_string()),
            external_ids: vec!["dc-1".to_string()],
            pair_scores: vec![],
        };

        let outcome = resolver()
            .resolve(&cluster, &[observed], Some(&existing), now)
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.venue.id, existing.id);
        assert_eq!(outcome.venue.created_at, created);
        // Status is the lifecycle stage's decision, not the merge's
        assert_eq!(outcome.venue.status, VenueStatus::OnHiatus);
        assert_eq!(outcome.venue.liveness_failures, 1);
        assert!(outcome.venue.updated_at > created);
        // Existing phone retained when the batch is silent
        assert_eq!(outcome.venue.phone.as_deref(), Some("02-000-0000"));
    }

    #[test]
    fn existing_scalar_retained_when_batch_is_silent() {
        let now = Utc::now();
        let existing = CanonicalVenue {
            id: Uuid::new_v4(),
            external_id: Some("dc-2".to_string()),
            name: "국밥집".to_string(),
            address: "서울 서초구".to_string(),
            coordinates: Coordinates::new(37.49, 127.01),
            categories: vec!["한식".to_string()],
            phone: Some("02-777-7777".to_string()),
            price: None,
            hours_raw: None,
            hours: None,
            images: vec![],
            refill_items: vec![],
            status: VenueStatus::Operating,
            needs_review: false,
            alias_external_ids: vec![],
            liveness_failures: 0,
            created_at: now,
            updated_at: now,
            last_seen_at: now,
        };
        let mut observed = venue_at("국밥집", 5);
        observed.external_id = Some("dc-2".to_string());
        observed.phone = None;
        let cluster = DuplicateCluster {
            members: vec![0],
            linked_external_id: Some("dc-2".to_string()),
            external_ids: vec!["dc-2".to_string()],
            pair_scores: vec![],
        };

        let outcome = resolver()
            .resolve(&cluster, &[observed], Some(&existing), now)
            .unwrap();
        assert_eq!(outcome.venue.phone.as_deref(), Some("02-777-7777"));
    }

    #[test]
    fn resolving_twice_is_deterministic() {
        let a = venue_at("같은집", 5);
        let b = venue_at("같은집 본점", 10);
        let batch = vec![a, b];
        let now = Utc::now();

        let first = resolver()
            .resolve(&cluster_of(2), &batch, None, now)
            .unwrap();
        let second = resolver()
            .resolve(&cluster_of(2), &batch, None, now)
            .unwrap();
        assert_eq!(first.venue.name, second.venue.name);
        assert_eq!(first.venue.categories, second.venue.categories);
        assert_eq!(first.venue.coordinates, second.venue.coordinates);
        assert_eq!(first.venue.last_seen_at, second.venue.last_seen_at);
    }
}
