//! Batch orchestrator
//!
//! Runs the stage sequence over one crawl batch: normalize, validate
//! coordinates, map categories, detect duplicates, merge, apply the status
//! lifecycle. Per-record failures are isolated into the run report; only
//! shared-resource failures abort the batch, and those abort it before any
//! venue is produced.

use crate::category::CategoryMapper;
use crate::dedup::DuplicateDetector;
use crate::error::{PipelineResult, RecordIssue};
use crate::merge::MergeResolver;
use crate::normalizer::FieldNormalizer;
use crate::report::{QuarantineEntry, RunReport};
use crate::status::StatusTracker;
use crate::types::{CoordinateCheck, NormalizedVenue, StatusInputs};
use crate::validator::CoordinateValidator;
use chrono::Utc;
use refill_common::config::ReconConfig;
use refill_common::models::{CanonicalVenue, RawVenueRecord};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

/// Everything one batch run produces
#[derive(Debug)]
pub struct BatchOutcome {
    /// Venues to persist: created, updated, and status-changed
    pub venues: Vec<CanonicalVenue>,
    /// Records lacking coordinates, forwarded for geocoding-by-address
    pub pending_geocoding: Vec<NormalizedVenue>,
    pub report: RunReport,
}

pub struct ReconPipeline {
    normalizer: FieldNormalizer,
    validator: CoordinateValidator,
    mapper: CategoryMapper,
    detector: DuplicateDetector,
    resolver: MergeResolver,
    tracker: StatusTracker,
}

impl ReconPipeline {
    /// Build the stage chain from resolved configuration
    ///
    /// Fails when a shared resource (category table, exclusion patterns) is
    /// unusable; nothing is processed in that case.
    pub fn new(config: &ReconConfig) -> PipelineResult<Self> {
        Ok(Self {
            normalizer: FieldNormalizer::new(&config.category.refill_keywords),
            validator: CoordinateValidator::new(
                config.region,
                config.address_disagreement_warn_m,
            ),
            mapper: CategoryMapper::from_config(&config.category)?,
            detector: DuplicateDetector::new(config.dedup.clone(), &config.region),
            resolver: MergeResolver::new(config.dedup.coordinate_tolerance_m),
            tracker: StatusTracker::new(&config.status),
        })
    }

    /// Process one crawl batch against the current canonical set
    ///
    /// Pure with respect to its inputs: no I/O happens here. The caller
    /// loads `existing` and persists the outcome.
    #[instrument(skip_all, fields(records = batch.len()))]
    pub fn run(
        &self,
        batch: &[RawVenueRecord],
        existing: &[CanonicalVenue],
        inputs: &StatusInputs,
    ) -> PipelineResult<BatchOutcome> {
        let now = Utc::now();
        let mut report = RunReport::new(batch.len());

        // Stage 1: normalization. Malformed records are counted and dropped.
        let mut normalized: Vec<NormalizedVenue> = Vec::with_capacity(batch.len());
        for raw in batch {
            match self.normalizer.normalize(raw) {
                Ok(venue) => normalized.push(venue),
                Err(issue) => {
                    report.malformed += 1;
                    report.quarantined.push(QuarantineEntry {
                        name: raw.name.clone(),
                        external_id: raw.external_id.clone(),
                        reason: issue,
                        detail: "empty name or address after trimming".to_string(),
                    });
                }
            }
        }
        report.record_stage("normalize", batch.len(), normalized.len());

        // Index of existing venues by every external id they carry
        let mut by_external_id: HashMap<&str, usize> = HashMap::new();
        for (idx, venue) in existing.iter().enumerate() {
            if let Some(id) = venue.external_id.as_deref() {
                by_external_id.insert(id, idx);
            }
            for alias in &venue.alias_external_ids {
                by_external_id.insert(alias, idx);
            }
        }

        // Stage 2: coordinate validation. Out-of-region quarantines, missing
        // defers to the geocoding collaborator, valid continues.
        let normalized_count = normalized.len();
        let mut valid: Vec<NormalizedVenue> = Vec::with_capacity(normalized.len());
        let mut pending_geocoding: Vec<NormalizedVenue> = Vec::new();
        for mut venue in normalized {
            match self.validator.check(venue.coordinates.as_ref()) {
                CoordinateCheck::Valid => {
                    if let (Some(coords), Some(id)) =
                        (venue.coordinates.as_ref(), venue.external_id.as_deref())
                    {
                        // Soft cross-check against the stored position
                        if let Some(&idx) = by_external_id.get(id) {
                            self.validator.cross_check(
                                &venue.name,
                                coords,
                                Some(&existing[idx].coordinates),
                            );
                        }
                    }
                    valid.push(venue);
                }
                CoordinateCheck::OutOfRegion => {
                    let detail = venue
                        .coordinates
                        .map(|c| format!("lat={} lng={}", c.lat, c.lng))
                        .unwrap_or_default();
                    report.quarantined.push(QuarantineEntry {
                        name: venue.name.clone(),
                        external_id: venue.external_id.clone(),
                        reason: RecordIssue::OutOfRegion,
                        detail,
                    });
                }
                CoordinateCheck::Missing => {
                    venue.needs_geocoding = true;
                    venue.categories = self.mapper.map(&venue);
                    report.deferred_geocoding += 1;
                    pending_geocoding.push(venue);
                }
            }
        }
        report.record_stage("validate", normalized_count, valid.len());

        // Stage 3: category mapping (total, never empties a record)
        for venue in &mut valid {
            venue.categories = self.mapper.map(venue);
        }

        // Stage 4: duplicate detection
        let known_external_ids: HashSet<String> =
            by_external_id.keys().map(|k| k.to_string()).collect();
        let cluster_result = self.detector.cluster(&valid, &known_external_ids);
        report.clusters = cluster_result.clusters.len();
        for &idx in &cluster_result.manual_review {
            report.manual_review.push(valid[idx].name.clone());
        }
        report.record_stage("dedup", valid.len(), cluster_result.clusters.len());

        // Stage 5: merge each cluster, matching against existing venues by
        // any external id a member carries
        let mut venues: Vec<CanonicalVenue> = Vec::with_capacity(cluster_result.clusters.len());
        let mut observed_existing: HashSet<usize> = HashSet::new();
        for cluster in &cluster_result.clusters {
            let existing_match = cluster
                .linked_external_id
                .as_deref()
                .or_else(|| {
                    cluster
                        .external_ids
                        .iter()
                        .map(String::as_str)
                        .find(|id| by_external_id.contains_key(id))
                })
                .and_then(|id| by_external_id.get(id).copied());

            if let Some(idx) = existing_match {
                observed_existing.insert(idx);
            }

            let outcome = self.resolver.resolve(
                cluster,
                &valid,
                existing_match.map(|idx| &existing[idx]),
                now,
            )?;
            if outcome.created {
                report.venues_created += 1;
            } else {
                report.venues_updated += 1;
            }
            if let Some(conflict) = outcome.conflict {
                report.merge_conflicts.push(conflict);
            }
            venues.push(outcome.venue);
        }

        // Stage 6: status lifecycle, first for everything observed this run
        for venue in &mut venues {
            if let Some(entry) = self.tracker.evaluate(venue, true, inputs, now) {
                report.status_transitions.push(entry);
            }
        }

        // Then for existing venues the batch never touched; persisted only
        // when the evaluation actually changed them
        for (idx, venue) in existing.iter().enumerate() {
            if observed_existing.contains(&idx) {
                continue;
            }
            let mut candidate = venue.clone();
            let entry = self.tracker.evaluate(&mut candidate, false, inputs, now);
            let changed = entry.is_some()
                || candidate.liveness_failures != venue.liveness_failures
                || candidate.status != venue.status;
            if let Some(entry) = entry {
                report.status_transitions.push(entry);
            }
            if changed {
                candidate.updated_at = now;
                report.venues_updated += 1;
                venues.push(candidate);
            }
        }

        report.finish();
        info!(summary = %report.summary(), "batch reconciliation complete");

        Ok(BatchOutcome {
            venues,
            pending_geocoding,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refill_common::models::VenueStatus;

    fn raw(name: &str, address: &str, lat: &str, lng: &str) -> RawVenueRecord {
        RawVenueRecord {
            external_id: None,
            name: name.to_string(),
            address: address.to_string(),
            raw_categories: vec!["#삼겹살무한리필".to_string()],
            phone: None,
            lat: Some(lat.to_string()),
            lng: Some(lng.to_string()),
            price: None,
            price_range: None,
            menu_price: None,
            hours_raw: None,
            image_urls: vec![],
            refill_items: vec![],
            description: None,
            crawled_at: Utc::now(),
            crawl_keyword: None,
            crawl_rect: None,
        }
    }

    fn pipeline() -> ReconPipeline {
        ReconPipeline::new(&ReconConfig::default()).unwrap()
    }

    #[test]
    fn clean_batch_produces_one_venue_per_cluster() {
        let batch = vec![
            raw("Kim's BBQ", "서울 강남구 테헤란로 123", "37.50", "127.03"),
            raw("Kims BBQ", "서울 강남구 테헤란로 123", "37.5001", "127.0301"),
            raw("국밥명가", "서울 서초구 반포대로 88", "37.50", "127.01"),
        ];
        let outcome = pipeline().run(&batch, &[], &StatusInputs::default()).unwrap();

        assert_eq!(outcome.venues.len(), 2);
        assert_eq!(outcome.report.venues_created, 2);
        assert_eq!(outcome.report.clusters, 2);
        for venue in &outcome.venues {
            assert!(!venue.categories.is_empty());
            assert_eq!(venue.status, VenueStatus::Operating);
        }
    }

    #[test]
    fn malformed_records_are_dropped_and_counted() {
        let batch = vec![
            raw("", "서울 강남구", "37.50", "127.03"),
            raw("정상식당", "서울 강남구", "37.50", "127.03"),
        ];
        let outcome = pipeline().run(&batch, &[], &StatusInputs::default()).unwrap();

        assert_eq!(outcome.report.malformed, 1);
        assert_eq!(outcome.venues.len(), 1);
        assert_eq!(outcome.report.quarantined[0].reason, RecordIssue::MalformedInput);
    }

    #[test]
    fn out_of_region_records_are_quarantined_not_persisted() {
        let batch = vec![raw("부산식당", "부산 해운대구", "35.10", "129.04")];
        let outcome = pipeline().run(&batch, &[], &StatusInputs::default()).unwrap();

        assert!(outcome.venues.is_empty());
        assert_eq!(outcome.report.quarantined.len(), 1);
        assert_eq!(outcome.report.quarantined[0].reason, RecordIssue::OutOfRegion);
    }

    #[test]
    fn missing_coordinates_defer_to_geocoding() {
        let mut record = raw("주소만있는집", "서울 마포구 월드컵로 1", "", "");
        record.lat = None;
        record.lng = None;
        let outcome = pipeline()
            .run(&[record], &[], &StatusInputs::default())
            .unwrap();

        assert!(outcome.venues.is_empty());
        assert_eq!(outcome.pending_geocoding.len(), 1);
        assert!(outcome.pending_geocoding[0].needs_geocoding);
        // Deferred records still carry mapped categories for the collaborator
        assert!(!outcome.pending_geocoding[0].categories.is_empty());
        assert_eq!(outcome.report.deferred_geocoding, 1);
    }

    #[test]
    fn known_external_id_updates_instead_of_creating() {
        let mut record = raw("옛날집", "서울 강남구", "37.50", "127.03");
        record.external_id = Some("dc-1".to_string());
        let seed = pipeline()
            .run(&[record.clone()], &[], &StatusInputs::default())
            .unwrap();
        assert_eq!(seed.report.venues_created, 1);

        let second = pipeline()
            .run(&[record], &seed.venues, &StatusInputs::default())
            .unwrap();
        assert_eq!(second.report.venues_created, 0);
        assert_eq!(second.report.venues_updated, 1);
        assert_eq!(second.venues[0].id, seed.venues[0].id);
    }

    #[test]
    fn unobserved_stale_venue_is_emitted_with_new_status() {
        let mut record = raw("사라진집", "서울 강남구", "37.50", "127.03");
        record.external_id = Some("dc-9".to_string());
        record.crawled_at = Utc::now() - chrono::Duration::days(45);
        let seed = pipeline()
            .run(&[record], &[], &StatusInputs::default())
            .unwrap();

        // Next batch does not contain dc-9 at all
        let outcome = pipeline()
            .run(&[], &seed.venues, &StatusInputs::default())
            .unwrap();
        assert_eq!(outcome.venues.len(), 1);
        assert_eq!(outcome.venues[0].status, VenueStatus::OnHiatus);
        assert_eq!(outcome.report.status_transitions.len(), 1);
    }

    #[test]
    fn unchanged_unobserved_venues_are_not_rewritten() {
        let mut record = raw("멀쩡한집", "서울 강남구", "37.50", "127.03");
        record.external_id = Some("dc-2".to_string());
        let seed = pipeline()
            .run(&[record], &[], &StatusInputs::default())
            .unwrap();

        let outcome = pipeline()
            .run(&[], &seed.venues, &StatusInputs::default())
            .unwrap();
        assert!(outcome.venues.is_empty());
        assert_eq!(outcome.report.venues_updated, 0);
    }
}
