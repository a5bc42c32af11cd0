//! Status Lifecycle stage
//!
//! Applies the forward-only status lattice: Operating → OnHiatus → Closed.
//! Venues are never deleted; prolonged absence from crawls marks them
//! OnHiatus, and repeated negative liveness evidence closes them. The single
//! sanctioned exception is an externally supplied manual override forcing
//! Operating, which is audited in the run report.

use crate::report::{StatusTransitionEntry, StatusTrigger};
use crate::types::StatusInputs;
use chrono::{DateTime, Duration, Utc};
use refill_common::config::StatusConfig;
use refill_common::models::{CanonicalVenue, VenueStatus};
use tracing::info;

pub struct StatusTracker {
    staleness: Duration,
    failure_threshold: u32,
}

impl StatusTracker {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            staleness: Duration::days(config.staleness_days),
            failure_threshold: config.liveness_failure_threshold,
        }
    }

    /// Evaluate one venue's status for this run
    ///
    /// `observed` is whether any record in the current batch matched this
    /// venue. Precedence: manual override, then liveness evidence, then
    /// staleness (staleness applies to unobserved venues only). At most one
    /// transition is applied per run.
    pub fn evaluate(
        &self,
        venue: &mut CanonicalVenue,
        observed: bool,
        inputs: &StatusInputs,
        now: DateTime<Utc>,
    ) -> Option<StatusTransitionEntry> {
        if let Some(id) = venue.external_id.as_deref() {
            if inputs.force_operating.contains(id) {
                venue.liveness_failures = 0;
                if venue.status != VenueStatus::Operating {
                    let from = venue.status;
                    venue.status = VenueStatus::Operating;
                    venue.updated_at = now;
                    info!(
                        venue = %venue.name,
                        from = %from,
                        "manual override reopened venue"
                    );
                    return Some(self.entry(venue, from, StatusTrigger::ManualOverride));
                }
                return None;
            }

            if let Some(signal) = inputs.liveness.get(id) {
                if signal.indicates_closure() {
                    venue.liveness_failures += 1;
                    if venue.liveness_failures >= self.failure_threshold
                        && venue.status.can_transition_to(VenueStatus::Closed)
                    {
                        let from = venue.status;
                        venue.status = VenueStatus::Closed;
                        venue.updated_at = now;
                        info!(
                            venue = %venue.name,
                            failures = venue.liveness_failures,
                            "liveness failures reached threshold, closing"
                        );
                        return Some(self.entry(venue, from, StatusTrigger::LivenessFailure));
                    }
                } else {
                    // Any positive evidence resets the consecutive counter
                    venue.liveness_failures = 0;
                }
            } else if observed {
                // Observed alive with no check this run: the failure streak
                // is broken, the counter must not carry across the gap
                venue.liveness_failures = 0;
            }
        }

        if !observed
            && venue.status == VenueStatus::Operating
            && now - venue.last_seen_at > self.staleness
        {
            let from = venue.status;
            venue.status = VenueStatus::OnHiatus;
            venue.updated_at = now;
            info!(
                venue = %venue.name,
                last_seen = %venue.last_seen_at,
                "venue absent past staleness window, marking on hiatus"
            );
            return Some(self.entry(venue, from, StatusTrigger::Staleness));
        }

        None
    }

    fn entry(
        &self,
        venue: &CanonicalVenue,
        from: VenueStatus,
        trigger: StatusTrigger,
    ) -> StatusTransitionEntry {
        StatusTransitionEntry {
            venue_name: venue.name.clone(),
            external_id: venue.external_id.clone(),
            from,
            to: venue.status,
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LivenessSignal;
    use refill_common::models::Coordinates;
    use uuid::Uuid;

    fn venue(status: VenueStatus, last_seen_days_ago: i64) -> CanonicalVenue {
        let now = Utc::now();
        CanonicalVenue {
            id: Uuid::new_v4(),
            external_id: Some("dc-1".to_string()),
            name: "식당".to_string(),
            address: "서울 강남구".to_string(),
            coordinates: Coordinates::new(37.50, 127.03),
            categories: vec!["한식".to_string()],
            phone: None,
            price: None,
            hours_raw: None,
            hours: None,
            images: vec![],
            refill_items: vec![],
            status,
            needs_review: false,
            alias_external_ids: vec![],
            liveness_failures: 0,
            created_at: now - Duration::days(100),
            updated_at: now - Duration::days(last_seen_days_ago),
            last_seen_at: now - Duration::days(last_seen_days_ago),
        }
    }

    fn tracker() -> StatusTracker {
        StatusTracker::new(&StatusConfig::default())
    }

    fn closure_signal() -> StatusInputs {
        let mut inputs = StatusInputs::default();
        inputs.liveness.insert(
            "dc-1".to_string(),
            LivenessSignal {
                phone_unreachable: true,
                web_presence: false,
            },
        );
        inputs
    }

    #[test]
    fn stale_operating_venue_goes_on_hiatus() {
        let mut v = venue(VenueStatus::Operating, 45);
        let entry = tracker().evaluate(&mut v, false, &StatusInputs::default(), Utc::now());
        assert_eq!(v.status, VenueStatus::OnHiatus);
        let entry = entry.unwrap();
        assert_eq!(entry.trigger, StatusTrigger::Staleness);
        assert_eq!(entry.from, VenueStatus::Operating);
    }

    #[test]
    fn recently_seen_venue_stays_operating() {
        let mut v = venue(VenueStatus::Operating, 3);
        let entry = tracker().evaluate(&mut v, false, &StatusInputs::default(), Utc::now());
        assert_eq!(v.status, VenueStatus::Operating);
        assert!(entry.is_none());
    }

    #[test]
    fn observed_venue_is_never_stale() {
        let mut v = venue(VenueStatus::Operating, 45);
        let entry = tracker().evaluate(&mut v, true, &StatusInputs::default(), Utc::now());
        assert_eq!(v.status, VenueStatus::Operating);
        assert!(entry.is_none());
    }

    #[test]
    fn hiatus_venue_does_not_transition_again_on_staleness() {
        let mut v = venue(VenueStatus::OnHiatus, 90);
        let entry = tracker().evaluate(&mut v, false, &StatusInputs::default(), Utc::now());
        assert_eq!(v.status, VenueStatus::OnHiatus);
        assert!(entry.is_none());
    }

    #[test]
    fn single_liveness_failure_only_increments_counter() {
        let mut v = venue(VenueStatus::Operating, 3);
        let entry = tracker().evaluate(&mut v, true, &closure_signal(), Utc::now());
        assert_eq!(v.status, VenueStatus::Operating);
        assert_eq!(v.liveness_failures, 1);
        assert!(entry.is_none());
    }

    #[test]
    fn consecutive_liveness_failures_close_the_venue() {
        let mut v = venue(VenueStatus::Operating, 3);
        v.liveness_failures = 1;
        let entry = tracker().evaluate(&mut v, true, &closure_signal(), Utc::now());
        assert_eq!(v.status, VenueStatus::Closed);
        assert_eq!(entry.unwrap().trigger, StatusTrigger::LivenessFailure);
    }

    #[test]
    fn observation_without_a_check_resets_failure_counter() {
        let mut v = venue(VenueStatus::Operating, 3);
        v.liveness_failures = 1;

        // Seen in the crawl, no liveness check ran this time
        let entry = tracker().evaluate(&mut v, true, &StatusInputs::default(), Utc::now());
        assert!(entry.is_none());
        assert_eq!(v.liveness_failures, 0);

        // The old failure is gone, so one new negative check cannot close
        let entry = tracker().evaluate(&mut v, true, &closure_signal(), Utc::now());
        assert!(entry.is_none());
        assert_eq!(v.status, VenueStatus::Operating);
        assert_eq!(v.liveness_failures, 1);
    }

    #[test]
    fn unobserved_venue_keeps_its_failure_counter() {
        // Absence from the crawl is not positive evidence
        let mut v = venue(VenueStatus::Operating, 3);
        v.liveness_failures = 1;
        let entry = tracker().evaluate(&mut v, false, &StatusInputs::default(), Utc::now());
        assert!(entry.is_none());
        assert_eq!(v.liveness_failures, 1);
    }

    #[test]
    fn positive_evidence_resets_failure_counter() {
        let mut v = venue(VenueStatus::Operating, 3);
        v.liveness_failures = 1;
        let mut inputs = StatusInputs::default();
        inputs.liveness.insert(
            "dc-1".to_string(),
            LivenessSignal {
                phone_unreachable: true,
                web_presence: true, // still has a web footprint
            },
        );
        let entry = tracker().evaluate(&mut v, true, &inputs, Utc::now());
        assert_eq!(v.liveness_failures, 0);
        assert_eq!(v.status, VenueStatus::Operating);
        assert!(entry.is_none());
    }

    #[test]
    fn closed_venue_never_reopens_from_observation_alone() {
        let mut v = venue(VenueStatus::Closed, 1);
        let entry = tracker().evaluate(&mut v, true, &StatusInputs::default(), Utc::now());
        assert_eq!(v.status, VenueStatus::Closed);
        assert!(entry.is_none());
    }

    #[test]
    fn manual_override_reopens_closed_venue_and_is_audited() {
        let mut v = venue(VenueStatus::Closed, 10);
        v.liveness_failures = 2;
        let mut inputs = StatusInputs::default();
        inputs.force_operating.insert("dc-1".to_string());

        let entry = tracker().evaluate(&mut v, true, &inputs, Utc::now());
        assert_eq!(v.status, VenueStatus::Operating);
        assert_eq!(v.liveness_failures, 0);
        let entry = entry.unwrap();
        assert_eq!(entry.trigger, StatusTrigger::ManualOverride);
        assert_eq!(entry.from, VenueStatus::Closed);
    }

    #[test]
    fn override_on_operating_venue_is_a_noop() {
        let mut v = venue(VenueStatus::Operating, 3);
        v.liveness_failures = 1;
        let mut inputs = StatusInputs::default();
        inputs.force_operating.insert("dc-1".to_string());

        let entry = tracker().evaluate(&mut v, true, &inputs, Utc::now());
        assert!(entry.is_none());
        assert_eq!(v.liveness_failures, 0);
    }
}
