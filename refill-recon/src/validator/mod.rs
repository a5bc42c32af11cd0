//! Coordinate Validator stage
//!
//! Confirms a venue's coordinates lie inside the configured metropolitan
//! bounding box. Missing coordinates are not an error: the record is
//! forwarded flagged for geocoding-by-address. Out-of-region records are
//! quarantined upstream by the orchestrator.

use crate::types::CoordinateCheck;
use refill_common::config::BoundingBox;
use refill_common::models::Coordinates;
use tracing::warn;

pub struct CoordinateValidator {
    bounds: BoundingBox,
    /// Soft-warning distance for address-locality disagreement (meters)
    warn_distance_m: f64,
}

impl CoordinateValidator {
    pub fn new(bounds: BoundingBox, warn_distance_m: f64) -> Self {
        Self {
            bounds,
            warn_distance_m,
        }
    }

    /// Classify one record's coordinates
    pub fn check(&self, coordinates: Option<&Coordinates>) -> CoordinateCheck {
        match coordinates {
            None => CoordinateCheck::Missing,
            Some(c) if self.bounds.contains(c.lat, c.lng) => CoordinateCheck::Valid,
            Some(_) => CoordinateCheck::OutOfRegion,
        }
    }

    /// Soft cross-check against an externally supplied locality hint
    ///
    /// Logged only; the record remains Valid regardless of disagreement.
    pub fn cross_check(&self, name: &str, coordinates: &Coordinates, hint: Option<&Coordinates>) {
        if let Some(hint) = hint {
            let distance = coordinates.distance_m(hint);
            if distance > self.warn_distance_m {
                warn!(
                    venue = %name,
                    distance_m = distance as i64,
                    "coordinates disagree with address locality hint"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CoordinateValidator {
        CoordinateValidator::new(BoundingBox::default(), 1_000.0)
    }

    #[test]
    fn seoul_coordinates_are_valid() {
        let c = Coordinates::new(37.50, 127.03);
        assert_eq!(validator().check(Some(&c)), CoordinateCheck::Valid);
    }

    #[test]
    fn southern_city_is_out_of_region() {
        let c = Coordinates::new(35.10, 129.04);
        assert_eq!(validator().check(Some(&c)), CoordinateCheck::OutOfRegion);
    }

    #[test]
    fn absent_coordinates_are_missing_not_invalid() {
        assert_eq!(validator().check(None), CoordinateCheck::Missing);
    }

    #[test]
    fn boundary_is_inclusive() {
        let bounds = BoundingBox::default();
        let c = Coordinates::new(bounds.min_lat, bounds.min_lng);
        assert_eq!(validator().check(Some(&c)), CoordinateCheck::Valid);
    }
}
