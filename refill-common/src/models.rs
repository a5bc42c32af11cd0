//! Venue data models
//!
//! `RawVenueRecord` is the per-observation shape handed over by the fetch
//! collaborator: one record per venue per crawl pass, all fields as scraped.
//! `CanonicalVenue` is the persistent deduplicated entity the pipeline emits.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One raw crawl observation of a venue
///
/// Created by the fetch collaborator, consumed and discarded by the pipeline
/// within a single run. Everything beyond name/address is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVenueRecord {
    /// Source site's own key for the listing (stable across crawls)
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    /// Free-text source tags, e.g. "#삼겹살무한리필"
    #[serde(default)]
    pub raw_categories: Vec<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Coordinates as scraped; parsed during normalization
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub lng: Option<String>,
    /// Up to three alternative price representations, in precedence order
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub price_range: Option<String>,
    #[serde(default)]
    pub menu_price: Option<String>,
    #[serde(default)]
    pub hours_raw: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub refill_items: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Retrieval timestamp (recency key for merge precedence)
    pub crawled_at: DateTime<Utc>,
    /// Crawl run metadata, opaque to the pipeline beyond reporting
    #[serde(default)]
    pub crawl_keyword: Option<String>,
    #[serde(default)]
    pub crawl_rect: Option<String>,
}

/// A validated latitude/longitude pair (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another point in meters (haversine)
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Geometry in WKT form, derived from the pair (lng-first per PostGIS)
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.lng, self.lat)
    }
}

/// Normalized price: numeric bounds plus the original text
///
/// Single prices have `min_price == max_price`. Range prices (lunch/dinner
/// splits, "2만원대") keep both bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub min_price: u32,
    pub max_price: u32,
    pub raw: String,
}

impl PriceInfo {
    /// Representative single value: exact price, or the range midpoint
    pub fn representative(&self) -> u32 {
        (self.min_price + self.max_price) / 2
    }
}

/// Best-effort structured operating hours
///
/// Produced only when the raw text matched a recognizable time-range pattern;
/// the raw text itself is always kept alongside as a fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredHours {
    pub open: Option<NaiveTime>,
    pub close: Option<NaiveTime>,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub last_order: Option<NaiveTime>,
    /// Weekly closed days, short Korean day names ("월".."일")
    pub closed_days: Vec<String>,
}

impl StructuredHours {
    pub fn is_empty(&self) -> bool {
        self.open.is_none()
            && self.close.is_none()
            && self.break_start.is_none()
            && self.break_end.is_none()
            && self.last_order.is_none()
            && self.closed_days.is_empty()
    }
}

/// Operating status lifecycle
///
/// Transitions are forward-only: Operating → OnHiatus → Closed. Skipping
/// OnHiatus is allowed; reopening from Closed requires an explicit manual
/// override supplied from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStatus {
    Operating,
    OnHiatus,
    Closed,
}

impl VenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueStatus::Operating => "operating",
            VenueStatus::OnHiatus => "on_hiatus",
            VenueStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<VenueStatus> {
        match s {
            "operating" => Some(VenueStatus::Operating),
            "on_hiatus" => Some(VenueStatus::OnHiatus),
            "closed" => Some(VenueStatus::Closed),
            _ => None,
        }
    }

    /// Forward-only lattice check (manual override is handled by the caller)
    pub fn can_transition_to(&self, next: VenueStatus) -> bool {
        matches!(
            (self, next),
            (VenueStatus::Operating, VenueStatus::OnHiatus)
                | (VenueStatus::Operating, VenueStatus::Closed)
                | (VenueStatus::OnHiatus, VenueStatus::Closed)
        )
    }
}

impl std::fmt::Display for VenueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single deduplicated record representing one real-world venue
///
/// Never deleted; inactivity is expressed through `status`. Geometry is not a
/// stored field: it is always derived from `coordinates` via `geometry_wkt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalVenue {
    pub id: Uuid,
    /// Unique when present; the stable merge key across crawl batches
    pub external_id: Option<String>,
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    /// Standard categories, never empty
    pub categories: Vec<String>,
    pub phone: Option<String>,
    pub price: Option<PriceInfo>,
    pub hours_raw: Option<String>,
    pub hours: Option<StructuredHours>,
    /// Deduplicated, capped at 5
    pub images: Vec<String>,
    pub refill_items: Vec<String>,
    pub status: VenueStatus,
    /// Set when a merge produced an unresolved external-id conflict
    pub needs_review: bool,
    /// Other external ids observed for this venue (merge-conflict retention)
    pub alias_external_ids: Vec<String>,
    /// Consecutive liveness-check failures (closure evidence)
    pub liveness_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time any crawl observed this venue
    pub last_seen_at: DateTime<Utc>,
}

impl CanonicalVenue {
    /// Derived geometry, always consistent with `coordinates`
    pub fn geometry_wkt(&self) -> String {
        self.coordinates.to_wkt()
    }
}
