//! Field Normalizer stage
//!
//! Coerces one raw crawl observation into typed, canonical values. The only
//! hard failure is an empty name or address (`MalformedInput`); every other
//! defect degrades to an absent field.

mod hours;
mod phone;
mod price;

pub use hours::parse_hours;
pub use phone::normalize_phone;
pub use price::{choose_price, parse_price_text};

use crate::error::RecordIssue;
use crate::types::NormalizedVenue;
use refill_common::models::{Coordinates, RawVenueRecord};
use tracing::debug;

/// Images kept per venue after dedup
pub const MAX_IMAGES: usize = 5;

pub struct FieldNormalizer {
    /// Lowercased refill keywords (substring, case-insensitive)
    refill_keywords: Vec<String>,
}

impl FieldNormalizer {
    pub fn new(refill_keywords: &[String]) -> Self {
        Self {
            refill_keywords: refill_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Normalize one raw record
    ///
    /// Errors only on empty/whitespace name or address; the caller counts the
    /// record and drops it from the batch.
    pub fn normalize(&self, raw: &RawVenueRecord) -> Result<NormalizedVenue, RecordIssue> {
        let name = raw.name.trim();
        let address = raw.address.trim();
        if name.is_empty() || address.is_empty() {
            return Err(RecordIssue::MalformedInput);
        }

        let phone = raw.phone.as_deref().and_then(normalize_phone);

        let price = choose_price(&[
            raw.price.as_deref(),
            raw.price_range.as_deref(),
            raw.menu_price.as_deref(),
        ]);

        let hours_raw = raw
            .hours_raw
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let hours = hours_raw.as_deref().and_then(parse_hours);

        let coordinates = parse_coordinates(raw.lat.as_deref(), raw.lng.as_deref());
        if coordinates.is_none() && (raw.lat.is_some() || raw.lng.is_some()) {
            debug!(name = %name, "coordinates present but unparsable, treating as absent");
        }

        let raw_categories: Vec<String> = raw
            .raw_categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let refill_items = dedup_preserving_order(
            raw.refill_items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        );

        let images = normalize_images(&raw.image_urls);

        let refill_relevant = self.is_refill_relevant(name, &raw_categories, raw.description.as_deref());

        Ok(NormalizedVenue {
            external_id: raw
                .external_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            name: name.to_string(),
            address: address.to_string(),
            raw_categories,
            phone,
            price,
            hours_raw,
            hours,
            coordinates,
            images,
            refill_items,
            refill_relevant,
            categories: Vec::new(),
            needs_geocoding: false,
            crawled_at: raw.crawled_at,
        })
    }

    /// Substring match of the configured keyword set against name, tags and
    /// description. A tag, never an error condition.
    fn is_refill_relevant(
        &self,
        name: &str,
        raw_categories: &[String],
        description: Option<&str>,
    ) -> bool {
        let mut haystack = name.to_lowercase();
        for tag in raw_categories {
            haystack.push(' ');
            haystack.push_str(&tag.to_lowercase());
        }
        if let Some(desc) = description {
            haystack.push(' ');
            haystack.push_str(&desc.to_lowercase());
        }
        self.refill_keywords.iter().any(|k| haystack.contains(k))
    }
}

/// Parse scraped lat/lng strings; anything non-finite is treated as absent
fn parse_coordinates(lat: Option<&str>, lng: Option<&str>) -> Option<Coordinates> {
    let lat: f64 = lat?.trim().parse().ok()?;
    let lng: f64 = lng?.trim().parse().ok()?;
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }
    Some(Coordinates::new(lat, lng))
}

/// Keep well-formed absolute http(s) URLs, first-seen order, capped
fn normalize_images(urls: &[String]) -> Vec<String> {
    let valid = urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| is_absolute_http_url(u));
    let mut images = dedup_preserving_order(valid);
    images.truncate(MAX_IMAGES);
    images
}

fn is_absolute_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split('/').next().unwrap_or("");
            !host.is_empty() && !url.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn dedup_preserving_order<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
