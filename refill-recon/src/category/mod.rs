//! Category Mapper stage
//!
//! Maps free-text source tags onto the fixed standard taxonomy via a
//! many-to-one keyword table, with a total fallback: refill-relevant records
//! get the refill category, everything else the configured default. This
//! function never returns an empty set and never fails per record; only a
//! broken table at construction time is an error (batch-fatal).

use crate::error::{PipelineError, PipelineResult};
use crate::types::NormalizedVenue;
use refill_common::config::CategoryConfig;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

pub struct CategoryMapper {
    /// (lowercased keyword, standard category), substring match
    table: Vec<(String, String)>,
    exclude: Vec<Regex>,
    default_category: String,
    refill_category: String,
}

impl CategoryMapper {
    /// Build the mapper from configuration
    ///
    /// An empty table or an invalid exclusion pattern is a shared-resource
    /// failure: the whole batch must abort before any writes.
    pub fn from_config(config: &CategoryConfig) -> PipelineResult<Self> {
        if config.table.is_empty() {
            return Err(PipelineError::ConfigLoad(
                "category mapping table is empty".to_string(),
            ));
        }

        let exclude = config
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    PipelineError::ConfigLoad(format!("bad exclusion pattern {:?}: {}", p, e))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            table: config
                .table
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            exclude,
            default_category: config.default_category.clone(),
            refill_category: config.refill_category.clone(),
        })
    }

    /// Map one venue's tags to a non-empty standard category set
    ///
    /// Also consults the venue name and refill items, which frequently carry
    /// the cuisine keyword when the tags are pure location noise.
    pub fn map(&self, venue: &NormalizedVenue) -> Vec<String> {
        let mut mapped: BTreeSet<String> = BTreeSet::new();

        for tag in &venue.raw_categories {
            let cleaned = clean_tag(tag);
            if cleaned.is_empty() || self.is_excluded(&cleaned) {
                continue;
            }
            for (keyword, category) in &self.table {
                if cleaned.contains(keyword.as_str()) {
                    mapped.insert(category.clone());
                }
            }
        }

        let name = venue.name.to_lowercase();
        for (keyword, category) in &self.table {
            if name.contains(keyword.as_str()) {
                mapped.insert(category.clone());
            }
        }

        for item in &venue.refill_items {
            let item = item.to_lowercase();
            for (keyword, category) in &self.table {
                if item.contains(keyword.as_str()) {
                    mapped.insert(category.clone());
                }
            }
        }

        if mapped.is_empty() {
            let fallback = if venue.refill_relevant {
                &self.refill_category
            } else {
                &self.default_category
            };
            debug!(venue = %venue.name, fallback = %fallback, "no tag mapped, applying fallback category");
            mapped.insert(fallback.clone());
        }

        mapped.into_iter().collect()
    }

    fn is_excluded(&self, tag: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(tag))
    }
}

/// Strip tag markers and lowercase
fn clean_tag(tag: &str) -> String {
    tag.replace('#', "").trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use refill_common::config::CategoryConfig;

    fn venue_with_tags(tags: &[&str], refill_relevant: bool) -> NormalizedVenue {
        NormalizedVenue {
            external_id: None,
            name: "어느 식당".to_string(),
            address: "서울 강남구".to_string(),
            raw_categories: tags.iter().map(|t| t.to_string()).collect(),
            phone: None,
            price: None,
            hours_raw: None,
            hours: None,
            coordinates: None,
            images: vec![],
            refill_items: vec![],
            refill_relevant,
            categories: vec![],
            needs_geocoding: false,
            crawled_at: Utc::now(),
        }
    }

    fn mapper() -> CategoryMapper {
        CategoryMapper::from_config(&CategoryConfig::default()).unwrap()
    }

    #[test]
    fn known_tags_map_to_standard_categories() {
        let venue = venue_with_tags(&["#삼겹살무한리필", "#초밥"], true);
        let categories = mapper().map(&venue);
        assert!(categories.contains(&"고기".to_string()));
        assert!(categories.contains(&"해산물".to_string()));
    }

    #[test]
    fn location_noise_tags_are_excluded() {
        // "강남맛집" would otherwise never map; exclusion keeps it from
        // polluting substring matching
        let venue = venue_with_tags(&["#강남맛집", "#강남역"], false);
        let categories = mapper().map(&venue);
        assert_eq!(categories, vec!["기타".to_string()]);
    }

    #[test]
    fn refill_relevant_fallback() {
        let venue = venue_with_tags(&[], true);
        assert_eq!(mapper().map(&venue), vec!["무한리필".to_string()]);
    }

    #[test]
    fn default_fallback_is_never_empty() {
        let venue = venue_with_tags(&["#알수없는태그"], false);
        let categories = mapper().map(&venue);
        assert!(!categories.is_empty());
        assert_eq!(categories, vec!["기타".to_string()]);
    }

    #[test]
    fn venue_name_contributes_to_mapping() {
        let mut venue = venue_with_tags(&[], false);
        venue.name = "스시 오마카세".to_string();
        let categories = mapper().map(&venue);
        assert!(categories.contains(&"해산물".to_string()));
    }

    #[test]
    fn empty_table_aborts_construction() {
        let mut config = CategoryConfig::default();
        config.table.clear();
        assert!(matches!(
            CategoryMapper::from_config(&config),
            Err(PipelineError::ConfigLoad(_))
        ));
    }

    #[test]
    fn bad_exclusion_pattern_aborts_construction() {
        let mut config = CategoryConfig::default();
        config.exclude_patterns.push("([unclosed".to_string());
        assert!(matches!(
            CategoryMapper::from_config(&config),
            Err(PipelineError::ConfigLoad(_))
        ));
    }
}
