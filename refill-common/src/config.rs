//! Pipeline configuration loading
//!
//! Values come from three tiers: compiled defaults, an optional TOML file,
//! and `REFILL_*` environment variables (highest priority). The pipeline
//! itself only ever sees the resolved `ReconConfig` value.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Metropolitan bounding rectangle (WGS84 degrees)
///
/// Defaults cover Seoul proper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lat: 37.40,
            max_lat: 37.70,
            min_lng: 126.80,
            max_lng: 127.20,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    pub fn center_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }
}

/// Duplicate-detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Combined similarity at or above which a pair is linked
    pub similarity_threshold: f64,
    /// Maximum plausible distance between duplicate listings (meters);
    /// also sizes the spatial bucketing grid
    pub max_duplicate_distance_m: f64,
    /// Weighted-average weights; name similarity is weighted highest
    pub name_weight: f64,
    pub proximity_weight: f64,
    pub address_weight: f64,
    /// Coordinate agreement tolerance for the merge-time majority vote (meters)
    pub coordinate_tolerance_m: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            max_duplicate_distance_m: 100.0,
            name_weight: 0.5,
            proximity_weight: 0.3,
            address_weight: 0.2,
            coordinate_tolerance_m: 30.0,
        }
    }
}

/// Status-lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Days without any crawl observation before Operating → OnHiatus
    pub staleness_days: i64,
    /// Consecutive liveness-check failures before → Closed
    pub liveness_failure_threshold: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            staleness_days: 30,
            liveness_failure_threshold: 2,
        }
    }
}

/// Category mapping table and fallback rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Source keyword → standard category (many-to-one, substring match)
    pub table: BTreeMap<String, String>,
    /// Assigned when mapping yields nothing and the record is not refill-relevant
    pub default_category: String,
    /// Assigned when mapping yields nothing but the record is refill-relevant
    pub refill_category: String,
    /// Keywords marking a record as refill-relevant (case-insensitive substring)
    pub refill_keywords: Vec<String>,
    /// Tags matching any of these regexes are discarded before mapping
    pub exclude_patterns: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            table: default_category_table(),
            default_category: "기타".to_string(),
            refill_category: "무한리필".to_string(),
            refill_keywords: vec![
                "무한리필".to_string(),
                "무제한".to_string(),
                "뷔페".to_string(),
                "리필".to_string(),
                "셀프바".to_string(),
            ],
            exclude_patterns: vec![
                ".*맛집$".to_string(),
                ".*역$".to_string(),
                ".*구$".to_string(),
                "할인".to_string(),
                "이벤트".to_string(),
                "오픈".to_string(),
                "신규".to_string(),
                "인기".to_string(),
                "유명".to_string(),
            ],
        }
    }
}

/// Resolved pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub region: BoundingBox,
    pub dedup: DedupConfig,
    pub status: StatusConfig,
    pub category: CategoryConfig,
    /// Soft-warning distance when an address-locality hint disagrees (meters)
    pub address_disagreement_warn_m: f64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            region: BoundingBox::default(),
            dedup: DedupConfig::default(),
            status: StatusConfig::default(),
            category: CategoryConfig::default(),
            address_disagreement_warn_m: 2_000.0,
        }
    }
}

impl ReconConfig {
    /// Load configuration: defaults, then TOML file, then environment
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
                let parsed: ReconConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))?;
                info!("Configuration loaded from {}", path.display());
                parsed
            }
            None => ReconConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `REFILL_*` environment overrides (highest priority)
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_f64("REFILL_SIMILARITY_THRESHOLD") {
            warn!(
                "similarity_threshold overridden from environment: {} → {}",
                self.dedup.similarity_threshold, v
            );
            self.dedup.similarity_threshold = v;
        }
        if let Some(v) = env_f64("REFILL_MAX_DUPLICATE_DISTANCE_M") {
            self.dedup.max_duplicate_distance_m = v;
        }
        if let Ok(v) = std::env::var("REFILL_STALENESS_DAYS") {
            match v.parse::<i64>() {
                Ok(days) => self.status.staleness_days = days,
                Err(_) => warn!("REFILL_STALENESS_DAYS is not an integer: {}", v),
            }
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.category.table.is_empty() {
            return Err(Error::Config("category mapping table is empty".to_string()));
        }
        if self.category.default_category.trim().is_empty() {
            return Err(Error::Config("default category is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity threshold out of range: {}",
                self.dedup.similarity_threshold
            )));
        }
        let weight_sum =
            self.dedup.name_weight + self.dedup.proximity_weight + self.dedup.address_weight;
        if weight_sum <= 0.0 {
            return Err(Error::Config("similarity weights sum to zero".to_string()));
        }
        if self.region.min_lat >= self.region.max_lat
            || self.region.min_lng >= self.region.max_lng
        {
            return Err(Error::Config("bounding box is degenerate".to_string()));
        }
        if self.dedup.max_duplicate_distance_m <= 0.0 {
            return Err(Error::Config(
                "max duplicate distance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_f64(name: &str) -> Option<f64> {
    match std::env::var(name) {
        Ok(v) => match v.parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("{} is not a number: {}", name, v);
                None
            }
        },
        Err(_) => None,
    }
}

/// Built-in source-keyword → standard-category table
///
/// Seven standard categories; keywords are matched as substrings of the
/// cleaned tag. Deployments may replace the whole table via TOML.
fn default_category_table() -> BTreeMap<String, String> {
    let entries: &[(&str, &str)] = &[
        // 고기
        ("삼겹살", "고기"),
        ("갈비", "고기"),
        ("소고기", "고기"),
        ("돼지고기", "고기"),
        ("닭고기", "고기"),
        ("양고기", "고기"),
        ("오리고기", "고기"),
        ("고기무한리필", "고기"),
        ("스테이크", "고기"),
        ("바베큐", "고기"),
        ("bbq", "고기"),
        ("구이", "고기"),
        ("육류", "고기"),
        // 해산물
        ("초밥", "해산물"),
        ("사시미", "해산물"),
        ("스시", "해산물"),
        ("해산물", "해산물"),
        ("수산물", "해산물"),
        ("생선", "해산물"),
        ("조개", "해산물"),
        ("새우", "해산물"),
        ("대게", "해산물"),
        ("오징어", "해산물"),
        ("문어", "해산물"),
        // 양식
        ("파스타", "양식"),
        ("피자", "양식"),
        ("이탈리안", "양식"),
        ("양식", "양식"),
        ("브런치", "양식"),
        ("샐러드", "양식"),
        ("버거", "양식"),
        ("햄버거", "양식"),
        // 한식
        ("한식", "한식"),
        ("한국음식", "한식"),
        ("김치", "한식"),
        ("비빔밥", "한식"),
        ("냉면", "한식"),
        ("불고기", "한식"),
        ("떡볶이", "한식"),
        ("순대", "한식"),
        ("족발", "한식"),
        ("보쌈", "한식"),
        ("곱창", "한식"),
        ("막창", "한식"),
        ("찜닭", "한식"),
        ("치킨", "한식"),
        ("분식", "한식"),
        // 중식
        ("중식", "중식"),
        ("중국음식", "중식"),
        ("짜장면", "중식"),
        ("짬뽕", "중식"),
        ("탕수육", "중식"),
        ("마라탕", "중식"),
        ("양꼬치", "중식"),
        // 일식
        ("일식", "일식"),
        ("일본음식", "일식"),
        ("돈까스", "일식"),
        ("우동", "일식"),
        ("라멘", "일식"),
        ("소바", "일식"),
        ("규동", "일식"),
        ("야키토리", "일식"),
        // 디저트
        ("디저트", "디저트"),
        ("케이크", "디저트"),
        ("아이스크림", "디저트"),
        ("베이커리", "디저트"),
        ("마카롱", "디저트"),
        ("와플", "디저트"),
        ("카페", "디저트"),
        ("커피", "디저트"),
    ];

    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
