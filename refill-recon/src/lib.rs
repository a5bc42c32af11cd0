//! refill-recon - Venue reconciliation pipeline
//!
//! Turns raw crawl batches of all-you-can-eat venue listings into a clean,
//! deduplicated canonical dataset: field normalization, coordinate
//! validation, category mapping, duplicate detection, merge resolution and
//! status lifecycle, orchestrated per batch with a structured run report.

pub mod category;
pub mod db;
pub mod dedup;
pub mod error;
pub mod merge;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod status;
pub mod types;
pub mod validator;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{BatchOutcome, ReconPipeline};
pub use report::RunReport;
