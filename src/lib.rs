//! ICLR points: how many publications in a research area cost, in faculty
//! attention, the same as one publication in a baseline area.
//!
//! The pipeline streams a DBLP dump once ([`dblp`]), classifies each
//! conference paper by venue ([`classify`]), and caches per-year, per-area
//! publication counts and faculty sets ([`cache`]). Queries slice that cache,
//! split each faculty member's credit across the areas they published in
//! ([`attribution`]) and normalize faculty-per-publication against the
//! baseline ([`metrics`]). [`engine::IclrEngine`] ties it together.

pub mod attribution;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dblp;
pub mod engine;
pub mod error;
pub mod faculty;
pub mod memory_usage;
pub mod metrics;
pub mod stats;
pub mod taxonomy;
pub mod util;

pub use cache::{AggregationCache, AggregationIndex, CacheStatus};
pub use classify::{AreaClassifier, MatchPolicy};
pub use config::Settings;
pub use engine::{EngineOptions, IclrEngine, YearRange};
pub use error::{IclrError, Result};
pub use faculty::FacultyRegistry;
pub use metrics::{AreaMetrics, AreaStatsRow, YearAreaStatsRow, BASELINE_AREA};
pub use taxonomy::AreaTaxonomy;
