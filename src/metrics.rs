//! Faculty-per-publication ratios and their normalization against the
//! baseline area.
//!
//! Values are computed and kept at full precision in [`AreaMetrics`]; only
//! the output rows ([`AreaStatsRow`], [`YearAreaStatsRow`]) are rounded.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    error::{IclrError, Result},
    taxonomy::AreaTaxonomy,
};

pub const BASELINE_AREA: &str = "Machine learning";

#[derive(Debug, Clone, PartialEq)]
pub struct AreaMetrics {
    pub area: String,
    pub parent: Option<String>,
    pub publication_count: u64,
    pub faculty_count: f64,
    pub faculty_per_pub: f64,
    pub iclr_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaStatsRow {
    pub area: String,
    pub parent: Option<String>,
    pub publication_count: u64,
    pub faculty_count: f64,
    pub faculty_per_pub: f64,
    pub iclr_points: f64,
}

impl From<&AreaMetrics> for AreaStatsRow {
    fn from(m: &AreaMetrics) -> Self {
        Self {
            area: m.area.clone(),
            parent: m.parent.clone(),
            publication_count: m.publication_count,
            faculty_count: round_to(m.faculty_count, 2),
            faculty_per_pub: round_to(m.faculty_per_pub, 6),
            iclr_points: round_to(m.iclr_points, 2),
        }
    }
}

// Flat rather than `#[serde(flatten)]` so the csv writer can serialize it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearAreaStatsRow {
    pub year: i32,
    pub area: String,
    pub parent: Option<String>,
    pub publication_count: u64,
    pub faculty_count: f64,
    pub faculty_per_pub: f64,
    pub iclr_points: f64,
}

impl YearAreaStatsRow {
    pub fn new(year: i32, row: AreaStatsRow) -> Self {
        Self {
            year,
            area: row.area,
            parent: row.parent,
            publication_count: row.publication_count,
            faculty_count: row.faculty_count,
            faculty_per_pub: row.faculty_per_pub,
            iclr_points: row.iclr_points,
        }
    }
}

/// Rounds half away from zero to `places` decimal places.
///
/// Exact binary halves go up: `round_to(0.125, 2)` is `0.13`, where a
/// round-half-even rounder such as Python's `round` gives `0.12`.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[derive(Debug, Clone)]
pub struct MetricCalculator {
    baseline: String,
}

impl Default for MetricCalculator {
    fn default() -> Self {
        Self::new(BASELINE_AREA)
    }
}

impl MetricCalculator {
    pub fn new(baseline: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
        }
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// Metrics for every area with at least one publication, sorted by area
    /// name (bytewise). `start`/`end` only label a missing-baseline error.
    pub fn compute(
        &self,
        publications: &BTreeMap<&str, u64>,
        credit: &BTreeMap<&str, f64>,
        taxonomy: &AreaTaxonomy,
        start: i32,
        end: i32,
    ) -> Result<Vec<AreaMetrics>> {
        let baseline_ratio = self.baseline_ratio(publications, credit, start, end)?;

        let metrics = publications
            .iter()
            .filter(|(_, &pubs)| pubs > 0)
            .map(|(&area, &pubs)| {
                let faculty_count = credit.get(area).copied().unwrap_or(0.0);
                let faculty_per_pub = faculty_count / pubs as f64;
                AreaMetrics {
                    area: area.to_string(),
                    parent: taxonomy.parent_of(area).map(str::to_string),
                    publication_count: pubs,
                    faculty_count,
                    faculty_per_pub,
                    iclr_points: faculty_per_pub / baseline_ratio,
                }
            })
            .collect();
        Ok(metrics)
    }

    fn baseline_ratio(
        &self,
        publications: &BTreeMap<&str, u64>,
        credit: &BTreeMap<&str, f64>,
        start: i32,
        end: i32,
    ) -> Result<f64> {
        let unavailable = |reason: &str| IclrError::BaselineUnavailable {
            area: self.baseline.clone(),
            start,
            end,
            reason: reason.to_string(),
        };

        let pubs = match publications.get(self.baseline.as_str()) {
            Some(&pubs) if pubs > 0 => pubs,
            _ => return Err(unavailable("no publications in range")),
        };
        let ratio = credit.get(self.baseline.as_str()).copied().unwrap_or(0.0) / pubs as f64;
        if ratio > 0.0 {
            Ok(ratio)
        } else {
            Err(unavailable("no faculty authors in range"))
        }
    }
}
