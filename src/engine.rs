//! Query interface over the cached aggregation index.
//!
//! [`IclrEngine`] owns the loaded roster and taxonomy, the dump location and
//! the [`AggregationCache`]. The first query builds the index with a single
//! pass over the dump; every later query slices that snapshot.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Instant,
};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    attribution::fractional_faculty,
    cache::{AggregationCache, AggregationIndex},
    classify::{AreaClassifier, MatchPolicy},
    config::{Settings, DEFAULT_PROGRESS_INTERVAL},
    dblp::open_dump,
    error::{IclrError, Result},
    faculty::FacultyRegistry,
    memory_usage,
    metrics::{AreaMetrics, AreaStatsRow, MetricCalculator, YearAreaStatsRow, BASELINE_AREA},
    taxonomy::AreaTaxonomy,
    util::format_elapsed,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub baseline_area: String,
    pub match_policy: MatchPolicy,
    pub show_progress: bool,
    pub progress_interval: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            baseline_area: BASELINE_AREA.to_string(),
            match_policy: MatchPolicy::default(),
            show_progress: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Inclusive year range as typed on the command line: `2019-2023`,
/// `2019:2023` or a single year `2020`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// The same range with its bounds in order, and whether they were swapped.
    pub fn normalized(self) -> (Self, bool) {
        if self.start > self.end {
            (Self::new(self.end, self.start), true)
        } else {
            (self, false)
        }
    }
}

impl FromStr for YearRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let parse_year = |text: &str| {
            text.trim()
                .parse::<i32>()
                .map_err(|_| format!("Invalid year '{}' in range '{}'", text.trim(), s))
        };
        match s.split_once(':').or_else(|| s.split_once('-')) {
            Some((start, end)) => Ok(Self::new(parse_year(start)?, parse_year(end)?)),
            None => {
                let year = parse_year(s)?;
                Ok(Self::new(year, year))
            }
        }
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub publications: u64,
    pub areas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub total_publications: u64,
    pub areas: Vec<String>,
    pub years: Vec<YearSummary>,
}

impl IndexSummary {
    pub fn from_index(index: &AggregationIndex) -> Self {
        let years = index
            .years()
            .map(|year| {
                let areas = index.year(year);
                YearSummary {
                    year,
                    publications: areas
                        .map(|areas| areas.values().map(|b| b.publication_count).sum())
                        .unwrap_or(0),
                    areas: areas.map_or(0, |areas| areas.len()),
                }
            })
            .collect();
        Self {
            total_publications: index.total_publications(),
            areas: index.areas().into_iter().map(str::to_string).collect(),
            years,
        }
    }
}

/// Slices `index` to `[start, end]`, attributes faculty fractionally and
/// normalizes against the calculator's baseline.
pub fn range_metrics(
    index: &AggregationIndex,
    taxonomy: &AreaTaxonomy,
    calculator: &MetricCalculator,
    start: i32,
    end: i32,
) -> Result<Vec<AreaMetrics>> {
    let slice = index.slice(start, end)?;
    let credit = fractional_faculty(&slice.faculty);
    calculator.compute(&slice.publications, &credit, taxonomy, start, end)
}

pub struct IclrEngine {
    faculty: FacultyRegistry,
    taxonomy: AreaTaxonomy,
    classifier: AreaClassifier,
    calculator: MetricCalculator,
    dump_path: PathBuf,
    options: EngineOptions,
    cache: AggregationCache,
}

impl IclrEngine {
    pub fn new(
        faculty: FacultyRegistry,
        taxonomy: AreaTaxonomy,
        dump_path: impl Into<PathBuf>,
        options: EngineOptions,
    ) -> Self {
        let classifier = AreaClassifier::new(&taxonomy, options.match_policy);
        let calculator = MetricCalculator::new(options.baseline_area.clone());
        Self {
            faculty,
            taxonomy,
            classifier,
            calculator,
            dump_path: dump_path.into(),
            options,
            cache: AggregationCache::new(),
        }
    }

    /// Loads the roster and taxonomy named by `settings`. The dump is not
    /// touched until the first query.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let faculty = FacultyRegistry::load(&settings.faculty_path)?;
        let taxonomy = AreaTaxonomy::load(&settings.taxonomy_path)?;
        info!(
            "Venue matching is {}; baseline area is '{}'",
            settings.match_policy, settings.baseline_area
        );
        Ok(Self::new(
            faculty,
            taxonomy,
            settings.dblp_path.clone(),
            settings.engine_options(),
        ))
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &AggregationCache {
        &self.cache
    }

    /// Builds the index now if it has not been built yet.
    pub fn warm(&self) -> Result<Arc<AggregationIndex>> {
        self.cache.get_or_build(|| self.build_index())
    }

    pub fn invalidate(&self) -> bool {
        self.cache.invalidate()
    }

    /// Full-precision metrics for `[start, end]`, sorted by area name.
    pub fn area_metrics(&self, start: i32, end: i32) -> Result<Vec<AreaMetrics>> {
        if start > end {
            return Err(IclrError::InvalidRange { start, end });
        }
        let index = self.warm()?;
        range_metrics(&index, &self.taxonomy, &self.calculator, start, end)
    }

    pub fn area_stats(&self, start: i32, end: i32) -> Result<Vec<AreaStatsRow>> {
        let metrics = self.area_metrics(start, end)?;
        Ok(metrics.iter().map(AreaStatsRow::from).collect())
    }

    /// One block of rows per indexed year (within `range`, if given), in
    /// ascending year order. Years without a usable baseline are left out.
    pub fn yearly_area_stats(&self, range: Option<(i32, i32)>) -> Result<Vec<YearAreaStatsRow>> {
        if let Some((start, end)) = range {
            if start > end {
                return Err(IclrError::InvalidRange { start, end });
            }
        }
        let index = self.warm()?;
        let years: Vec<i32> = index
            .years()
            .filter(|year| range.map_or(true, |(start, end)| (start..=end).contains(year)))
            .collect();

        let per_year = years
            .par_iter()
            .map(|&year| self.year_rows(&index, year))
            .collect::<Result<Vec<_>>>()?;

        Ok(per_year.into_iter().flatten().collect())
    }

    fn year_rows(&self, index: &AggregationIndex, year: i32) -> Result<Vec<YearAreaStatsRow>> {
        match range_metrics(index, &self.taxonomy, &self.calculator, year, year) {
            Ok(metrics) => Ok(metrics
                .iter()
                .map(|m| YearAreaStatsRow::new(year, AreaStatsRow::from(m)))
                .collect()),
            Err(IclrError::BaselineUnavailable { reason, .. }) => {
                debug!(
                    "Skipping {}: baseline '{}' unavailable ({})",
                    year,
                    self.calculator.baseline(),
                    reason
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn summary(&self) -> Result<IndexSummary> {
        let index = self.warm()?;
        Ok(IndexSummary::from_index(&index))
    }

    fn build_index(&self) -> Result<AggregationIndex> {
        let start_time = Instant::now();
        info!(
            "Building aggregation index from {} ({} venue matching)",
            self.dump_path.display(),
            self.classifier.policy()
        );
        memory_usage::log_memory_usage("before build");

        let progress = if self.options.show_progress {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta} @ {bytes_per_sec}) {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message("reading dump");
            bar
        } else {
            ProgressBar::hidden()
        };

        let built = open_dump(&self.dump_path, &progress).and_then(|mut records| {
            AggregationIndex::build(
                &mut records,
                &self.classifier,
                &self.faculty,
                self.options.progress_interval,
            )
        });
        progress.finish_and_clear();
        let index = built?;

        index.stats().log_current_stats("Final");
        info!(
            "Aggregation index built in {}: {} publications across {} years",
            format_elapsed(start_time.elapsed()),
            index.total_publications(),
            index.stats().distinct_years
        );
        memory_usage::log_memory_usage("after build");
        Ok(index)
    }
}
