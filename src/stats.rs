use log::info;

use crate::dblp::ParseCounters;

/// Counters for one aggregation build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub parse: ParseCounters,
    pub unclassified: u64,
    pub classified: u64,
    pub faculty_author_hits: u64,
    pub distinct_years: usize,
    pub distinct_areas: usize,
}

impl IngestStats {
    pub fn skipped(&self) -> u64 {
        self.parse.missing_year + self.parse.invalid_year + self.parse.missing_venue
    }

    pub fn log_current_stats(&self, stage: &str) {
        info!("--- Ingest Stats ({}) ---", stage);
        info!("    Records Seen: {}", self.parse.elements_seen);
        info!("    Conference Papers: {}", self.parse.conference_papers);
        info!("    Skipped (missing year): {}", self.parse.missing_year);
        info!("    Skipped (non-numeric year): {}", self.parse.invalid_year);
        info!("    Skipped (missing venue): {}", self.parse.missing_venue);
        info!("    Unclassified Venue: {}", self.unclassified);
        info!("    Classified: {}", self.classified);
        info!("    Faculty Author Hits: {}", self.faculty_author_hits);
        if self.distinct_years > 0 {
            info!("    Distinct Years: {}", self.distinct_years);
            info!("    Distinct Areas: {}", self.distinct_areas);
        }
        info!("------------------------------");
    }
}
