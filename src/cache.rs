//! Year/area index built from one pass over the dump, and the process-wide
//! cache that guards that build.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::BufRead,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info};

use crate::{
    classify::AreaClassifier,
    dblp::{PublicationRecord, RecordStream},
    error::{IclrError, Result},
    faculty::FacultyRegistry,
    stats::IngestStats,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearAreaBucket {
    pub publication_count: u64,
    pub faculty: BTreeSet<String>,
}

/// Per-area totals for an inclusive year range, borrowed from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSlice<'a> {
    pub start: i32,
    pub end: i32,
    pub publications: BTreeMap<&'a str, u64>,
    pub faculty: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl RangeSlice<'_> {
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregationIndex {
    years: BTreeMap<i32, BTreeMap<String, YearAreaBucket>>,
    stats: IngestStats,
}

impl AggregationIndex {
    /// Drains `records`, classifying each and counting it into its
    /// `(year, area)` bucket. Stops at the first structural error.
    pub fn build<R: BufRead>(
        records: &mut RecordStream<R>,
        classifier: &AreaClassifier,
        faculty: &FacultyRegistry,
        progress_interval: u64,
    ) -> Result<Self> {
        let mut index = AggregationIndex::default();
        let mut ticker = ProgressTicker::new(progress_interval);

        while let Some(record) = records.next() {
            let record = record?;
            index.ingest(&record, classifier, faculty);
            let papers = records.counters().conference_papers;
            if ticker.tick(papers) {
                info!(
                    "Processed {} conference papers ({} classified)...",
                    papers, index.stats.classified
                );
            }
        }

        index.stats.parse = records.counters();
        index.stats.distinct_years = index.years.len();
        index.stats.distinct_areas = index.areas().len();
        Ok(index)
    }

    pub fn ingest(&mut self, record: &PublicationRecord, classifier: &AreaClassifier, faculty: &FacultyRegistry) {
        match classifier.classify(&record.venue) {
            Some(area) => {
                self.stats.classified += 1;
                self.stats.faculty_author_hits += self.record(record.year, area, &record.authors, faculty);
            }
            None => {
                self.stats.unclassified += 1;
                debug!("No area for venue '{}'", record.venue);
            }
        }
    }

    /// Counts one publication; returns how many of its authors are faculty.
    pub fn record(&mut self, year: i32, area: &str, authors: &[String], faculty: &FacultyRegistry) -> u64 {
        let bucket = self
            .years
            .entry(year)
            .or_default()
            .entry(area.to_string())
            .or_default();
        bucket.publication_count += 1;

        let mut hits = 0;
        for author in authors.iter().filter(|a| faculty.contains(a)) {
            hits += 1;
            if !bucket.faculty.contains(author.as_str()) {
                bucket.faculty.insert(author.clone());
            }
        }
        hits
    }

    /// Folds another partial index into this one: counts add, faculty sets union.
    pub fn merge(&mut self, other: AggregationIndex) {
        for (year, areas) in other.years {
            let target = self.years.entry(year).or_default();
            for (area, bucket) in areas {
                let entry = target.entry(area).or_default();
                entry.publication_count += bucket.publication_count;
                entry.faculty.extend(bucket.faculty);
            }
        }
        let parse = &mut self.stats.parse;
        parse.elements_seen += other.stats.parse.elements_seen;
        parse.conference_papers += other.stats.parse.conference_papers;
        parse.missing_year += other.stats.parse.missing_year;
        parse.invalid_year += other.stats.parse.invalid_year;
        parse.missing_venue += other.stats.parse.missing_venue;
        parse.records_yielded += other.stats.parse.records_yielded;
        self.stats.classified += other.stats.classified;
        self.stats.unclassified += other.stats.unclassified;
        self.stats.faculty_author_hits += other.stats.faculty_author_hits;
        self.stats.distinct_years = self.years.len();
        self.stats.distinct_areas = self.areas().len();
    }

    pub fn slice(&self, start: i32, end: i32) -> Result<RangeSlice<'_>> {
        if start > end {
            return Err(IclrError::InvalidRange { start, end });
        }
        let mut publications: BTreeMap<&str, u64> = BTreeMap::new();
        let mut faculty: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for areas in self.years.range(start..=end).map(|(_, areas)| areas) {
            for (area, bucket) in areas {
                *publications.entry(area.as_str()).or_insert(0) += bucket.publication_count;
                faculty
                    .entry(area.as_str())
                    .or_default()
                    .extend(bucket.faculty.iter().map(String::as_str));
            }
        }
        Ok(RangeSlice {
            start,
            end,
            publications,
            faculty,
        })
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    pub fn year(&self, year: i32) -> Option<&BTreeMap<String, YearAreaBucket>> {
        self.years.get(&year)
    }

    pub fn bucket(&self, year: i32, area: &str) -> Option<&YearAreaBucket> {
        self.years.get(&year).and_then(|areas| areas.get(area))
    }

    pub fn areas(&self) -> BTreeSet<&str> {
        self.years
            .values()
            .flat_map(|areas| areas.keys().map(String::as_str))
            .collect()
    }

    pub fn total_publications(&self) -> u64 {
        self.years
            .values()
            .flat_map(|areas| areas.values())
            .map(|bucket| bucket.publication_count)
            .sum()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

// Fires once each time a running count passes a multiple of `interval`.
struct ProgressTicker {
    interval: u64,
    next: u64,
}

impl ProgressTicker {
    fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self { interval, next: interval }
    }

    fn tick(&mut self, count: u64) -> bool {
        if count < self.next {
            return false;
        }
        self.next = (count / self.interval + 1) * self.interval;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Building,
    Built,
    Failed,
}

#[derive(Default)]
enum CacheState {
    #[default]
    Empty,
    Building,
    Built(Arc<AggregationIndex>),
    Failed(Arc<IclrError>),
}

enum Next {
    Wait,
    Build,
}

/// Holds the aggregation index for the life of the process.
///
/// The first caller of [`get_or_build`](Self::get_or_build) runs the build;
/// callers arriving while it runs block until it finishes and share its
/// outcome. A failed build is kept: every later caller gets the same error
/// without re-reading the input, until [`invalidate`](Self::invalidate)
/// re-arms the build. Once built, every caller gets the same immutable
/// snapshot.
#[derive(Default)]
pub struct AggregationCache {
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl AggregationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<F>(&self, build: F) -> Result<Arc<AggregationIndex>>
    where
        F: FnOnce() -> Result<AggregationIndex>,
    {
        let mut state = self.lock();
        loop {
            let next = match &*state {
                CacheState::Built(index) => return Ok(Arc::clone(index)),
                CacheState::Failed(err) => return Err(IclrError::BuildFailed(Arc::clone(err))),
                CacheState::Building => Next::Wait,
                CacheState::Empty => Next::Build,
            };
            match next {
                Next::Wait => state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner),
                Next::Build => break,
            }
        }
        *state = CacheState::Building;
        drop(state);

        let mut guard = BuildGuard { cache: self, armed: true };
        let outcome = build();
        guard.armed = false;

        let result = {
            let mut state = self.lock();
            match outcome {
                Ok(index) => {
                    let index = Arc::new(index);
                    *state = CacheState::Built(Arc::clone(&index));
                    Ok(index)
                }
                Err(err) => {
                    let err = Arc::new(err);
                    *state = CacheState::Failed(Arc::clone(&err));
                    Err(IclrError::BuildFailed(err))
                }
            }
        };
        self.ready.notify_all();
        result
    }

    /// The built snapshot, without triggering or waiting for a build.
    pub fn get(&self) -> Option<Arc<AggregationIndex>> {
        match &*self.lock() {
            CacheState::Built(index) => Some(Arc::clone(index)),
            _ => None,
        }
    }

    /// Drops a built (or failed) snapshot so the next request rebuilds.
    /// A build in progress is left alone. Returns whether anything was dropped.
    pub fn invalidate(&self) -> bool {
        let mut state = self.lock();
        match &*state {
            CacheState::Built(_) | CacheState::Failed(_) => {
                *state = CacheState::Empty;
                info!("Aggregation cache invalidated");
                true
            }
            CacheState::Empty | CacheState::Building => false,
        }
    }

    pub fn status(&self) -> CacheStatus {
        match &*self.lock() {
            CacheState::Empty => CacheStatus::Empty,
            CacheState::Building => CacheStatus::Building,
            CacheState::Built(_) => CacheStatus::Built,
            CacheState::Failed(_) => CacheStatus::Failed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Resets a build that unwound (panicked) so waiters are released and a later
// caller can build again.
struct BuildGuard<'a> {
    cache: &'a AggregationCache,
    armed: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.cache.lock() = CacheState::Empty;
            self.cache.ready.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify::MatchPolicy, taxonomy::AreaTaxonomy};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc,
        },
        thread,
        time::Duration,
    };

    fn authors(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn sample_index() -> AggregationIndex {
        let faculty = FacultyRegistry::from_names(["Alice", "Bob"]);
        let mut index = AggregationIndex::default();
        index.record(2019, "Machine learning", &authors(&["Alice", "Student"]), &faculty);
        index.record(2020, "Machine learning", &authors(&["Alice"]), &faculty);
        index.record(2020, "Machine learning", &authors(&["Alice", "Alice"]), &faculty);
        index.record(2020, "Security", &authors(&["Bob"]), &faculty);
        index.record(2021, "Security", &authors(&["Carol"]), &faculty);
        index
    }

    #[test]
    fn buckets_count_publications_and_dedupe_faculty() {
        let index = sample_index();
        let bucket = index.bucket(2020, "Machine learning").unwrap();
        assert_eq!(bucket.publication_count, 2);
        assert_eq!(bucket.faculty.len(), 1);
        assert!(bucket.faculty.contains("Alice"));

        let bucket = index.bucket(2021, "Security").unwrap();
        assert_eq!(bucket.publication_count, 1);
        assert!(bucket.faculty.is_empty());
        assert_eq!(index.total_publications(), 5);
    }

    #[test]
    fn slice_sums_counts_and_unions_faculty() {
        let index = sample_index();
        let slice = index.slice(2019, 2020).unwrap();
        assert_eq!(slice.publications["Machine learning"], 3);
        assert_eq!(slice.publications["Security"], 1);
        assert_eq!(slice.faculty["Machine learning"].len(), 1);

        let slice = index.slice(2021, 2030).unwrap();
        assert!(!slice.publications.contains_key("Machine learning"));
        assert_eq!(slice.publications["Security"], 1);

        assert!(index.slice(1990, 1995).unwrap().is_empty());
    }

    #[test]
    fn reversed_slice_is_rejected() {
        let err = sample_index().slice(2021, 2019).unwrap_err();
        assert!(matches!(err, IclrError::InvalidRange { start: 2021, end: 2019 }));
    }

    #[test]
    fn merge_adds_counts_and_unions_faculty() {
        let faculty = FacultyRegistry::from_names(["Alice", "Bob"]);
        let mut left = AggregationIndex::default();
        left.record(2020, "Security", &authors(&["Alice"]), &faculty);
        let mut right = AggregationIndex::default();
        right.record(2020, "Security", &authors(&["Bob", "Alice"]), &faculty);
        right.record(2022, "Theory", &authors(&[]), &faculty);

        left.stats.parse.conference_papers = 3;
        right.stats.parse = crate::dblp::ParseCounters {
            elements_seen: 9,
            conference_papers: 4,
            missing_year: 1,
            invalid_year: 1,
            ..Default::default()
        };

        left.merge(right);
        assert_eq!(left.stats().parse.conference_papers, 7);
        assert_eq!(left.stats().parse.elements_seen, 9);
        assert_eq!(left.stats().skipped(), 2);
        let bucket = left.bucket(2020, "Security").unwrap();
        assert_eq!(bucket.publication_count, 2);
        assert_eq!(bucket.faculty.len(), 2);
        assert_eq!(left.years().collect::<Vec<_>>(), vec![2020, 2022]);
    }

    #[test]
    fn build_drains_stream_and_records_stats() {
        let taxonomy = AreaTaxonomy::from_entries([("AI", "Machine learning", "ICLR")]);
        let classifier = AreaClassifier::new(&taxonomy, MatchPolicy::CaseSensitive);
        let faculty = FacultyRegistry::from_names(["Alice"]);
        let xml = "<dblp>\
            <inproceedings><author>Alice</author><year>2020</year><booktitle>ICLR</booktitle></inproceedings>\
            <inproceedings><author>Alice</author><year>2020</year><booktitle>SOSP</booktitle></inproceedings>\
            <inproceedings><author>Alice</author><booktitle>ICLR</booktitle></inproceedings>\
            <article><author>Alice</author><year>2020</year></article>\
            </dblp>";
        let mut stream = RecordStream::new(xml.as_bytes());
        let index = AggregationIndex::build(&mut stream, &classifier, &faculty, 1).unwrap();

        assert_eq!(index.bucket(2020, "Machine learning").unwrap().publication_count, 1);
        let stats = index.stats();
        assert_eq!(stats.classified, 1);
        assert_eq!(stats.unclassified, 1);
        assert_eq!(stats.faculty_author_hits, 1);
        assert_eq!(stats.parse.conference_papers, 3);
        assert_eq!(stats.parse.elements_seen, 4);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.distinct_years, 1);
    }

    #[test]
    fn build_fails_on_malformed_stream() {
        let taxonomy = AreaTaxonomy::from_entries([("AI", "Machine learning", "ICLR")]);
        let classifier = AreaClassifier::new(&taxonomy, MatchPolicy::CaseSensitive);
        let mut stream = RecordStream::new("<dblp><inproceedings>".as_bytes());
        let err = AggregationIndex::build(&mut stream, &classifier, &FacultyRegistry::default(), 10).unwrap_err();
        assert!(matches!(err, IclrError::MalformedInput { .. }));
    }

    #[test]
    fn concurrent_requests_share_a_single_build() {
        let cache = Arc::new(AggregationCache::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                thread::spawn(move || {
                    cache
                        .get_or_build(|| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(sample_index())
                        })
                        .unwrap()
                })
            })
            .collect();

        let snapshots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(snapshots.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.status(), CacheStatus::Built);
    }

    #[test]
    fn built_cache_is_not_rebuilt() {
        let cache = AggregationCache::new();
        let first = cache.get_or_build(|| Ok(sample_index())).unwrap();
        let second = cache
            .get_or_build(|| panic!("cache must not rebuild"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_build_is_kept_until_invalidated() {
        let cache = AggregationCache::new();
        let err = cache
            .get_or_build(|| {
                Err(IclrError::MalformedInput {
                    position: 7,
                    reason: "truncated".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err.root(), IclrError::MalformedInput { position: 7, .. }));
        assert_eq!(cache.status(), CacheStatus::Failed);
        assert!(cache.get().is_none());

        let builds = AtomicUsize::new(0);
        for _ in 0..3 {
            let err = cache
                .get_or_build(|| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(sample_index())
                })
                .unwrap_err();
            assert!(matches!(err.root(), IclrError::MalformedInput { position: 7, .. }));
        }
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        assert!(cache.invalidate());
        let index = cache.get_or_build(|| Ok(sample_index())).unwrap();
        assert_eq!(index.total_publications(), 5);
        assert_eq!(cache.status(), CacheStatus::Built);
    }

    #[test]
    fn progress_ticks_once_per_interval_crossed() {
        let mut ticker = ProgressTicker::new(3);
        let fired: Vec<u64> = [1, 2, 4, 5, 6, 7, 13, 14]
            .into_iter()
            .filter(|&count| ticker.tick(count))
            .collect();
        assert_eq!(fired, vec![4, 6, 13]);

        let mut every = ProgressTicker::new(0);
        assert!(every.tick(1));
        assert!(every.tick(2));
    }

    #[test]
    fn waiters_share_a_failed_build() {
        let cache = Arc::new(AggregationCache::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let builder = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_build(|| {
                    release_rx.recv().unwrap();
                    Err(IclrError::MalformedInput {
                        position: 0,
                        reason: "bad gzip header".to_string(),
                    })
                })
            })
        };
        while cache.status() != CacheStatus::Building {
            thread::yield_now();
        }

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache.get_or_build(|| {
                        Err(IclrError::MalformedInput {
                            position: 0,
                            reason: "late retry".to_string(),
                        })
                    })
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert!(builder.join().unwrap().is_err());
        for waiter in waiters {
            let err = waiter.join().unwrap().unwrap_err();
            assert!(matches!(err, IclrError::BuildFailed(_)));
        }
    }

    #[test]
    fn panicking_build_leaves_cache_buildable() {
        let cache = AggregationCache::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cache.get_or_build(|| panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert!(cache.get_or_build(|| Ok(sample_index())).is_ok());
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let cache = AggregationCache::new();
        assert!(!cache.invalidate());
        let first = cache.get_or_build(|| Ok(sample_index())).unwrap();
        assert!(cache.invalidate());
        assert_eq!(cache.status(), CacheStatus::Empty);
        let second = cache.get_or_build(|| Ok(AggregationIndex::default())).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_empty());
    }
}
