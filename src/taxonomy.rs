//! Conference -> area taxonomy.
//!
//! The taxonomy file has a header line followed by
//! `parent_area,area,abbreviation,conference` rows. Conference fragments keep
//! the order in which they first appear in the file, which is the order the
//! classifier tries them in.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::File,
    io::Read,
    path::Path,
};

use log::{debug, info};

use crate::error::{IclrError, Result};

const TAXONOMY_FIELDS: usize = 4;

/// One conference-name fragment and the area it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceFragment {
    pub fragment: String,
    pub area: String,
}

#[derive(Debug, Clone, Default)]
pub struct AreaTaxonomy {
    fragments: Vec<ConferenceFragment>,
    area_to_parent: BTreeMap<String, String>,
}

impl AreaTaxonomy {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IclrError::io(path, e))?;
        let taxonomy = Self::from_reader(file, path)?;
        info!(
            "Loaded taxonomy from {}: {} conference fragments across {} areas",
            path.display(),
            taxonomy.fragments.len(),
            taxonomy.areas().len()
        );
        Ok(taxonomy)
    }

    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| IclrError::from_csv(origin, e))?;
        if headers.iter().all(|field| field.is_empty()) {
            return Err(IclrError::data_format(origin, 1, "missing header line"));
        }

        let mut builder = TaxonomyBuilder::default();
        for result in csv_reader.records() {
            let record = result.map_err(|e| IclrError::from_csv(origin, e))?;
            let line = record.position().map(|pos| pos.line()).unwrap_or(0);
            if record.len() != TAXONOMY_FIELDS {
                return Err(IclrError::data_format(
                    origin,
                    line,
                    format!("expected {} fields, found {}", TAXONOMY_FIELDS, record.len()),
                ));
            }
            let (parent, area, conference) = (&record[0], &record[1], &record[3]);
            if conference.is_empty() {
                return Err(IclrError::data_format(origin, line, "empty conference name"));
            }
            if area.is_empty() {
                return Err(IclrError::data_format(origin, line, "empty area name"));
            }
            builder.push(parent, area, conference);
        }

        Ok(builder.finish())
    }

    /// Builds a taxonomy from `(parent, area, conference)` triples, in order.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut builder = TaxonomyBuilder::default();
        for (parent, area, conference) in entries {
            builder.push(parent, area, conference);
        }
        builder.finish()
    }

    /// Conference fragments in classification order.
    pub fn fragments(&self) -> &[ConferenceFragment] {
        &self.fragments
    }

    pub fn parent_of(&self, area: &str) -> Option<&str> {
        self.area_to_parent.get(area).map(String::as_str)
    }

    pub fn areas(&self) -> BTreeSet<&str> {
        self.fragments.iter().map(|f| f.area.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[derive(Default)]
struct TaxonomyBuilder {
    fragments: Vec<ConferenceFragment>,
    positions: HashMap<String, usize>,
    area_to_parent: BTreeMap<String, String>,
}

impl TaxonomyBuilder {
    // A repeated conference keeps its first position but takes the latest area.
    fn push(&mut self, parent: &str, area: &str, conference: &str) {
        match self.positions.get(conference) {
            Some(&idx) => {
                debug!(
                    "Conference '{}' remapped from '{}' to '{}'",
                    conference, self.fragments[idx].area, area
                );
                self.fragments[idx].area = area.to_string();
            }
            None => {
                self.positions.insert(conference.to_string(), self.fragments.len());
                self.fragments.push(ConferenceFragment {
                    fragment: conference.to_string(),
                    area: area.to_string(),
                });
            }
        }
        if !parent.is_empty() {
            self.area_to_parent.insert(area.to_string(), parent.to_string());
        }
    }

    fn finish(self) -> AreaTaxonomy {
        AreaTaxonomy {
            fragments: self.fragments,
            area_to_parent: self.area_to_parent,
        }
    }
}
