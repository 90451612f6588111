//! Faculty roster loading.
//!
//! The roster is a CSV file with a header line; the first field of every row
//! is a faculty name. Names are matched exactly (case-sensitive) against DBLP
//! author names. Rosters copied out of DBLP pages sometimes keep its named
//! entities (`J&uuml;rgen`); those are decoded the same way the dump is.

use std::{
    collections::HashSet,
    fs::File,
    io::Read,
    path::Path,
};

use log::{info, warn};

use crate::{
    dblp::unescape_text,
    error::{IclrError, Result},
};

#[derive(Debug, Clone, Default)]
pub struct FacultyRegistry {
    names: HashSet<String>,
}

impl FacultyRegistry {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IclrError::io(path, e))?;
        let registry = Self::from_reader(file, path)?;
        info!("Loaded {} faculty names from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Reads a roster from any reader; `origin` is only used in error messages.
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

        let mut names = HashSet::new();
        let mut rows = 0u64;
        for result in csv_reader.records() {
            let record = result.map_err(|e| IclrError::from_csv(origin, e))?;
            let line = record.position().map(|pos| pos.line()).unwrap_or(0);
            match record.get(0) {
                Some(name) if !name.is_empty() => {
                    names.insert(unescape_text(name).into_owned());
                }
                _ => {
                    return Err(IclrError::data_format(origin, line, "row has no faculty name"));
                }
            }
            rows += 1;
        }

        if names.is_empty() {
            warn!("Faculty roster {} has a header but no rows", origin.display());
        } else if (names.len() as u64) < rows {
            info!(
                "Faculty roster {} lists {} rows for {} distinct names",
                origin.display(),
                rows,
                names.len()
            );
        }

        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
