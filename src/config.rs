//! Run settings: defaults, optionally replaced field by field from a JSON
//! file, then overridden by command-line flags in the binary.
//!
//! ```json
//! {
//!   "dblp_path": "/data/dblp-2024-03.xml.gz",
//!   "match_policy": "case-insensitive",
//!   "threads": 8
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde::Deserialize;

use crate::{
    classify::MatchPolicy,
    engine::EngineOptions,
    error::{IclrError, Result},
    metrics::BASELINE_AREA,
};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub faculty_path: PathBuf,
    pub taxonomy_path: PathBuf,
    pub dblp_path: PathBuf,
    pub baseline_area: String,
    pub match_policy: MatchPolicy,
    /// Worker threads for per-year computations; 0 picks one per core.
    pub threads: usize,
    pub show_progress: bool,
    pub progress_interval: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            faculty_path: PathBuf::from("data/csrankings_march.csv"),
            taxonomy_path: PathBuf::from("data/area.csv"),
            dblp_path: PathBuf::from("data/dblp.xml.gz"),
            baseline_area: BASELINE_AREA.to_string(),
            match_policy: MatchPolicy::default(),
            threads: 0,
            show_progress: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl Settings {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| IclrError::io(path, e))?;
        Self::from_json_str(&content)
            .map_err(|e| IclrError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baseline_area.trim().is_empty() {
            return Err(IclrError::Config("baseline_area must not be blank".to_string()));
        }
        if self.progress_interval == 0 {
            return Err(IclrError::Config("progress_interval must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            baseline_area: self.baseline_area.clone(),
            match_policy: self.match_policy,
            show_progress: self.show_progress,
            progress_interval: self.progress_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_data_dir() {
        let settings = Settings::default();
        assert_eq!(settings.dblp_path, PathBuf::from("data/dblp.xml.gz"));
        assert_eq!(settings.baseline_area, "Machine learning");
        assert_eq!(settings.match_policy, MatchPolicy::CaseSensitive);
        assert_eq!(settings.progress_interval, 100_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let settings = Settings::from_json_str(
            r#"{"dblp_path": "/tmp/dump.xml", "match_policy": "case-insensitive", "threads": 3}"#,
        )
        .unwrap();
        assert_eq!(settings.dblp_path, PathBuf::from("/tmp/dump.xml"));
        assert_eq!(settings.match_policy, MatchPolicy::CaseInsensitive);
        assert_eq!(settings.effective_threads(), 3);
        assert_eq!(settings.faculty_path, PathBuf::from("data/csrankings_march.csv"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_json_str(r#"{"dblp": "x"}"#).is_err());
    }

    #[test]
    fn bad_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Settings::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, IclrError::Config(_)));

        let err = Settings::from_json_file("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(err, IclrError::Io { .. }));
    }

    #[test]
    fn validation_rejects_blank_baseline_and_zero_interval() {
        let settings = Settings {
            baseline_area: "  ".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            progress_interval: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn engine_options_mirror_settings() {
        let settings = Settings {
            baseline_area: "Security".to_string(),
            show_progress: false,
            ..Settings::default()
        };
        let options = settings.engine_options();
        assert_eq!(options.baseline_area, "Security");
        assert!(!options.show_progress);
        assert_eq!(options.progress_interval, DEFAULT_PROGRESS_INTERVAL);
    }
}
