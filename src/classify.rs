//! Venue -> area classification.
//!
//! Fragments are tried in taxonomy order and the first one contained in the
//! venue string wins. This is neither longest-match nor all-matches: with
//! fragments `["ICML", "ICML Workshop"]` the venue "ICML Workshop 2020"
//! classifies under the area of "ICML". Reordering the taxonomy file changes
//! results.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::taxonomy::AreaTaxonomy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "case-sensitive" | "sensitive" => Ok(MatchPolicy::CaseSensitive),
            "case-insensitive" | "insensitive" => Ok(MatchPolicy::CaseInsensitive),
            _ => Err(format!(
                "Invalid match policy: '{}'. Must be 'case-sensitive' or 'case-insensitive'",
                s
            )),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::CaseSensitive => f.write_str("case-sensitive"),
            MatchPolicy::CaseInsensitive => f.write_str("case-insensitive"),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    area: String,
}

#[derive(Debug, Clone)]
pub struct AreaClassifier {
    rules: Vec<Rule>,
    policy: MatchPolicy,
}

impl AreaClassifier {
    pub fn new(taxonomy: &AreaTaxonomy, policy: MatchPolicy) -> Self {
        let rules = taxonomy
            .fragments()
            .iter()
            .map(|f| Rule {
                needle: match policy {
                    MatchPolicy::CaseSensitive => f.fragment.clone(),
                    MatchPolicy::CaseInsensitive => f.fragment.to_lowercase(),
                },
                area: f.area.clone(),
            })
            .collect();
        Self { rules, policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Area of the first fragment contained in `venue`, if any.
    pub fn classify(&self, venue: &str) -> Option<&str> {
        match self.policy {
            MatchPolicy::CaseSensitive => self.first_match(venue),
            MatchPolicy::CaseInsensitive => self.first_match(&venue.to_lowercase()),
        }
    }

    #[inline]
    fn first_match(&self, haystack: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| haystack.contains(rule.needle.as_str()))
            .map(|rule| rule.area.as_str())
    }
}
