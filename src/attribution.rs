//! Fractional faculty attribution.
//!
//! Every faculty member carries one unit of credit for a year range. The unit
//! is split evenly across the distinct areas they published in during that
//! range, so a member seen in Machine learning and Security gives 0.5 to each.
//! An area's fractional faculty count is the sum of the shares it receives.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct Attribution<'a> {
    faculty_areas: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> Attribution<'a> {
    /// Inverts an area -> faculty mapping into faculty -> areas.
    pub fn from_area_faculty(area_faculty: &BTreeMap<&'a str, BTreeSet<&'a str>>) -> Self {
        let mut faculty_areas: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        for (&area, names) in area_faculty {
            for &name in names {
                faculty_areas.entry(name).or_default().insert(area);
            }
        }
        Self { faculty_areas }
    }

    pub fn faculty_count(&self) -> usize {
        self.faculty_areas.len()
    }

    pub fn areas_of(&self, name: &str) -> Option<&BTreeSet<&'a str>> {
        self.faculty_areas.get(name)
    }

    /// The share one faculty member gives to each of their areas.
    pub fn share_of(&self, name: &str) -> Option<f64> {
        self.faculty_areas
            .get(name)
            .map(|areas| 1.0 / areas.len() as f64)
    }

    /// Sum of shares received per area. Areas with no faculty are absent.
    pub fn credit_by_area(&self) -> BTreeMap<&'a str, f64> {
        let mut credit: BTreeMap<&'a str, f64> = BTreeMap::new();
        for areas in self.faculty_areas.values() {
            let share = 1.0 / areas.len() as f64;
            for &area in areas {
                *credit.entry(area).or_insert(0.0) += share;
            }
        }
        credit
    }
}

/// Shorthand for `Attribution::from_area_faculty(..).credit_by_area()`.
pub fn fractional_faculty<'a>(area_faculty: &BTreeMap<&'a str, BTreeSet<&'a str>>) -> BTreeMap<&'a str, f64> {
    Attribution::from_area_faculty(area_faculty).credit_by_area()
}
