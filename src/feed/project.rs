use crate::feed::extract::{derive_station, extract_marker, IDENTIFIER_MARKER};
use crate::feed::parser::RawFeedEntry;
use serde::{Deserialize, Serialize};

/// Smallest number of items a source may be configured to keep.
pub const MIN_ITEM_COUNT: u8 = 1;
/// Largest number of items a source may be configured to keep.
pub const MAX_ITEM_COUNT: u8 = 20;
/// Item count used when none is configured.
pub const DEFAULT_ITEM_COUNT: u8 = 5;

/// Clamps a requested item count into `MIN_ITEM_COUNT..=MAX_ITEM_COUNT`.
pub fn clamp_item_count(count: i64) -> u8 {
    count.clamp(i64::from(MIN_ITEM_COUNT), i64::from(MAX_ITEM_COUNT)) as u8
}

/// Which entries to keep and how many.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Keep entries whose link or summary contains this text.
    pub identifier: Option<String>,
    /// Keep entries whose derived station contains this text.
    pub station: Option<String>,
    max_items: u8,
}

impl FilterCriteria {
    /// Criteria that only caps the number of items.
    pub fn limit(max_items: u8) -> Self {
        Self {
            identifier: None,
            station: None,
            max_items: clamp_item_count(i64::from(max_items)),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = non_blank(identifier.into());
        self
    }

    pub fn with_station(mut self, station: impl Into<String>) -> Self {
        self.station = non_blank(station.into());
        self
    }

    pub fn max_items(&self) -> u8 {
        self.max_items
    }

    fn matches(&self, entry: &RawFeedEntry) -> bool {
        if let Some(identifier) = &self.identifier {
            if !mentions(entry, identifier) {
                return false;
            }
        }
        if let Some(station) = &self.station {
            let derived = derive_station(
                entry.link.as_deref(),
                entry.summary.as_deref(),
                entry.title.as_deref(),
            );
            if !derived.is_some_and(|s| s.contains(station.as_str())) {
                return false;
            }
        }
        true
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Case-sensitive containment in the link or summary.
fn mentions(entry: &RawFeedEntry, needle: &str) -> bool {
    entry.link.as_deref().is_some_and(|l| l.contains(needle))
        || entry.summary.as_deref().is_some_and(|s| s.contains(needle))
}

/// An entry as published in the sensor snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedEntry {
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
    pub link: Option<String>,
}

impl From<&RawFeedEntry> for ProjectedEntry {
    fn from(entry: &RawFeedEntry) -> Self {
        Self {
            title: entry.title.clone(),
            description: entry.description.clone().or_else(|| entry.summary.clone()),
            summary: entry.summary.clone(),
            published: entry.published.clone(),
            link: entry.link.clone(),
        }
    }
}

/// Filters and shapes entries, keeping feed order and at most
/// `criteria.max_items()` of them.
pub fn project(entries: &[RawFeedEntry], criteria: &FilterCriteria) -> Vec<ProjectedEntry> {
    entries
        .iter()
        .filter(|entry| criteria.matches(entry))
        .take(usize::from(criteria.max_items()))
        .map(ProjectedEntry::from)
        .collect()
}

/// Distinct alarm group identifiers in first-seen order.
///
/// Both the link and the summary are inspected, so one entry may contribute
/// two values.
pub fn distinct_identifiers(entries: &[RawFeedEntry]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for entry in entries {
        for field in [entry.link.as_deref(), entry.summary.as_deref()].into_iter().flatten() {
            if let Some(id) = extract_marker(field, IDENTIFIER_MARKER) {
                push_unique(&mut seen, id);
            }
        }
    }
    seen
}

/// Distinct station names in first-seen order, optionally restricted to
/// entries mentioning `identifier`.
pub fn distinct_stations(entries: &[RawFeedEntry], identifier: Option<&str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for entry in entries {
        if let Some(id) = identifier.filter(|id| !id.is_empty()) {
            if !mentions(entry, id) {
                continue;
            }
        }
        let station = derive_station(
            entry.link.as_deref(),
            entry.summary.as_deref(),
            entry.title.as_deref(),
        );
        if let Some(station) = station {
            push_unique(&mut seen, &station);
        }
    }
    seen
}

fn push_unique(seen: &mut Vec<String>, value: &str) {
    if !seen.iter().any(|v| v == value) {
        seen.push(value.to_string());
    }
}
