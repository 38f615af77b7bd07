//! Curated report projection.
//!
//! A projection always carries the `info` and `target` sections, plus every
//! location named by the inclusion list. Dotted locations are rebuilt as
//! nested mappings; sibling locations share the intermediate levels.

use crate::inclusion::{InclusionSpec, ItemPath};
use crate::value::{AnalysisReport, ReportMap, ReportValue};
use cuckoo_dxl_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Report section that is always copied.
pub const INFO_KEY: &str = "info";
/// Report section that is always copied.
pub const TARGET_KEY: &str = "target";

/// What to do with an inclusion item that does not exist in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Log a warning and leave the projection untouched.
    #[default]
    Skip,
    /// Insert an empty mapping at the requested location.
    InsertEmpty,
}

impl fmt::Display for NotFoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundPolicy::Skip => write!(f, "skip"),
            NotFoundPolicy::InsertEmpty => write!(f, "insert_empty"),
        }
    }
}

impl FromStr for NotFoundPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(NotFoundPolicy::Skip),
            "insert_empty" | "insert-empty" => Ok(NotFoundPolicy::InsertEmpty),
            _ => Err(Error::Configuration(format!(
                "unknown not_found_policy '{}' (expected skip or insert_empty)",
                s
            ))),
        }
    }
}

/// The curated subset of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProjectedReport(ReportMap);

impl ProjectedReport {
    /// Top-level entry by name.
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.0.get(key)
    }

    /// Top-level keys, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Builds projections under a fixed not-found policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Projector {
    policy: NotFoundPolicy,
}

impl Projector {
    /// Projector applying `policy` to items missing from the report.
    pub fn new(policy: NotFoundPolicy) -> Self {
        Self { policy }
    }

    /// Project `report` through the raw inclusion setting.
    ///
    /// `None` yields only `info` and `target`. The report is never modified;
    /// copied values are cloned into the result.
    pub fn project(&self, report: &AnalysisReport, inclusion: Option<&str>) -> ProjectedReport {
        let mut result = ReportMap::new();
        result.insert(INFO_KEY.to_string(), section_or_empty(report, INFO_KEY));
        result.insert(TARGET_KEY.to_string(), section_or_empty(report, TARGET_KEY));

        let Some(raw) = inclusion else {
            return ProjectedReport(result);
        };

        let parsed = InclusionSpec::parse(raw);
        for item in parsed.items() {
            self.apply(report, item, &mut result);
        }

        ProjectedReport(result)
    }

    fn apply(&self, report: &AnalysisReport, item: &ItemPath, result: &mut ReportMap) {
        let value = match report.lookup(item.segments()) {
            Some(value) => value.clone(),
            None => match self.policy {
                NotFoundPolicy::Skip => {
                    warn!("{} is not found in the analysis report", item);
                    return;
                }
                NotFoundPolicy::InsertEmpty => {
                    debug!("{} is not found, inserting an empty mapping", item);
                    ReportValue::empty_map()
                }
            },
        };

        insert_at(result, item, value);
    }
}

/// Project with the default policy (skip items that are not found).
pub fn project(report: &AnalysisReport, inclusion: Option<&str>) -> ProjectedReport {
    Projector::default().project(report, inclusion)
}

fn section_or_empty(report: &AnalysisReport, key: &str) -> ReportValue {
    report
        .get(key)
        .cloned()
        .unwrap_or_else(ReportValue::empty_map)
}

/// Set `value` at `item` inside `result`, creating missing intermediate
/// mappings. An existing non-mapping intermediate is left alone and the item
/// is dropped.
fn insert_at(result: &mut ReportMap, item: &ItemPath, value: ReportValue) {
    let Some((leaf, parents)) = item.segments().split_last() else {
        return;
    };

    let mut level = result;
    for key in parents {
        let node = level
            .entry(key.clone())
            .or_insert_with(ReportValue::empty_map);
        level = match node {
            ReportValue::Map(map) => map,
            other => {
                warn!(
                    "Cannot add {}: '{}' is already a {} in the projected report",
                    item,
                    key,
                    other.kind()
                );
                return;
            }
        };
    }

    level.insert(leaf.clone(), value);
}
