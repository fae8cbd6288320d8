//! Production share constraints
//!
//! Per-year, per-category bounds on the share the producer may assign to a
//! market category:
//!
//! - **minimum / maximum**: production capability limits
//! - **required minimum**: a policy mandate floor (e.g. a required ZEV share),
//!   clamped into `[minimum, maximum]`
//!
//! Categories are identified by their full category path (`hauling.BEV`).
//! A minimum above its maximum is a configuration error and is reported, not
//! clamped away.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Tolerance for share sums and bound comparisons
pub const SHARE_TOLERANCE: f64 = 1e-9;

/// Errors in share constraint configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConstraintError {
    #[error("Category {category} in {calendar_year}: minimum share {minimum} exceeds maximum share {maximum}")]
    MinimumExceedsMaximum {
        category: String,
        calendar_year: i32,
        minimum: f64,
        maximum: f64,
    },

    #[error("Category {category} in {calendar_year}: share bound {value} outside [0, 1]")]
    OutOfRange {
        category: String,
        calendar_year: i32,
        value: f64,
    },

    #[error("Sibling categories {categories:?}: minimum shares sum to {sum} (> 1)")]
    MinimumsTooLarge { categories: Vec<String>, sum: f64 },

    #[error("Sibling categories {categories:?}: maximum shares sum to {sum} (< 1)")]
    MaximumsTooSmall { categories: Vec<String>, sum: f64 },
}

/// Share constraint source queried by the sweep generator
pub trait ProductionConstraints {
    /// Production minimum share of a category
    fn minimum_share(&self, calendar_year: i32, category: &str) -> f64;

    /// Production maximum share of a category
    fn maximum_share(&self, calendar_year: i32, category: &str) -> f64;

    /// Policy-mandated minimum share of a category
    fn required_minimum_share(&self, calendar_year: i32, category: &str) -> f64;
}

/// Resolved bounds for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShareBounds {
    pub min: f64,
    pub max: f64,
}

impl ShareBounds {
    pub const UNBOUNDED: ShareBounds = ShareBounds { min: 0.0, max: 1.0 };

    /// Whether a share lies within the bounds, with tolerance
    pub fn contains(&self, share: f64) -> bool {
        share >= self.min - SHARE_TOLERANCE && share <= self.max + SHARE_TOLERANCE
    }

    /// Clamp a share into the bounds
    pub fn clamp(&self, share: f64) -> f64 {
        share.clamp(self.min, self.max)
    }
}

/// Resolve the bounds of sibling categories for one year
///
/// The effective minimum is the larger of the production minimum and the
/// required minimum, capped at the production maximum.
///
/// # Errors
///
/// Fails when a production minimum exceeds its maximum, when a bound lies
/// outside `[0, 1]`, or when the siblings' bounds cannot be met by any share
/// vector summing to 1.
pub fn resolve_bounds(
    constraints: &dyn ProductionConstraints,
    calendar_year: i32,
    categories: &[String],
) -> Result<BTreeMap<String, ShareBounds>, ConstraintError> {
    let mut bounds = BTreeMap::new();

    for category in categories {
        let production_min = constraints.minimum_share(calendar_year, category);
        let production_max = constraints.maximum_share(calendar_year, category);
        let required = constraints.required_minimum_share(calendar_year, category);

        for value in [production_min, production_max, required] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConstraintError::OutOfRange {
                    category: category.clone(),
                    calendar_year,
                    value,
                });
            }
        }

        if production_min > production_max + SHARE_TOLERANCE {
            return Err(ConstraintError::MinimumExceedsMaximum {
                category: category.clone(),
                calendar_year,
                minimum: production_min,
                maximum: production_max,
            });
        }

        let min = production_max.min(required.max(production_min));
        bounds.insert(
            category.clone(),
            ShareBounds {
                min,
                max: production_max,
            },
        );
    }

    let min_sum: f64 = bounds.values().map(|b| b.min).sum();
    if min_sum > 1.0 + SHARE_TOLERANCE {
        return Err(ConstraintError::MinimumsTooLarge {
            categories: categories.to_vec(),
            sum: min_sum,
        });
    }
    let max_sum: f64 = bounds.values().map(|b| b.max).sum();
    if max_sum < 1.0 - SHARE_TOLERANCE {
        return Err(ConstraintError::MaximumsTooSmall {
            categories: categories.to_vec(),
            sum: max_sum,
        });
    }

    Ok(bounds)
}

/// One row of a share constraint table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConstraintEntry {
    /// Category path
    pub category: String,

    /// First calendar year the row applies to
    pub start_year: i32,

    #[serde(default)]
    pub minimum_share: Option<f64>,

    #[serde(default)]
    pub maximum_share: Option<f64>,

    #[serde(default)]
    pub required_minimum_share: Option<f64>,
}

/// Table-backed constraints
///
/// A year resolves to the row with the greatest `start_year` not after it.
/// Categories without rows are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ShareConstraintEntry>", into = "Vec<ShareConstraintEntry>")]
pub struct ShareConstraintTable {
    entries: BTreeMap<String, Vec<ShareConstraintEntry>>,
}

impl ShareConstraintTable {
    pub fn new(entries: Vec<ShareConstraintEntry>) -> Self {
        let mut by_category: BTreeMap<String, Vec<ShareConstraintEntry>> = BTreeMap::new();
        for entry in entries {
            by_category.entry(entry.category.clone()).or_default().push(entry);
        }
        for rows in by_category.values_mut() {
            rows.sort_by_key(|r| r.start_year);
        }
        Self {
            entries: by_category,
        }
    }

    fn lookup(&self, calendar_year: i32, category: &str) -> Option<&ShareConstraintEntry> {
        self.entries
            .get(category)?
            .iter()
            .rev()
            .find(|r| r.start_year <= calendar_year)
    }
}

impl From<Vec<ShareConstraintEntry>> for ShareConstraintTable {
    fn from(entries: Vec<ShareConstraintEntry>) -> Self {
        ShareConstraintTable::new(entries)
    }
}

impl From<ShareConstraintTable> for Vec<ShareConstraintEntry> {
    fn from(table: ShareConstraintTable) -> Self {
        table.entries.into_values().flatten().collect()
    }
}

impl ProductionConstraints for ShareConstraintTable {
    fn minimum_share(&self, calendar_year: i32, category: &str) -> f64 {
        self.lookup(calendar_year, category)
            .and_then(|r| r.minimum_share)
            .unwrap_or(0.0)
    }

    fn maximum_share(&self, calendar_year: i32, category: &str) -> f64 {
        self.lookup(calendar_year, category)
            .and_then(|r| r.maximum_share)
            .unwrap_or(1.0)
    }

    fn required_minimum_share(&self, calendar_year: i32, category: &str) -> f64 {
        self.lookup(calendar_year, category)
            .and_then(|r| r.required_minimum_share)
            .unwrap_or(0.0)
    }
}
