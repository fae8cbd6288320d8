//! Baseline market context
//!
//! Projected sales and fixed category shares supplied by the analysis
//! context. Non-responsive categories take their share straight from here,
//! and the context total is the sales figure used until a consumer response
//! provides one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baseline context queried by the composite builder and the sweep generator
pub trait MarketContext {
    /// Projected total sales for a manufacturer
    fn baseline_total_sales(&self, calendar_year: i32, compliance_id: &str) -> f64;

    /// Fixed share of a category relative to its parent category
    fn baseline_category_share(&self, calendar_year: i32, category: &str) -> Option<f64>;

    /// Projected manufacturer sales in one context size class, when known
    fn size_class_sales(&self, calendar_year: i32, compliance_id: &str, size_class: &str) -> Option<f64>;
}

/// Category share row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShareEntry {
    /// Category path
    pub category: String,
    pub start_year: i32,
    pub share: f64,
}

/// Sales projection row, either a manufacturer total or one size class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesEntry {
    pub compliance_id: String,
    pub calendar_year: i32,

    /// Context size class; `None` for the manufacturer total
    #[serde(default)]
    pub size_class: Option<String>,

    pub sales: f64,
}

/// Table-backed market context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContextTable {
    #[serde(default)]
    pub category_shares: Vec<CategoryShareEntry>,

    #[serde(default)]
    pub sales: Vec<SalesEntry>,
}

impl MarketContextTable {
    /// Index sales rows by (compliance id, year, size class)
    fn sales_lookup(&self, calendar_year: i32, compliance_id: &str, size_class: Option<&str>) -> Option<f64> {
        self.sales
            .iter()
            .find(|e| {
                e.calendar_year == calendar_year
                    && e.compliance_id == compliance_id
                    && e.size_class.as_deref() == size_class
            })
            .map(|e| e.sales)
    }

    /// Size-class projections for one manufacturer and year
    pub fn size_class_projections(&self, calendar_year: i32, compliance_id: &str) -> BTreeMap<String, f64> {
        self.sales
            .iter()
            .filter(|e| e.calendar_year == calendar_year && e.compliance_id == compliance_id)
            .filter_map(|e| e.size_class.clone().map(|csc| (csc, e.sales)))
            .collect()
    }
}

impl MarketContext for MarketContextTable {
    /// Total row when present, otherwise the sum of size-class rows
    fn baseline_total_sales(&self, calendar_year: i32, compliance_id: &str) -> f64 {
        self.sales_lookup(calendar_year, compliance_id, None)
            .unwrap_or_else(|| {
                self.size_class_projections(calendar_year, compliance_id)
                    .values()
                    .sum()
            })
    }

    fn baseline_category_share(&self, calendar_year: i32, category: &str) -> Option<f64> {
        self.category_shares
            .iter()
            .filter(|e| e.category == category && e.start_year <= calendar_year)
            .max_by_key(|e| e.start_year)
            .map(|e| e.share)
    }

    fn size_class_sales(&self, calendar_year: i32, compliance_id: &str, size_class: &str) -> Option<f64> {
        self.sales_lookup(calendar_year, compliance_id, Some(size_class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MarketContextTable {
        MarketContextTable {
            category_shares: vec![
                CategoryShareEntry {
                    category: "hauling".to_string(),
                    start_year: 2020,
                    share: 0.3,
                },
                CategoryShareEntry {
                    category: "hauling".to_string(),
                    start_year: 2025,
                    share: 0.35,
                },
            ],
            sales: vec![
                SalesEntry {
                    compliance_id: "OEM_A".to_string(),
                    calendar_year: 2021,
                    size_class: Some("Small Car".to_string()),
                    sales: 400.0,
                },
                SalesEntry {
                    compliance_id: "OEM_A".to_string(),
                    calendar_year: 2021,
                    size_class: Some("Pickup".to_string()),
                    sales: 600.0,
                },
            ],
        }
    }

    #[test]
    fn test_category_share_steps_by_start_year() {
        let ctx = table();
        assert_eq!(ctx.baseline_category_share(2019, "hauling"), None);
        assert_eq!(ctx.baseline_category_share(2024, "hauling"), Some(0.3));
        assert_eq!(ctx.baseline_category_share(2030, "hauling"), Some(0.35));
    }

    #[test]
    fn test_total_falls_back_to_size_class_sum() {
        let ctx = table();
        assert_eq!(ctx.baseline_total_sales(2021, "OEM_A"), 1000.0);
        assert_eq!(ctx.size_class_sales(2021, "OEM_A", "Pickup"), Some(600.0));
        assert_eq!(ctx.baseline_total_sales(2021, "OEM_B"), 0.0);
    }
}
