//! Production option tables
//!
//! The sweep generator produces a `SweepTable`: the cartesian product of
//! technology options (one emission level per composite vehicle) and share
//! options (one share per category edge). The evaluator turns each sweep row
//! into a `ProductionOption` carrying sales, cost and compliance outcomes.
//!
//! Rows have no identity across search iterations; only the winning rows'
//! values are carried forward, as a `CandidateDecision`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Cartesian product would exceed the configured row limit
#[derive(Debug, Error, PartialEq)]
#[error("Option table of {rows} rows exceeds limit of {limit}")]
pub struct TableTooLarge {
    pub rows: usize,
    pub limit: usize,
}

/// One technology choice for one composite vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechOption {
    /// Certification CO2e level (g/mi)
    pub co2e_gpmi: f64,

    /// Certification direct electric energy use (kWh/mi)
    pub kwh_pmi: f64,

    /// Manufacturer cost per vehicle (dollars)
    pub cost_dollars: f64,

    /// Generalized cost per vehicle (dollars)
    pub generalized_cost_dollars: f64,
}

/// One row of a tech/share sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    /// Technology choice by composite vehicle id
    pub tech: BTreeMap<String, TechOption>,

    /// Producer share by category path, relative to the parent category
    pub shares: BTreeMap<String, f64>,

    /// Absolute share by category path, inherited from a consumer response
    pub abs_shares: BTreeMap<String, f64>,
}

impl SweepRow {
    /// Union of two rows' columns
    pub fn merged(&self, other: &SweepRow) -> SweepRow {
        let mut row = self.clone();
        row.tech.extend(other.tech.iter().map(|(k, v)| (k.clone(), *v)));
        row.shares.extend(other.shares.iter().map(|(k, v)| (k.clone(), *v)));
        row.abs_shares
            .extend(other.abs_shares.iter().map(|(k, v)| (k.clone(), *v)));
        row
    }
}

/// Table of sweep rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepTable {
    rows: Vec<SweepRow>,
}

impl SweepTable {
    /// Table from rows
    pub fn new(rows: Vec<SweepRow>) -> Self {
        Self { rows }
    }

    /// Identity of the cartesian product: a single row with no columns
    pub fn unit() -> Self {
        Self {
            rows: vec![SweepRow::default()],
        }
    }

    pub fn rows(&self) -> &[SweepRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SweepRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row of `self` combined with every row of `other`
    ///
    /// Rows of `self` vary slowest. Fails before allocating when the product
    /// would exceed `limit` rows.
    pub fn cartesian_product(&self, other: &SweepTable, limit: usize) -> Result<SweepTable, TableTooLarge> {
        let rows = self.rows.len().saturating_mul(other.rows.len());
        if rows > limit {
            return Err(TableTooLarge { rows, limit });
        }

        let mut out = Vec::with_capacity(rows);
        for left in &self.rows {
            for right in &other.rows {
                out.push(left.merged(right));
            }
        }
        Ok(SweepTable { rows: out })
    }
}

/// Per-vehicle outcome of a production option
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleOutcome {
    pub sales: f64,
    pub total_cost_dollars: f64,
    pub total_generalized_cost_dollars: f64,
    pub cert_co2e_mg: f64,
    pub target_co2e_mg: f64,
}

/// An evaluated production option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionOption {
    /// Technology choice by composite vehicle id
    pub tech: BTreeMap<String, TechOption>,

    /// Producer share by category path, relative to the parent category
    pub shares: BTreeMap<String, f64>,

    /// Absolute share by category path, inherited from a consumer response
    pub abs_shares: BTreeMap<String, f64>,

    /// Absolute share of total sales by market class
    pub producer_abs_shares: BTreeMap<String, f64>,

    /// Sales and compliance outcome by composite vehicle id
    pub vehicles: BTreeMap<String, VehicleOutcome>,

    pub total_sales: f64,
    pub total_cost_dollars: f64,
    pub total_generalized_cost_dollars: f64,
    pub total_cert_co2e_mg: f64,
    pub total_target_co2e_mg: f64,

    /// Target minus cert (positive means over-compliance)
    pub total_credits_co2e_mg: f64,

    pub strategic_target_offset_mg: f64,

    /// (cert − offset) / max(1, target)
    pub strategic_compliance_ratio: f64,

    /// |1 − strategic_compliance_ratio|
    pub strategic_compliance_error: f64,

    pub share_range: f64,
    pub producer_search_iteration: usize,
    pub winner: bool,
}

impl ProductionOption {
    /// Credits after applying the strategic offset
    pub fn credits_with_offset(&self) -> f64 {
        self.total_credits_co2e_mg + self.strategic_target_offset_mg
    }

    /// Whether this option meets the offset target
    pub fn is_compliant(&self) -> bool {
        self.credits_with_offset() >= 0.0
    }

    /// Sales of a composite vehicle, zero when absent
    pub fn vehicle_sales(&self, vehicle_id: &str) -> f64 {
        self.vehicles.get(vehicle_id).map_or(0.0, |v| v.sales)
    }

    /// Chosen emission level of a composite vehicle
    pub fn vehicle_co2e_gpmi(&self, vehicle_id: &str) -> Option<f64> {
        self.tech.get(vehicle_id).map(|t| t.co2e_gpmi)
    }
}

/// Winning option(s) of one search iteration
///
/// Holds one row, or a compliant/non-compliant bracket of two rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub options: Vec<ProductionOption>,

    /// Whether any evaluated option met the target
    pub compliance_possible: bool,
}

impl CandidateDecision {
    /// Candidate with the smallest compliance error (first one on ties)
    pub fn best_by_error(&self) -> Option<&ProductionOption> {
        self.options.iter().fold(None, |best: Option<&ProductionOption>, o| match best {
            Some(b) if b.strategic_compliance_error <= o.strategic_compliance_error => Some(b),
            _ => Some(o),
        })
    }
}

/// Consumer reaction to a producer decision
///
/// When supplied to the search, category shares are inherited from it rather
/// than searched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerResponse {
    /// Consumer desired absolute share by category path
    #[serde(default)]
    pub consumer_abs_shares: BTreeMap<String, f64>,

    /// Producer's own prior absolute share by category path
    #[serde(default)]
    pub producer_abs_shares: BTreeMap<String, f64>,

    /// Total sales implied by the consumer response
    #[serde(default)]
    pub total_sales: Option<f64>,
}

impl ConsumerResponse {
    /// Response of a consumer that accepts the producer's shares unchanged
    pub fn accepting(decision: &ProductionOption) -> Self {
        Self {
            consumer_abs_shares: decision.producer_abs_shares.clone(),
            producer_abs_shares: decision.producer_abs_shares.clone(),
            total_sales: Some(decision.total_sales),
        }
    }

    /// Absolute share for a category path, consumer first
    pub fn abs_share(&self, path: &str) -> Option<f64> {
        self.consumer_abs_shares
            .get(path)
            .or_else(|| self.producer_abs_shares.get(path))
            .copied()
    }
}
