//! Technology and share sweeps
//!
//! Walks the market class tree and builds the option table of one search
//! iteration:
//!
//! - **Leaves**: each composite vehicle gets a set of candidate emission
//!   levels, spanning its whole frontier on the first pass and a window
//!   around the prior winners' levels afterwards.
//! - **Interior nodes**: children's shares are searched when every child is a
//!   responsive category, taken from the baseline context otherwise, and
//!   inherited verbatim when a consumer response is supplied.
//!
//! Child tables are combined by cartesian product, then the node's share
//! table is multiplied in. Every product is checked against the row limit
//! before it is materialized.
//!
//! # Technology narrowing
//!
//! The tech window around a prior level has half-width
//! `level × convergence_factor^count`, where `count` is tracked per composite
//! vehicle by `TechNarrowing` and advanced according to a `NarrowingPolicy`.
//! Idle vehicles keep a coarse window while sold vehicles converge.

use crate::models::composite::CompositeVehicle;
use crate::models::cost_curve::VehicleCostModel;
use crate::models::market_class::{category_path, MarketClassConfig, MarketClassNode, MarketClassTree};
use crate::models::option::{CandidateDecision, ConsumerResponse, SweepRow, SweepTable, TechOption};
use crate::models::vehicle::FuelingClass;
use crate::policy::constraints::{resolve_bounds, ProductionConstraints};
use crate::policy::context::MarketContext;
use crate::search::engine::{SearchConfig, SearchError};
use crate::search::shares::{dedup_sorted, linspace, nearby_shares, partition, ShareVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// When a composite vehicle's tech window starts (and keeps) narrowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NarrowingPolicy {
    /// Narrow once the vehicle has sold in a prior winner, then keep narrowing
    #[default]
    SoldOrNarrowing,

    /// Narrow only while the vehicle sells in the prior winner
    SoldOnly,

    /// Narrow every vehicle on every pass
    Always,
}

impl NarrowingPolicy {
    fn advances(self, sold: bool, count: u32) -> bool {
        match self {
            NarrowingPolicy::SoldOrNarrowing => sold || count > 0,
            NarrowingPolicy::SoldOnly => sold,
            NarrowingPolicy::Always => true,
        }
    }
}

/// Per-vehicle tech narrowing counters, owned by one search loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechNarrowing {
    counts: BTreeMap<String, u32>,
}

impl TechNarrowing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for a composite vehicle
    pub fn count(&self, vehicle_id: &str) -> u32 {
        self.counts.get(vehicle_id).copied().unwrap_or(0)
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Record one prior candidate row for a vehicle, returning the new count
    pub fn observe(&mut self, vehicle_id: &str, sold: bool, policy: NarrowingPolicy) -> u32 {
        let count = self.counts.entry(vehicle_id.to_string()).or_insert(0);
        if policy.advances(sold, *count) {
            *count += 1;
        }
        *count
    }
}

/// Builds the option table of one search iteration
pub struct TechShareSweepGenerator<'a> {
    config: &'a SearchConfig,
    market_classes: &'a MarketClassConfig,
    constraints: &'a dyn ProductionConstraints,
    context: &'a dyn MarketContext,
}

/// Inputs that vary per search iteration
pub struct SweepRequest<'a> {
    pub calendar_year: i32,
    pub candidates: Option<&'a CandidateDecision>,
    pub share_range: f64,
    pub consumer_response: Option<&'a ConsumerResponse>,
}

impl<'a> TechShareSweepGenerator<'a> {
    pub fn new(
        config: &'a SearchConfig,
        market_classes: &'a MarketClassConfig,
        constraints: &'a dyn ProductionConstraints,
        context: &'a dyn MarketContext,
    ) -> Self {
        Self {
            config,
            market_classes,
            constraints,
            context,
        }
    }

    /// Generate the combined tech × share table for the whole tree
    ///
    /// Narrowing counters are reset when `share_range` is 1 (a fresh search).
    ///
    /// # Errors
    ///
    /// - `Constraint` when a category's bounds are inconsistent
    /// - `MissingShare` when a non-responsive category has no context share
    /// - `MissingVehicleColumn` when a prior candidate lacks a vehicle's level
    /// - `EmptyOptionTable` when a node yields no rows
    /// - `OptionTableTooLarge` when a product exceeds `max_option_rows`
    pub fn generate(
        &self,
        tree: &MarketClassTree,
        request: &SweepRequest<'_>,
        narrowing: &mut TechNarrowing,
    ) -> Result<SweepTable, SearchError> {
        if request.share_range >= 1.0 {
            narrowing.reset();
        }
        let table = self.node(tree.root(), "", request, narrowing)?;
        if table.is_empty() {
            return Err(SearchError::EmptyOptionTable {
                calendar_year: request.calendar_year,
            });
        }
        trace!(
            calendar_year = request.calendar_year,
            share_range = request.share_range,
            rows = table.len(),
            "sweep generated"
        );
        Ok(table)
    }

    fn node(
        &self,
        children: &BTreeMap<String, MarketClassNode>,
        parent_path: &str,
        request: &SweepRequest<'_>,
        narrowing: &mut TechNarrowing,
    ) -> Result<SweepTable, SearchError> {
        let limit = self.config.max_option_rows;
        let mut combined = SweepTable::unit();

        for (name, child) in children {
            match child {
                MarketClassNode::Interior(grandchildren) => {
                    let path = category_path(parent_path, name);
                    let table = self.node(grandchildren, &path, request, narrowing)?;
                    combined = combined.cartesian_product(&table, limit)?;
                }
                MarketClassNode::Leaf(vehicles) => {
                    for cv in vehicles {
                        let table = self.tech_options(cv, request, narrowing)?;
                        combined = combined.cartesian_product(&table, limit)?;
                    }
                }
            }
        }

        let names: Vec<&String> = children.keys().collect();
        let shares = self.share_options(&names, parent_path, request)?;
        if shares.is_empty() {
            return Err(SearchError::EmptyOptionTable {
                calendar_year: request.calendar_year,
            });
        }
        Ok(combined.cartesian_product(&shares, limit)?)
    }

    fn tech_options(
        &self,
        cv: &CompositeVehicle,
        request: &SweepRequest<'_>,
        narrowing: &mut TechNarrowing,
    ) -> Result<SweepTable, SearchError> {
        let count = match cv.fueling_class {
            FuelingClass::Ice => self.config.num_tech_options_per_ice_vehicle,
            FuelingClass::Bev => self.config.num_tech_options_per_bev_vehicle,
        };
        let (min_level, max_level) = cv.feasible_emission_range();

        let levels = match request.candidates {
            None => {
                if count == 1 {
                    vec![max_level]
                } else {
                    linspace(min_level, max_level, count)
                }
            }
            Some(candidates) => {
                let mut levels = Vec::new();
                for option in &candidates.options {
                    let sold = option.vehicle_sales(&cv.vehicle_id) > 0.0;
                    let n = narrowing.observe(&cv.vehicle_id, sold, self.config.narrowing_policy);
                    let window = self.config.convergence_factor.powi(n as i32);

                    let prior = option.vehicle_co2e_gpmi(&cv.vehicle_id).ok_or_else(|| {
                        SearchError::MissingVehicleColumn {
                            vehicle_id: cv.vehicle_id.clone(),
                        }
                    })?;
                    let lo = min_level.max(prior * (1.0 - window));
                    let hi = max_level.min(prior * (1.0 + window));
                    levels.extend(linspace(lo, hi, count));
                    levels.push(prior);
                }
                if count == 1 {
                    vec![max_level]
                } else {
                    dedup_sorted(levels)
                }
            }
        };

        let costs = cv.cost_at(&levels);
        let generalized_costs = cv.generalized_cost_at(&levels);
        let kwh = cv.energy_use_at(&levels);

        let rows = levels
            .iter()
            .enumerate()
            .map(|(i, &level)| {
                let mut row = SweepRow::default();
                row.tech.insert(
                    cv.vehicle_id.clone(),
                    TechOption {
                        co2e_gpmi: level,
                        kwh_pmi: kwh[i],
                        cost_dollars: costs[i],
                        generalized_cost_dollars: generalized_costs[i],
                    },
                );
                row
            })
            .collect();

        Ok(SweepTable::new(rows))
    }

    fn share_options(
        &self,
        names: &[&String],
        parent_path: &str,
        request: &SweepRequest<'_>,
    ) -> Result<SweepTable, SearchError> {
        let paths: Vec<String> = names.iter().map(|n| category_path(parent_path, n)).collect();

        if let Some(response) = request.consumer_response {
            let mut row = SweepRow::default();
            for path in &paths {
                if let Some(share) = response.abs_share(path) {
                    row.abs_shares.insert(path.clone(), share);
                }
            }
            return Ok(SweepTable::new(vec![row]));
        }

        let responsive = names.iter().all(|n| self.market_classes.is_responsive(n));
        if !responsive {
            let mut row = SweepRow::default();
            for path in &paths {
                let share = self
                    .context
                    .baseline_category_share(request.calendar_year, path)
                    .ok_or_else(|| SearchError::MissingShare {
                        category: path.clone(),
                    })?;
                row.shares.insert(path.clone(), share);
            }
            return Ok(SweepTable::new(vec![row]));
        }

        let bounds = resolve_bounds(self.constraints, request.calendar_year, &paths)?;
        let levels = self.config.num_market_share_options;

        let vectors = match request.candidates {
            Some(candidates) if request.share_range < 1.0 => {
                let mut seen = BTreeSet::new();
                let mut vectors = Vec::new();
                for option in &candidates.options {
                    let nearby = match prior_shares(&option.shares, &paths) {
                        Some(prior) => nearby_shares(&paths, &prior, request.share_range, levels, &bounds),
                        None => partition(&paths, levels, &bounds),
                    };
                    for v in nearby {
                        if seen.insert(share_key(&v)) {
                            vectors.push(v);
                        }
                    }
                }
                vectors
            }
            _ => partition(&paths, levels, &bounds),
        };

        let rows = vectors
            .into_iter()
            .map(|shares| SweepRow {
                shares,
                ..SweepRow::default()
            })
            .collect();
        Ok(SweepTable::new(rows))
    }
}

/// Prior shares restricted to `paths`, when every path is present
fn prior_shares(shares: &BTreeMap<String, f64>, paths: &[String]) -> Option<ShareVector> {
    paths
        .iter()
        .map(|p| shares.get(p).map(|v| (p.clone(), *v)))
        .collect()
}

fn share_key(v: &ShareVector) -> Vec<(String, u64)> {
    v.iter().map(|(k, s)| (k.clone(), s.to_bits())).collect()
}
