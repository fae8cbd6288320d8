//! Composite vehicle construction
//!
//! Carries a manufacturer's prior-year vehicles into the search year, gives
//! each its compliance factors and projected sales, groups them by market
//! class and regulatory class into composite vehicles, and places the
//! composites in the market class tree.
//!
//! # Sales projection
//!
//! When the context projects sales for every context size class the
//! manufacturer's vehicles belong to, each size class's sales are spread over
//! its vehicles by base-year share and the context-based total is their sum.
//! Otherwise the baseline total is spread over all vehicles by base-year
//! share.
//!
//! # Caching
//!
//! Construction is memoized per (compliance id, calendar year) in a
//! `CompositeVehicleCache` owned by the caller. Cached composites are never
//! mutated; decisions are applied to snapshots.

use crate::models::composite::{CompositeVehicle, CompositeVehicleError};
use crate::models::market_class::{MarketClassConfig, MarketClassTree};
use crate::models::vehicle::Vehicle;
use crate::policy::context::MarketContext;
use crate::policy::targets::ComplianceTargets;
use crate::search::engine::SearchError;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

/// Source of a manufacturer's finalized vehicles
pub trait VehicleSource {
    /// Finalized vehicles of one model year
    fn prior_vehicles(&self, compliance_id: &str, model_year: i32) -> Vec<Vehicle>;
}

/// In-memory vehicle source
impl VehicleSource for Vec<Vehicle> {
    fn prior_vehicles(&self, compliance_id: &str, model_year: i32) -> Vec<Vehicle> {
        self.iter()
            .filter(|v| v.compliance_id == compliance_id && v.model_year == model_year)
            .cloned()
            .collect()
    }
}

/// Composites of one manufacturer and year
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltComposites {
    pub market_class_tree: MarketClassTree,

    /// Projected total sales from the context
    pub context_based_total_sales: f64,
}

impl BuiltComposites {
    /// Composite vehicles in tree order
    pub fn composite_vehicles(&self) -> Vec<&CompositeVehicle> {
        self.market_class_tree.composite_vehicles()
    }
}

/// Memoized composites keyed by compliance id and calendar year
#[derive(Debug, Default)]
pub struct CompositeVehicleCache {
    entries: BTreeMap<(String, i32), BuiltComposites>,
}

impl CompositeVehicleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry; call at the start of a new analysis run
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, compliance_id: &str, calendar_year: i32) -> bool {
        self.entries
            .contains_key(&(compliance_id.to_string(), calendar_year))
    }

    /// Cached entry, building it on first use
    pub fn get_or_build(
        &mut self,
        compliance_id: &str,
        calendar_year: i32,
        build: impl FnOnce() -> Result<BuiltComposites, SearchError>,
    ) -> Result<&BuiltComposites, SearchError> {
        match self.entries.entry((compliance_id.to_string(), calendar_year)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(build()?)),
        }
    }
}

/// Builds composite vehicles from prior-year source vehicles
pub struct CompositeVehicleBuilder<'a> {
    market_classes: &'a MarketClassConfig,
    source: &'a dyn VehicleSource,
    context: &'a dyn MarketContext,
    targets: &'a dyn ComplianceTargets,
}

impl<'a> CompositeVehicleBuilder<'a> {
    pub fn new(
        market_classes: &'a MarketClassConfig,
        source: &'a dyn VehicleSource,
        context: &'a dyn MarketContext,
        targets: &'a dyn ComplianceTargets,
    ) -> Self {
        Self {
            market_classes,
            source,
            context,
            targets,
        }
    }

    /// Build the composites for one manufacturer and year
    pub fn build(&self, compliance_id: &str, calendar_year: i32) -> Result<BuiltComposites, SearchError> {
        let mut vehicles: Vec<Vehicle> = self
            .source
            .prior_vehicles(compliance_id, calendar_year - 1)
            .iter()
            .map(|v| v.carry_forward(calendar_year))
            .collect();
        if vehicles.is_empty() {
            return Err(SearchError::NoSourceVehicles {
                compliance_id: compliance_id.to_string(),
                calendar_year,
            });
        }

        for v in vehicles.iter_mut() {
            if !self.market_classes.market_classes.contains(&v.market_class_id) {
                return Err(SearchError::UnknownMarketClass(v.market_class_id.clone()));
            }
            if !self.market_classes.reg_classes.contains(&v.reg_class_id) {
                return Err(SearchError::UnknownRegClass(v.reg_class_id.clone()));
            }
            v.normalized_cert_co2e_mg = self.targets.normalized_cert_co2e_mg(v)?;
            v.normalized_target_co2e_mg = self.targets.normalized_target_co2e_mg(v)?;
        }

        normalize_base_shares(&mut vehicles);
        let total_sales = self.project_sales(compliance_id, calendar_year, &mut vehicles);
        if total_sales > 0.0 {
            for v in vehicles.iter_mut() {
                v.base_year_market_share = v.initial_registered_count / total_sales;
            }
        }

        let mut tree = self.market_classes.empty_tree()?;
        let mut composites = 0;
        for mc in &self.market_classes.market_classes {
            let mut group: Vec<CompositeVehicle> = Vec::new();
            for rc in &self.market_classes.reg_classes {
                let members: Vec<Vehicle> = vehicles
                    .iter()
                    .filter(|v| &v.market_class_id == mc && &v.reg_class_id == rc)
                    .cloned()
                    .collect();
                if !members.is_empty() {
                    group.push(CompositeVehicle::new(members)?);
                }
            }

            let mc_sales: f64 = group.iter().map(|cv| cv.initial_registered_count).sum();
            let n = group.len() as f64;
            for mut cv in group {
                cv.composite_vehicle_share_frac = if mc_sales > 0.0 {
                    cv.initial_registered_count / mc_sales
                } else {
                    1.0 / n
                };
                tree.populate(cv)?;
                composites += 1;
            }
        }

        debug!(
            compliance_id,
            calendar_year,
            source_vehicles = vehicles.len(),
            composites,
            total_sales,
            "built composite vehicles"
        );

        Ok(BuiltComposites {
            market_class_tree: tree,
            context_based_total_sales: total_sales,
        })
    }

    /// Assign projected sales to each vehicle, returning the total
    ///
    /// With complete size-class projections each class's sales are split
    /// across its vehicles by renormalized base-year market share. This
    /// differs from weighting by the manufacturer's base-year share of each
    /// size class; the two agree when a manufacturer's vehicles in a size
    /// class carry shares proportional to that class's base-year sales.
    fn project_sales(&self, compliance_id: &str, calendar_year: i32, vehicles: &mut [Vehicle]) -> f64 {
        let mut by_size_class: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut all_sized = true;
        for (i, v) in vehicles.iter().enumerate() {
            match &v.context_size_class {
                Some(csc) => by_size_class.entry(csc.clone()).or_default().push(i),
                None => all_sized = false,
            }
        }

        let size_class_sales: Option<BTreeMap<String, f64>> = if all_sized {
            by_size_class
                .keys()
                .map(|csc| {
                    self.context
                        .size_class_sales(calendar_year, compliance_id, csc)
                        .map(|s| (csc.clone(), s))
                })
                .collect()
        } else {
            None
        };

        match size_class_sales {
            Some(sales) => {
                for (csc, members) in &by_size_class {
                    let projected = sales.get(csc).copied().unwrap_or(0.0);
                    distribute(vehicles, members, projected);
                }
                sales.values().sum()
            }
            None => {
                let total = self.context.baseline_total_sales(calendar_year, compliance_id);
                let all: Vec<usize> = (0..vehicles.len()).collect();
                distribute(vehicles, &all, total);
                total
            }
        }
    }
}

/// Rescale base-year shares to sum to 1
fn normalize_base_shares(vehicles: &mut [Vehicle]) {
    let total: f64 = vehicles.iter().map(|v| v.base_year_market_share.max(0.0)).sum();
    let n = vehicles.len() as f64;
    for v in vehicles.iter_mut() {
        v.base_year_market_share = if total > 0.0 {
            v.base_year_market_share.max(0.0) / total
        } else {
            1.0 / n
        };
    }
}

/// Spread `total` over `members` by base-year share
fn distribute(vehicles: &mut [Vehicle], members: &[usize], total: f64) {
    let weight: f64 = members.iter().map(|&i| vehicles[i].base_year_market_share).sum();
    for &i in members {
        vehicles[i].initial_registered_count = if weight > 0.0 {
            total * vehicles[i].base_year_market_share / weight
        } else {
            total / members.len() as f64
        };
    }
}

impl From<CompositeVehicleError> for SearchError {
    fn from(err: CompositeVehicleError) -> Self {
        match err {
            CompositeVehicleError::CostCurve(e) => SearchError::CostCurve(e),
            other => SearchError::InvalidConfig(other.to_string()),
        }
    }
}
