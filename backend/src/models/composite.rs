//! Composite vehicles
//!
//! A composite vehicle stands in for every source vehicle that shares one
//! market class and one regulatory class in a given year. The search only
//! ever sees composites; once a decision is chosen it is decomposed back onto
//! the source vehicles.
//!
//! # Frontier composition
//!
//! Each source frontier is parameterized by its normalized position
//! `t ∈ [0, 1]` between its minimum and maximum emission level. The composite
//! frontier at position `t` is the base-share-weighted average of the source
//! frontiers at the same `t`:
//!
//! ```text
//! level(t) = Σ wᵢ · levelᵢ(t)      cost(t) = Σ wᵢ · costᵢ(levelᵢ(t))
//! ```
//!
//! `level(t)` is linear in `t`, so decomposition inverts it exactly and every
//! source vehicle receives its own level at the same frontier position.
//!
//! # Critical Invariants
//!
//! 1. **Sales conservation**: after `decompose()`, source sales sum to the
//!    composite's sales
//! 2. **Weights**: source weights are non-negative and sum to 1

use crate::models::cost_curve::{CostCurve, CostCurveError, CostCurvePoint, VehicleCostModel};
use crate::models::vehicle::{FuelingClass, Vehicle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while composing vehicles
#[derive(Debug, Error, PartialEq)]
pub enum CompositeVehicleError {
    #[error("Composite vehicle {0} has no source vehicles")]
    Empty(String),

    #[error("Composite vehicle {composite_id} mixes classes: source {vehicle_id} is {market_class_id}/{reg_class_id}")]
    MixedClasses {
        composite_id: String,
        vehicle_id: String,
        market_class_id: String,
        reg_class_id: String,
    },

    #[error("Composite cost curve error: {0}")]
    CostCurve(#[from] CostCurveError),
}

/// Aggregate of source vehicles sharing a market class and regulatory class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeVehicle {
    /// Stable identifier: "{market_class_id}.{reg_class_id}"
    pub vehicle_id: String,

    pub market_class_id: String,

    pub reg_class_id: String,

    pub model_year: i32,

    pub fueling_class: FuelingClass,

    /// Source vehicles, in input order
    vehicles: Vec<Vehicle>,

    /// Normalized base-year share weight of each source vehicle
    weights: Vec<f64>,

    /// Composite frontier
    cost_curve: CostCurve,

    /// Share of this composite within its market class
    pub composite_vehicle_share_frac: f64,

    /// Cert CO2e Mg per unit sales per g/mi
    pub normalized_cert_co2e_mg: f64,

    /// Target CO2e Mg per unit sales
    pub normalized_target_co2e_mg: f64,

    pub initial_registered_count: f64,

    pub cert_co2e_gpmi: f64,

    pub cert_direct_kwh_per_mile: f64,

    pub new_vehicle_mfr_cost_dollars: f64,

    pub new_vehicle_mfr_generalized_cost_dollars: f64,

    pub cert_co2e_mg: f64,

    pub cert_target_co2e_mg: f64,
}

impl CompositeVehicle {
    /// Compose source vehicles of one market class and regulatory class
    ///
    /// Source vehicles must already carry their normalized compliance
    /// factors and projected sales (`initial_registered_count`).
    ///
    /// # Errors
    ///
    /// Fails when the list is empty, when sources disagree on market or
    /// regulatory class, or when the composite frontier cannot be built.
    pub fn new(vehicles: Vec<Vehicle>) -> Result<Self, CompositeVehicleError> {
        let first = vehicles
            .first()
            .ok_or_else(|| CompositeVehicleError::Empty(String::new()))?;
        let market_class_id = first.market_class_id.clone();
        let reg_class_id = first.reg_class_id.clone();
        let model_year = first.model_year;
        let vehicle_id = format!("{}.{}", market_class_id, reg_class_id);

        if let Some(v) = vehicles
            .iter()
            .find(|v| v.market_class_id != market_class_id || v.reg_class_id != reg_class_id)
        {
            return Err(CompositeVehicleError::MixedClasses {
                composite_id: vehicle_id,
                vehicle_id: v.vehicle_id.clone(),
                market_class_id: v.market_class_id.clone(),
                reg_class_id: v.reg_class_id.clone(),
            });
        }

        let weights = normalized_weights(&vehicles);
        let cost_curve = compose_frontier(&vehicles, &weights)?;

        let fueling_class = if vehicles.iter().all(|v| v.fueling_class == FuelingClass::Bev) {
            FuelingClass::Bev
        } else {
            FuelingClass::Ice
        };

        let weighted = |f: fn(&Vehicle) -> f64| -> f64 {
            vehicles.iter().zip(&weights).map(|(v, w)| f(v) * w).sum()
        };
        let normalized_cert_co2e_mg = weighted(|v| v.normalized_cert_co2e_mg);
        let normalized_target_co2e_mg = weighted(|v| v.normalized_target_co2e_mg);
        let initial_registered_count = vehicles.iter().map(|v| v.initial_registered_count).sum();
        let cert_co2e_gpmi = cost_curve.max_co2e_gpmi();

        Ok(Self {
            vehicle_id,
            market_class_id,
            reg_class_id,
            model_year,
            fueling_class,
            vehicles,
            weights,
            cost_curve,
            composite_vehicle_share_frac: 1.0,
            normalized_cert_co2e_mg,
            normalized_target_co2e_mg,
            initial_registered_count,
            cert_co2e_gpmi,
            cert_direct_kwh_per_mile: 0.0,
            new_vehicle_mfr_cost_dollars: 0.0,
            new_vehicle_mfr_generalized_cost_dollars: 0.0,
            cert_co2e_mg: 0.0,
            cert_target_co2e_mg: 0.0,
        })
    }

    /// Value copy of this composite, source vehicles included
    ///
    /// Decisions are applied to snapshots so the cached composites stay
    /// untouched for the next search invocation of the same year.
    pub fn snapshot(&self) -> CompositeVehicle {
        self.clone()
    }

    /// Source vehicles
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// Normalized source weights, parallel to `vehicles()`
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Composite frontier
    pub fn cost_curve(&self) -> &CostCurve {
        &self.cost_curve
    }

    /// Minimum feasible certification level
    pub fn min_cert_co2e_gpmi(&self) -> f64 {
        self.cost_curve.min_co2e_gpmi()
    }

    /// Maximum feasible certification level
    pub fn max_cert_co2e_gpmi(&self) -> f64 {
        self.cost_curve.max_co2e_gpmi()
    }

    /// Assign a decision's level, energy use and sales, then decompose
    ///
    /// Recomputes the composite's cost and compliance mass from the
    /// decomposed source vehicles.
    pub fn apply_decision(&mut self, cert_co2e_gpmi: f64, cert_direct_kwh_per_mile: f64, sales: f64) {
        self.cert_co2e_gpmi = cert_co2e_gpmi;
        self.cert_direct_kwh_per_mile = cert_direct_kwh_per_mile;
        self.initial_registered_count = sales;
        self.cert_co2e_mg = self.normalized_cert_co2e_mg * cert_co2e_gpmi * sales;
        self.cert_target_co2e_mg = self.normalized_target_co2e_mg * sales;

        self.decompose();

        self.new_vehicle_mfr_cost_dollars =
            self.weighted_attribute(|v| v.new_vehicle_mfr_cost_dollars);
        self.new_vehicle_mfr_generalized_cost_dollars =
            self.weighted_attribute(|v| v.new_vehicle_mfr_generalized_cost_dollars);
        self.cert_co2e_mg = self.vehicles.iter().map(|v| v.cert_co2e_mg).sum();
        self.cert_target_co2e_mg = self.vehicles.iter().map(|v| v.cert_target_co2e_mg).sum();
    }

    /// Propagate the composite's level and sales to its source vehicles
    pub fn decompose(&mut self) {
        let position = self.frontier_position(self.cert_co2e_gpmi);
        let sales = self.initial_registered_count;

        for (vehicle, weight) in self.vehicles.iter_mut().zip(&self.weights) {
            let level = level_at_position(&vehicle.cost_curve, position);
            vehicle.apply_level_and_sales(level, sales * weight);
        }
    }

    /// Sales-weighted average of a source attribute
    ///
    /// Falls back to base-share weights when the composite has no sales.
    pub fn weighted_attribute(&self, attribute: impl Fn(&Vehicle) -> f64) -> f64 {
        let total_sales: f64 = self.vehicles.iter().map(|v| v.initial_registered_count).sum();
        if total_sales > 0.0 {
            self.vehicles
                .iter()
                .map(|v| attribute(v) * v.initial_registered_count)
                .sum::<f64>()
                / total_sales
        } else {
            self.vehicles
                .iter()
                .zip(&self.weights)
                .map(|(v, w)| attribute(v) * w)
                .sum()
        }
    }

    fn frontier_position(&self, co2e_gpmi: f64) -> f64 {
        let (lo, hi) = (self.min_cert_co2e_gpmi(), self.max_cert_co2e_gpmi());
        if hi - lo < f64::EPSILON {
            return 0.0;
        }
        ((co2e_gpmi - lo) / (hi - lo)).clamp(0.0, 1.0)
    }
}

impl VehicleCostModel for CompositeVehicle {
    fn feasible_emission_range(&self) -> (f64, f64) {
        (self.min_cert_co2e_gpmi(), self.max_cert_co2e_gpmi())
    }

    fn cost_at(&self, levels: &[f64]) -> Vec<f64> {
        VehicleCostModel::cost_at(&self.cost_curve, levels)
    }

    fn generalized_cost_at(&self, levels: &[f64]) -> Vec<f64> {
        VehicleCostModel::generalized_cost_at(&self.cost_curve, levels)
    }

    fn energy_use_at(&self, levels: &[f64]) -> Vec<f64> {
        self.cost_curve.energy_use_at(levels)
    }
}

fn normalized_weights(vehicles: &[Vehicle]) -> Vec<f64> {
    let total: f64 = vehicles.iter().map(|v| v.base_year_market_share.max(0.0)).sum();
    if total > 0.0 {
        vehicles
            .iter()
            .map(|v| v.base_year_market_share.max(0.0) / total)
            .collect()
    } else {
        vec![1.0 / vehicles.len() as f64; vehicles.len()]
    }
}

fn level_at_position(curve: &CostCurve, position: f64) -> f64 {
    let (lo, hi) = (curve.min_co2e_gpmi(), curve.max_co2e_gpmi());
    lo + position * (hi - lo)
}

fn compose_frontier(vehicles: &[Vehicle], weights: &[f64]) -> Result<CostCurve, CostCurveError> {
    let mut positions = vec![0.0, 1.0];
    for v in vehicles {
        let (lo, hi) = (v.cost_curve.min_co2e_gpmi(), v.cost_curve.max_co2e_gpmi());
        if hi - lo > f64::EPSILON {
            positions.extend(
                v.cost_curve
                    .points()
                    .iter()
                    .map(|p| (p.cert_co2e_gpmi - lo) / (hi - lo)),
            );
        }
    }
    positions.sort_by(f64::total_cmp);
    positions.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    let points = positions
        .iter()
        .map(|&t| {
            let mut point = CostCurvePoint::new(0.0, 0.0).with_generalized_cost(0.0);
            let mut generalized = 0.0;
            for (v, w) in vehicles.iter().zip(weights) {
                let level = level_at_position(&v.cost_curve, t);
                point.cert_co2e_gpmi += w * level;
                point.cost_dollars += w * v.cost_curve.cost_at(level);
                generalized += w * v.cost_curve.generalized_cost_at(level);
                point.cert_kwh_per_mile += w * v.cost_curve.kwh_per_mile_at(level);
            }
            point.with_generalized_cost(generalized)
        })
        .collect();

    CostCurve::new(points)
}
