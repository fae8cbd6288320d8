//! Source vehicle model
//!
//! A source vehicle is one of a manufacturer's finalized vehicles from the
//! prior model year, carried forward into the year being searched. Source
//! vehicles are grouped into composite vehicles for the search and receive
//! their share of the composite's sales and technology level when a decision
//! is decomposed.

use crate::models::cost_curve::CostCurve;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Powertrain fueling class
///
/// Determines how many technology levels are sampled per composite vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FuelingClass {
    /// Internal combustion engine
    #[default]
    #[serde(rename = "ICE")]
    Ice,

    /// Battery electric
    #[serde(rename = "BEV")]
    Bev,
}

/// A manufacturer's source vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique vehicle identifier within the manufacturer
    pub vehicle_id: String,

    /// Compliance identifier (manufacturer name, or a consolidated OEM)
    pub compliance_id: String,

    /// Model year this record describes
    pub model_year: i32,

    /// Market class path (e.g. "hauling.ICE")
    pub market_class_id: String,

    /// Regulatory class (e.g. "car", "truck")
    pub reg_class_id: String,

    /// Context size class used to project sales (e.g. "Small Crossover")
    #[serde(default)]
    pub context_size_class: Option<String>,

    #[serde(default)]
    pub fueling_class: FuelingClass,

    /// Base-year market share used to weight the vehicle within its groups
    pub base_year_market_share: f64,

    /// Technology frontier for this vehicle
    pub cost_curve: CostCurve,

    /// Named attributes referenced by target formulas (footprint, workfactor, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,

    // Decision results (populated when a composite decision is decomposed)
    #[serde(default)]
    pub initial_registered_count: f64,

    #[serde(default)]
    pub cert_co2e_gpmi: f64,

    #[serde(default)]
    pub cert_direct_kwh_per_mile: f64,

    #[serde(default)]
    pub new_vehicle_mfr_cost_dollars: f64,

    #[serde(default)]
    pub new_vehicle_mfr_generalized_cost_dollars: f64,

    /// Cert CO2e Mg per unit sales per g/mi
    #[serde(default)]
    pub normalized_cert_co2e_mg: f64,

    /// Target CO2e Mg per unit sales
    #[serde(default)]
    pub normalized_target_co2e_mg: f64,

    #[serde(default)]
    pub cert_co2e_mg: f64,

    #[serde(default)]
    pub cert_target_co2e_mg: f64,
}

impl Vehicle {
    /// Create a vehicle with no decision results
    ///
    /// # Example
    /// ```
    /// use compliance_search_core_rs::models::cost_curve::{CostCurve, CostCurvePoint};
    /// use compliance_search_core_rs::models::vehicle::{FuelingClass, Vehicle};
    ///
    /// let curve = CostCurve::new(vec![CostCurvePoint::new(150.0, 25_000.0)]).unwrap();
    /// let veh = Vehicle::new("v1", "OEM_A", 2020, "non_hauling.ICE", "car", FuelingClass::Ice, 0.4, curve);
    /// assert_eq!(veh.initial_registered_count, 0.0);
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vehicle_id: impl Into<String>,
        compliance_id: impl Into<String>,
        model_year: i32,
        market_class_id: impl Into<String>,
        reg_class_id: impl Into<String>,
        fueling_class: FuelingClass,
        base_year_market_share: f64,
        cost_curve: CostCurve,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            compliance_id: compliance_id.into(),
            model_year,
            market_class_id: market_class_id.into(),
            reg_class_id: reg_class_id.into(),
            context_size_class: None,
            fueling_class,
            base_year_market_share,
            cost_curve,
            attributes: BTreeMap::new(),
            initial_registered_count: 0.0,
            cert_co2e_gpmi: 0.0,
            cert_direct_kwh_per_mile: 0.0,
            new_vehicle_mfr_cost_dollars: 0.0,
            new_vehicle_mfr_generalized_cost_dollars: 0.0,
            normalized_cert_co2e_mg: 0.0,
            normalized_target_co2e_mg: 0.0,
            cert_co2e_mg: 0.0,
            cert_target_co2e_mg: 0.0,
        }
    }

    /// Set the context size class
    pub fn with_size_class(mut self, size_class: impl Into<String>) -> Self {
        self.context_size_class = Some(size_class.into());
        self
    }

    /// Set a named attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Carry a prior-year vehicle into a new model year
    ///
    /// Keeps identity, classification, frontier and attributes; clears all
    /// decision results.
    pub fn carry_forward(&self, model_year: i32) -> Self {
        let mut next = Vehicle::new(
            self.vehicle_id.clone(),
            self.compliance_id.clone(),
            model_year,
            self.market_class_id.clone(),
            self.reg_class_id.clone(),
            self.fueling_class,
            self.base_year_market_share,
            self.cost_curve.clone(),
        );
        next.context_size_class = self.context_size_class.clone();
        next.attributes = self.attributes.clone();
        next
    }

    /// Set level and sales, then recompute cost and compliance mass from the frontier
    pub fn apply_level_and_sales(&mut self, cert_co2e_gpmi: f64, sales: f64) {
        self.cert_co2e_gpmi = cert_co2e_gpmi;
        self.initial_registered_count = sales;
        self.cert_direct_kwh_per_mile = self.cost_curve.kwh_per_mile_at(cert_co2e_gpmi);
        self.new_vehicle_mfr_cost_dollars = self.cost_curve.cost_at(cert_co2e_gpmi);
        self.new_vehicle_mfr_generalized_cost_dollars =
            self.cost_curve.generalized_cost_at(cert_co2e_gpmi);
        self.cert_co2e_mg = self.normalized_cert_co2e_mg * cert_co2e_gpmi * sales;
        self.cert_target_co2e_mg = self.normalized_target_co2e_mg * sales;
    }
}
