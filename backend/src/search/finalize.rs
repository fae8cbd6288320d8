//! Production finalization
//!
//! Once the producer–consumer iteration settles, the final decision's sales
//! are pushed down to the source vehicles and the manufacturer's annual
//! certification totals are computed for the caller to persist.

use crate::models::composite::CompositeVehicle;
use crate::models::option::ProductionOption;
use crate::models::vehicle::Vehicle;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Finalized production of one manufacturer and year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub compliance_id: String,
    pub calendar_year: i32,

    /// Source vehicles with final levels and sales
    pub vehicles: Vec<Vehicle>,

    pub total_sales: f64,
    pub cert_target_co2e_mg: f64,
    pub cert_co2e_mg: f64,

    /// Manufacturer vehicle cost of the final decision
    pub manufacturer_vehicle_cost_dollars: f64,
}

impl ProductionSummary {
    /// Target minus cert (positive means credits earned)
    pub fn credits_co2e_mg(&self) -> f64 {
        self.cert_target_co2e_mg - self.cert_co2e_mg
    }
}

/// Decompose the final decision onto source vehicles and total the results
///
/// Sales come from `decision`, which may differ from the search's own
/// decision after consumer iteration; levels are those already applied to
/// the composites.
pub fn finalize_production(
    calendar_year: i32,
    compliance_id: &str,
    composite_vehicles: &[CompositeVehicle],
    decision: &ProductionOption,
) -> ProductionSummary {
    let mut vehicles = Vec::new();
    for cv in composite_vehicles {
        let mut cv = cv.snapshot();
        cv.initial_registered_count = decision.vehicle_sales(&cv.vehicle_id);
        cv.decompose();
        vehicles.extend(cv.vehicles().iter().cloned());
    }

    let total_sales: f64 = vehicles.iter().map(|v| v.initial_registered_count).sum();
    let cert_target_co2e_mg: f64 = vehicles.iter().map(|v| v.cert_target_co2e_mg).sum();
    let cert_co2e_mg: f64 = vehicles.iter().map(|v| v.cert_co2e_mg).sum();

    info!(
        compliance_id,
        calendar_year,
        vehicles = vehicles.len(),
        cert_target_co2e_mg,
        cert_co2e_mg,
        "production finalized"
    );

    ProductionSummary {
        compliance_id: compliance_id.to_string(),
        calendar_year,
        vehicles,
        total_sales,
        cert_target_co2e_mg,
        cert_co2e_mg,
        manufacturer_vehicle_cost_dollars: decision.total_cost_dollars,
    }
}
