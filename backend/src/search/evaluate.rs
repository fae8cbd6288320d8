//! Production option evaluation
//!
//! Turns sweep rows into production options. For each composite vehicle:
//!
//! ```text
//! market class share = abs_shares[mc]  or  Π shares[p] for p in path_chain(mc)
//! sales              = total_sales × market class share × composite share frac
//! cert Mg            = normalized cert × level × sales
//! target Mg          = normalized target × sales
//! ```
//!
//! Totals are summed over vehicles, then
//! `credits = target − cert` and
//! `ratio = (cert − offset) / max(1, target)`.

use crate::models::composite::CompositeVehicle;
use crate::models::market_class::path_chain;
use crate::models::option::{ProductionOption, SweepRow, SweepTable, VehicleOutcome};
use crate::search::engine::SearchError;

/// Evaluation settings shared by every row of one iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationInputs {
    pub total_sales: f64,
    pub strategic_target_offset_mg: f64,
    pub share_range: f64,
    pub search_iteration: usize,
}

/// Evaluate every row of a sweep table
pub fn evaluate_options(
    composites: &[&CompositeVehicle],
    table: SweepTable,
    inputs: EvaluationInputs,
) -> Result<Vec<ProductionOption>, SearchError> {
    table
        .into_rows()
        .into_iter()
        .map(|row| evaluate_row(composites, row, inputs))
        .collect()
}

/// Absolute share of a market class within one row
fn market_class_share(row: &SweepRow, market_class_id: &str) -> Result<f64, SearchError> {
    if let Some(share) = row.abs_shares.get(market_class_id) {
        return Ok(*share);
    }
    path_chain(market_class_id).iter().try_fold(1.0, |acc, path| {
        row.shares
            .get(path)
            .map(|s| acc * s)
            .ok_or_else(|| SearchError::MissingShare {
                category: path.clone(),
            })
    })
}

fn evaluate_row(
    composites: &[&CompositeVehicle],
    row: SweepRow,
    inputs: EvaluationInputs,
) -> Result<ProductionOption, SearchError> {
    let mut option = ProductionOption {
        total_sales: inputs.total_sales,
        strategic_target_offset_mg: inputs.strategic_target_offset_mg,
        share_range: inputs.share_range,
        producer_search_iteration: inputs.search_iteration,
        ..ProductionOption::default()
    };

    for cv in composites {
        let tech = row
            .tech
            .get(&cv.vehicle_id)
            .ok_or_else(|| SearchError::MissingVehicleColumn {
                vehicle_id: cv.vehicle_id.clone(),
            })?;

        let mc_share = market_class_share(&row, &cv.market_class_id)?;
        option
            .producer_abs_shares
            .insert(cv.market_class_id.clone(), mc_share);

        let sales = inputs.total_sales * mc_share * cv.composite_vehicle_share_frac;
        let outcome = VehicleOutcome {
            sales,
            total_cost_dollars: tech.cost_dollars * sales,
            total_generalized_cost_dollars: tech.generalized_cost_dollars * sales,
            cert_co2e_mg: cv.normalized_cert_co2e_mg * tech.co2e_gpmi * sales,
            target_co2e_mg: cv.normalized_target_co2e_mg * sales,
        };

        option.total_cost_dollars += outcome.total_cost_dollars;
        option.total_generalized_cost_dollars += outcome.total_generalized_cost_dollars;
        option.total_cert_co2e_mg += outcome.cert_co2e_mg;
        option.total_target_co2e_mg += outcome.target_co2e_mg;
        option.vehicles.insert(cv.vehicle_id.clone(), outcome);
    }

    option.total_credits_co2e_mg = option.total_target_co2e_mg - option.total_cert_co2e_mg;
    option.strategic_compliance_ratio = (option.total_cert_co2e_mg - inputs.strategic_target_offset_mg)
        / option.total_target_co2e_mg.max(1.0);
    option.strategic_compliance_error = (1.0 - option.strategic_compliance_ratio).abs();

    option.tech = row.tech;
    option.shares = row.shares;
    option.abs_shares = row.abs_shares;
    Ok(option)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(shares: &[(&str, f64)], abs: &[(&str, f64)]) -> SweepRow {
        SweepRow {
            shares: shares.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            abs_shares: abs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..SweepRow::default()
        }
    }

    #[test]
    fn test_nested_share_product() {
        let r = row(&[("hauling", 0.4), ("hauling.BEV", 0.25)], &[]);
        assert!((market_class_share(&r, "hauling.BEV").unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_abs_share_takes_precedence() {
        let r = row(&[("hauling", 0.4)], &[("hauling.BEV", 0.3)]);
        assert_eq!(market_class_share(&r, "hauling.BEV").unwrap(), 0.3);
    }

    #[test]
    fn test_missing_share_is_reported() {
        let r = row(&[("hauling", 0.4)], &[]);
        assert_eq!(
            market_class_share(&r, "hauling.ICE"),
            Err(SearchError::MissingShare {
                category: "hauling.ICE".to_string()
            })
        );
    }
}
