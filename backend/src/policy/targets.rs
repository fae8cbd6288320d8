//! Compliance targets
//!
//! Supplies each source vehicle's normalized compliance factors:
//!
//! - cert CO2e Mg per unit sales per g/mi: `lifetime_vmt / 1e6`
//! - target CO2e Mg per unit sales: `target_gpmi(vehicle) × lifetime_vmt / 1e6`
//!
//! Standards are keyed by regulatory class and step by start year. Target
//! g/mi formulas are compiled when the standards are loaded.

use crate::models::vehicle::Vehicle;
use crate::policy::formula::{CompiledFormula, FormulaDef, FormulaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Grams per megagram
pub const GRAMS_PER_MG: f64 = 1_000_000.0;

/// Errors raised while computing a vehicle's compliance factors
#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("Unknown regulatory class: {0}")]
    UnknownRegClass(String),

    #[error("No target standard for regulatory class {reg_class_id} in {calendar_year}")]
    MissingStandard {
        reg_class_id: String,
        calendar_year: i32,
    },

    #[error("Target formula error for vehicle {vehicle_id}: {source}")]
    Formula {
        vehicle_id: String,
        #[source]
        source: FormulaError,
    },
}

/// Target source queried by the composite builder
pub trait ComplianceTargets {
    /// Cert CO2e Mg per unit sales per g/mi
    fn normalized_cert_co2e_mg(&self, vehicle: &Vehicle) -> Result<f64, TargetError>;

    /// Target CO2e Mg per unit sales
    fn normalized_target_co2e_mg(&self, vehicle: &Vehicle) -> Result<f64, TargetError>;
}

/// One target standard row as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStandard {
    pub reg_class_id: String,
    pub start_year: i32,

    /// Lifetime vehicle miles traveled
    pub lifetime_vmt: f64,

    /// Target CO2e g/mi as a function of vehicle attributes
    pub target_co2e_gpmi: FormulaDef,
}

#[derive(Debug, Clone)]
struct CompiledStandard {
    start_year: i32,
    lifetime_vmt: f64,
    target_co2e_gpmi: CompiledFormula,
}

/// Formula-driven targets
///
/// # Example
///
/// ```rust
/// use compliance_search_core_rs::policy::formula::FormulaDef;
/// use compliance_search_core_rs::policy::targets::{FormulaTargets, TargetStandard};
///
/// let targets = FormulaTargets::compile(vec![TargetStandard {
///     reg_class_id: "car".to_string(),
///     start_year: 2020,
///     lifetime_vmt: 195_264.0,
///     target_co2e_gpmi: FormulaDef::constant(181.0),
/// }]).unwrap();
/// assert_eq!(targets.reg_classes().count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormulaTargets {
    standards: BTreeMap<String, Vec<CompiledStandard>>,
}

impl FormulaTargets {
    /// Compile every standard's target formula
    pub fn compile(standards: Vec<TargetStandard>) -> Result<Self, FormulaError> {
        let mut compiled: BTreeMap<String, Vec<CompiledStandard>> = BTreeMap::new();
        for standard in standards {
            let target_co2e_gpmi = CompiledFormula::compile(&standard.target_co2e_gpmi)?;
            compiled
                .entry(standard.reg_class_id)
                .or_default()
                .push(CompiledStandard {
                    start_year: standard.start_year,
                    lifetime_vmt: standard.lifetime_vmt,
                    target_co2e_gpmi,
                });
        }
        for rows in compiled.values_mut() {
            rows.sort_by_key(|r| r.start_year);
        }
        Ok(Self { standards: compiled })
    }

    /// Configured regulatory classes
    pub fn reg_classes(&self) -> impl Iterator<Item = &str> {
        self.standards.keys().map(String::as_str)
    }

    fn standard(&self, vehicle: &Vehicle) -> Result<&CompiledStandard, TargetError> {
        let rows = self
            .standards
            .get(&vehicle.reg_class_id)
            .ok_or_else(|| TargetError::UnknownRegClass(vehicle.reg_class_id.clone()))?;
        rows.iter()
            .rev()
            .find(|r| r.start_year <= vehicle.model_year)
            .ok_or_else(|| TargetError::MissingStandard {
                reg_class_id: vehicle.reg_class_id.clone(),
                calendar_year: vehicle.model_year,
            })
    }

    /// Target CO2e g/mi for a vehicle
    pub fn target_co2e_gpmi(&self, vehicle: &Vehicle) -> Result<f64, TargetError> {
        let standard = self.standard(vehicle)?;
        standard
            .target_co2e_gpmi
            .evaluate_with(|name| vehicle.attributes.get(name).copied())
            .map_err(|source| TargetError::Formula {
                vehicle_id: vehicle.vehicle_id.clone(),
                source,
            })
    }
}

impl ComplianceTargets for FormulaTargets {
    fn normalized_cert_co2e_mg(&self, vehicle: &Vehicle) -> Result<f64, TargetError> {
        Ok(self.standard(vehicle)?.lifetime_vmt / GRAMS_PER_MG)
    }

    fn normalized_target_co2e_mg(&self, vehicle: &Vehicle) -> Result<f64, TargetError> {
        let vmt = self.standard(vehicle)?.lifetime_vmt;
        Ok(self.target_co2e_gpmi(vehicle)? * vmt / GRAMS_PER_MG)
    }
}
