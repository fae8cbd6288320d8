//! Scenario configuration
//!
//! A scenario is one JSON document holding everything a search needs:
//! search settings, the market class hierarchy, the manufacturer's base-year
//! vehicles, share constraints, the baseline context and the target
//! standards. Target formulas are compiled when the scenario is compiled.
//!
//! # Example
//!
//! ```rust,no_run
//! use compliance_search_core_rs::scenario::ScenarioConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScenarioConfig::load("scenario.json")?;
//! let scenario = config.compile()?;
//! let run = scenario.run_analysis("OEM_A", 2021..=2023)?;
//! for year in &run.years {
//!     println!("{}: ratio {}", year.calendar_year, year.outcome.selected_decision.strategic_compliance_ratio);
//! }
//! # Ok(())
//! # }
//! ```

use crate::models::event::IterationLog;
use crate::models::market_class::MarketClassConfig;
use crate::models::option::ConsumerResponse;
use crate::models::vehicle::Vehicle;
use crate::policy::constraints::ShareConstraintTable;
use crate::policy::context::MarketContextTable;
use crate::policy::targets::{FormulaTargets, TargetStandard};
use crate::search::builder::{CompositeVehicleCache, VehicleSource};
use crate::search::engine::{
    ComplianceSearch, SearchCollaborators, SearchConfig, SearchError, SearchOutcome, SearchRequest,
};
use crate::search::finalize::{finalize_production, ProductionSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Errors loading a scenario file
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scenario document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub search: SearchConfig,

    pub market_classes: MarketClassConfig,

    /// Base-year vehicles of every manufacturer
    pub vehicles: Vec<Vehicle>,

    #[serde(default)]
    pub constraints: ShareConstraintTable,

    #[serde(default)]
    pub context: MarketContextTable,

    pub target_standards: Vec<TargetStandard>,

    /// Strategic target offset (Mg) by calendar year; zero when absent
    #[serde(default)]
    pub strategic_target_offsets: BTreeMap<i32, f64>,
}

impl ScenarioConfig {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Validate settings and compile the target formulas
    pub fn compile(self) -> Result<Scenario, SearchError> {
        self.search.validate()?;
        self.market_classes.validate()?;
        let targets = FormulaTargets::compile(self.target_standards.clone())
            .map_err(|e| SearchError::InvalidConfig(format!("target formula: {}", e)))?;
        Ok(Scenario {
            config: self,
            targets,
        })
    }
}

/// A compiled scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    config: ScenarioConfig,
    targets: FormulaTargets,
}

/// Result of one analysis year
#[derive(Debug, Clone, Serialize)]
pub struct YearResult {
    pub calendar_year: i32,
    pub outcome: SearchOutcome,
    pub production: ProductionSummary,
}

/// Result of a multi-year analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub compliance_id: String,
    pub years: Vec<YearResult>,
    pub log: IterationLog,
}

impl Scenario {
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn targets(&self) -> &FormulaTargets {
        &self.targets
    }

    /// Strategic offset for a year
    pub fn strategic_target_offset_mg(&self, calendar_year: i32) -> f64 {
        self.config
            .strategic_target_offsets
            .get(&calendar_year)
            .copied()
            .unwrap_or(0.0)
    }

    /// Search drawing vehicles from `vehicles`
    pub fn search_with<'a>(&'a self, vehicles: &'a dyn VehicleSource) -> Result<ComplianceSearch<'a>, SearchError> {
        ComplianceSearch::new(
            self.config.search.clone(),
            SearchCollaborators {
                market_classes: &self.config.market_classes,
                vehicles,
                constraints: &self.config.constraints,
                context: &self.config.context,
                targets: &self.targets,
            },
        )
    }

    /// Search drawing vehicles from the scenario's base-year vehicles
    pub fn search(&self) -> Result<ComplianceSearch<'_>, SearchError> {
        self.search_with(&self.config.vehicles)
    }

    /// Run one search with an optional consumer response
    pub fn search_year(
        &self,
        cache: &mut CompositeVehicleCache,
        log: &mut IterationLog,
        compliance_id: &str,
        calendar_year: i32,
        consumer_response: Option<&ConsumerResponse>,
        producer_consumer_iteration: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let search = self.search()?;
        search.search_production_options(
            cache,
            log,
            &SearchRequest {
                compliance_id,
                calendar_year,
                consumer_response,
                producer_consumer_iteration,
                strategic_target_offset_mg: self.strategic_target_offset_mg(calendar_year),
            },
        )
    }

    /// Search and finalize consecutive years
    ///
    /// Each year's finalized vehicles become the next year's source vehicles.
    /// Each run builds composites into a fresh cache.
    pub fn run_analysis(
        &self,
        compliance_id: &str,
        years: RangeInclusive<i32>,
    ) -> Result<AnalysisRun, SearchError> {
        let mut cache = CompositeVehicleCache::new();
        let mut log = self.search()?.new_log()?;
        let mut vehicles = self.config.vehicles.clone();
        let mut results = Vec::new();

        for calendar_year in years {
            let outcome = {
                let search = self.search_with(&vehicles)?;
                search.search_production_options(
                    &mut cache,
                    &mut log,
                    &SearchRequest {
                        strategic_target_offset_mg: self.strategic_target_offset_mg(calendar_year),
                        ..SearchRequest::new(compliance_id, calendar_year)
                    },
                )?
            };

            let production = finalize_production(
                calendar_year,
                compliance_id,
                &outcome.composite_vehicles,
                &outcome.selected_decision,
            );
            vehicles.extend(production.vehicles.iter().cloned());

            info!(
                compliance_id,
                calendar_year,
                credits_co2e_mg = production.credits_co2e_mg(),
                "analysis year complete"
            );

            results.push(YearResult {
                calendar_year,
                outcome,
                production,
            });
        }

        Ok(AnalysisRun {
            compliance_id: compliance_id.to_string(),
            years: results,
            log,
        })
    }
}
