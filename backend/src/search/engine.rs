//! Compliance search loop
//!
//! Repeats sweep → evaluate → select with a geometrically shrinking share
//! range until the best candidate's compliance error is within tolerance or
//! the share range reaches its floor:
//!
//! ```text
//! share_range(i) = convergence_factor^i
//!
//! INIT ──▶ ITERATE ──▶ error ≤ tolerance ──────────▶ CONVERGED
//!             ▲   │
//!             │   ├──▶ share_range ≤ min_share_range ─▶ FLOOR
//!             └───┘ otherwise (winners seed next sweep)
//! ```
//!
//! The best candidate across all iterations (smallest `|1 − ratio|`) is
//! applied to snapshots of the composite vehicles and returned.
//!
//! # Critical Invariants
//!
//! 1. Share range strictly decreases until the floor, so the loop terminates
//! 2. The best compliance error never increases across iterations
//! 3. Cached composites are never mutated

use crate::models::composite::CompositeVehicle;
use crate::models::cost_curve::CostCurveError;
use crate::models::event::{DiagnosticsMode, IterationLog, SearchEvent};
use crate::models::market_class::{MarketClassConfig, MarketClassError, MarketClassTree};
use crate::models::option::{CandidateDecision, ConsumerResponse, ProductionOption, TableTooLarge};
use crate::policy::constraints::{ConstraintError, ProductionConstraints};
use crate::policy::context::MarketContext;
use crate::policy::formula::FormulaError;
use crate::policy::targets::{ComplianceTargets, TargetError};
use crate::search::builder::{CompositeVehicleBuilder, CompositeVehicleCache, VehicleSource};
use crate::search::evaluate::{evaluate_options, EvaluationInputs};
use crate::search::select::select_candidates;
use crate::search::sweep::{NarrowingPolicy, SweepRequest, TechNarrowing, TechShareSweepGenerator};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Emission levels sampled per ICE composite vehicle
    pub num_tech_options_per_ice_vehicle: usize,

    /// Emission levels sampled per BEV composite vehicle
    pub num_tech_options_per_bev_vehicle: usize,

    /// Grid points per share axis
    pub num_market_share_options: usize,

    /// Share range decay per iteration, in (0, 1)
    pub convergence_factor: f64,

    /// Convergence criterion on `|1 − strategic_compliance_ratio|`
    pub compliance_tolerance: f64,

    /// Share range floor
    pub min_share_range: f64,

    pub narrowing_policy: NarrowingPolicy,

    pub diagnostics: DiagnosticsMode,

    /// In full-table diagnostics, drop non-winning rows with a ratio above this
    pub full_table_ratio_ceiling: Option<f64>,

    /// Largest option table the sweep may materialize
    pub max_option_rows: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_tech_options_per_ice_vehicle: 6,
            num_tech_options_per_bev_vehicle: 3,
            num_market_share_options: 5,
            convergence_factor: 0.5,
            compliance_tolerance: 0.001,
            min_share_range: 0.0001,
            narrowing_policy: NarrowingPolicy::default(),
            diagnostics: DiagnosticsMode::default(),
            full_table_ratio_ceiling: Some(1.2),
            max_option_rows: 2_000_000,
        }
    }
}

impl SearchConfig {
    /// Check settings are usable
    pub fn validate(&self) -> Result<(), SearchError> {
        let invalid = |msg: &str| Err(SearchError::InvalidConfig(msg.to_string()));

        if self.num_tech_options_per_ice_vehicle == 0 || self.num_tech_options_per_bev_vehicle == 0 {
            return invalid("tech option counts must be at least 1");
        }
        if self.num_market_share_options == 0 {
            return invalid("num_market_share_options must be at least 1");
        }
        if !(self.convergence_factor > 0.0 && self.convergence_factor < 1.0) {
            return invalid("convergence_factor must be in (0, 1)");
        }
        if !(self.compliance_tolerance >= 0.0) {
            return invalid("compliance_tolerance must be non-negative");
        }
        if !(self.min_share_range > 0.0 && self.min_share_range <= 1.0) {
            return invalid("min_share_range must be in (0, 1]");
        }
        if self.max_option_rows == 0 {
            return invalid("max_option_rows must be at least 1");
        }
        if let Some(ceiling) = self.full_table_ratio_ceiling {
            if !(ceiling > 0.0) {
                return invalid("full_table_ratio_ceiling must be positive");
            }
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> Result<String, SearchError> {
        let json = serde_json::to_string(self)
            .map_err(|e| SearchError::InvalidConfig(format!("config serialization failed: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the compliance search
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Empty option table in {calendar_year}")]
    EmptyOptionTable { calendar_year: i32 },

    #[error("Option table of {rows} rows exceeds limit of {limit}")]
    OptionTableTooLarge { rows: usize, limit: usize },

    #[error("No share for category {category}")]
    MissingShare { category: String },

    #[error("No option column for composite vehicle {vehicle_id}")]
    MissingVehicleColumn { vehicle_id: String },

    #[error("No source vehicles for {compliance_id} before {calendar_year}")]
    NoSourceVehicles { compliance_id: String, calendar_year: i32 },

    #[error("Unknown market class: {0}")]
    UnknownMarketClass(String),

    #[error("Unknown regulatory class: {0}")]
    UnknownRegClass(String),

    #[error("No target standard for regulatory class {reg_class_id} in {calendar_year}")]
    MissingTargetStandard { reg_class_id: String, calendar_year: i32 },

    #[error("Target formula error for vehicle {vehicle_id}: {source}")]
    Formula {
        vehicle_id: String,
        #[source]
        source: FormulaError,
    },

    #[error("Cost curve error: {0}")]
    CostCurve(#[from] CostCurveError),
}

impl From<TableTooLarge> for SearchError {
    fn from(err: TableTooLarge) -> Self {
        SearchError::OptionTableTooLarge {
            rows: err.rows,
            limit: err.limit,
        }
    }
}

impl From<TargetError> for SearchError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::UnknownRegClass(rc) => SearchError::UnknownRegClass(rc),
            TargetError::MissingStandard {
                reg_class_id,
                calendar_year,
            } => SearchError::MissingTargetStandard {
                reg_class_id,
                calendar_year,
            },
            TargetError::Formula { vehicle_id, source } => SearchError::Formula { vehicle_id, source },
        }
    }
}

impl From<MarketClassError> for SearchError {
    fn from(err: MarketClassError) -> Self {
        match err {
            MarketClassError::UnknownMarketClass(mc) => SearchError::UnknownMarketClass(mc),
            other => SearchError::InvalidConfig(other.to_string()),
        }
    }
}

// ============================================================================
// Requests and outcomes
// ============================================================================

/// One call of the search
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub compliance_id: &'a str,
    pub calendar_year: i32,

    /// Consumer reaction to a prior decision; switches shares to "inherit"
    pub consumer_response: Option<&'a ConsumerResponse>,

    pub producer_consumer_iteration: usize,

    /// Positive to under-comply, negative to over-comply (Mg)
    pub strategic_target_offset_mg: f64,
}

impl<'a> SearchRequest<'a> {
    /// First-pass request with no consumer response and no offset
    pub fn new(compliance_id: &'a str, calendar_year: i32) -> Self {
        Self {
            compliance_id,
            calendar_year,
            consumer_response: None,
            producer_consumer_iteration: 0,
            strategic_target_offset_mg: 0.0,
        }
    }
}

/// Record of one search iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIteration {
    pub search_iteration: usize,
    pub share_range: f64,
    pub option_rows: usize,
    pub compliance_possible: bool,

    /// Best-so-far compliance error after this iteration
    pub best_compliance_error: f64,

    /// Best-so-far compliance ratio after this iteration
    pub best_compliance_ratio: f64,
}

/// Result of a completed search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Snapshots of the composites with the decision applied and decomposed
    pub composite_vehicles: Vec<CompositeVehicle>,

    pub selected_decision: ProductionOption,

    /// Tree holding the decided composites
    pub market_class_tree: MarketClassTree,

    /// Whether any iteration found a compliant option
    pub compliance_possible: bool,

    /// Whether the tolerance was met before the share-range floor
    pub converged: bool,

    pub final_compliance_error: f64,

    /// Number of iterations run
    pub search_iterations: usize,

    pub history: Vec<SearchIteration>,
}

// ============================================================================
// Search
// ============================================================================

/// External collaborators of the search
#[derive(Clone, Copy)]
pub struct SearchCollaborators<'a> {
    pub market_classes: &'a MarketClassConfig,
    pub vehicles: &'a dyn VehicleSource,
    pub constraints: &'a dyn ProductionConstraints,
    pub context: &'a dyn MarketContext,
    pub targets: &'a dyn ComplianceTargets,
}

/// Producer compliance search
pub struct ComplianceSearch<'a> {
    config: SearchConfig,
    collaborators: SearchCollaborators<'a>,
}

impl<'a> ComplianceSearch<'a> {
    /// Create a search, validating the configuration
    pub fn new(config: SearchConfig, collaborators: SearchCollaborators<'a>) -> Result<Self, SearchError> {
        config.validate()?;
        collaborators.market_classes.validate()?;
        Ok(Self {
            config,
            collaborators,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// New diagnostics log stamped with this search's configuration
    pub fn new_log(&self) -> Result<IterationLog, SearchError> {
        Ok(IterationLog::new(self.config.diagnostics, self.config.fingerprint()?))
    }

    /// Search for the production decision of one manufacturer and year
    ///
    /// Infeasible targets and non-convergence are reported on the outcome,
    /// not as errors.
    pub fn search_production_options(
        &self,
        cache: &mut CompositeVehicleCache,
        log: &mut IterationLog,
        request: &SearchRequest<'_>,
    ) -> Result<SearchOutcome, SearchError> {
        let c = &self.collaborators;
        let builder = CompositeVehicleBuilder::new(c.market_classes, c.vehicles, c.context, c.targets);
        let built = cache.get_or_build(request.compliance_id, request.calendar_year, || {
            builder.build(request.compliance_id, request.calendar_year)
        })?;
        let composites = built.composite_vehicles();

        let total_sales = request
            .consumer_response
            .and_then(|r| r.total_sales)
            .unwrap_or(built.context_based_total_sales);

        let generator =
            TechShareSweepGenerator::new(&self.config, c.market_classes, c.constraints, c.context);
        let mut narrowing = TechNarrowing::new();

        let mut candidates: Option<CandidateDecision> = None;
        let mut best: Option<ProductionOption> = None;
        let mut compliance_possible = false;
        let mut history = Vec::new();
        let mut search_iteration = 0;

        let (converged, best) = loop {
            let share_range = self.config.convergence_factor.powi(search_iteration as i32);

            let table = generator.generate(
                &built.market_class_tree,
                &SweepRequest {
                    calendar_year: request.calendar_year,
                    candidates: candidates.as_ref(),
                    share_range,
                    consumer_response: request.consumer_response,
                },
                &mut narrowing,
            )?;
            let option_rows = table.len();

            let options = evaluate_options(
                &composites,
                table,
                EvaluationInputs {
                    total_sales,
                    strategic_target_offset_mg: request.strategic_target_offset_mg,
                    share_range,
                    search_iteration,
                },
            )?;

            let decision = select_candidates(&options).ok_or(SearchError::EmptyOptionTable {
                calendar_year: request.calendar_year,
            })?;
            compliance_possible |= decision.compliance_possible;

            self.log_iteration(log, request, search_iteration, share_range, options, &decision);

            if let Some(candidate) = decision.best_by_error() {
                let improves = best
                    .as_ref()
                    .map_or(true, |b| candidate.strategic_compliance_error < b.strategic_compliance_error);
                if improves {
                    best = Some(candidate.clone());
                }
            }
            let Some(current_best) = best.as_ref() else {
                return Err(SearchError::EmptyOptionTable {
                    calendar_year: request.calendar_year,
                });
            };

            debug!(
                compliance_id = request.compliance_id,
                calendar_year = request.calendar_year,
                producer_consumer_iteration = request.producer_consumer_iteration,
                search_iteration,
                share_range,
                option_rows,
                best_ratio = current_best.strategic_compliance_ratio,
                "search iteration"
            );

            history.push(SearchIteration {
                search_iteration,
                share_range,
                option_rows,
                compliance_possible: decision.compliance_possible,
                best_compliance_error: current_best.strategic_compliance_error,
                best_compliance_ratio: current_best.strategic_compliance_ratio,
            });

            let converged = current_best.strategic_compliance_error <= self.config.compliance_tolerance;
            search_iteration += 1;
            if converged || share_range <= self.config.min_share_range {
                break (converged, current_best.clone());
            }
            candidates = Some(decision);
        };

        let final_compliance_error = best.strategic_compliance_error;
        log.log(SearchEvent::SearchCompleted {
            compliance_id: request.compliance_id.to_string(),
            calendar_year: request.calendar_year,
            producer_consumer_iteration: request.producer_consumer_iteration,
            search_iterations: search_iteration,
            final_compliance_error,
            compliance_possible,
            converged,
        });

        if !converged {
            warn!(
                compliance_id = request.compliance_id,
                calendar_year = request.calendar_year,
                final_compliance_error,
                "search reached share range floor without meeting tolerance"
            );
        }
        if !compliance_possible {
            warn!(
                compliance_id = request.compliance_id,
                calendar_year = request.calendar_year,
                "no compliant production option found"
            );
        }
        info!(
            compliance_id = request.compliance_id,
            calendar_year = request.calendar_year,
            producer_consumer_iteration = request.producer_consumer_iteration,
            search_iterations = search_iteration,
            compliance_ratio = best.strategic_compliance_ratio,
            total_cost_dollars = best.total_cost_dollars,
            "compliance search complete"
        );

        let mut market_class_tree = built.market_class_tree.clone();
        apply_production_decision_to_tree(&mut market_class_tree, &best)?;
        let composite_vehicles = market_class_tree
            .composite_vehicles()
            .into_iter()
            .cloned()
            .collect();

        Ok(SearchOutcome {
            composite_vehicles,
            selected_decision: best,
            market_class_tree,
            compliance_possible,
            converged,
            final_compliance_error,
            search_iterations: search_iteration,
            history,
        })
    }

    fn log_iteration(
        &self,
        log: &mut IterationLog,
        request: &SearchRequest<'_>,
        search_iteration: usize,
        share_range: f64,
        options: Vec<ProductionOption>,
        decision: &CandidateDecision,
    ) {
        let compliance_id = request.compliance_id.to_string();
        let calendar_year = request.calendar_year;
        let producer_consumer_iteration = request.producer_consumer_iteration;

        match log.mode() {
            DiagnosticsMode::Off => {}
            DiagnosticsMode::Winners => log.log(SearchEvent::Winners {
                compliance_id,
                calendar_year,
                producer_consumer_iteration,
                search_iteration,
                share_range,
                rows: decision.options.clone(),
            }),
            DiagnosticsMode::FullTable => {
                let ceiling = self.config.full_table_ratio_ceiling;
                let rows = options
                    .into_iter()
                    .map(|mut row| {
                        row.winner = decision.options.iter().any(|w| {
                            w.tech == row.tech && w.shares == row.shares && w.abs_shares == row.abs_shares
                        });
                        row
                    })
                    .filter(|row| row.winner || ceiling.map_or(true, |c| row.strategic_compliance_ratio <= c))
                    .collect();
                log.log(SearchEvent::OptionTable {
                    compliance_id,
                    calendar_year,
                    producer_consumer_iteration,
                    search_iteration,
                    share_range,
                    rows,
                });
            }
        }
    }
}

// ============================================================================
// Decision application
// ============================================================================

fn decide(cv: &mut CompositeVehicle, decision: &ProductionOption) -> Result<(), SearchError> {
    let tech = decision
        .tech
        .get(&cv.vehicle_id)
        .ok_or_else(|| SearchError::MissingVehicleColumn {
            vehicle_id: cv.vehicle_id.clone(),
        })?;
    cv.apply_decision(tech.co2e_gpmi, tech.kwh_pmi, decision.vehicle_sales(&cv.vehicle_id));
    Ok(())
}

/// Apply a decision to snapshots of the given composites
///
/// Each snapshot receives its chosen level, energy use and sales, is
/// decomposed onto its source vehicles, and has its cost and compliance mass
/// recomputed from them. The inputs are left untouched.
pub fn apply_production_decision(
    composites: &[&CompositeVehicle],
    decision: &ProductionOption,
) -> Result<Vec<CompositeVehicle>, SearchError> {
    composites
        .iter()
        .map(|cv| {
            let mut snapshot = cv.snapshot();
            decide(&mut snapshot, decision)?;
            Ok(snapshot)
        })
        .collect()
}

fn apply_production_decision_to_tree(
    tree: &mut MarketClassTree,
    decision: &ProductionOption,
) -> Result<(), SearchError> {
    let mut result = Ok(());
    tree.for_each_vehicle_mut(|cv| {
        if result.is_ok() {
            result = decide(cv, decision);
        }
    });
    result
}
