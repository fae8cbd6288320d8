//! Compliance Search Core - Rust Engine
//!
//! Producer-side compliance search for a vehicle fleet emissions model: each
//! manufacturer chooses per-vehicle technology levels and market shares so
//! that its certification CO2e meets its regulatory target at least cost.
//!
//! # Architecture
//!
//! - **models**: Domain types (Vehicle, CostCurve, CompositeVehicle, market class tree, option tables)
//! - **policy**: Share constraints, baseline context, compliance targets and target formulas
//! - **search**: Composite building, sweep generation, evaluation, selection and the convergence loop
//! - **scenario**: JSON scenario loading and multi-year analysis runs
//!
//! # Critical Invariants
//!
//! 1. Sibling shares always sum to 1 within tolerance
//! 2. The best compliance error never increases across search iterations
//! 3. Cached composite vehicles are never mutated
//! 4. The search is deterministic: identical inputs give identical outputs

// Module declarations
pub mod models;
pub mod policy;
pub mod scenario;
pub mod search;

// Re-exports for convenience
pub use models::{
    composite::CompositeVehicle,
    cost_curve::{CostCurve, CostCurvePoint},
    event::{DiagnosticsMode, IterationLog, SearchEvent},
    market_class::{MarketClassConfig, MarketClassTree},
    option::{CandidateDecision, ConsumerResponse, ProductionOption},
    vehicle::{FuelingClass, Vehicle},
};
pub use scenario::{AnalysisRun, Scenario, ScenarioConfig, ScenarioError, YearResult};
pub use search::{
    ComplianceSearch, CompositeVehicleCache, SearchCollaborators, SearchConfig, SearchError,
    SearchOutcome, SearchRequest,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn compliance_search_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::search::PyComplianceSearch>()?;
    Ok(())
}
