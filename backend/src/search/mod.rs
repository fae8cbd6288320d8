//! Producer compliance search
//!
//! - **builder**: composite vehicles from prior-year source vehicles (memoized)
//! - **sweep**: technology and share option tables over the market class tree
//! - **shares**: constrained share vectors for sibling categories
//! - **evaluate**: sales, cost and compliance outcome of every option
//! - **select**: winning candidate(s) of an iteration
//! - **engine**: the convergence loop and its public entry point
//! - **finalize**: decomposition of the final decision for persistence

pub mod builder;
pub mod engine;
pub mod evaluate;
pub mod finalize;
pub mod select;
pub mod shares;
pub mod sweep;

pub use builder::{BuiltComposites, CompositeVehicleBuilder, CompositeVehicleCache, VehicleSource};
pub use engine::{
    apply_production_decision, ComplianceSearch, SearchCollaborators, SearchConfig, SearchError,
    SearchIteration, SearchOutcome, SearchRequest,
};
pub use finalize::{finalize_production, ProductionSummary};
pub use select::select_candidates;
pub use sweep::{NarrowingPolicy, TechNarrowing, TechShareSweepGenerator};
