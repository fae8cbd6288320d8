//! Domain models for the compliance search

pub mod composite;
pub mod cost_curve;
pub mod event;
pub mod market_class;
pub mod option;
pub mod vehicle;

// Re-exports
pub use composite::{CompositeVehicle, CompositeVehicleError};
pub use cost_curve::{CostCurve, CostCurveError, CostCurvePoint, VehicleCostModel};
pub use market_class::{MarketClassConfig, MarketClassError, MarketClassNode, MarketClassTree};
pub use option::{
    CandidateDecision, ConsumerResponse, ProductionOption, SweepRow, SweepTable, TechOption,
    VehicleOutcome,
};
pub use vehicle::{FuelingClass, Vehicle};
