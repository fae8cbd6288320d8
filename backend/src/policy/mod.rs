//! Policy Module
//!
//! External collaborators of the compliance search, expressed as traits with
//! table-backed implementations loaded from a scenario file.
//!
//! # Overview
//!
//! The search never decides policy itself. It asks:
//! - **constraints**: how much of each market category the producer may build
//!   (`ProductionConstraints`)
//! - **context**: projected sales and fixed shares of non-responsive
//!   categories (`MarketContext`)
//! - **targets**: each vehicle's normalized cert and target CO2e factors
//!   (`ComplianceTargets`)
//!
//! # Formulas
//!
//! Target g/mi equations are JSON expressions in the `formula` module,
//! compiled once when the standards are loaded:
//!
//! ```rust
//! use compliance_search_core_rs::policy::formula::{CompiledFormula, FormulaDef};
//!
//! let def: FormulaDef = serde_json::from_str(r#"{"expression": {"value": 181.0}}"#).unwrap();
//! let formula = CompiledFormula::compile(&def).unwrap();
//! assert_eq!(formula.evaluate(&[]).unwrap(), 181.0);
//! ```

pub mod constraints;
pub mod context;
pub mod formula;
pub mod targets;

pub use constraints::{
    resolve_bounds, ConstraintError, ProductionConstraints, ShareBounds, ShareConstraintEntry,
    ShareConstraintTable, SHARE_TOLERANCE,
};
pub use context::{CategoryShareEntry, MarketContext, MarketContextTable, SalesEntry};
pub use formula::{CompiledFormula, FormulaDef, FormulaError};
pub use targets::{ComplianceTargets, FormulaTargets, TargetError, TargetStandard};
