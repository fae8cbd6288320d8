// Target Formula Module
//
// Per-vehicle target coefficients written as JSON expressions and compiled
// at configuration load time.

pub mod compile;
pub mod types;

pub use compile::{CompiledFormula, FormulaError, MAX_FORMULA_DEPTH};
pub use types::{Computation, FormulaDef, Value};
