//! PyO3 wrapper for the compliance search
//!
//! This module provides the Python interface to a compiled scenario. The
//! wrapper owns the composite vehicle cache and the diagnostics log, so
//! repeated searches of one year (producer–consumer iterations) reuse the
//! built composites.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{from_py_dict, runtime_error, to_py_object, value_error};
use crate::models::event::IterationLog;
use crate::models::option::ConsumerResponse;
use crate::scenario::{Scenario, ScenarioConfig};
use crate::search::builder::CompositeVehicleCache;
use crate::search::engine::SearchError;

fn search_error(e: SearchError) -> PyErr {
    match e {
        SearchError::InvalidConfig(_) | SearchError::Constraint(_) => value_error(e.to_string()),
        other => runtime_error(format!("Compliance search failed: {}", other)),
    }
}

/// Python wrapper for a compiled scenario
///
/// # Example (from Python)
///
/// ```python
/// from compliance_search_core_rs import ComplianceSearch
///
/// search = ComplianceSearch.new(scenario_dict)
/// outcome = search.search("OEM_A", 2021)
/// print(outcome["selected_decision"]["strategic_compliance_ratio"])
///
/// response = {"consumer_abs_shares": {"hauling": 0.35, "non_hauling": 0.65}}
/// outcome = search.search("OEM_A", 2021, response, 1)
/// ```
#[pyclass(name = "ComplianceSearch")]
pub struct PyComplianceSearch {
    scenario: Scenario,
    cache: CompositeVehicleCache,
    log: IterationLog,
}

#[pymethods]
impl PyComplianceSearch {
    /// Create a search from a scenario dictionary
    ///
    /// # Errors
    ///
    /// Raises ValueError if the scenario does not parse, a setting is out of
    /// range, or a target formula fails to compile.
    #[staticmethod]
    fn new(config: &Bound<'_, PyDict>) -> PyResult<Self> {
        let config: ScenarioConfig = from_py_dict(config)?;
        Self::from_config(config)
    }

    /// Create a search from a scenario JSON string
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let config = ScenarioConfig::from_json(json).map_err(|e| value_error(e.to_string()))?;
        Self::from_config(config)
    }

    /// Search one manufacturer and year
    ///
    /// Returns the search outcome as a dict. Passing a consumer response
    /// switches category shares to those of the response.
    #[pyo3(signature = (compliance_id, calendar_year, consumer_response=None, producer_consumer_iteration=0))]
    fn search(
        &mut self,
        py: Python<'_>,
        compliance_id: &str,
        calendar_year: i32,
        consumer_response: Option<&Bound<'_, PyDict>>,
        producer_consumer_iteration: usize,
    ) -> PyResult<PyObject> {
        let response = consumer_response
            .map(from_py_dict::<ConsumerResponse>)
            .transpose()?;
        let outcome = self
            .scenario
            .search_year(
                &mut self.cache,
                &mut self.log,
                compliance_id,
                calendar_year,
                response.as_ref(),
                producer_consumer_iteration,
            )
            .map_err(search_error)?;
        to_py_object(py, &outcome)
    }

    /// Search and finalize consecutive years, feeding each year's vehicles forward
    fn run_analysis(
        &self,
        py: Python<'_>,
        compliance_id: &str,
        start_year: i32,
        end_year: i32,
    ) -> PyResult<PyObject> {
        let run = self
            .scenario
            .run_analysis(compliance_id, start_year..=end_year)
            .map_err(search_error)?;
        to_py_object(py, &run)
    }

    /// Drop cached composite vehicles
    fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Diagnostics events recorded so far
    fn get_diagnostics(&self, py: Python<'_>) -> PyResult<Py<PyList>> {
        let list = PyList::empty_bound(py);
        for event in self.log.events() {
            list.append(to_py_object(py, event)?)?;
        }
        Ok(list.unbind())
    }

    /// Fingerprint of the search settings
    fn config_fingerprint(&self) -> String {
        self.log.config_fingerprint().to_string()
    }
}

impl PyComplianceSearch {
    fn from_config(config: ScenarioConfig) -> PyResult<Self> {
        let scenario = config.compile().map_err(search_error)?;
        let log = scenario
            .search()
            .and_then(|s| s.new_log())
            .map_err(search_error)?;
        Ok(Self {
            scenario,
            cache: CompositeVehicleCache::new(),
            log,
        })
    }
}
