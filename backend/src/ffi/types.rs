//! Type conversion utilities for FFI boundary
//!
//! Scenario documents, consumer responses and results cross the boundary as
//! plain Python dicts. Conversion goes through the `json` module so the
//! serde definitions on the Rust side stay the single schema.

use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn value_error(msg: impl Into<String>) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(msg.into())
}

pub(crate) fn runtime_error(msg: impl Into<String>) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(msg.into())
}

/// Deserialize a Python dict into a Rust type
///
/// # Errors
/// Raises ValueError if the dict is not JSON-serializable or does not match
/// the expected shape.
pub(crate) fn from_py_dict<T: DeserializeOwned>(dict: &Bound<'_, PyDict>) -> PyResult<T> {
    let json = dict.py().import_bound("json")?;
    let text: String = json.call_method1("dumps", (dict,))?.extract()?;
    serde_json::from_str(&text).map_err(|e| value_error(format!("Invalid configuration: {}", e)))
}

/// Serialize a Rust value into a Python object (dict, list or scalar)
pub(crate) fn to_py_object<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let text = serde_json::to_string(value)
        .map_err(|e| runtime_error(format!("Failed to serialize result: {}", e)))?;
    let json = py.import_bound("json")?;
    Ok(json.call_method1("loads", (text,))?.unbind())
}
