//! Certification-emissions-to-cost curves
//!
//! A cost curve is an ordered set of samples along a vehicle's technology
//! frontier. Each sample maps a certification CO2e level (g/mi) to the
//! manufacturer cost, the generalized cost and the direct electric energy use
//! of building the vehicle at that level.
//!
//! Lookups between samples are linear; lookups outside the sampled range
//! extrapolate linearly from the nearest end segment.
//!
//! # Example
//!
//! ```rust
//! use compliance_search_core_rs::models::cost_curve::{CostCurve, CostCurvePoint};
//!
//! let curve = CostCurve::new(vec![
//!     CostCurvePoint::new(100.0, 11_000.0),
//!     CostCurvePoint::new(300.0, 10_000.0),
//! ]).unwrap();
//!
//! assert_eq!(curve.min_co2e_gpmi(), 100.0);
//! assert_eq!(curve.cost_at(200.0), 10_500.0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a cost curve
#[derive(Debug, Error, PartialEq)]
pub enum CostCurveError {
    #[error("Cost curve has no samples")]
    Empty,

    #[error("Cost curve sample {index} has a non-finite value")]
    NonFinite { index: usize },
}

/// One sample on a cost curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostCurvePoint {
    /// Certification CO2e level (g/mi)
    pub cert_co2e_gpmi: f64,

    /// Manufacturer cost at this level (dollars)
    pub cost_dollars: f64,

    /// Generalized cost at this level (dollars); defaults to the manufacturer cost
    #[serde(default)]
    pub generalized_cost_dollars: Option<f64>,

    /// Certification direct electric energy use (kWh/mi)
    #[serde(default)]
    pub cert_kwh_per_mile: f64,
}

impl CostCurvePoint {
    /// Sample with generalized cost equal to cost and no electric energy use
    pub fn new(cert_co2e_gpmi: f64, cost_dollars: f64) -> Self {
        Self {
            cert_co2e_gpmi,
            cost_dollars,
            generalized_cost_dollars: None,
            cert_kwh_per_mile: 0.0,
        }
    }

    /// Set the generalized cost of this sample
    pub fn with_generalized_cost(mut self, generalized_cost_dollars: f64) -> Self {
        self.generalized_cost_dollars = Some(generalized_cost_dollars);
        self
    }

    /// Set the electric energy use of this sample
    pub fn with_kwh_per_mile(mut self, cert_kwh_per_mile: f64) -> Self {
        self.cert_kwh_per_mile = cert_kwh_per_mile;
        self
    }

    fn generalized_cost(&self) -> f64 {
        self.generalized_cost_dollars.unwrap_or(self.cost_dollars)
    }
}

/// Ordered cost curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CostCurvePoint>", into = "Vec<CostCurvePoint>")]
pub struct CostCurve {
    /// Samples sorted by ascending `cert_co2e_gpmi`, no duplicate levels
    points: Vec<CostCurvePoint>,
}

impl CostCurve {
    /// Build a curve from unordered samples
    ///
    /// Samples are sorted by emission level. When two samples share a level,
    /// the first one given wins.
    ///
    /// # Errors
    ///
    /// Returns `CostCurveError::Empty` for an empty sample list and
    /// `CostCurveError::NonFinite` if any sample carries NaN or infinity.
    pub fn new(points: Vec<CostCurvePoint>) -> Result<Self, CostCurveError> {
        if points.is_empty() {
            return Err(CostCurveError::Empty);
        }

        for (index, p) in points.iter().enumerate() {
            let finite = p.cert_co2e_gpmi.is_finite()
                && p.cost_dollars.is_finite()
                && p.generalized_cost().is_finite()
                && p.cert_kwh_per_mile.is_finite();
            if !finite {
                return Err(CostCurveError::NonFinite { index });
            }
        }

        let mut points = points;
        points.sort_by(|a, b| a.cert_co2e_gpmi.total_cmp(&b.cert_co2e_gpmi));
        points.dedup_by(|later, earlier| later.cert_co2e_gpmi == earlier.cert_co2e_gpmi);

        Ok(Self { points })
    }

    /// Samples in ascending emission order
    pub fn points(&self) -> &[CostCurvePoint] {
        &self.points
    }

    /// Lowest sampled emission level
    pub fn min_co2e_gpmi(&self) -> f64 {
        self.points[0].cert_co2e_gpmi
    }

    /// Highest sampled emission level
    pub fn max_co2e_gpmi(&self) -> f64 {
        self.points[self.points.len() - 1].cert_co2e_gpmi
    }

    /// Manufacturer cost at an emission level
    pub fn cost_at(&self, co2e_gpmi: f64) -> f64 {
        self.interpolate(co2e_gpmi, |p| p.cost_dollars)
    }

    /// Generalized cost at an emission level
    pub fn generalized_cost_at(&self, co2e_gpmi: f64) -> f64 {
        self.interpolate(co2e_gpmi, CostCurvePoint::generalized_cost)
    }

    /// Direct electric energy use at an emission level
    pub fn kwh_per_mile_at(&self, co2e_gpmi: f64) -> f64 {
        self.interpolate(co2e_gpmi, |p| p.cert_kwh_per_mile)
    }

    fn interpolate(&self, x: f64, value: impl Fn(&CostCurvePoint) -> f64) -> f64 {
        let pts = &self.points;
        if pts.len() == 1 {
            return value(&pts[0]);
        }

        // Segment containing x, or the end segment for extrapolation
        let upper = pts
            .iter()
            .position(|p| p.cert_co2e_gpmi >= x)
            .unwrap_or(pts.len() - 1)
            .max(1);
        let (a, b) = (&pts[upper - 1], &pts[upper]);

        let span = b.cert_co2e_gpmi - a.cert_co2e_gpmi;
        let t = (x - a.cert_co2e_gpmi) / span;
        value(a) + t * (value(b) - value(a))
    }
}

impl TryFrom<Vec<CostCurvePoint>> for CostCurve {
    type Error = CostCurveError;

    fn try_from(points: Vec<CostCurvePoint>) -> Result<Self, Self::Error> {
        CostCurve::new(points)
    }
}

impl From<CostCurve> for Vec<CostCurvePoint> {
    fn from(curve: CostCurve) -> Self {
        curve.points
    }
}

/// Vehicle cost model queried by the sweep generator
///
/// Implementors answer for the levels the search samples; all slices returned
/// are parallel to the `levels` argument.
pub trait VehicleCostModel {
    /// Lowest and highest feasible certification CO2e level (g/mi)
    fn feasible_emission_range(&self) -> (f64, f64);

    /// Manufacturer cost at each level
    fn cost_at(&self, levels: &[f64]) -> Vec<f64>;

    /// Generalized cost at each level
    fn generalized_cost_at(&self, levels: &[f64]) -> Vec<f64>;

    /// Certification direct electric energy use (kWh/mi) at each level
    fn energy_use_at(&self, levels: &[f64]) -> Vec<f64>;
}

impl VehicleCostModel for CostCurve {
    fn feasible_emission_range(&self) -> (f64, f64) {
        (self.min_co2e_gpmi(), self.max_co2e_gpmi())
    }

    fn cost_at(&self, levels: &[f64]) -> Vec<f64> {
        levels.iter().map(|&l| CostCurve::cost_at(self, l)).collect()
    }

    fn generalized_cost_at(&self, levels: &[f64]) -> Vec<f64> {
        levels
            .iter()
            .map(|&l| CostCurve::generalized_cost_at(self, l))
            .collect()
    }

    fn energy_use_at(&self, levels: &[f64]) -> Vec<f64> {
        levels.iter().map(|&l| self.kwh_per_mile_at(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_curve() -> CostCurve {
        CostCurve::new(vec![
            CostCurvePoint::new(300.0, 10_000.0).with_kwh_per_mile(0.0),
            CostCurvePoint::new(100.0, 11_000.0).with_kwh_per_mile(0.2),
        ])
        .unwrap()
    }

    #[test]
    fn test_points_are_sorted() {
        let curve = linear_curve();
        assert_eq!(curve.min_co2e_gpmi(), 100.0);
        assert_eq!(curve.max_co2e_gpmi(), 300.0);
    }

    #[test]
    fn test_interpolates_inside_range() {
        let curve = linear_curve();
        assert!((curve.cost_at(150.0) - 10_750.0).abs() < 1e-9);
        assert!((curve.kwh_per_mile_at(200.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolates_outside_range() {
        let curve = linear_curve();
        assert!((curve.cost_at(50.0) - 11_250.0).abs() < 1e-9);
        assert!((curve.cost_at(400.0) - 9_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_point_curve_is_constant() {
        let curve = CostCurve::new(vec![CostCurvePoint::new(0.0, 40_000.0)]).unwrap();
        assert_eq!(curve.cost_at(-10.0), 40_000.0);
        assert_eq!(curve.cost_at(10.0), 40_000.0);
    }

    #[test]
    fn test_generalized_cost_defaults_to_cost() {
        let curve = linear_curve();
        assert_eq!(curve.generalized_cost_at(200.0), curve.cost_at(200.0));
    }

    #[test]
    fn test_rejects_empty_and_nan() {
        assert_eq!(CostCurve::new(vec![]), Err(CostCurveError::Empty));
        assert_eq!(
            CostCurve::new(vec![CostCurvePoint::new(f64::NAN, 1.0)]),
            Err(CostCurveError::NonFinite { index: 0 })
        );
    }
}
