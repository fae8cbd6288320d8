//! Candidate selection
//!
//! Picks the winning option(s) of one search iteration.
//!
//! - **Straddle** (compliant and non-compliant rows): start from the
//!   lowest-generalized-cost compliant row, pick the non-compliant row with
//!   the smallest weighted slope relative to it, then, if that row costs
//!   more, re-pick the compliant row with the largest weighted slope relative
//!   to the non-compliant one. Returns `[compliant, non_compliant]`.
//! - **All non-compliant**: the row closest to compliance.
//! - **All compliant**: the least over-compliant row.
//!
//! Weighted slope of `row` against `base`:
//!
//! ```text
//! ratio(row) × (cost(row) − cost(base)) / (ratio(row) − ratio(base))
//! ```
//!
//! Ties resolve to the first row in table order.

use crate::models::option::{CandidateDecision, ProductionOption};

/// Ratio differences smaller than this make a slope undefined
pub const SLOPE_EPSILON: f64 = 1e-12;

/// Weighted slope, `None` when the ratio difference is degenerate
pub fn weighted_slope(row: &ProductionOption, base: &ProductionOption) -> Option<f64> {
    let d = row.strategic_compliance_ratio - base.strategic_compliance_ratio;
    if d.abs() < SLOPE_EPSILON {
        return None;
    }
    Some(
        row.strategic_compliance_ratio
            * (row.total_generalized_cost_dollars - base.total_generalized_cost_dollars)
            / d,
    )
}

/// Index of the first row minimizing `key`
fn first_min_by<T>(rows: &[T], key: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, row) in rows.iter().enumerate() {
        let k = key(row);
        match best {
            Some((_, b)) if k >= b => {}
            _ => best = Some((i, k)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the first row maximizing `key`
fn first_max_by<T>(rows: &[T], key: impl Fn(&T) -> f64) -> Option<usize> {
    first_min_by(rows, |r| -key(r))
}

/// Index of the first row with the extreme defined slope
fn first_slope_by(
    rows: &[&ProductionOption],
    base: &ProductionOption,
    maximize: bool,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, row) in rows.iter().enumerate() {
        let Some(slope) = weighted_slope(row, base) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, b)) if maximize => slope > b,
            Some((_, b)) => slope < b,
        };
        if better {
            best = Some((i, slope));
        }
    }
    best.map(|(i, _)| i)
}

/// Select winning candidate(s), marking them as winners
///
/// Returns `None` only for an empty table.
pub fn select_candidates(options: &[ProductionOption]) -> Option<CandidateDecision> {
    let (compliant, non_compliant): (Vec<&ProductionOption>, Vec<&ProductionOption>) =
        options.iter().partition(|o| o.is_compliant());

    let winners: Vec<ProductionOption> = match (compliant.is_empty(), non_compliant.is_empty()) {
        (true, true) => return None,

        (false, false) => {
            let base = compliant[first_min_by(&compliant, |o| o.total_generalized_cost_dollars)?];

            let nc = match first_slope_by(&non_compliant, base, false) {
                Some(i) => non_compliant[i],
                None => {
                    non_compliant[first_min_by(&non_compliant, |o| o.total_generalized_cost_dollars)?]
                }
            };

            let c = if nc.total_generalized_cost_dollars > base.total_generalized_cost_dollars {
                first_slope_by(&compliant, nc, true).map_or(base, |i| compliant[i])
            } else {
                base
            };

            vec![c.clone(), nc.clone()]
        }

        (true, false) => {
            let i = first_max_by(&non_compliant, |o| o.credits_with_offset())?;
            vec![non_compliant[i].clone()]
        }

        (false, true) => {
            let i = first_min_by(&compliant, |o| o.credits_with_offset())?;
            vec![compliant[i].clone()]
        }
    };

    Some(CandidateDecision {
        options: winners
            .into_iter()
            .map(|mut o| {
                o.winner = true;
                o
            })
            .collect(),
        compliance_possible: !compliant.is_empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(cost: f64, cert: f64, target: f64) -> ProductionOption {
        let ratio = cert / target.max(1.0);
        ProductionOption {
            total_generalized_cost_dollars: cost,
            total_cert_co2e_mg: cert,
            total_target_co2e_mg: target,
            total_credits_co2e_mg: target - cert,
            strategic_compliance_ratio: ratio,
            strategic_compliance_error: (1.0 - ratio).abs(),
            ..ProductionOption::default()
        }
    }

    #[test]
    fn test_straddle_returns_one_of_each() {
        let rows = vec![
            option(120.0, 90.0, 100.0),
            option(110.0, 98.0, 100.0),
            option(100.0, 105.0, 100.0),
            option(95.0, 120.0, 100.0),
        ];
        let decision = select_candidates(&rows).unwrap();
        assert_eq!(decision.options.len(), 2);
        assert!(decision.options[0].is_compliant());
        assert!(!decision.options[1].is_compliant());
        assert!(decision.compliance_possible);
        assert!(decision.options.iter().all(|o| o.winner));
    }

    #[test]
    fn test_all_non_compliant_picks_closest() {
        let rows = vec![option(100.0, 130.0, 100.0), option(90.0, 110.0, 100.0)];
        let decision = select_candidates(&rows).unwrap();
        assert_eq!(decision.options.len(), 1);
        assert_eq!(decision.options[0].total_cert_co2e_mg, 110.0);
        assert!(!decision.compliance_possible);
    }

    #[test]
    fn test_all_compliant_picks_least_over_compliant() {
        let rows = vec![option(100.0, 80.0, 100.0), option(130.0, 95.0, 100.0)];
        let decision = select_candidates(&rows).unwrap();
        assert_eq!(decision.options[0].total_cert_co2e_mg, 95.0);
    }

    #[test]
    fn test_degenerate_slopes_fall_back_to_cost() {
        // every non-compliant row shares the baseline's ratio
        let a = option(100.0, 95.0, 100.0);
        let mut b = option(90.0, 95.0, 100.0);
        let mut c = option(80.0, 95.0, 100.0);
        b.total_credits_co2e_mg = -1.0;
        c.total_credits_co2e_mg = -1.0;
        let decision = select_candidates(&[a, b, c]).unwrap();
        assert_eq!(decision.options[1].total_generalized_cost_dollars, 80.0);
        assert_eq!(decision.options[0].total_generalized_cost_dollars, 100.0);
    }

    #[test]
    fn test_empty_table() {
        assert!(select_candidates(&[]).is_none());
    }
}
