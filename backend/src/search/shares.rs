//! Share constraint solver
//!
//! Enumerates share vectors over sibling categories. Every vector sums to 1
//! within `SHARE_TOLERANCE` and every component lies within its category's
//! bounds.
//!
//! The first `n − 1` categories are sampled on an evenly spaced grid; the
//! last category takes the residual `1 − Σ others` and the combination is
//! kept only when the residual is within that category's bounds.

use crate::policy::constraints::{ShareBounds, SHARE_TOLERANCE};
use std::collections::BTreeMap;

/// A share per category path
pub type ShareVector = BTreeMap<String, f64>;

/// `count` evenly spaced values from `lo` to `hi` inclusive
///
/// A single value (`lo`) when `count <= 1` or the range is degenerate.
pub fn linspace(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    if count <= 1 || (hi - lo).abs() < SHARE_TOLERANCE {
        return vec![lo];
    }
    let step = (hi - lo) / (count - 1) as f64;
    (0..count)
        .map(|i| if i + 1 == count { hi } else { lo + step * i as f64 })
        .collect()
}

/// Sort and drop values equal within tolerance
pub fn dedup_sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup_by(|a, b| (*a - *b).abs() < SHARE_TOLERANCE);
    values
}

fn bounds_of(bounds: &BTreeMap<String, ShareBounds>, category: &str) -> ShareBounds {
    bounds.get(category).copied().unwrap_or(ShareBounds::UNBOUNDED)
}

/// Span the whole feasible simplex
///
/// # Example
///
/// ```rust
/// use compliance_search_core_rs::search::shares::partition;
/// use std::collections::BTreeMap;
///
/// let categories = vec!["BEV".to_string(), "ICE".to_string()];
/// let rows = partition(&categories, 5, &BTreeMap::new());
/// assert_eq!(rows.len(), 5);
/// assert!(rows.iter().all(|r| (r.values().sum::<f64>() - 1.0).abs() < 1e-9));
/// ```
pub fn partition(
    categories: &[String],
    level_count: usize,
    bounds: &BTreeMap<String, ShareBounds>,
) -> Vec<ShareVector> {
    let axes = categories
        .iter()
        .take(categories.len().saturating_sub(1))
        .map(|c| {
            let b = bounds_of(bounds, c);
            linspace(b.min, b.max, level_count)
        })
        .collect::<Vec<_>>();

    combine(categories, &axes, bounds)
}

/// Sample shares near a prior share vector
///
/// Each of the first `n − 1` axes spans `[prior − half_range, prior + half_range]`
/// intersected with the category bounds and always contains the prior value
/// itself.
pub fn nearby_shares(
    categories: &[String],
    prior: &ShareVector,
    half_range: f64,
    level_count: usize,
    bounds: &BTreeMap<String, ShareBounds>,
) -> Vec<ShareVector> {
    let axes = categories
        .iter()
        .take(categories.len().saturating_sub(1))
        .map(|c| {
            let b = bounds_of(bounds, c);
            let center = b.clamp(prior.get(c).copied().unwrap_or(b.min));
            let lo = b.min.max(center - half_range);
            let hi = b.max.min(center + half_range);
            let mut axis = linspace(lo, hi, level_count);
            axis.push(center);
            dedup_sorted(axis)
        })
        .collect::<Vec<_>>();

    combine(categories, &axes, bounds)
}

/// Cartesian product of the axes, closed by the residual category
fn combine(
    categories: &[String],
    axes: &[Vec<f64>],
    bounds: &BTreeMap<String, ShareBounds>,
) -> Vec<ShareVector> {
    let Some(last) = categories.last() else {
        return vec![ShareVector::new()];
    };
    let last_bounds = bounds_of(bounds, last);

    let mut out = Vec::new();
    let mut current = Vec::with_capacity(axes.len());
    walk(axes, 0.0, &mut current, &mut |prefix: &[f64], sum: f64| {
        let residual = 1.0 - sum;
        if !last_bounds.contains(residual) {
            return;
        }
        let mut row: ShareVector = categories
            .iter()
            .zip(prefix.iter())
            .map(|(c, v)| (c.clone(), *v))
            .collect();
        row.insert(last.clone(), last_bounds.clamp(residual.max(0.0)));
        out.push(row);
    });
    out
}

fn walk(axes: &[Vec<f64>], sum: f64, current: &mut Vec<f64>, emit: &mut dyn FnMut(&[f64], f64)) {
    match axes.split_first() {
        None => emit(current.as_slice(), sum),
        Some((axis, rest)) => {
            for &v in axis {
                if sum + v > 1.0 + SHARE_TOLERANCE {
                    continue;
                }
                current.push(v);
                walk(rest, sum + v, current, emit);
                current.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn bounds(entries: &[(&str, f64, f64)]) -> BTreeMap<String, ShareBounds> {
        entries
            .iter()
            .map(|(c, min, max)| (c.to_string(), ShareBounds { min: *min, max: *max }))
            .collect()
    }

    #[test]
    fn test_linspace_endpoints() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(0.2, 0.8, 1), vec![0.2]);
        assert_eq!(linspace(0.3, 0.3, 5), vec![0.3]);
    }

    #[test]
    fn test_partition_three_way() {
        let rows = partition(&cats(&["A", "B", "C"]), 3, &BTreeMap::new());
        // (0,0,1) (0,.5,.5) (0,1,0) (.5,0,.5) (.5,.5,0) (1,0,0)
        assert_eq!(rows.len(), 6);
        for row in &rows {
            assert!((row.values().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fixed_split_is_reproduced() {
        let b = bounds(&[("A", 0.3, 0.3), ("B", 0.7, 0.7)]);
        let rows = partition(&cats(&["A", "B"]), 5, &b);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["A"], 0.3);
        assert_eq!(rows[0]["B"], 0.7);
    }

    #[test]
    fn test_nearby_includes_prior_and_respects_bounds() {
        let b = bounds(&[("BEV", 0.0, 0.4), ("ICE", 0.0, 1.0)]);
        let prior: ShareVector = [("BEV".to_string(), 0.35), ("ICE".to_string(), 0.65)]
            .into_iter()
            .collect();
        let rows = nearby_shares(&cats(&["BEV", "ICE"]), &prior, 0.25, 5, &b);

        assert!(rows.iter().any(|r| (r["BEV"] - 0.35).abs() < 1e-12));
        assert!(rows.iter().all(|r| r["BEV"] >= 0.1 - 1e-12 && r["BEV"] <= 0.4 + 1e-12));
        assert!(rows.iter().all(|r| (r.values().sum::<f64>() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_single_category_takes_everything() {
        let rows = partition(&cats(&["only"]), 5, &BTreeMap::new());
        assert_eq!(rows, vec![[("only".to_string(), 1.0)].into_iter().collect()]);
    }
}
