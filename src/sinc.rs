//! The global sinc/Debye lookup table and its q-axis.
//!
//! `sinc(x) = sin(x)/x`, with the removable singularity at x=0 handled by a direct limit
//! and small-x values handled by a truncated series so we never divide by a tiny number.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::axis::Axis;

/// `sin(x)/x`, with `sinc(0) = 1` and a series expansion for `|x| < 1e-3` (§7: "A
/// numerically tiny q·d ... replaced with the series expansion 1 − (qd)²/6 + (qd)⁴/120").
#[inline]
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        let x2 = x * x;
        1.0 - x2 / 6.0 + x2 * x2 / 120.0
    } else {
        x.sin() / x
    }
}

/// A log-spaced q-axis: `bins` points spanning `[qmin, qmax]` geometrically.
#[derive(Clone, Debug, PartialEq)]
pub struct QAxis {
    pub qmin: f64,
    pub qmax: f64,
    pub bins: usize,
    log_min: f64,
    log_step: f64,
}

impl QAxis {
    pub fn new(qmin: f64, qmax: f64, bins: usize) -> Self {
        assert!(qmin > 0.0 && qmax > qmin && bins >= 2);
        let log_min = qmin.ln();
        let log_step = (qmax.ln() - log_min) / (bins - 1) as f64;
        Self {
            qmin,
            qmax,
            bins,
            log_min,
            log_step,
        }
    }

    pub fn value(&self, bin: usize) -> f64 {
        (self.log_min + bin as f64 * self.log_step).exp()
    }

    /// The bin whose value is closest to (but not past) `value`, clamped to range.
    pub fn get_bin(&self, value: f64) -> usize {
        if value <= self.qmin {
            return 0;
        }
        if value >= self.qmax {
            return self.bins - 1;
        }
        let raw = (value.ln() - self.log_min) / self.log_step;
        raw.round().clamp(0.0, (self.bins - 1) as f64) as usize
    }

    /// Window of this axis spanning `[lo, hi]`, as a (bin offset, bin count) pair.
    pub fn sub_range(&self, lo: f64, hi: f64) -> (usize, usize) {
        let q0 = self.get_bin(lo);
        let q1 = self.get_bin(hi).max(q0);
        (q0, q1 - q0 + 1)
    }
}

/// The precomputed `sinc(q[qi] * d[di])` table over the global q-axis and a distance
/// axis, used to accelerate the Debye sum. Read-only after construction.
#[derive(Clone, Debug)]
pub struct DebyeTable {
    q_axis: QAxis,
    d_axis: Axis,
    table: Vec<f64>,
}

impl DebyeTable {
    pub fn build(q_axis: QAxis, d_axis: Axis) -> Self {
        let mut table = vec![0.0; q_axis.bins * d_axis.bins];
        for qi in 0..q_axis.bins {
            let q = q_axis.value(qi);
            for di in 0..d_axis.bins {
                let d = d_axis.center(di);
                table[qi * d_axis.bins + di] = sinc(q * d);
            }
        }
        Self {
            q_axis,
            d_axis,
            table,
        }
    }

    /// Builds the table using explicit, possibly non-uniform per-bin centers (the
    /// weighted-distribution variant, recomputed per calculation from the current
    /// weighted bin centers rather than the nominal, evenly-spaced ones).
    pub fn build_with_centers(q_axis: QAxis, d_bins: usize, centers: &[f64]) -> Self {
        debug_assert_eq!(centers.len(), d_bins);
        let mut table = vec![0.0; q_axis.bins * d_bins];
        for qi in 0..q_axis.bins {
            let q = q_axis.value(qi);
            for (di, &d) in centers.iter().enumerate() {
                table[qi * d_bins + di] = sinc(q * d);
            }
        }
        Self {
            q_axis,
            d_axis: Axis::new(0.0, 1.0, d_bins),
            table,
        }
    }

    pub fn q_axis(&self) -> &QAxis {
        &self.q_axis
    }

    pub fn d_bins(&self) -> usize {
        self.d_axis.bins
    }

    pub fn row(&self, q_bin: usize) -> &[f64] {
        let bins = self.d_axis.bins;
        &self.table[q_bin * bins..(q_bin + 1) * bins]
    }

    /// Inner product of a distance-profile slice with the sinc row at `q_bin`.
    pub fn inner_product(&self, q_bin: usize, profile: &[f64]) -> f64 {
        debug_assert_eq!(profile.len(), self.d_axis.bins);
        self.row(q_bin)
            .iter()
            .zip(profile.iter())
            .map(|(s, p)| s * p)
            .sum()
    }
}

/// Identifies a `(q_axis, d_axis)` pair bit-for-bit, so the process-wide table cache
/// below can tell two different molecules' (differently bin-resized) axes apart instead
/// of silently reusing whichever table happened to be built first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TableKey {
    qmin: u64,
    qmax: u64,
    q_bins: usize,
    d_min: u64,
    d_width: u64,
    d_bins: usize,
}

impl TableKey {
    fn new(q_axis: &QAxis, d_axis: Axis) -> Self {
        Self {
            qmin: q_axis.qmin.to_bits(),
            qmax: q_axis.qmax.to_bits(),
            q_bins: q_axis.bins,
            d_min: d_axis.min.to_bits(),
            d_width: d_axis.width.to_bits(),
            d_bins: d_axis.bins,
        }
    }
}

/// Lazily-constructed process-wide unweighted Debye tables, keyed by the exact
/// `(q_axis, d_axis)` pair used to build each one (§9: "a `DebyeTable::get_or_init` entry
/// point must be called before the first `debye_transform`"). Distance-bin counts vary
/// per molecule (histograms are resized to their last nonzero bin), so a single
/// once-initialized table would silently serve stale/mismatched bins to later callers —
/// this caches one table per distinct axis pair instead of one table overall.
static GLOBAL_TABLES: OnceLock<Mutex<HashMap<TableKey, Arc<DebyeTable>>>> = OnceLock::new();

pub fn global_table(q_axis: QAxis, d_axis: Axis) -> Arc<DebyeTable> {
    let cache = GLOBAL_TABLES.get_or_init(|| Mutex::new(HashMap::new()));
    let key = TableKey::new(&q_axis, d_axis);
    let mut guard = cache.lock().unwrap_or_else(|poison| poison.into_inner());
    if let Some(table) = guard.get(&key) {
        return table.clone();
    }
    let table = Arc::new(DebyeTable::build(q_axis, d_axis));
    guard.insert(key, table.clone());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinc_at_zero_is_one() {
        assert!((sinc(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sinc_series_matches_direct_formula_near_zero() {
        let x = 5e-4;
        let direct = x.sin() / x;
        assert!((sinc(x) - direct).abs() < 1e-12);
    }

    #[test]
    fn q_axis_is_log_spaced() {
        let axis = QAxis::new(1e-4, 1.0, 1000);
        assert!((axis.value(0) - 1e-4).abs() < 1e-9);
        assert!((axis.value(999) - 1.0).abs() < 1e-9);
        let ratio_a = axis.value(1) / axis.value(0);
        let ratio_b = axis.value(500) / axis.value(499);
        assert!((ratio_a - ratio_b).abs() < 1e-9);
    }

    #[test]
    fn sub_range_is_bin_aligned() {
        let axis = QAxis::new(1e-4, 1.0, 1000);
        let (q0, bins) = axis.sub_range(0.01, 0.1);
        assert!(q0 > 0);
        assert!(bins > 0);
    }

    #[test]
    fn global_table_keeps_distinct_axes_separate() {
        let q_axis = QAxis::new(1e-4, 1.0, 10);
        let small = global_table(q_axis.clone(), Axis::new(0.0, 0.1, 11));
        let large = global_table(q_axis.clone(), Axis::new(0.0, 0.1, 15));
        assert_eq!(small.d_bins(), 11);
        assert_eq!(large.d_bins(), 15);
        // Requesting the 11-bin axis again must return the same-shaped table, not
        // whichever one happened to be cached under the (now-shared) static first.
        let small_again = global_table(q_axis, Axis::new(0.0, 0.1, 11));
        assert_eq!(small_again.d_bins(), 11);
    }

    #[test]
    fn debye_table_inner_product_matches_manual_sum() {
        let q_axis = QAxis::new(1e-4, 1.0, 10);
        let d_axis = Axis::new(0.0, 0.1, 5);
        let table = DebyeTable::build(q_axis, d_axis);
        let profile = vec![1.0, 2.0, 0.0, 0.0, 1.0];
        let expected: f64 = table.row(3).iter().zip(profile.iter()).map(|(s, p)| s * p).sum();
        assert!((table.inner_product(3, &profile) - expected).abs() < 1e-12);
    }
}
