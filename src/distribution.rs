//! Distance-bin accumulators: 1D/2D/3D counters, each in a plain and a weighted variant.
//!
//! The compile-time `factor` (1 or 2) distinguishes asymmetric sweeps (atom-water, where
//! the outer loops over atoms and waters are disjoint) from symmetric ones (atom-atom,
//! water-water, where a single i<j sweep stands in for both (i,j) and (j,i)).

/// Unweighted 1D distance distribution, indexed by bin.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution1D {
    data: Vec<f64>,
}

impl Distribution1D {
    pub fn new(bins: usize) -> Self {
        Self {
            data: vec![0.0; bins],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, bin: usize) -> f64 {
        self.data[bin]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Adds `F * amount` to `data[bin]`.
    pub fn increment_index<const F: i64>(&mut self, bin: usize, amount: f64) {
        self.data[bin] += F as f64 * amount;
    }

    /// Truncates (or conceptually would grow, though growth never shrinks information
    /// since trailing bins are zero) to `new_len` bins — used by the "resize to last
    /// nonzero bin, floored at 10" step common to every manager.
    pub fn resize(&mut self, new_len: usize) {
        self.data.resize(new_len, 0.0);
    }

    /// Elementwise sum of several distributions, used to merge thread-local copies.
    pub fn merge(mut distributions: Vec<Distribution1D>) -> Distribution1D {
        let mut iter = distributions.drain(..);
        let mut acc = iter.next().unwrap_or_else(|| Distribution1D::new(0));
        for d in iter {
            for (a, b) in acc.data.iter_mut().zip(d.data.iter()) {
                *a += b;
            }
        }
        acc
    }

    pub fn add_assign(&mut self, other: &Distribution1D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    pub fn sub_assign(&mut self, other: &Distribution1D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
    }

    /// Index of the last bin holding a nonzero count, or `None` if every bin is zero.
    pub fn last_nonzero_bin(&self) -> Option<usize> {
        self.data.iter().rposition(|&v| v != 0.0)
    }
}

/// Weighted 1D distribution: tracks counts plus, per bin, the weighted sum of exact
/// distances contributing to that bin, so a refined mean bin center can be recovered.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedDistribution1D {
    counts: Vec<f64>,
    weighted_center_sum: Vec<f64>,
}

impl WeightedDistribution1D {
    pub fn new(bins: usize) -> Self {
        Self {
            counts: vec![0.0; bins],
            weighted_center_sum: vec![0.0; bins],
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn increment_index<const F: i64>(&mut self, bin: usize, amount: f64) {
        self.counts[bin] += F as f64 * amount;
    }

    /// Accumulates `amount` into the count at `bin` AND `amount * bin_center` into the
    /// weighted-center accumulator for that bin.
    pub fn increment<const F: i64>(&mut self, bin: usize, bin_center: f32, amount: f64) {
        self.counts[bin] += F as f64 * amount;
        self.weighted_center_sum[bin] += F as f64 * amount * bin_center as f64;
    }

    pub fn resize(&mut self, new_len: usize) {
        self.counts.resize(new_len, 0.0);
        self.weighted_center_sum.resize(new_len, 0.0);
    }

    /// The refined per-bin distance: `Σ(d·count)/Σcount`, falling back to the nominal
    /// bin center (passed in) when a bin has no counts at all.
    pub fn weighted_center(&self, bin: usize, nominal: f64) -> f64 {
        if self.counts[bin] == 0.0 {
            nominal
        } else {
            self.weighted_center_sum[bin] / self.counts[bin]
        }
    }

    pub fn add_assign(&mut self, other: &WeightedDistribution1D) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
        for (a, b) in self
            .weighted_center_sum
            .iter_mut()
            .zip(other.weighted_center_sum.iter())
        {
            *a += b;
        }
    }

    pub fn merge(mut distributions: Vec<WeightedDistribution1D>) -> WeightedDistribution1D {
        let mut iter = distributions.drain(..);
        let mut acc = iter.next().unwrap_or_else(|| WeightedDistribution1D::new(0));
        for d in iter {
            acc.add_assign(&d);
        }
        acc
    }
}

/// Unweighted 2D distribution, `[F][bins]`: atom(form-factor) vs water axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution2D {
    data: Vec<f64>,
    ff_count: usize,
    bins: usize,
}

impl Distribution2D {
    pub fn new(ff_count: usize, bins: usize) -> Self {
        Self {
            data: vec![0.0; ff_count * bins],
            ff_count,
            bins,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn ff_count(&self) -> usize {
        self.ff_count
    }

    #[inline]
    fn idx(&self, ff: usize, bin: usize) -> usize {
        ff * self.bins + bin
    }

    pub fn get(&self, ff: usize, bin: usize) -> f64 {
        self.data[self.idx(ff, bin)]
    }

    pub fn increment_index<const F: i64>(&mut self, ff: usize, bin: usize, amount: f64) {
        let idx = self.idx(ff, bin);
        self.data[idx] += F as f64 * amount;
    }

    /// Iterates the `bins`-length slice belonging to form-factor row `ff`.
    pub fn row(&self, ff: usize) -> &[f64] {
        &self.data[ff * self.bins..(ff + 1) * self.bins]
    }

    pub fn resize_bins(&mut self, new_bins: usize) {
        let mut new_data = vec![0.0; self.ff_count * new_bins];
        let copy_bins = new_bins.min(self.bins);
        for ff in 0..self.ff_count {
            new_data[ff * new_bins..ff * new_bins + copy_bins]
                .copy_from_slice(&self.data[ff * self.bins..ff * self.bins + copy_bins]);
        }
        self.data = new_data;
        self.bins = new_bins;
    }

    /// Sums this distribution along the form-factor axis into a 1D distance profile.
    pub fn project_1d(&self) -> Distribution1D {
        let mut out = Distribution1D::new(self.bins);
        for ff in 0..self.ff_count {
            for (b, v) in self.row(ff).iter().enumerate() {
                out.as_mut_slice()[b] += v;
            }
        }
        out
    }

    pub fn add_assign(&mut self, other: &Distribution2D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    pub fn sub_assign(&mut self, other: &Distribution2D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
    }

    pub fn merge(mut distributions: Vec<Distribution2D>) -> Distribution2D {
        let mut iter = distributions.drain(..);
        let mut acc = iter
            .next()
            .unwrap_or_else(|| Distribution2D::new(0, 0));
        for d in iter {
            acc.add_assign(&d);
        }
        acc
    }
}

/// Unweighted 3D distribution, `[F'][F'][bins]`: atom-atom pair by form-factor pair,
/// where F' includes the excluded-volume tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution3D {
    data: Vec<f64>,
    ff_count: usize,
    bins: usize,
}

impl Distribution3D {
    pub fn new(ff_count: usize, bins: usize) -> Self {
        Self {
            data: vec![0.0; ff_count * ff_count * bins],
            ff_count,
            bins,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn ff_count(&self) -> usize {
        self.ff_count
    }

    #[inline]
    fn idx(&self, ff1: usize, ff2: usize, bin: usize) -> usize {
        (ff1 * self.ff_count + ff2) * self.bins + bin
    }

    pub fn get(&self, ff1: usize, ff2: usize, bin: usize) -> f64 {
        self.data[self.idx(ff1, ff2, bin)]
    }

    pub fn increment_index<const F: i64>(&mut self, ff1: usize, ff2: usize, bin: usize, amount: f64) {
        let idx = self.idx(ff1, ff2, bin);
        self.data[idx] += F as f64 * amount;
    }

    pub fn slice(&self, ff1: usize, ff2: usize) -> &[f64] {
        let start = (ff1 * self.ff_count + ff2) * self.bins;
        &self.data[start..start + self.bins]
    }

    pub fn resize_bins(&mut self, new_bins: usize) {
        let mut new_data = vec![0.0; self.ff_count * self.ff_count * new_bins];
        let copy_bins = new_bins.min(self.bins);
        for ff1 in 0..self.ff_count {
            for ff2 in 0..self.ff_count {
                let src_start = (ff1 * self.ff_count + ff2) * self.bins;
                let dst_start = (ff1 * self.ff_count + ff2) * new_bins;
                new_data[dst_start..dst_start + copy_bins]
                    .copy_from_slice(&self.data[src_start..src_start + copy_bins]);
            }
        }
        self.data = new_data;
        self.bins = new_bins;
    }

    /// Sums this distribution along both form-factor axes into a 1D distance profile.
    pub fn project_1d(&self) -> Distribution1D {
        let mut out = Distribution1D::new(self.bins);
        for ff1 in 0..self.ff_count {
            for ff2 in 0..self.ff_count {
                for (b, v) in self.slice(ff1, ff2).iter().enumerate() {
                    out.as_mut_slice()[b] += v;
                }
            }
        }
        out
    }

    pub fn add_assign(&mut self, other: &Distribution3D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    pub fn sub_assign(&mut self, other: &Distribution3D) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
    }

    pub fn merge(mut distributions: Vec<Distribution3D>) -> Distribution3D {
        let mut iter = distributions.drain(..);
        let mut acc = iter
            .next()
            .unwrap_or_else(|| Distribution3D::new(0, 0));
        for d in iter {
            acc.add_assign(&d);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_two_doubles_contribution() {
        let mut d = Distribution1D::new(4);
        d.increment_index::<2>(1, 1.0);
        assert_eq!(d.get(1), 2.0);
    }

    #[test]
    fn merge_is_commutative_across_partitions() {
        let mut a = Distribution1D::new(4);
        a.increment_index::<1>(0, 3.0);
        let mut b = Distribution1D::new(4);
        b.increment_index::<1>(0, 4.0);
        let merged_ab = Distribution1D::merge(vec![a.clone(), b.clone()]);
        let merged_ba = Distribution1D::merge(vec![b, a]);
        assert_eq!(merged_ab, merged_ba);
        assert_eq!(merged_ab.get(0), 7.0);
    }

    #[test]
    fn weighted_center_falls_back_to_nominal_when_empty() {
        let d = WeightedDistribution1D::new(4);
        assert_eq!(d.weighted_center(2, 1.5), 1.5);
    }

    #[test]
    fn weighted_center_recovers_mean_distance() {
        let mut d = WeightedDistribution1D::new(4);
        d.increment::<1>(1, 1.0, 1.0);
        d.increment::<1>(1, 1.4, 1.0);
        assert!((d.weighted_center(1, 0.0) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn distribution_3d_projects_to_1d_by_summing_ff_axes() {
        let mut d = Distribution3D::new(2, 3);
        d.increment_index::<1>(0, 0, 1, 5.0);
        d.increment_index::<1>(1, 1, 1, 2.0);
        let proj = d.project_1d();
        assert_eq!(proj.get(1), 7.0);
    }

    #[test]
    fn last_nonzero_bin_skips_trailing_zeros() {
        let mut d = Distribution1D::new(10);
        d.increment_index::<1>(3, 1.0);
        assert_eq!(d.last_nonzero_bin(), Some(3));
    }
}
