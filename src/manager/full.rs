//! Full-recompute Histogram Manager: builds a Composite Distance Histogram from scratch
//! using all cores (§4.3).

use rayon::prelude::*;

use crate::coords::{CompactCoordinatesXyzff, CompactCoordinatesXyzw};
use crate::distribution::{Distribution1D, Distribution2D, Distribution3D};
use crate::model::{AtomFF, FfTag, Water};

/// `F'` — the number of form-factor tags indexing `aa`/`aw`, including the excluded-
/// volume tag but not the water tag (§3).
pub const FF_PRIME_COUNT: usize = FfTag::ATOM_TAG_COUNT + 1;

/// The three raw distributions a full (or partial) histogram manager produces, before
/// any Debye-transform caching is layered on top.
#[derive(Clone, Debug)]
pub struct RawHistogram {
    pub aa: Distribution3D,
    pub aw: Distribution2D,
    pub ww: Distribution1D,
}

impl RawHistogram {
    pub fn new(bins: usize) -> Self {
        Self {
            aa: Distribution3D::new(FF_PRIME_COUNT, bins),
            aw: Distribution2D::new(FF_PRIME_COUNT, bins),
            ww: Distribution1D::new(bins),
        }
    }

    pub fn bins(&self) -> usize {
        self.ww.len()
    }

    /// Last nonzero bin across all three distributions (§4.3 step 8), or `None` if the
    /// whole histogram is empty.
    pub fn last_nonzero_bin(&self) -> Option<usize> {
        let aa_last = self.aa.project_1d().last_nonzero_bin();
        let aw_last = self.aw.project_1d().last_nonzero_bin();
        let ww_last = self.ww.last_nonzero_bin();
        [aa_last, aw_last, ww_last].into_iter().flatten().max()
    }

    /// Resizes all three distributions to `new_bins`, per the "floor 10, loop-exclusive"
    /// rule in §4.3 step 8.
    pub fn resize_to_max_bin(&mut self) {
        let max_bin = self.last_nonzero_bin().unwrap_or(0).max(9) + 1;
        self.aa.resize_bins(max_bin);
        self.aw.resize_bins(max_bin);
        self.ww.resize(max_bin);
    }

    pub fn add_assign(&mut self, other: &RawHistogram) {
        self.aa.add_assign(&other.aa);
        self.aw.add_assign(&other.aw);
        self.ww.add_assign(&other.ww);
    }

    pub fn sub_assign(&mut self, other: &RawHistogram) {
        self.aa.sub_assign(&other.aa);
        self.aw.sub_assign(&other.aw);
        self.ww.sub_assign(&other.ww);
    }
}

#[inline]
fn bin_in_range(bin: i32, bins: usize) -> Option<usize> {
    if bin >= 0 && (bin as usize) < bins {
        Some(bin as usize)
    } else {
        #[cfg(debug_assertions)]
        {
            let err = crate::error::SaxsError::out_of_range(&format!(
                "rounded distance bin {bin} exceeds allocated bin count {bins}"
            ));
            debug_assert!(false, "{err}");
        }
        None
    }
}

/// Sweeps the atom-atom upper triangle (i<j) of `atoms`, factor 2, into a fresh
/// `Distribution3D`, using the 8/4/1 stride bands of §4.3 step 2.
fn sweep_atom_atom(
    ff_store: &CompactCoordinatesXyzff,
    w_store: &CompactCoordinatesXyzw,
    bins: usize,
    inv_bin_width: f32,
    job_size: usize,
) -> Distribution3D {
    let n = ff_store.len();
    (0..n)
        .into_par_iter()
        .with_min_len(job_size.max(1))
        .fold(
            || Distribution3D::new(FF_PRIME_COUNT, bins),
            |mut acc, i| {
                let a_ff = ff_store.record(i);
                let a_w = w_store.record(i);
                let mut j = i + 1;
                while j + 7 < n {
                    let b_ff: [_; 8] = std::array::from_fn(|k| ff_store.record(j + k));
                    let b_w: [_; 8] = std::array::from_fn(|k| w_store.record(j + k));
                    let (bins_dist, ff2) =
                        crate::kernel::evaluate_rounded_octo_xyzff(a_ff, b_ff, inv_bin_width);
                    let (_, weights) = crate::kernel::evaluate_rounded_octo_xyzw(a_w, b_w, inv_bin_width);
                    for k in 0..8 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<2>(a_ff.ff_index as usize, ff2[k] as usize, bin, weights[k] as f64);
                        }
                    }
                    j += 8;
                }
                while j + 3 < n {
                    let b_ff: [_; 4] = std::array::from_fn(|k| ff_store.record(j + k));
                    let b_w: [_; 4] = std::array::from_fn(|k| w_store.record(j + k));
                    let (bins_dist, ff2) =
                        crate::kernel::evaluate_rounded_quad_xyzff(a_ff, b_ff, inv_bin_width);
                    let (_, weights) = crate::kernel::evaluate_rounded_quad_xyzw(a_w, b_w, inv_bin_width);
                    for k in 0..4 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<2>(a_ff.ff_index as usize, ff2[k] as usize, bin, weights[k] as f64);
                        }
                    }
                    j += 4;
                }
                while j < n {
                    let (bin, ff1, ff2) =
                        crate::kernel::evaluate_rounded_xyzff(a_ff, ff_store.record(j), inv_bin_width);
                    let (_, weight) = crate::kernel::evaluate_rounded_xyzw(a_w, w_store.record(j), inv_bin_width);
                    if let Some(bin) = bin_in_range(bin, bins) {
                        acc.increment_index::<2>(ff1 as usize, ff2 as usize, bin, weight as f64);
                    }
                    j += 1;
                }
                acc
            },
        )
        .reduce(
            || Distribution3D::new(FF_PRIME_COUNT, bins),
            |mut a, b| {
                a.add_assign(&b);
                a
            },
        )
}

/// Sweeps every atom against every water, factor 1 (§4.3 step 3).
fn sweep_atom_water(
    atom_ff: &CompactCoordinatesXyzff,
    atom_w: &CompactCoordinatesXyzw,
    water_w: &CompactCoordinatesXyzw,
    bins: usize,
    inv_bin_width: f32,
    job_size: usize,
) -> Distribution2D {
    let n_atoms = atom_ff.len();
    let n_waters = water_w.len();
    (0..n_atoms)
        .into_par_iter()
        .with_min_len(job_size.max(1))
        .fold(
            || Distribution2D::new(FF_PRIME_COUNT, bins),
            |mut acc, i| {
                let a_ff = atom_ff.record(i);
                let a_w = atom_w.record(i);
                let mut j = 0usize;
                while j + 7 < n_waters {
                    let b_w: [_; 8] = std::array::from_fn(|k| water_w.record(j + k));
                    let (bins_dist, weights) = crate::kernel::evaluate_rounded_octo_xyzw(a_w, b_w, inv_bin_width);
                    for k in 0..8 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<1>(a_ff.ff_index as usize, bin, weights[k] as f64);
                        }
                    }
                    j += 8;
                }
                while j + 3 < n_waters {
                    let b_w: [_; 4] = std::array::from_fn(|k| water_w.record(j + k));
                    let (bins_dist, weights) = crate::kernel::evaluate_rounded_quad_xyzw(a_w, b_w, inv_bin_width);
                    for k in 0..4 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<1>(a_ff.ff_index as usize, bin, weights[k] as f64);
                        }
                    }
                    j += 4;
                }
                while j < n_waters {
                    let (bin, weight) = crate::kernel::evaluate_rounded_xyzw(a_w, water_w.record(j), inv_bin_width);
                    if let Some(bin) = bin_in_range(bin, bins) {
                        acc.increment_index::<1>(a_ff.ff_index as usize, bin, weight as f64);
                    }
                    j += 1;
                }
                acc
            },
        )
        .reduce(
            || Distribution2D::new(FF_PRIME_COUNT, bins),
            |mut a, b| {
                a.add_assign(&b);
                a
            },
        )
}

/// Sweeps the water-water upper triangle (i<j), factor 2 (§4.3 step 4).
fn sweep_water_water(
    water_w: &CompactCoordinatesXyzw,
    bins: usize,
    inv_bin_width: f32,
    job_size: usize,
) -> Distribution1D {
    let n = water_w.len();
    (0..n)
        .into_par_iter()
        .with_min_len(job_size.max(1))
        .fold(
            || Distribution1D::new(bins),
            |mut acc, i| {
                let a = water_w.record(i);
                let mut j = i + 1;
                while j + 7 < n {
                    let b: [_; 8] = std::array::from_fn(|k| water_w.record(j + k));
                    let (bins_dist, weights) = crate::kernel::evaluate_rounded_octo_xyzw(a, b, inv_bin_width);
                    for k in 0..8 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<2>(bin, weights[k] as f64);
                        }
                    }
                    j += 8;
                }
                while j + 3 < n {
                    let b: [_; 4] = std::array::from_fn(|k| water_w.record(j + k));
                    let (bins_dist, weights) = crate::kernel::evaluate_rounded_quad_xyzw(a, b, inv_bin_width);
                    for k in 0..4 {
                        if let Some(bin) = bin_in_range(bins_dist[k], bins) {
                            acc.increment_index::<2>(bin, weights[k] as f64);
                        }
                    }
                    j += 4;
                }
                while j < n {
                    let (bin, weight) = crate::kernel::evaluate_rounded_xyzw(a, water_w.record(j), inv_bin_width);
                    if let Some(bin) = bin_in_range(bin, bins) {
                        acc.increment_index::<2>(bin, weight as f64);
                    }
                    j += 1;
                }
                acc
            },
        )
        .reduce(
            || Distribution1D::new(bins),
            |mut a, b| {
                a.add_assign(&b);
                a
            },
        )
}

/// Adds self-correlations: `w_i * w_i` at bin 0 of `(ff_i, ff_i)` for every atom, and
/// `w_i * w_i` at bin 0 of `ww` for every water (§4.3 step 7; the water rule is the
/// general weighted form, which reduces to a plain count when every weight is 1).
///
/// `mirror_exv_self` additionally routes the same atom self term into the `(E, E)` slice
/// (Average/Explicit-exv, §9: added unconditionally even with no physically meaningful
/// excluded volume). Grid-exv variants pass `false` here, since the dummy points supply
/// their own `(E, E)` self term through the ordinary pairwise sweep instead (§9).
fn add_self_correlations(hist: &mut RawHistogram, atoms: &[AtomFF], waters: &[Water], mirror_exv_self: bool) {
    let exv_index = FfTag::ExcludedVolume.index();
    for atom in atoms {
        let w2 = atom.weight * atom.weight;
        let ff = atom.ff_tag.index();
        hist.aa.increment_index::<1>(ff, ff, 0, w2);
        if mirror_exv_self {
            hist.aa.increment_index::<1>(exv_index, exv_index, 0, w2);
        }
    }
    for water in waters {
        hist.ww.increment_index::<1>(0, water.weight * water.weight);
    }
}

/// Mirrors the just-built atom-atom counts into the `ax` and `xx` slices of the same
/// `aa` distribution, for the Average/Explicit-exv variants (§4.3: "the accumulator
/// additionally increments atom-atom counts into the ax and xx 3D slices mirroring the
/// aa counts"). Average-exv models each atom as colocated with its own excluded-volume
/// dummy, so an atom-atom pair at a given bin is, at the same distance, also an
/// atom-dummy pair (twice, once from each side) and a dummy-dummy pair; since every
/// operation here is a sum over pairs, mirroring the already-aggregated `(t1, t2, bin)`
/// counts is equivalent to mirroring each pair individually.
fn mirror_exv_slices(aa: &mut Distribution3D) {
    let f = FfTag::ATOM_TAG_COUNT;
    let exv_index = FfTag::ExcludedVolume.index();
    let bins = aa.bins();
    for t1 in 0..f {
        for t2 in 0..f {
            for bin in 0..bins {
                let c = aa.get(t1, t2, bin);
                if c != 0.0 {
                    aa.increment_index::<1>(t1, exv_index, bin, c);
                    aa.increment_index::<1>(t2, exv_index, bin, c);
                    aa.increment_index::<1>(exv_index, exv_index, bin, c);
                }
            }
        }
    }
}

/// Builds a full Composite Distance Histogram's raw distributions at a fixed bin count,
/// without the final "resize to last nonzero bin" step — used internally by code that
/// needs to combine several such histograms (same bin count) before trimming, e.g. the
/// symmetry manager's per-image accumulation.
pub(crate) fn calculate_full_fixed_bins(
    atoms: &[AtomFF],
    waters: &[Water],
    bin_width: f64,
    bin_count: usize,
    job_size: usize,
) -> RawHistogram {
    let inv_bin_width = (1.0 / bin_width) as f32;

    let atom_ff_store = CompactCoordinatesXyzff::from_atoms(atoms);
    let atom_w_store = CompactCoordinatesXyzw::from_atoms(atoms);
    let water_w_store = CompactCoordinatesXyzw::from_waters(waters);

    let aa = sweep_atom_atom(&atom_ff_store, &atom_w_store, bin_count, inv_bin_width, job_size);
    let aw = sweep_atom_water(
        &atom_ff_store,
        &atom_w_store,
        &water_w_store,
        bin_count,
        inv_bin_width,
        job_size,
    );
    let ww = sweep_water_water(&water_w_store, bin_count, inv_bin_width, job_size);

    let mut hist = RawHistogram { aa, aw, ww };
    add_self_correlations(&mut hist, atoms, waters, false);
    hist
}

/// Builds a full Composite Distance Histogram's raw distributions from an Atomic Model's
/// flattened atom and water lists, using all cores (§4.3).
pub fn calculate_full(
    atoms: &[AtomFF],
    waters: &[Water],
    bin_width: f64,
    bin_count: usize,
    job_size: usize,
) -> RawHistogram {
    let mut hist = calculate_full_fixed_bins(atoms, waters, bin_width, bin_count, job_size);
    hist.resize_to_max_bin();
    hist
}

/// Builds a full Composite Distance Histogram with the Average/Explicit-exv accumulation
/// protocol layered on top of the plain atom-atom sweep: after the ordinary aa/aw/ww
/// sweeps, the atom-atom counts are mirrored into the `ax`/`xx` slices before the atom
/// self-correlation (which also lands in `(E, E, 0)` for this variant) is applied (§4.7).
pub fn calculate_full_with_exv_mirror(
    atoms: &[AtomFF],
    waters: &[Water],
    bin_width: f64,
    bin_count: usize,
    job_size: usize,
) -> RawHistogram {
    let inv_bin_width = (1.0 / bin_width) as f32;

    let atom_ff_store = CompactCoordinatesXyzff::from_atoms(atoms);
    let atom_w_store = CompactCoordinatesXyzw::from_atoms(atoms);
    let water_w_store = CompactCoordinatesXyzw::from_waters(waters);

    let mut aa = sweep_atom_atom(&atom_ff_store, &atom_w_store, bin_count, inv_bin_width, job_size);
    mirror_exv_slices(&mut aa);
    let aw = sweep_atom_water(
        &atom_ff_store,
        &atom_w_store,
        &water_w_store,
        bin_count,
        inv_bin_width,
        job_size,
    );
    let ww = sweep_water_water(&water_w_store, bin_count, inv_bin_width, job_size);

    let mut hist = RawHistogram { aa, aw, ww };
    add_self_correlations(&mut hist, atoms, waters, true);
    hist.resize_to_max_bin();
    hist
}

/// Builds a full Composite Distance Histogram with the Grid-exv accumulation protocol:
/// an external voxel-grid collaborator has already placed `dummies` (position, weight)
/// pairs around the model (§4.7). Real atoms and dummy points are swept together as a
/// single combined set tagged `ExcludedVolume` for the dummies, so the ordinary
/// atom-atom sweep produces `aa` (real-tag slots), `ax` (mixed slots) and `xx` (the
/// `(E, E)` slot) in one pass; atoms and dummies each supply their own self-correlation,
/// so the atom self term does *not* additionally mirror into `(E, E, 0)` here (§9).
pub fn calculate_full_grid_exv(
    atoms: &[AtomFF],
    dummies: &[(lin_alg::f64::Vec3, f64)],
    waters: &[Water],
    bin_width: f64,
    bin_count: usize,
    job_size: usize,
) -> RawHistogram {
    let inv_bin_width = (1.0 / bin_width) as f32;

    let dummy_atoms: Vec<AtomFF> = dummies
        .iter()
        .map(|&(position, weight)| AtomFF {
            position,
            ff_tag: FfTag::ExcludedVolume,
            weight,
        })
        .collect();
    let combined: Vec<AtomFF> = atoms.iter().copied().chain(dummy_atoms.iter().copied()).collect();

    let combined_ff_store = CompactCoordinatesXyzff::from_atoms(&combined);
    let combined_w_store = CompactCoordinatesXyzw::from_atoms(&combined);
    let atom_ff_store = CompactCoordinatesXyzff::from_atoms(atoms);
    let atom_w_store = CompactCoordinatesXyzw::from_atoms(atoms);
    let water_w_store = CompactCoordinatesXyzw::from_waters(waters);

    let aa = sweep_atom_atom(&combined_ff_store, &combined_w_store, bin_count, inv_bin_width, job_size);
    let aw = sweep_atom_water(
        &atom_ff_store,
        &atom_w_store,
        &water_w_store,
        bin_count,
        inv_bin_width,
        job_size,
    );
    let ww = sweep_water_water(&water_w_store, bin_count, inv_bin_width, job_size);

    let mut hist = RawHistogram { aa, aw, ww };
    add_self_correlations(&mut hist, &combined, waters, false);
    hist.resize_to_max_bin();
    hist
}

#[cfg(test)]
mod tests {
    use super::*;
    use lin_alg::f64::Vec3;

    fn carbon(x: f64, y: f64, z: f64) -> AtomFF {
        AtomFF {
            position: Vec3::new(x, y, z),
            ff_tag: FfTag::C,
            weight: 1.0,
        }
    }

    /// Concrete scenario 1: unit cube of eight carbons.
    #[test]
    fn unit_cube_of_eight_carbons_matches_expected_bin_counts() {
        let mut atoms = Vec::new();
        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    atoms.push(carbon(sx, sy, sz));
                }
            }
        }
        let bin_width = 0.01;
        let hist = calculate_full(&atoms, &[], bin_width, 2000, 4);
        let proj = hist.aa.project_1d();

        let bin_of = |d: f64| (d / bin_width).round() as usize;
        assert_eq!(proj.get(0), 8.0);
        assert_eq!(proj.get(bin_of(2.0)), 24.0);
        assert_eq!(proj.get(bin_of(8.0_f64.sqrt())), 24.0);
        assert_eq!(proj.get(bin_of(12.0_f64.sqrt())), 8.0);
    }

    #[test]
    fn running_twice_is_bitwise_identical() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.), carbon(0., 1., 0.)];
        let a = calculate_full(&atoms, &[], 0.1, 200, 1);
        let b = calculate_full(&atoms, &[], 0.1, 200, 1);
        assert_eq!(a.aa.project_1d(), b.aa.project_1d());
        assert_eq!(a.ww, b.ww);
    }

    #[test]
    fn single_atom_has_only_self_correlation() {
        let atoms = vec![carbon(0., 0., 0.)];
        let hist = calculate_full(&atoms, &[], 0.1, 50, 1);
        let proj = hist.aa.project_1d();
        assert_eq!(proj.get(0), 1.0);
        assert_eq!(proj.as_slice().iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn cube_with_central_water_matches_scenario_three() {
        let mut atoms = Vec::new();
        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    atoms.push(carbon(sx, sy, sz));
                }
            }
        }
        let waters = vec![Water {
            position: Vec3::new_zero(),
            weight: 1.0,
        }];
        let bin_width = 0.01;
        let hist = calculate_full(&atoms, &waters, bin_width, 2000, 4);
        let bin_of = |d: f64| (d / bin_width).round() as usize;

        let aa_proj = hist.aa.project_1d();
        assert_eq!(aa_proj.get(0), 8.0);
        assert_eq!(aa_proj.get(bin_of(2.0)), 24.0);

        let aw_proj = hist.aw.project_1d();
        assert_eq!(aw_proj.get(bin_of(3.0_f64.sqrt())), 16.0);

        assert_eq!(hist.ww.get(0), 1.0);
    }

    #[test]
    fn exv_mirror_duplicates_aa_counts_into_ax_and_xx() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.)];
        let hist = calculate_full_with_exv_mirror(&atoms, &[], 0.1, 50, 1);
        let exv_index = FfTag::ExcludedVolume.index();
        let c_index = FfTag::C.index();
        let bin_of = |d: f64| (d / 0.1).round() as usize;
        let cross_bin = bin_of(1.0);

        // The cross pair (distance 1.0) appears once in aa[C,C], mirrored once more into
        // each of ax's two slots and once into xx, all with the same magnitude.
        let aa_cross = hist.aa.get(c_index, c_index, cross_bin);
        assert!(aa_cross > 0.0);
        assert_eq!(hist.aa.get(c_index, exv_index, cross_bin), aa_cross);
        assert_eq!(hist.aa.get(exv_index, exv_index, cross_bin), aa_cross);

        // Self-correlation: two atoms contribute w_i^2=1 each to (C,C,0) and also (E,E,0).
        assert_eq!(hist.aa.get(c_index, c_index, 0), 2.0);
        assert_eq!(hist.aa.get(exv_index, exv_index, 0), 2.0);
    }

    #[test]
    fn grid_exv_self_correlation_excludes_double_counting() {
        let atoms = vec![carbon(0., 0., 0.)];
        let dummies = vec![(Vec3::new(5., 0., 0.), 1.0)];
        let hist = calculate_full_grid_exv(&atoms, &dummies, &[], 0.1, 100, 1);
        let exv_index = FfTag::ExcludedVolume.index();
        let c_index = FfTag::C.index();

        // One atom and one dummy each contribute their own self term; the atom's self
        // term does not additionally mirror into (E, E, 0).
        assert_eq!(hist.aa.get(c_index, c_index, 0), 1.0);
        assert_eq!(hist.aa.get(exv_index, exv_index, 0), 1.0);
    }
}
