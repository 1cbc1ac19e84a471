//! The Composite Distance Histogram: the Debye-transform engine sitting on top of a
//! Histogram Manager's raw `aa`/`aw`/`ww` distributions (§4.6).
//!
//! Three cache layers sit between "a manager replaced the distance counts" and "the
//! caller wants `I(q)`":
//!
//! 1. `distance_profiles` — `p_aa`, `p_aw`, `p_ww`, the 1D projections of `aa`/`aw`/`ww`
//!    along their form-factor axes. Cheap, recomputed whenever the distributions are
//!    replaced.
//! 2. `sinqd` — the inner product of every `(t1, t2)` slice of `aa` (and every `t` slice
//!    of `aw`, and `ww` itself) with the global sinc/Debye table, across the *entire*
//!    process q-axis. Invalidated only when the distributions are replaced — cw/cx
//!    changes don't touch this layer.
//! 3. `intensity_profiles` — the six q-indexed sub-terms (`aa`, `ax`, `xx`, `aw`, `wx`,
//!    `ww`) that `debye_transform` combines. `aa` only depends on `sinqd`; `ax`/`xx` also
//!    depend on `cx` (the excluded-volume scaling strategy may itself be a function of
//!    cx, e.g. `GridExv::Volume`); `aw`/`ww` also depend on `cw`; `wx` depends on both.

use std::sync::Arc;

use rayon::prelude::*;

use crate::axis::Axis;
use crate::distribution::{Distribution1D, Distribution2D, Distribution3D};
use crate::error::{SaxsError, SaxsResult};
use crate::formfactor::{coefficients, ExvStrategy};
use crate::manager::full::{RawHistogram, FF_PRIME_COUNT};
use crate::model::FfTag;
use crate::sinc::{global_table, DebyeTable, QAxis};

/// A computed scattering profile: parallel `q` and `intensity` vectors over the
/// configured output q-range.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatteringProfile {
    pub q: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl ScatteringProfile {
    fn combine(profiles: &[(&ScatteringProfile, f64)]) -> ScatteringProfile {
        let q = profiles[0].0.q.clone();
        let len = q.len();
        let mut intensity = vec![0.0; len];
        for (p, coeff) in profiles {
            for (out, v) in intensity.iter_mut().zip(p.intensity.iter()) {
                *out += coeff * v;
            }
        }
        ScatteringProfile { q, intensity }
    }
}

/// Cached sinc-table inner products, one value per global q-bin per relevant
/// form-factor slice. Invalidated only by `replace_distributions`.
#[derive(Clone, Debug)]
struct SinqdCache {
    /// `aa[t1 * F + t2][q]`, over the 13x13 atomic tags (excludes `E`; handled below).
    aa: Vec<Vec<f64>>,
    /// `ax[t][q]`: `(t, E)` slice of `aa`.
    ax: Vec<Vec<f64>>,
    /// `(E, E)` slice of `aa`.
    xx: Vec<f64>,
    /// `aw[t][q]`.
    aw: Vec<Vec<f64>>,
    /// `(E)` row of `aw`.
    wx: Vec<f64>,
    /// `ww` itself.
    ww: Vec<f64>,
}

#[derive(Clone, Debug)]
struct IntensityProfiles {
    aa: Vec<f64>,
    ax: Vec<f64>,
    xx: Vec<f64>,
    aw: Vec<f64>,
    wx: Vec<f64>,
    ww: Vec<f64>,
}

impl IntensityProfiles {
    fn zeroed(q_bins: usize) -> Self {
        Self {
            aa: vec![0.0; q_bins],
            ax: vec![0.0; q_bins],
            xx: vec![0.0; q_bins],
            aw: vec![0.0; q_bins],
            wx: vec![0.0; q_bins],
            ww: vec![0.0; q_bins],
        }
    }
}

/// The nested cached Debye transform (§4.6). Owns the raw distributions it was built
/// from, the form-factor-coupling free parameters `cw`/`cx`, and the excluded-volume
/// strategy that defines `F_E(q)`.
pub struct CompositeHistogram {
    aa: Distribution3D,
    aw: Distribution2D,
    ww: Distribution1D,
    p_aa: Distribution1D,
    p_aw: Distribution1D,
    p_ww: Distribution1D,
    d_axis: Axis,
    q_axis: QAxis,
    qmin: f64,
    qmax: f64,
    cw: f64,
    cx: f64,
    exv_strategy: Box<dyn ExvStrategy>,
    sinqd: Option<SinqdCache>,
    intensity: IntensityProfiles,
    cached_cw: f64,
    cached_cx: f64,
    /// Per-bin distance centers actually used to build the sinc table: the nominal
    /// `Axis::center` values, or, for the weighted-distribution variant, the refined
    /// per-bin weighted centers supplied at construction (§4.6, §9).
    weighted_centers: Option<Vec<f64>>,
}

impl CompositeHistogram {
    /// Builds a new Composite Distance Histogram from a Histogram Manager's raw output.
    /// `weighted_centers`, when supplied, must have one entry per distance bin and
    /// triggers the weighted-distribution Debye table (`DebyeTable::build_with_centers`);
    /// `None` uses the process-wide unweighted table (§9).
    pub fn new(
        raw: RawHistogram,
        d_axis: Axis,
        q_axis: QAxis,
        exv_strategy: Box<dyn ExvStrategy>,
        weighted_centers: Option<Vec<f64>>,
    ) -> SaxsResult<Self> {
        if raw.bins() != d_axis.bins {
            return Err(SaxsError::inconsistent_state(&format!(
                "raw histogram has {} bins but d_axis has {}",
                raw.bins(),
                d_axis.bins
            )));
        }
        if let Some(centers) = &weighted_centers
            && centers.len() != d_axis.bins
        {
            return Err(SaxsError::inconsistent_state(&format!(
                "weighted centers has {} entries but d_axis has {} bins",
                centers.len(),
                d_axis.bins
            )));
        }
        let qmin = q_axis.qmin;
        let qmax = q_axis.qmax;
        let q_bins = q_axis.bins;
        let p_aa = raw.aa.project_1d();
        let p_aw = raw.aw.project_1d();
        let p_ww = raw.ww.clone();
        Ok(Self {
            aa: raw.aa,
            aw: raw.aw,
            ww: raw.ww,
            p_aa,
            p_aw,
            p_ww,
            d_axis,
            q_axis,
            qmin,
            qmax,
            cw: 1.0,
            cx: 1.0,
            exv_strategy,
            sinqd: None,
            intensity: IntensityProfiles::zeroed(q_bins),
            cached_cw: 1.0,
            cached_cx: 1.0,
            weighted_centers,
        })
    }

    /// Replaces the raw distributions (a fresh full recompute, or a merged partial
    /// update) and invalidates every cache layer (§4.6: "Invalidated only when the
    /// distributions are replaced").
    pub fn replace_distributions(&mut self, raw: RawHistogram) -> SaxsResult<()> {
        if raw.bins() != self.d_axis.bins {
            return Err(SaxsError::inconsistent_state(&format!(
                "replacement histogram has {} bins but d_axis has {}",
                raw.bins(),
                self.d_axis.bins
            )));
        }
        self.p_aa = raw.aa.project_1d();
        self.p_aw = raw.aw.project_1d();
        self.p_ww = raw.ww.clone();
        self.aa = raw.aa;
        self.aw = raw.aw;
        self.ww = raw.ww;
        self.sinqd = None;
        Ok(())
    }

    /// Sets the water form-factor scaling parameter `cw`. Lazily invalidates `aw`, `ww`,
    /// and `wx` on the next profile access; `aa`, `ax`, `xx` are untouched.
    pub fn apply_water_scaling_factor(&mut self, cw: f64) {
        self.cw = cw;
    }

    /// Sets the excluded-volume scaling parameter `cx`. Lazily invalidates `ax`, `xx`,
    /// and `wx` on the next profile access.
    pub fn apply_excluded_volume_scaling_factor(&mut self, cx: f64) {
        self.cx = cx;
    }

    pub fn cw(&self) -> f64 {
        self.cw
    }

    pub fn cx(&self) -> f64 {
        self.cx
    }

    /// Builds (weighted variant) or fetches from the process-wide cache (unweighted
    /// variant, keyed by the exact q/d axis pair so differently-binned molecules never
    /// share a mismatched table — see `sinc::global_table`) the Debye table this
    /// histogram's sinqd rebuild needs.
    fn debye_table(&self) -> Arc<DebyeTable> {
        match &self.weighted_centers {
            Some(centers) => Arc::new(DebyeTable::build_with_centers(self.q_axis.clone(), self.d_axis.bins, centers)),
            None => global_table(self.q_axis.clone(), self.d_axis),
        }
    }

    fn rebuild_sinqd(&self) -> SinqdCache {
        let f = FfTag::ATOM_TAG_COUNT;
        let exv_index = FfTag::ExcludedVolume.index();
        let q_bins = self.q_axis.bins;
        let table = self.debye_table();

        let pairs: Vec<(usize, usize)> = (0..f).flat_map(|t1| (0..f).map(move |t2| (t1, t2))).collect();
        let aa_rows: Vec<Vec<f64>> = pairs
            .par_iter()
            .map(|&(t1, t2)| {
                let profile = self.aa.slice(t1, t2);
                (0..q_bins).map(|qb| table.inner_product(qb, profile)).collect()
            })
            .collect();
        let mut aa = vec![Vec::new(); f * f];
        for (idx, (t1, t2)) in pairs.into_iter().enumerate() {
            aa[t1 * f + t2] = aa_rows[idx].clone();
        }

        let ax: Vec<Vec<f64>> = (0..f)
            .into_par_iter()
            .map(|t| {
                let profile = self.aa.slice(t, exv_index);
                (0..q_bins).map(|qb| table.inner_product(qb, profile)).collect()
            })
            .collect();

        let xx_profile = self.aa.slice(exv_index, exv_index);
        let xx: Vec<f64> = (0..q_bins).map(|qb| table.inner_product(qb, xx_profile)).collect();

        let aw: Vec<Vec<f64>> = (0..f)
            .into_par_iter()
            .map(|t| {
                let profile = self.aw.row(t);
                (0..q_bins).map(|qb| table.inner_product(qb, profile)).collect()
            })
            .collect();

        let wx_profile = self.aw.row(exv_index);
        let wx: Vec<f64> = (0..q_bins).map(|qb| table.inner_product(qb, wx_profile)).collect();

        let ww_profile = self.ww.as_slice();
        let ww: Vec<f64> = (0..q_bins).map(|qb| table.inner_product(qb, ww_profile)).collect();

        SinqdCache { aa, ax, xx, aw, wx, ww }
    }

    /// Recomputes whichever intensity-profile sub-terms the current `(sinqd, cw, cx)`
    /// state requires, per the independent invalidation rules of §4.6.
    fn ensure_cache(&mut self) {
        let sinqd_changed = self.sinqd.is_none();
        if sinqd_changed {
            self.sinqd = Some(self.rebuild_sinqd());
        }
        let cw_changed = self.cached_cw != self.cw;
        let cx_changed = self.cached_cx != self.cx;

        let want_aa = sinqd_changed;
        let want_ax_xx = sinqd_changed || cx_changed;
        let want_aw_ww = sinqd_changed || cw_changed;
        let want_wx = sinqd_changed || cw_changed || cx_changed;
        if !(want_aa || want_ax_xx || want_aw_ww || want_wx) {
            return;
        }

        let sinqd = self.sinqd.as_ref().expect("sinqd just rebuilt or already present");
        let f = FfTag::ATOM_TAG_COUNT;
        let q_bins = self.q_axis.bins;
        let q_axis = &self.q_axis;

        let f_t: Vec<Vec<f64>> = (0..f)
            .map(|t| {
                let cm = coefficients(FfTag::from_atom_index(t));
                (0..q_bins).map(|qb| cm.evaluate(q_axis.value(qb))).collect()
            })
            .collect();
        let f_w: Vec<f64> = {
            let cm = coefficients(FfTag::Water);
            (0..q_bins).map(|qb| cm.evaluate(q_axis.value(qb))).collect()
        };
        let f_e: Vec<f64> = (0..q_bins).map(|qb| self.exv_strategy.exv_factor(q_axis.value(qb))).collect();

        if want_aa {
            for qb in 0..q_bins {
                let mut acc = 0.0;
                for t1 in 0..f {
                    for t2 in 0..f {
                        acc += f_t[t1][qb] * f_t[t2][qb] * sinqd.aa[t1 * f + t2][qb];
                    }
                }
                self.intensity.aa[qb] = acc;
            }
        }
        if want_ax_xx {
            for qb in 0..q_bins {
                let mut ax_acc = 0.0;
                for t in 0..f {
                    ax_acc += f_t[t][qb] * f_e[qb] * sinqd.ax[t][qb];
                }
                self.intensity.ax[qb] = ax_acc;
                self.intensity.xx[qb] = f_e[qb] * f_e[qb] * sinqd.xx[qb];
            }
        }
        if want_aw_ww {
            for qb in 0..q_bins {
                let mut aw_acc = 0.0;
                for t in 0..f {
                    aw_acc += f_t[t][qb] * f_w[qb] * sinqd.aw[t][qb];
                }
                self.intensity.aw[qb] = aw_acc;
                self.intensity.ww[qb] = f_w[qb] * f_w[qb] * sinqd.ww[qb];
            }
        }
        if want_wx {
            for qb in 0..q_bins {
                self.intensity.wx[qb] = f_w[qb] * f_e[qb] * sinqd.wx[qb];
            }
        }

        self.cached_cw = self.cw;
        self.cached_cx = self.cx;
    }

    fn sub_range(&self) -> (usize, usize) {
        self.q_axis.sub_range(self.qmin, self.qmax)
    }

    fn profile_from(&self, full: &[f64]) -> ScatteringProfile {
        let (q0, bins) = self.sub_range();
        let q = (q0..q0 + bins).map(|qb| self.q_axis.value(qb)).collect();
        let intensity = full[q0..q0 + bins].to_vec();
        ScatteringProfile { q, intensity }
    }

    pub fn get_profile_aa(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.aa)
    }

    pub fn get_profile_ax(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.ax)
    }

    pub fn get_profile_xx(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.xx)
    }

    pub fn get_profile_aw(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.aw)
    }

    pub fn get_profile_wx(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.wx)
    }

    pub fn get_profile_ww(&mut self) -> ScatteringProfile {
        self.ensure_cache();
        self.profile_from(&self.intensity.ww)
    }

    /// Assembles `I(q) = I_aa - 2·cx·I_ax + cx²·I_xx + 2·cw·I_aw - 2·cw·cx·I_wx +
    /// cw²·I_ww` over the configured output q-range (§4.6's "Intensity assembly").
    pub fn debye_transform(&mut self) -> ScatteringProfile {
        let cw = self.cw;
        let cx = self.cx;
        let aa = self.get_profile_aa();
        let ax = self.get_profile_ax();
        let xx = self.get_profile_xx();
        let aw = self.get_profile_aw();
        let wx = self.get_profile_wx();
        let ww = self.get_profile_ww();
        ScatteringProfile::combine(&[
            (&aa, 1.0),
            (&ax, -2.0 * cx),
            (&xx, cx * cx),
            (&aw, 2.0 * cw),
            (&wx, -2.0 * cw * cx),
            (&ww, cw * cw),
        ])
    }

    /// The plain, form-factor-free atom-atom distance profile (a distance-domain, not
    /// q-domain, quantity — the projection of `aa` along both form-factor axes).
    pub fn get_aa_counts(&self) -> &Distribution1D {
        &self.p_aa
    }

    pub fn get_aw_counts(&self) -> &Distribution1D {
        &self.p_aw
    }

    pub fn get_ww_counts(&self) -> &Distribution1D {
        &self.p_ww
    }

    /// `p_aa + 2·cw·p_aw + cw²·p_ww`, the plain total distance histogram used for
    /// Guinier/radius-of-gyration analysis outside the core (§4.6).
    pub fn get_total_counts(&self) -> Distribution1D {
        let mut total = self.p_aa.clone();
        let mut scaled_aw = self.p_aw.clone();
        scaled_aw.as_mut_slice().iter_mut().for_each(|v| *v *= 2.0 * self.cw);
        let mut scaled_ww = self.p_ww.clone();
        scaled_ww.as_mut_slice().iter_mut().for_each(|v| *v *= self.cw * self.cw);
        total.add_assign(&scaled_aw);
        total.add_assign(&scaled_ww);
        total
    }

    /// Nominal (or, for the weighted variant, refined) distance-bin centers, one per
    /// bin of the raw distributions.
    pub fn get_d_axis(&self) -> Vec<f64> {
        match &self.weighted_centers {
            Some(centers) => centers.clone(),
            None => (0..self.d_axis.bins).map(|i| self.d_axis.center(i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formfactor::AverageExv;
    use crate::manager::full::{calculate_full, calculate_full_with_exv_mirror};
    use crate::model::{AtomFF, FfTag, Water};
    use lin_alg::f64::Vec3;

    fn carbon(x: f64, y: f64, z: f64) -> AtomFF {
        AtomFF {
            position: Vec3::new(x, y, z),
            ff_tag: FfTag::C,
            weight: 1.0,
        }
    }

    fn build(raw: RawHistogram, bin_width: f64) -> CompositeHistogram {
        let bins = raw.bins();
        let d_axis = Axis::new(0.0, bin_width, bins);
        let q_axis = QAxis::new(1e-2, 0.5, 20);
        let exv = Box::new(AverageExv {
            displaced_volume_avg: 16.44,
        });
        CompositeHistogram::new(raw, d_axis, q_axis, exv, None).unwrap()
    }

    /// Two histograms with different (molecule-dependent, resized) bin counts built
    /// back-to-back in the same process must each get a correctly-shaped Debye table out
    /// of the process-wide cache — not whichever table happened to be built first.
    #[test]
    fn histograms_with_different_bin_counts_both_transform_correctly() {
        let small_atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.)];
        let small_raw = calculate_full(&small_atoms, &[], 0.1, 50, 1);
        let mut small_hist = build(small_raw, 0.1);

        let big_atoms = vec![
            carbon(0., 0., 0.),
            carbon(1., 0., 0.),
            carbon(0., 1., 0.),
            carbon(0., 0., 1.),
        ];
        let big_raw = calculate_full(&big_atoms, &[], 0.1, 200, 1);
        let mut big_hist = build(big_raw, 0.1);

        let small_profile = small_hist.debye_transform();
        let big_profile = big_hist.debye_transform();
        assert!(small_profile.intensity[0] > 0.0);
        assert!(big_profile.intensity[0] > 0.0);

        // Re-requesting the small histogram's profile must still match its own
        // distributions, not get clobbered by the big histogram's cached table.
        let small_profile_again = small_hist.debye_transform();
        assert_eq!(small_profile.intensity, small_profile_again.intensity);
    }

    #[test]
    fn debye_transform_at_q_zero_like_limit_is_positive() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.)];
        let raw = calculate_full(&atoms, &[], 0.1, 50, 1);
        let mut hist = build(raw, 0.1);
        let profile = hist.debye_transform();
        assert!(profile.intensity[0] > 0.0);
    }

    #[test]
    fn debye_transform_matches_manual_combination_of_profiles() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.), carbon(0., 1., 0.)];
        let waters = vec![Water {
            position: Vec3::new(0.5, 0.5, 0.5),
            weight: 1.0,
        }];
        let raw = calculate_full_with_exv_mirror(&atoms, &waters, 0.1, 80, 1);
        let mut hist = build(raw, 0.1);
        hist.apply_water_scaling_factor(0.9);
        hist.apply_excluded_volume_scaling_factor(1.1);

        let transformed = hist.debye_transform();
        let aa = hist.get_profile_aa();
        let ax = hist.get_profile_ax();
        let xx = hist.get_profile_xx();
        let aw = hist.get_profile_aw();
        let wx = hist.get_profile_wx();
        let ww = hist.get_profile_ww();

        let cw = 0.9;
        let cx = 1.1;
        for i in 0..transformed.intensity.len() {
            let expected =
                aa.intensity[i] - 2.0 * cx * ax.intensity[i] + cx * cx * xx.intensity[i] + 2.0 * cw * aw.intensity[i]
                    - 2.0 * cw * cx * wx.intensity[i]
                    + cw * cw * ww.intensity[i];
            assert!((transformed.intensity[i] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn cw_change_leaves_aa_profile_untouched() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.)];
        let raw = calculate_full(&atoms, &[], 0.1, 50, 1);
        let mut hist = build(raw, 0.1);
        let before = hist.get_profile_aa();
        hist.apply_water_scaling_factor(2.5);
        let after = hist.get_profile_aa();
        assert_eq!(before, after);
    }

    #[test]
    fn total_counts_matches_weighted_projection_sum() {
        let atoms = vec![carbon(0., 0., 0.), carbon(1., 0., 0.)];
        let waters = vec![Water {
            position: Vec3::new(0., 0., 2.),
            weight: 1.0,
        }];
        let raw = calculate_full(&atoms, &waters, 0.1, 50, 1);
        let mut hist = build(raw, 0.1);
        hist.apply_water_scaling_factor(2.0);
        let total = hist.get_total_counts();
        let expected_bin0 =
            hist.get_aa_counts().get(0) + 2.0 * 2.0 * hist.get_aw_counts().get(0) + 4.0 * hist.get_ww_counts().get(0);
        assert!((total.get(0) - expected_bin0).abs() < 1e-9);
    }

    #[test]
    fn rejects_mismatched_bin_counts() {
        let atoms = vec![carbon(0., 0., 0.)];
        let raw = calculate_full(&atoms, &[], 0.1, 50, 1);
        let wrong_axis = Axis::new(0.0, 0.1, 10);
        let q_axis = QAxis::new(1e-2, 0.5, 20);
        let exv = Box::new(AverageExv {
            displaced_volume_avg: 16.44,
        });
        assert!(CompositeHistogram::new(raw, wrong_axis, q_axis, exv, None).is_err());
    }
}
