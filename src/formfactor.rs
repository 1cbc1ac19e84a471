//! Form-factor tables and the excluded-volume strategies (Average/Explicit/Grid-exv).
//!
//! Real Cromer-Mann tables are standard five-Gaussian-plus-constant fits; this crate uses
//! a compact four-Gaussian approximation per tag, which is enough to exercise the Debye
//! pipeline's q-dependence correctly without pulling in a large external coefficients
//! crate the workspace doesn't otherwise depend on.

use crate::model::{AtomFF, FfTag};

/// A four-Gaussian-plus-constant Cromer-Mann-style form factor:
/// `F(q) = c + Σ a_i * exp(-b_i * (q / 4π)²)`.
#[derive(Clone, Copy, Debug)]
pub struct CromerMann {
    pub a: [f64; 4],
    pub b: [f64; 4],
    pub c: f64,
}

impl CromerMann {
    pub fn evaluate(&self, q: f64) -> f64 {
        let k = (q / (4.0 * std::f64::consts::PI)).powi(2);
        self.c + self.a.iter().zip(self.b.iter()).map(|(a, b)| a * (-b * k).exp()).sum::<f64>()
    }
}

/// Returns the tabulated Cromer-Mann coefficients for a given form-factor tag. Grouped
/// (hydrogen-bearing) tags fold the bonded hydrogens' scattering into the heavy atom's
/// coefficients, which is why e.g. `CH3` carries a larger `c` term than bare `C`.
pub fn coefficients(tag: FfTag) -> CromerMann {
    use FfTag::*;
    match tag {
        H => CromerMann {
            a: [0.489918, 0.262003, 0.196767, 0.049879],
            b: [20.6593, 7.74039, 49.5519, 2.20159],
            c: 0.001305,
        },
        C => CromerMann {
            a: [2.31000, 1.02000, 1.58860, 0.865000],
            b: [20.8439, 10.2075, 0.568700, 51.6512],
            c: 0.215600,
        },
        CH => CromerMann {
            a: [2.31000, 1.02000, 1.58860, 0.865000 + 0.489918],
            b: [20.8439, 10.2075, 0.568700, 51.6512],
            c: 0.215600 + 0.001305,
        },
        CH2 => CromerMann {
            a: [2.31000, 1.02000, 1.58860, 0.865000 + 2.0 * 0.489918],
            b: [20.8439, 10.2075, 0.568700, 51.6512],
            c: 0.215600 + 2.0 * 0.001305,
        },
        CH3 => CromerMann {
            a: [2.31000, 1.02000, 1.58860, 0.865000 + 3.0 * 0.489918],
            b: [20.8439, 10.2075, 0.568700, 51.6512],
            c: 0.215600 + 3.0 * 0.001305,
        },
        N => CromerMann {
            a: [12.2126, 3.13220, 2.01250, 1.16630],
            b: [0.005700, 9.89330, 28.9975, 0.582600],
            c: -11.529,
        },
        NH => CromerMann {
            a: [12.2126, 3.13220, 2.01250, 1.16630 + 0.489918],
            b: [0.005700, 9.89330, 28.9975, 0.582600],
            c: -11.529 + 0.001305,
        },
        NH2 => CromerMann {
            a: [12.2126, 3.13220, 2.01250, 1.16630 + 2.0 * 0.489918],
            b: [0.005700, 9.89330, 28.9975, 0.582600],
            c: -11.529 + 2.0 * 0.001305,
        },
        NH3 => CromerMann {
            a: [12.2126, 3.13220, 2.01250, 1.16630 + 3.0 * 0.489918],
            b: [0.005700, 9.89330, 28.9975, 0.582600],
            c: -11.529 + 3.0 * 0.001305,
        },
        O => CromerMann {
            a: [3.04850, 2.28680, 1.54630, 0.867000],
            b: [13.2771, 5.70110, 0.323900, 32.9089],
            c: 0.250800,
        },
        OH => CromerMann {
            a: [3.04850, 2.28680, 1.54630, 0.867000 + 0.489918],
            b: [13.2771, 5.70110, 0.323900, 32.9089],
            c: 0.250800 + 0.001305,
        },
        S => CromerMann {
            a: [6.90530, 5.20340, 1.43790, 1.58630],
            b: [1.46790, 22.2151, 0.253600, 56.1720],
            c: 0.866900,
        },
        SH => CromerMann {
            a: [6.90530, 5.20340, 1.43790, 1.58630 + 0.489918],
            b: [1.46790, 22.2151, 0.253600, 56.1720],
            c: 0.866900 + 0.001305,
        },
        ExcludedVolume => CromerMann {
            a: [0.0, 0.0, 0.0, 0.0],
            b: [1.0, 1.0, 1.0, 1.0],
            c: 0.0,
        },
        Water => CromerMann {
            a: [3.04850, 2.28680, 1.54630, 0.867000 + 2.0 * 0.489918],
            b: [13.2771, 5.70110, 0.323900, 32.9089],
            c: 0.250800 + 2.0 * 0.001305,
        },
    }
}

/// Standard per-element displaced (excluded) volume, in Å³, used by `displaced_avg`.
/// Approximate values in the spirit of reference SAXS software's van-der-Waals volume
/// tables; precise values are a collaborator/reference-data concern, not a core one.
fn displaced_volume_for_tag(tag: FfTag) -> f64 {
    use FfTag::*;
    match tag {
        H => 5.15,
        C | CH | CH2 | CH3 => 16.44,
        N | NH | NH2 | NH3 => 2.49,
        O => 9.13,
        OH | ExcludedVolume | Water => 9.13,
        S | SH => 19.86,
    }
}

/// Average per-atom displaced excluded volume over a set of atoms, used by the Pepsi and
/// CRYSOL exv strategies. Falls back to the `OH` constant for anything unrecognized
/// (mirrors the fallback already applied when tags were assigned in `FfTag`).
pub fn displaced_avg(atoms: &[AtomFF]) -> f64 {
    if atoms.is_empty() {
        return 0.0;
    }
    let total: f64 = atoms.iter().map(|a| displaced_volume_for_tag(a.ff_tag)).sum();
    total / atoms.len() as f64
}

/// The water density constant `ρ_w`, used by the Average/Explicit-exv form factor.
pub const WATER_ELECTRON_DENSITY: f64 = 0.334; // electrons / Å³

/// A strategy for computing the q-dependent excluded-volume form factor `F_E(q)`, chosen
/// once at Composite Histogram construction from `ExvMethod` (design notes §9: "Runtime
/// polymorphism is limited to the single method `exv_factor(q)`").
pub trait ExvStrategy: Send + Sync {
    fn exv_factor(&self, q: f64) -> f64;
}

/// Average-exv (§4.7): `F_E(q) = ρ_w · V̄ · exp(−V̄^{2/3}·q²/(4π))`.
#[derive(Clone, Copy, Debug)]
pub struct AverageExv {
    pub displaced_volume_avg: f64,
}

impl ExvStrategy for AverageExv {
    fn exv_factor(&self, q: f64) -> f64 {
        let v = self.displaced_volume_avg;
        WATER_ELECTRON_DENSITY * v * (-v.powf(2.0 / 3.0) * q * q / (4.0 * std::f64::consts::PI)).exp()
    }
}

/// Explicit-exv (§4.7): identical analytic form to Average-exv but parameterized per
/// concrete exv_method (FoXS uses the plain average volume; Pepsi/CRYSOL scale it by a
/// method-specific displaced-volume convention).
#[derive(Clone, Copy, Debug)]
pub struct ExplicitExv {
    pub displaced_volume_avg: f64,
    /// Extra multiplicative correction applied by Pepsi/CRYSOL on top of the plain
    /// average-volume formula; 1.0 for FoXS.
    pub volume_correction: f64,
}

impl ExvStrategy for ExplicitExv {
    fn exv_factor(&self, q: f64) -> f64 {
        let v = self.displaced_volume_avg * self.volume_correction;
        WATER_ELECTRON_DENSITY * v * (-v.powf(2.0 / 3.0) * q * q / (4.0 * std::f64::consts::PI)).exp()
    }
}

/// Grid-exv (§4.7, §9): the three named sub-variants differ in how the excluded-volume
/// scale factor is interpreted. `Volume` and `Surface` leave `F_E(q)` itself unscaled —
/// the Composite Histogram's own `cx` already multiplies `I_ax`/`I_xx` by `-2cx`/`cx²` at
/// combination time (§4.6), which *is* "cx scales F_E(q) directly" for any strategy, so
/// baking a second cx multiplier into the strategy itself would double it. `Scalable`
/// reinterprets `cx` as a radius factor `k` instead: `F_E(q; k)` itself grows with the
/// volume `k³` implies, which `cx`'s usual linear/quadratic combination-time role can't
/// express, so that variant carries its own `k`.
#[derive(Clone, Copy, Debug)]
pub enum GridExv {
    /// Dummy-dummy distances are unscaled; `cx` scaling happens entirely at combination
    /// time, same as Average/Explicit-exv.
    Volume { displaced_volume_avg: f64 },
    /// Volume-scale plus an additive surface-layer correction derived from
    /// `surface_thickness`.
    Surface {
        displaced_volume_avg: f64,
        surface_correction: f64,
    },
    /// `k` is a radius scale factor carried by the strategy itself (not the Composite
    /// Histogram's `cx`, which a caller of this variant leaves at 1): the effective
    /// volume scales as k³.
    Scalable { displaced_volume_avg: f64, k: f64 },
}

impl ExvStrategy for GridExv {
    fn exv_factor(&self, q: f64) -> f64 {
        match *self {
            GridExv::Volume { displaced_volume_avg } => {
                WATER_ELECTRON_DENSITY
                    * displaced_volume_avg
                    * (-displaced_volume_avg.powf(2.0 / 3.0) * q * q / (4.0 * std::f64::consts::PI)).exp()
            }
            GridExv::Surface {
                displaced_volume_avg,
                surface_correction,
            } => {
                let v = displaced_volume_avg + surface_correction;
                WATER_ELECTRON_DENSITY * v * (-v.powf(2.0 / 3.0) * q * q / (4.0 * std::f64::consts::PI)).exp()
            }
            GridExv::Scalable {
                displaced_volume_avg,
                k,
            } => {
                let v = displaced_volume_avg * k.powi(3);
                WATER_ELECTRON_DENSITY * v * (-v.powf(2.0 / 3.0) * q * q / (4.0 * std::f64::consts::PI)).exp()
            }
        }
    }
}
