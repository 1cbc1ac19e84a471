//! The Atomic Model: a read-only snapshot of atoms, waters, and rigid bodies, plus the
//! change-notification machinery bodies use to tell a Histogram Manager what moved.
//!
//! Everything in this module is data the core *consumes*; PDB/CIF parsing and the
//! hydration-site placement heuristic that would populate these types live outside the
//! core, in collaborator code.

use std::sync::atomic::{AtomicBool, Ordering};

use lin_alg::f64::{Quaternion, Vec3};
use na_seq::Element;

/// Form-factor tag for an atom. Roughly the Cromer-Mann grouping used by AUSAXS-style
/// scattering engines: hydrogen-bearing heavy atoms get their own tag because bonded
/// hydrogens are folded into the heavy atom's form factor rather than scattered
/// individually.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FfTag {
    H,
    C,
    CH,
    CH2,
    CH3,
    N,
    NH,
    NH2,
    NH3,
    O,
    OH,
    S,
    SH,
    /// The distinguished excluded-volume tag, `E` in the design notes.
    ExcludedVolume,
    /// The water/O tag, `W` in the design notes.
    Water,
}

impl FfTag {
    /// Number of atomic form-factor tags, excluding the excluded-volume and water tags.
    pub const ATOM_TAG_COUNT: usize = 13;

    /// Index among the atomic tags (0..ATOM_TAG_COUNT), used to index Distribution2D/3D.
    /// The excluded-volume tag sorts last among the "F'" axis (§3: "F' includes E").
    pub fn index(self) -> usize {
        match self {
            Self::H => 0,
            Self::C => 1,
            Self::CH => 2,
            Self::CH2 => 3,
            Self::CH3 => 4,
            Self::N => 5,
            Self::NH => 6,
            Self::NH2 => 7,
            Self::NH3 => 8,
            Self::O => 9,
            Self::OH => 10,
            Self::S => 11,
            Self::SH => 12,
            Self::ExcludedVolume => Self::ATOM_TAG_COUNT,
            Self::Water => Self::ATOM_TAG_COUNT + 1,
        }
    }

    /// The 13 atomic tags, in the same order as [`FfTag::index`], for code that needs to
    /// iterate the `F` axis (excluding `E` and `Water`) by index.
    pub const ATOM_TAGS: [FfTag; Self::ATOM_TAG_COUNT] = [
        Self::H,
        Self::C,
        Self::CH,
        Self::CH2,
        Self::CH3,
        Self::N,
        Self::NH,
        Self::NH2,
        Self::NH3,
        Self::O,
        Self::OH,
        Self::S,
        Self::SH,
    ];

    /// Inverse of [`FfTag::index`] restricted to the 13 atomic tags (`0..ATOM_TAG_COUNT`).
    pub fn from_atom_index(idx: usize) -> FfTag {
        Self::ATOM_TAGS[idx]
    }

    /// Falls back to a generic carbon tag for an element this table doesn't recognize,
    /// emitting an observable warning. Used at the Atomic Model boundary (§7: "a
    /// form-factor tag unknown at table lookup").
    pub fn from_element_or_fallback(element: Element, num_bonded_h: u8) -> Self {
        use Element::*;
        match (element, num_bonded_h) {
            (Hydrogen, _) => Self::H,
            (Carbon, 0) => Self::C,
            (Carbon, 1) => Self::CH,
            (Carbon, 2) => Self::CH2,
            (Carbon, _) => Self::CH3,
            (Nitrogen, 0) => Self::N,
            (Nitrogen, 1) => Self::NH,
            (Nitrogen, 2) => Self::NH2,
            (Nitrogen, _) => Self::NH3,
            (Oxygen, 0) => Self::O,
            (Oxygen, _) => Self::OH,
            (Sulfur, 0) => Self::S,
            (Sulfur, _) => Self::SH,
            (other, _) => {
                eprintln!(
                    "Atom has no known form-factor tag for element {other:?}; falling back to generic C"
                );
                Self::C
            }
        }
    }
}

/// A single atom contributing to the scattering-relevant part of the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtomFF {
    pub position: Vec3,
    pub ff_tag: FfTag,
    /// Typically the effective charge; 1.0 for an unweighted computation.
    pub weight: f64,
}

/// A hydration-shell water. Form-factor is implicitly `FfTag::Water`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Water {
    pub position: Vec3,
    pub weight: f64,
}

/// An affine symmetry transform, optionally repeated.
///
/// `T = (R, t)`; a repeat count k >= 1 means the body additionally appears at
/// `{T, T^2, ..., T^k}`. The identity is implicit and never stored here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymmetryOp {
    pub rotation: Quaternion,
    pub translation: Vec3,
    pub repeats: u32,
}

impl SymmetryOp {
    pub fn new(rotation: Quaternion, translation: Vec3, repeats: u32) -> Self {
        assert!(repeats >= 1, "a symmetry operator must repeat at least once");
        Self {
            rotation,
            translation,
            repeats,
        }
    }

    /// Applies this operator's `k`th power (1-indexed) to a point.
    pub fn apply_power(&self, k: u32, point: Vec3) -> Vec3 {
        let mut p = point;
        for _ in 0..k {
            p = self.rotation.rotate_vec(p) + self.translation;
        }
        p
    }
}

/// A body's full symmetry descriptor: an ordered list of operators, each with its own
/// repeat count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymmetryList {
    pub operators: Vec<SymmetryOp>,
}

impl SymmetryList {
    /// Total number of symmetry images beyond the identity, `Σ k_i`.
    pub fn image_count(&self) -> u32 {
        self.operators.iter().map(|op| op.repeats).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// One of two signals a Body raises when its owner mutates it externally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Coordinates moved; topology (atom count, ordering, ff tags) is unchanged.
    External,
    /// Atom set changed: add/remove/element change. Implies external work too.
    Internal,
}

/// A handle a Body uses to flip bits in a shared `StateManager` without the Body owning
/// the StateManager (breaks the Body <-> StateManager ownership cycle; see design notes
/// §9). Index-based rather than a raw pointer; `signal` takes `&StateManager` (not
/// `&mut`) because the manager backs its flags with atomics, so any number of bodies can
/// hold a signaller into the same manager concurrently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeSignaller {
    body_index: usize,
}

impl ChangeSignaller {
    pub fn new(body_index: usize) -> Self {
        Self { body_index }
    }

    pub fn signal(&self, state: &StateManager, kind: ChangeKind) {
        state.mark(self.body_index, kind);
    }
}

/// Boolean change-tracking vectors for a fixed set of K bodies, plus a global hydration
/// flag. Bodies hold `ChangeSignaller`s that index into this by body index.
///
/// Flags are `AtomicBool`s so `mark` (called through a `ChangeSignaller` the owning Body
/// holds) can flip them through a shared `&StateManager` without the caller needing
/// exclusive access to the manager. The Histogram Manager side, which does need to drain
/// and reset the flags, still goes through the `&mut self` path (`reset_to_false`).
#[derive(Debug)]
pub struct StateManager {
    externally_modified: Vec<AtomicBool>,
    internally_modified: Vec<AtomicBool>,
    hydration_modified: AtomicBool,
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            externally_modified: self
                .externally_modified
                .iter()
                .map(|b| AtomicBool::new(b.load(Ordering::Relaxed)))
                .collect(),
            internally_modified: self
                .internally_modified
                .iter()
                .map(|b| AtomicBool::new(b.load(Ordering::Relaxed)))
                .collect(),
            hydration_modified: AtomicBool::new(self.hydration_modified.load(Ordering::Relaxed)),
        }
    }
}

impl StateManager {
    pub fn new(body_count: usize) -> Self {
        Self {
            externally_modified: (0..body_count).map(|_| AtomicBool::new(true)).collect(),
            internally_modified: (0..body_count).map(|_| AtomicBool::new(true)).collect(),
            hydration_modified: AtomicBool::new(true),
        }
    }

    /// Flips the flags for `body_index` via a shared reference, the path a
    /// `ChangeSignaller` drives. Equivalent to `mark_mut` otherwise.
    pub fn mark(&self, body_index: usize, kind: ChangeKind) {
        self.externally_modified[body_index].store(true, Ordering::Relaxed);
        if kind == ChangeKind::Internal {
            self.internally_modified[body_index].store(true, Ordering::Relaxed);
        }
    }

    pub fn mark_mut(&mut self, body_index: usize, kind: ChangeKind) {
        self.mark(body_index, kind);
    }

    pub fn mark_hydration_modified(&self) {
        self.hydration_modified.store(true, Ordering::Relaxed);
    }

    pub fn externally_modified(&self) -> Vec<bool> {
        self.externally_modified.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    pub fn internally_modified(&self) -> Vec<bool> {
        self.internally_modified.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    pub fn hydration_modified(&self) -> bool {
        self.hydration_modified.load(Ordering::Relaxed)
    }

    /// Clears all flags to `clean`, called at the end of a `calculate()` pass.
    pub fn reset_to_false(&mut self) {
        self.externally_modified.iter().for_each(|b| b.store(false, Ordering::Relaxed));
        self.internally_modified.iter().for_each(|b| b.store(false, Ordering::Relaxed));
        self.hydration_modified.store(false, Ordering::Relaxed);
    }

    pub fn body_count(&self) -> usize {
        self.externally_modified.len()
    }
}

/// A rigid body: an ordered, stable sequence of atoms, an optional hydration shell, a
/// unique id, and a symmetry descriptor.
///
/// `signaller` is `None` until [`wire_bodies`] assigns one; a Body constructed on its own
/// (e.g. in a test) has no manager to notify and `notify_*` is simply a no-op for it.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub uid: u64,
    pub atoms: Vec<AtomFF>,
    pub waters: Option<Vec<Water>>,
    pub symmetry: SymmetryList,
    signaller: Option<ChangeSignaller>,
}

impl Body {
    pub fn new(uid: u64, atoms: Vec<AtomFF>) -> Self {
        Self {
            uid,
            atoms,
            waters: None,
            symmetry: SymmetryList::default(),
            signaller: None,
        }
    }

    pub fn with_waters(mut self, waters: Vec<Water>) -> Self {
        self.waters = Some(waters);
        self
    }

    pub fn with_symmetry(mut self, symmetry: SymmetryList) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_signaller(mut self, signaller: ChangeSignaller) -> Self {
        self.signaller = Some(signaller);
        self
    }

    pub fn signaller(&self) -> Option<ChangeSignaller> {
        self.signaller
    }

    /// Tells this body's `StateManager` (if wired) that its coordinates moved.
    pub fn notify_external_change(&self, state: &StateManager) {
        if let Some(signaller) = self.signaller {
            signaller.signal(state, ChangeKind::External);
        }
    }

    /// Tells this body's `StateManager` (if wired) that its atom set changed.
    pub fn notify_internal_change(&self, state: &StateManager) {
        if let Some(signaller) = self.signaller {
            signaller.signal(state, ChangeKind::Internal);
        }
    }
}

/// Assigns each body a [`ChangeSignaller`] indexed to its position and builds the
/// matching, fully-dirty `StateManager` (§9: bodies and the manager are constructed
/// together so the index space always lines up).
pub fn wire_bodies(bodies: Vec<Body>) -> (Vec<Body>, StateManager) {
    let state = StateManager::new(bodies.len());
    let wired = bodies
        .into_iter()
        .enumerate()
        .map(|(i, b)| b.with_signaller(ChangeSignaller::new(i)))
        .collect();
    (wired, state)
}

/// A read-only snapshot of the full model: every body and the flattened water view over
/// all bodies' hydration shells.
pub trait AtomicModel {
    fn bodies(&self) -> &[Body];

    /// A flattened view into all bodies' hydration shells, in body order.
    fn waters(&self) -> Vec<Water> {
        self.bodies()
            .iter()
            .flat_map(|b| b.waters.iter().flat_map(|w| w.iter().copied()))
            .collect()
    }
}

impl AtomicModel for Vec<Body> {
    fn bodies(&self) -> &[Body] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_element_falls_back_to_carbon() {
        let tag = FfTag::from_element_or_fallback(Element::Phosphorus, 0);
        assert_eq!(tag, FfTag::C);
    }

    #[test]
    fn carbonyl_degree_selects_ch_variant() {
        assert_eq!(FfTag::from_element_or_fallback(Element::Carbon, 2), FfTag::CH2);
    }

    #[test]
    fn state_manager_starts_fully_dirty() {
        let sm = StateManager::new(3);
        assert!(sm.externally_modified().iter().all(|&b| b));
        assert!(sm.hydration_modified());
    }

    #[test]
    fn reset_clears_all_flags() {
        let mut sm = StateManager::new(2);
        sm.reset_to_false();
        assert!(sm.externally_modified().iter().all(|&b| !b));
        assert!(!sm.hydration_modified());
    }

    #[test]
    fn internal_mark_implies_external() {
        let mut sm = StateManager::new(2);
        sm.reset_to_false();
        sm.mark_mut(0, ChangeKind::Internal);
        assert!(sm.externally_modified()[0]);
        assert!(sm.internally_modified()[0]);
        assert!(!sm.externally_modified()[1]);
    }

    #[test]
    fn wired_body_notify_flips_state_through_a_shared_reference() {
        let bodies = vec![Body::new(0, vec![]), Body::new(1, vec![])];
        let (bodies, state) = wire_bodies(bodies);
        state.reset_to_false();
        assert!(!state.internally_modified()[1]);

        // `notify_internal_change` only borrows `state`, yet it must still flip the flag.
        bodies[1].notify_internal_change(&state);
        assert!(state.externally_modified()[1]);
        assert!(state.internally_modified()[1]);
        assert!(!state.externally_modified()[0]);
    }

    #[test]
    fn unwired_body_notify_is_a_silent_no_op() {
        let body = Body::new(0, vec![]);
        let state = StateManager::new(1);
        state.reset_to_false();
        body.notify_external_change(&state);
        assert!(!state.externally_modified()[0]);
    }

    #[test]
    fn symmetry_image_count_sums_repeats() {
        let list = SymmetryList {
            operators: vec![
                SymmetryOp::new(Quaternion::new_identity(), Vec3::new_zero(), 2),
                SymmetryOp::new(Quaternion::new_identity(), Vec3::new(1., 0., 0.), 3),
            ],
        };
        assert_eq!(list.image_count(), 5);
    }
}
