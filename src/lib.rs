//! SAXS intensity-profile computation core: Debye-sum scattering over an Atomic Model's
//! atoms and hydration waters, with caching/partial-recomputation and symmetry-aware
//! accumulation layered on top.
//!
//! This crate computes `I(q)` from coordinates and form-factor tags already resolved
//! elsewhere; PDB/CIF parsing, hydration-site placement, χ² minimization, EM-map reading
//! and any CLI/GUI surface are collaborator concerns outside this crate.

pub mod axis;
pub mod config;
pub mod coords;
pub mod distribution;
pub mod error;
pub mod formfactor;
pub mod histogram;
pub mod kernel;
pub mod manager;
pub mod model;
pub mod sinc;
pub mod symmetry;

pub use axis::Axis;
pub use config::SaxsConfig;
pub use error::{SaxsError, SaxsErrorKind, SaxsResult};
pub use formfactor::{coefficients, AverageExv, CromerMann, ExplicitExv, ExvStrategy, GridExv};
pub use histogram::{CompositeHistogram, ScatteringProfile};
pub use manager::full::{self as full_manager, RawHistogram};
pub use manager::partial::PartialHistogramManager;
pub use model::{
    wire_bodies, AtomFF, AtomicModel, Body, ChangeKind, ChangeSignaller, FfTag, StateManager, SymmetryList, SymmetryOp, Water,
};
pub use sinc::QAxis;
pub use symmetry::SymmetryAwareManager;
