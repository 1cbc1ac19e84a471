//! Histogram managers: the two scheduling strategies that turn an Atomic Model into the
//! raw `aa`/`aw`/`ww` distributions a Composite Distance Histogram caches and transforms
//! (§4.3, §4.4).

pub mod full;
pub mod partial;
