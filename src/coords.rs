//! The Compact Coordinate Store: a densely packed, SIMD-safe array of atomic positions
//! plus one scalar lane (weight or form-factor tag), and the only thing the inner
//! pairwise loops ever touch.
//!
//! Two variants exist, both laid out as 4-wide records so the kernel module can load
//! them straight into `wide::f32x4`/`wide::f32x8` lanes: `XYZW` (weight in the fourth
//! lane) and `XYZFF` (an integer form-factor-pair encoding in the fourth lane).

use crate::model::{AtomFF, FfTag, Water};

/// Number of dummy padding records appended past the logical length, so that the widest
/// (8-lane) kernel never reads past the end of the allocation (§4.1: "at least 7 dummy
/// entries beyond its logical length").
pub const PADDING: usize = 7;

/// A coordinate-plus-weight record for the `XYZW` store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordXyzw {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// A coordinate-plus-form-factor-tag record for the `XYZFF` store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordXyzff {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub ff_index: i32,
}

/// Coordinates sitting far enough from any real structure that rounded distances to a
/// padding entry always exceed the bin count and are discarded by the caller's loop
/// bound, while loads still never fault.
const PAD_COORD: f32 = 1.0e6;

/// Packed, padded store of `{x, y, z, w}` used for weighted atom-atom / atom-water /
/// water-water distance+weight sweeps.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactCoordinatesXyzw {
    records: Vec<RecordXyzw>,
    logical_len: usize,
}

impl CompactCoordinatesXyzw {
    pub fn from_atoms(atoms: &[AtomFF]) -> Self {
        let mut records: Vec<RecordXyzw> = atoms
            .iter()
            .map(|a| RecordXyzw {
                x: a.position.x as f32,
                y: a.position.y as f32,
                z: a.position.z as f32,
                w: a.weight as f32,
            })
            .collect();
        Self::pad(&mut records);
        Self {
            logical_len: atoms.len(),
            records,
        }
    }

    pub fn from_waters(waters: &[Water]) -> Self {
        let mut records: Vec<RecordXyzw> = waters
            .iter()
            .map(|w| RecordXyzw {
                x: w.position.x as f32,
                y: w.position.y as f32,
                z: w.position.z as f32,
                w: w.weight as f32,
            })
            .collect();
        Self::pad(&mut records);
        Self {
            logical_len: waters.len(),
            records,
        }
    }

    fn pad(records: &mut Vec<RecordXyzw>) {
        for _ in 0..PADDING {
            records.push(RecordXyzw {
                x: PAD_COORD,
                y: PAD_COORD,
                z: PAD_COORD,
                w: 0.0,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.logical_len == 0
    }

    pub fn record(&self, i: usize) -> RecordXyzw {
        self.records[i]
    }

    pub(crate) fn records(&self) -> &[RecordXyzw] {
        &self.records
    }
}

/// Packed, padded store of `{x, y, z, ff_index}` used for the three-dimensional,
/// form-factor-indexed sweeps (aa/ax/xx).
#[derive(Clone, Debug, PartialEq)]
pub struct CompactCoordinatesXyzff {
    records: Vec<RecordXyzff>,
    logical_len: usize,
}

impl CompactCoordinatesXyzff {
    pub fn from_atoms(atoms: &[AtomFF]) -> Self {
        let mut records: Vec<RecordXyzff> = atoms
            .iter()
            .map(|a| RecordXyzff {
                x: a.position.x as f32,
                y: a.position.y as f32,
                z: a.position.z as f32,
                ff_index: a.ff_tag.index() as i32,
            })
            .collect();
        for _ in 0..PADDING {
            records.push(RecordXyzff {
                x: PAD_COORD,
                y: PAD_COORD,
                z: PAD_COORD,
                ff_index: FfTag::ExcludedVolume.index() as i32,
            });
        }
        Self {
            logical_len: atoms.len(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.logical_len == 0
    }

    pub fn record(&self, i: usize) -> RecordXyzff {
        self.records[i]
    }

    pub(crate) fn records(&self) -> &[RecordXyzff] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lin_alg::f64::Vec3;

    fn atom(x: f64, y: f64, z: f64) -> AtomFF {
        AtomFF {
            position: Vec3::new(x, y, z),
            ff_tag: FfTag::C,
            weight: 1.0,
        }
    }

    #[test]
    fn padding_entries_are_far_from_the_structure() {
        let store = CompactCoordinatesXyzw::from_atoms(&[atom(0., 0., 0.)]);
        assert_eq!(store.len(), 1);
        let pad = store.record(store.len());
        assert!(pad.x > 1000.0);
    }

    #[test]
    fn logical_length_excludes_padding() {
        let atoms = vec![atom(0., 0., 0.), atom(1., 0., 0.), atom(0., 1., 0.)];
        let store = CompactCoordinatesXyzw::from_atoms(&atoms);
        assert_eq!(store.len(), 3);
        assert_eq!(store.records().len(), 3 + PADDING);
    }

    #[test]
    fn xyzff_store_encodes_tag_index() {
        let atoms = vec![AtomFF {
            position: Vec3::new_zero(),
            ff_tag: FfTag::O,
            weight: 1.0,
        }];
        let store = CompactCoordinatesXyzff::from_atoms(&atoms);
        assert_eq!(store.record(0).ff_index, FfTag::O.index() as i32);
    }
}
