//! Vectorized pairwise distance kernels over the Compact Coordinate Store.
//!
//! Three arities (1, 4, 8) each come in a rounded-to-bin and an exact-distance form. The
//! quad/octo arities use `wide::f32x4`/`wide::f32x8` rather than raw SSE/AVX intrinsics —
//! this workspace has no `unsafe` anywhere, and `wide` gives the same lane-parallel
//! arithmetic without it. There is no scalar-vs-vector semantic difference: all three
//! arities compute `sqrt(Σ(a-b)²)` per lane.

use wide::{f32x4, f32x8};

use crate::coords::{RecordXyzff, RecordXyzw};

/// Result of evaluating one XYZW pair: exact distance and the product of weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairXyzw {
    pub distance: f32,
    pub weight: f32,
}

/// Result of evaluating one XYZFF pair: exact distance and the (unordered) form-factor
/// pair, encoded as the two raw tag indices in the order they were read (the caller picks
/// a canonical (ff1, ff2) slot; both orderings are never separately incremented — see
/// §3's "equivalently each unordered pair contributes 2·count").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairXyzff {
    pub distance: f32,
    pub ff1: i32,
    pub ff2: i32,
}

#[inline]
fn rounded(distance: f32, inv_bin_width: f32) -> i32 {
    (distance * inv_bin_width).round() as i32
}

// ---------------------------------------------------------------------------------
// XYZW: distance + weight
// ---------------------------------------------------------------------------------

/// 1-lane exact distance and weight between two XYZW records.
pub fn evaluate_xyzw(a: RecordXyzw, b: RecordXyzw) -> PairXyzw {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    PairXyzw {
        distance: (dx * dx + dy * dy + dz * dz).sqrt(),
        weight: a.w * b.w,
    }
}

/// 1-lane rounded-bin distance and weight.
pub fn evaluate_rounded_xyzw(a: RecordXyzw, b: RecordXyzw, inv_bin_width: f32) -> (i32, f32) {
    let pair = evaluate_xyzw(a, b);
    (rounded(pair.distance, inv_bin_width), pair.weight)
}

/// 4-lane exact distance and weight: one record against four.
pub fn evaluate_quad_xyzw(a: RecordXyzw, b: [RecordXyzw; 4]) -> ([f32; 4], [f32; 4]) {
    let ax = f32x4::splat(a.x);
    let ay = f32x4::splat(a.y);
    let az = f32x4::splat(a.z);
    let aw = f32x4::splat(a.w);

    let bx = f32x4::new([b[0].x, b[1].x, b[2].x, b[3].x]);
    let by = f32x4::new([b[0].y, b[1].y, b[2].y, b[3].y]);
    let bz = f32x4::new([b[0].z, b[1].z, b[2].z, b[3].z]);
    let bw = f32x4::new([b[0].w, b[1].w, b[2].w, b[3].w]);

    let dx = ax - bx;
    let dy = ay - by;
    let dz = az - bz;
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();
    let weight = aw * bw;

    (dist.to_array(), weight.to_array())
}

/// 4-lane rounded-bin distance and weight.
pub fn evaluate_rounded_quad_xyzw(
    a: RecordXyzw,
    b: [RecordXyzw; 4],
    inv_bin_width: f32,
) -> ([i32; 4], [f32; 4]) {
    let (dist, weight) = evaluate_quad_xyzw(a, b);
    let mut bins = [0i32; 4];
    for i in 0..4 {
        bins[i] = rounded(dist[i], inv_bin_width);
    }
    (bins, weight)
}

/// 8-lane exact distance and weight: one record against eight.
pub fn evaluate_octo_xyzw(a: RecordXyzw, b: [RecordXyzw; 8]) -> ([f32; 8], [f32; 8]) {
    let ax = f32x8::splat(a.x);
    let ay = f32x8::splat(a.y);
    let az = f32x8::splat(a.z);
    let aw = f32x8::splat(a.w);

    let bx = f32x8::new(std::array::from_fn(|i| b[i].x));
    let by = f32x8::new(std::array::from_fn(|i| b[i].y));
    let bz = f32x8::new(std::array::from_fn(|i| b[i].z));
    let bw = f32x8::new(std::array::from_fn(|i| b[i].w));

    let dx = ax - bx;
    let dy = ay - by;
    let dz = az - bz;
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();
    let weight = aw * bw;

    (dist.to_array(), weight.to_array())
}

/// 8-lane rounded-bin distance and weight.
pub fn evaluate_rounded_octo_xyzw(
    a: RecordXyzw,
    b: [RecordXyzw; 8],
    inv_bin_width: f32,
) -> ([i32; 8], [f32; 8]) {
    let (dist, weight) = evaluate_octo_xyzw(a, b);
    let mut bins = [0i32; 8];
    for i in 0..8 {
        bins[i] = rounded(dist[i], inv_bin_width);
    }
    (bins, weight)
}

// ---------------------------------------------------------------------------------
// XYZFF: distance + form-factor pair
// ---------------------------------------------------------------------------------

/// 1-lane exact distance and ff-pair between two XYZFF records.
pub fn evaluate_xyzff(a: RecordXyzff, b: RecordXyzff) -> PairXyzff {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    PairXyzff {
        distance: (dx * dx + dy * dy + dz * dz).sqrt(),
        ff1: a.ff_index,
        ff2: b.ff_index,
    }
}

/// 1-lane rounded-bin distance and ff-pair.
pub fn evaluate_rounded_xyzff(a: RecordXyzff, b: RecordXyzff, inv_bin_width: f32) -> (i32, i32, i32) {
    let pair = evaluate_xyzff(a, b);
    (rounded(pair.distance, inv_bin_width), pair.ff1, pair.ff2)
}

/// 4-lane exact distance: one record against four; ff-pairs returned per-lane since each
/// lane may carry a different ff tag.
pub fn evaluate_quad_xyzff(a: RecordXyzff, b: [RecordXyzff; 4]) -> ([f32; 4], [i32; 4]) {
    let ax = f32x4::splat(a.x);
    let ay = f32x4::splat(a.y);
    let az = f32x4::splat(a.z);

    let bx = f32x4::new([b[0].x, b[1].x, b[2].x, b[3].x]);
    let by = f32x4::new([b[0].y, b[1].y, b[2].y, b[3].y]);
    let bz = f32x4::new([b[0].z, b[1].z, b[2].z, b[3].z]);

    let dx = ax - bx;
    let dy = ay - by;
    let dz = az - bz;
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();

    (dist.to_array(), [b[0].ff_index, b[1].ff_index, b[2].ff_index, b[3].ff_index])
}

/// 4-lane rounded-bin distance.
pub fn evaluate_rounded_quad_xyzff(
    a: RecordXyzff,
    b: [RecordXyzff; 4],
    inv_bin_width: f32,
) -> ([i32; 4], [i32; 4]) {
    let (dist, ff2) = evaluate_quad_xyzff(a, b);
    let mut bins = [0i32; 4];
    for i in 0..4 {
        bins[i] = rounded(dist[i], inv_bin_width);
    }
    (bins, ff2)
}

/// 8-lane exact distance; ff-pairs returned per-lane.
pub fn evaluate_octo_xyzff(a: RecordXyzff, b: [RecordXyzff; 8]) -> ([f32; 8], [i32; 8]) {
    let ax = f32x8::splat(a.x);
    let ay = f32x8::splat(a.y);
    let az = f32x8::splat(a.z);

    let bx = f32x8::new(std::array::from_fn(|i| b[i].x));
    let by = f32x8::new(std::array::from_fn(|i| b[i].y));
    let bz = f32x8::new(std::array::from_fn(|i| b[i].z));

    let dx = ax - bx;
    let dy = ay - by;
    let dz = az - bz;
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();

    (dist.to_array(), std::array::from_fn(|i| b[i].ff_index))
}

/// 8-lane rounded-bin distance.
pub fn evaluate_rounded_octo_xyzff(
    a: RecordXyzff,
    b: [RecordXyzff; 8],
    inv_bin_width: f32,
) -> ([i32; 8], [i32; 8]) {
    let (dist, ff2) = evaluate_octo_xyzff(a, b);
    let mut bins = [0i32; 8];
    for i in 0..8 {
        bins[i] = rounded(dist[i], inv_bin_width);
    }
    (bins, ff2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(x: f32, y: f32, z: f32, w: f32) -> RecordXyzw {
        RecordXyzw { x, y, z, w }
    }

    #[test]
    fn scalar_matches_pythagorean_distance() {
        let a = rec(0., 0., 0., 1.0);
        let b = rec(3., 4., 0., 2.0);
        let pair = evaluate_xyzw(a, b);
        assert!((pair.distance - 5.0).abs() < 1e-5);
        assert!((pair.weight - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quad_lanes_match_scalar_per_lane() {
        let a = rec(0., 0., 0., 1.0);
        let bs = [
            rec(1., 0., 0., 1.0),
            rec(0., 2., 0., 1.0),
            rec(0., 0., 3., 1.0),
            rec(1., 1., 1., 1.0),
        ];
        let (dist, _weight) = evaluate_quad_xyzw(a, bs);
        for i in 0..4 {
            let scalar = evaluate_xyzw(a, bs[i]).distance;
            assert!((dist[i] - scalar).abs() < 1e-4);
        }
    }

    #[test]
    fn octo_lanes_match_scalar_per_lane() {
        let a = rec(0., 0., 0., 1.0);
        let bs: [RecordXyzw; 8] = std::array::from_fn(|i| rec(i as f32, 0., 0., 1.0));
        let (dist, _weight) = evaluate_octo_xyzw(a, bs);
        for i in 0..8 {
            let scalar = evaluate_xyzw(a, bs[i]).distance;
            assert!((dist[i] - scalar).abs() < 1e-4);
        }
    }

    #[test]
    fn rounding_uses_round_to_nearest() {
        let a = rec(0., 0., 0., 1.0);
        let b = rec(0.26, 0., 0., 1.0);
        let (bin, _) = evaluate_rounded_xyzw(a, b, 10.0); // bin width 0.1
        assert_eq!(bin, 3);
    }
}
