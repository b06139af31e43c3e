// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Derived sieve parameters and empirical constants.

use crate::fbase::{SlicingKey, FB_MAX_PARTS};
use crate::region::SievingBound;

/// Growth factor of reduced basis coordinates per extra dimension,
/// used by the worst-case norm bound. Empirical.
pub const LLL_SKEW_GROWTH: f64 = 1.075;

/// Ideals below this bound walk full lines of axis 0.
pub fn line_sieve_bound(h: &SievingBound) -> u64 {
    2 * h.h[0] as u64
}

/// Ideals below this bound enumerate plane by plane; above it, the
/// space sieve takes over (three dimensions only: in higher dimension
/// the plane sieve covers the whole factor base).
pub fn plane_sieve_bound(h: &SievingBound) -> Option<u64> {
    if h.t() == 3 {
        Some(4 * h.h[0] as u64 * h.h[1] as u64)
    } else {
        None
    }
}

/// A slicing key matching the sieve dispatch: one part per algorithm
/// range, bucket-sized slices, norms at the given scale.
pub fn default_slicing_key(h: &SievingBound, fbb: u64, skipped: u64, scale: f64) -> SlicingKey {
    // levels are (lo, hi] ranges while the dispatch bounds are strict,
    // hence the -1
    let line = line_sieve_bound(h).saturating_sub(1).min(fbb);
    let plane = plane_sieve_bound(h)
        .unwrap_or(fbb + 1)
        .saturating_sub(1)
        .min(fbb);
    let mut thresholds = [fbb; FB_MAX_PARTS];
    thresholds[0] = line;
    thresholds[1] = plane;
    SlicingKey {
        thresholds,
        td_thresh: 1024,
        skipped,
        scale,
        nr_workspaces: 4,
    }
}

/// Bucket chunk size (log2) for the deferred update pass.
pub const BUCKET_SHIFT: u32 = 16;

/// Conservative per-bucket capacity for a chunk of 2^shift cells:
/// the expected number of line sieve hits is sum over sieved ideals of
/// chunk/q, bounded by chunk * weight; a factor 2 absorbs variance.
pub fn bucket_capacity(weight: f64) -> usize {
    let cap = ((1u64 << BUCKET_SHIFT) as f64 * weight * 2.0) as usize;
    cap.max(1024)
}

#[test]
fn test_bounds() {
    let h = SievingBound::new(vec![8, 8, 4]);
    assert_eq!(line_sieve_bound(&h), 16);
    assert_eq!(plane_sieve_bound(&h), Some(256));
    let h4 = SievingBound::new(vec![8, 8, 4, 2]);
    assert_eq!(plane_sieve_bound(&h4), None);
}

#[test]
fn test_default_key() {
    let h = SievingBound::new(vec![8, 8, 4]);
    let k = default_slicing_key(&h, 1000, 2, 1.0);
    assert_eq!(k.thresholds[0], 15);
    assert_eq!(k.thresholds[1], 255);
    assert_eq!(k.thresholds[FB_MAX_PARTS - 1], 1000);
}
