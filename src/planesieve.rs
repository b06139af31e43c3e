// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Plane sieve: Franke-Kleinjung enumeration of 2-plane slices.
//!
//! For medium ideals the kernel lattice of Tqr is enumerated one
//! z-slice at a time. Inside a slice, the reduced vectors e0, e1 walk
//! the corridor [-h0, h0) upwards then downwards from a starting point;
//! between slices, precomputed short step vectors jump to the next
//! z value and the starting point is corrected back into the corridor.
//!
//! The norm array index is maintained incrementally: each basis step
//! has a constant array displacement, so the inner loop never recomputes
//! a full index.

use crate::ideal::Ideal1;
use crate::latenum::{
    corridor_reduce, fk_next_neg, fk_next_pos, fk_reduce, index_disp, sv4, FkBasis,
};
use crate::matz::MatI64;
use crate::region::{NormArray, SievingBound};
use crate::SieveOutcome;

/// Per-slice stepping state, shared with the space sieve fallback.
pub struct PlaneStepper {
    pub fk: Option<FkBasis>,
    /// Kernel basis columns. When Franke-Kleinjung is unavailable the
    /// orthogonal shape requires cols[1] = (0, 1, 0, ...).
    pub cols: Vec<Vec<i64>>,
    /// Step vector candidates towards each of the t-2 outer dimensions.
    pub sv: Vec<Vec<Vec<i64>>>,
}

impl PlaneStepper {
    /// None when neither the Franke-Kleinjung nor the orthogonal shape
    /// applies: the caller reports the ideal as unsupported.
    pub fn new(mqr: &MatI64, h: &SievingBound) -> Option<PlaneStepper> {
        let t = h.t();
        let cols: Vec<Vec<i64>> = (0..t).map(|j| mqr.col(j)).collect();
        let fk = fk_reduce(&cols[0], &cols[1], 2 * h.h[0] as i64);
        if fk.is_none() {
            let ortho_ok =
                cols[1][0] == 0 && cols[1][1] == 1 && cols[1][2..].iter().all(|&x| x == 0);
            if !ortho_ok || cols[0][1] != 0 {
                return None;
            }
        }
        let sv = (2..t).map(|k| sv4(&cols[0], &cols[1], &cols[k])).collect();
        Some(PlaneStepper { fk, cols, sv })
    }

    /// Move the starting point to an adjacent slice of outer dimension
    /// `dim` (region coordinate dim >= 2), then bring its first
    /// coordinate back into the corridor.
    pub fn next_plane(&self, vs: &mut Vec<i64>, dim: usize, h: &SievingBound) {
        let h0 = h.h[0] as i64;
        match &self.fk {
            Some(fk) => {
                // candidate step vector leaving the smallest |y|
                let mut best: Option<Vec<i64>> = None;
                for cand in &self.sv[dim - 2] {
                    let mut w: Vec<i64> = vs.iter().zip(cand).map(|(a, b)| a + b).collect();
                    corridor_reduce(&mut w, fk, -h0, 2 * h0);
                    match &best {
                        Some(b) if b[1].abs() <= w[1].abs() => {}
                        _ => best = Some(w),
                    }
                }
                *vs = best.unwrap();
            }
            None => {
                // orthogonal shape: cols[1] = (0, 1, 0, ...) cancels the
                // second coordinate exactly, cols[0] = (r, 0, ...) may or
                // may not reach the corridor.
                let sv0 = &self.sv[dim - 2][0];
                for i in 0..vs.len() {
                    vs[i] += sv0[i];
                }
                let y = vs[1];
                for i in 0..vs.len() {
                    vs[i] -= y * self.cols[1][i];
                }
                let r = self.cols[0][0];
                let xm = vs[0].rem_euclid(r);
                if xm < h0 {
                    vs[0] = xm;
                } else if xm >= r - h0 {
                    vs[0] = xm - r;
                }
                // otherwise no representative lies inside the corridor:
                // the point stays outside and the slice is skipped
            }
        }
    }
}

/// Sieve one ideal with the plane sieve.
pub fn plane_sieve(
    arr: &mut NormArray,
    h: &SievingBound,
    ideal: &Ideal1,
    mqr: &MatI64,
) -> SieveOutcome {
    let t = h.t();
    debug_assert!(t >= 3);
    let Some(stepper) = PlaneStepper::new(mqr, h) else {
        return SieveOutcome::Unsupported;
    };

    // Starting point: outer dimensions 2..t-2 at their minimum, the last
    // at 0, and the fastest outer dimension one step before its minimum
    // so the first advance lands exactly on the first slice.
    let mut vs = vec![0i64; t];
    for dim in 2..t - 1 {
        let sv0 = &stepper.sv[dim - 2][0];
        for i in 0..t {
            vs[i] -= h.h[dim] as i64 * sv0[i];
        }
    }
    {
        let sv0 = &stepper.sv[0][0];
        for i in 0..t {
            vs[i] -= sv0[i];
        }
    }
    stepper.next_plane(&mut vs, 2, h);

    let (disp_e0, disp_e1) = match &stepper.fk {
        Some(fk) => (index_disp(&fk.e0, h), index_disp(&fk.e1, h)),
        None => (0, index_disp(&stepper.cols[1], h)),
    };

    // Snapshots for the odometer over outer dimensions.
    let mut refresh: Vec<Vec<i64>> = vec![vs.clone(); t - 2];

    let mut size = h.h[t - 1] as u64;
    for i in 2..t - 1 {
        size *= 2 * h.h[i] as u64;
    }

    for _ in 0..size {
        match &stepper.fk {
            Some(fk) => enum_plane(arr, &vs, fk, disp_e0, disp_e1, h, ideal.logp),
            None => enum_plane_ortho(arr, &vs, disp_e1, h, ideal.logp),
        }
        find_new_vs(&stepper, &mut vs, &mut refresh, h);
    }
    SieveOutcome::Done
}

/// Odometer over the outer dimensions: advance the first dimension not
/// at its maximum, restoring wrapped dimensions from their snapshots.
fn find_new_vs(
    stepper: &PlaneStepper,
    vs: &mut Vec<i64>,
    refresh: &mut [Vec<i64>],
    h: &SievingBound,
) {
    let t = h.t();
    let mut k = 2usize;
    while k < t {
        if vs[k] >= h.h[k] as i64 - 1 {
            *vs = refresh[k - 2].clone();
            k += 1;
        } else {
            break;
        }
    }
    if k < t {
        stepper.next_plane(vs, k, h);
        for i in 0..k - 2 {
            refresh[i] = vs.clone();
        }
    }
}

/// Enumerate one slice with the Franke-Kleinjung walk, in both
/// directions from the starting point.
fn enum_plane(
    arr: &mut NormArray,
    vs: &[i64],
    fk: &FkBasis,
    disp_e0: i64,
    disp_e1: i64,
    h: &SievingBound,
    logp: u8,
) {
    let h0 = h.h[0] as i64;
    let h1 = h.h[1] as i64;
    debug_assert!(vs[0] >= -h0 && vs[0] < h0);
    let disp = |s: u8| match s {
        0 => disp_e0,
        1 => disp_e1,
        _ => disp_e0 + disp_e1,
    };

    // upwards in y (the y coordinate of the walk is monotone increasing)
    let mut v = vs.to_vec();
    let mut index_v: i64 = 0;
    let mut inside = false;
    let mut last_step: u8 = 0;
    while v[1] < h1 {
        if v[1] >= -h1 {
            if !inside {
                index_v = h.index(&v) as i64;
                inside = true;
            } else {
                index_v += disp(last_step);
            }
            arr.sub(index_v as u64, logp);
        }
        last_step = fk_next_pos(&mut v, fk, -h0, 2 * h0);
    }

    // downwards in y, skipping the starting point already handled above
    let mut v = vs.to_vec();
    let mut index_v: i64 = 0;
    let mut inside = false;
    let mut last_step = fk_next_neg(&mut v, fk, -h0 + 1, 2 * h0);
    while v[1] >= -h1 {
        if v[1] < h1 {
            if !inside {
                index_v = h.index(&v) as i64;
                inside = true;
            } else {
                index_v -= disp(last_step);
            }
            arr.sub(index_v as u64, logp);
        }
        last_step = fk_next_neg(&mut v, fk, -h0 + 1, 2 * h0);
    }
}

/// Orthogonal slice: a single admissible column, every y.
fn enum_plane_ortho(arr: &mut NormArray, vs: &[i64], disp_e1: i64, h: &SievingBound, logp: u8) {
    let h0 = h.h[0] as i64;
    let h1 = h.h[1] as i64;
    debug_assert_eq!(vs[1], 0);
    if vs[0] >= h0 || vs[0] < -h0 {
        return;
    }
    let mut v = vs.to_vec();
    v[1] = -h1;
    let mut index_v = h.index(&v) as i64;
    arr.sub(index_v as u64, logp);
    for _ in -h1 + 1..h1 {
        index_v += disp_e1;
        arr.sub(index_v as u64, logp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qlat::compute_mqr_1;

    fn collect(arr: &NormArray) -> Vec<u64> {
        (0..arr.len())
            .filter(|&i| arr.v[i as usize] < u8::MAX)
            .collect()
    }

    fn brute_hits(h: &SievingBound, r: u64, tqr: &[u64]) -> Vec<u64> {
        (0..h.num_points())
            .filter(|&idx| {
                let c = h.coords(idx);
                let dot: i64 = tqr.iter().zip(&c).map(|(&a, &b)| a as i64 * b).sum();
                dot.rem_euclid(r as i64) == 0
            })
            .collect()
    }

    fn check_agreement(h: &SievingBound, r: u64, tqr: Vec<u64>) {
        let ideal = Ideal1::new(r, 1, h.t(), 1);
        let mqr = compute_mqr_1(&tqr, h.t(), r);
        let mut arr = NormArray::new(h.num_points());
        assert_eq!(plane_sieve(&mut arr, h, &ideal, &mqr), SieveOutcome::Done);
        assert_eq!(collect(&arr), brute_hits(h, r, &tqr), "r = {r}");
    }

    #[test]
    fn test_plane_sieve_medium() {
        let h = SievingBound::new(vec![8, 8, 4]);
        check_agreement(&h, 23, vec![1, 7, 11]);
        check_agreement(&h, 97, vec![1, 55, 73]);
        check_agreement(&h, 257, vec![1, 19, 101]);
    }

    #[test]
    fn test_plane_sieve_ortho() {
        // Tqr[1] = 0 leads to the orthogonal shape
        let h = SievingBound::new(vec![8, 8, 4]);
        check_agreement(&h, 17, vec![1, 0, 5]);
        check_agreement(&h, 101, vec![1, 0, 33]);
    }

    #[test]
    fn test_plane_sieve_degenerate_large() {
        let h = SievingBound::new(vec![8, 8, 4]);
        check_agreement(&h, 100003, vec![1, 17, 23]);
    }

    #[test]
    fn test_plane_sieve_unsupported() {
        // pivot not on axis 0: the kernel basis has a unit first column
        // and the plane sieve must refuse rather than sieve nonsense
        let h = SievingBound::new(vec![8, 8, 4]);
        let tqr = vec![0u64, 1, 5];
        let ideal = Ideal1::new(31, 1, 3, 1);
        let mqr = compute_mqr_1(&tqr, 3, 31);
        assert_eq!(mqr.at(0, 0), 1);
        let mut arr = NormArray::new(h.num_points());
        assert_eq!(
            plane_sieve(&mut arr, &h, &ideal, &mqr),
            SieveOutcome::Unsupported
        );
    }

    #[test]
    fn test_plane_sieve_four_dims() {
        let h = SievingBound::new(vec![4, 4, 2, 2]);
        check_agreement(&h, 67, vec![1, 9, 25, 31]);
    }

    #[test]
    fn test_single_decrement() {
        let h = SievingBound::new(vec![8, 8, 4]);
        let tqr = vec![1u64, 7, 11];
        let ideal = Ideal1::new(23, 1, 3, 5);
        let mqr = compute_mqr_1(&tqr, 3, 23);
        let mut arr = NormArray::new(h.num_points());
        plane_sieve(&mut arr, &h, &ideal, &mqr);
        for idx in 0..h.num_points() {
            let v = arr.v[idx as usize];
            assert!(v == u8::MAX || v == u8::MAX - 5, "idx {idx}: {v}");
        }
    }
}
