// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Line sieve: direct arithmetic progressions along axis 0.
//!
//! For an ideal r, the reduced coordinates satisfying the congruence
//! Tqr . c = 0 mod r form, for each choice of the outer coordinates, an
//! arithmetic progression of step r along the pivot axis. Walking those
//! progressions is the cheapest enumeration when r is small against the
//! axis width (at least one hit per line).
//!
//! When the pivot coordinate is preceded by free coordinates (zero
//! entries of the pseudo form), all choices of the free coordinates are
//! hits as well: they occupy contiguous array cells below the pivot
//! stride, so whole runs are decremented without recomputing anything.

use crate::ideal::Ideal1;
use crate::qlat::{pseudo_tqr, tqr_pivot};
use crate::region::{NormArray, SievingBound};

/// A consumer of sieve hits. The norm array takes decrements directly;
/// a bucket array records them for a later replay.
pub trait SieveDest {
    fn hit(&mut self, index: u64, logp: u8, p: u64);
    /// A contiguous run of `len` hits starting at `index`.
    fn hit_run(&mut self, index: u64, len: u64, logp: u8, p: u64) {
        for k in 0..len {
            self.hit(index + k, logp, p);
        }
    }
}

impl SieveDest for NormArray {
    #[inline]
    fn hit(&mut self, index: u64, logp: u8, _p: u64) {
        self.sub(index, logp);
    }
}

/// Sieve one ideal over the whole region.
pub fn line_sieve(dest: &mut impl SieveDest, h: &SievingBound, ideal: &Ideal1, tqr: &[u64]) {
    let t = h.t();
    let r = ideal.q;
    debug_assert!(r < 1 << 31);
    let pseudo = pseudo_tqr(tqr, r);
    let index = tqr_pivot(tqr);

    let mut c = h.first_point();

    if index + 1 == t {
        // The congruence only constrains the last coordinate: all lower
        // coordinates are free, a single degenerate progression remains.
        let mut number_c_l = 1u64;
        for i in 0..index {
            number_c_l *= 2 * h.h[i] as u64;
        }
        line_sieve_ci(dest, h, &mut c, ideal, 0, index, number_c_l);
        return;
    }

    // Pre-decrement so the first odometer step restores the start point.
    c[index + 1] -= 1;
    let mut ci: i64 = 0;
    for j in index + 1..t {
        ci += pseudo[j] as i64 * c[j];
        ci = ci.rem_euclid(r as i64);
    }
    let mut number_c = h.num_points();
    let mut number_c_l = 1u64;
    for i in 0..index + 1 {
        number_c = number_c / (2 * h.h[i] as u64);
        number_c_l *= 2 * h.h[i] as u64;
    }
    number_c_l /= 2 * h.h[index] as u64;

    for _ in 0..number_c {
        let pos = h.add_one_at(&mut c, index + 1);
        update_ci(&mut ci, index, pos, &pseudo, r, h);
        line_sieve_one(dest, h, &mut c, ideal, &ci, index, number_c_l);
    }
}

/// Maintain ci = sum_{j>i} pseudo[j] c_j mod r across one odometer step:
/// coordinates between i and pos wrapped from h-1 back to -h, the
/// coordinate at pos gained one.
fn update_ci(ci: &mut i64, i: usize, pos: usize, pseudo: &[u64], r: u64, h: &SievingBound) {
    let r = r as i64;
    for j in i + 1..pos {
        *ci -= pseudo[j] as i64 * (2 * h.h[j] as i64 - 1);
        *ci = ci.rem_euclid(r);
    }
    *ci += pseudo[pos] as i64;
    *ci = ci.rem_euclid(r);
    debug_assert!(*ci >= 0 && *ci < r);
}

fn line_sieve_one(
    dest: &mut impl SieveDest,
    h: &SievingBound,
    c: &mut [i64],
    ideal: &Ideal1,
    ci: &i64,
    i: usize,
    number_c_l: u64,
) {
    // Least admissible pivot value congruent to ci.
    let lb: i64 = if i < h.t() - 1 { -(h.h[i] as i64) } else { 0 };
    let r = ideal.q as i64;
    let mut k = (lb - ci) / (-r);
    if lb - ci > 0 {
        k -= 1;
    }
    let ci_first = -k * r + ci;
    debug_assert!(ci_first >= lb && ci_first - r < lb);
    line_sieve_ci(dest, h, c, ideal, ci_first, i, number_c_l);
}

/// Walk the progression ci, ci+r, ... along axis i, decrementing the
/// run of free lower coordinates at each stop.
fn line_sieve_ci(
    dest: &mut impl SieveDest,
    h: &SievingBound,
    c: &mut [i64],
    ideal: &Ideal1,
    ci: i64,
    i: usize,
    number_c_l: u64,
) {
    debug_assert!(i == 0 || number_c_l % 2 == 0 || number_c_l == 1);
    let r = ideal.q;
    if ci >= h.h[i] as i64 {
        return;
    }
    c[i] = ci;
    // free coordinates below the pivot sit at their minimum in c
    let mut index = h.index(c);
    dest.hit_run(index, number_c_l, ideal.logp, r);
    let mut tmp = ci + r as i64;
    while tmp < h.h[i] as i64 {
        index += r * number_c_l;
        dest.hit_run(index, number_c_l, ideal.logp, r);
        tmp += r as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_hits(h: &SievingBound, ideal: &Ideal1, tqr: &[u64]) -> Vec<u64> {
        let mut arr = NormArray::new(h.num_points());
        line_sieve(&mut arr, h, ideal, tqr);
        (0..h.num_points())
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

    #[test]
    fn test_concrete_scenario() {
        // H = {4, 4, 2}, r = 3, Tqr = [1, 0, 2]: hits are exactly
        // c0 + 2 c2 = 0 mod 3, verified against full brute force.
        let h = SievingBound::new(vec![4, 4, 2]);
        let ideal = Ideal1::new(3, 1, 3, 1);
        let tqr = vec![1u64, 0, 2];
        assert_eq!(collect_hits(&h, &ideal, &tqr), brute_hits(&h, 3, &tqr));
    }

    #[test]
    fn test_zero_leading_coefficient() {
        // pivot on axis 1
        let h = SievingBound::new(vec![4, 4, 2]);
        let ideal = Ideal1::new(5, 1, 3, 1);
        let tqr = vec![0u64, 1, 3];
        assert_eq!(collect_hits(&h, &ideal, &tqr), brute_hits(&h, 5, &tqr));
    }

    #[test]
    fn test_pivot_last_axis() {
        let h = SievingBound::new(vec![2, 2, 4]);
        let ideal = Ideal1::new(3, 1, 3, 1);
        let tqr = vec![0u64, 0, 1];
        assert_eq!(collect_hits(&h, &ideal, &tqr), brute_hits(&h, 3, &tqr));
    }

    #[test]
    fn test_degenerate_large_r() {
        // r far beyond the region diameter: only the kernel plane c0 = 0
        // remains, agreement with brute force is still exact.
        let h = SievingBound::new(vec![4, 4, 2]);
        let ideal = Ideal1::new(997, 1, 3, 1);
        let tqr = vec![1u64, 5, 7];
        assert_eq!(collect_hits(&h, &ideal, &tqr), brute_hits(&h, 997, &tqr));
    }

    #[test]
    fn test_multiple_decrement_depth() {
        // each hit decremented exactly once
        let h = SievingBound::new(vec![4, 4, 2]);
        let ideal = Ideal1::new(3, 1, 3, 7);
        let tqr = vec![1u64, 2, 1];
        let mut arr = NormArray::new(h.num_points());
        line_sieve(&mut arr, &h, &ideal, &tqr);
        for idx in 0..h.num_points() {
            let v = arr.v[idx as usize];
            assert!(v == u8::MAX || v == u8::MAX - 7, "idx {idx}: {v}");
        }
    }

    #[test]
    fn test_four_dimensions() {
        let h = SievingBound::new(vec![3, 2, 2, 2]);
        let ideal = Ideal1::new(5, 1, 4, 1);
        let tqr = vec![1u64, 2, 3, 4];
        assert_eq!(collect_hits(&h, &ideal, &tqr), brute_hits(&h, 5, &tqr));
    }
}
