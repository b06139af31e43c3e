// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Lattice enumeration helpers shared by the geometric sieves.
//!
//! The central tool is the Franke-Kleinjung reduction: given the rank 2
//! sublattice spanned by (r, 0) and (t1, 1), produce short vectors
//! e0 (first coordinate <= 0) and e1 (first coordinate >= 0) such that
//! e1.x - e0.x >= len. Walking a corridor of width len then never needs
//! more than one of e0, e1 or e0+e1 to reach the next lattice point
//! (Franke-Kleinjung, "Continued fractions and lattice sieving").
//!
//! The sphere enumeration at the end of the file is the textbook
//! Fincke-Pohst walk (Hanrot-Pujol-Stehle survey, IWCC 2011) used as a
//! reference enumeration to cross-check the sieves.

use crate::matz::MatI64;
use crate::region::{NormArray, SievingBound};

/// Short basis of a rank 2 sublattice suited to corridor walks.
/// Both vectors have full region dimension; coordinates beyond the
/// first two are zero.
#[derive(Clone, Debug)]
pub struct FkBasis {
    pub e0: Vec<i64>,
    pub e1: Vec<i64>,
}

/// Reduce the pair v0 = (r, 0, ...), v1 = (t1, 1, 0, ...) for corridors
/// of width `len`. Returns None when the sublattice cannot satisfy the
/// corridor conditions (t1 = 0, degenerate intermediate vectors, or
/// r too small for the requested width).
pub fn fk_reduce(v0: &[i64], v1: &[i64], len: i64) -> Option<FkBasis> {
    let dim = v0.len();
    debug_assert_eq!(dim, v1.len());
    if v0[1] != 0 || v1[1] != 1 {
        return None;
    }
    let r = v0[0];
    if r <= 0 || len <= 1 {
        return None;
    }
    let t1 = v1[0].rem_euclid(r);
    if t1 == 0 {
        return None;
    }
    let (mut a0, mut b0, mut a1, mut b1) = (-r, 0i64, t1, 1i64);
    loop {
        if a1 < len {
            break;
        }
        let k = a0 / a1;
        a0 -= k * a1;
        b0 -= k * b1;
        if -a0 < len {
            break;
        }
        if a0 == 0 {
            return None;
        }
        let k = a1 / a0;
        a1 -= k * a0;
        b1 -= k * b0;
        if a1 == 0 {
            return None;
        }
    }
    if a1 >= len {
        // -a0 < len <= a1: partially reduce a1 so that the corridor gap
        // a1 - a0 >= len is preserved.
        if a0 == 0 {
            return None;
        }
        let k = (a1 - len) / (-a0) + 1;
        a1 += k * a0;
        b1 += k * b0;
    } else if a0 <= -len {
        if a1 == 0 {
            return None;
        }
        let k = (-len - a0) / a1 + 1;
        a0 += k * a1;
        b0 += k * b1;
    }
    // postconditions
    if !(-len < a0 && a0 <= 0 && 0 <= a1 && a1 < len && a1 - a0 >= len && b0 > 0 && b1 > 0) {
        return None;
    }
    let mut e0 = vec![0i64; dim];
    let mut e1 = vec![0i64; dim];
    e0[0] = a0;
    e0[1] = b0;
    e1[0] = a1;
    e1[1] = b1;
    Some(FkBasis { e0, e1 })
}

#[inline]
fn add_assign(v: &mut [i64], e: &[i64]) {
    for i in 0..v.len() {
        v[i] += e[i];
    }
}

#[inline]
fn sub_assign(v: &mut [i64], e: &[i64]) {
    for i in 0..v.len() {
        v[i] -= e[i];
    }
}

/// Advance v to the next lattice point of the corridor
/// [amin, amin+len) with larger second coordinate.
/// Returns which step was taken: 0 -> e0, 1 -> e1, 2 -> e0+e1.
#[inline]
pub fn fk_next_pos(v: &mut [i64], fk: &FkBasis, amin: i64, len: i64) -> u8 {
    let x = v[0];
    if x + fk.e0[0] >= amin {
        add_assign(v, &fk.e0);
        0
    } else if x + fk.e1[0] < amin + len {
        add_assign(v, &fk.e1);
        1
    } else {
        add_assign(v, &fk.e0);
        add_assign(v, &fk.e1);
        2
    }
}

/// Mirror image of fk_next_pos: previous corridor point, smaller second
/// coordinate. The corridor parameter follows the reflected convention
/// of the caller (amin is the reflected lower bound).
#[inline]
pub fn fk_next_neg(v: &mut [i64], fk: &FkBasis, amin: i64, len: i64) -> u8 {
    let x = -v[0];
    if x + fk.e0[0] >= amin {
        sub_assign(v, &fk.e0);
        0
    } else if x + fk.e1[0] < amin + len {
        sub_assign(v, &fk.e1);
        1
    } else {
        sub_assign(v, &fk.e0);
        sub_assign(v, &fk.e1);
        2
    }
}

/// Bring the first coordinate of v into [amin, amin + len) by corridor
/// steps (which move the second coordinate as well).
pub fn corridor_reduce(v: &mut [i64], fk: &FkBasis, amin: i64, len: i64) {
    debug_assert!(fk.e0[0] < 0 && fk.e1[0] > 0);
    while v[0] >= amin + len {
        add_assign(v, &fk.e0);
    }
    while v[0] < amin {
        add_assign(v, &fk.e1);
    }
}

/// Array-index displacement caused by adding e to a region point.
pub fn index_disp(e: &[i64], h: &SievingBound) -> i64 {
    let mut d = 0i64;
    for i in 0..h.t() {
        d += e[i] * h.stride(i) as i64;
    }
    d
}

/// Candidate short step vectors from plane z to z+1: the 4 neighbor
/// combinations of vk against the rank 2 sublattice of (v0, v1).
pub fn sv4(v0: &[i64], v1: &[i64], vk: &[i64]) -> Vec<Vec<i64>> {
    let det = (v0[0] * v1[1] - v1[0] * v0[1]) as f64;
    debug_assert!(det != 0.0);
    let alpha = (vk[0] as f64 * v1[1] as f64 - v1[0] as f64 * vk[1] as f64) / det;
    let beta = (v0[0] as f64 * vk[1] as f64 - vk[0] as f64 * v0[1] as f64) / det;
    let mut out: Vec<Vec<i64>> = vec![];
    for a in [alpha.floor() as i64, alpha.ceil() as i64] {
        for b in [beta.floor() as i64, beta.ceil() as i64] {
            let mut w = vk.to_vec();
            for i in 0..w.len() {
                w[i] -= a * v0[i] + b * v1[i];
            }
            if !out.contains(&w) {
                out.push(w);
            }
        }
    }
    // prefer candidates close to the corridor axis
    out.sort_by_key(|w| (w[0].abs(), w[1].abs()));
    out
}

/// Gram-Schmidt orthogonalization over f64.
/// Returns (orthogonal vectors, mu matrix, squared norms).
pub fn gram_schmidt(basis: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>) {
    let n = basis.len();
    let mut ortho: Vec<Vec<f64>> = Vec::with_capacity(n);
    let mut mu = vec![vec![0f64; n]; n];
    let mut bnorm = vec![0f64; n];
    for i in 0..n {
        let mut v = basis[i].clone();
        for j in 0..i {
            let d: f64 = basis[i].iter().zip(&ortho[j]).map(|(a, b)| a * b).sum();
            mu[i][j] = d / bnorm[j];
            for k in 0..v.len() {
                v[k] -= mu[i][j] * ortho[j][k];
            }
        }
        bnorm[i] = v.iter().map(|x| x * x).sum();
        ortho.push(v);
    }
    (ortho, mu, bnorm)
}

/// All lattice points of the column lattice of mqr lying in the sieving
/// region, by Fincke-Pohst enumeration of a sphere covering the region.
pub fn enum_lattice_points(mqr: &MatI64, h: &SievingBound) -> Vec<Vec<i64>> {
    let n = h.t();
    debug_assert_eq!(mqr.n, n);
    let cols: Vec<Vec<i64>> = (0..n).map(|j| mqr.col(j)).collect();
    let basis: Vec<Vec<f64>> = cols
        .iter()
        .map(|c| c.iter().map(|&x| x as f64).collect())
        .collect();
    let (ortho, mu, bnorm) = gram_schmidt(&basis);
    if bnorm.iter().any(|&b| b < 1e-9) {
        return vec![];
    }
    // Sphere center: middle of the half-open last axis, origin elsewhere.
    let mut center = vec![0f64; n];
    center[n - 1] = (h.h[n - 1] as f64) / 2.0;
    let mut radius2 = 0f64;
    for i in 0..n - 1 {
        radius2 += (h.h[i] as f64) * (h.h[i] as f64);
    }
    radius2 += center[n - 1] * center[n - 1];
    let radius2 = radius2 * 1.000001 + 1e-6;

    // tau[i] = component of the center on the i-th Gram-Schmidt vector.
    let mut tau = vec![0f64; n];
    for i in 0..n {
        let d: f64 = center.iter().zip(&ortho[i]).map(|(a, b)| a * b).sum();
        tau[i] = d / bnorm[i];
    }

    let mut out = vec![];
    let mut x = vec![0i64; n];
    let mut l = vec![0f64; n];
    let centre = |i: usize, x: &[i64]| -> f64 {
        let mut c = tau[i];
        for j in i + 1..n {
            c -= mu[j][i] * x[j] as f64;
        }
        c
    };
    let mut i = n - 1;
    x[n - 1] = (tau[n - 1] - (radius2 / bnorm[n - 1]).sqrt()).ceil() as i64;
    loop {
        let ci = centre(i, &x);
        let t = x[i] as f64 - ci;
        let li = bnorm[i] * t * t;
        let rem = radius2 - l[i + 1..].iter().sum::<f64>();
        if li <= rem {
            l[i] = li;
            if i == 0 {
                let mut v = vec![0i64; n];
                for j in 0..n {
                    for k in 0..n {
                        v[k] += x[j] * cols[j][k];
                    }
                }
                if h.contains(&v) {
                    out.push(v);
                }
                x[0] += 1;
            } else {
                i -= 1;
                let ci2 = centre(i, &x);
                x[i] = (ci2 - ((rem - li) / bnorm[i]).sqrt()).ceil() as i64;
            }
        } else {
            i += 1;
            if i == n {
                break;
            }
            x[i] += 1;
        }
    }
    out
}

/// Reference sieve by sphere enumeration: decrement every region cell
/// of the Mqr lattice. Slower than the geometric sieves, used to
/// cross-check them.
pub fn enum_sieve(arr: &mut NormArray, h: &SievingBound, mqr: &MatI64, logp: u8) {
    for v in enum_lattice_points(mqr, h) {
        arr.sub(h.index(&v), logp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fk_reduce() {
        // lattice {(x, y): x = 13 y mod 101}, corridor of width 16
        let v0 = vec![101i64, 0, 0];
        let v1 = vec![13i64, 1, 0];
        let fk = fk_reduce(&v0, &v1, 16).unwrap();
        let (a0, b0) = (fk.e0[0], fk.e0[1]);
        let (a1, b1) = (fk.e1[0], fk.e1[1]);
        assert!(-16 < a0 && a0 <= 0, "{a0}");
        assert!(0 <= a1 && a1 < 16, "{a1}");
        assert!(a1 - a0 >= 16);
        assert!(b0 > 0 && b1 > 0);
        // both vectors belong to the lattice
        assert_eq!((a0 - 13 * b0).rem_euclid(101), 0);
        assert_eq!((a1 - 13 * b1).rem_euclid(101), 0);
    }

    #[test]
    fn test_fk_reduce_degenerate() {
        let v0 = vec![101i64, 0, 0];
        let v1 = vec![0i64, 1, 0];
        assert!(fk_reduce(&v0, &v1, 16).is_none());
    }

    #[test]
    fn test_fk_enumeration_covers_corridor() {
        // Walk the corridor [-8, 8) upwards and compare with brute force.
        let (r, t1, len) = (97i64, 35i64, 16i64);
        let fk = fk_reduce(&[r, 0], &[t1, 1], len).unwrap();
        let mut v = vec![0i64, 0];
        let mut seen = vec![(0i64, 0i64)];
        while v[1] < 40 {
            fk_next_pos(&mut v, &fk, -8, len);
            if v[1] < 40 {
                seen.push((v[0], v[1]));
            }
        }
        let mut brute = vec![];
        for y in 0..40i64 {
            for x in -8..8i64 {
                if (x - t1 * y).rem_euclid(r) == 0 {
                    brute.push((x, y));
                }
            }
        }
        assert_eq!(seen, brute);
    }

    #[test]
    fn test_fk_neg_mirrors_pos() {
        let (r, t1, len) = (97i64, 35i64, 16i64);
        let fk = fk_reduce(&[r, 0], &[t1, 1], len).unwrap();
        let mut v = vec![0i64, 0];
        let mut down = vec![];
        loop {
            fk_next_neg(&mut v, &fk, -7, len);
            if v[1] <= -40 {
                break;
            }
            down.push((v[0], v[1]));
        }
        let mut brute = vec![];
        // reflected corridor: -v in [-7, 9) means v in [-8, 7]
        for y in (-39..0i64).rev() {
            for x in -8..8i64 {
                if (x - t1 * y).rem_euclid(r) == 0 {
                    brute.push((x, y));
                }
            }
        }
        assert_eq!(down, brute);
    }

    #[test]
    fn test_index_disp() {
        let h = SievingBound::new(vec![4, 4, 2]);
        let c = vec![1i64, -2, 1];
        let base = h.first_point();
        let shifted: Vec<i64> = base.iter().zip(&c).map(|(a, b)| a + b).collect();
        assert_eq!(
            h.index(&shifted) as i64 - h.index(&base) as i64,
            index_disp(&c, &h)
        );
    }

    #[test]
    fn test_enum_lattice_points() {
        let h = SievingBound::new(vec![4, 4, 2]);
        // lattice {c : c0 + 2 c1 + 5 c2 = 0 mod 11}
        let mut m = MatI64::identity(3);
        m.set(0, 0, 11);
        m.set(0, 1, 11 - 2);
        m.set(0, 2, 11 - 5);
        let mut pts = enum_lattice_points(&m, &h);
        pts.sort();
        let mut brute = vec![];
        for idx in 0..h.num_points() {
            let c = h.coords(idx);
            if (c[0] + 2 * c[1] + 5 * c[2]).rem_euclid(11) == 0 {
                brute.push(c);
            }
        }
        brute.sort();
        assert_eq!(pts, brute);
    }
}
