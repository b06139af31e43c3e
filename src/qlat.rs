// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Special-q lattice construction and per-ideal projections.
//!
//! For a special-q ideal (q, g), the region elements divisible by the
//! ideal form a sublattice of Z^t; `build_mq` writes a basis of it as the
//! columns of Mq. After LLL reduction and sign normalization, the sieve
//! works entirely in reduced coordinates c with a = MqLLL * c.
//!
//! For each factor base ideal r, `compute_tqr_1` derives the linear form
//! Tqr over Z/r that vanishes exactly on the reduced coordinates of
//! elements divisible by r, and `compute_mqr_1` turns the form into a
//! basis (columns) of its kernel lattice. Those two objects are all the
//! line, plane and space sieves ever look at.

use crate::arith::{int_mod_u64, invmod64, mulmod64};
use crate::ideal::{Ideal1, IdealSpq, IdealU};
use crate::matz::{MatI64, MatZ};
use crate::Int;

/// Write the ideal lattice basis of the special-q into matrix columns.
pub fn build_mq(matrix: &mut MatZ, spq: &IdealSpq) {
    match spq {
        IdealSpq::One(i) => build_mq_1(matrix, i),
        IdealSpq::U(i) => build_mq_u(matrix, i),
    }
}

fn build_mq_1(matrix: &mut MatZ, ideal: &Ideal1) {
    let t = matrix.n;
    for row in 0..t {
        for col in 0..t {
            matrix.set(row, col, Int::ZERO);
        }
    }
    matrix.set(0, 0, Int::from(ideal.q));
    for i in 1..t {
        matrix.set(i, i, Int::ONE);
    }
    for col in 1..t {
        matrix.set(0, col, Int::from(ideal.tr[col - 1]));
    }
}

fn build_mq_u(matrix: &mut MatZ, ideal: &IdealU) {
    let t = matrix.n;
    let d = ideal.g.degree();
    for row in 0..t {
        for col in 0..t {
            matrix.set(row, col, Int::ZERO);
        }
    }
    for row in 0..d {
        matrix.set(row, row, Int::from(ideal.q));
    }
    for row in d..t {
        matrix.set(row, row, Int::ONE);
    }
    for col in d..t {
        for row in 0..d {
            matrix.set(row, col, Int::from(ideal.tr[row][col - d]));
        }
    }
}

/// Sign normalization: negate any column whose last entry is negative,
/// so that a = M * c always lands on the positive side of the folded
/// region. Idempotent.
pub fn reorganize(matrix: &mut MatZ) {
    let t = matrix.n;
    for col in 0..t {
        if matrix.at(t - 1, col) < Int::ZERO {
            for row in 0..t {
                let v = matrix.at(row, col);
                matrix.set(row, col, -v);
            }
        }
    }
}

/// The linear form over Z/r vanishing on reduced coordinates of
/// elements divisible by the degree 1 ideal r, normalized so the first
/// invertible entry is 1. None when the form degenerates (all entries
/// zero mod r, or a leading non-invertible entry for a prime power).
pub fn compute_tqr_1(matrix: &MatZ, t: usize, ideal: &Ideal1) -> Option<Vec<u64>> {
    let r = ideal.q;
    let mut tqr = vec![0u64; t];
    let mut pivot: Option<u64> = None;
    for j in 0..t {
        // Tqr_j = (row_0 - sum_k tr[k] row_{k+1}) applied to column j
        let mut v = matrix.at(0, j);
        for k in 0..t - 1 {
            v -= Int::from(ideal.tr[k]) * matrix.at(k + 1, j);
        }
        let vj = int_mod_u64(&v, r);
        match pivot {
            None => {
                if vj == 0 {
                    tqr[j] = 0;
                } else if let Some(inv) = invmod64(vj, r) {
                    tqr[j] = 1;
                    pivot = Some(inv);
                } else {
                    // non-invertible leading entry (prime power modulus)
                    return None;
                }
            }
            Some(inv) => {
                tqr[j] = mulmod64(inv, vj, r);
            }
        }
    }
    pivot.map(|_| tqr)
}

/// Restriction of Tqr used by the line sieve to solve directly for the
/// pivot coordinate: zeros, then -1 mod r at the pivot, then
/// -Tqr[j] mod r after it, so that c_pivot = sum_j pseudo[j] c_j mod r.
pub fn pseudo_tqr(tqr: &[u64], r: u64) -> Vec<u64> {
    let mut out = vec![0u64; tqr.len()];
    let mut i = 0;
    while i < tqr.len() && tqr[i] == 0 {
        i += 1;
    }
    debug_assert!(i < tqr.len() && tqr[i] == 1);
    let inverse = r - 1; // (-Tqr[i])^-1 = -1 mod r
    out[i] = inverse;
    for j in i + 1..tqr.len() {
        out[j] = mulmod64(inverse, tqr[j], r);
    }
    out
}

/// Position of the pivot (first nonzero) of Tqr.
pub fn tqr_pivot(tqr: &[u64]) -> usize {
    tqr.iter().position(|&x| x != 0).unwrap()
}

/// Basis (columns) of the kernel lattice {c : Tqr . c = 0 mod r}:
/// identity, except the pivot column scaled by r and the pivot row of
/// later columns carrying -Tqr[j] mod r.
pub fn compute_mqr_1(tqr: &[u64], t: usize, r: u64) -> MatI64 {
    let index = tqr_pivot(tqr);
    let mut mqr = MatI64::identity(t);
    mqr.set(index, index, r as i64);
    for col in index + 1..t {
        if tqr[col] != 0 {
            mqr.set(index, col, (r - tqr[col]) as i64);
        }
    }
    mqr
}

/// Reduction matrix for a degree > 1 ideal: d rows of residues mod r.
/// The enumeration path consuming this is deliberately conservative,
/// see the module documentation of `sieve`.
pub fn compute_tqr_u(matrix: &MatZ, t: usize, ideal: &IdealU) -> Vec<Vec<u64>> {
    let r = ideal.q;
    let d = ideal.g.degree();
    let mut tqr = vec![vec![0u64; t]; d];
    for row in 0..d {
        for j in 0..t {
            let mut v = matrix.at(row, j);
            for k in 0..t - d {
                v -= Int::from(ideal.tr[row][k]) * matrix.at(k + d, j);
            }
            tqr[row][j] = int_mod_u64(&v, r);
        }
    }
    tqr
}

/// Build, reduce and orient the lattice basis for one special-q.
/// None when the lattice is degenerate (LLL detects dependent columns),
/// in which case the caller skips the special-q with a diagnostic.
pub fn special_q_lattice(spq: &IdealSpq, t: usize, skew: Option<&[Int]>) -> Option<MatZ> {
    let mut m = MatZ::zero(t);
    build_mq(&mut m, spq);
    let ok = match skew {
        Some(s) => m.skew_lll_reduce(s),
        None => m.lll_reduce(),
    };
    if !ok {
        return None;
    }
    reorganize(&mut m);
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::{i64_mod_u64, powmod64};
    use crate::region::SievingBound;

    fn sample_spq() -> (IdealSpq, MatZ) {
        let spq = IdealSpq::One(Ideal1::new(1009, 17, 3, 10));
        let m = special_q_lattice(&spq, 3, None).unwrap();
        (spq, m)
    }

    #[test]
    fn test_lattice_containment() {
        // every a = MqLLL * c evaluates to 0 at rho mod q
        let (spq, m) = sample_spq();
        let (q, rho) = match &spq {
            IdealSpq::One(i) => (i.q, i.rho),
            _ => unreachable!(),
        };
        let h = SievingBound::new(vec![4, 4, 2]);
        for idx in (0..h.num_points()).step_by(7) {
            let c = h.coords(idx);
            let a = m.mul_vec_i64(&c);
            let mut v = 0u64;
            for (k, ak) in a.iter().enumerate() {
                let akq = int_mod_u64(ak, q);
                v = (v + mulmod64(akq, powmod64(rho, k as u64, q), q)) % q;
            }
            assert_eq!(v, 0, "a({rho}) != 0 mod {q} for c = {c:?}");
        }
    }

    #[test]
    fn test_reorganize_idempotent() {
        let (_, mut m) = sample_spq();
        let once = m.clone();
        reorganize(&mut m);
        assert_eq!(m, once);
    }

    #[test]
    fn test_tqr_congruence() {
        let (spq, m) = sample_spq();
        let q = spq.q();
        // a small factor base ideal of the same field x - 17 mod 1009:
        // pick r = 53 with some root
        let r = Ideal1::new(53, 29, 3, 6);
        let tqr = compute_tqr_1(&m, 3, &r).unwrap();
        assert_eq!(tqr[tqr_pivot(&tqr)], 1);
        let h = SievingBound::new(vec![6, 6, 3]);
        let mut hits = 0;
        for idx in 0..h.num_points() {
            let c = h.coords(idx);
            // direct divisibility: a(29) = 0 mod 53
            let a = m.mul_vec_i64(&c);
            let mut v = 0u64;
            for (k, ak) in a.iter().enumerate() {
                let akr = int_mod_u64(ak, r.q);
                v = (v + mulmod64(akr, powmod64(r.rho, k as u64, r.q), r.q)) % r.q;
            }
            // form value
            let mut f = 0u64;
            for j in 0..3 {
                f = (f + mulmod64(tqr[j], i64_mod_u64(c[j], r.q), r.q)) % r.q;
            }
            assert_eq!(v == 0, f == 0, "c = {c:?}");
            if v == 0 {
                hits += 1;
            }
        }
        assert!(hits > 0);
        let _ = q;
    }

    #[test]
    fn test_mqr_kernel() {
        let tqr = vec![1u64, 4, 9];
        let mqr = compute_mqr_1(&tqr, 3, 13);
        for col in 0..3 {
            let v = mqr.col(col);
            let mut f = 0i64;
            for j in 0..3 {
                f += tqr[j] as i64 * v[j];
            }
            assert_eq!(f.rem_euclid(13), 0);
        }
        assert_eq!(mqr.at(0, 0), 13);
    }

    #[test]
    fn test_pseudo_tqr() {
        let r = 13;
        let tqr = vec![0u64, 1, 5, 7];
        let ps = pseudo_tqr(&tqr, r);
        assert_eq!(ps[0], 0);
        assert_eq!(ps[1], 12);
        // for any c with Tqr.c = 0, c_1 = sum_{j>1} ps[j] c_j mod r
        let c = [3i64, -5 - 7 * 2, 1, 2];
        let dot: i64 = tqr.iter().zip(&c).map(|(&a, &b)| a as i64 * b).sum();
        assert_eq!(dot.rem_euclid(13), 0);
        let mut s = 0u64;
        for j in 2..4 {
            s = (s + mulmod64(ps[j], i64_mod_u64(c[j], r), r)) % r;
        }
        assert_eq!(s, i64_mod_u64(c[1], r));
    }

    #[test]
    fn test_build_mq_u_containment() {
        use crate::poly::{PolyP, PolyZ};
        // degree 2 special-q (13, x^2 + 1); x^2 + 1 is irreducible mod 13? no:
        // 5^2 = 25 = -1 mod 13, so use mod 7 instead where it is irreducible
        let g = PolyZ::from_i64(&[1, 0, 1]).reduce_mod(7);
        let spq = IdealSpq::U(IdealU::new(7, g.clone(), 3, 0));
        let mut m = MatZ::zero(3);
        build_mq(&mut m, &spq);
        let h = crate::region::SievingBound::new(vec![4, 4, 2]);
        for idx in 0..h.num_points() {
            let c = h.coords(idx);
            let a = m.mul_vec_i64(&c);
            let ap = PolyP::new(7, a.iter().map(|x| int_mod_u64(x, 7)).collect());
            assert!(ap.rem(&g).is_zero(), "c = {c:?}");
        }
    }

    #[test]
    fn test_tqr_u_matches_direct() {
        use crate::poly::PolyZ;
        // special-q of degree 1, projecting a degree 2 ideal (r, g)
        let (_, m) = sample_spq();
        let g = PolyZ::from_i64(&[1, 0, 1]).reduce_mod(7); // x^2 + 1 mod 7
        let idu = IdealU::new(7, g.clone(), 3, 3);
        let tqr = compute_tqr_u(&m, 3, &idu);
        assert_eq!(tqr.len(), 2);
        let h = SievingBound::new(vec![4, 4, 2]);
        for idx in 0..h.num_points() {
            let c = h.coords(idx);
            let a = m.mul_vec_i64(&c);
            // direct: g | a mod 7
            let ap = crate::poly::PolyP::new(
                7,
                a.iter().map(|x| int_mod_u64(x, 7)).collect(),
            );
            let direct = ap.rem(&g).is_zero();
            // via Tqr rows: all rows must vanish on c
            let mut all = true;
            for row in &tqr {
                let mut f = 0u64;
                for j in 0..3 {
                    f = (f + mulmod64(row[j], i64_mod_u64(c[j], 7), 7)) % 7;
                }
                all &= f == 0;
            }
            assert_eq!(direct, all, "c = {c:?}");
        }
    }
}
