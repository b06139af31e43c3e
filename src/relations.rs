// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Relation candidates from sieve survivors.
//!
//! A cell surviving on every side is reconstructed into its element
//! a = MqLLL * c and each side's norm |Res(f_side, a)| is factored by
//! trial division over the factor base, with one large prime below the
//! side's bound allowed in the cofactor. The special-q divides its own
//! side by construction and is recorded like any other factor.
//!
//! Relations are written to stdout as
//!   c0,c1,...,ct-1:p,p,...:p,p,...
//! with the coordinates of a in decimal and each side's primes in
//! lowercase hex, repeated to their multiplicity. Diagnostics never go
//! to stdout.

use std::collections::HashSet;

use num_integer::Integer;
use num_traits::ToPrimitive;

use crate::arith::is_prime64;
use crate::fbase::FactorBase;
use crate::ideal::IdealSpq;
use crate::matz::{resultant, MatZ};
use crate::poly::PolyZ;
use crate::region::SievingBound;
use crate::Int;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Coefficients of the element a, positive leading coefficient.
    pub a: Vec<i64>,
    /// Per-side prime factorizations of |Res(f_side, a)|.
    pub factors: Vec<Vec<(u64, u32)>>,
}

impl Relation {
    /// Check the factorizations against freshly computed norms.
    pub fn verify(&self, polys: &[PolyZ]) -> bool {
        let ap = PolyZ::from_i64(&self.a);
        for (side, f) in polys.iter().enumerate() {
            let norm = resultant(f, &ap).abs();
            let mut prod = Int::ONE;
            for &(p, e) in &self.factors[side] {
                for _ in 0..e {
                    prod *= Int::from(p);
                }
            }
            if prod != norm {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, c) in self.a.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        for side in &self.factors {
            write!(f, ":")?;
            let mut first = true;
            for &(p, e) in side {
                for _ in 0..e {
                    if !first {
                        write!(f, ",")?;
                    }
                    write!(f, "{p:x}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

/// Indices common to every side's sorted survivor list.
fn intersect_sorted(lists: &[Vec<u64>]) -> Vec<u64> {
    let Some(first) = lists.first() else {
        return vec![];
    };
    let mut out = vec![];
    let mut cursors = vec![0usize; lists.len()];
    'outer: for &x in first {
        for (l, list) in lists.iter().enumerate().skip(1) {
            while cursors[l] < list.len() && list[cursors[l]] < x {
                cursors[l] += 1;
            }
            if cursors[l] >= list.len() {
                break 'outer;
            }
            if list[cursors[l]] != x {
                continue 'outer;
            }
        }
        out.push(x);
    }
    out
}

/// Trial-divide n by p, returning the exponent.
fn divide_out(n: &mut Int, p: u64) -> u32 {
    let pi = Int::from(p);
    let mut e = 0;
    loop {
        let (q, r) = n.div_rem(&pi);
        if r != Int::ZERO {
            return e;
        }
        *n = q;
        e += 1;
    }
}

/// Factor the survivors common to all sides; keep those whose every
/// side is factor-base-smooth up to one large prime below 2^lpb.
pub fn search_relations(
    survivors: &[Vec<u64>],
    h: &SievingBound,
    matrix: &MatZ,
    polys: &[PolyZ],
    fbs: &[FactorBase],
    lpb: &[u32],
    q_side: usize,
    spq: &IdealSpq,
) -> Vec<Relation> {
    let common = intersect_sorted(survivors);
    let fb_primes: Vec<Vec<u64>> = fbs.iter().map(|fb| fb.primes()).collect();
    let mut seen: HashSet<Vec<i64>> = HashSet::new();
    let mut rels = vec![];
    'cell: for idx in common {
        let c = h.coords(idx);
        let av = matrix.mul_vec_i64(&c);
        if av.iter().all(|x| *x == Int::ZERO) {
            continue;
        }
        // canonical sign and primitivity: the folded region double
        // counts +-a, and non-primitive elements duplicate relations
        let mut a: Vec<i64> = match av.iter().map(|x| x.to_i64()).collect() {
            Some(a) => a,
            None => continue,
        };
        if let Some(&lead) = a.iter().rev().find(|&&x| x != 0) {
            if lead < 0 {
                for x in a.iter_mut() {
                    *x = -*x;
                }
            }
        }
        let content = a.iter().fold(0i64, |g, &x| g.gcd(&x));
        if content > 1 {
            continue;
        }
        if !seen.insert(a.clone()) {
            continue;
        }
        let ap = PolyZ::from_i64(&a);

        let mut factors = Vec::with_capacity(polys.len());
        for side in 0..polys.len() {
            let mut norm = resultant(&polys[side], &ap).abs();
            if norm == Int::ZERO {
                continue 'cell;
            }
            let mut fs: Vec<(u64, u32)> = vec![];
            if side == q_side {
                let e = divide_out(&mut norm, spq.q());
                if e == 0 {
                    // the special-q must divide its side: numerical
                    // inconsistency, drop the cell
                    continue 'cell;
                }
                fs.push((spq.q(), e));
            }
            for &p in &fb_primes[side] {
                if norm == Int::ONE {
                    break;
                }
                let e = divide_out(&mut norm, p);
                if e > 0 {
                    fs.push((p, e));
                }
            }
            if norm != Int::ONE {
                let Some(cof) = norm.to_u64() else {
                    continue 'cell;
                };
                let in_bound = lpb[side] >= 64 || cof < 1u64 << lpb[side];
                if !in_bound || !is_prime64(cof) {
                    continue 'cell;
                }
                fs.push((cof, 1));
            }
            fs.sort_unstable();
            factors.push(fs);
        }
        rels.push(Relation { a, factors });
    }
    rels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ideal::Ideal1;

    #[test]
    fn test_intersect() {
        let lists = vec![vec![1, 3, 5, 9], vec![3, 4, 5, 10], vec![0, 3, 5, 6, 9]];
        assert_eq!(intersect_sorted(&lists), vec![3, 5]);
        assert_eq!(intersect_sorted(&[]), Vec::<u64>::new());
    }

    #[test]
    fn test_relation_display() {
        let r = Relation {
            a: vec![-3, 0, 2],
            factors: vec![vec![(2, 2), (31, 1)], vec![(255, 1)]],
        };
        assert_eq!(r.to_string(), "-3,0,2:2,2,1f:ff");
    }

    #[test]
    fn test_search_relations_end_to_end() {
        use crate::qlat::special_q_lattice;
        // Degree 1 sides keep norms tiny so every intersected survivor
        // should factor completely.
        let polys = vec![PolyZ::from_i64(&[-5, 1]), PolyZ::from_i64(&[2, 1, 0, 1])];
        let fbs: Vec<FactorBase> = polys.iter().map(|f| FactorBase::make(f, 200)).collect();
        let h = SievingBound::new(vec![3, 3, 2]);
        let roots = crate::poly::roots_mod_p(&polys[1], 211);
        let spq = IdealSpq::One(Ideal1::new(211, roots[0], 3, 0));
        let matrix = special_q_lattice(&spq, 3, None).unwrap();
        // declare every cell a survivor on both sides
        let all: Vec<u64> = (0..h.num_points()).collect();
        let survivors = vec![all.clone(), all];
        let rels = search_relations(
            &survivors,
            &h,
            &matrix,
            &polys,
            &fbs,
            &[40, 40],
            1,
            &spq,
        );
        assert!(!rels.is_empty());
        for r in &rels {
            assert!(r.verify(&polys), "{r}");
            // the special-q appears on its side
            assert!(r.factors[1].iter().any(|&(p, _)| p == 211));
        }
        // all relations are distinct
        let mut seen = HashSet::new();
        for r in &rels {
            assert!(seen.insert(r.a.clone()));
        }
    }
}
