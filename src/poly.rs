// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Dense univariate polynomials.
//!
//! `PolyZ` has multi-precision integer coefficients and is used for the
//! number field polynomials and for sieve region elements a = M*c.
//! `PolyP` has u64 coefficients modulo a prime p; it backs root finding
//! and factorization mod p, which the driver needs to factor f modulo a
//! special-q candidate (Cantor-Zassenhaus, as in standard references).
//!
//! Factorization assumes p odd and larger than deg(f); special-q's and
//! factor base primes always satisfy this.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arith::{self, int_mod_u64, invmod64, mulmod64};
use crate::{Int, Uint};

/// A polynomial with integer coefficients, c[i] the coefficient of x^i.
/// Invariant: no trailing zero coefficient (the zero polynomial is empty).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyZ {
    pub c: Vec<Int>,
}

impl PolyZ {
    pub fn new(mut c: Vec<Int>) -> Self {
        while c.last() == Some(&Int::ZERO) {
            c.pop();
        }
        PolyZ { c }
    }

    pub fn from_i64(c: &[i64]) -> Self {
        Self::new(c.iter().map(|&x| Int::from(x)).collect())
    }

    pub fn is_zero(&self) -> bool {
        self.c.is_empty()
    }

    /// Degree; the zero polynomial has degree 0 by convention here,
    /// callers interested in the distinction test is_zero().
    pub fn degree(&self) -> usize {
        self.c.len().saturating_sub(1)
    }

    pub fn eval(&self, x: &Int) -> Int {
        let mut r = Int::ZERO;
        for c in self.c.iter().rev() {
            r = r * *x + *c;
        }
        r
    }

    pub fn infinity_norm(&self) -> f64 {
        self.c
            .iter()
            .map(|c| arith::int_to_f64(c).abs())
            .fold(0.0, f64::max)
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.c.iter().map(arith::int_to_f64).collect()
    }

    pub fn reduce_mod(&self, p: u64) -> PolyP {
        let c = self.c.iter().map(|x| int_mod_u64(x, p)).collect();
        PolyP::new(p, c)
    }
}

/// A polynomial over Z/p, p an odd prime below 2^63.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyP {
    pub p: u64,
    pub c: Vec<u64>,
}

impl PolyP {
    pub fn new(p: u64, mut c: Vec<u64>) -> Self {
        for x in c.iter_mut() {
            *x %= p;
        }
        while c.last() == Some(&0) {
            c.pop();
        }
        PolyP { p, c }
    }

    pub fn zero(p: u64) -> Self {
        PolyP { p, c: vec![] }
    }

    pub fn x(p: u64) -> Self {
        PolyP { p, c: vec![0, 1] }
    }

    pub fn is_zero(&self) -> bool {
        self.c.is_empty()
    }

    pub fn degree(&self) -> usize {
        self.c.len().saturating_sub(1)
    }

    fn lc(&self) -> u64 {
        *self.c.last().unwrap()
    }

    fn trim(&mut self) {
        while self.c.last() == Some(&0) {
            self.c.pop();
        }
    }

    pub fn eval(&self, x: u64) -> u64 {
        let mut r = 0u64;
        for &c in self.c.iter().rev() {
            r = (mulmod64(r, x, self.p) + c) % self.p;
        }
        r
    }

    pub fn add(&self, other: &PolyP) -> PolyP {
        debug_assert_eq!(self.p, other.p);
        let p = self.p;
        let n = self.c.len().max(other.c.len());
        let mut c = vec![0u64; n];
        for i in 0..n {
            let a = self.c.get(i).copied().unwrap_or(0);
            let b = other.c.get(i).copied().unwrap_or(0);
            c[i] = (a + b) % p;
        }
        PolyP::new(p, c)
    }

    pub fn sub(&self, other: &PolyP) -> PolyP {
        debug_assert_eq!(self.p, other.p);
        let p = self.p;
        let n = self.c.len().max(other.c.len());
        let mut c = vec![0u64; n];
        for i in 0..n {
            let a = self.c.get(i).copied().unwrap_or(0);
            let b = other.c.get(i).copied().unwrap_or(0);
            c[i] = (a + p - b) % p;
        }
        PolyP::new(p, c)
    }

    pub fn mul(&self, other: &PolyP) -> PolyP {
        debug_assert_eq!(self.p, other.p);
        if self.is_zero() || other.is_zero() {
            return PolyP::zero(self.p);
        }
        let p = self.p;
        let mut c = vec![0u64; self.c.len() + other.c.len() - 1];
        for (i, &a) in self.c.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in other.c.iter().enumerate() {
                c[i + j] = (c[i + j] + mulmod64(a, b, p)) % p;
            }
        }
        PolyP::new(p, c)
    }

    pub fn scale(&self, k: u64) -> PolyP {
        let p = self.p;
        PolyP::new(p, self.c.iter().map(|&a| mulmod64(a, k, p)).collect())
    }

    pub fn monic(&self) -> PolyP {
        if self.is_zero() {
            return self.clone();
        }
        let inv = invmod64(self.lc(), self.p).unwrap();
        self.scale(inv)
    }

    /// Euclidean division, returns (quotient, remainder).
    pub fn divrem(&self, d: &PolyP) -> (PolyP, PolyP) {
        debug_assert_eq!(self.p, d.p);
        assert!(!d.is_zero());
        let p = self.p;
        if self.c.len() < d.c.len() {
            return (PolyP::zero(p), self.clone());
        }
        let dinv = invmod64(d.lc(), p).unwrap();
        let mut r = self.clone();
        let mut q = vec![0u64; self.c.len() - d.c.len() + 1];
        while !r.is_zero() && r.c.len() >= d.c.len() {
            let k = r.c.len() - d.c.len();
            let coef = mulmod64(r.lc(), dinv, p);
            q[k] = coef;
            for (i, &dc) in d.c.iter().enumerate() {
                let t = mulmod64(coef, dc, p);
                r.c[k + i] = (r.c[k + i] + p - t) % p;
            }
            r.trim();
        }
        (PolyP::new(p, q), r)
    }

    pub fn rem(&self, d: &PolyP) -> PolyP {
        self.divrem(d).1
    }

    pub fn derivative(&self) -> PolyP {
        let p = self.p;
        if self.c.len() <= 1 {
            return PolyP::zero(p);
        }
        let c = self
            .c
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &a)| mulmod64(a, i as u64 % p, p))
            .collect();
        PolyP::new(p, c)
    }

    /// Monic gcd.
    pub fn gcd(&self, other: &PolyP) -> PolyP {
        let (mut a, mut b) = (self.clone(), other.clone());
        while !b.is_zero() {
            let r = a.rem(&b);
            a = b;
            b = r;
        }
        if a.is_zero() {
            a
        } else {
            a.monic()
        }
    }

    /// self^e modulo f, with a multi-precision exponent
    /// (needed for x^(p^d) style powers in equal-degree splitting).
    pub fn powmod(&self, e: &Uint, f: &PolyP) -> PolyP {
        let p = self.p;
        let mut base = self.rem(f);
        let mut result = PolyP::new(p, vec![1]);
        let mut e = *e;
        while e != Uint::ZERO {
            if e & Uint::ONE == Uint::ONE {
                result = result.mul(&base).rem(f);
            }
            base = base.mul(&base).rem(f);
            e >>= 1;
        }
        result
    }

    pub fn powmod64(&self, e: u64, f: &PolyP) -> PolyP {
        self.powmod(&Uint::from(e), f)
    }
}

/// Affine roots of f modulo p (each listed once, sorted).
/// An identically zero reduction yields no roots: the caller must treat
/// such primes specially.
pub fn roots_mod_p(f: &PolyZ, p: u64) -> Vec<u64> {
    let fp = f.reduce_mod(p);
    if fp.is_zero() || fp.degree() == 0 {
        return vec![];
    }
    if p == 2 {
        let mut roots = vec![];
        for r in 0..2u64 {
            if fp.eval(r) == 0 {
                roots.push(r);
            }
        }
        return roots;
    }
    // Split off the linear factors: g = gcd(x^p - x, f).
    let x = PolyP::x(p);
    let xp = x.powmod64(p, &fp);
    let g = xp.sub(&x).gcd(&fp);
    if g.degree() == 0 {
        return vec![];
    }
    let mut roots = vec![];
    let mut rng = StdRng::seed_from_u64(p);
    let mut stack = vec![g];
    while let Some(mut h) = stack.pop() {
        if h.degree() == 0 {
            continue;
        }
        if h.degree() == 1 {
            // h = x + c0 up to scaling
            let h = h.monic();
            roots.push((p - h.c[0]) % p);
            continue;
        }
        if h.c[0] == 0 {
            roots.push(0);
            let (q, _) = h.divrem(&x);
            stack.push(q);
            continue;
        }
        // Cantor-Zassenhaus split: gcd((x+a)^((p-1)/2) - 1, h)
        loop {
            let a = rng.gen_range(0..p);
            let xa = PolyP::new(p, vec![a, 1]);
            let w = xa.powmod64((p - 1) / 2, &h);
            let w1 = w.sub(&PolyP::new(p, vec![1]));
            let d = w1.gcd(&h);
            if d.degree() > 0 && d.degree() < h.degree() {
                let (q, _) = h.divrem(&d);
                stack.push(d);
                stack.push(q);
                break;
            }
            // h may have acquired a non-monic scale after division
            h = h.monic();
        }
    }
    roots.sort_unstable();
    roots
}

/// Full factorization of f modulo an odd prime p > deg(f).
/// Returns monic irreducible factors with multiplicities, sorted by
/// (degree, coefficients).
pub fn factor_mod_p(f: &PolyZ, p: u64) -> Vec<(PolyP, u32)> {
    assert!(p > 2);
    let fp = f.reduce_mod(p);
    if fp.is_zero() || fp.degree() == 0 {
        return vec![];
    }
    let fp = fp.monic();
    // Squarefree part. p > deg f excludes p-th power degeneracies.
    let d = fp.derivative();
    let sqf = if d.is_zero() {
        fp.clone()
    } else {
        let g = fp.gcd(&d);
        fp.divrem(&g).0.monic()
    };

    // Distinct-degree factorization of the squarefree part.
    let mut by_degree: Vec<(PolyP, usize)> = vec![];
    let mut rem = sqf;
    let x = PolyP::x(p);
    let mut h = x.clone();
    let mut d = 0usize;
    while rem.degree() > 0 {
        d += 1;
        if 2 * d > rem.degree() {
            let deg = rem.degree();
            by_degree.push((rem, deg));
            break;
        }
        h = h.powmod64(p, &rem);
        let g = h.sub(&x).gcd(&rem);
        if g.degree() > 0 {
            by_degree.push((g.clone(), d));
            rem = rem.divrem(&g).0.monic();
            h = h.rem(&rem);
        }
    }

    // Equal-degree splitting.
    let mut rng = StdRng::seed_from_u64(p ^ 0x9e3779b97f4a7c15);
    let mut irreducibles = vec![];
    for (g, d) in by_degree {
        let mut stack = vec![g];
        while let Some(h) = stack.pop() {
            if h.degree() == d {
                irreducibles.push(h.monic());
                continue;
            }
            // (p^d - 1) / 2
            let e = (Uint::from(p).pow(d as u32) - Uint::ONE) >> 1;
            loop {
                let deg_u = h.degree();
                let mut uc = vec![0u64; deg_u];
                for c in uc.iter_mut() {
                    *c = rng.gen_range(0..p);
                }
                let u = PolyP::new(p, uc);
                if u.is_zero() {
                    continue;
                }
                let w = u.powmod(&e, &h);
                let w1 = w.sub(&PolyP::new(p, vec![1]));
                let t = w1.gcd(&h);
                if t.degree() > 0 && t.degree() < h.degree() {
                    let (q, _) = h.divrem(&t);
                    stack.push(t);
                    stack.push(q.monic());
                    break;
                }
            }
        }
    }

    // Multiplicities by repeated division of the full reduction.
    let mut out = vec![];
    for g in irreducibles {
        let mut e = 0u32;
        let mut t = fp.clone();
        loop {
            let (q, r) = t.divrem(&g);
            if !r.is_zero() {
                break;
            }
            e += 1;
            t = q;
            if t.degree() == 0 {
                break;
            }
        }
        debug_assert!(e > 0);
        out.push((g, e));
    }
    out.sort_by(|a, b| (a.0.degree(), &a.0.c).cmp(&(b.0.degree(), &b.0.c)));
    out
}

#[test]
fn test_divrem() {
    let p = 101;
    let f = PolyP::new(p, vec![2, 0, 3, 1]); // x^3 + 3x^2 + 2
    let d = PolyP::new(p, vec![1, 1]); // x + 1
    let (q, r) = f.divrem(&d);
    assert_eq!(q.mul(&d).add(&r), f);
    assert!(r.degree() == 0);
}

#[test]
fn test_roots_mod_p() {
    // (x - 2)(x - 3)(x - 5) mod 101
    let f = PolyZ::from_i64(&[-30, 31, -10, 1]);
    assert_eq!(roots_mod_p(&f, 101), vec![2, 3, 5]);
    // x^2 + 1 has roots mod 5 (2 and 3) but none mod 7
    let g = PolyZ::from_i64(&[1, 0, 1]);
    assert_eq!(roots_mod_p(&g, 5), vec![2, 3]);
    assert_eq!(roots_mod_p(&g, 7), vec![]);
    // root 0 with multiplicity
    let h = PolyZ::from_i64(&[0, 0, 1]);
    assert_eq!(roots_mod_p(&h, 13), vec![0]);
}

#[test]
fn test_roots_larger_prime() {
    let f = PolyZ::from_i64(&[3, -1, 0, 0, 1]); // x^4 - x + 3
    let p = 1_000_003u64;
    let roots = roots_mod_p(&f, p);
    for &r in &roots {
        assert_eq!(f.reduce_mod(p).eval(r), 0);
    }
    // Cross-check count against naive evaluation on a sample
    // (full brute force is too slow, trust the algebra above).
    assert!(roots.len() <= 4);
}

#[test]
fn test_factor_mod_p() {
    // x^4 + 1 splits into quadratics mod 7
    let f = PolyZ::from_i64(&[1, 0, 0, 0, 1]);
    let fac = factor_mod_p(&f, 7);
    assert_eq!(fac.len(), 2);
    for (g, e) in &fac {
        assert_eq!(*e, 1);
        assert_eq!(g.degree(), 2);
    }
    // check the product
    let prod = fac.iter().fold(PolyP::new(7, vec![1]), |acc, (g, _)| {
        acc.mul(g)
    });
    assert_eq!(prod, f.reduce_mod(7));

    // (x - 1)^2 (x + 2) mod 11
    let g = PolyZ::from_i64(&[2, -3, 0, 1]);
    let fac = factor_mod_p(&g, 11);
    let mut degs: Vec<(usize, u32)> = fac.iter().map(|(h, e)| (h.degree(), *e)).collect();
    degs.sort();
    assert_eq!(degs, vec![(1, 1), (1, 2)]);
}
