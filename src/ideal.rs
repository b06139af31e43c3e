// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Prime ideals of the number field, as the sieve consumes them.
//!
//! An ideal is a prime (or prime power) q together with a monic factor g
//! of the defining polynomial modulo q. The degree 1 case carries a
//! scalar root rho (g = x - rho) and drives all the fast sieve paths.
//! Higher degree factors use polynomial reduction data; their sieving
//! path is conservative (see qlat).
//!
//! Both variants precompute `tr`, the coefficients expressing the
//! reduction of x^k modulo (q, g): for degree 1, tr[k] = -rho^(k+1) mod q,
//! so that the linear form [q-row, tr...] vanishes exactly on region
//! elements divisible by the ideal.

use crate::arith::mulmod64;
use crate::poly::PolyP;

pub const MAX_ROOTS: usize = 8;

/// Degree 1 prime ideal (q, x - rho).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ideal1 {
    pub q: u64,
    pub rho: u64,
    /// tr[k] = (-rho^(k+1)) mod q, k in 0..t-1.
    pub tr: Vec<u64>,
    /// Rounded scaled log contribution removed per hit.
    pub logp: u8,
}

impl Ideal1 {
    pub fn new(q: u64, rho: u64, t: usize, logp: u8) -> Self {
        assert!(t >= 2);
        let rho = rho % q;
        let mut tr = Vec::with_capacity(t - 1);
        let mut pw = rho;
        for _ in 0..t - 1 {
            tr.push((q - pw) % q);
            pw = mulmod64(pw, rho, q);
        }
        Ideal1 { q, rho, tr, logp }
    }
}

/// Higher degree prime ideal (q, g) with deg g >= 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdealU {
    pub q: u64,
    /// Monic irreducible factor of f mod q.
    pub g: PolyP,
    /// tr[i][j] = -(x^(d+j) mod (g, q))[i] for i < d = deg g, j < t - d.
    pub tr: Vec<Vec<u64>>,
    pub logp: u8,
}

impl IdealU {
    pub fn new(q: u64, g: PolyP, t: usize, logp: u8) -> Self {
        let d = g.degree();
        assert!(d >= 2 && d < t);
        assert_eq!(g.p, q);
        let mut tr = vec![vec![0u64; t - d]; d];
        // iteratively compute x^(d+j) mod g
        let mut xk = PolyP::x(q).powmod64(d as u64, &g);
        for j in 0..t - d {
            for i in 0..d {
                let c = xk.c.get(i).copied().unwrap_or(0);
                tr[i][j] = (q - c) % q;
            }
            xk = xk.mul(&PolyP::x(q)).rem(&g);
        }
        IdealU { q, g, tr, logp }
    }
}

/// The special-q itself: either variant.
#[derive(Clone, Debug)]
pub enum IdealSpq {
    One(Ideal1),
    U(IdealU),
}

impl IdealSpq {
    pub fn q(&self) -> u64 {
        match self {
            IdealSpq::One(i) => i.q,
            IdealSpq::U(i) => i.q,
        }
    }

    /// Degree of the residue field extension.
    pub fn deg_g(&self) -> usize {
        match self {
            IdealSpq::One(_) => 1,
            IdealSpq::U(i) => i.g.degree(),
        }
    }

    /// log2 of the ideal norm q^deg(g).
    pub fn log2_norm(&self) -> f64 {
        (self.q() as f64).log2() * self.deg_g() as f64
    }
}

impl std::fmt::Display for IdealSpq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdealSpq::One(i) => write!(f, "q: {}, g: x - {}", i.q, i.rho),
            IdealSpq::U(i) => {
                write!(f, "q: {}, g:", i.q)?;
                for (k, c) in i.g.c.iter().enumerate() {
                    write!(f, " {c}*x^{k}")?;
                    if k + 1 < i.g.c.len() {
                        write!(f, " +")?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[test]
fn test_ideal1_tr() {
    let id = Ideal1::new(13, 5, 4, 1);
    // tr[k] = -5^(k+1) mod 13 = 13 - (5, 12, 8) = (8, 1, 5)
    assert_eq!(id.tr, vec![8, 1, 5]);
    // the linear form vanishes on multiples of (q, x - rho):
    // x - 5 maps to tr-form value -5 + tr[0] ... check 5^k + something
    for k in 0..3usize {
        let pw = crate::arith::powmod64(5, k as u64 + 1, 13);
        assert_eq!((id.tr[k] + pw) % 13, 0);
    }
}

#[test]
fn test_idealu_tr() {
    use crate::poly::PolyZ;
    // g = x^2 + 1 is irreducible mod 7
    let g = PolyZ::from_i64(&[1, 0, 1]).reduce_mod(7);
    let id = IdealU::new(7, g, 4, 1);
    // x^2 = -1 mod g: tr[.][0] = -(-1, 0) = (1, 0)
    assert_eq!(id.tr[0][0], 1);
    assert_eq!(id.tr[1][0], 0);
    // x^3 = -x mod g: tr[.][1] = (0, 1)
    assert_eq!(id.tr[0][1], 0);
    assert_eq!(id.tr[1][1], 1);
}
