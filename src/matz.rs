// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Small dense integer matrices and exact lattice reduction.
//!
//! Matrices follow the column convention of the sieve: the basis of a
//! lattice is the set of matrix COLUMNS, and a region coordinate vector c
//! maps to the element a = M * c.
//!
//! LLL is the all-integer variant (Cohen, Algorithm 2.6.7) so that no
//! rational or floating point arithmetic is involved: entries stay exact
//! in fixed-width integers. The skewed variant rescales rows before
//! reduction, which is how the driver biases the special-q basis towards
//! a non-cubic sieve region.
//!
//! Bibliography:
//! H. Cohen, A course in computational algebraic number theory, ch. 2.6

use crate::Int;

/// A square matrix with multi-precision entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatZ {
    pub n: usize,
    c: Vec<Int>,
}

impl MatZ {
    pub fn zero(n: usize) -> Self {
        MatZ {
            n,
            c: vec![Int::ZERO; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zero(n);
        for i in 0..n {
            m.set(i, i, Int::ONE);
        }
        m
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> Int {
        self.c[row * self.n + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: Int) {
        self.c[row * self.n + col] = v;
    }

    pub fn col(&self, col: usize) -> Vec<Int> {
        (0..self.n).map(|row| self.at(row, col)).collect()
    }

    pub fn set_col(&mut self, col: usize, v: &[Int]) {
        for row in 0..self.n {
            self.set(row, col, v[row]);
        }
    }

    /// a = M * c with small coordinates.
    pub fn mul_vec_i64(&self, v: &[i64]) -> Vec<Int> {
        assert_eq!(v.len(), self.n);
        let mut a = vec![Int::ZERO; self.n];
        for row in 0..self.n {
            let mut s = Int::ZERO;
            for col in 0..self.n {
                s += self.at(row, col) * Int::from(v[col]);
            }
            a[row] = s;
        }
        a
    }

    /// Fraction-free Gaussian elimination (Bareiss).
    pub fn det(&self) -> Int {
        let n = self.n;
        let mut a = self.c.clone();
        let mut sign = Int::ONE;
        let mut prev = Int::ONE;
        for k in 0..n {
            if a[k * n + k] == Int::ZERO {
                let Some(row) = (k + 1..n).find(|&r| a[r * n + k] != Int::ZERO) else {
                    return Int::ZERO;
                };
                for j in 0..n {
                    a.swap(k * n + j, row * n + j);
                }
                sign = -sign;
            }
            for i in k + 1..n {
                for j in k + 1..n {
                    let t = a[i * n + j] * a[k * n + k] - a[i * n + k] * a[k * n + j];
                    a[i * n + j] = t / prev;
                }
                a[i * n + k] = Int::ZERO;
            }
            prev = a[k * n + k];
        }
        sign * a[(n - 1) * n + (n - 1)]
    }

    /// Reduce the matrix columns in place to an LLL-reduced basis
    /// of the same lattice. Returns false when the columns are not
    /// linearly independent (the matrix is left unspecified then).
    pub fn lll_reduce(&mut self) -> bool {
        let n = self.n;
        let mut b: Vec<Vec<Int>> = (0..n).map(|j| self.col(j)).collect();
        if !lll_vectors(&mut b) {
            return false;
        }
        for (j, v) in b.iter().enumerate() {
            self.set_col(j, v);
        }
        true
    }

    /// LLL with a per-row skew: row i is scaled by skew[i] (> 0) before
    /// reduction and unscaled afterwards, so short vectors are short for
    /// the skewed norm.
    pub fn skew_lll_reduce(&mut self, skew: &[Int]) -> bool {
        assert_eq!(skew.len(), self.n);
        debug_assert!(skew.iter().all(|s| *s > Int::ZERO));
        let n = self.n;
        let mut b: Vec<Vec<Int>> = (0..n)
            .map(|j| {
                (0..n)
                    .map(|i| self.at(i, j) * skew[i])
                    .collect::<Vec<Int>>()
            })
            .collect();
        if !lll_vectors(&mut b) {
            return false;
        }
        for j in 0..n {
            for i in 0..n {
                // Unimodular column operations keep every entry of row i
                // divisible by skew[i].
                self.set(i, j, b[j][i] / skew[i]);
            }
        }
        true
    }
}

fn dot(a: &[Int], b: &[Int]) -> Int {
    let mut s = Int::ZERO;
    for i in 0..a.len() {
        s += a[i] * b[i];
    }
    s
}

/// All-integer LLL with delta = 3/4 on a list of basis vectors.
/// Returns false for linearly dependent input.
fn lll_vectors(b: &mut Vec<Vec<Int>>) -> bool {
    let n = b.len();
    if n <= 1 {
        return true;
    }
    // d[i] are the Gram determinants, lambda the scaled GSO coefficients.
    let mut d = vec![Int::ONE; n + 1];
    let mut lambda = vec![vec![Int::ZERO; n]; n];
    d[1] = dot(&b[0], &b[0]);
    if d[1] == Int::ZERO {
        return false;
    }
    let mut kmax = 0usize;
    let mut k = 1usize;

    macro_rules! red {
        ($k:expr, $l:expr) => {{
            let (k, l) = ($k, $l);
            let two_lam = lambda[k][l] + lambda[k][l];
            if two_lam.abs() > d[l + 1] {
                // nearest integer of lambda/d
                let q = nearest_div(lambda[k][l], d[l + 1]);
                for i in 0..b[0].len() {
                    let t = b[l][i];
                    b[k][i] -= q * t;
                }
                lambda[k][l] -= q * d[l + 1];
                for i in 0..l {
                    let t = lambda[l][i];
                    lambda[k][i] -= q * t;
                }
            }
        }};
    }

    while k < n {
        if k > kmax {
            kmax = k;
            for j in 0..=k {
                let mut u = dot(&b[k], &b[j]);
                for i in 0..j {
                    u = (d[i + 1] * u - lambda[k][i] * lambda[j][i]) / d[i];
                }
                if j < k {
                    lambda[k][j] = u;
                } else {
                    d[k + 1] = u;
                    if d[k + 1] == Int::ZERO {
                        return false;
                    }
                }
            }
        }
        loop {
            red!(k, k - 1);
            // Lovász test with delta = 3/4:
            // 4 (d[k+1] d[k-1] + lambda^2) < 3 d[k]^2
            let lam = lambda[k][k - 1];
            let lhs = (d[k + 1] * d[k - 1] + lam * lam) * Int::from(4u64);
            let rhs = d[k] * d[k] * Int::from(3u64);
            if lhs < rhs {
                // swap b[k] and b[k-1], update lambda and d
                b.swap(k, k - 1);
                for j in 0..k.saturating_sub(1) {
                    let t = lambda[k][j];
                    lambda[k][j] = lambda[k - 1][j];
                    lambda[k - 1][j] = t;
                }
                let bval = (d[k - 1] * d[k + 1] + lam * lam) / d[k];
                for i in k + 1..=kmax {
                    let t = lambda[i][k];
                    lambda[i][k] = (d[k + 1] * lambda[i][k - 1] - lam * t) / d[k];
                    lambda[i][k - 1] = (bval * t + lam * lambda[i][k]) / d[k + 1];
                }
                d[k] = bval;
                if k > 1 {
                    k -= 1;
                }
            } else {
                for l in (0..k.saturating_sub(1)).rev() {
                    red!(k, l);
                }
                k += 1;
                break;
            }
        }
    }
    true
}

/// Nearest integer to a/b, b > 0.
fn nearest_div(a: Int, b: Int) -> Int {
    debug_assert!(b > Int::ZERO);
    let two_a = a + a;
    if a >= Int::ZERO {
        (two_a + b) / (b + b)
    } else {
        -((-two_a + b) / (b + b))
    }
}

/// Resultant of two integer polynomials via the Sylvester matrix
/// (Bareiss determinant keeps everything exact).
pub fn resultant(f: &crate::poly::PolyZ, g: &crate::poly::PolyZ) -> Int {
    if f.is_zero() || g.is_zero() {
        return Int::ZERO;
    }
    let (m, n) = (f.degree(), g.degree());
    if m == 0 {
        return pow_int(f.c[0], n as u32);
    }
    if n == 0 {
        return pow_int(g.c[0], m as u32);
    }
    let size = m + n;
    let mut s = MatZ::zero(size);
    // n rows of f coefficients, m rows of g coefficients.
    for i in 0..n {
        for (j, &c) in f.c.iter().rev().enumerate() {
            s.set(i, i + j, c);
        }
    }
    for i in 0..m {
        for (j, &c) in g.c.iter().rev().enumerate() {
            s.set(n + i, i + j, c);
        }
    }
    s.det()
}

fn pow_int(x: Int, e: u32) -> Int {
    let mut r = Int::ONE;
    for _ in 0..e {
        r *= x;
    }
    r
}

/// A square matrix with word-size entries (per-ideal sublattices Mqr).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatI64 {
    pub n: usize,
    c: Vec<i64>,
}

impl MatI64 {
    pub fn zero(n: usize) -> Self {
        MatI64 {
            n,
            c: vec![0; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zero(n);
        for i in 0..n {
            m.set(i, i, 1);
        }
        m
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> i64 {
        self.c[row * self.n + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: i64) {
        self.c[row * self.n + col] = v;
    }

    pub fn col(&self, col: usize) -> Vec<i64> {
        (0..self.n).map(|row| self.at(row, col)).collect()
    }

    pub fn to_matz(&self) -> MatZ {
        let mut m = MatZ::zero(self.n);
        for i in 0..self.n {
            for j in 0..self.n {
                m.set(i, j, Int::from(self.at(i, j)));
            }
        }
        m
    }

    pub fn from_matz(m: &MatZ) -> Option<MatI64> {
        use num_traits::ToPrimitive;
        let mut out = MatI64::zero(m.n);
        for i in 0..m.n {
            for j in 0..m.n {
                out.set(i, j, m.at(i, j).to_i64()?);
            }
        }
        Some(out)
    }
}

impl std::fmt::Display for MatI64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.n {
            write!(f, "[")?;
            for j in 0..self.n {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.at(i, j))?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn norm2(v: &[Int]) -> Int {
    dot(v, v)
}

#[test]
fn test_det() {
    let mut m = MatZ::zero(3);
    // det = 1*(4*6-5*5) - 2*(3*6-5*1) + 3*(3*5-4*1) = -1 - 26 + 33 = 6
    let rows = [[1i64, 2, 3], [3, 4, 5], [1, 5, 6]];
    for i in 0..3 {
        for j in 0..3 {
            m.set(i, j, Int::from(rows[i][j]));
        }
    }
    assert_eq!(m.det(), Int::from(6i64));
    assert_eq!(MatZ::identity(4).det(), Int::ONE);
}

#[test]
fn test_lll_preserves_lattice() {
    let mut m = MatZ::zero(3);
    let rows = [[101i64, 35, 17], [0, 1, 0], [0, 0, 1]];
    for i in 0..3 {
        for j in 0..3 {
            m.set(i, j, Int::from(rows[i][j]));
        }
    }
    let d0 = m.det();
    assert!(m.lll_reduce());
    let d1 = m.det();
    assert!(d1 == d0 || d1 == -d0);
    // reduced basis should contain a vector much shorter than (101,0,0)
    let shortest = (0..3).map(|j| norm2(&m.col(j))).min().unwrap();
    assert!(shortest < Int::from(101i64 * 101));
}

#[test]
fn test_lll_dependent() {
    let mut m = MatZ::zero(2);
    m.set(0, 0, Int::from(2i64));
    m.set(1, 0, Int::from(4i64));
    m.set(0, 1, Int::from(1i64));
    m.set(1, 1, Int::from(2i64));
    assert!(!m.lll_reduce());
}

#[test]
fn test_skew_lll() {
    let mut m = MatZ::zero(3);
    let rows = [[1009i64, 123, 456], [0, 1, 0], [0, 0, 1]];
    for i in 0..3 {
        for j in 0..3 {
            m.set(i, j, Int::from(rows[i][j]));
        }
    }
    let d0 = m.det();
    let skew = vec![Int::from(1i64), Int::from(4i64), Int::from(4i64)];
    assert!(m.skew_lll_reduce(&skew));
    let d1 = m.det();
    assert!(d1 == d0 || d1 == -d0);
}

#[test]
fn test_resultant() {
    use crate::poly::PolyZ;
    let f = PolyZ::from_i64(&[-2, 1]); // x - 2
    let g = PolyZ::from_i64(&[-3, 1]); // x - 3
    // Res(f, g) = f(3) up to sign
    let r = resultant(&f, &g);
    assert!(r == Int::ONE || r == -Int::ONE);
    let f = PolyZ::from_i64(&[-1, 0, 1]); // x^2 - 1
    let g = PolyZ::from_i64(&[-1, 1]); // x - 1
    assert_eq!(resultant(&f, &g), Int::ZERO);
    // Res(x^2+1, x-2) = 5 up to sign
    let f = PolyZ::from_i64(&[1, 0, 1]);
    let g = PolyZ::from_i64(&[-2, 1]);
    let r = resultant(&f, &g);
    assert!(r == Int::from(5i64) || r == Int::from(-5i64));
}
