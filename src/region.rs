// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The sieving region and the norm accumulator over it.
//!
//! The region is a t-dimensional box: coordinate i ranges over
//! [-h[i], h[i]) for i < t-1 and the last coordinate over [0, h[t-1])
//! (half of the box is enough since F(-a) = +-F(a)).
//!
//! Cells are stored in a flat byte array with coordinate 0 least
//! significant, so that a step of r along axis 0 moves the array index
//! by r, and fixing the high coordinates yields contiguous runs.
//! All decrements saturate at 0: a cheap norm underestimate must never
//! wrap around and resurrect a doomed cell.

use wide::u8x16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SievingBound {
    pub h: Vec<u32>,
}

impl SievingBound {
    pub fn new(h: Vec<u32>) -> Self {
        assert!(h.len() >= 2);
        assert!(h.iter().all(|&x| x >= 1));
        SievingBound { h }
    }

    pub fn t(&self) -> usize {
        self.h.len()
    }

    pub fn num_points(&self) -> u64 {
        let t = self.t();
        let mut n = self.h[t - 1] as u64;
        for i in 0..t - 1 {
            n *= 2 * self.h[i] as u64;
        }
        n
    }

    /// Number of cells separating two points that differ by 1 in
    /// coordinate i only.
    pub fn stride(&self, i: usize) -> u64 {
        let mut s = 1u64;
        for j in 0..i {
            s *= 2 * self.h[j] as u64;
        }
        s
    }

    pub fn contains(&self, c: &[i64]) -> bool {
        let t = self.t();
        debug_assert_eq!(c.len(), t);
        for i in 0..t - 1 {
            if c[i] < -(self.h[i] as i64) || c[i] >= self.h[i] as i64 {
                return false;
            }
        }
        c[t - 1] >= 0 && c[t - 1] < self.h[t - 1] as i64
    }

    pub fn index(&self, c: &[i64]) -> u64 {
        debug_assert!(self.contains(c));
        let t = self.t();
        let mut idx = 0u64;
        let mut stride = 1u64;
        for i in 0..t {
            let off = if i < t - 1 { self.h[i] as i64 } else { 0 };
            idx += (c[i] + off) as u64 * stride;
            stride *= 2 * self.h[i] as u64;
        }
        idx
    }

    pub fn coords(&self, mut idx: u64) -> Vec<i64> {
        let t = self.t();
        let mut c = vec![0i64; t];
        for i in 0..t {
            let w = 2 * self.h[i] as u64;
            let off = if i < t - 1 { self.h[i] as i64 } else { 0 };
            c[i] = (idx % w) as i64 - off;
            idx /= w;
        }
        debug_assert_eq!(idx, 0);
        c
    }

    /// Odometer increment starting at coordinate i: adds one to c[i],
    /// propagating carries upwards (a wrapped coordinate restarts at its
    /// minimum). Returns the position of the coordinate that received
    /// the +1.
    pub fn add_one_at(&self, c: &mut [i64], i: usize) -> usize {
        let t = self.t();
        for j in i..t {
            c[j] += 1;
            if c[j] < self.h[j] as i64 {
                return j;
            }
            c[j] = if j == t - 1 { 0 } else { -(self.h[j] as i64) };
        }
        t - 1
    }

    /// The first point of the iteration order: (-h0, ..., -h_{t-2}, 0).
    pub fn first_point(&self) -> Vec<i64> {
        let t = self.t();
        let mut c = vec![0i64; t];
        for i in 0..t - 1 {
            c[i] = -(self.h[i] as i64);
        }
        c
    }
}

/// The per-region norm accumulator. One byte per region point.
#[derive(Clone)]
pub struct NormArray {
    pub v: Vec<u8>,
}

impl NormArray {
    pub fn new(n: u64) -> Self {
        NormArray {
            v: vec![u8::MAX; n as usize],
        }
    }

    pub fn len(&self) -> u64 {
        self.v.len() as u64
    }

    pub fn fill_max(&mut self) {
        self.v.fill(u8::MAX);
    }

    #[inline]
    pub fn sub(&mut self, idx: u64, logp: u8) {
        let c = &mut self.v[idx as usize];
        *c = c.saturating_sub(logp);
    }

    /// Indices of the cells with residual value <= thresh.
    /// 16 bytes at a time; candidate chunks are rescanned per byte.
    pub fn survivors(&self, thresh: u8) -> Vec<u64> {
        let mut out = vec![];
        let vt = u8x16::splat(thresh);
        let mut i = 0usize;
        while i + 16 <= self.v.len() {
            let chunk: [u8; 16] = self.v[i..i + 16].try_into().unwrap();
            let x = u8x16::from(chunk);
            let m = x.min(vt).cmp_eq(x);
            if m.to_array() != [0u8; 16] {
                for j in 0..16 {
                    if self.v[i + j] <= thresh {
                        out.push((i + j) as u64);
                    }
                }
            }
            i += 16;
        }
        while i < self.v.len() {
            if self.v[i] <= thresh {
                out.push(i as u64);
            }
            i += 1;
        }
        out
    }

    /// Histogram of residual values (debugging aid).
    pub fn stats(&self) -> [u64; 256] {
        let mut res = [0u64; 256];
        for &b in &self.v {
            res[b as usize] += 1;
        }
        res
    }
}

#[test]
fn test_index_roundtrip() {
    let h = SievingBound::new(vec![4, 4, 2]);
    assert_eq!(h.num_points(), 128);
    for idx in 0..h.num_points() {
        let c = h.coords(idx);
        assert!(h.contains(&c));
        assert_eq!(h.index(&c), idx);
    }
}

#[test]
fn test_add_one_order() {
    let h = SievingBound::new(vec![3, 2, 2]);
    let mut c = h.first_point();
    assert_eq!(h.index(&c), 0);
    for idx in 1..h.num_points() {
        h.add_one_at(&mut c, 0);
        assert_eq!(h.index(&c), idx);
    }
}

#[test]
fn test_add_one_positions() {
    let h = SievingBound::new(vec![2, 2, 3]);
    let mut c = h.first_point();
    // increment coordinate 1: -2 -> -1, no carry
    assert_eq!(h.add_one_at(&mut c, 1), 1);
    assert_eq!(c, vec![-2, -1, 0]);
    c[1] = 1;
    // carry into coordinate 2
    assert_eq!(h.add_one_at(&mut c, 1), 2);
    assert_eq!(c, vec![-2, -2, 1]);
}

#[test]
fn test_saturating_sub() {
    let mut a = NormArray::new(4);
    a.v[0] = 3;
    a.sub(0, 10);
    assert_eq!(a.v[0], 0);
    a.sub(0, 1);
    assert_eq!(a.v[0], 0);
}

#[test]
fn test_survivors() {
    let mut a = NormArray::new(100);
    a.v[5] = 7;
    a.v[17] = 0;
    a.v[99] = 8;
    assert_eq!(a.survivors(8), vec![5, 17, 99]);
    assert_eq!(a.survivors(7), vec![5, 17]);
    let naive: Vec<u64> = (0..100u64).filter(|&i| a.v[i as usize] <= 20).collect();
    assert_eq!(a.survivors(20), naive);
}
