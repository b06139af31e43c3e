// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Norm array initialization.
//!
//! Every region cell starts at the scaled approximate log2 of the
//! algebraic norm |Res(f, a)| of its element a = MqLLL * c, so that
//! after all ideals have subtracted their contributions the residual
//! value approximates the log of the unfactored cofactor.
//!
//! The scale (the log base) is chosen so that the largest norm over the
//! region fits a byte with a little headroom, following the worst-case
//! bound on |a| after LLL reduction of the special-q lattice.

use crate::matz::MatZ;
use crate::poly::PolyZ;
use crate::region::{NormArray, SievingBound};

/// |Res(f, g)| in floating point, by the Euclidean remainder cascade.
/// Accurate to a few ulps, which is all the byte-sized estimate needs.
pub fn resultant_f64(f: &[f64], g: &[f64]) -> f64 {
    fn deg(p: &[f64]) -> Option<usize> {
        p.iter().rposition(|&c| c != 0.0)
    }
    let (Some(mut df), Some(mut dg)) = (deg(f), deg(g)) else {
        return 0.0;
    };
    let mut f = f[..=df].to_vec();
    let mut g = g[..=dg].to_vec();
    let mut res = 1.0f64;
    if df < dg {
        std::mem::swap(&mut f, &mut g);
        std::mem::swap(&mut df, &mut dg);
    }
    loop {
        if dg == 0 {
            return (res * g[0].powi(df as i32)).abs();
        }
        // remainder of f by g
        let lg = g[dg];
        let mut r = f.clone();
        for k in (dg..=df).rev() {
            let coef = r[k] / lg;
            if coef != 0.0 {
                for j in 0..dg {
                    r[k - dg + j] -= coef * g[j];
                }
            }
            r[k] = 0.0;
        }
        // degree drop with a tolerance for cancellation noise
        let scale = r.iter().fold(0.0f64, |m, &c| m.max(c.abs()));
        let eps = scale * 1e-12;
        let dr = r.iter().rposition(|&c| c.abs() > eps).unwrap_or(0);
        let r = r[..=dr].to_vec();
        if dr == 0 && r[0].abs() <= eps {
            // common factor: the resultant vanishes
            return 0.0;
        }
        res *= lg.powi((df - dr) as i32);
        f = g;
        df = dg;
        g = r;
        dg = dr;
    }
}

/// Worst-case |a| coordinate after LLL reduction, as used to derive the
/// automatic norm scale.
fn max_coordinate(h: &SievingBound, q_max: u64) -> f64 {
    let t = h.t() as f64;
    let max_a = f64::powf(crate::params::LLL_SKEW_GROWTH, t - 1.0) * f64::powf(q_max as f64, 1.0 / t);
    let hsum: f64 = h.h.iter().map(|&x| x as f64).sum();
    hsum * max_a
}

/// log2 of the norm-array base for one side: the worst-case log norm is
/// compressed into a byte with two values of headroom.
pub fn auto_log2_base(
    f: &PolyZ,
    h: &SievingBound,
    q_min: u64,
    q_max: u64,
    on_q_side: bool,
) -> f64 {
    let t = h.t() as f64;
    let d = f.degree() as f64;
    let max_a = max_coordinate(h, q_max);
    let precompute = f64::powf(d + 1.0, (t - 1.0) / 2.0)
        * f64::powf(t, d / 2.0)
        * f64::powf(max_a, d);
    let mut base = f64::powf(f.infinity_norm(), t - 1.0) * precompute;
    debug_assert!(base > 0.0);
    if on_q_side {
        base /= q_min as f64;
    }
    base = f64::powf(base, 1.0 / (u8::MAX as f64 - 2.0));
    base.log2().max(f64::MIN_POSITIVE)
}

/// Fill the norm array with scaled log2 norms of the region elements.
/// `spq_log2` is subtracted on the special-q side (every element is
/// divisible by the special-q there). Returns the largest initialized
/// value.
pub fn init_norms(
    arr: &mut NormArray,
    h: &SievingBound,
    matrix: &MatZ,
    f: &PolyZ,
    log2_base: f64,
    spq_log2: f64,
) -> u8 {
    arr.fill_max();
    let t = h.t();
    let fc = f.to_f64();
    // f64 image of the reduced basis: entries are LLL-small
    let mf: Vec<Vec<f64>> = (0..t)
        .map(|row| {
            (0..t)
                .map(|col| crate::arith::int_to_f64(&matrix.at(row, col)))
                .collect()
        })
        .collect();
    let mut c = h.first_point();
    let mut a = vec![0f64; t];
    let mut max_val = 0u8;
    for idx in 0..h.num_points() {
        for row in 0..t {
            let mut s = 0.0;
            for col in 0..t {
                s += mf[row][col] * c[col] as f64;
            }
            a[row] = s;
        }
        let res = resultant_f64(&fc, &a);
        let v = if res <= 1.0 {
            0.0
        } else {
            (res.log2() - spq_log2).max(0.0) / log2_base
        };
        let v = if v >= 254.0 { 254 } else { v.round() as u8 };
        arr.v[idx as usize] = v;
        if v > max_val {
            max_val = v;
        }
        h.add_one_at(&mut c, 0);
    }
    max_val
}
