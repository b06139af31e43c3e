// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Space sieve: 3-dimensional walk along cached short vectors.
//!
//! The largest factor base ideals hit the region about once per plane,
//! so re-deriving plane geometry for each of them is wasted work.
//! Instead the sieve keeps a stock of short lattice vectors inside the
//! doubled window ]-2h0, 2h0[ x ]-2h1, 2h1[ x [0, h2[, split between
//! vectors staying in a plane (z = 0, tried first to complete the
//! current plane) and vectors jumping planes (z > 0, sorted by z so the
//! nearest reachable plane wins).
//!
//! When the stock cannot reach a next plane, a lazily initialized plane
//! sieve walk discovers the next region point and the connecting vector
//! is merged back into the stock for later ideals of the same shape.
//!
//! The optional early cutoff compares the running hit count against the
//! expected region_size / r and stops once the relative error is small;
//! it trades completeness for speed and stays off unless configured.

use crate::ideal::Ideal1;
use crate::latenum::{fk_next_neg, fk_next_pos, fk_reduce, index_disp};
use crate::matz::MatI64;
use crate::planesieve::PlaneStepper;
use crate::region::{NormArray, SievingBound};
use crate::SieveOutcome;

/// Stock size guard: beyond this the doubled window is too dense for
/// vector caching to make sense (the dispatch should have used the
/// plane sieve) and the stock degrades to the heuristic one.
const MAX_STOCK: usize = 4096;

#[derive(Clone, Debug, Default)]
pub struct SpaceSieveConfig {
    /// Relative-error threshold of the early cutoff; None disables it.
    pub cut_early: Option<f64>,
    /// Number of stock refreshes by pairwise combination after a
    /// fallback; 0 disables the refresh.
    pub entropy: u32,
}

/// A stock vector with its lazily computed array displacement.
#[derive(Clone, Debug)]
struct SVec {
    v: Vec<i64>,
    disp: Option<i64>,
}

impl SVec {
    fn new(v: Vec<i64>) -> Self {
        SVec { v, disp: None }
    }

    fn disp(&mut self, h: &SievingBound) -> i64 {
        *self.disp.get_or_insert_with(|| index_disp(&self.v, h))
    }
}

fn in_window(v: &[i64], h: &SievingBound) -> bool {
    v[0].abs() < 2 * h.h[0] as i64 && v[1].abs() < 2 * h.h[1] as i64 && v[2] >= 0 && v[2] < h.h[2] as i64
}

/// Canonical sign: z > 0, or z = 0 and y > 0, or z = y = 0 and x > 0.
fn canonicalize(v: &mut [i64]) {
    let flip = v[2] < 0 || (v[2] == 0 && (v[1] < 0 || (v[1] == 0 && v[0] < 0)));
    if flip {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

/// Keep only the shortest vector of each direction class: walking k*v
/// already covers the multiples, and a duplicated direction would
/// decrement cells twice.
fn drop_multiples(mut list: Vec<SVec>) -> Vec<SVec> {
    list.sort_by_key(|s| (s.v[1].abs(), s.v[0].abs()));
    let mut out: Vec<SVec> = vec![];
    'next: for s in list {
        for kept in &out {
            // s.v parallel to kept.v with integer ratio?
            let k = &kept.v;
            if k[0] * s.v[1] == k[1] * s.v[0] && k[0] * s.v[2] == k[2] * s.v[0]
                && k[1] * s.v[2] == k[2] * s.v[1]
            {
                continue 'next;
            }
        }
        out.push(s);
    }
    out
}

struct Stock {
    zero: Vec<SVec>,
    nonzero: Vec<SVec>,
}

impl Stock {
    fn sort_nonzero(&mut self) {
        self.nonzero
            .sort_by_key(|s| (s.v[2], s.v[1].abs(), s.v[0].abs()));
    }

    fn push_vector(&mut self, mut v: Vec<i64>, h: &SievingBound) {
        canonicalize(&mut v);
        if v.iter().all(|&x| x == 0) || !in_window(&v, h) {
            return;
        }
        if v[2] == 0 {
            if !self.zero.iter().any(|s| s.v == v) {
                self.zero.push(SVec::new(v));
                // re-filter to preserve the no-multiples invariant
                let zero = std::mem::take(&mut self.zero);
                self.zero = drop_multiples(zero);
            }
        } else if !self.nonzero.iter().any(|s| s.v == v) {
            self.nonzero.push(SVec::new(v));
        }
    }
}

/// Exact stock: enumerate every doubled-window lattice vector, one
/// z-slice at a time, with Franke-Kleinjung walks over the corridor
/// |x| <= 2h0 - 1. Falls back to the heuristic LLL stock when the
/// corridor reduction does not apply or the window is too dense.
fn stock_vectors(mqr: &MatI64, h: &SievingBound) -> Stock {
    let (h0, h1, h2) = (h.h[0] as i64, h.h[1] as i64, h.h[2] as i64);
    let cols: Vec<Vec<i64>> = (0..3).map(|j| mqr.col(j)).collect();
    let len = 4 * h0 - 1;
    let amin = -(2 * h0 - 1);
    let Some(fk) = fk_reduce(&cols[0], &cols[1], len) else {
        return heuristic_stock(mqr, h);
    };

    let mut zero = vec![];
    let mut v = vec![0i64; 3];
    loop {
        fk_next_pos(&mut v, &fk, amin, len);
        if v[1] >= 2 * h1 {
            break;
        }
        zero.push(SVec::new(v.clone()));
        if zero.len() > MAX_STOCK {
            return heuristic_stock(mqr, h);
        }
    }
    let zero = drop_multiples(zero);

    let mut nonzero = vec![];
    for z in 1..h2 {
        let mut base = vec![z * cols[2][0], z * cols[2][1], z * cols[2][2]];
        debug_assert_eq!(base[2], z);
        // corridor reduction towards [amin, amin + len)
        while base[0] >= amin + len {
            for i in 0..3 {
                base[i] += fk.e0[i];
            }
        }
        while base[0] < amin {
            for i in 0..3 {
                base[i] += fk.e1[i];
            }
        }
        // ascend
        let mut w = base.clone();
        while w[1] < 2 * h1 {
            if w[1] > -2 * h1 {
                nonzero.push(SVec::new(w.clone()));
            }
            fk_next_pos(&mut w, &fk, amin, len);
        }
        // descend: the doubled window is symmetric in x, so the
        // reflected corridor uses the same lower bound
        let mut w = base.clone();
        loop {
            fk_next_neg(&mut w, &fk, amin, len);
            if w[1] <= -2 * h1 {
                break;
            }
            if w[1] < 2 * h1 {
                nonzero.push(SVec::new(w.clone()));
            }
        }
        if nonzero.len() > MAX_STOCK {
            return heuristic_stock(mqr, h);
        }
    }
    let mut stock = Stock { zero, nonzero };
    stock.sort_nonzero();
    stock
}

/// Heuristic stock: LLL-reduce the kernel basis and keep the small
/// signed combinations that land in the doubled window.
fn heuristic_stock(mqr: &MatI64, h: &SievingBound) -> Stock {
    let mut stock = Stock {
        zero: vec![],
        nonzero: vec![],
    };
    let mut mz = mqr.to_matz();
    if !mz.lll_reduce() {
        return stock;
    }
    let Some(red) = MatI64::from_matz(&mz) else {
        return stock;
    };
    let basis: Vec<Vec<i64>> = (0..3).map(|j| red.col(j)).collect();
    for c0 in -1i64..=1 {
        for c1 in -1i64..=1 {
            for c2 in -1i64..=1 {
                let v: Vec<i64> = (0..3)
                    .map(|i| c0 * basis[0][i] + c1 * basis[1][i] + c2 * basis[2][i])
                    .collect();
                stock.push_vector(v, h);
            }
        }
    }
    stock.sort_nonzero();
    stock
}

/// Walk the plane sieve forward from s until the next region point;
/// None when no further plane contains one.
fn plane_sieve_incomplete(s: &[i64], st: &PlaneStepper, h: &SievingBound) -> Option<Vec<i64>> {
    let fk = st.fk.as_ref()?;
    let (h0, h1, h2) = (h.h[0] as i64, h.h[1] as i64, h.h[2] as i64);
    let mut vs = s.to_vec();
    loop {
        st.next_plane(&mut vs, 2, h);
        if vs[2] >= h2 {
            return None;
        }
        // ascend from the starting point
        let mut v = vs.clone();
        while v[1] < h1 {
            if v[1] >= -h1 {
                return Some(v);
            }
            fk_next_pos(&mut v, fk, -h0, 2 * h0);
        }
        // descend
        let mut v = vs.clone();
        loop {
            fk_next_neg(&mut v, fk, -h0 + 1, 2 * h0);
            if v[1] < -h1 {
                break;
            }
            if v[1] < h1 {
                return Some(v);
            }
        }
    }
}

/// Pairwise-combine stock vectors to enrich the caches after a
/// fallback discovered a new direction.
fn generate_new_vectors(stock: &mut Stock, h: &SievingBound) {
    let mut cands: Vec<Vec<i64>> = vec![];
    let all: Vec<Vec<i64>> = stock
        .nonzero
        .iter()
        .chain(stock.zero.iter())
        .map(|s| s.v.clone())
        .collect();
    for i in 0..all.len() {
        for j in i + 1..all.len() {
            let sum: Vec<i64> = (0..3).map(|k| all[i][k] + all[j][k]).collect();
            let diff: Vec<i64> = (0..3).map(|k| all[i][k] - all[j][k]).collect();
            cands.push(sum);
            cands.push(diff);
        }
    }
    for v in cands {
        if stock.zero.len() + stock.nonzero.len() >= MAX_STOCK {
            break;
        }
        stock.push_vector(v, h);
    }
}

/// Sieve one ideal with the space sieve. Requires t = 3.
pub fn space_sieve(
    arr: &mut NormArray,
    h: &SievingBound,
    ideal: &Ideal1,
    mqr: &MatI64,
    cfg: &SpaceSieveConfig,
) -> SieveOutcome {
    assert_eq!(h.t(), 3);
    let (h0, h1, h2) = (h.h[0] as i64, h.h[1] as i64, h.h[2] as i64);
    let logp = ideal.logp;
    let mut stock = stock_vectors(mqr, h);

    let expected = (4 * h0 * h1 * h2) as f64 / ideal.q as f64;
    let mut nbhit: u64 = 1;

    // fallback plane sieve state, initialized on first use
    let mut stepper: Option<PlaneStepper> = None;
    let mut entropy_used = 0u32;

    let mut s = vec![0i64; 3];
    let mut index_s = h.index(&s) as i64;
    arr.sub(index_s as u64, logp);
    let mut list_s: Vec<Vec<i64>> = vec![s.clone()];

    while s[2] < h2 {
        // complete the current plane along the cached zero vectors
        for zi in 0..stock.zero.len() {
            let d = stock.zero[zi].disp(h);
            let zv = stock.zero[zi].v.clone();
            let mut w: Vec<i64> = (0..3).map(|i| s[i] + zv[i]).collect();
            let mut idx = index_s + d;
            while h.contains(&w) {
                nbhit += 1;
                arr.sub(idx as u64, logp);
                list_s.push(w.clone());
                for i in 0..3 {
                    w[i] += zv[i];
                }
                idx += d;
            }
            let mut w: Vec<i64> = (0..3).map(|i| s[i] - zv[i]).collect();
            let mut idx = index_s - d;
            while h.contains(&w) {
                nbhit += 1;
                arr.sub(idx as u64, logp);
                list_s.push(w.clone());
                for i in 0..3 {
                    w[i] -= zv[i];
                }
                idx -= d;
            }
        }

        // seek the nearest reachable plane from any known point
        let mut found: Option<(usize, bool, Vec<i64>)> = None;
        'seek: for vi in 0..stock.nonzero.len() {
            for (bi, base) in list_s.iter().enumerate() {
                let cand: Vec<i64> = (0..3).map(|i| base[i] + stock.nonzero[vi].v[i]).collect();
                if h.contains(&cand) {
                    found = Some((vi, bi != 0, cand));
                    break 'seek;
                }
            }
        }

        if let Some((vi, s_change, cand)) = found {
            s = cand;
            list_s.clear();
            list_s.push(s.clone());
            nbhit += 1;
            if s_change {
                index_s = h.index(&s) as i64;
            } else {
                index_s += stock.nonzero[vi].disp(h);
            }
            arr.sub(index_s as u64, logp);
            continue;
        }

        // out of cached knowledge on this plane
        if let Some(cut) = cfg.cut_early {
            let err_rel = (expected - nbhit as f64) / nbhit as f64;
            if !(err_rel >= cut) {
                // close enough to the expected count: stop early
                break;
            }
        }

        if stepper.is_none() {
            match PlaneStepper::new(mqr, h) {
                Some(st) if st.fk.is_some() => {
                    // merge the corridor basis into the zero stock
                    let fk = st.fk.as_ref().unwrap();
                    let e01: Vec<i64> = (0..3).map(|i| fk.e0[i] + fk.e1[i]).collect();
                    stock.push_vector(fk.e0.clone(), h);
                    stock.push_vector(fk.e1.clone(), h);
                    stock.push_vector(e01, h);
                    stepper = Some(st);
                }
                _ => return SieveOutcome::Unsupported,
            }
        }
        let st = stepper.as_ref().unwrap();
        let Some(s_out) = plane_sieve_incomplete(&s, st, h) else {
            break;
        };
        debug_assert!(h.contains(&s_out));
        nbhit += 1;
        let vnew: Vec<i64> = (0..3).map(|i| s_out[i] - s[i]).collect();
        let dnew = index_disp(&vnew, h);
        stock.nonzero.push(SVec {
            v: vnew,
            disp: Some(dnew),
        });
        if entropy_used < cfg.entropy {
            generate_new_vectors(&mut stock, h);
            entropy_used += 1;
        }
        stock.sort_nonzero();
        index_s += dnew;
        debug_assert_eq!(index_s, h.index(&s_out) as i64);
        s = s_out;
        list_s.clear();
        list_s.push(s.clone());
        arr.sub(index_s as u64, logp);
    }
    SieveOutcome::Done
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
        let ideal = Ideal1::new(r, 1, 3, 1);
        let mqr = compute_mqr_1(&tqr, 3, r);
        let mut arr = NormArray::new(h.num_points());
        assert_eq!(
            space_sieve(&mut arr, h, &ideal, &mqr, &SpaceSieveConfig::default()),
            SieveOutcome::Done
        );
        assert_eq!(collect(&arr), brute_hits(h, r, &tqr), "r = {r}");
    }

    #[test]
    fn test_space_sieve_agreement() {
        // r beyond 4 h0 h1, the dispatch range of the space sieve
        let h = SievingBound::new(vec![8, 8, 4]);
        check_agreement(&h, 257, vec![1, 19, 101]);
        check_agreement(&h, 331, vec![1, 200, 17]);
        check_agreement(&h, 1009, vec![1, 444, 777]);
    }

    #[test]
    fn test_space_sieve_degenerate_large() {
        let h = SievingBound::new(vec![8, 8, 4]);
        check_agreement(&h, 100003, vec![1, 17, 23]);
    }

    #[test]
    fn test_space_sieve_single_decrement() {
        let h = SievingBound::new(vec![8, 8, 4]);
        let tqr = vec![1u64, 19, 101];
        let ideal = Ideal1::new(257, 1, 3, 9);
        let mqr = compute_mqr_1(&tqr, 3, 257);
        let mut arr = NormArray::new(h.num_points());
        space_sieve(&mut arr, &h, &ideal, &mqr, &SpaceSieveConfig::default());
        for idx in 0..h.num_points() {
            let v = arr.v[idx as usize];
            assert!(v == u8::MAX || v == u8::MAX - 9, "idx {idx}: {v}");
        }
    }

    #[test]
    fn test_space_sieve_cut_early_subset() {
        let h = SievingBound::new(vec![8, 8, 4]);
        let tqr = vec![1u64, 19, 101];
        let ideal = Ideal1::new(257, 1, 3, 1);
        let mqr = compute_mqr_1(&tqr, 3, 257);
        let mut arr = NormArray::new(h.num_points());
        let cfg = SpaceSieveConfig {
            cut_early: Some(0.5),
            entropy: 0,
        };
        space_sieve(&mut arr, &h, &ideal, &mqr, &cfg);
        let hits = collect(&arr);
        let brute = brute_hits(&h, 257, &tqr);
        for x in &hits {
            assert!(brute.contains(x));
        }
    }

    #[test]
    fn test_space_sieve_agreement_three_planes() {
        let h = SievingBound::new(vec![4, 4, 8]);
        check_agreement(&h, 67, vec![1, 13, 29]);
    }
}
