// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Factor base: prime ideals read once per polynomial side.
//!
//! Entries are partitioned at load time by their number of roots:
//! parts[n] holds the plain entries with exactly n simple roots
//! (1 <= n <= MAX_ROOTS), parts[0] collects everything irregular
//! (prime powers, projective roots, exotic multiplicities). Within each
//! part, entries are sorted by increasing q; the sieve consumes the
//! flattened ideal stream in increasing q order.
//!
//! A `Slicing` is a derived grouping of the entries into bounded,
//! constant-logp slices assigned to bucket workers. Slicings are keyed
//! by the parameters that shape them and cached on the factor base.
//!
//! File format, one record per line (# starts a comment):
//!   q root1[:oldexp:exp] root2 ...
//! with projective roots stored in the old convention root + q.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, RwLock};

use crate::arith::{prime_power, primes_in_range};
use crate::ideal::{Ideal1, MAX_ROOTS};
use crate::poly::{roots_mod_p, PolyZ};
use crate::ParseError;

pub const FB_MAX_PARTS: usize = 4;

/// A root modulo a prime power q. q is stored by the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FbRoot {
    pub r: u64,
    pub proj: bool,
    /// p^exp | F(a) when the root matches modulo p^k, p^oldexp when it
    /// matches modulo p^(k-1) only.
    pub oldexp: u8,
    pub exp: u8,
}

impl FbRoot {
    pub fn simple(r: u64) -> Self {
        FbRoot {
            r,
            proj: false,
            oldexp: 0,
            exp: 1,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.exp == 1 && self.oldexp == 0 && !self.proj
    }

    /// Old storage format: q added to projective roots.
    pub fn to_old(&self, q: u64) -> u64 {
        self.r + if self.proj { q } else { 0 }
    }

    pub fn from_old(old: u64, q: u64, oldexp: u8, exp: u8) -> Self {
        FbRoot {
            r: if old >= q { old - q } else { old },
            proj: old >= q,
            oldexp,
            exp,
        }
    }
}

/// All the prime ideals above one rational prime (or prime power) q.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FbEntry {
    pub q: u64,
    pub p: u64,
    pub k: u8,
    pub roots: Vec<FbRoot>,
}

impl FbEntry {
    pub fn is_simple(&self) -> bool {
        self.k == 1 && self.roots.len() <= MAX_ROOTS && self.roots.iter().all(|r| r.is_simple())
    }

    /// Expected number of hits per region cell.
    pub fn weight(&self) -> f64 {
        self.roots.len() as f64 / self.q as f64
    }

    pub fn parse_line(line: &str, lineno: usize) -> Result<FbEntry, ParseError> {
        let mut tokens = line.split_whitespace();
        let q: u64 = tokens
            .next()
            .ok_or_else(|| ParseError::new(lineno, "empty record"))?
            .parse()
            .map_err(|_| ParseError::new(lineno, "invalid prime"))?;
        let (p, k) = prime_power(q)
            .ok_or_else(|| ParseError::new(lineno, format!("{q} is not a prime power")))?;
        let mut roots = vec![];
        for tok in tokens {
            let mut parts = tok.split(':');
            let old: u64 = parts
                .next()
                .unwrap()
                .parse()
                .map_err(|_| ParseError::new(lineno, format!("invalid root {tok}")))?;
            let (oldexp, exp) = match (parts.next(), parts.next()) {
                (None, None) => (0u8, 1u8),
                (Some(a), Some(b)) => {
                    let oldexp = a
                        .parse()
                        .map_err(|_| ParseError::new(lineno, format!("invalid oldexp in {tok}")))?;
                    let exp = b
                        .parse()
                        .map_err(|_| ParseError::new(lineno, format!("invalid exp in {tok}")))?;
                    (oldexp, exp)
                }
                _ => return Err(ParseError::new(lineno, format!("invalid root {tok}"))),
            };
            if parts.next().is_some() {
                return Err(ParseError::new(lineno, format!("invalid root {tok}")));
            }
            if old >= 2 * q {
                return Err(ParseError::new(lineno, format!("root {old} out of range")));
            }
            if exp <= oldexp {
                return Err(ParseError::new(lineno, format!("exponents of {tok} not increasing")));
            }
            roots.push(FbRoot::from_old(old, q, oldexp, exp));
        }
        if roots.is_empty() {
            return Err(ParseError::new(lineno, "record without roots"));
        }
        roots.sort();
        for w in roots.windows(2) {
            if w[0] == w[1] {
                return Err(ParseError::new(lineno, "duplicate root"));
            }
        }
        Ok(FbEntry { q, p, k, roots })
    }

    /// Merge the roots of another entry above the same q.
    pub fn merge(&mut self, other: FbEntry) {
        debug_assert_eq!(self.q, other.q);
        self.roots.extend(other.roots);
        self.roots.sort();
        self.roots.dedup();
    }
}

impl std::fmt::Display for FbEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.q)?;
        for root in &self.roots {
            write!(f, " {}", root.to_old(self.q))?;
            if root.oldexp != 0 || root.exp != 1 {
                write!(f, ":{}:{}", root.oldexp, root.exp)?;
            }
        }
        Ok(())
    }
}

/// Rounded log contribution of x at the given scale (scale is
/// 1 / log2(base) of the norm array).
pub fn fb_log(x: f64, scale: f64) -> u8 {
    let l = (x.log2() * scale).round();
    if l <= 0.0 {
        0
    } else if l >= 255.0 {
        255
    } else {
        l as u8
    }
}

pub struct FactorBase {
    /// parts[0]: general entries; parts[n]: entries with n simple roots.
    pub parts: Vec<Vec<FbEntry>>,
    cache: RwLock<BTreeMap<SlicingKey, Arc<Slicing>>>,
}

impl FactorBase {
    pub fn from_entries(entries: Vec<FbEntry>) -> FactorBase {
        let mut by_q: BTreeMap<u64, FbEntry> = BTreeMap::new();
        for e in entries {
            match by_q.get_mut(&e.q) {
                Some(prev) => prev.merge(e),
                None => {
                    by_q.insert(e.q, e);
                }
            }
        }
        let mut parts: Vec<Vec<FbEntry>> = vec![vec![]; MAX_ROOTS + 1];
        for (_, e) in by_q {
            if e.is_simple() {
                let n = e.roots.len();
                parts[n].push(e);
            } else {
                parts[0].push(e);
            }
        }
        FactorBase {
            parts,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Parse a factor base file; entries above fbb are ignored.
    /// Any malformed record aborts the load.
    pub fn read(r: impl BufRead, fbb: u64) -> Result<FactorBase, ParseError> {
        let mut entries = vec![];
        for (i, line) in r.lines().enumerate() {
            let line = line.map_err(|e| ParseError::new(i + 1, e.to_string()))?;
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => &line[..],
            };
            if line.trim().is_empty() {
                continue;
            }
            let e = FbEntry::parse_line(line, i + 1)?;
            if e.q <= fbb {
                entries.push(e);
            }
        }
        Ok(FactorBase::from_entries(entries))
    }

    pub fn write(&self, mut w: impl Write) -> io::Result<()> {
        // global q order across parts
        let mut all: Vec<&FbEntry> = self.parts.iter().flatten().collect();
        all.sort_by_key(|e| e.q);
        for e in all {
            writeln!(w, "{e}")?;
        }
        Ok(())
    }

    /// Build a factor base from the polynomial directly: the roots of f
    /// modulo every prime up to the bound, plus the projective root for
    /// primes dividing the leading coefficient.
    pub fn make(f: &PolyZ, fbb: u64) -> FactorBase {
        let mut entries = vec![];
        let lc = f.c[f.c.len() - 1];
        for p in primes_in_range(2, fbb + 1) {
            let roots = roots_mod_p(f, p);
            let mut rs: Vec<FbRoot> = roots.into_iter().map(FbRoot::simple).collect();
            if crate::arith::int_mod_u64(&lc, p) == 0 {
                rs.push(FbRoot {
                    r: 0,
                    proj: true,
                    oldexp: 0,
                    exp: 1,
                });
            }
            if !rs.is_empty() {
                entries.push(FbEntry {
                    q: p,
                    p,
                    k: 1,
                    roots: rs,
                });
            }
        }
        FactorBase::from_entries(entries)
    }

    pub fn count_entries(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    pub fn count_ideals(&self) -> usize {
        self.parts.iter().flatten().map(|e| e.roots.len()).sum()
    }

    pub fn weight(&self) -> f64 {
        self.parts.iter().flatten().map(|e| e.weight()).sum()
    }

    pub fn bound(&self) -> u64 {
        self.parts
            .iter()
            .flatten()
            .map(|e| e.q)
            .max()
            .unwrap_or(0)
    }

    /// Distinct underlying primes, ascending (for trial division).
    pub fn primes(&self) -> Vec<u64> {
        let mut ps: Vec<u64> = self.parts.iter().flatten().map(|e| e.p).collect();
        ps.sort_unstable();
        ps.dedup();
        ps
    }

    /// The degree 1 ideal stream consumed by the sieve, in increasing
    /// q order. Projective roots are left to trial division.
    pub fn ideals_1(&self, t: usize, scale: f64) -> Vec<Ideal1> {
        let mut out = vec![];
        for part in &self.parts {
            for e in part {
                for root in &e.roots {
                    if root.proj {
                        continue;
                    }
                    let contribution = (e.p as f64).powi((root.exp - root.oldexp) as i32);
                    let logp = fb_log(contribution, scale);
                    out.push(Ideal1::new(e.q, root.r, t, logp));
                }
            }
        }
        out.sort_by_key(|i| (i.q, i.rho));
        out
    }

    /// The cached slicing for a key, computing it on first request.
    pub fn slicing(&self, key: &SlicingKey) -> Arc<Slicing> {
        if let Some(s) = self.cache.read().unwrap().get(key) {
            return s.clone();
        }
        let s = Arc::new(Slicing::new(self, key));
        self.cache
            .write()
            .unwrap()
            .entry(key.clone())
            .or_insert(s)
            .clone()
    }
}

/// Everything a slicing depends on.
#[derive(Clone, Debug)]
pub struct SlicingKey {
    /// Upper q bound of each part level; level l covers
    /// (thresholds[l-1], thresholds[l]], level 0 starts after `skipped`.
    pub thresholds: [u64; FB_MAX_PARTS],
    /// Entries with weight above 1/td_thresh are trial divided, not
    /// sieved.
    pub td_thresh: u64,
    /// Primes at or below this are skipped entirely.
    pub skipped: u64,
    /// 1 / log2(base) of the norm array.
    pub scale: f64,
    /// Bounds the slice count per part, hence the slice sizes.
    pub nr_workspaces: u32,
}

impl PartialEq for SlicingKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for SlicingKey {}

impl PartialOrd for SlicingKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlicingKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.thresholds
            .cmp(&other.thresholds)
            .then(self.td_thresh.cmp(&other.td_thresh))
            .then(self.skipped.cmp(&other.skipped))
            .then(self.scale.total_cmp(&other.scale))
            .then(self.nr_workspaces.cmp(&other.nr_workspaces))
    }
}

/// A contiguous run of same-part entries, bounded in size, with a
/// single rounded log contribution. `index` is the stable identifier
/// carried by bucket updates.
#[derive(Clone, Debug)]
pub struct FbSlice {
    pub index: u32,
    /// Which entry vector of the factor base (0 = general).
    pub nr_roots: u8,
    pub start: usize,
    pub end: usize,
    pub logp: u8,
    pub weight: f64,
}

#[derive(Clone, Debug, Default)]
pub struct SlicingPart {
    pub slices: Vec<FbSlice>,
}

pub struct Slicing {
    pub parts: Vec<SlicingPart>,
    pub toplevel: usize,
}

impl Slicing {
    pub fn new(fb: &FactorBase, key: &SlicingKey) -> Slicing {
        let mut parts: Vec<SlicingPart> = vec![SlicingPart::default(); FB_MAX_PARTS];
        let mut index = 0u32;
        for level in 0..FB_MAX_PARTS {
            let lo = if level == 0 {
                key.skipped
            } else {
                key.thresholds[level - 1]
            };
            let hi = key.thresholds[level];
            if hi <= lo {
                continue;
            }
            for nr in 1..=MAX_ROOTS + 1 {
                // general entries (vector 0) come last within a level
                let nr = if nr == MAX_ROOTS + 1 { 0 } else { nr };
                let entries = &fb.parts[nr];
                let start = entries.partition_point(|e| e.q <= lo);
                let end = entries.partition_point(|e| e.q <= hi);
                if start == end {
                    continue;
                }
                let ws = key.nr_workspaces.max(1) as usize;
                let max_len =
                    std::cmp::max(1, (end - start + ws - 1) / ws).min(u16::MAX as usize);
                let mut i = start;
                while i < end {
                    let logp = fb_log(entries[i].q as f64, key.scale);
                    let mut j = i;
                    let mut weight = 0.0;
                    while j < end
                        && j - i < max_len
                        && fb_log(entries[j].q as f64, key.scale) == logp
                    {
                        weight += entries[j].weight();
                        j += 1;
                    }
                    parts[level].slices.push(FbSlice {
                        index,
                        nr_roots: nr as u8,
                        start: i,
                        end: j,
                        logp,
                        weight,
                    });
                    index += 1;
                    i = j;
                }
            }
        }
        let toplevel = parts
            .iter()
            .rposition(|p| !p.slices.is_empty())
            .unwrap_or(0);
        Slicing { parts, toplevel }
    }

    pub fn n_slices(&self) -> usize {
        self.parts.iter().map(|p| p.slices.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
2 1
3 1 2
5 2:0:2 3
7 10
11 3 5 9
13 13
";

    #[test]
    fn test_parse_roundtrip() {
        let fb = FactorBase::read(SAMPLE.as_bytes(), 1 << 20).unwrap();
        let mut out = vec![];
        fb.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), SAMPLE);
    }

    #[test]
    fn test_partition() {
        let fb = FactorBase::read(SAMPLE.as_bytes(), 1 << 20).unwrap();
        // 5 has a non-simple root, 7 has a projective root (10 = 3 + 7),
        // 13 has a projective root (13 = 0 + 13)
        assert_eq!(fb.parts[0].iter().map(|e| e.q).collect::<Vec<_>>(), vec![5, 7, 13]);
        assert_eq!(fb.parts[1].iter().map(|e| e.q).collect::<Vec<_>>(), vec![2]);
        assert_eq!(fb.parts[2].iter().map(|e| e.q).collect::<Vec<_>>(), vec![3]);
        assert_eq!(fb.parts[3].iter().map(|e| e.q).collect::<Vec<_>>(), vec![11]);
        assert_eq!(fb.count_ideals(), 10);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(FactorBase::read("4 1\n".as_bytes(), 100).is_err());
        assert!(FactorBase::read("x 1\n".as_bytes(), 100).is_err());
        assert!(FactorBase::read("7 15\n".as_bytes(), 100).is_err());
        assert!(FactorBase::read("7\n".as_bytes(), 100).is_err());
        assert!(FactorBase::read("7 2:1\n".as_bytes(), 100).is_err());
        assert!(FactorBase::read("7 2 2\n".as_bytes(), 100).is_err());
    }

    #[test]
    fn test_prime_powers_are_general() {
        let fb = FactorBase::read("9 2\n".as_bytes(), 100).unwrap();
        assert_eq!(fb.parts[0].len(), 1);
        assert_eq!(fb.parts[0][0].p, 3);
        assert_eq!(fb.parts[0][0].k, 2);
    }

    #[test]
    fn test_make_matches_roots() {
        use crate::poly::PolyZ;
        let f = PolyZ::from_i64(&[2, -3, 0, 1]); // roots 1, 1, -2-ish
        let fb = FactorBase::make(&f, 50);
        for part in &fb.parts {
            for e in part {
                for root in &e.roots {
                    if !root.proj {
                        assert_eq!(f.reduce_mod(e.p).eval(root.r), 0, "{} {}", e.p, root.r);
                    }
                }
            }
        }
        // entries sorted by q within each part
        for part in &fb.parts {
            for w in part.windows(2) {
                assert!(w[0].q < w[1].q);
            }
        }
    }

    #[test]
    fn test_ideals_sorted() {
        let fb = FactorBase::read(SAMPLE.as_bytes(), 1 << 20).unwrap();
        let ideals = fb.ideals_1(3, 1.0);
        for w in ideals.windows(2) {
            assert!(w[0].q <= w[1].q);
        }
        // projective roots are not sieved: 7 and 13 contribute none
        assert!(ideals.iter().all(|i| i.q != 7 && i.q != 13));
    }

    #[test]
    fn test_slicing_cache_and_order() {
        let mut entries = vec![];
        for p in primes_in_range(2, 1000) {
            entries.push(FbEntry {
                q: p,
                p,
                k: 1,
                roots: vec![FbRoot::simple(p / 2)],
            });
        }
        let fb = FactorBase::from_entries(entries);
        let key = SlicingKey {
            thresholds: [64, 256, 1000, 1000],
            td_thresh: 16,
            skipped: 2,
            scale: 1.0,
            nr_workspaces: 4,
        };
        let s1 = fb.slicing(&key);
        let s2 = fb.slicing(&key);
        assert!(Arc::ptr_eq(&s1, &s2));
        assert!(s1.n_slices() > 0);
        assert_eq!(s1.toplevel, 2);
        // slices are in increasing q order within each part
        for part in &s1.parts {
            let mut last_q = 0;
            for slice in &part.slices {
                let entries = &fb.parts[slice.nr_roots as usize];
                assert!(slice.start < slice.end);
                assert!(entries[slice.start].q > last_q);
                last_q = entries[slice.end - 1].q;
            }
        }
    }

    #[test]
    fn test_fb_log() {
        assert_eq!(fb_log(1024.0, 1.0), 10);
        assert_eq!(fb_log(1024.0, 0.5), 5);
        assert_eq!(fb_log(2.0, 1.0), 1);
    }
}
