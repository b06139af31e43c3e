// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Polynomial file parsing.
//!
//! The file carries one polynomial per number field side and an
//! optional skewness, in a simple keyword format:
//!
//! ```text
//! # comment
//! n: 90377629292003121684002147101760858109247336549001090677693
//! skew: 1.38
//! poly0: -8252768,8404207107  # c0,c1,...
//! poly1: 276,7,0,1
//! ```
//!
//! At least two sides are required. Malformed input is fatal before
//! any sieving starts.

use std::io::BufRead;
use std::str::FromStr;

use crate::poly::PolyZ;
use crate::{Int, ParseError, Uint};

#[derive(Clone, Debug)]
pub struct PolyFile {
    pub n: Option<Uint>,
    pub skew: f64,
    pub polys: Vec<PolyZ>,
}

impl PolyFile {
    pub fn read(r: impl BufRead) -> Result<PolyFile, ParseError> {
        let mut n = None;
        let mut skew = 1.0f64;
        let mut polys: Vec<(usize, PolyZ)> = vec![];
        for (i, line) in r.lines().enumerate() {
            let lineno = i + 1;
            let line = line.map_err(|e| ParseError::new(lineno, e.to_string()))?;
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => &line[..],
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::new(lineno, "expected key: value"))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "n" => {
                    n = Some(
                        Uint::from_str(value)
                            .map_err(|_| ParseError::new(lineno, "invalid number n"))?,
                    );
                }
                "skew" => {
                    skew = value
                        .parse()
                        .map_err(|_| ParseError::new(lineno, "invalid skewness"))?;
                    if !(skew > 0.0) {
                        return Err(ParseError::new(lineno, "skewness must be positive"));
                    }
                }
                _ if key.starts_with("poly") => {
                    let side: usize = key[4..]
                        .parse()
                        .map_err(|_| ParseError::new(lineno, format!("bad side {key}")))?;
                    let mut coeffs = vec![];
                    for tok in value.split(',') {
                        let c = Int::from_str(tok.trim())
                            .map_err(|_| ParseError::new(lineno, format!("bad coefficient {tok}")))?;
                        coeffs.push(c);
                    }
                    let p = PolyZ::new(coeffs);
                    if p.is_zero() || p.degree() == 0 {
                        return Err(ParseError::new(lineno, "side polynomial must be nonconstant"));
                    }
                    polys.push((side, p));
                }
                _ => return Err(ParseError::new(lineno, format!("unknown key {key}"))),
            }
        }
        polys.sort_by_key(|(side, _)| *side);
        for (want, (side, _)) in polys.iter().enumerate() {
            if *side != want {
                return Err(ParseError::new(0, format!("missing polynomial for side {want}")));
            }
        }
        if polys.len() < 2 {
            return Err(ParseError::new(0, "at least two sides are required"));
        }
        Ok(PolyFile {
            n,
            skew,
            polys: polys.into_iter().map(|(_, p)| p).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read() {
        let text = "\
# sample pair
n: 1000000007
skew: 2.5
poly0: -8252768,8404207107
poly1: 276,7,0,1
";
        let pf = PolyFile::read(text.as_bytes()).unwrap();
        assert_eq!(pf.polys.len(), 2);
        assert_eq!(pf.skew, 2.5);
        assert_eq!(pf.polys[0].degree(), 1);
        assert_eq!(pf.polys[1].degree(), 3);
        assert_eq!(pf.n, Some(Uint::from(1000000007u64)));
    }

    #[test]
    fn test_read_errors() {
        assert!(PolyFile::read("poly0: 1,2\n".as_bytes()).is_err());
        assert!(PolyFile::read("poly0: 1,2\npoly2: 1,3\n".as_bytes()).is_err());
        assert!(PolyFile::read("poly0: 5\npoly1: 1,3\n".as_bytes()).is_err());
        assert!(PolyFile::read("junk\n".as_bytes()).is_err());
        assert!(PolyFile::read("skew: -1\npoly0: 1,2\npoly1: 1,3\n".as_bytes()).is_err());
    }
}
