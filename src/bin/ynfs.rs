// Copyright 2023 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Special-q lattice siever for the number field sieve in higher
//! dimension.
//!
//! Bibliography:
//! J. Franke, T. Kleinjung, Continued fractions and lattice sieving
//! L. Grémy, Sieve algorithms for the number field sieve in dimension 3
//!
//! Relations go to stdout, diagnostics to stderr:
//!   ynfs --poly p.poly --qrange 1000,1100 --region 64,64,32 [options]

use std::fs::File;
use std::io::{BufReader, Write};
use std::str::FromStr;
use std::time::Instant;

use yamanfs::fbase::FactorBase;
use yamanfs::ideal::{Ideal1, IdealSpq};
use yamanfs::norms::auto_log2_base;
use yamanfs::poly::factor_mod_p;
use yamanfs::polyfile::PolyFile;
use yamanfs::region::SievingBound;
use yamanfs::sieve::{process_special_q, SieveConfig, SieveStats};
use yamanfs::spacesieve::SpaceSieveConfig;
use yamanfs::{arith, Int, Verbosity};

fn parse_list<T: FromStr>(s: &str) -> Option<Vec<T>> {
    s.split(',').map(|tok| tok.trim().parse().ok()).collect()
}

/// Accept one value for all sides or one value per side.
fn per_side<T: Clone>(mut v: Vec<T>, nsides: usize, what: &str) -> Vec<T> {
    if v.len() == 1 {
        return vec![v.remove(0); nsides];
    }
    if v.len() != nsides {
        eprintln!("expected 1 or {nsides} values for {what}");
        std::process::exit(1);
    }
    v
}

fn usage() -> ! {
    println!(
        "Usage: ynfs --poly FILE --qrange MIN,MAX --region H0,H1,H2 \
         [--qside N] [--fb FILE,FILE] [--fbb B,B] [--lpb B,B] \
         [--thresh T,T] [--start S,S] [--skew S0,S1,S2] [--threads N] \
         [--buckets true] [--cut-early X] [--entropy N] [--verbose info]"
    );
    std::process::exit(1);
}

fn main() {
    let arg = arguments::parse(std::env::args()).unwrap();
    let (Some(polypath), Some(qrange), Some(region)) = (
        arg.get::<String>("poly"),
        arg.get::<String>("qrange"),
        arg.get::<String>("region"),
    ) else {
        usage()
    };

    let pf = match File::open(&polypath)
        .map_err(|e| e.to_string())
        .and_then(|f| PolyFile::read(BufReader::new(f)).map_err(|e| e.to_string()))
    {
        Ok(pf) => pf,
        Err(e) => {
            eprintln!("cannot read polynomial file {polypath}: {e}");
            std::process::exit(1);
        }
    };
    let polys = pf.polys;
    let nsides = polys.len();

    let Some(h) = parse_list::<u32>(&region) else {
        usage()
    };
    if h.len() < 3 {
        eprintln!("the sieving region needs at least 3 dimensions");
        std::process::exit(1);
    }
    let h = SievingBound::new(h);
    let t = h.t();

    let Some(qr) = parse_list::<u64>(&qrange) else {
        usage()
    };
    let [q_min, q_max] = qr[..] else { usage() };
    if q_min >= q_max {
        eprintln!("empty special-q range");
        std::process::exit(1);
    }

    let q_side = arg.get::<usize>("qside").unwrap_or(nsides - 1);
    if q_side >= nsides {
        eprintln!("qside {q_side} out of range");
        std::process::exit(1);
    }
    // a missing flag takes its default, a malformed one is fatal
    fn list_flag<T: FromStr + Clone>(
        arg: &arguments::Arguments,
        name: &str,
        nsides: usize,
        default: Vec<T>,
    ) -> Vec<T> {
        match arg.get::<String>(name) {
            None => per_side(default, nsides, name),
            Some(s) => match parse_list::<T>(&s) {
                Some(v) => per_side(v, nsides, name),
                None => {
                    eprintln!("invalid value for --{name}: {s}");
                    std::process::exit(1);
                }
            },
        }
    }
    let fbb = list_flag::<u64>(&arg, "fbb", nsides, vec![1 << 15]);
    let lpb = list_flag::<u32>(&arg, "lpb", nsides, vec![24]);
    let thresh = list_flag::<f64>(
        &arg,
        "thresh",
        nsides,
        lpb.iter().map(|&b| 2.0 * b as f64).collect(),
    );
    let sieve_start = list_flag::<u64>(&arg, "start", nsides, vec![2]);
    let verbosity = match arg.get::<String>("verbose").as_deref() {
        None | Some("info") => Verbosity::Info,
        Some("quiet") => Verbosity::Quiet,
        Some("debug") => Verbosity::Debug,
        Some(v) => {
            eprintln!("unknown verbosity {v}");
            std::process::exit(1);
        }
    };
    let skew: Option<Vec<Int>> = arg.get::<String>("skew").map(|s| {
        let Some(ha) = parse_list::<u64>(&s) else {
            usage()
        };
        if ha.len() != t || ha.iter().any(|&x| x == 0) {
            eprintln!("skew needs {t} positive values");
            std::process::exit(1);
        }
        (0..t).map(|i| Int::from((ha[0] / ha[i]).max(1))).collect()
    });
    let space = SpaceSieveConfig {
        cut_early: arg.get::<f64>("cut-early"),
        entropy: arg.get::<u32>("entropy").unwrap_or(0),
    };

    // Factor bases: read them, or derive them from the polynomials.
    let sec = Instant::now();
    let fbs: Vec<FactorBase> = match arg.get::<String>("fb") {
        Some(paths) => {
            let paths: Vec<&str> = paths.split(',').collect();
            if paths.len() != nsides {
                eprintln!("expected {nsides} factor base files");
                std::process::exit(1);
            }
            paths
                .iter()
                .zip(&fbb)
                .map(|(path, &bound)| {
                    let f = File::open(path).unwrap_or_else(|e| {
                        eprintln!("cannot open factor base {path}: {e}");
                        std::process::exit(1);
                    });
                    FactorBase::read(BufReader::new(f), bound).unwrap_or_else(|e| {
                        eprintln!("factor base {path}: {e}");
                        std::process::exit(1);
                    })
                })
                .collect()
        }
        None => polys
            .iter()
            .zip(&fbb)
            .map(|(f, &bound)| FactorBase::make(f, bound))
            .collect(),
    };
    if verbosity >= Verbosity::Info {
        eprintln!(
            "# Factor bases ready in {:.3}s",
            sec.elapsed().as_secs_f64()
        );
        for (side, fb) in fbs.iter().enumerate() {
            eprintln!(
                "# side {side}: {} entries, {} ideals, bound {}",
                fb.count_entries(),
                fb.count_ideals(),
                fb.bound()
            );
        }
    }

    let log2_base: Vec<f64> = (0..nsides)
        .map(|side| auto_log2_base(&polys[side], &h, q_min, q_max, side == q_side))
        .collect();
    let ideal_streams: Vec<Vec<Ideal1>> = fbs
        .iter()
        .enumerate()
        .map(|(side, fb)| fb.ideals_1(t, 1.0 / log2_base[side]))
        .collect();

    let cfg = SieveConfig {
        h: h.clone(),
        q_side,
        fbb,
        thresh,
        lpb,
        sieve_start,
        log2_base,
        skew,
        space,
        use_buckets: arg.get::<bool>("buckets").unwrap_or(false),
        verbosity,
    };

    // Collect the special-q ideals of the range.
    let mut spqs: Vec<IdealSpq> = vec![];
    for q in arith::primes_in_range(q_min, q_max) {
        // polynomial factorization mod q assumes q odd and above deg f
        if q <= polys[q_side].degree() as u64 + 1 {
            continue;
        }
        for (g, _) in factor_mod_p(&polys[q_side], q) {
            if g.degree() == 1 {
                let rho = (q - g.c[0]) % q;
                spqs.push(IdealSpq::One(Ideal1::new(q, rho, t, 0)));
            }
        }
    }
    if verbosity >= Verbosity::Info {
        eprintln!("# {} special-q in [{q_min}, {q_max})", spqs.len());
    }

    let tpool: Option<rayon::ThreadPool> = arg.get::<usize>("threads").map(|threads| {
        eprintln!("# Using a pool of {threads} threads");
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("cannot create thread pool")
    });

    let total = Instant::now();
    let results: Vec<_> = {
        let work = || {
            use rayon::prelude::*;
            spqs.par_iter()
                .map(|spq| {
                    (
                        spq,
                        process_special_q(spq, &polys, &fbs, &ideal_streams, &cfg),
                    )
                })
                .collect::<Vec<_>>()
        };
        match &tpool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut nrels = 0u64;
    let mut totals = SieveStats::default();
    for (spq, res) in results {
        let Some((rels, stats)) = res else { continue };
        if verbosity >= Verbosity::Info {
            eprintln!("# Special-q: {spq}: {} relations", rels.len());
        }
        for s in stats {
            totals.line += s.line;
            totals.plane += s.plane;
            totals.space += s.space;
            totals.unsupported += s.unsupported;
            totals.survivors += s.survivors;
        }
        for r in rels {
            nrels += 1;
            writeln!(out, "{r}").expect("write error on stdout");
        }
    }
    if verbosity >= Verbosity::Info {
        let dt = total.elapsed().as_secs_f64();
        eprintln!(
            "# Sieved {} ideals by line, {} by plane, {} by space, {} unsupported",
            totals.line, totals.plane, totals.space, totals.unsupported
        );
        eprintln!("# {} survivors, {nrels} relations", totals.survivors);
        eprintln!("# Total time: {dt:.3}s");
        if !spqs.is_empty() {
            eprintln!("# Time per special-q: {:.4}s", dt / spqs.len() as f64);
        }
    }
}
