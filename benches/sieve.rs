use brunch::Bench;
use yamanfs::fbase::FactorBase;
use yamanfs::ideal::{Ideal1, IdealSpq};
use yamanfs::poly::PolyZ;
use yamanfs::qlat::{compute_mqr_1, compute_tqr_1, special_q_lattice};
use yamanfs::region::{NormArray, SievingBound};
use yamanfs::spacesieve::SpaceSieveConfig;
use yamanfs::{linesieve, planesieve, spacesieve};

fn setup() -> (SievingBound, yamanfs::matz::MatZ) {
    let h = SievingBound::new(vec![32, 32, 16]);
    let spq = IdealSpq::One(Ideal1::new(1048583, 12345, 3, 0));
    let m = special_q_lattice(&spq, 3, None).unwrap();
    (h, m)
}

brunch::benches! {
    // Factor base construction
    {
        let f = PolyZ::from_i64(&[2, 1, 0, 1]);
        Bench::new("make factor base up to 2^15")
        .run_seeded(f, |f| FactorBase::make(&f, 1 << 15))
    },
    // Line sieve, small prime
    {
        let (h, m) = setup();
        let ideal = Ideal1::new(17, 5, 3, 4);
        let tqr = compute_tqr_1(&m, 3, &ideal).unwrap();
        let mut arr = NormArray::new(h.num_points());
        Bench::new("line sieve r=17 over 64x64x16")
        .run_seeded_with(|| (), move |_| {
            linesieve::line_sieve(&mut arr, &h, &ideal, &tqr)
        })
    },
    // Plane sieve, medium prime
    {
        let (h, m) = setup();
        let ideal = Ideal1::new(2081, 77, 3, 11);
        let tqr = compute_tqr_1(&m, 3, &ideal).unwrap();
        let mqr = compute_mqr_1(&tqr, 3, ideal.q);
        let mut arr = NormArray::new(h.num_points());
        Bench::new("plane sieve r=2081 over 64x64x16")
        .run_seeded_with(|| (), move |_| {
            planesieve::plane_sieve(&mut arr, &h, &ideal, &mqr)
        })
    },
    // Space sieve, large prime
    {
        let (h, m) = setup();
        let ideal = Ideal1::new(65537, 4321, 3, 16);
        let tqr = compute_tqr_1(&m, 3, &ideal).unwrap();
        let mqr = compute_mqr_1(&tqr, 3, ideal.q);
        let cfg = SpaceSieveConfig::default();
        let mut arr = NormArray::new(h.num_points());
        Bench::new("space sieve r=65537 over 64x64x16")
        .run_seeded_with(|| (), move |_| {
            spacesieve::space_sieve(&mut arr, &h, &ideal, &mqr, &cfg)
        })
    },
}
