//! Seeded randomized checks of pivot invariants.

use patentworld::pivot::{distinct_times, default_order, pivot};
use patentworld::record::{ObservationRecord, TimeKey};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

const GROUPS: [&str; 5] = ["US", "JP", "DE", "KR", "CN"];

fn random_records(seed: u64, n: usize) -> Vec<ObservationRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut rec = ObservationRecord::new(
                rng.gen_range(1990i64..2005),
                Some(GROUPS[rng.gen_range(0..GROUPS.len())]),
            );
            if rng.gen_bool(0.8) {
                rec = rec.with_metric("patents", rng.gen_range(0..1000) as f64);
            }
            if rng.gen_bool(0.05) {
                rec.time = None;
            }
            rec
        })
        .collect()
}

#[test]
fn pivot_is_deterministic() {
    for seed in 0..20 {
        let records = random_records(seed, 150);
        assert_eq!(pivot(&records, "patents"), pivot(&records, "patents"));
    }
}

#[test]
fn pivot_covers_exactly_the_input_times() {
    for seed in 0..20 {
        let records = random_records(seed, 150);
        let rows = pivot(&records, "patents");
        let expected: BTreeSet<TimeKey> = records.iter().filter_map(|r| r.time.clone()).collect();
        let got: Vec<TimeKey> = rows.iter().map(|r| r.time.clone()).collect();
        assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
        assert_eq!(got, distinct_times(&records, default_order));
    }
}

#[test]
fn pivot_keeps_gaps_absent() {
    for seed in 0..20 {
        let records = random_records(seed, 60);
        let present: Vec<(TimeKey, String)> = records
            .iter()
            .filter(|r| r.metric("patents").is_some())
            .filter_map(|r| r.time.clone().map(|t| (t, r.series_key().to_string())))
            .collect();
        for row in pivot(&records, "patents") {
            for group in GROUPS {
                let observed = present.iter().any(|(t, g)| *t == row.time && g == group);
                assert_eq!(row.contains_key(group), observed, "seed {} time {} group {}", seed, row.time, group);
            }
        }
    }
}

#[test]
fn pivot_values_are_last_observation() {
    let records = random_records(7, 300);
    for row in pivot(&records, "patents") {
        for (group, value) in row.entries() {
            let last = records
                .iter()
                .filter(|r| r.time.as_ref() == Some(&row.time) && r.series_key() == group)
                .filter_map(|r| r.metric("patents"))
                .last();
            assert_eq!(last, Some(value));
        }
    }
}
