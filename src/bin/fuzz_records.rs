//! Emits a random flat observation document on stdout, for exercising the
//! loader and chart pipeline with sparse, duplicated and malformed input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::env;

const GROUPS: [&str; 8] = ["US", "JP", "DE", "KR", "CN", "FR", "GB", "TW"];

fn main() {
    let seed = env::var("SEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(42u64);
    let records = env::var("RECORDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(200usize);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut out: Vec<Value> = Vec::with_capacity(records);
    for _ in 0..records {
        let roll = rng.gen_range(0..100);
        let group = GROUPS[rng.gen_range(0..GROUPS.len())];
        let year = 1976 + rng.gen_range(0..50);
        let count = rng.gen_range(0..5000);
        let citations = rng.gen_range(0.0..25.0);
        if roll < 5 {
            // malformed: no time
            out.push(json!({"group": group, "patent_count": count}));
        } else if roll < 15 {
            // sparse: one metric only
            out.push(json!({"year": year, "group": group, "patent_count": count}));
        } else {
            out.push(json!({
                "year": year,
                "group": group,
                "patent_count": count,
                "avg_forward_citations": citations,
            }));
        }
    }
    println!("{}", Value::Array(out));
}
