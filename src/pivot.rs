//! Long-to-wide time-series pivoting.
//!
//! Turns flat `(time, group, metrics)` observations into one row per distinct
//! time with one column per series. Gaps stay gaps: a series with no
//! observation at a time has no key in that row.

use crate::record::{ObservationRecord, PivotedRow, TimeKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

pub type TimeComparator = fn(&TimeKey, &TimeKey) -> Ordering;

/// How repeated `(time, group)` observations of one metric combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Last record in input order wins.
    #[default]
    LastWrite,
    Sum,
    Mean,
}

#[derive(Debug, Clone, Default)]
pub struct PivotOptions {
    pub comparator: Option<TimeComparator>,
    pub duplicates: DuplicatePolicy,
    /// Only emit these series keys; `None` keeps every series.
    pub series: Option<Vec<String>>,
}

impl PivotOptions {
    pub fn with_comparator(mut self, cmp: TimeComparator) -> Self {
        self.comparator = Some(cmp);
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn with_series(mut self, keys: &[String]) -> Self {
        self.series = Some(keys.to_vec());
        self
    }
}

/// Pivot `records` on `metric` with default ordering and last-write-wins.
pub fn pivot(records: &[ObservationRecord], metric: &str) -> Vec<PivotedRow> {
    pivot_with(records, metric, &PivotOptions::default())
}

pub fn pivot_with(
    records: &[ObservationRecord],
    metric: &str,
    opts: &PivotOptions,
) -> Vec<PivotedRow> {
    let cmp = opts.comparator.unwrap_or(default_order);
    let times = distinct_times(records, cmp);
    if times.is_empty() {
        return Vec::new();
    }

    let keep: Option<HashSet<&str>> = opts
        .series
        .as_ref()
        .map(|keys| keys.iter().map(|k| k.as_str()).collect());

    let mut rows: Vec<PivotedRow> = times.into_iter().map(PivotedRow::new).collect();
    // Per-row observation counts, only needed for Mean.
    let mut counts: Vec<Vec<(String, u32)>> = vec![Vec::new(); rows.len()];

    for rec in records {
        let Some(time) = rec.time.as_ref() else {
            continue;
        };
        let Some(value) = rec.metric(metric) else {
            continue;
        };
        let key = rec.series_key();
        if let Some(keep) = &keep {
            if !keep.contains(key) {
                continue;
            }
        }
        let Ok(idx) = rows.binary_search_by(|row| cmp(&row.time, time)) else {
            continue;
        };
        let row = &mut rows[idx];
        match (opts.duplicates, row.get(key)) {
            (DuplicatePolicy::LastWrite, _) | (_, None) => row.set(key, value),
            (DuplicatePolicy::Sum, Some(prev)) => row.set(key, prev + value),
            (DuplicatePolicy::Mean, Some(prev)) => row.set(key, prev + value),
        }
        if opts.duplicates == DuplicatePolicy::Mean {
            let slot = &mut counts[idx];
            match slot.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 += 1,
                None => slot.push((key.to_string(), 1)),
            }
        }
    }

    if opts.duplicates == DuplicatePolicy::Mean {
        for (row, row_counts) in rows.iter_mut().zip(counts) {
            for (key, n) in row_counts {
                if n > 1 {
                    if let Some(total) = row.get(&key) {
                        row.set(&key, total / n as f64);
                    }
                }
            }
        }
    }

    rows
}

/// Sorted union of the distinct times present in `records`.
///
/// Records without a time are skipped.
pub fn distinct_times(records: &[ObservationRecord], cmp: TimeComparator) -> Vec<TimeKey> {
    let mut times: Vec<TimeKey> = records.iter().filter_map(|r| r.time.clone()).collect();
    times.sort_by(cmp);
    times.dedup_by(|a, b| cmp(a, b) == Ordering::Equal);
    times
}

pub fn default_order(a: &TimeKey, b: &TimeKey) -> Ordering {
    a.cmp(b)
}

/// Orders period labels ("1980s", "2000-04", "Years 5-9") by the first
/// integer they contain, falling back to the default order.
pub fn period_label_order(a: &TimeKey, b: &TimeKey) -> Ordering {
    let lead = |t: &TimeKey| -> Option<f64> {
        match t {
            TimeKey::Label(s) => leading_number(s),
            other => other.as_f64(),
        }
    };
    match (lead(a), lead(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<f64>().ok()
}
