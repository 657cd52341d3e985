//! Display-side transforms over pivoted rows.
//!
//! Forward-citation style metrics keep accruing for years after a cohort is
//! granted, so recent cohorts look artificially weak. Truncation removes the
//! unreliable tail (absent, never zero) and the caption says why.

use crate::pivot::{default_order, period_label_order, TimeComparator};
use crate::record::{PivotedRow, TimeKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rows plus the caption describing the transform that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedView {
    pub data: Vec<PivotedRow>,
    pub label: String,
}

/// Drop `series_keys` from every row later than `truncation_year`.
///
/// Idempotent: removed keys stay removed on a second pass. The caption has
/// no metric name; charts caption through [`NormalizationState::label`], or
/// use [`apply_truncation_labeled`].
pub fn apply_truncation(
    rows: &[PivotedRow],
    series_keys: &[String],
    truncation_year: impl Into<TimeKey>,
) -> NormalizedView {
    let boundary = truncation_year.into();
    let data = truncate_rows(rows, series_keys, &boundary, default_order);
    NormalizedView { data, label: format!("Through {} cohorts", boundary) }
}

/// Truncation captioned with the metric, e.g.
/// "Average Forward Citations (through 2018 cohorts)".
pub fn apply_truncation_labeled(
    rows: &[PivotedRow],
    series_keys: &[String],
    truncation_year: impl Into<TimeKey>,
    metric_label: &str,
) -> NormalizedView {
    NormalizationState::new(metric_label)
        .with_boundary(Some(truncation_year.into()))
        .with_mode(NormalizationMode::Truncated)
        .apply(rows, series_keys)
}

fn truncate_rows(
    rows: &[PivotedRow],
    series_keys: &[String],
    boundary: &TimeKey,
    cmp: TimeComparator,
) -> Vec<PivotedRow> {
    rows.iter()
        .map(|row| {
            let mut out = row.clone();
            if cmp(&row.time, boundary) == Ordering::Greater {
                for key in series_keys {
                    out.remove(key);
                }
            }
            out
        })
        .collect()
}

/// Divide each series value by a per-row baseline.
///
/// Rows whose baseline is missing or zero lose their series values.
pub fn apply_peer_baseline(
    rows: &[PivotedRow],
    series_keys: &[String],
    baseline: &Baseline,
) -> Vec<PivotedRow> {
    rows.iter()
        .map(|row| {
            let mut out = row.clone();
            let base = match baseline {
                Baseline::SeriesMean => {
                    let present: Vec<f64> = series_keys.iter().filter_map(|k| row.get(k)).collect();
                    if present.is_empty() {
                        None
                    } else {
                        Some(present.iter().sum::<f64>() / present.len() as f64)
                    }
                }
                Baseline::Series(key) => row.get(key),
            };
            for key in series_keys {
                match (row.get(key), base) {
                    (Some(v), Some(b)) if b != 0.0 && b.is_finite() => out.set(key, v / b),
                    _ => {
                        out.remove(key);
                    }
                }
            }
            out
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    #[default]
    Raw,
    Truncated,
    PeerBaseline,
}

impl NormalizationMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "truncated" | "truncate" => Some(Self::Truncated),
            "peer" | "peer_baseline" | "normalized" => Some(Self::PeerBaseline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Truncated => "truncated",
            Self::PeerBaseline => "peer_baseline",
        }
    }
}

/// Reference each row is divided by in peer-baseline mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// Mean of the displayed series present in the row.
    #[default]
    SeriesMean,
    /// A named series, e.g. an "All patents" aggregate.
    Series(String),
}

/// Display transform for one metric. Never mutates the rows it is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    pub mode: NormalizationMode,
    pub truncation_boundary: Option<TimeKey>,
    #[serde(default)]
    pub baseline: Baseline,
    pub metric_label: String,
    /// Compare times as period labels ("2005-2009") by their leading year.
    #[serde(default)]
    pub period_labels: bool,
}

impl NormalizationState {
    pub fn new(metric_label: &str) -> Self {
        Self {
            mode: NormalizationMode::Raw,
            truncation_boundary: None,
            baseline: Baseline::SeriesMean,
            metric_label: metric_label.to_string(),
            period_labels: false,
        }
    }

    pub fn with_period_labels(mut self, period_labels: bool) -> Self {
        self.period_labels = period_labels;
        self
    }

    fn order(&self) -> TimeComparator {
        if self.period_labels {
            period_label_order
        } else {
            default_order
        }
    }

    pub fn with_boundary(mut self, boundary: Option<TimeKey>) -> Self {
        self.truncation_boundary = boundary;
        self
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Switch display mode; selecting the current mode returns an equal state.
    pub fn with_mode(&self, mode: NormalizationMode) -> Self {
        let mut next = self.clone();
        next.mode = mode;
        next
    }

    /// Truncation with no boundary configured behaves as raw.
    pub fn effective_mode(&self) -> NormalizationMode {
        match (self.mode, &self.truncation_boundary) {
            (NormalizationMode::Truncated, None) => NormalizationMode::Raw,
            (mode, _) => mode,
        }
    }

    pub fn apply(&self, rows: &[PivotedRow], series_keys: &[String]) -> NormalizedView {
        match (self.effective_mode(), &self.truncation_boundary) {
            (NormalizationMode::Truncated, Some(boundary)) => NormalizedView {
                data: truncate_rows(rows, series_keys, boundary, self.order()),
                label: self.label(),
            },
            (NormalizationMode::PeerBaseline, _) => NormalizedView {
                data: apply_peer_baseline(rows, series_keys, &self.baseline),
                label: self.label(),
            },
            _ => NormalizedView { data: rows.to_vec(), label: self.label() },
        }
    }

    /// Caption for the active transform.
    pub fn label(&self) -> String {
        match (self.effective_mode(), &self.truncation_boundary) {
            (NormalizationMode::Truncated, Some(boundary)) => {
                format!("{} (through {} cohorts)", self.metric_label, boundary)
            }
            (NormalizationMode::PeerBaseline, _) => match &self.baseline {
                Baseline::SeriesMean => format!("{} (relative to peer average)", self.metric_label),
                Baseline::Series(key) => format!("{} (relative to {})", self.metric_label, key),
            },
            _ => self.metric_label.clone(),
        }
    }
}
