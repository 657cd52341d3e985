//! Chart assembly: records -> series selection -> pivot -> normalization.
//!
//! ```text
//! records ──► select_top_n ──► pivot_with(series) ──► NormalizationState ──► ChartData
//!                 ▲                                          ▲
//!            ViewState.overrides                      ViewState.mode
//! ```
//!
//! Every step is a pure recomputation. [`ChartView`] memoizes the last
//! result so unchanged inputs hand back the same `Arc<ChartData>`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::ChartConfig;
use crate::logging::{log_chart_built, log_override_evicted, v_str, ProfileScope};
use crate::normalize::{NormalizationMode, NormalizationState};
use crate::pivot::{default_order, period_label_order, pivot_with, PivotOptions, TimeComparator};
use crate::record::{ObservationRecord, PivotedRow, TimeKey};
use crate::select::{OverrideAction, OverrideSelection, SeriesSelection};
use crate::theme::series_color;

pub const NO_DATA: &str = "No data available";

/// Series descriptor handed to the chart layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesDescriptor {
    pub key: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLine {
    pub time: TimeKey,
    pub label: String,
}

/// Chart-ready output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub x_key: String,
    pub rows: Vec<PivotedRow>,
    pub series: Vec<SeriesDescriptor>,
    pub label: String,
    pub reference_lines: Vec<ReferenceLine>,
    /// Set when there is nothing to plot.
    pub placeholder: Option<String>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.placeholder.is_some()
    }

    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|r| serde_json::to_value(r.with_time_field(&self.x_key)).unwrap_or(Value::Null))
            .collect();
        json!({
            "x_key": self.x_key,
            "label": self.label,
            "series": self.series,
            "reference_lines": self.reference_lines,
            "placeholder": self.placeholder,
            "data": rows,
        })
    }
}

/// User-interaction state for one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub top_n: usize,
    pub overrides: OverrideSelection,
    pub mode: NormalizationMode,
    /// Inclusive time window; `None` shows everything.
    pub period: Option<(TimeKey, TimeKey)>,
}

impl ViewState {
    pub fn from_config(cfg: &ChartConfig) -> Self {
        Self {
            top_n: cfg.top_n,
            overrides: OverrideSelection::with_cap(cfg.override_cap),
            mode: cfg.mode,
            period: None,
        }
    }

    pub fn with_top_n(&self, n: usize) -> Self {
        Self { top_n: n, ..self.clone() }
    }

    pub fn with_mode(&self, mode: NormalizationMode) -> Self {
        Self { mode, ..self.clone() }
    }

    pub fn with_period(&self, period: Option<(TimeKey, TimeKey)>) -> Self {
        Self { period, ..self.clone() }
    }

    pub fn with_override(&self, action: &OverrideAction) -> Self {
        if let (OverrideAction::Pick(picked) | OverrideAction::Toggle(picked), Some(evicted)) =
            (action, self.overrides.evicted_by(action))
        {
            log_override_evicted(&evicted, picked, self.overrides.cap());
        }
        Self { overrides: self.overrides.apply(action), ..self.clone() }
    }
}

/// Keep only records inside the inclusive `period`, ordered by `cmp`.
pub fn filter_period(
    records: &[ObservationRecord],
    period: &(TimeKey, TimeKey),
    cmp: TimeComparator,
) -> Vec<ObservationRecord> {
    let (from, to) = period;
    records
        .iter()
        .filter(|r| {
            r.time
                .as_ref()
                .map(|t| cmp(t, from) != Ordering::Less && cmp(t, to) != Ordering::Greater)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

pub fn build_chart(records: &[ObservationRecord], view: &ViewState, cfg: &ChartConfig) -> ChartData {
    let _scope = ProfileScope::with_context("build_chart", &[("metric", v_str(&cfg.metric))]);
    let order: TimeComparator = if cfg.period_labels { period_label_order } else { default_order };

    let windowed;
    let records = match &view.period {
        Some(period) => {
            windowed = filter_period(records, period, order);
            &windowed[..]
        }
        None => records,
    };

    let selection = SeriesSelection::compute(records, &cfg.metric, view.top_n, Some(&view.overrides));

    let opts = PivotOptions::default()
        .with_duplicates(cfg.duplicates)
        .with_series(&selection.selected)
        .with_comparator(order);
    let pivoted = pivot_with(records, &cfg.metric, &opts);

    let state = NormalizationState::new(&cfg.metric_label)
        .with_boundary(cfg.truncation_year.map(TimeKey::Int))
        .with_baseline(cfg.baseline.clone())
        .with_period_labels(cfg.period_labels)
        .with_mode(view.mode);
    let view_rows = state.apply(&pivoted, &selection.selected);

    let mut reference_lines = Vec::new();
    if let (NormalizationMode::Truncated, Some(boundary)) = (state.effective_mode(), &state.truncation_boundary) {
        reference_lines.push(ReferenceLine {
            time: boundary.clone(),
            label: "Citation window incomplete after this cohort".to_string(),
        });
    }

    let has_values = view_rows.data.iter().any(|r| !r.is_empty());
    let series: Vec<SeriesDescriptor> = selection
        .selected
        .iter()
        .enumerate()
        .map(|(i, key)| SeriesDescriptor {
            key: key.clone(),
            name: cfg.display_name(key).to_string(),
            color: series_color(i).to_string(),
        })
        .collect();

    log_chart_built(&cfg.metric, view_rows.data.len(), &selection.selected, state.effective_mode().as_str(), false);

    ChartData {
        x_key: cfg.x_key.clone(),
        rows: view_rows.data,
        series,
        label: view_rows.label,
        reference_lines,
        placeholder: if has_values { None } else { Some(NO_DATA.to_string()) },
    }
}

/// Memoized chart for one page view over an immutable record set.
pub struct ChartView {
    records: Arc<Vec<ObservationRecord>>,
    config: ChartConfig,
    last: Option<(String, Arc<ChartData>)>,
}

impl ChartView {
    pub fn new(records: Arc<Vec<ObservationRecord>>, config: ChartConfig) -> Self {
        Self { records, config, last: None }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Swap in a freshly loaded record set; the next render recomputes.
    pub fn replace_records(&mut self, records: Arc<Vec<ObservationRecord>>) {
        if !Arc::ptr_eq(&self.records, &records) {
            self.records = records;
            self.last = None;
        }
    }

    pub fn render(&mut self, view: &ViewState) -> Arc<ChartData> {
        let fp = fingerprint(view, &self.config);
        if let Some((last_fp, chart)) = &self.last {
            if *last_fp == fp {
                log_chart_built(&self.config.metric, chart.rows.len(), &[], view.mode.as_str(), true);
                return chart.clone();
            }
        }
        let chart = Arc::new(build_chart(&self.records, view, &self.config));
        self.last = Some((fp, chart.clone()));
        chart
    }
}

/// Stable hash of everything a render depends on besides the records.
pub fn fingerprint(view: &ViewState, cfg: &ChartConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(view).unwrap_or_default());
    hasher.update(serde_json::to_vec(cfg).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ObservationRecord> {
        let mut out = Vec::new();
        for (year, us, jp, de) in [(2017, 10.0, 6.0, 2.0), (2018, 8.0, 5.0, 2.0), (2019, 3.0, 1.0, 1.0)] {
            out.push(ObservationRecord::new(year, Some("US")).with_metric("cites", us));
            out.push(ObservationRecord::new(year, Some("JP")).with_metric("cites", jp));
            out.push(ObservationRecord::new(year, Some("DE")).with_metric("cites", de));
        }
        out
    }

    fn cfg() -> ChartConfig {
        ChartConfig {
            metric: "cites".into(),
            metric_label: "Average Forward Citations".into(),
            top_n: 2,
            truncation_year: Some(2018),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_chart_selects_and_colors() {
        let cfg = cfg();
        let chart = build_chart(&records(), &ViewState::from_config(&cfg), &cfg);
        let keys: Vec<&str> = chart.series.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["US", "JP"]);
        assert_ne!(chart.series[0].color, chart.series[1].color);
        assert!(chart.rows.iter().all(|r| !r.contains_key("DE")));
        assert!(chart.placeholder.is_none());
        assert!(chart.reference_lines.is_empty());
    }

    #[test]
    fn test_truncated_mode_marks_boundary() {
        let cfg = cfg();
        let view = ViewState::from_config(&cfg).with_mode(NormalizationMode::Truncated);
        let chart = build_chart(&records(), &view, &cfg);
        assert!(chart.rows[2].is_empty());
        assert_eq!(chart.reference_lines[0].time, TimeKey::Int(2018));
        assert_eq!(chart.label, "Average Forward Citations (through 2018 cohorts)");
    }

    #[test]
    fn test_overrides_and_period_filter() {
        let cfg = cfg();
        let view = ViewState::from_config(&cfg)
            .with_override(&OverrideAction::Pick("DE".into()))
            .with_period(Some((TimeKey::Int(2018), TimeKey::Int(2019))));
        let chart = build_chart(&records(), &view, &cfg);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].key, "DE");
        assert_eq!(chart.rows.len(), 2);
        assert_eq!(chart.rows[0].time, TimeKey::Int(2018));
    }

    #[test]
    fn test_period_filter_over_labels() {
        let records: Vec<ObservationRecord> = ["Years 0-4", "Years 5-9", "Years 10-14", "Years 15-19"]
            .iter()
            .map(|p| ObservationRecord::new(*p, Some("US")).with_metric("cites", 1.0))
            .collect();
        let cfg = ChartConfig { period_labels: true, ..cfg() };
        let view = ViewState::from_config(&cfg)
            .with_period(Some((TimeKey::from("Years 5-9"), TimeKey::from("Years 10-14"))));
        let chart = build_chart(&records, &view, &cfg);
        assert!(chart.placeholder.is_none());
        let times: Vec<TimeKey> = chart.rows.iter().map(|r| r.time.clone()).collect();
        assert_eq!(times, vec![TimeKey::from("Years 5-9"), TimeKey::from("Years 10-14")]);
    }

    #[test]
    fn test_truncated_period_labels_keep_early_cohorts() {
        let records: Vec<ObservationRecord> = ["2005-2009", "2010-2014", "2015-2019", "2020-2024"]
            .iter()
            .map(|p| ObservationRecord::new(*p, Some("US")).with_metric("cites", 2.0))
            .collect();
        let cfg = ChartConfig { period_labels: true, ..cfg() };
        let view = ViewState::from_config(&cfg).with_mode(NormalizationMode::Truncated);
        let chart = build_chart(&records, &view, &cfg);
        let kept = chart.rows.iter().filter(|r| r.contains_key("US")).count();
        assert_eq!(kept, 3);
        assert!(!chart.rows[3].contains_key("US"));
    }

    #[test]
    fn test_empty_result_has_placeholder() {
        let cfg = cfg();
        let view = ViewState::from_config(&cfg).with_override(&OverrideAction::Pick("FR".into()));
        let chart = build_chart(&records(), &view, &cfg);
        assert!(chart.is_empty());
        assert_eq!(chart.placeholder.as_deref(), Some(NO_DATA));
        assert!(build_chart(&[], &view, &cfg).is_empty());
    }

    #[test]
    fn test_chart_view_memoizes() {
        let cfg = cfg();
        let mut view = ChartView::new(Arc::new(records()), cfg.clone());
        let state = ViewState::from_config(&cfg);
        let a = view.render(&state);
        let b = view.render(&state.clone());
        assert!(Arc::ptr_eq(&a, &b));

        let c = view.render(&state.with_top_n(3));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.series.len(), 3);
        // switching back recomputes an equal, fresh value; the old one is untouched
        let d = view.render(&state);
        assert_eq!(*a, *d);
        assert_eq!(a.series.len(), 2);
    }

    #[test]
    fn test_to_json_uses_x_key() {
        let cfg = cfg();
        let chart = build_chart(&records(), &ViewState::from_config(&cfg), &cfg);
        let v = chart.to_json();
        assert_eq!(v["x_key"], "year");
        assert_eq!(v["data"][0]["year"], 2017);
        assert_eq!(v["data"][0]["US"], 10.0);
    }
}
