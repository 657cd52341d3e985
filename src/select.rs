//! Top-N series ranking and user-pinned series overrides.

use crate::record::ObservationRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_OVERRIDE_CAP: usize = 3;

/// Ranked view of every series seen in a record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSelection {
    /// Distinct series keys in first-appearance order.
    pub candidates: Vec<String>,
    /// Cumulative metric total per candidate, aligned with `candidates`.
    pub ranking_scores: Vec<f64>,
    pub selected: Vec<String>,
    /// True when `selected` came from user picks rather than the ranking.
    pub overridden: bool,
}

impl SeriesSelection {
    pub fn compute(
        records: &[ObservationRecord],
        metric: &str,
        n: usize,
        overrides: Option<&OverrideSelection>,
    ) -> Self {
        let (candidates, ranking_scores) = cumulative_scores(records, metric);
        let (selected, overridden) = match overrides.filter(|o| !o.is_empty()) {
            Some(o) => (o.picks(), true),
            None => (rank(&candidates, &ranking_scores, n), false),
        };
        Self { candidates, ranking_scores, selected, overridden }
    }

    pub fn score_of(&self, key: &str) -> Option<f64> {
        self.candidates
            .iter()
            .position(|c| c == key)
            .map(|i| self.ranking_scores[i])
    }
}

/// Series keys to display: the top `n` by cumulative `metric`, or the user's
/// picks verbatim when any are pinned.
pub fn select_top_n(
    records: &[ObservationRecord],
    metric: &str,
    n: usize,
    overrides: Option<&OverrideSelection>,
) -> Vec<String> {
    SeriesSelection::compute(records, metric, n, overrides).selected
}

fn cumulative_scores(records: &[ObservationRecord], metric: &str) -> (Vec<String>, Vec<f64>) {
    let mut keys: Vec<String> = Vec::new();
    let mut scores: Vec<f64> = Vec::new();
    for rec in records {
        if rec.time.is_none() {
            continue;
        }
        let key = rec.series_key();
        let value = rec.metric(metric).filter(|v| v.is_finite()).unwrap_or(0.0);
        match keys.iter().position(|k| k == key) {
            Some(i) => scores[i] += value,
            None => {
                keys.push(key.to_string());
                scores.push(value);
            }
        }
    }
    (keys, scores)
}

fn rank(keys: &[String], scores: &[f64], n: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    // sort_by is stable, so equal totals keep first-appearance order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.into_iter().take(n).map(|i| keys[i].clone()).collect()
}

/// User interaction on the series picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "snake_case")]
pub enum OverrideAction {
    Pick(String),
    Unpick(String),
    Toggle(String),
    Clear,
}

/// Pinned series in pick order, bounded by `cap` with oldest-first eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOverrideSelection")]
pub struct OverrideSelection {
    picks: VecDeque<String>,
    cap: usize,
}

#[derive(Deserialize)]
struct RawOverrideSelection {
    #[serde(default)]
    picks: VecDeque<String>,
    #[serde(default = "default_cap")]
    cap: usize,
}

fn default_cap() -> usize {
    DEFAULT_OVERRIDE_CAP
}

impl TryFrom<RawOverrideSelection> for OverrideSelection {
    type Error = String;

    fn try_from(raw: RawOverrideSelection) -> Result<Self, Self::Error> {
        if raw.cap == 0 {
            return Err("override cap must be at least 1".to_string());
        }
        let mut sel = Self::with_cap(raw.cap);
        for key in &raw.picks {
            sel.pin(key);
        }
        Ok(sel)
    }
}

impl Default for OverrideSelection {
    fn default() -> Self {
        Self::with_cap(DEFAULT_OVERRIDE_CAP)
    }
}

impl OverrideSelection {
    pub fn with_cap(cap: usize) -> Self {
        Self { picks: VecDeque::new(), cap: cap.max(1) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.picks.iter().any(|k| k == key)
    }

    pub fn picks(&self) -> Vec<String> {
        self.picks.iter().cloned().collect()
    }

    /// Pure transition: returns the selection after `action`.
    pub fn apply(&self, action: &OverrideAction) -> Self {
        let mut next = self.clone();
        match action {
            OverrideAction::Pick(key) => next.pin(key),
            OverrideAction::Unpick(key) => next.picks.retain(|k| k != key),
            OverrideAction::Toggle(key) => {
                if next.contains(key) {
                    next.picks.retain(|k| k != key);
                } else {
                    next.pin(key);
                }
            }
            OverrideAction::Clear => next.picks.clear(),
        }
        next
    }

    /// Series evicted by applying `action`, if any.
    pub fn evicted_by(&self, action: &OverrideAction) -> Option<String> {
        let after = self.apply(action);
        self.picks.iter().find(|k| !after.contains(k) && !is_removal_of(action, k)).cloned()
    }

    fn pin(&mut self, key: &str) {
        if self.contains(key) {
            return;
        }
        self.picks.push_back(key.to_string());
        while self.picks.len() > self.cap {
            self.picks.pop_front();
        }
    }
}

fn is_removal_of(action: &OverrideAction, key: &str) -> bool {
    match action {
        OverrideAction::Unpick(k) | OverrideAction::Toggle(k) => k == key,
        OverrideAction::Clear => true,
        OverrideAction::Pick(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: i64, g: &str, v: f64) -> ObservationRecord {
        ObservationRecord::new(t, Some(g)).with_metric("patents", v)
    }

    #[test]
    fn test_ranks_by_cumulative_total() {
        let records = vec![rec(2000, "A", 1.0), rec(2000, "B", 4.0), rec(2001, "A", 5.0)];
        assert_eq!(select_top_n(&records, "patents", 2, None), vec!["A", "B"]);
        assert_eq!(select_top_n(&records, "patents", 1, None), vec!["A"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![rec(2000, "A", 10.0), rec(2000, "B", 10.0), rec(2000, "C", 5.0)];
        assert_eq!(select_top_n(&records, "patents", 2, None), vec!["A", "B"]);
    }

    #[test]
    fn test_deserialize_validates_cap() {
        assert!(serde_json::from_str::<OverrideSelection>(r#"{"picks":[],"cap":0}"#).is_err());
        let sel: OverrideSelection = serde_json::from_str(r#"{"picks":["A","B","A","C"],"cap":2}"#).unwrap();
        assert_eq!(sel.picks(), vec!["B", "C"]);
        let round: OverrideSelection = serde_json::from_str(&serde_json::to_string(&sel).unwrap()).unwrap();
        assert_eq!(round, sel);
    }

    #[test]
    fn test_missing_metric_counts_as_zero() {
        let records = vec![
            ObservationRecord::new(2000, Some("A")).with_metric("claims", 50.0),
            rec(2000, "B", 1.0),
        ];
        let sel = SeriesSelection::compute(&records, "patents", 5, None);
        assert_eq!(sel.selected, vec!["B", "A"]);
        assert_eq!(sel.score_of("A"), Some(0.0));
    }

    #[test]
    fn test_n_larger_than_candidates() {
        let records = vec![rec(2000, "A", 1.0)];
        assert_eq!(select_top_n(&records, "patents", 10, None), vec!["A"]);
        assert!(select_top_n(&[], "patents", 10, None).is_empty());
    }

    #[test]
    fn test_overrides_replace_ranking() {
        let records = vec![rec(2000, "A", 10.0), rec(2000, "B", 1.0)];
        let picks = OverrideSelection::default()
            .apply(&OverrideAction::Pick("B".into()))
            .apply(&OverrideAction::Pick("Z".into()));
        let sel = SeriesSelection::compute(&records, "patents", 1, Some(&picks));
        assert_eq!(sel.selected, vec!["B", "Z"]);
        assert!(sel.overridden);

        let empty = OverrideSelection::default();
        assert_eq!(select_top_n(&records, "patents", 1, Some(&empty)), vec!["A"]);
    }

    #[test]
    fn test_override_fifo_eviction() {
        let mut sel = OverrideSelection::with_cap(3);
        for key in ["X", "Y", "Z", "W"] {
            sel = sel.apply(&OverrideAction::Pick(key.into()));
        }
        assert_eq!(sel.picks(), vec!["Y", "Z", "W"]);
    }

    #[test]
    fn test_override_transitions_are_pure() {
        let base = OverrideSelection::default().apply(&OverrideAction::Pick("X".into()));
        let toggled = base.apply(&OverrideAction::Toggle("X".into()));
        assert!(toggled.is_empty());
        assert_eq!(base.picks(), vec!["X"]);

        let again = base.apply(&OverrideAction::Pick("X".into()));
        assert_eq!(again, base);
        assert!(base.apply(&OverrideAction::Clear).is_empty());
    }

    #[test]
    fn test_evicted_by_reports_oldest() {
        let sel = ["X", "Y", "Z"]
            .iter()
            .fold(OverrideSelection::default(), |s, k| s.apply(&OverrideAction::Pick(k.to_string())));
        assert_eq!(sel.evicted_by(&OverrideAction::Pick("W".into())), Some("X".to_string()));
        assert_eq!(sel.evicted_by(&OverrideAction::Unpick("Y".into())), None);
    }
}
