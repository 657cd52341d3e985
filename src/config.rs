use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::normalize::{Baseline, NormalizationMode};
use crate::pivot::DuplicatePolicy;
use crate::select::DEFAULT_OVERRIDE_CAP;

/// Per-chart configuration. Truncation years and top-N counts live here
/// rather than at call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub metric: String,
    pub metric_label: String,
    /// Name of the x-axis field in emitted rows.
    pub x_key: String,
    pub top_n: usize,
    pub override_cap: usize,
    pub truncation_year: Option<i64>,
    pub mode: NormalizationMode,
    pub baseline: Baseline,
    pub duplicates: DuplicatePolicy,
    /// Order period labels by their leading number ("1980s" < "1990s").
    pub period_labels: bool,
    pub display_names: BTreeMap<String, String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            metric: "patent_count".to_string(),
            metric_label: "Patents Granted".to_string(),
            x_key: "year".to_string(),
            top_n: 5,
            override_cap: DEFAULT_OVERRIDE_CAP,
            truncation_year: None,
            mode: NormalizationMode::Raw,
            baseline: Baseline::SeriesMean,
            duplicates: DuplicatePolicy::LastWrite,
            period_labels: false,
            display_names: BTreeMap::new(),
        }
    }
}

impl ChartConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            metric: std::env::var("METRIC").unwrap_or(d.metric),
            metric_label: std::env::var("METRIC_LABEL").unwrap_or(d.metric_label),
            x_key: std::env::var("X_KEY").unwrap_or(d.x_key),
            top_n: std::env::var("TOP_N").ok().and_then(|v| v.parse().ok()).unwrap_or(d.top_n),
            override_cap: std::env::var("OVERRIDE_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.override_cap),
            truncation_year: std::env::var("TRUNCATION_YEAR").ok().and_then(|v| v.parse().ok()),
            mode: std::env::var("NORMALIZATION").ok().and_then(|v| NormalizationMode::parse(&v)).unwrap_or(d.mode),
            baseline: std::env::var("BASELINE_SERIES").map(Baseline::Series).unwrap_or(d.baseline),
            duplicates: match std::env::var("DUPLICATES").as_deref() {
                Ok("sum") => DuplicatePolicy::Sum,
                Ok("mean") => DuplicatePolicy::Mean,
                _ => d.duplicates,
            },
            period_labels: std::env::var("PERIOD_LABELS").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(d.period_labels),
            display_names: d.display_names,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading chart config {}", path.display()))?;
        let cfg: ChartConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing chart config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.display_names.get(key).map(|s| s.as_str()).unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: ChartConfig = serde_json::from_str(
            r#"{"metric":"avg_forward_citations","truncation_year":2018,"mode":"truncated"}"#,
        )
        .unwrap();
        assert_eq!(cfg.metric, "avg_forward_citations");
        assert_eq!(cfg.truncation_year, Some(2018));
        assert_eq!(cfg.mode, NormalizationMode::Truncated);
        assert_eq!(cfg.top_n, 5);
        assert_eq!(cfg.override_cap, 3);
        assert_eq!(cfg.x_key, "year");
    }

    #[test]
    fn test_display_name_fallback() {
        let mut cfg = ChartConfig::default();
        cfg.display_names.insert("IBM".into(), "International Business Machines".into());
        assert_eq!(cfg.display_name("IBM"), "International Business Machines");
        assert_eq!(cfg.display_name("Sony"), "Sony");
    }
}
