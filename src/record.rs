//! Observation records and pivoted chart rows.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Series key used when a record carries no group.
pub const SINGLE_SERIES_KEY: &str = "value";

/// Discrete, sortable time value: a year, a career-year offset, or a period label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeKey {
    Int(i64),
    Float(f64),
    Label(String),
}

impl TimeKey {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TimeKey::Int(v) => Some(*v as f64),
            TimeKey::Float(v) => Some(*v),
            TimeKey::Label(_) => None,
        }
    }

    /// Parse a raw label, preferring an integer reading ("2018" is a year).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return TimeKey::Int(v);
        }
        TimeKey::Label(trimmed.to_string())
    }
}

impl From<i64> for TimeKey {
    fn from(v: i64) -> Self {
        TimeKey::Int(v)
    }
}

impl From<i32> for TimeKey {
    fn from(v: i32) -> Self {
        TimeKey::Int(v as i64)
    }
}

impl From<f64> for TimeKey {
    fn from(v: f64) -> Self {
        TimeKey::Float(v)
    }
}

impl From<&str> for TimeKey {
    fn from(v: &str) -> Self {
        TimeKey::Label(v.to_string())
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKey::Int(v) => write!(f, "{}", v),
            TimeKey::Float(v) => write!(f, "{}", v),
            TimeKey::Label(s) => write!(f, "{}", s),
        }
    }
}

// Numbers sort before labels; Int and Float share one numeric axis.
impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TimeKey::Int(a), TimeKey::Int(b)) => a.cmp(b),
            (TimeKey::Label(a), TimeKey::Label(b)) => a.cmp(b),
            (TimeKey::Label(_), _) => Ordering::Greater,
            (_, TimeKey::Label(_)) => Ordering::Less,
            (a, b) => {
                let x = a.as_f64().unwrap_or(0.0);
                let y = b.as_f64().unwrap_or(0.0);
                x.total_cmp(&y)
            }
        }
    }
}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

/// One flat observation: a time, an optional series/group, and named metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    #[serde(default)]
    pub time: Option<TimeKey>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ObservationRecord {
    pub fn new(time: impl Into<TimeKey>, group: Option<&str>) -> Self {
        Self {
            time: Some(time.into()),
            group: group.map(|g| g.to_string()),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Series key this record pivots into.
    pub fn series_key(&self) -> &str {
        self.group.as_deref().unwrap_or(SINGLE_SERIES_KEY)
    }
}

/// One wide-format row: a time plus a sparse, insertion-ordered set of series values.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedRow {
    pub time: TimeKey,
    values: Vec<(String, f64)>,
}

impl PivotedRow {
    pub fn new(time: TimeKey) -> Self {
        Self { time, values: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite; an overwritten key keeps its original position.
    pub fn set(&mut self, key: &str, value: f64) {
        match self.values.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<f64> {
        let idx = self.values.iter().position(|(k, _)| k == key)?;
        Some(self.values.remove(idx).1)
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize with a caller-chosen name for the time field.
    pub fn with_time_field<'a>(&'a self, field: &'a str) -> RowView<'a> {
        RowView { row: self, time_field: field }
    }
}

impl Serialize for PivotedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with_time_field("time").serialize(serializer)
    }
}

/// Borrowed serialization view of a row under a specific x-axis key.
pub struct RowView<'a> {
    row: &'a PivotedRow,
    time_field: &'a str,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.values.len() + 1))?;
        map.serialize_entry(self.time_field, &self.row.time)?;
        for (k, v) in &self.row.values {
            if k != self.time_field {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}
