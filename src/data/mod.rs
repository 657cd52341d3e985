//! Loading layer: adapts raw JSON documents into observation records.
//!
//! Upstream documents come in three shapes:
//! - flat: `[{"year": 2000, "group": "US", "patent_count": 12, ...}, ...]`
//! - wrapped: `{"companies": [...]}`, whose elements are either flat records
//!   or `{"name": "IBM", "years": [{"year": 2000, ...}, ...]}`
//! - keyed: `{"IBM": [{"year": 2000, ...}, ...], "Samsung": [...]}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::logging::log_record_skipped;
use crate::record::{ObservationRecord, TimeKey};

/// Field names used to read a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSchema {
    pub time_field: String,
    /// Candidate group fields, tried in order.
    pub group_fields: Vec<String>,
    /// Metric fields to keep; empty keeps every numeric field.
    pub metric_fields: Vec<String>,
    /// Array field holding the records in a wrapped document; `None` falls
    /// back to well-known collection names.
    pub collection_field: Option<String>,
}

impl Default for DocumentSchema {
    fn default() -> Self {
        Self {
            time_field: "year".to_string(),
            group_fields: ["group", "company", "organization", "country", "section", "name"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metric_fields: Vec::new(),
            collection_field: None,
        }
    }
}

impl DocumentSchema {
    pub fn with_time_field(mut self, field: &str) -> Self {
        self.time_field = field.to_string();
        self
    }

    pub fn with_group_field(mut self, field: &str) -> Self {
        self.group_fields = vec![field.to_string()];
        self
    }

    pub fn with_metrics(mut self, fields: &[&str]) -> Self {
        self.metric_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    fn is_reserved(&self, key: &str) -> bool {
        key == self.time_field || self.group_fields.iter().any(|g| g == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentShape {
    Flat,
    Wrapped,
    Keyed,
    Empty,
}

/// Records recovered from one document plus what had to be dropped.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub shape: DocumentShape,
    pub records: Vec<ObservationRecord>,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn empty(shape: DocumentShape) -> Self {
        Self { shape, records: Vec::new(), skipped: 0, warnings: Vec::new() }
    }

    pub fn groups(&self) -> BTreeSet<String> {
        self.records.iter().filter_map(|r| r.group.clone()).collect()
    }

    pub fn metrics(&self) -> BTreeSet<String> {
        self.records.iter().flat_map(|r| r.metrics.keys().cloned()).collect()
    }

    fn skip(&mut self, location: &str, index: usize, reason: &str) {
        self.skipped += 1;
        self.warnings.push(format!("skipped record {}: {}", index, reason));
        log_record_skipped(location, index, reason);
    }
}

/// Adapt any supported document shape into observation records.
///
/// Records without a usable time are dropped and counted; non-numeric
/// metric fields are ignored.
pub fn parse_document(doc: &Value, schema: &DocumentSchema, location: &str) -> LoadReport {
    match doc {
        Value::Array(items) => {
            let mut report = LoadReport::empty(DocumentShape::Flat);
            read_items(items, None, schema, location, &mut report);
            report
        }
        Value::Object(map) => match collection(map, schema) {
            Some(items) => {
                let mut report = LoadReport::empty(DocumentShape::Wrapped);
                read_items(items, None, schema, location, &mut report);
                report
            }
            None if map.values().any(|v| v.is_array()) => {
                let mut report = LoadReport::empty(DocumentShape::Keyed);
                for (name, value) in map {
                    if let Value::Array(items) = value {
                        read_items(items, Some(name.as_str()), schema, location, &mut report);
                    }
                }
                report
            }
            None => LoadReport::empty(DocumentShape::Empty),
        },
        _ => {
            let mut report = LoadReport::empty(DocumentShape::Empty);
            report.warnings.push("document is neither an array nor an object".to_string());
            report
        }
    }
}

// A wrapped document names its collection explicitly, or keeps its records
// under a well-known collection key next to any metadata fields; a single
// array of objects beside at most one other field also counts. Anything else
// is keyed by series name.
fn collection<'a>(map: &'a Map<String, Value>, schema: &DocumentSchema) -> Option<&'a Vec<Value>> {
    if let Some(field) = &schema.collection_field {
        return map.get(field).and_then(|v| v.as_array());
    }
    let known: Vec<&Vec<Value>> = WRAPPER_KEYS
        .iter()
        .filter_map(|k| map.get(*k).and_then(|v| v.as_array()))
        .filter(|items| !items.is_empty() && is_object_array(items))
        .collect();
    if let [only] = known.as_slice() {
        return Some(*only);
    }
    let arrays: Vec<&Vec<Value>> = map.values().filter_map(|v| v.as_array()).collect();
    match arrays.as_slice() {
        [only] if map.len() <= 2 && is_object_array(only) && looks_wrapped(map) => Some(*only),
        _ => None,
    }
}

const WRAPPER_KEYS: [&str; 7] = ["companies", "organizations", "countries", "records", "data", "series", "items"];

fn is_object_array(items: &[Value]) -> bool {
    items.iter().all(|v| v.is_object())
}

fn looks_wrapped(map: &Map<String, Value>) -> bool {
    WRAPPER_KEYS.iter().any(|k| map.contains_key(*k))
}

fn read_items(
    items: &[Value],
    group: Option<&str>,
    schema: &DocumentSchema,
    location: &str,
    report: &mut LoadReport,
) {
    for item in items {
        let Value::Object(fields) = item else {
            let index = report.records.len() + report.skipped;
            report.skip(location, index, "not an object");
            continue;
        };
        let own_group = group_of(fields, schema).or_else(|| group.map(|g| g.to_string()));

        // Nested yearly series under a named element
        if let Some(nested) = nested_series(fields, schema) {
            read_items(nested, own_group.as_deref(), schema, location, report);
            continue;
        }

        let index = report.records.len() + report.skipped;
        let Some(time) = fields.get(&schema.time_field).and_then(time_of) else {
            report.skip(location, index, "missing time");
            continue;
        };
        let mut record = ObservationRecord { time: Some(time), group: own_group, metrics: Default::default() };
        for (key, value) in fields {
            if schema.is_reserved(key) {
                continue;
            }
            if !schema.metric_fields.is_empty() && !schema.metric_fields.iter().any(|m| m == key) {
                continue;
            }
            if let Some(v) = value.as_f64() {
                record.metrics.insert(key.clone(), v);
            }
        }
        report.records.push(record);
    }
}

fn group_of(fields: &Map<String, Value>, schema: &DocumentSchema) -> Option<String> {
    schema
        .group_fields
        .iter()
        .find_map(|g| fields.get(g).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

fn nested_series<'a>(fields: &'a Map<String, Value>, schema: &DocumentSchema) -> Option<&'a Vec<Value>> {
    if fields.contains_key(&schema.time_field) {
        return None;
    }
    fields.values().filter_map(|v| v.as_array()).find(|a| a.iter().any(|v| v.is_object()))
}

fn time_of(value: &Value) -> Option<TimeKey> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(TimeKey::Int(i)),
            None => n.as_f64().map(TimeKey::Float),
        },
        Value::String(s) if !s.trim().is_empty() => Some(TimeKey::parse(s)),
        _ => None,
    }
}

// =============================================================================
// Document manifests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentManifest {
    pub path: String,
    pub hash_sha256: String,
    pub shape: DocumentShape,
    pub record_count: u64,
    pub skipped_records: u64,
    pub time_min: Option<TimeKey>,
    pub time_max: Option<TimeKey>,
    pub groups: Vec<String>,
    pub metrics: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at_epoch: u64,
}

pub fn read_document(path: &Path) -> Result<Value, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| format!("bad json in {}: {}", path.display(), e))
}

pub fn analyze_document(
    path: &Path,
    schema: &DocumentSchema,
    now_ts: u64,
) -> Result<(DocumentManifest, LoadReport), String> {
    let hash = file_sha256(path)?;
    let doc = read_document(path)?;
    let location = path.display().to_string();
    let report = parse_document(&doc, schema, &location);

    let mut warnings = report.warnings.clone();
    if report.records.is_empty() {
        warnings.push("no_records".to_string());
    }

    let manifest = DocumentManifest {
        path: location,
        hash_sha256: hash,
        shape: report.shape,
        record_count: report.records.len() as u64,
        skipped_records: report.skipped as u64,
        time_min: report.records.iter().filter_map(|r| r.time.clone()).min(),
        time_max: report.records.iter().filter_map(|r| r.time.clone()).max(),
        groups: report.groups().into_iter().collect(),
        metrics: report.metrics().into_iter().collect(),
        warnings,
        generated_at_epoch: now_ts,
    };

    Ok((manifest, report))
}

pub fn file_sha256(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(document_path: &Path) -> PathBuf {
    let mut p = document_path.to_path_buf();
    let fname = document_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document.json");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_document() {
        let doc = json!([
            {"year": 2000, "country": "US", "patent_count": 5, "share": 0.4},
            {"year": 2000, "country": "JP", "patent_count": 3, "note": "estimate"},
        ]);
        let report = parse_document(&doc, &DocumentSchema::default(), "flat");
        assert_eq!(report.shape, DocumentShape::Flat);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].group.as_deref(), Some("US"));
        assert_eq!(report.records[0].metric("share"), Some(0.4));
        assert!(report.records[1].metric("note").is_none());
    }

    #[test]
    fn test_wrapped_nested_document() {
        let doc = json!({"companies": [
            {"name": "IBM", "years": [{"year": 2000, "patents": 10}, {"year": 2001, "patents": 12}]},
            {"name": "Sony", "years": [{"year": 2000, "patents": 4}]},
        ]});
        let report = parse_document(&doc, &DocumentSchema::default(), "wrapped");
        assert_eq!(report.shape, DocumentShape::Wrapped);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[2].group.as_deref(), Some("Sony"));
        assert_eq!(report.records[1].time, Some(TimeKey::Int(2001)));
    }

    #[test]
    fn test_wrapped_document_with_metadata() {
        let doc = json!({
            "generated": "2025-01-01T00:00:00Z",
            "version": 2,
            "companies": [{"year": 2000, "patents": 10}, {"year": 2001, "patents": 12}],
        });
        let report = parse_document(&doc, &DocumentSchema::default(), "wrapped-meta");
        assert_eq!(report.shape, DocumentShape::Wrapped);
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.group.is_none()));
    }

    #[test]
    fn test_keyed_document() {
        let doc = json!({
            "IBM": [{"year": 2000, "patents": 10}],
            "Samsung": [{"year": 2000, "patents": 8}, {"patents": 1}],
        });
        let report = parse_document(&doc, &DocumentSchema::default(), "keyed");
        assert_eq!(report.shape, DocumentShape::Keyed);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.groups().len(), 2);
    }

    #[test]
    fn test_metric_filter_and_custom_time_field() {
        let doc = json!([{"period": "1980s", "section": "G", "a": 1, "b": 2}]);
        let schema = DocumentSchema::default().with_time_field("period").with_metrics(&["a"]);
        let report = parse_document(&doc, &schema, "periods");
        assert_eq!(report.records[0].time, Some(TimeKey::Label("1980s".into())));
        assert_eq!(report.records[0].metrics.len(), 1);
        assert_eq!(report.records[0].group.as_deref(), Some("G"));
    }

    #[test]
    fn test_scalar_document_is_empty() {
        let report = parse_document(&json!(42), &DocumentSchema::default(), "scalar");
        assert_eq!(report.shape, DocumentShape::Empty);
        assert!(report.records.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_default_manifest_path() {
        let p = default_manifest_path(Path::new("data/chapter1.json"));
        assert_eq!(p, PathBuf::from("data/chapter1.json.manifest.json"));
    }
}
