use patentworld::data::{analyze_document, default_manifest_path, DocumentSchema};
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "data/chapter.json".to_string());
    let schema = match env::var("TIME_FIELD") {
        Ok(field) => DocumentSchema::default().with_time_field(&field),
        Err(_) => DocumentSchema::default(),
    };

    let now_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (manifest, report) = match analyze_document(PathBuf::from(&path).as_path(), &schema, now_ts) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("analysis failed: {}", err);
            std::process::exit(1);
        }
    };

    if manifest.record_count == 0 {
        eprintln!("no usable records in {}", path);
        eprintln!("warnings: {:?}", manifest.warnings);
        std::process::exit(2);
    }

    let out_path = default_manifest_path(PathBuf::from(&path).as_path());
    let payload = json!({
        "manifest": manifest,
        "report": {
            "shape": report.shape,
            "records": report.records.len(),
            "skipped": report.skipped,
        }
    });
    let body = match serde_json::to_string_pretty(&payload) {
        Ok(b) => b,
        Err(err) => {
            eprintln!("failed to encode manifest: {}", err);
            std::process::exit(3);
        }
    };
    if let Err(err) = fs::write(&out_path, body) {
        eprintln!("failed to write {}: {}", out_path.display(), err);
        std::process::exit(4);
    }
    println!("wrote manifest {}", out_path.display());
}
