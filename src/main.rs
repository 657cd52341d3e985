use anyhow::{anyhow, Result};
use std::path::PathBuf;

use patentworld::config::ChartConfig;
use patentworld::data::DocumentSchema;
use patentworld::feed::loader::{LoadState, ViewLoader};
use patentworld::feed::{AnySource, Location};
use patentworld::logging::{json_log, obj, v_str};
use patentworld::pipeline::{ChartView, ViewState};
use patentworld::record::TimeKey;
use patentworld::select::OverrideAction;
use serde_json::json;

/// Renders chart JSON for one document.
///
/// Usage: `patentworld <path-or-url> [chart-config.json]`
///
/// View state comes from the environment: `PICK=IBM,Sony` pins series,
/// `PERIOD=1990:2010` restricts the time window, plus everything
/// `ChartConfig::from_env` reads.
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let raw_location = args
        .next()
        .ok_or_else(|| anyhow!("usage: patentworld <path-or-url> [chart-config.json]"))?;
    let cfg = match args.next() {
        Some(path) => ChartConfig::from_json_file(&PathBuf::from(path))?,
        None => ChartConfig::from_env(),
    };

    let location = Location::parse(&raw_location)?;
    json_log(
        "startup",
        obj(&[
            ("location", v_str(&location.to_string())),
            ("metric", v_str(&cfg.metric)),
            ("mode", v_str(cfg.mode.as_str())),
        ]),
    );

    let schema = std::env::var("TIME_FIELD")
        .map(|f| DocumentSchema::default().with_time_field(&f))
        .unwrap_or_default();
    let loader = ViewLoader::new(AnySource::default(), schema);

    let records = match loader.load(&location).await {
        LoadState::Ready(records) => records,
        LoadState::Failed(err) => return Err(anyhow!("loading {}: {}", location, err)),
        other => {
            let placeholder = other.placeholder().unwrap_or("No data available");
            println!("{}", json!({ "placeholder": placeholder, "data": [] }));
            return Ok(());
        }
    };

    let mut view_state = ViewState::from_config(&cfg);
    if let Ok(picks) = std::env::var("PICK") {
        for key in picks.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            view_state = view_state.with_override(&OverrideAction::Pick(key.to_string()));
        }
    }
    if let Ok(period) = std::env::var("PERIOD") {
        view_state = view_state.with_period(parse_period(&period));
    }

    let mut view = ChartView::new(records, cfg);
    let chart = view.render(&view_state);
    println!("{}", serde_json::to_string_pretty(&chart.to_json())?);
    Ok(())
}

fn parse_period(raw: &str) -> Option<(TimeKey, TimeKey)> {
    let (from, to) = raw.split_once(':')?;
    Some((TimeKey::parse(from), TimeKey::parse(to)))
}
