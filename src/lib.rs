//! Chart-data engine for long-form patent analytics pages.
//!
//! Precomputed JSON aggregates are adapted into [`record::ObservationRecord`]s,
//! ranked and pivoted into wide rows, and adjusted for display before being
//! handed to a charting layer.

pub mod config;
pub mod data;
pub mod feed;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod pivot;
pub mod record;
pub mod select;
pub mod theme;

pub use normalize::{apply_truncation, NormalizationMode, NormalizationState, NormalizedView};
pub use pipeline::{build_chart, ChartData, ChartView, ViewState};
pub use pivot::{pivot, pivot_with, DuplicatePolicy, PivotOptions};
pub use record::{ObservationRecord, PivotedRow, TimeKey};
pub use select::{select_top_n, OverrideAction, OverrideSelection, SeriesSelection};
