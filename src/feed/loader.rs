//! Per-view document loading with last-request-wins semantics.
//!
//! Each load takes a generation ticket. A newer load supersedes older ones:
//! completions carrying a stale ticket are discarded, so the view always
//! shows the most recently requested document.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::cache::DocumentCache;
use super::{DocumentSource, Location};
use crate::data::{parse_document, DocumentSchema, LoadReport};
use crate::logging::{log_document_loaded, log_load_superseded, ProfileScope};
use crate::pipeline::NO_DATA;
use crate::record::ObservationRecord;

#[derive(Debug, Clone)]
pub enum LoadState {
    Idle,
    Loading,
    Ready(Arc<Vec<ObservationRecord>>),
    /// Loaded, but nothing usable came back.
    Empty,
    /// Displayed like a prolonged load; the message is for logs.
    Failed(String),
}

impl LoadState {
    pub fn records(&self) -> Option<Arc<Vec<ObservationRecord>>> {
        match self {
            LoadState::Ready(records) => Some(records.clone()),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading | LoadState::Failed(_))
    }

    /// Text for views that have nothing to chart yet.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            LoadState::Ready(_) => None,
            LoadState::Empty => Some(NO_DATA),
            LoadState::Idle | LoadState::Loading | LoadState::Failed(_) => Some("Loading…"),
        }
    }
}

pub struct ViewLoader<S> {
    cache: DocumentCache<S>,
    schema: DocumentSchema,
    generation: AtomicU64,
    state: Mutex<LoadState>,
}

impl<S: DocumentSource> ViewLoader<S> {
    pub fn new(source: S, schema: DocumentSchema) -> Self {
        Self {
            cache: DocumentCache::new(source),
            schema,
            generation: AtomicU64::new(0),
            state: Mutex::new(LoadState::Idle),
        }
    }

    pub fn cache(&self) -> &DocumentCache<S> {
        &self.cache
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().map(|s| s.clone()).unwrap_or(LoadState::Loading)
    }

    /// Start a load; returns its ticket and marks the view loading.
    pub fn begin(&self) -> u64 {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set(LoadState::Loading);
        ticket
    }

    pub fn latest(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Publish a finished load. Returns false if a newer load superseded it.
    pub fn complete(&self, ticket: u64, location: &str, outcome: Result<LoadReport, String>) -> bool {
        let latest = self.latest();
        if ticket != latest {
            log_load_superseded(location, ticket, latest);
            return false;
        }
        let next = match outcome {
            Ok(report) => {
                log_document_loaded(location, report.records.len(), report.skipped, report.groups().len());
                if report.records.is_empty() {
                    LoadState::Empty
                } else {
                    LoadState::Ready(Arc::new(report.records))
                }
            }
            Err(err) => LoadState::Failed(err),
        };
        self.set(next);
        true
    }

    /// Fetch (or reuse) the document at `location`, parse it, and publish
    /// the result unless a newer load started meanwhile.
    pub async fn load(&self, location: &Location) -> LoadState {
        let _scope = ProfileScope::new("load_document");
        let ticket = self.begin();
        let key = location.key();
        let outcome = self
            .cache
            .get(location)
            .await
            .map(|doc: Arc<Value>| parse_document(&doc, &self.schema, &key))
            .map_err(|e| e.to_string());
        self.complete(ticket, &key, outcome);
        self.state()
    }

    fn set(&self, next: LoadState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}
