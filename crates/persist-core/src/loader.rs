//! InitialStateLoader: picks the document the editor opens with.
//!
//! Tiers are tried in order and the first one that produces a state the
//! surface accepts wins:
//!
//! 1. Local cache
//! 2. Remote endpoint
//! 3. Bundled default document (optional)
//! 4. Empty document
//!
//! No tier failure ever reaches the caller; each one is logged and the next
//! tier is tried.

use crate::cache::LocalCache;
use crate::document_id::DocumentId;
use crate::kv::KeyValueStore;
use crate::record::DocumentState;
use crate::remote::RemoteEndpoint;
use crate::surface::EditingSurface;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoaderState {
    #[default]
    Unresolved,
    /// A resolution is in flight.
    Resolving,
    /// A non-empty state was applied.
    Loaded,
    /// Nothing was found; the surface was cleared.
    Empty,
}

/// Tier that supplied the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StateSource {
    Cache,
    Remote,
    BundledDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(StateSource),
    Empty,
    /// A resolution for this document is already running.
    AlreadyResolving,
    /// This document was already resolved; `reset` to resolve again.
    AlreadyResolved,
    /// The loader was reset while this resolution was fetching; its result
    /// was dropped.
    Superseded,
}

impl LoadOutcome {
    pub fn source(&self) -> Option<StateSource> {
        match self {
            LoadOutcome::Loaded(source) => Some(*source),
            _ => None,
        }
    }
}

/// Fixups applied to freshly loaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    /// Inline format removed from every text span.
    pub highlight_format: String,
    /// Block style property removed from every paragraph.
    pub spacing_style: String,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            highlight_format: "highlight".to_string(),
            spacing_style: "margin-bottom".to_string(),
        }
    }
}

#[derive(Default)]
struct Status {
    id: Option<DocumentId>,
    state: LoaderState,
    /// Bumped on every new resolution and every reset.
    generation: u64,
}

pub struct InitialStateLoader<S> {
    cache: Arc<LocalCache<S>>,
    remote: Arc<dyn RemoteEndpoint>,
    surface: Arc<dyn EditingSurface>,
    default_document: Option<DocumentState>,
    normalization: Normalization,
    status: Mutex<Status>,
}

impl<S: KeyValueStore> InitialStateLoader<S> {
    pub fn new(
        cache: Arc<LocalCache<S>>,
        remote: Arc<dyn RemoteEndpoint>,
        surface: Arc<dyn EditingSurface>,
    ) -> Self {
        Self {
            cache,
            remote,
            surface,
            default_document: None,
            normalization: Normalization::default(),
            status: Mutex::new(Status::default()),
        }
    }

    /// Document used when neither the cache nor the remote has one.
    pub fn with_default_document(mut self, document: Option<DocumentState>) -> Self {
        self.default_document = document;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn state(&self) -> LoaderState {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Forget the last resolution, e.g. after the document ID changed.
    ///
    /// A resolution still in flight will discard its result.
    pub fn reset(&self) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.id = None;
        status.state = LoaderState::Unresolved;
        status.generation += 1;
        debug!("Loader reset");
    }

    /// Resolve the initial state for `id` and apply it to the surface.
    pub async fn resolve(&self, id: &DocumentId) -> LoadOutcome {
        let generation = {
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if status.id.as_ref() == Some(id) {
                match status.state {
                    LoaderState::Resolving => return LoadOutcome::AlreadyResolving,
                    LoaderState::Loaded | LoaderState::Empty => {
                        return LoadOutcome::AlreadyResolved;
                    }
                    LoaderState::Unresolved => {}
                }
            }
            status.id = Some(id.clone());
            status.state = LoaderState::Resolving;
            status.generation += 1;
            status.generation
        };

        if let Some(state) = self.cache.load(id) {
            if self.apply(&state, StateSource::Cache) {
                return self.finish(generation, LoadOutcome::Loaded(StateSource::Cache));
            }
        }

        let fetched = self.remote.load().await;
        if !self.is_current(generation) {
            info!("Discarding remote result for {}: loader was reset", id);
            return LoadOutcome::Superseded;
        }
        match fetched {
            Ok(Some(state)) => {
                if self.apply(&state, StateSource::Remote) {
                    return self.finish(generation, LoadOutcome::Loaded(StateSource::Remote));
                }
            }
            Ok(None) => debug!("Remote has no document for {}", id),
            Err(e) => warn!("Failed to load {} from remote: {}", id, e),
        }

        if let Some(document) = &self.default_document {
            if self.apply(document, StateSource::BundledDefault) {
                return self.finish(
                    generation,
                    LoadOutcome::Loaded(StateSource::BundledDefault),
                );
            }
        }

        info!("No stored state for {}, starting empty", id);
        self.surface.clear();
        self.finish(generation, LoadOutcome::Empty)
    }

    /// Apply `state` to the surface and normalize it. False if rejected.
    fn apply(&self, state: &DocumentState, source: StateSource) -> bool {
        if let Err(e) = self.surface.set_state(state) {
            warn!("Surface rejected {:?} state: {}", source, e);
            return false;
        }
        self.normalize();
        info!("Loaded initial state from {:?}", source);
        true
    }

    fn normalize(&self) {
        let Normalization {
            highlight_format,
            spacing_style,
        } = &self.normalization;

        for span in 0..self.surface.text_span_count() {
            if self.surface.span_has_format(span, highlight_format) {
                self.surface.toggle_span_format(span, highlight_format);
            }
        }
        let reduced = self.surface.reduce_block_style(spacing_style);
        if reduced > 0 {
            debug!("Removed {} from {} paragraphs", spacing_style, reduced);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .generation
            == generation
    }

    fn finish(&self, generation: u64, outcome: LoadOutcome) -> LoadOutcome {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status.generation != generation {
            return LoadOutcome::Superseded;
        }
        status.state = match outcome {
            LoadOutcome::Empty => LoaderState::Empty,
            _ => LoaderState::Loaded,
        };
        outcome
    }
}
