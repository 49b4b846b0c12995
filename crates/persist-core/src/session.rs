//! EditorSession: wires the persistence pieces to one editing surface.
//!
//! Lifecycle:
//! 1. `start` purges the local cache, schedules the daily purge, resolves the
//!    document ID and opens that document.
//! 2. Opening a document loads the initial state, then saves every later
//!    surface mutation to the local cache and starts the remote sync task.
//!    A load overtaken by another open leaves no wiring behind.
//! 3. `on_navigation` reopens when the address now names another document.
//! 4. `shutdown` (or drop) stops both background tasks.

use crate::cache::LocalCache;
use crate::clock::Clock;
use crate::config::PersistConfig;
use crate::document_id::DocumentId;
use crate::events::{EventBus, PersistEvent, Subscription};
use crate::key_resolver::KeyResolver;
use crate::kv::KeyValueStore;
use crate::loader::{InitialStateLoader, LoadOutcome, LoaderState, StateSource};
use crate::location::LocationStore;
use crate::record::DocumentState;
use crate::remote::RemoteEndpoint;
use crate::remote_sync::RemoteSync;
use crate::surface::EditingSurface;
use crate::task::PeriodicTask;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Per-document wiring, torn down as a unit when the document changes.
///
/// Installed without wiring while the load is in flight.
struct OpenDocument {
    id: DocumentId,
    generation: u64,
    _mutations: Option<Subscription<DocumentState>>,
    _sync: Option<PeriodicTask>,
}

pub struct EditorSession<S, L> {
    config: PersistConfig,
    resolver: KeyResolver<L>,
    cache: Arc<LocalCache<S>>,
    surface: Arc<dyn EditingSurface>,
    remote: Arc<dyn RemoteEndpoint>,
    clock: Arc<dyn Clock>,
    loader: InitialStateLoader<S>,
    events: Arc<EventBus<PersistEvent>>,
    open: Mutex<Option<OpenDocument>>,
    generation: AtomicU64,
    purge_task: Mutex<Option<PeriodicTask>>,
}

impl<S, L> EditorSession<S, L>
where
    S: KeyValueStore + 'static,
    L: LocationStore,
{
    /// Use `Arc::new(SystemClock)` outside of tests.
    pub fn new(
        config: PersistConfig,
        store: S,
        location: L,
        surface: Arc<dyn EditingSurface>,
        remote: Arc<dyn RemoteEndpoint>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(
            LocalCache::new(store)
                .with_clock(Arc::clone(&clock))
                .with_prefix(config.storage_prefix.clone())
                .with_retention(config.retention()),
        );
        let resolver = KeyResolver::new(location)
            .with_param(config.key_param.clone())
            .with_id_length(config.id_length);
        let loader = InitialStateLoader::new(
            Arc::clone(&cache),
            Arc::clone(&remote),
            Arc::clone(&surface),
        )
        .with_default_document(config.default_document.clone())
        .with_normalization(config.normalization());

        Self {
            config,
            resolver,
            cache,
            surface,
            remote,
            clock,
            loader,
            events: Arc::new(EventBus::new()),
            open: Mutex::new(None),
            generation: AtomicU64::new(0),
            purge_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<LocalCache<S>> {
        &self.cache
    }

    /// Monitoring events for load, sync and cleanup.
    pub fn events(&self) -> &Arc<EventBus<PersistEvent>> {
        &self.events
    }

    pub fn loader_state(&self) -> LoaderState {
        self.loader.state()
    }

    /// The document currently open, if any.
    pub fn document_id(&self) -> Option<DocumentId> {
        self.open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|open| open.id.clone())
    }

    /// Clean the cache, resolve the document ID and open that document.
    ///
    /// Must be called within a tokio runtime.
    pub async fn start(&self) -> LoadOutcome {
        purge_cache(&self.cache, &self.events, self.clock.as_ref());

        let task = {
            let cache = Arc::clone(&self.cache);
            let events = Arc::clone(&self.events);
            let clock = Arc::clone(&self.clock);
            PeriodicTask::spawn("cache-purge", self.config.purge_interval(), move || {
                let cache = Arc::clone(&cache);
                let events = Arc::clone(&events);
                let clock = Arc::clone(&clock);
                async move {
                    purge_cache(&cache, &events, clock.as_ref());
                }
            })
        };
        *self.purge_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        let id = self.resolver.resolve();
        self.open_document(id).await
    }

    /// Handle a back/forward navigation.
    ///
    /// Returns the load outcome when the address named a different document.
    pub async fn on_navigation(&self) -> Option<LoadOutcome> {
        let id = self.resolver.on_navigation()?;
        self.loader.reset();
        Some(self.open_document(id).await)
    }

    /// Stop syncing and cleanup, and stop saving mutations.
    pub fn shutdown(&self) {
        self.close_document();
        if let Some(mut task) = self
            .purge_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.stop();
        }
        info!("Editor session shut down");
    }

    async fn open_document(&self, id: DocumentId) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self
            .open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(OpenDocument {
                id: id.clone(),
                generation,
                _mutations: None,
                _sync: None,
            });
        if let Some(open) = previous {
            debug!("Closing document {}", open.id);
        }

        let outcome = self.loader.resolve(&id).await;
        if outcome == LoadOutcome::Superseded || !self.is_current(generation) {
            debug!("Load of {} was superseded", id);
            return LoadOutcome::Superseded;
        }

        match outcome {
            LoadOutcome::Loaded(StateSource::Cache | StateSource::Remote) => {
                self.cache.save(&id, &self.surface.get_state());
            }
            // Fallback content is only cached once the user edits it
            LoadOutcome::Loaded(StateSource::BundledDefault) | LoadOutcome::Empty => {}
            other => debug!("Load of {} returned {:?}", id, other),
        }
        if matches!(outcome, LoadOutcome::Loaded(_) | LoadOutcome::Empty) {
            self.events.emit(PersistEvent::StateLoaded {
                document_id: id.to_string(),
                source: outcome.source(),
                timestamp: self.clock.now_ms(),
            });
        }

        let mutations = {
            let cache = Arc::clone(&self.cache);
            let id = id.clone();
            self.surface.subscribe(Box::new(move |state: DocumentState| {
                cache.save(&id, &state);
            }))
        };
        let sync = Arc::new(
            RemoteSync::new(
                id.clone(),
                Arc::clone(&self.cache),
                Arc::clone(&self.surface),
                Arc::clone(&self.remote),
            )
            .with_clock(Arc::clone(&self.clock))
            .with_events(Arc::clone(&self.events)),
        )
        .spawn(self.config.sync_interval());

        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        match open.as_mut() {
            Some(current) if current.generation == generation => {
                current._mutations = Some(mutations);
                current._sync = Some(sync);
                info!("Opened document {}", id);
                outcome
            }
            _ => LoadOutcome::Superseded,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|open| open.generation == generation)
    }

    fn close_document(&self) {
        let previous = self.open.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(open) = previous {
            debug!("Closing document {}", open.id);
        }
    }
}

fn purge_cache<S: KeyValueStore>(
    cache: &LocalCache<S>,
    events: &EventBus<PersistEvent>,
    clock: &dyn Clock,
) {
    let report = cache.purge_expired();
    if report.removed() > 0 {
        info!(
            "Purged {} expired and {} corrupt cache entries",
            report.expired, report.corrupt
        );
    }
    events.emit(PersistEvent::CachePurged {
        report,
        timestamp: clock.now_ms(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryKv;
    use crate::location::InMemoryLocation;
    use crate::record::StorageRecord;
    use crate::remote::{InMemoryRemote, RemoteError};
    use crate::remote_sync::{SkipReason, SyncOutcome};
    use crate::surface::{JsonSurface, document_from_paragraphs};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    const NOW: u64 = 1_700_000_000_000;
    const DAY_MS: u64 = 24 * 3600 * 1000;

    struct Fixture {
        store: Arc<InMemoryKv>,
        location: Arc<InMemoryLocation>,
        surface: Arc<JsonSurface>,
        remote: Arc<InMemoryRemote>,
        clock: Arc<ManualClock>,
    }

    type TestSession = EditorSession<Arc<InMemoryKv>, Arc<InMemoryLocation>>;

    impl Fixture {
        fn at(href: &str) -> Self {
            Self {
                store: Arc::new(InMemoryKv::new()),
                location: Arc::new(InMemoryLocation::new(href).unwrap()),
                surface: Arc::new(JsonSurface::new()),
                remote: Arc::new(InMemoryRemote::new()),
                clock: Arc::new(ManualClock::new(NOW)),
            }
        }

        fn session(&self) -> TestSession {
            let config = PersistConfig {
                default_document: None,
                ..PersistConfig::default()
            };
            self.session_with(config)
        }

        fn session_with(&self, config: PersistConfig) -> TestSession {
            self.session_on(config, self.remote.clone())
        }

        fn session_on(&self, config: PersistConfig, remote: Arc<dyn RemoteEndpoint>) -> TestSession {
            EditorSession::new(
                config,
                Arc::clone(&self.store),
                Arc::clone(&self.location),
                self.surface.clone(),
                remote,
                self.clock.clone(),
            )
        }

        fn seed_cache(&self, id: &str, text: &str, timestamp: u64) {
            let json =
                StorageRecord::encode(&document_from_paragraphs([text]), timestamp).unwrap();
            self.store.set(&format!("editor-{id}"), &json).unwrap();
        }

        fn collect_events(session: &TestSession) -> (Arc<Mutex<Vec<PersistEvent>>>, Subscription<PersistEvent>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = Arc::clone(&seen);
            let sub = session
                .events()
                .subscribe(move |event: PersistEvent| seen_clone.lock().unwrap().push(event));
            (seen, sub)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_load_end_to_end() {
        let fx = Fixture::at("http://localhost/");
        let session = fx.session();

        assert_eq!(session.start().await, LoadOutcome::Empty);

        // Address now carries a generated ID
        let id = session.document_id().unwrap();
        assert_eq!(fx.location.query_param("key").as_deref(), Some(id.as_str()));
        assert_eq!(id.as_str().len(), 13);

        // Typing lands in the local cache immediately
        fx.surface.append_paragraph("hello");
        let cached = session.cache().load(&id).unwrap();
        assert_eq!(cached, fx.surface.get_state());

        // And reaches the remote on the next sync tick
        tokio::time::sleep(Duration::from_secs(31)).await;
        let pushed = fx.remote.last_record().unwrap();
        assert_eq!(pushed.state, fx.surface.get_state());

        session.shutdown();
    }

    #[tokio::test]
    async fn test_start_loads_from_cache_and_reports() {
        let fx = Fixture::at("http://localhost/?key=abc");
        fx.seed_cache("abc", "cached text", NOW - DAY_MS);
        let session = fx.session();
        let (seen, _sub) = Fixture::collect_events(&session);

        let outcome = session.start().await;

        assert_eq!(outcome, LoadOutcome::Loaded(StateSource::Cache));
        assert_eq!(fx.surface.plain_text(), "cached text");
        assert_eq!(session.loader_state(), LoaderState::Loaded);
        assert_eq!(fx.location.push_count(), 0);
        assert!(seen.lock().unwrap().contains(&PersistEvent::StateLoaded {
            document_id: "abc".into(),
            source: Some(StateSource::Cache),
            timestamp: NOW,
        }));
    }

    #[tokio::test]
    async fn test_start_purges_expired_entries() {
        let fx = Fixture::at("http://localhost/?key=abc");
        fx.seed_cache("old", "stale", NOW - 8 * DAY_MS);
        fx.seed_cache("recent", "fresh", NOW - DAY_MS);
        fx.store.set("other-app", "untouched").unwrap();
        let session = fx.session();
        let (seen, _sub) = Fixture::collect_events(&session);

        session.start().await;

        assert!(!fx.store.contains_key("editor-old"));
        assert!(fx.store.contains_key("editor-recent"));
        assert!(fx.store.contains_key("other-app"));
        let purged = seen.lock().unwrap().iter().find_map(|event| match event {
            PersistEvent::CachePurged { report, .. } => Some(*report),
            _ => None,
        });
        assert_eq!(purged.map(|r| r.expired), Some(1));
    }

    #[tokio::test]
    async fn test_loaded_remote_state_is_cached() {
        let fx = Fixture::at("http://localhost/?key=abc");
        fx.remote
            .save(&StorageRecord::new(document_from_paragraphs(["remote"]), NOW))
            .await
            .unwrap();
        let session = fx.session();

        assert_eq!(
            session.start().await,
            LoadOutcome::Loaded(StateSource::Remote)
        );
        let id: DocumentId = "abc".parse().unwrap();
        assert_eq!(session.cache().load(&id), Some(fx.surface.get_state()));
    }

    #[tokio::test]
    async fn test_bundled_default_on_first_visit() {
        let fx = Fixture::at("http://localhost/");
        let session = fx.session_with(PersistConfig::default());

        assert_eq!(
            session.start().await,
            LoadOutcome::Loaded(StateSource::BundledDefault)
        );
        assert!(fx.surface.plain_text().starts_with("Welcome!"));
    }

    #[tokio::test]
    async fn test_navigation_switches_document() {
        let fx = Fixture::at("http://localhost/?key=first");
        fx.seed_cache("first", "one", NOW);
        fx.seed_cache("second", "two", NOW);
        let session = fx.session();
        session.start().await;

        // Same address: nothing to do
        assert_eq!(session.on_navigation().await, None);

        fx.location.navigate("http://localhost/?key=second").unwrap();
        assert_eq!(
            session.on_navigation().await,
            Some(LoadOutcome::Loaded(StateSource::Cache))
        );
        assert_eq!(fx.surface.plain_text(), "two");
        assert_eq!(session.document_id().unwrap().as_str(), "second");

        // Edits now go to the second document only
        fx.surface.append_paragraph("more");
        let first: DocumentId = "first".parse().unwrap();
        let second: DocumentId = "second".parse().unwrap();
        assert_eq!(
            session.cache().load(&first),
            Some(document_from_paragraphs(["one"]))
        );
        assert_eq!(session.cache().load(&second), Some(fx.surface.get_state()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_saving_and_syncing() {
        let fx = Fixture::at("http://localhost/?key=abc");
        let session = fx.session();
        session.start().await;
        session.shutdown();

        fx.surface.append_paragraph("after shutdown");
        let id: DocumentId = "abc".parse().unwrap();
        assert_ne!(session.cache().load(&id), Some(fx.surface.get_state()));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.remote.save_count(), 0);
        assert_eq!(session.document_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_purge_runs_while_open() {
        let fx = Fixture::at("http://localhost/?key=abc");
        fx.seed_cache("old", "ageing", NOW);
        let config = PersistConfig {
            default_document: None,
            sync_interval_secs: 10 * 24 * 3600,
            ..PersistConfig::default()
        };
        let session = fx.session_with(config);
        let (seen, _sub) = Fixture::collect_events(&session);

        session.start().await;
        assert!(fx.store.contains_key("editor-old"));

        fx.clock.advance(Duration::from_millis(8 * DAY_MS));
        tokio::time::sleep(session.config().purge_interval() + Duration::from_secs(1)).await;

        assert!(!fx.store.contains_key("editor-old"));
        let purges: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                PersistEvent::CachePurged { report, .. } => Some(report.expired),
                _ => None,
            })
            .collect();
        assert_eq!(purges, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_document_is_not_pushed_over_remote() {
        let fx = Fixture::at("http://localhost/");
        let precious = StorageRecord::new(document_from_paragraphs(["precious remote work"]), NOW);
        let remote = Arc::new(InMemoryRemote::with_record(precious.clone()));
        remote.set_failing(true);
        let session = fx.session_on(PersistConfig::default(), remote.clone());
        let (seen, _sub) = Fixture::collect_events(&session);

        assert_eq!(
            session.start().await,
            LoadOutcome::Loaded(StateSource::BundledDefault)
        );
        let id = session.document_id().unwrap();
        assert_eq!(session.cache().load(&id), None);

        // Network comes back, but nothing the user wrote is pending
        remote.set_failing(false);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(remote.last_record(), Some(precious));
        assert!(seen.lock().unwrap().contains(&PersistEvent::SyncCompleted {
            document_id: id.to_string(),
            outcome: SyncOutcome::Skipped(SkipReason::NotCached),
            timestamp: NOW,
        }));

        // A real edit is saved and pushed
        fx.surface.append_paragraph("my edit");
        assert_eq!(session.cache().load(&id), Some(fx.surface.get_state()));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(remote.last_record().unwrap().state, fx.surface.get_state());

        session.shutdown();
    }

    #[tokio::test]
    async fn test_empty_start_caches_nothing_until_edited() {
        let fx = Fixture::at("http://localhost/?key=abc");
        let session = fx.session();

        assert_eq!(session.start().await, LoadOutcome::Empty);
        let id: DocumentId = "abc".parse().unwrap();
        assert_eq!(session.cache().record(&id), None);

        fx.surface.append_paragraph("typed");
        assert_eq!(session.cache().load(&id), Some(fx.surface.get_state()));
    }

    /// Remote whose `load` waits until released.
    struct GatedRemote {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteEndpoint for GatedRemote {
        async fn load(&self) -> Result<Option<DocumentState>, RemoteError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Some(document_from_paragraphs(["late first"])))
        }

        async fn save(&self, _record: &StorageRecord) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_navigation_during_initial_fetch() {
        let fx = Fixture::at("http://localhost/?key=first");
        fx.seed_cache("second", "two", NOW);
        let remote = Arc::new(GatedRemote {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let config = PersistConfig {
            default_document: None,
            ..PersistConfig::default()
        };
        let session = fx.session_on(config, remote.clone());

        let (started, navigated) = tokio::join!(session.start(), async {
            remote.entered.notified().await;
            fx.location.navigate("http://localhost/?key=second").unwrap();
            let outcome = session.on_navigation().await;
            remote.release.notify_one();
            outcome
        });

        assert_eq!(started, LoadOutcome::Superseded);
        assert_eq!(navigated, Some(LoadOutcome::Loaded(StateSource::Cache)));
        assert_eq!(session.document_id().unwrap().as_str(), "second");
        assert_eq!(fx.surface.plain_text(), "two");

        // Only the second document is wired up
        fx.surface.append_paragraph("more");
        let first: DocumentId = "first".parse().unwrap();
        let second: DocumentId = "second".parse().unwrap();
        assert_eq!(session.cache().record(&first), None);
        assert_eq!(session.cache().load(&second), Some(fx.surface.get_state()));

        session.shutdown();
    }
}
