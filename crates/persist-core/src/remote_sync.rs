//! RemoteSync: periodic best-effort push of the open document.
//!
//! A tick only pushes when the local cache already holds exactly what the
//! editor shows. Anything else means a local save has not landed yet (or
//! failed), and the push waits for a later tick.

use crate::cache::LocalCache;
use crate::clock::{Clock, SystemClock};
use crate::document_id::DocumentId;
use crate::events::{EventBus, PersistEvent};
use crate::kv::KeyValueStore;
use crate::record::StorageRecord;
use crate::remote::RemoteEndpoint;
use crate::surface::EditingSurface;
use crate::task::PeriodicTask;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// The cache has no record for the document.
    NotCached,
    /// The cached state differs from the editor's.
    StaleCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Pushed,
    Skipped(SkipReason),
    /// The remote call failed. The next tick retries.
    Failed,
}

pub struct RemoteSync<S> {
    id: DocumentId,
    cache: Arc<LocalCache<S>>,
    surface: Arc<dyn EditingSurface>,
    remote: Arc<dyn RemoteEndpoint>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus<PersistEvent>>>,
}

impl<S: KeyValueStore + 'static> RemoteSync<S> {
    pub fn new(
        id: DocumentId,
        cache: Arc<LocalCache<S>>,
        surface: Arc<dyn EditingSurface>,
        remote: Arc<dyn RemoteEndpoint>,
    ) -> Self {
        Self {
            id,
            cache,
            surface,
            remote,
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report every tick's outcome as `PersistEvent::SyncCompleted`.
    pub fn with_events(mut self, events: Arc<EventBus<PersistEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.id
    }

    /// Push the editor's state if the cache agrees with it.
    pub async fn tick(&self) -> SyncOutcome {
        let outcome = self.push().await;
        if let Some(events) = &self.events {
            events.emit(PersistEvent::SyncCompleted {
                document_id: self.id.to_string(),
                outcome,
                timestamp: self.clock.now_ms(),
            });
        }
        outcome
    }

    async fn push(&self) -> SyncOutcome {
        let state = self.surface.get_state();

        match self.cache.record(&self.id) {
            None => {
                warn!("Skipping sync of {}: nothing cached yet", self.id);
                return SyncOutcome::Skipped(SkipReason::NotCached);
            }
            Some(cached) if cached.state != state => {
                warn!("Skipping sync of {}: local cache is stale", self.id);
                return SyncOutcome::Skipped(SkipReason::StaleCache);
            }
            Some(_) => {}
        }

        let record = StorageRecord::new(state, self.clock.now_ms());
        match self.remote.save(&record).await {
            Ok(()) => {
                debug!("Synced {} to remote", self.id);
                SyncOutcome::Pushed
            }
            Err(e) => {
                warn!("Sync of {} failed: {}", self.id, e);
                SyncOutcome::Failed
            }
        }
    }

    /// Tick every `period` until the returned task is stopped or dropped.
    pub fn spawn(self: Arc<Self>, period: Duration) -> PeriodicTask {
        PeriodicTask::spawn("remote-sync", period, move || {
            let sync = Arc::clone(&self);
            async move {
                sync.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryKv;
    use crate::remote::InMemoryRemote;
    use crate::surface::JsonSurface;
    use std::sync::Mutex;

    const NOW: u64 = 1_700_000_000_000;

    struct Fixture {
        cache: Arc<LocalCache<InMemoryKv>>,
        surface: Arc<JsonSurface>,
        remote: Arc<InMemoryRemote>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(NOW));
            Self {
                cache: Arc::new(LocalCache::new(InMemoryKv::new()).with_clock(clock.clone())),
                surface: Arc::new(JsonSurface::new()),
                remote: Arc::new(InMemoryRemote::new()),
                clock,
            }
        }

        fn sync(&self) -> RemoteSync<InMemoryKv> {
            RemoteSync::new(
                doc_id(),
                Arc::clone(&self.cache),
                self.surface.clone(),
                self.remote.clone(),
            )
            .with_clock(self.clock.clone())
        }

        /// Make the cache agree with the surface.
        fn save_current(&self) {
            self.cache.save(&doc_id(), &self.surface.get_state());
        }
    }

    fn doc_id() -> DocumentId {
        "doc".parse().unwrap()
    }

    #[tokio::test]
    async fn test_skips_when_nothing_cached() {
        let fx = Fixture::new();
        fx.surface.append_paragraph("unsaved");

        assert_eq!(
            fx.sync().tick().await,
            SyncOutcome::Skipped(SkipReason::NotCached)
        );
        assert_eq!(fx.remote.save_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_skips_then_pushes() {
        let fx = Fixture::new();
        let sync = fx.sync();

        fx.surface.append_paragraph("first");
        fx.save_current();
        // Edit not yet saved locally
        fx.surface.append_paragraph("second");

        assert_eq!(
            sync.tick().await,
            SyncOutcome::Skipped(SkipReason::StaleCache)
        );
        assert_eq!(fx.remote.save_count(), 0);

        fx.save_current();
        fx.clock.advance(Duration::from_secs(30));
        assert_eq!(sync.tick().await, SyncOutcome::Pushed);

        let pushed = fx.remote.last_record().unwrap();
        assert_eq!(pushed.state, fx.surface.get_state());
        assert_eq!(pushed.timestamp, NOW + 30_000);
        assert!(pushed.is_current_version());
    }

    #[tokio::test]
    async fn test_failure_is_retried_next_tick() {
        let fx = Fixture::new();
        let sync = fx.sync();
        fx.surface.append_paragraph("text");
        fx.save_current();

        fx.remote.set_failing(true);
        assert_eq!(sync.tick().await, SyncOutcome::Failed);

        fx.remote.set_failing(false);
        assert_eq!(sync.tick().await, SyncOutcome::Pushed);
        assert_eq!(fx.remote.save_count(), 2);
    }

    #[tokio::test]
    async fn test_tick_reports_event() {
        let fx = Fixture::new();
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = events.subscribe(move |event: PersistEvent| seen_clone.lock().unwrap().push(event));

        let sync = fx.sync().with_events(events);
        sync.tick().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PersistEvent::SyncCompleted {
                document_id: "doc".into(),
                outcome: SyncOutcome::Skipped(SkipReason::NotCached),
                timestamp: NOW,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sync_pushes_every_period() {
        let fx = Fixture::new();
        fx.surface.append_paragraph("text");
        fx.save_current();

        let task = Arc::new(fx.sync()).spawn(DEFAULT_SYNC_INTERVAL);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fx.remote.save_count(), 0);

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(fx.remote.save_count(), 2);

        drop(task);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.remote.save_count(), 2);
    }
}
