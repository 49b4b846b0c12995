//! persist-core: Persistence and synchronization layer for a browser document editor.
//!
//! The editing surface itself (node model, selection, formatting) belongs to an
//! external rich-text framework. This crate keeps its document durable:
//! - Deriving a stable document ID from the page address
//! - Versioned, expiring local cache over a key-value store
//! - Periodic best-effort push to a remote document endpoint
//! - Resolving the initial document state (cache → remote → default → empty)
//!
//! Every ambient global (address bar, browser storage, clock) is an injected
//! trait so the whole layer runs against in-memory fakes in tests.

pub mod cache;
pub mod clock;
pub mod config;
pub mod document_id;
pub mod events;
pub mod key_resolver;
pub mod kv;
pub mod loader;
pub mod location;
pub mod record;
pub mod remote;
pub mod remote_sync;
pub mod session;
pub mod surface;
pub mod task;

pub use cache::{LocalCache, PurgeReport, SaveOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PersistConfig;
pub use document_id::{DocumentId, DocumentIdError};
pub use events::{EventBus, PersistEvent, Subscription};
pub use key_resolver::KeyResolver;
pub use kv::{InMemoryKv, KeyValueStore, KvError};
pub use loader::{InitialStateLoader, LoadOutcome, LoaderState, Normalization, StateSource};
pub use location::{InMemoryLocation, LocationStore};
pub use record::{DocumentState, RecordError, StorageRecord, STORAGE_VERSION};
pub use remote::{InMemoryRemote, RemoteEndpoint, RemoteError};
pub use remote_sync::{RemoteSync, SkipReason, SyncOutcome};
pub use session::EditorSession;
pub use surface::{EditingSurface, JsonSurface, SurfaceError};
pub use task::PeriodicTask;

#[cfg(feature = "http")]
pub use remote::http::HttpRemote;
