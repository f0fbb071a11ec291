// ── Reference multiplexer ──
//
// A `Reference` is a normalized coordinate into the store. Subscribing
// to one of its event streams attaches to a shared per-(path, kind) hub:
// the first subscriber registers exactly one backend listener, the last
// one to detach removes exactly that listener and discards the hub's
// replay memory. Count updates and the backend (de)registration for one
// key happen under the same `DashMap` entry lock, so transitions for one
// key never interleave.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use blaze_backend::{Backend, EventKind, ListenerId, SnapshotCallback};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_core::Stream;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::DriverError;
use crate::path;
use crate::replay::{Replay, ReplayStream};

type HubKey = (String, EventKind);

struct Hub {
    replay: Arc<Replay<Value>>,
    subscribers: usize,
    listener: ListenerId,
}

/// Shared subscriber table for one backend.
pub(crate) struct RefMux {
    backend: Arc<dyn Backend>,
    hubs: DashMap<HubKey, Hub>,
}

impl RefMux {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            hubs: DashMap::new(),
        }
    }

    fn attach(self: &Arc<Self>, path: &str, kind: EventKind) -> Subscription {
        let key = (path.to_owned(), kind);
        let stream = match self.hubs.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let hub = occupied.get_mut();
                hub.subscribers += 1;
                hub.replay.subscribe()
            }
            Entry::Vacant(vacant) => {
                let replay = Arc::new(Replay::new());
                // Subscribe before registering so nothing the backend
                // delivers synchronously is collapsed into the replay slot.
                let stream = replay.subscribe();
                let listener = self
                    .backend
                    .listen(path, kind, forward(Arc::clone(&replay), path, kind));
                debug!(path, %kind, %listener, "registered store listener");
                vacant.insert(Hub {
                    replay,
                    subscribers: 1,
                    listener,
                });
                stream
            }
        };
        Subscription {
            stream,
            _lease: Lease {
                mux: Arc::clone(self),
                key,
            },
        }
    }

    fn detach(&self, key: &HubKey) {
        if let Entry::Occupied(mut occupied) = self.hubs.entry(key.clone()) {
            let hub = occupied.get_mut();
            hub.subscribers = hub.subscribers.saturating_sub(1);
            if hub.subscribers == 0 {
                let listener = occupied.get().listener;
                let (path, kind) = key;
                // Still under the entry lock: a concurrent attach for this
                // key waits until the old listener is gone.
                self.backend.unlisten(path, *kind, listener);
                occupied.remove();
                debug!(path, %kind, %listener, "removed store listener");
            }
        }
    }

    /// Number of subscribers currently attached to `(path, kind)`.
    pub(crate) fn subscriber_count(&self, path: &str, kind: EventKind) -> usize {
        self.hubs
            .get(&(path.to_owned(), kind))
            .map_or(0, |hub| hub.subscribers)
    }
}

/// Listener callback feeding a hub. Absent notifications are dropped; a
/// listener error terminates only this hub's stream.
fn forward(replay: Arc<Replay<Value>>, path: &str, kind: EventKind) -> SnapshotCallback {
    let path = path.to_owned();
    Arc::new(move |notification| match notification {
        Ok(Some(snapshot)) => replay.push(snapshot.into_val()),
        Ok(None) => {}
        Err(source) => {
            warn!(path = %path, %kind, error = %source, "store listener failed");
            replay.fail(DriverError::Subscription {
                path: path.clone(),
                kind: kind.to_string(),
                source,
            });
        }
    })
}

/// Detaches its subscriber from the hub when dropped.
struct Lease {
    mux: Arc<RefMux>,
    key: HubKey,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.mux.detach(&self.key);
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// One attached subscriber of a reference event stream.
///
/// Yields the hub's latest value first (if any), then every later value.
/// Ends with one `Err` if the backend listener fails. Dropping the
/// subscription detaches it.
pub struct Subscription {
    stream: ReplayStream<Value>,
    _lease: Lease,
}

impl Stream for Subscription {
    type Item = Result<Value, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

// ── EventStream ──────────────────────────────────────────────────────

/// Cold handle to the `(path, kind)` event stream of a reference.
///
/// Handles for the same key share one hub; nothing is registered with the
/// backend until [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct EventStream {
    path: String,
    kind: EventKind,
    mux: Arc<RefMux>,
}

impl EventStream {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Attach a subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.mux.attach(&self.path, self.kind)
    }

    /// Subscribers currently attached to this stream's hub.
    pub fn subscriber_count(&self) -> usize {
        self.mux.subscriber_count(&self.path, self.kind)
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ── Reference ────────────────────────────────────────────────────────

/// A normalized coordinate into the store. Not itself a subscription.
#[derive(Clone)]
pub struct Reference {
    path: String,
    mux: Arc<RefMux>,
}

impl Reference {
    /// Normalized path; `""` is the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; `None` for the root.
    pub fn key(&self) -> Option<&str> {
        path::key(&self.path)
    }

    pub fn parent(&self) -> Option<Self> {
        path::parent(&self.path).map(|parent| Self {
            path: parent.to_owned(),
            mux: Arc::clone(&self.mux),
        })
    }

    pub fn child(&self, sub: &str) -> Self {
        Self {
            path: path::join(&self.path, sub),
            mux: Arc::clone(&self.mux),
        }
    }

    /// Event stream for `kind` at this location.
    pub fn events(&self, kind: EventKind) -> EventStream {
        EventStream {
            path: self.path.clone(),
            kind,
            mux: Arc::clone(&self.mux),
        }
    }

    /// Shorthand for `events(EventKind::Value)`.
    pub fn value(&self) -> EventStream {
        self.events(EventKind::Value)
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && Arc::ptr_eq(&self.mux, &other.mux)
    }
}

impl Eq for Reference {}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reference").field(&self.path).finish()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path)
    }
}

// ── Database ─────────────────────────────────────────────────────────

/// Entry point for store references.
#[derive(Clone)]
pub struct Database {
    mux: Arc<RefMux>,
    database_url: Url,
}

impl Database {
    pub(crate) fn new(backend: Arc<dyn Backend>, database_url: Url) -> Self {
        Self {
            mux: Arc::new(RefMux::new(backend)),
            database_url,
        }
    }

    pub fn database_url(&self) -> &Url {
        &self.database_url
    }

    pub fn root(&self) -> Reference {
        self.reference("")
    }

    pub fn reference(&self, path: &str) -> Reference {
        Reference {
            path: path::normalize(path),
            mux: Arc::clone(&self.mux),
        }
    }

    /// Resolve an absolute path or a full URL into this database.
    ///
    /// A URL must point at the configured database host.
    pub fn reference_from_root(&self, url_or_path: &str) -> Result<Reference, DriverError> {
        if url_or_path.starts_with('/') {
            return Ok(self.reference(url_or_path));
        }
        let url = Url::parse(url_or_path).map_err(|e| DriverError::Config {
            message: format!("'{url_or_path}' is neither an absolute path nor a URL: {e}"),
        })?;
        let Some(host) = url.host_str() else {
            return Err(DriverError::Config {
                message: format!("'{url_or_path}' has no host"),
            });
        };
        if Some(host) != self.database_url.host_str() {
            return Err(DriverError::Config {
                message: format!(
                    "'{url_or_path}' does not belong to database {}",
                    self.database_url
                ),
            });
        }
        Ok(self.reference(url.path()))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("database_url", &self.database_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use blaze_backend::MemoryBackend;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn database() -> (MemoryBackend, Database) {
        let memory = MemoryBackend::new();
        let url = Url::parse("https://demo.example.com").unwrap();
        (memory.clone(), Database::new(Arc::new(memory), url))
    }

    #[test]
    fn child_composition_normalizes() {
        let (_memory, db) = database();
        assert_eq!(db.reference("a").child("b"), db.reference("a/b"));
        assert_eq!(db.reference("a/").child("/b").path(), "a/b");
        assert_eq!(db.reference("/a/b/").key(), Some("b"));
        assert_eq!(db.reference("a/b").parent().unwrap().path(), "a");
        assert!(db.root().parent().is_none());
    }

    #[test]
    fn reference_from_root_checks_host() {
        let (_memory, db) = database();
        let ok = db
            .reference_from_root("https://demo.example.com/users/1")
            .unwrap();
        assert_eq!(ok.path(), "users/1");
        assert_eq!(db.reference_from_root("/users/1").unwrap(), ok);

        let err = db
            .reference_from_root("https://other.example.com/users/1")
            .unwrap_err();
        assert!(err.is_config());
        assert!(db.reference_from_root("users/1").is_err());
    }

    #[tokio::test]
    async fn shared_listener_is_ref_counted() {
        let (memory, db) = database();
        let value = db.reference("x").value();

        let first = value.subscribe();
        let second = value.subscribe();
        assert_eq!(memory.calls("listen").len(), 1);
        assert_eq!(value.subscriber_count(), 2);

        drop(first);
        assert!(memory.calls("unlisten").is_empty());
        drop(second);
        assert_eq!(memory.calls("unlisten").len(), 1);
        assert_eq!(memory.active_listeners(), 0);

        let _third = value.subscribe();
        assert_eq!(memory.calls("listen").len(), 2);
    }

    #[tokio::test]
    async fn late_subscriber_replays_latest_value() {
        let (memory, db) = database();
        memory.seed("x", json!(1));
        let value = db.reference("x").value();

        let mut first = value.subscribe();
        assert_eq!(first.next().await, Some(Ok(json!(1))));

        memory.seed("x", json!(2));
        let mut second = value.subscribe();
        assert_eq!(second.next().await, Some(Ok(json!(2))));
        assert_eq!(first.next().await, Some(Ok(json!(2))));
    }

    #[tokio::test]
    async fn teardown_discards_replay_memory() {
        let (memory, db) = database();
        memory.seed("x", json!(1));
        let value = db.reference("x").value();
        drop(value.subscribe());

        memory.seed("x", json!(2));
        let mut fresh = value.subscribe();
        assert_eq!(fresh.next().await, Some(Ok(json!(2))));
    }

    #[tokio::test]
    async fn listener_error_terminates_only_that_stream() {
        let (memory, db) = database();
        memory.seed("ok", json!(true));
        let mut bad = db.reference("bad.key").value().subscribe();
        let mut good = db.reference("ok").value().subscribe();

        let Some(Err(DriverError::Subscription { path, kind, .. })) = bad.next().await else {
            panic!("expected a subscription error");
        };
        assert_eq!((path.as_str(), kind.as_str()), ("bad.key", "value"));
        assert_eq!(bad.next().await, None);
        assert_eq!(good.next().await, Some(Ok(json!(true))));
    }

    #[tokio::test]
    async fn child_added_delivers_every_existing_child() {
        let (memory, db) = database();
        memory.seed("list", json!({"a": 1, "b": 2}));
        let mut added = db.reference("list").events(EventKind::ChildAdded).subscribe();

        assert_eq!(added.next().await, Some(Ok(json!(1))));
        assert_eq!(added.next().await, Some(Ok(json!(2))));
    }

    #[tokio::test]
    async fn child_added_burst_larger_than_any_buffer_is_delivered() {
        let (memory, db) = database();
        let children: serde_json::Map<String, Value> = (0..300)
            .map(|n| (format!("c{n:03}"), json!(n)))
            .collect();
        memory.seed("list", Value::Object(children));

        let added: Vec<_> = db
            .reference("list")
            .events(EventKind::ChildAdded)
            .subscribe()
            .take(300)
            .collect()
            .await;
        assert_eq!(added.len(), 300);
        assert!(added.iter().all(Result::is_ok));
        assert_eq!(added[299], Ok(json!(299)));
    }

    #[tokio::test]
    async fn release_and_reattach_keep_one_listener() {
        let (memory, db) = database();
        let value = db.reference("x").value();
        for _ in 0..10 {
            drop(value.subscribe());
        }
        let _live = value.subscribe();
        assert_eq!(memory.calls("listen").len(), 11);
        assert_eq!(memory.calls("unlisten").len(), 10);
        assert_eq!(memory.active_listeners(), 1);
    }
}
