//! Patch sync client
//!
//! Owns the upstream sources, merges their patch streams into the store,
//! tracks connection status, and keeps the persisted snapshot fresh. The
//! store stays an explicitly owned `Arc` handed to consumers; nothing here
//! is global.
//!
//! Lifecycle: construct with [`PatchSyncClient::init`] (restores the
//! persisted snapshot), then [`start`](PatchSyncClient::start) the
//! subscription. A transport failure moves the client to `Disconnected` and
//! stays there; reconnection is an explicit caller decision via a fresh
//! `start()`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::source::{Source, SourceStream};
use crate::patch::Revision;
use crate::path::TreePath;
use crate::store::{Bootstrapper, SnapshotStore, StoreWatcher};

/// Default coalescing window for persistence and status notifications
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Connection lifecycle of the sync subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No confirmed patch delivery yet
    Initializing,
    /// A merged patch batch has been applied
    Connected,
    /// The upstream stream terminated with an error
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Events emitted by the sync client
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection status changed (already deduplicated)
    StatusChanged(ConnectionStatus),
    /// A batch was applied; the store is at this revision
    CacheUpdated(Revision),
    /// The subscription failed
    Error(String),
}

/// Client-side sync engine over one or more patch sources
pub struct PatchSyncClient {
    sources: Vec<Arc<dyn Source>>,
    store: Arc<SnapshotStore>,
    bootstrapper: Arc<Bootstrapper>,
    debounce: Duration,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    sync_task: Option<SyncTask>,
}

struct SyncTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PatchSyncClient {
    /// Create a client, restoring the persisted snapshot into a fresh store
    pub fn init(sources: Vec<Arc<dyn Source>>, bootstrapper: Bootstrapper) -> Self {
        let snapshot = bootstrapper.init();
        info!(revision = snapshot.revision, "local cache initialized");
        let store = Arc::new(SnapshotStore::from_snapshot(snapshot));

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Initializing);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            sources,
            store,
            bootstrapper: Arc::new(bootstrapper),
            debounce: DEFAULT_DEBOUNCE,
            status_tx,
            status_rx,
            event_tx,
            event_rx: Some(event_rx),
            sync_task: None,
        }
    }

    /// Override the debounce window (default 500 ms)
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Handle to the shared store
    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to connection status changes
    ///
    /// The receiver holds the current status and observes every transition;
    /// consecutive duplicates are never emitted.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Synchronous read of the subtree at `path`
    pub fn read(&self, path: &TreePath) -> Option<Value> {
        self.store.read(path)
    }

    /// Watch the subtree at `path`, with delivery logging for diagnostics
    pub fn watch(&self, path: TreePath) -> SyncWatcher {
        let label = format!("watch-{}", &Uuid::new_v4().to_string()[..8]);
        debug!(sub = %label, path = %path, "watch opened");
        SyncWatcher {
            inner: self.store.watch(path),
            label,
        }
    }

    /// Start the sync subscription
    ///
    /// Idempotent: always stops the previous subscription first, so at most
    /// one is active. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        // make sure everything is stopped before subscribing
        self.stop();

        let merged = stream::select_all(self.sources.iter().map(|s| s.subscribe()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = SyncContext {
            store: self.store.clone(),
            bootstrapper: self.bootstrapper.clone(),
            status: self.status_tx.clone(),
            events: self.event_tx.clone(),
            debounce: self.debounce,
        };
        let handle = tokio::spawn(sync_loop(ctx, merged, shutdown_rx));

        self.sync_task = Some(SyncTask {
            shutdown: shutdown_tx,
            handle,
        });
        info!(sources = self.sources.len(), "sync subscription started");
    }

    /// Stop the active subscription, if any
    ///
    /// Cooperative: an in-flight batch finishes applying; no further batches
    /// are accepted. Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if let Some(SyncTask { shutdown, handle }) = self.sync_task.take() {
            let _ = shutdown.send(true);
            drop(handle);
            info!("sync subscription stopped");
        }
    }
}

impl Drop for PatchSyncClient {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A store watcher that logs deliveries and teardown
pub struct SyncWatcher {
    inner: StoreWatcher,
    label: String,
}

impl SyncWatcher {
    /// The path this subscription is scoped to
    pub fn path(&self) -> &TreePath {
        self.inner.path()
    }

    /// The most recently delivered value, without waiting
    pub fn current(&self) -> Value {
        self.inner.current()
    }

    /// Wait for the next value (current value first, like the store)
    pub async fn next(&mut self) -> Option<Value> {
        let value = self.inner.next().await;
        match &value {
            Some(_) => debug!(sub = %self.label, path = %self.inner.path(), "watch delivered"),
            None => debug!(sub = %self.label, path = %self.inner.path(), "watch source gone"),
        }
        value
    }
}

impl Drop for SyncWatcher {
    fn drop(&mut self) {
        debug!(sub = %self.label, path = %self.inner.path(), "watch closed");
    }
}

struct SyncContext {
    store: Arc<SnapshotStore>,
    bootstrapper: Arc<Bootstrapper>,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::UnboundedSender<SyncEvent>,
    debounce: Duration,
}

impl SyncContext {
    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(%status, "connection status changed");
            self.emit(SyncEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    /// Confirm the burst: flip to Connected and persist the merged state
    fn flush(&self) {
        self.set_status(ConnectionStatus::Connected);
        let snapshot = self.store.snapshot();
        if let Err(e) = self.bootstrapper.update(&snapshot) {
            // persistence is best-effort; the in-memory store stays authoritative
            warn!("failed to persist snapshot: {e:#}");
        }
    }
}

async fn sync_loop(
    ctx: SyncContext,
    mut updates: stream::SelectAll<SourceStream>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending_flush: Option<tokio::time::Instant> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let flush_at = pending_flush.unwrap_or_else(tokio::time::Instant::now);

        tokio::select! {
            _ = shutdown.changed() => {
                debug!("sync loop shutting down");
                break;
            }
            _ = tokio::time::sleep_until(flush_at), if pending_flush.is_some() => {
                pending_flush = None;
                ctx.flush();
            }
            update = updates.next() => match update {
                Some(Ok(batch)) => match ctx.store.apply(batch) {
                    Ok(revision) => {
                        pending_flush = Some(tokio::time::Instant::now() + ctx.debounce);
                        ctx.emit(SyncEvent::CacheUpdated(revision));
                    }
                    // rejected patches are logged, never retried, and do not
                    // touch connection status
                    Err(e) => warn!("patch rejected: {e}"),
                },
                Some(Err(e)) => {
                    warn!("patch source failed: {e}");
                    ctx.set_status(ConnectionStatus::Disconnected);
                    ctx.emit(SyncEvent::Error(e.to_string()));
                    // no automatic resubscribe; callers restart explicitly
                    break;
                }
                None => {
                    // abnormal but not an error: keep whatever was pending,
                    // leave connection status alone
                    warn!("patch stream completed");
                    if pending_flush.take().is_some() {
                        ctx.flush();
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{PatchBatch, PatchOp};
    use crate::store::Snapshot;
    use crate::sync::source::SourceError;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Clone)]
    enum Script {
        Batch(PatchBatch),
        Pause(Duration),
        Fail(String),
    }

    /// Source that replays a fixed script, then either stays open or completes
    struct ScriptedSource {
        script: Vec<Script>,
        hold_open: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script,
                hold_open: true,
            }
        }

        fn completing(script: Vec<Script>) -> Self {
            Self {
                script,
                hold_open: false,
            }
        }
    }

    impl Source for ScriptedSource {
        fn subscribe(&self) -> SourceStream {
            let items: VecDeque<Script> = self.script.clone().into();
            let hold_open = self.hold_open;
            Box::pin(stream::unfold(items, move |mut items| async move {
                loop {
                    match items.pop_front() {
                        Some(Script::Batch(batch)) => return Some((Ok(batch), items)),
                        Some(Script::Fail(msg)) => {
                            return Some((Err(SourceError::Transport(msg)), items))
                        }
                        Some(Script::Pause(d)) => tokio::time::sleep(d).await,
                        None => {
                            if hold_open {
                                futures_util::future::pending::<()>().await;
                            }
                            return None;
                        }
                    }
                }
            }))
        }
    }

    /// Source that tracks how many of its subscriptions are alive
    struct CountedSource {
        active: Arc<AtomicUsize>,
    }

    impl Source for CountedSource {
        fn subscribe(&self) -> SourceStream {
            struct Guard(Arc<AtomicUsize>);
            impl Drop for Guard {
                fn drop(&mut self) {
                    self.0.fetch_sub(1, Ordering::SeqCst);
                }
            }

            self.active.fetch_add(1, Ordering::SeqCst);
            let guard = Guard(self.active.clone());
            let pending = stream::pending::<Result<PatchBatch, SourceError>>();
            Box::pin(pending.map(move |item| {
                let _guard = &guard;
                item
            }))
        }
    }

    fn rename_ui(base: Revision, name: &str) -> Script {
        Script::Batch(PatchBatch::Patch {
            base,
            ops: vec![PatchOp::Add {
                path: "/ui".parse().unwrap(),
                value: json!({ "name": name }),
            }],
        })
    }

    fn client_with(
        temp_dir: &TempDir,
        source: ScriptedSource,
    ) -> PatchSyncClient {
        let bootstrapper = Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor"));
        PatchSyncClient::init(vec![Arc::new(source)], bootstrapper)
            .with_debounce(Duration::from_millis(500))
    }

    async fn wait_for_status(
        rx: &mut watch::Receiver<ConnectionStatus>,
        wanted: ConnectionStatus,
    ) {
        while *rx.borrow() != wanted {
            rx.changed().await.expect("status channel closed");
        }
    }

    #[test]
    fn test_init_restores_persisted_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.cbor");

        Bootstrapper::with_path(path.clone())
            .update(&Snapshot::at(9, json!({ "ui": { "name": "persisted" } })))
            .unwrap();

        let client = PatchSyncClient::init(
            Vec::new(),
            Bootstrapper::with_path(path),
        );

        assert_eq!(client.status(), ConnectionStatus::Initializing);
        assert_eq!(client.store().revision(), 9);
        assert_eq!(
            client.read(&"/ui/name".parse().unwrap()),
            Some(json!("persisted"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_apply_then_connect_and_persist() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(
            &temp_dir,
            ScriptedSource::new(vec![rename_ui(0, "first"), rename_ui(1, "second")]),
        );

        let mut status_rx = client.subscribe_status();
        client.start();
        wait_for_status(&mut status_rx, ConnectionStatus::Connected).await;

        assert_eq!(client.store().revision(), 2);
        assert_eq!(
            client.read(&"/ui/name".parse().unwrap()),
            Some(json!("second"))
        );

        // one flush for the burst, reflecting the final merged state
        let persisted = Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor")).init();
        assert_eq!(persisted.revision, 2);
        assert_eq!(
            persisted.data.pointer("/ui/name"),
            Some(&json!("second"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_disconnects_without_retry() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(
            &temp_dir,
            ScriptedSource::new(vec![
                rename_ui(0, "brief"),
                Script::Fail("socket reset".to_string()),
            ]),
        );

        let mut status_rx = client.subscribe_status();
        client.start();
        wait_for_status(&mut status_rx, ConnectionStatus::Disconnected).await;

        // the batch before the failure still landed
        assert_eq!(client.store().revision(), 1);

        // pending debounced flush was dropped with the stream
        assert!(!Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor")).exists());

        // no self-healing: still disconnected after plenty of virtual time
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_transitions_are_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(
            &temp_dir,
            ScriptedSource::new(vec![
                rename_ui(0, "a"),
                rename_ui(1, "b"),
                Script::Pause(Duration::from_secs(2)),
                rename_ui(2, "c"),
                Script::Pause(Duration::from_secs(2)),
                Script::Fail("gone".to_string()),
            ]),
        );

        assert_eq!(client.status(), ConnectionStatus::Initializing);
        let mut events = client.take_events().unwrap();
        let mut status_rx = client.subscribe_status();
        client.start();
        wait_for_status(&mut status_rx, ConnectionStatus::Disconnected).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::StatusChanged(status) = event {
                seen.push(status);
            }
        }
        // two quiet windows both flush Connected, but only the first emits
        assert_eq!(
            seen,
            vec![ConnectionStatus::Connected, ConnectionStatus::Disconnected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_patches_are_skipped_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(
            &temp_dir,
            ScriptedSource::new(vec![
                rename_ui(0, "one"),
                rename_ui(0, "duplicate"),
                rename_ui(1, "two"),
            ]),
        );

        let mut status_rx = client.subscribe_status();
        client.start();
        wait_for_status(&mut status_rx, ConnectionStatus::Connected).await;

        assert_eq!(client.store().revision(), 2);
        assert_eq!(
            client.read(&"/ui/name".parse().unwrap()),
            Some(json!("two"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_completion_flushes_but_keeps_status_policy() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(
            &temp_dir,
            ScriptedSource::completing(vec![rename_ui(0, "final")]),
        );

        let mut status_rx = client.subscribe_status();
        client.start();
        wait_for_status(&mut status_rx, ConnectionStatus::Connected).await;

        // completion is not an error: no Disconnected transition
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.status(), ConnectionStatus::Connected);

        let persisted = Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor")).init();
        assert_eq!(persisted.revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let bootstrapper = Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor"));
        let mut client = PatchSyncClient::init(
            vec![Arc::new(CountedSource {
                active: active.clone(),
            })],
            bootstrapper,
        );

        client.start();
        client.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(active.load(Ordering::SeqCst), 1);

        client.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(&temp_dir, ScriptedSource::new(Vec::new()));
        client.stop();
        client.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_observes_synced_changes() {
        let temp_dir = TempDir::new().unwrap();
        let mut client = client_with(&temp_dir, ScriptedSource::new(vec![rename_ui(0, "live")]));

        let mut watcher = client.watch("/ui/name".parse().unwrap());
        assert_eq!(watcher.next().await, Some(Value::Null));

        client.start();
        assert_eq!(watcher.next().await, Some(json!("live")));
    }
}
