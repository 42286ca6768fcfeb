use crate::config::ReloadConfig;
use crate::route::Route;
use crate::routing::table::RouteTable;
use crate::storage::StorageClient;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Initializing,
    Ready,
    Reloading,
    Terminating,
}

/// Owns the published `RouteTable` snapshot and the background task that
/// keeps it current by watching a `StorageClient`. Readers go through
/// `ReloadController::matcher()` / `snapshot()`, which return a cheap `Arc`
/// clone regardless of whether a rebuild happens to be in flight — matching
/// never blocks on reload.
///
/// Rebuilds are coalesced: a watch event sets a pending flag; a single
/// background loop drains that flag, waits out the settling delay, and
/// rebuilds once, no matter how many events arrived while it was busy. A
/// `running` flag prevents two rebuilds from overlapping.
pub struct ReloadController {
    storage: Arc<dyn StorageClient>,
    table: Arc<ArcSwap<RouteTable>>,
    pending: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: Arc<std::sync::Mutex<ReloadState>>,
    /// Bumped after every rebuild attempt (success or failure) so
    /// `force_reload` can wait for "a rebuild has happened" without racing a
    /// plain flag — write-through calls must not return before the new
    /// snapshot, or at least a rebuild attempt reflecting the write, is
    /// visible.
    generation: watch::Sender<u64>,
    watch_task: Option<JoinHandle<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReloadController {
    /// Subscribe to `storage`'s watch stream, settle, then build the initial
    /// snapshot and spawn the background rebuild loop. Returns once the
    /// first snapshot is ready — callers never observe an empty table except
    /// when the initial listing itself fails (`Initializing` only exists
    /// inside this call).
    ///
    /// The watch subscription is registered *before* the initial list, and
    /// `reload_cfg`'s settling delay is spent waiting right after — a route
    /// written in the gap between subscribing and settling sets `pending`
    /// and is picked up by the rebuild loop instead of being silently lost
    /// until some later unrelated event forces a re-list.
    pub async fn start(storage: Arc<dyn StorageClient>, reload_cfg: ReloadConfig) -> anyhow::Result<Self> {
        let state = Arc::new(std::sync::Mutex::new(ReloadState::Initializing));
        let pending = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let (generation_tx, _generation_rx) = watch::channel(0u64);
        let settling_delay = reload_cfg.settling_delay();

        let mut events = storage.watch().await?;
        let watch_task = {
            let pending = pending.clone();
            let wake = wake.clone();
            tokio::spawn(async move {
                use futures_util::StreamExt;
                while events.next().await.is_some() {
                    pending.store(true, Ordering::SeqCst);
                    wake.notify_one();
                }
            })
        };

        tokio::time::sleep(settling_delay).await;

        let initial = match Self::build_table(storage.as_ref()).await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "initial route listing failed, starting with an empty snapshot");
                RouteTable::default()
            }
        };
        let table = Arc::new(ArcSwap::from_pointee(initial));
        *state.lock().unwrap() = ReloadState::Ready;

        let task = {
            let table = table.clone();
            let pending = pending.clone();
            let running = running.clone();
            let wake = wake.clone();
            let state = state.clone();
            let generation_tx = generation_tx.clone();
            let storage = storage.clone();
            tokio::spawn(async move {
                loop {
                    wake.notified().await;
                    if !pending.swap(false, Ordering::SeqCst) {
                        continue;
                    }

                    tokio::time::sleep(settling_delay).await;
                    // Drain anything that arrived during the settling delay
                    // into this same rebuild instead of scheduling another.
                    pending.store(false, Ordering::SeqCst);

                    if running.swap(true, Ordering::SeqCst) {
                        // Another rebuild is already in flight; its result
                        // will reflect this event too since it hasn't
                        // published yet. Re-mark pending so we don't lose
                        // an event that lands in the gap.
                        pending.store(true, Ordering::SeqCst);
                        continue;
                    }

                    *state.lock().unwrap() = ReloadState::Reloading;
                    let started = std::time::Instant::now();
                    match Self::build_table(storage.as_ref()).await {
                        Ok(new_table) => {
                            table.store(Arc::new(new_table));
                            metrics::counter!("discobox_reloads_total").increment(1);
                            metrics::histogram!("discobox_reload_duration_seconds")
                                .record(started.elapsed().as_secs_f64());
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "reload failed, keeping previous snapshot");
                        }
                    }
                    *state.lock().unwrap() = ReloadState::Ready;
                    running.store(false, Ordering::SeqCst);
                    generation_tx.send_modify(|g| *g += 1);
                }
            })
        };

        Ok(Self {
            storage,
            table,
            pending,
            running,
            wake,
            state,
            generation: generation_tx,
            watch_task: Some(watch_task),
            task: Some(task),
        })
    }

    async fn build_table(storage: &dyn StorageClient) -> anyhow::Result<RouteTable> {
        let routes = storage.list_routes().await?;
        let services = storage.list_services().await?;
        let table = RouteTable::build(routes, services);
        metrics::gauge!("discobox_routes_total").set(table.route_count() as f64);
        Ok(table)
    }

    pub fn snapshot(&self) -> Arc<ArcSwap<RouteTable>> {
        self.table.clone()
    }

    pub fn matcher(&self) -> crate::routing::Matcher {
        crate::routing::Matcher::new(self.table.clone())
    }

    pub fn state(&self) -> ReloadState {
        *self.state.lock().unwrap()
    }

    /// Stop the background watch/rebuild task and cancel the storage
    /// subscription. In-flight matches keep working against the last
    /// published snapshot; this only stops future rebuilds from happening
    /// (`Terminating`).
    pub async fn close(mut self) {
        *self.state.lock().unwrap() = ReloadState::Terminating;
        if let Some(task) = self.watch_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Force a rebuild without waiting for a watch event — used by tests
    /// and by callers that want a synchronous "reload now" operation.
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Trigger a rebuild and wait for one to have happened before returning.
    /// Used by the write-through methods below so a call never returns until
    /// the new snapshot is visible to `match_request` — a rebuild attempt
    /// always follows the write, so by the time this resolves the write is
    /// reflected (or, if the rebuild itself failed, the failure was logged
    /// and the old snapshot remains).
    async fn force_reload(&self) {
        let mut rx = self.generation.subscribe();
        let baseline = *rx.borrow();
        // A rebuild already in flight may have started listing storage
        // before our write landed, so the bump it produces might not
        // reflect it — wait for the rebuild after that one instead.
        let needed = if self.running.load(Ordering::SeqCst) {
            baseline + 2
        } else {
            baseline + 1
        };
        self.trigger();
        while *rx.borrow() < needed {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Write-through create/update. Upserts `route` in storage, then blocks
    /// until the resulting rebuild has published.
    pub async fn add_route(&self, route: Route) -> anyhow::Result<()> {
        self.storage.write_route(route).await?;
        self.force_reload().await;
        Ok(())
    }

    /// Alias for `add_route` — the storage contract treats create and update
    /// as the same upsert keyed by `route.id`, so both are write-throughs
    /// followed by a forced reload.
    pub async fn update_route(&self, route: Route) -> anyhow::Result<()> {
        self.add_route(route).await
    }

    /// Write-through delete. Removes `id` from storage, then blocks until
    /// the resulting rebuild has published.
    pub async fn remove_route(&self, id: &str) -> anyhow::Result<()> {
        self.storage.delete_route(id).await?;
        self.force_reload().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use crate::storage::memory::InMemoryStorage;
    use std::collections::HashMap;
    use tokio::time::{sleep, Duration as TokioDuration};

    fn route(id: &str) -> Route {
        Route {
            id: id.into(),
            priority: 0,
            host: String::new(),
            path_prefix: None,
            path_regex: None,
            headers: HashMap::new(),
            service_id: "svc".into(),
            middlewares: None,
            rewrite_rules: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn starts_ready_with_initial_snapshot() {
        let storage = Arc::new(InMemoryStorage::with_routes(vec![route("r1")]));
        let controller = ReloadController::start(storage, ReloadConfig::default()).await.unwrap();
        assert_eq!(controller.state(), ReloadState::Ready);
        assert_eq!(controller.snapshot().load().route_count(), 1);
        controller.close().await;
    }

    #[tokio::test]
    async fn rebuilds_after_storage_change() {
        let storage = Arc::new(InMemoryStorage::new());
        let controller = ReloadController::start(storage.clone(), ReloadConfig::default()).await.unwrap();
        assert_eq!(controller.snapshot().load().route_count(), 0);

        storage.put_route(route("r1"));
        sleep(TokioDuration::from_millis(100)).await;

        assert_eq!(controller.snapshot().load().route_count(), 1);
        controller.close().await;
    }

    #[tokio::test]
    async fn coalesces_rapid_successive_changes_into_one_rebuild() {
        let storage = Arc::new(InMemoryStorage::new());
        let controller = ReloadController::start(storage.clone(), ReloadConfig::default()).await.unwrap();

        for i in 0..5 {
            storage.put_route(route(&format!("r{i}")));
        }
        sleep(TokioDuration::from_millis(100)).await;

        assert_eq!(controller.snapshot().load().route_count(), 5);
        controller.close().await;
    }

    #[tokio::test]
    async fn add_route_blocks_until_visible() {
        let storage = Arc::new(InMemoryStorage::new());
        let controller = ReloadController::start(storage, ReloadConfig::default()).await.unwrap();

        controller.add_route(route("r1")).await.unwrap();
        // No sleep: add_route's await already waited for the rebuild.
        assert_eq!(controller.snapshot().load().route_count(), 1);

        controller.close().await;
    }

    #[tokio::test]
    async fn remove_route_blocks_until_visible() {
        let storage = Arc::new(InMemoryStorage::with_routes(vec![route("r1")]));
        let controller = ReloadController::start(storage, ReloadConfig::default()).await.unwrap();
        assert_eq!(controller.snapshot().load().route_count(), 1);

        controller.remove_route("r1").await.unwrap();
        assert_eq!(controller.snapshot().load().route_count(), 0);

        controller.close().await;
    }

    #[tokio::test]
    async fn update_route_upserts_by_id() {
        let storage = Arc::new(InMemoryStorage::new());
        let controller = ReloadController::start(storage, ReloadConfig::default()).await.unwrap();

        let mut r = route("r1");
        r.path_prefix = Some("/v1".into());
        controller.add_route(r.clone()).await.unwrap();

        r.path_prefix = Some("/v2".into());
        controller.update_route(r).await.unwrap();

        let table = controller.snapshot().load_full();
        assert_eq!(table.route_count(), 1);
        assert_eq!(table.get(0).route.path_prefix.as_deref(), Some("/v2"));

        controller.close().await;
    }
}
