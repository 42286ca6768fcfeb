pub mod etcd;
pub mod memory;

use crate::route::Route;
use crate::service::Service;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// What changed in the backing store, in enough detail for a reload to
/// decide whether a full rebuild is warranted. The reload controller treats
/// every variant identically — any event triggers a coalesced rebuild — but
/// keeping the kind around makes the trigger legible in logs.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RouteChanged,
    ServiceChanged,
    /// The watch connection itself needs re-establishing (lost connection,
    /// server-side compaction, etc). Still coalesces like any other event —
    /// the controller doesn't distinguish "rebuild because something
    /// changed" from "rebuild because we might have missed something".
    Resync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub kind: EventKind,
}

/// Abstraction over wherever routes and services actually live — an
/// in-memory fixture, an etcd cluster, or any other key/value store a
/// deployment might put behind it. The reload controller depends only on
/// this trait, never on a concrete backend.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn list_routes(&self) -> anyhow::Result<Vec<Route>>;
    async fn list_services(&self) -> anyhow::Result<Vec<Service>>;

    /// A stream of change notifications. The controller doesn't interpret
    /// the payload — receipt of any event is itself the rebuild trigger —
    /// so backends are free to coalesce or fan out as they see fit upstream
    /// of this call. Stream ending signals the backend gave up; the
    /// controller logs this and keeps serving the last good snapshot.
    async fn watch(&self) -> anyhow::Result<BoxStream<'static, StorageEvent>>;

    /// Write-through create/update — `addRoute` and `updateRoute` are both
    /// an upsert keyed by `route.id`. The reload controller calls this then
    /// forces a rebuild; it does not itself trigger a rebuild.
    async fn write_route(&self, route: Route) -> anyhow::Result<()>;

    /// Write-through delete.
    async fn delete_route(&self, id: &str) -> anyhow::Result<()>;
}
