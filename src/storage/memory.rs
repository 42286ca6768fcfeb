use super::{EventKind, StorageClient, StorageEvent};
use crate::route::Route;
use crate::service::Service;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// A `StorageClient` backed by an in-process map, for embedding and for
/// tests that need to drive the dynamic-reload path without standing up
/// etcd.
pub struct InMemoryStorage {
    routes: Mutex<HashMap<String, Route>>,
    services: Mutex<HashMap<String, Service>>,
    changes: broadcast::Sender<StorageEvent>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(64);
        Self {
            routes: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn with_routes(routes: Vec<Route>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.routes.lock().unwrap();
            for route in routes {
                guard.insert(route.id.clone(), route);
            }
        }
        store
    }

    pub fn put_route(&self, route: Route) {
        self.routes.lock().unwrap().insert(route.id.clone(), route);
        let _ = self.changes.send(StorageEvent {
            kind: EventKind::RouteChanged,
        });
    }

    pub fn remove_route(&self, id: &str) {
        self.routes.lock().unwrap().remove(id);
        let _ = self.changes.send(StorageEvent {
            kind: EventKind::RouteChanged,
        });
    }

    pub fn put_service(&self, service: Service) {
        self.services
            .lock()
            .unwrap()
            .insert(service.id.clone(), service);
        let _ = self.changes.send(StorageEvent {
            kind: EventKind::ServiceChanged,
        });
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn list_routes(&self) -> anyhow::Result<Vec<Route>> {
        Ok(self.routes.lock().unwrap().values().cloned().collect())
    }

    async fn list_services(&self) -> anyhow::Result<Vec<Service>> {
        Ok(self.services.lock().unwrap().values().cloned().collect())
    }

    async fn write_route(&self, route: Route) -> anyhow::Result<()> {
        self.put_route(route);
        Ok(())
    }

    async fn delete_route(&self, id: &str) -> anyhow::Result<()> {
        self.remove_route(id);
        Ok(())
    }

    async fn watch(&self) -> anyhow::Result<BoxStream<'static, StorageEvent>> {
        let rx = self.changes.subscribe();
        // Lagged receivers resubscribe rather than end the stream — a slow
        // watcher should see "something changed, rebuild" on the next tick,
        // not silently stop being notified.
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::collections::HashMap as Map;

    fn route(id: &str) -> Route {
        Route {
            id: id.into(),
            priority: 0,
            host: String::new(),
            path_prefix: None,
            path_regex: None,
            headers: Map::new(),
            service_id: "svc".into(),
            middlewares: None,
            rewrite_rules: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn list_routes_reflects_puts_and_removes() {
        let storage = InMemoryStorage::new();
        storage.put_route(route("r1"));
        assert_eq!(storage.list_routes().await.unwrap().len(), 1);
        storage.remove_route("r1");
        assert_eq!(storage.list_routes().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn watch_emits_on_mutation() {
        let storage = InMemoryStorage::new();
        let mut stream = storage.watch().await.unwrap();
        storage.put_route(route("r1"));
        let event = stream.next().await.expect("expected an event");
        assert_eq!(event.kind, EventKind::RouteChanged);
    }
}
