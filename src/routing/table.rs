use crate::route::{HostPattern, Route};
use crate::routing::compiled::{self, CompiledPredicates};
use crate::routing::host_index::HostIndex;
use crate::service::Service;

/// A route plus everything derived from it at build time: its parsed host
/// pattern and its compiled regex predicates. What the matcher actually
/// scans — `Route` itself is never touched again after a table is built.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub route: Route,
    pub host_pattern: HostPattern,
    pub compiled: CompiledPredicates,
}

impl CompiledRoute {
    /// Advisory specificity score — documents roughly why a route would
    /// rank above another of equal priority, but is never consulted by the
    /// matcher. Ordering is decided solely by `(priority, id)`.
    pub fn specificity_score(&self) -> i64 {
        let mut score = self.route.priority * 1000;
        score += match &self.host_pattern {
            HostPattern::Exact(_) => 100,
            HostPattern::Wildcard { .. } | HostPattern::Templated { .. } => 50,
            HostPattern::Any => 0,
        };
        if self.route.path_regex.is_some() {
            score += 30;
        } else if let Some(prefix) = &self.route.path_prefix {
            score += 20 + prefix.len() as i64;
        }
        score += 10 * self.route.headers.len() as i64;
        score
    }
}

/// An immutable, fully-resolved snapshot of the routing configuration:
/// routes sorted into final match-priority order, the host index built
/// over that order, and every predicate's regex pre-compiled. Published
/// behind an `ArcSwap` by the reload controller — readers hold a cheap
/// `Arc` clone for the duration of a single match and never see a
/// partially-rebuilt table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    host_index: HostIndex,
    services: Vec<Service>,
}

impl RouteTable {
    /// Build a snapshot from raw routes and services. Routes are sorted by
    /// the authoritative ordering contract — descending `priority`, then
    /// ascending `id` as the tiebreak — via a stable sort, so routes that
    /// are equal under the contract keep their input relative order.
    ///
    /// A route whose host-template, path-regex, or any `~` header pattern
    /// fails to compile is dropped from the snapshot and logged; it does
    /// not abort the build.
    pub fn build(mut routes: Vec<Route>, services: Vec<Service>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let mut compiled_routes = Vec::with_capacity(routes.len());
        let mut host_index = HostIndex::new();

        for route in routes {
            let host_pattern = HostPattern::parse(&route.host);
            match compiled::compile(&route, &host_pattern) {
                Ok(compiled) => {
                    let slot = compiled_routes.len();
                    host_index.insert(slot, &host_pattern);
                    compiled_routes.push(CompiledRoute {
                        route,
                        host_pattern,
                        compiled,
                    });
                }
                Err(reason) => {
                    tracing::error!(route_id = %route.id, %reason, "excluding route: predicate failed to compile");
                }
            }
        }

        Self {
            routes: compiled_routes,
            host_index,
            services,
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn get(&self, slot: usize) -> &CompiledRoute {
        &self.routes[slot]
    }

    pub fn candidates(&self, host: &str) -> Vec<usize> {
        self.host_index.candidates(host)
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// A copy of the published route list, in the same order the matcher
    /// scans it (`-priority, +id`).
    pub fn routes(&self) -> Vec<Route> {
        self.routes.iter().map(|cr| cr.route.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn route(id: &str, priority: i64, host: &str) -> Route {
        Route {
            id: id.into(),
            priority,
            host: host.into(),
            path_prefix: None,
            path_regex: None,
            headers: HashMap::new(),
            service_id: "svc".into(),
            middlewares: None,
            rewrite_rules: None,
            metadata: None,
        }
    }

    #[test]
    fn sorts_by_priority_desc_then_id_asc() {
        let table = RouteTable::build(
            vec![
                route("b", 0, ""),
                route("a", 0, ""),
                route("high", 5, ""),
            ],
            vec![],
        );
        let ids: Vec<&str> = (0..table.route_count())
            .map(|i| table.get(i).route.id.as_str())
            .collect();
        assert_eq!(ids, vec!["high", "a", "b"]);
    }

    #[test]
    fn excludes_route_with_bad_regex() {
        let mut bad = route("bad", 0, "");
        bad.path_regex = Some("(unclosed".into());
        let table = RouteTable::build(vec![bad, route("good", 0, "")], vec![]);
        assert_eq!(table.route_count(), 1);
        assert_eq!(table.get(0).route.id, "good");
    }
}
