use crate::request::Request;
use crate::route::{HeaderPredicate, HostPattern};
use crate::routing::table::RouteTable;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Named regex capture groups collected from whichever predicates matched —
/// the templated host, `pathRegex`, and any `~` header pattern. Unnamed
/// groups are not surfaced; only `(?P<name>...)` groups contribute.
pub type Captures = HashMap<String, String>;

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        route_id: String,
        service_id: String,
        captures: Captures,
    },
    NotFound,
}

impl MatchOutcome {
    /// Convenience conversion for callers that prefer a `Result` — a fresh
    /// `NotFound` becomes `RouterError::NoRouteMatch` rather than being
    /// threaded through as a third enum variant everywhere.
    pub fn into_result(self) -> Result<(String, String, Captures), crate::error::RouterError> {
        match self {
            MatchOutcome::Matched {
                route_id,
                service_id,
                captures,
            } => Ok((route_id, service_id, captures)),
            MatchOutcome::NotFound => Err(crate::error::RouterError::NoRouteMatch),
        }
    }
}

/// Strip an optional `:port` suffix and lowercase, so `API.example.com:8080`
/// and `api.example.com` key the same bucket.
fn normalize_host(host: &str) -> String {
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    host.to_ascii_lowercase()
}

fn merge_captures(into: &mut Captures, re: &regex::Regex, subject: &str) -> bool {
    match re.captures(subject) {
        Some(caps) => {
            for name in re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    into.insert(name.to_string(), m.as_str().to_string());
                }
            }
            true
        }
        None => false,
    }
}

/// Evaluates a single request against a route table. Read-only and
/// stateless beyond the snapshot it holds — cloning a `Matcher` is cheap
/// and every clone observes reloads published through the same `ArcSwap`.
#[derive(Clone)]
pub struct Matcher {
    table: Arc<ArcSwap<RouteTable>>,
}

impl Matcher {
    pub fn new(table: Arc<ArcSwap<RouteTable>>) -> Self {
        Self { table }
    }

    /// A copy of the currently published route list, in match order.
    pub fn routes(&self) -> Vec<crate::route::Route> {
        self.table.load().routes()
    }

    /// Four-step evaluation: normalize the host, gather host-bucket
    /// candidates in scan order, test each candidate's path and header
    /// predicates in turn, and return on the first full match. Candidates
    /// are already in final priority order within and across the scanned
    /// buckets, so the first match found is the authoritative one.
    pub fn match_request(&self, request: &Request) -> MatchOutcome {
        let table = self.table.load();
        let host = normalize_host(&request.host);

        for slot in table.candidates(&host) {
            let compiled_route = table.get(slot);
            let mut captures = Captures::new();

            if let HostPattern::Templated { .. } = &compiled_route.host_pattern {
                let Some(re) = &compiled_route.compiled.host_regex else {
                    continue;
                };
                if !merge_captures(&mut captures, re, &host) {
                    continue;
                }
            }

            if !Self::path_matches(compiled_route, &request.path, &mut captures) {
                continue;
            }

            if !Self::headers_match(compiled_route, &request.headers, &mut captures) {
                continue;
            }

            return MatchOutcome::Matched {
                route_id: compiled_route.route.id.clone(),
                service_id: compiled_route.route.service_id.clone(),
                captures,
            };
        }

        MatchOutcome::NotFound
    }

    /// `pathPrefix` and `pathRegex` are independent predicates — when both are
    /// set on a route, both must succeed. Prefix is checked first since it's
    /// the cheaper test.
    fn path_matches(
        compiled_route: &crate::routing::table::CompiledRoute,
        path: &str,
        captures: &mut Captures,
    ) -> bool {
        if let Some(prefix) = &compiled_route.route.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(re) = &compiled_route.compiled.path_regex {
            return merge_captures(captures, re, path);
        }
        true
    }

    fn headers_match(
        compiled_route: &crate::routing::table::CompiledRoute,
        headers: &http::HeaderMap,
        captures: &mut Captures,
    ) -> bool {
        for (name, raw) in &compiled_route.route.headers {
            let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) else {
                return false;
            };
            match HeaderPredicate::parse(raw) {
                HeaderPredicate::Literal(expected) => {
                    if value != expected {
                        return false;
                    }
                }
                HeaderPredicate::Regex(_) => {
                    let Some(re) = compiled_route.compiled.header_regex.get(name) else {
                        return false;
                    };
                    if !merge_captures(captures, re, value) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use crate::routing::table::RouteTable;
    use std::collections::HashMap as Map;

    fn table_with(routes: Vec<Route>) -> Arc<ArcSwap<RouteTable>> {
        Arc::new(ArcSwap::from_pointee(RouteTable::build(routes, vec![])))
    }

    fn base_route(id: &str) -> Route {
        Route {
            id: id.into(),
            priority: 0,
            host: String::new(),
            path_prefix: None,
            path_regex: None,
            headers: Map::new(),
            service_id: format!("{id}-svc"),
            middlewares: None,
            rewrite_rules: None,
            metadata: None,
        }
    }

    #[test]
    fn matches_host_and_prefix() {
        let mut r = base_route("r1");
        r.host = "api.example.com".into();
        r.path_prefix = Some("/v1".into());
        let matcher = Matcher::new(table_with(vec![r]));

        let outcome = matcher.match_request(&Request::new("api.example.com", "/v1/widgets"));
        match outcome {
            MatchOutcome::Matched { route_id, .. } => assert_eq!(route_id, "r1"),
            MatchOutcome::NotFound => panic!("expected match"),
        }
    }

    #[test]
    fn wildcard_host_matches_subdomain() {
        let mut r = base_route("r1");
        r.host = "*.example.com".into();
        let matcher = Matcher::new(table_with(vec![r]));
        let outcome = matcher.match_request(&Request::new("shop.example.com", "/"));
        assert!(matches!(outcome, MatchOutcome::Matched { .. }));
    }

    #[test]
    fn path_regex_exposes_named_captures() {
        let mut r = base_route("r1");
        r.path_regex = Some("^/users/(?P<user_id>[0-9]+)$".into());
        let matcher = Matcher::new(table_with(vec![r]));
        match matcher.match_request(&Request::new("any.example.com", "/users/42")) {
            MatchOutcome::Matched { captures, .. } => {
                assert_eq!(captures.get("user_id"), Some(&"42".to_string()));
            }
            MatchOutcome::NotFound => panic!("expected match"),
        }
    }

    #[test]
    fn header_predicate_must_match() {
        let mut r = base_route("r1");
        r.headers.insert("x-beta".into(), "true".into());
        let matcher = Matcher::new(table_with(vec![r]));

        let no_header = Request::new("any.example.com", "/");
        assert!(matches!(
            matcher.match_request(&no_header),
            MatchOutcome::NotFound
        ));

        let with_header = Request::new("any.example.com", "/").header("x-beta", "true");
        assert!(matches!(
            matcher.match_request(&with_header),
            MatchOutcome::Matched { .. }
        ));
    }

    #[test]
    fn higher_priority_route_wins_same_host() {
        let mut low = base_route("low");
        low.host = "api.example.com".into();
        let mut high = base_route("high");
        high.host = "api.example.com".into();
        high.priority = 10;

        let matcher = Matcher::new(table_with(vec![low, high]));
        match matcher.match_request(&Request::new("api.example.com", "/")) {
            MatchOutcome::Matched { route_id, .. } => assert_eq!(route_id, "high"),
            MatchOutcome::NotFound => panic!("expected match"),
        }
    }

    #[test]
    fn prefix_and_regex_both_required() {
        let mut r = base_route("r1");
        r.path_prefix = Some("/api".into());
        r.path_regex = Some("^/api/v[0-9]+/.*$".into());
        let matcher = Matcher::new(table_with(vec![r]));

        let legacy = Request::new("any.example.com", "/api/legacy/widgets");
        assert!(matches!(
            matcher.match_request(&legacy),
            MatchOutcome::NotFound
        ));

        let versioned = Request::new("any.example.com", "/api/v2/widgets");
        assert!(matches!(
            matcher.match_request(&versioned),
            MatchOutcome::Matched { .. }
        ));
    }

    #[test]
    fn routes_returns_published_list_in_match_order() {
        let mut low = base_route("b");
        low.priority = 0;
        let mut high = base_route("a");
        high.priority = 5;
        let matcher = Matcher::new(table_with(vec![low, high]));
        let ids: Vec<String> = matcher.routes().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn no_candidate_matches_returns_not_found() {
        let mut r = base_route("r1");
        r.host = "api.example.com".into();
        let matcher = Matcher::new(table_with(vec![r]));
        let outcome = matcher.match_request(&Request::new("other.example.com", "/"));
        assert!(matches!(outcome, MatchOutcome::NotFound));
    }
}
