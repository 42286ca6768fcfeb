use crate::route::{HeaderPredicate, HostPattern, Route};
use regex::Regex;
use std::collections::HashMap;

/// The subset of a route's predicates that require a compiled `Regex` to
/// evaluate: a templated host, a `pathRegex`, and any `~`-prefixed header
/// predicate. Compiled once per rebuild and held alongside the route rather
/// than recompiled per request.
#[derive(Debug, Clone, Default)]
pub struct CompiledPredicates {
    pub host_regex: Option<Regex>,
    pub path_regex: Option<Regex>,
    pub header_regex: HashMap<String, Regex>,
}

/// Compiles every regex-bearing predicate on `route`. Returns `Err` naming
/// the first pattern that failed to compile — a route with any uncompilable
/// predicate is excluded from the snapshot entirely rather than partially
/// matched.
pub fn compile(route: &Route, host_pattern: &HostPattern) -> Result<CompiledPredicates, String> {
    let mut compiled = CompiledPredicates::default();

    if let HostPattern::Templated { regex_source, .. } = host_pattern {
        compiled.host_regex = Some(
            Regex::new(regex_source)
                .map_err(|e| format!("host regex `{regex_source}`: {e}"))?,
        );
    }

    if let Some(pattern) = &route.path_regex {
        compiled.path_regex = Some(
            Regex::new(pattern).map_err(|e| format!("path regex `{pattern}`: {e}"))?,
        );
    }

    for (name, raw) in &route.headers {
        if let HeaderPredicate::Regex(pattern) = HeaderPredicate::parse(raw) {
            let re = Regex::new(&pattern)
                .map_err(|e| format!("header regex `{name}: {pattern}`: {e}"))?;
            compiled.header_regex.insert(name.clone(), re);
        }
    }

    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn route(overrides: impl FnOnce(&mut Route)) -> Route {
        let mut r = Route {
            id: "r1".into(),
            priority: 0,
            host: String::new(),
            path_prefix: None,
            path_regex: None,
            headers: HashMap::new(),
            service_id: "svc".into(),
            middlewares: None,
            rewrite_rules: None,
            metadata: None,
        };
        overrides(&mut r);
        r
    }

    #[test]
    fn compiles_valid_path_regex() {
        let r = route(|r| r.path_regex = Some("^/v[0-9]+/.*$".into()));
        let compiled = compile(&r, &HostPattern::Any).unwrap();
        assert!(compiled.path_regex.unwrap().is_match("/v1/widgets"));
    }

    #[test]
    fn rejects_invalid_path_regex() {
        let r = route(|r| r.path_regex = Some("(unclosed".into()));
        assert!(compile(&r, &HostPattern::Any).is_err());
    }

    #[test]
    fn rejects_invalid_header_regex() {
        let r = route(|r| {
            r.headers.insert("x-version".into(), "~(unclosed".into());
        });
        assert!(compile(&r, &HostPattern::Any).is_err());
    }

    #[test]
    fn compiles_templated_host_regex() {
        let pattern = HostPattern::parse("{sub:[a-z]+}.example.com");
        let r = route(|_| {});
        let compiled = compile(&r, &pattern).unwrap();
        assert!(compiled.host_regex.unwrap().is_match("acme.example.com"));
    }
}
