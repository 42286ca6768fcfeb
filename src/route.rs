use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Deserialize a `T` that implements `Default` — treats JSON `null` the same as
/// a missing field (returns `T::default()`).
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_priority() -> i64 {
    0
}

/// A routable request class: host + path + header predicates bound to a
/// downstream service. This is the persisted/wire shape — opaque fields
/// the matcher never inspects (`middlewares`, `rewrite_rules`, `metadata`)
/// are round-tripped verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,

    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Raw host predicate as stored: empty (any host), a literal
    /// (`api.example.com`), a wildcard (`*.example.com`), or a template
    /// (`{sub:[a-z]+}.example.com`). Parsed into `HostPattern` at build time.
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub path_prefix: Option<String>,

    #[serde(default)]
    pub path_regex: Option<String>,

    /// name -> predicate. A leading `~` denotes a regex predicate; anything
    /// else is a case-sensitive literal.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub headers: HashMap<String, String>,

    pub service_id: String,

    /// Opaque passthrough — downstream middleware configuration the matcher
    /// never interprets.
    #[serde(default)]
    pub middlewares: Option<serde_json::Value>,

    /// Opaque passthrough — path rewriting is explicitly a downstream
    /// concern this router does not implement.
    #[serde(default)]
    pub rewrite_rules: Option<serde_json::Value>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Parsed form of `Route::host`, classifying how it participates in the
/// host index.
#[derive(Debug, Clone, PartialEq)]
pub enum HostPattern {
    /// Empty `host` field — matches any request host.
    Any,
    /// A literal hostname, lowercased.
    Exact(String),
    /// `*.example.com` — stored as the suffix including the leading dot
    /// (`.example.com`).
    Wildcard { suffix: String },
    /// `{sub:[a-z]+}.example.com` — a templated host. `literal_suffix` is the
    /// portion of the pattern after the last template segment (used to key
    /// the wildcard bucket when non-empty); `regex_source` is the derived
    /// anchored regex the compiled cache holds and re-verifies at match time.
    Templated {
        literal_suffix: Option<String>,
        regex_source: String,
    },
}

impl HostPattern {
    /// Parse `Route::host` into its structural form. Never fails — a
    /// templated host whose derived regex does not compile is still parsed
    /// here; compilation is attempted later by the compiled cache, and a
    /// failure there excludes the route from the snapshot.
    pub fn parse(host: &str) -> Self {
        if host.is_empty() {
            return HostPattern::Any;
        }
        if let Some(suffix) = host.strip_prefix("*.") {
            return HostPattern::Wildcard {
                suffix: format!(".{suffix}"),
            };
        }
        if host.contains('{') {
            let (regex_source, literal_suffix) = template_to_regex(host);
            return HostPattern::Templated {
                literal_suffix,
                regex_source,
            };
        }
        HostPattern::Exact(host.to_ascii_lowercase())
    }
}

/// Translate a templated host pattern like `{sub:[a-z]+}.example.com` into an
/// anchored regex (`^[a-z]+\.example\.com$`) plus the literal suffix after
/// the last template segment (`.example.com`), used to key the wildcard
/// bucket when non-empty. Literal segments are regex-escaped; only the
/// `{name:pattern}` placeholders contribute raw regex.
fn template_to_regex(host: &str) -> (String, Option<String>) {
    let mut regex = String::from("^");
    let mut last_literal = String::new();
    let bytes = host.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = host[i..].find('}') {
                let seg = &host[i + 1..i + end];
                let pattern = match seg.split_once(':') {
                    Some((_, pat)) => pat,
                    None => ".*",
                };
                regex.push_str(pattern);
                last_literal.clear();
                i += end + 1;
                continue;
            }
        }
        let ch = host[i..].chars().next().unwrap();
        regex.push_str(&regex::escape(&ch.to_string()));
        last_literal.push(ch);
        i += ch.len_utf8();
    }
    regex.push('$');
    let literal_suffix = if last_literal.is_empty() {
        None
    } else {
        Some(last_literal)
    };
    (regex, literal_suffix)
}

/// A single header predicate, parsed from `Route::headers` values. The `~`
/// sigil denoting a regex predicate is stripped here; the pattern itself is
/// compiled later by the compiled cache.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderPredicate {
    Literal(String),
    Regex(String),
}

impl HeaderPredicate {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('~') {
            Some(pattern) => HeaderPredicate::Regex(pattern.to_string()),
            None => HeaderPredicate::Literal(raw.to_string()),
        }
    }
}
