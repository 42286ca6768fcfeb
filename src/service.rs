use serde::{Deserialize, Serialize};

/// An opaque backend identity the matcher resolves a route to. Consumed only
/// referentially — `Route::service_id` is never validated against it by the
/// matcher itself; `listServices` exists purely so callers that want
/// referential-consistency checks (e.g. an admin surface) can get at it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
