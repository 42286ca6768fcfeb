/// The inbound request shape the matcher evaluates against a route table.
///
/// Deliberately minimal — everything the matcher needs and nothing a
/// forwarder would (body, method is intentionally absent; routes in this
/// system predicate on host/path/headers only, per the data model).
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw `Host` header or `:authority` value, port and all — stripped by
    /// the host index, not here.
    pub host: String,
    pub path: String,
    pub headers: http::HeaderMap,
}

impl Request {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            headers: http::HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}
