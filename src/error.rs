use std::fmt;

#[derive(Debug)]
#[allow(dead_code)]
pub enum RouterError {
    NoRouteMatch,
    StorageUnavailable(String),
    WriteThrough(String),
    Http(reqwest::Error),
    Config(String),
    Internal(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::NoRouteMatch => write!(f, "no route matched"),
            RouterError::StorageUnavailable(msg) => write!(f, "storage unavailable: {}", msg),
            RouterError::WriteThrough(msg) => write!(f, "write-through failed: {}", msg),
            RouterError::Http(e) => write!(f, "http error: {}", e),
            RouterError::Config(msg) => write!(f, "config error: {}", msg),
            RouterError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}
