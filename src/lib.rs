pub mod config;
pub mod error;
pub mod metrics;
pub mod reload;
pub mod request;
pub mod route;
pub mod routing;
pub mod runtime;
pub mod service;
pub mod storage;

pub use error::RouterError;
pub use reload::ReloadController;
pub use request::Request;
pub use route::Route;
pub use routing::{Captures, MatchOutcome, Matcher, RouteTable};
pub use service::Service;
