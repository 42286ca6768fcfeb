pub mod compiled;
pub mod host_index;
pub mod matcher;
pub mod table;

pub use matcher::{Captures, MatchOutcome, Matcher};
pub use table::{CompiledRoute, RouteTable};
