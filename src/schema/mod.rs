//! Load/dump between request/response JSON and table rows.

pub mod coerce;
pub mod dump;
pub mod include;
pub mod load;
pub mod source;

pub use dump::Dumper;
pub use include::IncludeTree;
pub use load::{LoadMode, Loaded, Loader};
pub use source::{Row, RowSource};
