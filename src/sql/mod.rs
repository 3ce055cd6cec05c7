//! Safe SQL building: identifiers from the catalog only, values as parameters.

mod builder;
pub mod filter;
pub mod params;
pub mod pipeline;

pub use builder::*;
pub use filter::{FilterBuilder, FilterQuery, SqlExpr};
pub use params::*;
pub use pipeline::{apply, FilterParams, Select, MAIN_ALIAS, MAX_LIMIT};
