//! Generic resource dispatch: verb and path shape to CRUD or a named handler.

pub mod context;
pub mod registry;
pub mod route;
pub mod router;

pub use context::RequestContext;
pub use registry::{HandlerTable, RegisteredView, ResourceView};
pub use route::{route, Dispatch, Segment};
pub use router::resource_routes;
