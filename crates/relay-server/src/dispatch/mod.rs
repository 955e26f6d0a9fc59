//! Event dispatch table.

pub mod handlers;
pub mod registry;

pub use handlers::register_all;
pub use registry::{EventHandler, EventRegistry};
