//! Task lifecycle management
//!
//! Tasks are created, started, paused, resumed, cancelled and deleted
//! through the [`TaskRegistry`], which also keeps track of live runners.

mod registry;

pub use registry::TaskRegistry;
