//! Common types shared by every module: values, dot-path resolution, the
//! event bus and sort orders.

mod constants;
mod event_bus;
mod path;
mod sort_order;
mod value;

pub use constants::*;
pub use event_bus::*;
pub use path::*;
pub use sort_order::*;
pub use value::*;
