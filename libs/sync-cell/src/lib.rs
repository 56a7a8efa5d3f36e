pub mod registry;
pub mod sync;

pub use registry::*;
pub use sync::*;
