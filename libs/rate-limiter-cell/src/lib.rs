pub mod limiter;

pub use limiter::*;
