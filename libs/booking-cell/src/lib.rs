pub mod transactor;
pub mod types;

pub use transactor::*;
pub use types::*;
