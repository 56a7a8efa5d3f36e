pub mod location;
pub mod practitioner;
pub mod service;
pub mod types;

pub use location::*;
pub use practitioner::*;
pub use service::*;
pub use types::*;
