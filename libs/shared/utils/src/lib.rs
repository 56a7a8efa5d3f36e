pub mod fingerprint;
pub mod masking;
pub mod normalize;
pub mod phone;
pub mod voice_time;

pub use fingerprint::*;
pub use masking::*;
pub use normalize::*;
pub use phone::*;
pub use voice_time::*;
