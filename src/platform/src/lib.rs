pub mod error;
pub mod funnel;

pub use error::PlatformError;
pub use error::Result;
