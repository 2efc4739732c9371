pub mod assemble;
pub mod condition;
pub mod context;
pub mod error;
pub mod fragment;
pub mod funnel;
pub mod materialize;
pub mod ops;
pub mod provider;
pub mod segments;
pub mod steps;
pub mod value;

pub use context::Context;
pub use error::QueryError;
pub use error::Result;
