pub mod error;
pub mod query;
pub mod types;

pub use types::EVENT_OCCURRENCE_CATEGORY;
pub use types::SEGMENT_ALL;
