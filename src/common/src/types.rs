pub const TABLE_EVENTS: &str = "events";

pub const COLUMN_EVENT: &str = "event_name";
pub const COLUMN_SESSION_ID: &str = "session_id";
pub const COLUMN_CREATED_AT: &str = "created_at";
pub const COLUMN_SEGMENT_KEY: &str = "segment_key";

/// Reserved segment name denoting the implicit no-filter cohort.
pub const SEGMENT_ALL: &str = "ALL";

/// Category id marking "event occurrence" condition rows, which get
/// special operator and value defaulting.
pub const EVENT_OCCURRENCE_CATEGORY: i64 = 9;

pub const MAX_FUNNEL_STEPS: usize = 5;

pub const ROUND_DIGITS: u32 = 2;
