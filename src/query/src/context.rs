use chrono::DateTime;
use chrono::Utc;

/// Per-request context. `cur_time` anchors relative time windows so that one
/// request resolves them consistently across compile and materialize.
#[derive(Clone, Debug)]
pub struct Context {
    pub cur_time: DateTime<Utc>,
}

impl Context {
    pub fn new(cur_time: DateTime<Utc>) -> Self {
        Self { cur_time }
    }
}
