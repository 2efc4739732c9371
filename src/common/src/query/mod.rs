use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use chronoutil::RelativeDuration;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::types::EVENT_OCCURRENCE_CATEGORY;

pub mod funnel;

/// How a condition row's value is interpreted: `value` compares row fields
/// directly, `count` aggregates across rows first and compares the count.
/// Unknown kinds coming from newer condition editors behave as `value`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Value,
    Count,
    #[serde(other)]
    Unknown,
}

impl ValueKind {
    pub fn is_count(&self) -> bool {
        matches!(self, ValueKind::Count)
    }
}

/// One atomic filter test against a logical field.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub value_kind: ValueKind,
}

impl ConditionRow {
    pub fn is_event_occurrence(&self) -> bool {
        self.category_id == Some(EVENT_OCCURRENCE_CATEGORY)
    }

    /// The free-text field name, if a non-blank one was supplied.
    pub fn raw_field_name(&self) -> Option<&str> {
        self.field_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Rows within a group are combined with OR.
pub type ConditionGroup = Vec<ConditionRow>;

/// Groups are combined with AND. An empty tree is a no-op filter.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConditionTree(pub Vec<ConditionGroup>);

impl ConditionTree {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|group| group.is_empty())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QueryTime {
    Between {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    From(DateTime<Utc>),
    Last {
        last: i64,
        unit: TimeIntervalUnit,
    },
}

impl QueryTime {
    pub fn range(&self, cur_time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            QueryTime::Between { from, to } => (*from, *to),
            QueryTime::From(from) => (*from, cur_time),
            QueryTime::Last { last, unit } => (cur_time - unit.relative_duration(*last), cur_time),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeIntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeIntervalUnit {
    pub fn duration(&self, n: i64) -> Duration {
        match self {
            TimeIntervalUnit::Second => Duration::seconds(n),
            TimeIntervalUnit::Minute => Duration::minutes(n),
            TimeIntervalUnit::Hour => Duration::hours(n),
            TimeIntervalUnit::Day => Duration::days(n),
            TimeIntervalUnit::Week => Duration::weeks(n),
            TimeIntervalUnit::Month => Duration::days(n * 31),
            TimeIntervalUnit::Year => Duration::days(n * 31 * 12),
        }
    }

    pub fn relative_duration(&self, n: i64) -> RelativeDuration {
        match self {
            TimeIntervalUnit::Second => RelativeDuration::seconds(n),
            TimeIntervalUnit::Minute => RelativeDuration::minutes(n),
            TimeIntervalUnit::Hour => RelativeDuration::hours(n),
            TimeIntervalUnit::Day => RelativeDuration::days(n),
            TimeIntervalUnit::Week => RelativeDuration::weeks(n),
            TimeIntervalUnit::Month => RelativeDuration::months(n as i32),
            TimeIntervalUnit::Year => RelativeDuration::years(n as i32),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeIntervalUnit::Second => "second",
            TimeIntervalUnit::Minute => "minute",
            TimeIntervalUnit::Hour => "hour",
            TimeIntervalUnit::Day => "day",
            TimeIntervalUnit::Week => "week",
            TimeIntervalUnit::Month => "month",
            TimeIntervalUnit::Year => "year",
        }
    }
}
