use serde::Deserialize;
use serde::Serialize;

use crate::query::ConditionTree;
use crate::query::QueryTime;
use crate::types::SEGMENT_ALL;

/// One stage of an ordered conversion sequence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    /// 1-based position within the funnel.
    pub order: usize,
    pub label: String,
    #[serde(default)]
    pub condition: ConditionTree,
}

/// A named cohort. The reserved name `ALL` (any casing) denotes the implicit
/// no-filter cohort and is never compiled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub name: String,
    #[serde(default)]
    pub condition: ConditionTree,
}

impl Segment {
    pub fn is_catch_all(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(SEGMENT_ALL)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelQuery {
    pub time: QueryTime,
    pub steps: Vec<FunnelStep>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ConditionTree>,
    /// Selects the open-session funnel template instead of the closed one.
    #[serde(default)]
    pub open_sessions: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverQuery {
    pub time: QueryTime,
    #[serde(default)]
    pub filter: ConditionTree,
}
