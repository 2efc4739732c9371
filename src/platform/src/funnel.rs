use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use common::query::funnel::DiscoverQuery;
use common::query::funnel::FunnelQuery;
use common::query::ConditionTree;
use common::query::TimeIntervalUnit;
use common::types::MAX_FUNNEL_STEPS;
use query::funnel::FunnelProvider;
use query::Context;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::PlatformError;
use crate::error::Result;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueryTime {
    Between {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    From {
        from: DateTime<Utc>,
    },
    Last {
        last: i64,
        unit: TimeIntervalUnit,
    },
}

impl From<QueryTime> for common::query::QueryTime {
    fn from(time: QueryTime) -> Self {
        match time {
            QueryTime::Between { from, to } => common::query::QueryTime::Between { from, to },
            QueryTime::From { from } => common::query::QueryTime::From(from),
            QueryTime::Last { last, unit } => common::query::QueryTime::Last { last, unit },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub order: usize,
    pub label: String,
    #[serde(default)]
    pub condition: ConditionTree,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub name: String,
    #[serde(default)]
    pub condition: ConditionTree,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelRequest {
    pub time: QueryTime,
    pub steps: Vec<FunnelStep>,
    #[serde(default)]
    pub segments: Option<Vec<Segment>>,
    #[serde(default)]
    pub filters: Option<ConditionTree>,
    #[serde(default)]
    pub open_sessions: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub time: QueryTime,
    #[serde(default)]
    pub filter: Option<ConditionTree>,
}

/// Extra knobs that ride alongside a request. `timestamp` pins "now" so that
/// relative time ranges resolve the same way on replays.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// The compiled query, echoed back for diagnostics. Absent metrics serialize
/// as nulls so callers can tell "not computable" from zero.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDebug {
    pub sql: String,
    pub params: serde_json::Map<String, Value>,
    pub preview: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetric {
    pub id: u64,
    pub order: usize,
    pub name: String,
    pub active_count: i64,
    pub dropoff_count: Option<i64>,
    pub conversion_rate: Option<f64>,
    pub dropoff_rate: Option<f64>,
    pub entrance_count: Option<i64>,
    pub skipped_count: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub id: usize,
    pub label: String,
    pub order: usize,
    pub condition: ConditionTree,
    pub groups: Vec<GroupMetric>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelResponse {
    pub steps: Vec<StepReport>,
    pub query: QueryDebug,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse {
    pub find_count: i64,
    pub total_count: i64,
    pub rate: f64,
    pub query: QueryDebug,
}

impl From<query::materialize::GroupMetric> for GroupMetric {
    fn from(metric: query::materialize::GroupMetric) -> Self {
        GroupMetric {
            id: metric.id,
            order: metric.order,
            name: metric.name,
            active_count: metric.active_count,
            dropoff_count: metric.dropoff_count,
            conversion_rate: metric.conversion_rate,
            dropoff_rate: metric.dropoff_rate,
            entrance_count: metric.entrance_count,
            skipped_count: metric.skipped_count,
        }
    }
}

impl From<query::materialize::StepReport> for StepReport {
    fn from(step: query::materialize::StepReport) -> Self {
        StepReport {
            id: step.id,
            label: step.label,
            order: step.order,
            condition: step.condition,
            groups: step.groups.into_iter().map(Into::into).collect(),
        }
    }
}

fn query_debug(sql: String, params: query::fragment::Params, preview: String) -> QueryDebug {
    QueryDebug {
        sql,
        params: params.into_iter().collect(),
        preview,
    }
}

impl From<query::funnel::FunnelResponse> for FunnelResponse {
    fn from(resp: query::funnel::FunnelResponse) -> Self {
        FunnelResponse {
            steps: resp.steps.into_iter().map(Into::into).collect(),
            query: query_debug(resp.sql, resp.params, resp.preview),
        }
    }
}

impl From<query::funnel::DiscoverResponse> for DiscoverResponse {
    fn from(resp: query::funnel::DiscoverResponse) -> Self {
        DiscoverResponse {
            find_count: resp.find_count,
            total_count: resp.total_count,
            rate: resp.rate,
            query: query_debug(resp.sql, resp.params, resp.preview),
        }
    }
}

impl From<FunnelRequest> for FunnelQuery {
    fn from(req: FunnelRequest) -> Self {
        FunnelQuery {
            time: req.time.into(),
            steps: req
                .steps
                .into_iter()
                .map(|step| common::query::funnel::FunnelStep {
                    order: step.order,
                    label: step.label,
                    condition: step.condition,
                })
                .collect(),
            segments: req
                .segments
                .unwrap_or_default()
                .into_iter()
                .map(|segment| common::query::funnel::Segment {
                    name: segment.name,
                    condition: segment.condition,
                })
                .collect(),
            filters: req.filters,
            open_sessions: req.open_sessions,
        }
    }
}

impl From<DiscoverRequest> for DiscoverQuery {
    fn from(req: DiscoverRequest) -> Self {
        DiscoverQuery {
            time: req.time.into(),
            filter: req.filter.unwrap_or_default(),
        }
    }
}

pub(crate) fn validate_request(req: &FunnelRequest) -> Result<()> {
    if let QueryTime::Between { from, to } = &req.time {
        if from > to {
            return Err(PlatformError::BadRequest(
                "from time must be less than to time".to_string(),
            ));
        }
    }
    if req.steps.len() > MAX_FUNNEL_STEPS {
        return Err(PlatformError::BadRequest(format!(
            "funnel must not have more than {MAX_FUNNEL_STEPS} steps"
        )));
    }
    for (idx, step) in req.steps.iter().enumerate() {
        if step.order != idx + 1 {
            return Err(PlatformError::BadRequest(format!(
                "step #{idx}: order must be {}",
                idx + 1
            )));
        }
    }
    if let Some(segments) = &req.segments {
        for (idx, segment) in segments.iter().enumerate() {
            if segment.name.trim().is_empty() {
                return Err(PlatformError::BadRequest(format!(
                    "segment #{idx}: name must not be empty"
                )));
            }
        }
    }
    Ok(())
}

fn prune_tree(tree: ConditionTree) -> ConditionTree {
    ConditionTree(tree.0.into_iter().filter(|group| !group.is_empty()).collect())
}

/// Normalizes a request in place of rejecting it: empty condition groups and
/// empty filter trees are dropped rather than compiled to nothing.
pub(crate) fn fix_request(req: FunnelRequest) -> FunnelRequest {
    FunnelRequest {
        time: req.time,
        steps: req
            .steps
            .into_iter()
            .map(|step| FunnelStep {
                condition: prune_tree(step.condition),
                ..step
            })
            .collect(),
        segments: req.segments.map(|segments| {
            segments
                .into_iter()
                .map(|segment| Segment {
                    condition: prune_tree(segment.condition),
                    ..segment
                })
                .collect()
        }),
        filters: req.filters.map(prune_tree).filter(|tree| !tree.is_empty()),
        open_sessions: req.open_sessions,
    }
}

fn context_for(params: &QueryParams) -> Result<Context> {
    let cur_time = match params.timestamp {
        None => Utc::now(),
        Some(seconds) => DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            PlatformError::BadRequest(format!("invalid timestamp: {seconds}"))
        })?,
    };
    Ok(Context::new(cur_time))
}

pub struct Funnel {
    prov: Arc<FunnelProvider>,
}

impl Funnel {
    pub fn new(prov: Arc<FunnelProvider>) -> Self {
        Self { prov }
    }

    pub fn funnel(&self, req: FunnelRequest, params: QueryParams) -> Result<FunnelResponse> {
        validate_request(&req)?;
        let req = fix_request(req);
        let ctx = context_for(&params)?;
        let resp = self.prov.funnel(ctx, req.into())?;
        Ok(resp.into())
    }

    pub fn discover(&self, req: DiscoverRequest, params: QueryParams) -> Result<DiscoverResponse> {
        let ctx = context_for(&params)?;
        let resp = self.prov.discover(ctx, req.into())?;
        Ok(resp.into())
    }
}
