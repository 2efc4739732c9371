use common::query::funnel::FunnelStep;
use common::query::ConditionTree;
use common::types::COLUMN_SEGMENT_KEY;
use common::types::ROUND_DIGITS;
use common::types::SEGMENT_ALL;
use serde_json::Value;

use crate::provider::QueryResult;

/// A segment as known to the report: its stored id and display name.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentMeta {
    pub id: u64,
    pub name: String,
}

/// Per-step metrics for one segment. Optional fields are meaningful when
/// absent: the metric was not computable from the available columns, which
/// is not the same as zero.
#[derive(Clone, Debug, PartialEq)]
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

#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub id: usize,
    pub label: String,
    pub order: usize,
    pub condition: ConditionTree,
    pub groups: Vec<GroupMetric>,
}

/// Reshapes flat result rows (keyed by segment label with per-step numbered
/// columns) into the nested step/group report. Pure function of its inputs;
/// zero result rows materialize to zero-valued metrics, not an error.
pub fn materialize(
    steps: &[FunnelStep],
    segments: &[SegmentMeta],
    result: &QueryResult,
) -> Vec<StepReport> {
    if steps.is_empty() {
        return Vec::new();
    }

    let implicit_all = [SegmentMeta {
        id: 0,
        name: SEGMENT_ALL.to_string(),
    }];
    let groups: &[SegmentMeta] = if segments.is_empty() {
        &implicit_all
    } else {
        segments
    };

    steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let step_no = idx + 1;
            let last = step_no == steps.len();
            let metrics = groups
                .iter()
                .enumerate()
                .map(|(group_idx, meta)| {
                    group_metric(result, meta, group_idx + 1, step_no, last)
                })
                .collect();
            StepReport {
                id: step.order,
                label: step.label.clone(),
                order: step.order,
                condition: step.condition.clone(),
                groups: metrics,
            }
        })
        .collect()
}

fn group_metric(
    result: &QueryResult,
    meta: &SegmentMeta,
    group_order: usize,
    step_no: usize,
    last: bool,
) -> GroupMetric {
    let row = segment_row(result, &meta.name);
    let cell_i64 = |column: &str| row.and_then(|r| result.i64_value(r, column));
    let cell_f64 = |column: &str| row.and_then(|r| result.f64_value(r, column));

    let active = cell_i64(&format!("step{step_no}_users")).unwrap_or(0);
    let next_users = cell_i64(&format!("step{}_users", step_no + 1)).unwrap_or(0);

    let dropoff = cell_i64(&format!("step{step_no}_dropped")).or_else(|| {
        if last {
            // Undefined for the terminal step.
            None
        } else {
            Some((active - next_users).max(0))
        }
    });

    let conversion = if last {
        None
    } else {
        Some(
            cell_f64(&format!("step{}_conversion", step_no + 1)).unwrap_or_else(|| {
                if active > 0 {
                    round(next_users as f64 / active as f64 * 100.0)
                } else {
                    0.0
                }
            }),
        )
    };
    let dropoff_rate = conversion.map(|rate| round(100.0 - rate));

    let entrance = if step_no >= 2 {
        cell_i64(&format!("step{step_no}_entrance"))
    } else {
        None
    };
    let skipped = if step_no >= 3 {
        cell_i64(&format!("step{step_no}_skipped"))
    } else {
        None
    };

    GroupMetric {
        id: meta.id,
        order: group_order,
        name: meta.name.clone(),
        active_count: active,
        dropoff_count: dropoff,
        conversion_rate: conversion,
        dropoff_rate,
        entrance_count: entrance,
        skipped_count: skipped,
    }
}

/// The first row whose `segment_key` matches `name`. Result sets without a
/// segment column belong entirely to the implicit `ALL` cohort.
fn segment_row(result: &QueryResult, name: &str) -> Option<usize> {
    match result.column_index(COLUMN_SEGMENT_KEY) {
        Some(idx) => result
            .rows
            .iter()
            .position(|row| row.get(idx).and_then(Value::as_str) == Some(name)),
        None if name == SEGMENT_ALL => (!result.rows.is_empty()).then_some(0),
        None => None,
    }
}

fn round(value: f64) -> f64 {
    let factor = 10f64.powi(ROUND_DIGITS as i32);
    (value * factor).round() / factor
}
