use std::sync::Arc;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use common::query::QueryTime;
use common::types::COLUMN_SESSION_ID;
use indexmap::IndexMap;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use crate::error::QueryError;
use crate::error::Result;
use crate::fragment::CompiledFragment;
use crate::fragment::Params;
use crate::provider::Database;
use crate::provider::QueryResult;
use crate::provider::TemplateRenderer;
use crate::segments::SegmentCase;

/// A query as it went to the database: the exact SQL, the exact parameter
/// map, and the returned rows. SQL and params are surfaced to preview
/// endpoints, so they are part of the public output.
#[derive(Clone, Debug)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Params,
    pub result: QueryResult,
}

/// Renders the time-window predicate for one request.
pub fn period_predicate(
    column: &str,
    time: &QueryTime,
    cur_time: DateTime<Utc>,
) -> (String, Params) {
    let (from, to) = time.range(cur_time);
    let mut params = Params::new();
    params.insert(
        "period_start".to_string(),
        json!(from.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    params.insert(
        "period_end".to_string(),
        json!(to.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    (
        format!("{column} >= %(period_start)s AND {column} < %(period_end)s"),
        params,
    )
}

/// Combines compiled fragments with the time-window predicate into a final
/// SQL string and parameter bag, and issues the single query round-trip.
/// Correctness of the fragments themselves is the compiler's job; assembly
/// is plain string/map concatenation.
pub struct QueryAssembler {
    db: Arc<dyn Database>,
    templates: Arc<dyn TemplateRenderer>,
}

impl QueryAssembler {
    pub fn new(db: Arc<dyn Database>, templates: Arc<dyn TemplateRenderer>) -> Self {
        Self { db, templates }
    }

    /// The two-CTE count/rate shape: `find_count` under period + WHERE +
    /// HAVING, `total_count` under the period alone, rate guarded against
    /// division by zero.
    pub fn discover(
        &self,
        source: &str,
        period_sql: &str,
        period_params: &Params,
        fragment: &CompiledFragment,
    ) -> Result<ExecutedQuery> {
        let mut inner = format!(
            "SELECT {COLUMN_SESSION_ID}\n        FROM {source}\n        WHERE {period_sql}"
        );
        if !fragment.where_sql.is_empty() {
            inner.push_str(&format!(" AND {}", fragment.where_sql));
        }
        inner.push_str(&format!("\n        GROUP BY {COLUMN_SESSION_ID}"));
        if !fragment.having_sql.is_empty() {
            inner.push_str(&format!("\n        HAVING {}", fragment.having_sql));
        }

        let sql = format!(
            "WITH find_count AS (\n    SELECT count(*) AS cnt\n    FROM (\n        {inner}\n    )\n),\ntotal_count AS (\n    SELECT count(DISTINCT {COLUMN_SESSION_ID}) AS cnt\n    FROM {source}\n    WHERE {period_sql}\n)\nSELECT\n    find_count.cnt AS find_count,\n    total_count.cnt AS total_count,\n    if(total_count.cnt = 0, 0, round(find_count.cnt / total_count.cnt * 100, 2)) AS rate\nFROM find_count, total_count"
        );

        let mut params = period_params.clone();
        params.extend(fragment.where_params.clone());
        params.extend(fragment.having_params.clone());
        self.execute(sql, params)
    }

    /// The multi-part session funnel shape, rendered from a named template.
    /// The assembler only supplies the variables it controls: the period
    /// predicate, the per-step expressions, the segment cases, and flags.
    pub fn funnel(
        &self,
        template: &str,
        period_sql: &str,
        period_params: &Params,
        filter: &CompiledFragment,
        step_exprs: &[String],
        segment_cases: &[SegmentCase],
        compiled_params: Params,
    ) -> Result<ExecutedQuery> {
        let mut vars = IndexMap::new();
        vars.insert("period".to_string(), json!(period_sql));
        vars.insert("filters".to_string(), json!(filter.where_sql));
        vars.insert("having".to_string(), json!(filter.having_sql));
        vars.insert("steps".to_string(), json!(step_exprs));
        vars.insert(
            "segments".to_string(),
            Value::Array(
                segment_cases
                    .iter()
                    .map(|case| json!({"key": case.key, "condition": case.condition}))
                    .collect(),
            ),
        );
        vars.insert(
            "withSegments".to_string(),
            json!(!segment_cases.is_empty()),
        );
        let sql = self.templates.render(template, &vars)?;

        let mut params = period_params.clone();
        params.extend(filter.where_params.clone());
        params.extend(filter.having_params.clone());
        params.extend(compiled_params);
        self.execute(sql, params)
    }

    fn execute(&self, sql: String, params: Params) -> Result<ExecutedQuery> {
        let start = Instant::now();
        let result = self
            .db
            .query(&sql, &params)
            .map_err(|err| QueryError::execution(err, sql.clone(), params.clone()))?;
        debug!(elapsed = ?start.elapsed(), rows = result.rows.len(), "query executed");
        Ok(ExecutedQuery {
            sql,
            params,
            result,
        })
    }
}

/// Substitutes parameters into the SQL for human-readable diagnostics.
/// Strings are single-quoted with escaping; never fed back to the database.
pub fn preview(sql: &str, params: &Params) -> String {
    let mut out = sql.to_string();
    for (key, value) in params {
        out = out.replace(&format!("%({key})s"), &quote_scalar(value));
    }
    out
}

fn quote_scalar(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => format!("'{}'", other.to_string().replace('\'', "\\'")),
    }
}
