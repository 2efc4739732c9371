use std::sync::Arc;
use std::time::Instant;

use common::query::funnel::DiscoverQuery;
use common::query::funnel::FunnelQuery;
use common::types::COLUMN_CREATED_AT;
use common::types::TABLE_EVENTS;
use tracing::debug;

use crate::assemble::period_predicate;
use crate::assemble::preview;
use crate::assemble::QueryAssembler;
use crate::condition;
use crate::error::QueryError;
use crate::error::Result;
use crate::fragment::CompiledFragment;
use crate::fragment::Params;
use crate::materialize::materialize;
use crate::materialize::SegmentMeta;
use crate::materialize::StepReport;
use crate::provider::Database;
use crate::provider::FieldResolver;
use crate::provider::TemplateRenderer;
use crate::provider::TEMPLATE_FUNNEL_SESSION_CLOSED;
use crate::provider::TEMPLATE_FUNNEL_SESSION_OPEN;
use crate::segments::compile_segments;
use crate::steps::compile_steps;
use crate::Context;

/// The funnel report plus the exact query that produced it. SQL, parameter
/// map, and the substituted preview string are first-class outputs for the
/// diagnostic surface.
#[derive(Clone, Debug)]
pub struct FunnelResponse {
    pub steps: Vec<StepReport>,
    pub sql: String,
    pub params: Params,
    pub preview: String,
}

#[derive(Clone, Debug)]
pub struct DiscoverResponse {
    pub find_count: i64,
    pub total_count: i64,
    pub rate: f64,
    pub sql: String,
    pub params: Params,
    pub preview: String,
}

pub struct FunnelProvider {
    assembler: QueryAssembler,
    resolver: Option<Arc<dyn FieldResolver>>,
}

impl FunnelProvider {
    pub fn new(db: Arc<dyn Database>, templates: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            assembler: QueryAssembler::new(db, templates),
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn FieldResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    fn resolver(&self) -> Result<&dyn FieldResolver> {
        self.resolver.as_deref().ok_or_else(|| {
            QueryError::Configuration("no field resolver configured for condition compilation".to_string())
        })
    }

    /// Compiles and runs one funnel query, then materializes the report.
    /// An empty step list is "no funnel to compute": zero metrics, no query.
    pub fn funnel(&self, ctx: Context, req: FunnelQuery) -> Result<FunnelResponse> {
        if req.steps.is_empty() {
            return Ok(FunnelResponse {
                steps: Vec::new(),
                sql: String::new(),
                params: Params::new(),
                preview: String::new(),
            });
        }
        let resolver = self.resolver()?;
        let start = Instant::now();

        let (step_exprs, step_params) = compile_steps(&req.steps, resolver);
        let (cases, case_params) = compile_segments(&req.segments, resolver);
        let filter = req
            .filters
            .as_ref()
            .map(|tree| condition::compile(tree, resolver))
            .unwrap_or_default();

        let mut compiled = step_params;
        compiled.extend(case_params);

        let template = if req.open_sessions {
            TEMPLATE_FUNNEL_SESSION_OPEN
        } else {
            TEMPLATE_FUNNEL_SESSION_CLOSED
        };
        let (period_sql, period_params) =
            period_predicate(COLUMN_CREATED_AT, &req.time, ctx.cur_time);
        let executed = self.assembler.funnel(
            template,
            &period_sql,
            &period_params,
            &filter,
            &step_exprs,
            &cases,
            compiled,
        )?;

        let metas = req
            .segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| SegmentMeta {
                id: idx as u64 + 1,
                name: segment.name.clone(),
            })
            .collect::<Vec<_>>();
        let steps = materialize(&req.steps, &metas, &executed.result);
        debug!(elapsed = ?start.elapsed(), steps = steps.len(), "funnel materialized");

        Ok(FunnelResponse {
            steps,
            preview: preview(&executed.sql, &executed.params),
            sql: executed.sql,
            params: executed.params,
        })
    }

    /// The discover count/rate shape for one ad-hoc condition tree.
    pub fn discover(&self, ctx: Context, req: DiscoverQuery) -> Result<DiscoverResponse> {
        let fragment = if req.filter.is_empty() {
            CompiledFragment::default()
        } else {
            condition::compile(&req.filter, self.resolver()?)
        };
        let (period_sql, period_params) =
            period_predicate(COLUMN_CREATED_AT, &req.time, ctx.cur_time);
        let executed =
            self.assembler
                .discover(TABLE_EVENTS, &period_sql, &period_params, &fragment)?;

        // Zero rows legitimately mean zero activity in the period.
        let find_count = executed.result.i64_value(0, "find_count").unwrap_or(0);
        let total_count = executed.result.i64_value(0, "total_count").unwrap_or(0);
        let rate = executed.result.f64_value(0, "rate").unwrap_or(0.0);

        Ok(DiscoverResponse {
            find_count,
            total_count,
            rate,
            preview: preview(&executed.sql, &executed.params),
            sql: executed.sql,
            params: executed.params,
        })
    }
}
