use common::query::funnel::FunnelStep;

use crate::condition;
use crate::fragment::rename_params;
use crate::fragment::Params;
use crate::provider::FieldResolver;

/// Compiles an ordered list of funnel steps into one boolean SQL expression
/// per step, for use inside a step-function aggregate. Parameter keys are
/// namespaced `s{i}_` (1-based) so the per-step bags merge without
/// collisions. An empty step list yields no expressions; callers must treat
/// that as "no funnel to compute" and skip the query.
pub fn compile_steps(steps: &[FunnelStep], resolver: &dyn FieldResolver) -> (Vec<String>, Params) {
    let mut exprs = Vec::with_capacity(steps.len());
    let mut params = Params::new();
    for (idx, step) in steps.iter().enumerate() {
        let fragment = condition::compile(&step.condition, resolver);
        let (expr, step_params) = fragment.into_boolean_expr();
        let (expr, step_params) = rename_params(&expr, &step_params, &format!("s{}_", idx + 1));
        exprs.push(expr);
        params.extend(step_params);
    }
    (exprs, params)
}
