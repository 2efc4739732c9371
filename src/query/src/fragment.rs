use indexmap::IndexMap;
use serde_json::Value;

pub type Params = IndexMap<String, Value>;

/// The universal output of compiling one condition tree: a row-level filter
/// and a post-aggregation filter, each with its own parameter bag. Parameter
/// keys are unique across both bags within one compile call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledFragment {
    pub where_sql: String,
    pub where_params: Params,
    pub having_sql: String,
    pub having_params: Params,
}

impl CompiledFragment {
    pub fn is_empty(&self) -> bool {
        self.where_sql.is_empty() && self.having_sql.is_empty()
    }

    /// Collapses the fragment into a single boolean expression usable inside
    /// a per-session aggregate. When an aggregate condition is present the
    /// row-level filter becomes "true for at least one row in the session";
    /// no condition at all is the literal `1`.
    pub fn into_boolean_expr(self) -> (String, Params) {
        let expr = match (self.where_sql.is_empty(), self.having_sql.is_empty()) {
            (true, true) => "1".to_string(),
            (false, true) => self.where_sql,
            (true, false) => self.having_sql,
            (false, false) => format!(
                "max(toUInt8({})) = 1 AND {}",
                self.where_sql, self.having_sql
            ),
        };
        // Key spaces never collide: both bags share one counter per compile.
        let mut params = self.where_params;
        params.extend(self.having_params);
        (expr, params)
    }
}

/// Allocates `p1, p2, …` keys. One counter per compile call; never shared
/// between requests.
#[derive(Debug, Default)]
pub struct ParamCounter(usize);

impl ParamCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next_key(&mut self) -> String {
        self.0 += 1;
        format!("p{}", self.0)
    }
}

/// Rewrites every parameter key with `prefix` so fragments compiled
/// independently can be merged into one query. Pure key rename: only the
/// `%(key)s` placeholders of this fragment's own keys are touched.
pub fn rename_params(sql: &str, params: &Params, prefix: &str) -> (String, Params) {
    let mut out_sql = sql.to_string();
    let mut out_params = Params::with_capacity(params.len());
    for (key, value) in params {
        let renamed = format!("{prefix}{key}");
        out_sql = out_sql.replace(&format!("%({key})s"), &format!("%({renamed})s"));
        out_params.insert(renamed, value.clone());
    }
    (out_sql, out_params)
}
