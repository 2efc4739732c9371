use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Result;
use common::query::ConditionRow;

/// Template names for the multi-part session funnel shapes. The discover
/// count/rate shape is assembled directly without a template.
pub const TEMPLATE_FUNNEL_SESSION_CLOSED: &str = "funnel.sessionClosed";
pub const TEMPLATE_FUNNEL_SESSION_OPEN: &str = "funnel.sessionOpen";

/// Resolves a condition row to the SQL expression of its target field.
/// `None` drops the row. Must be deterministic for identical row content;
/// results are never cached or retried.
pub trait FieldResolver: Send + Sync {
    fn resolve(&self, row: &ConditionRow) -> Option<String>;
}

/// The analytical database, consumed through a single synchronous query
/// capability with named `%(name)s` parameter binding.
pub trait Database: Send + Sync {
    fn query(&self, sql: &str, params: &IndexMap<String, Value>) -> Result<QueryResult>;
}

/// Renders a named SQL template with the variables the compiler controls.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &IndexMap<String, Value>) -> Result<String>;
}

/// Flat result rows in arbitrary but stable column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// The cell at (`row`, `column`), if the column exists and the cell is
    /// non-null.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .filter(|v| !v.is_null())
    }

    pub fn i64_value(&self, row: usize, column: &str) -> Option<i64> {
        self.value(row, column).and_then(Value::as_i64)
    }

    pub fn f64_value(&self, row: usize, column: &str) -> Option<f64> {
        self.value(row, column).and_then(Value::as_f64)
    }
}
