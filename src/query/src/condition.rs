use common::query::ConditionRow;
use common::query::ConditionTree;
use common::query::ValueKind;
use common::types::COLUMN_EVENT;
use serde_json::Value;

use crate::fragment::CompiledFragment;
use crate::fragment::ParamCounter;
use crate::fragment::Params;
use crate::ops::Operator;
use crate::provider::FieldResolver;
use crate::value::normalize;
use crate::value::remap_field;
use crate::value::Normalized;

/// Compiles a condition tree (groups of OR'd rows, AND'd across groups) into
/// WHERE/HAVING SQL fragments plus their parameter bags. Rows that cannot be
/// compiled (unresolved field, unknown operator, absent value) are silently
/// dropped; an empty tree yields an all-empty fragment.
pub fn compile(tree: &ConditionTree, resolver: &dyn FieldResolver) -> CompiledFragment {
    let mut counter = ParamCounter::new();
    let mut where_blocks = Vec::new();
    let mut having_blocks = Vec::new();
    let mut where_params = Params::new();
    let mut having_params = Params::new();

    for group in &tree.0 {
        let mut where_or = Vec::new();
        let mut having_or = Vec::new();
        for row in group {
            compile_row(
                row,
                resolver,
                &mut counter,
                &mut where_or,
                &mut where_params,
                &mut having_or,
                &mut having_params,
            );
        }
        if !where_or.is_empty() {
            where_blocks.push(format!("({})", where_or.join(" OR ")));
        }
        if !having_or.is_empty() {
            having_blocks.push(format!("({})", having_or.join(" OR ")));
        }
    }

    CompiledFragment {
        where_sql: where_blocks.join(" AND "),
        where_params,
        having_sql: having_blocks.join(" AND "),
        having_params,
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_row(
    row: &ConditionRow,
    resolver: &dyn FieldResolver,
    counter: &mut ParamCounter,
    where_or: &mut Vec<String>,
    where_params: &mut Params,
    having_or: &mut Vec<String>,
    having_params: &mut Params,
) {
    let Some(expr) = resolver.resolve(row) else {
        return;
    };

    let operator = match row.operator {
        Some(code) => Operator::from_code(code),
        // Event-occurrence rows default to equality when no operator is set.
        None if row.is_event_occurrence() => Some(Operator::Eq),
        None => None,
    };
    let Some(operator) = operator else {
        return;
    };

    let is_count = row.value_kind.is_count();
    let kind = if is_count {
        ValueKind::Count
    } else {
        ValueKind::Value
    };

    let mut fallback_used = false;
    let mut normalized = row.value.as_ref().and_then(|v| normalize(v, kind));
    if normalized.is_none() && row.is_event_occurrence() && !is_count {
        // "Filter by event name present": the raw field name text itself
        // becomes the comparison value.
        if let Some(name) = row.raw_field_name() {
            normalized = Some(Normalized::Scalar(Value::String(name.to_string())));
            fallback_used = true;
        }
    }
    let Some(normalized) = normalized else {
        return;
    };
    let value = remap_field(row.field_id, normalized);

    if is_count {
        // Aggregate routing: rewrite the target into a countIf and compare
        // post-aggregation.
        let target = match row.raw_field_name() {
            Some(name) => {
                let key = counter.next_key();
                having_params.insert(key.clone(), Value::String(name.to_string()));
                format!("countIf({COLUMN_EVENT} = %({key})s)")
            }
            None => format!("countIf(isNotNull({expr}))"),
        };
        having_or.push(comparison(&target, operator, &value, counter, having_params));
    } else {
        let scope_key = match row.raw_field_name() {
            // Scope the filter to the right event, unless the comparison
            // already targets the event name itself.
            Some(name) if row.is_event_occurrence() && !fallback_used => {
                let key = counter.next_key();
                where_params.insert(key.clone(), Value::String(name.to_string()));
                Some(key)
            }
            _ => None,
        };
        let cmp = comparison(&expr, operator, &value, counter, where_params);
        match scope_key {
            Some(key) => where_or.push(format!("({COLUMN_EVENT} = %({key})s AND ({cmp}))")),
            None => where_or.push(cmp),
        }
    }
}

fn comparison(
    expr: &str,
    operator: Operator,
    value: &Normalized,
    counter: &mut ParamCounter,
    params: &mut Params,
) -> String {
    match value {
        Normalized::Scalar(v) => {
            let key = counter.next_key();
            params.insert(key.clone(), v.clone());
            operator.render(expr, &key)
        }
        Normalized::List(items) => {
            let placeholders = items
                .iter()
                .map(|item| {
                    let key = counter.next_key();
                    params.insert(key.clone(), item.clone());
                    format!("%({key})s")
                })
                .collect::<Vec<_>>();
            format!("{expr} IN ({})", placeholders.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use common::types::EVENT_OCCURRENCE_CATEGORY;
    use serde_json::json;

    use super::*;

    /// Resolves a fixed set of numeric fields; event-occurrence rows resolve
    /// to the event-name column, everything else is unresolved.
    struct StaticResolver;

    impl FieldResolver for StaticResolver {
        fn resolve(&self, row: &ConditionRow) -> Option<String> {
            if row.is_event_occurrence() && row.field_id.is_none() {
                return Some(COLUMN_EVENT.to_string());
            }
            match row.field_id {
                Some(3) => Some("user_browser".to_string()),
                Some(7) => Some("page_path".to_string()),
                Some(11) => Some("visitor_kind".to_string()),
                _ => None,
            }
        }
    }

    fn row(field_id: u64, operator: u8, value: Value) -> ConditionRow {
        ConditionRow {
            field_id: Some(field_id),
            operator: Some(operator),
            value: Some(value),
            ..Default::default()
        }
    }

    /// All `%(key)s` placeholders referenced in `sql`.
    fn placeholders(sql: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = sql;
        while let Some(start) = rest.find("%(") {
            let tail = &rest[start + 2..];
            let end = tail.find(")s").expect("unterminated placeholder");
            out.push(tail[..end].to_string());
            rest = &tail[end + 2..];
        }
        out
    }

    #[test]
    fn empty_tree_compiles_to_empty_fragment() {
        let fragment = compile(&ConditionTree::default(), &StaticResolver);
        assert_eq!(fragment, CompiledFragment::default());
    }

    #[test]
    fn single_row_compiles_to_parenthesized_or_block() {
        let tree = ConditionTree(vec![vec![row(3, 5, json!("chrome"))]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(fragment.where_sql, "(user_browser = %(p1)s)");
        assert_eq!(fragment.where_params.get("p1"), Some(&json!("chrome")));
        assert!(fragment.having_sql.is_empty());
    }

    #[test]
    fn groups_are_anded_rows_are_ored() {
        let tree = ConditionTree(vec![
            vec![row(3, 5, json!("chrome")), row(3, 5, json!("firefox"))],
            vec![row(7, 2, json!("/checkout"))],
        ]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(
            fragment.where_sql,
            "(user_browser = %(p1)s OR user_browser = %(p2)s) AND (startsWith(page_path, %(p3)s))"
        );
    }

    #[test]
    fn blank_value_drops_the_row() {
        for value in [json!(""), Value::Null, json!([])] {
            let tree = ConditionTree(vec![vec![row(3, 5, value)]]);
            assert_eq!(compile(&tree, &StaticResolver), CompiledFragment::default());
        }
    }

    #[test]
    fn unresolved_field_and_unknown_operator_drop_the_row() {
        let unresolved = ConditionTree(vec![vec![row(999, 5, json!("x"))]]);
        assert_eq!(
            compile(&unresolved, &StaticResolver),
            CompiledFragment::default()
        );

        let unknown_op = ConditionTree(vec![vec![row(3, 42, json!("x"))]]);
        assert_eq!(
            compile(&unknown_op, &StaticResolver),
            CompiledFragment::default()
        );

        // No operator and not an event-occurrence row.
        let no_op = ConditionTree(vec![vec![ConditionRow {
            field_id: Some(3),
            value: Some(json!("x")),
            ..Default::default()
        }]]);
        assert_eq!(compile(&no_op, &StaticResolver), CompiledFragment::default());
    }

    #[test]
    fn list_values_become_in_clauses() {
        let tree = ConditionTree(vec![vec![row(3, 5, json!(["chrome", "", "safari"]))]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(fragment.where_sql, "(user_browser IN (%(p1)s, %(p2)s))");
        assert_eq!(fragment.where_params.len(), 2);
        assert_eq!(fragment.where_params.get("p1"), Some(&json!("chrome")));
        assert_eq!(fragment.where_params.get("p2"), Some(&json!("safari")));
    }

    #[test]
    fn every_placeholder_is_bound_and_unique() {
        let tree = ConditionTree(vec![
            vec![row(3, 5, json!(["chrome", "safari"])), row(7, 4, json!("cart"))],
            vec![ConditionRow {
                field_id: Some(7),
                field_name: Some("purchase".to_string()),
                category_id: Some(EVENT_OCCURRENCE_CATEGORY),
                operator: Some(6),
                value: Some(json!("3")),
                value_kind: ValueKind::Count,
                ..Default::default()
            }],
        ]);
        let fragment = compile(&tree, &StaticResolver);

        let mut seen = std::collections::HashSet::new();
        for key in placeholders(&fragment.where_sql) {
            assert!(fragment.where_params.contains_key(&key), "unbound {key}");
            assert!(seen.insert(key), "duplicate key");
        }
        for key in placeholders(&fragment.having_sql) {
            assert!(fragment.having_params.contains_key(&key), "unbound {key}");
            assert!(seen.insert(key), "duplicate key");
        }
        assert_eq!(
            seen.len(),
            fragment.where_params.len() + fragment.having_params.len()
        );
    }

    #[test]
    fn event_occurrence_without_operator_or_value_filters_event_name() {
        let tree = ConditionTree(vec![vec![ConditionRow {
            field_name: Some("purchase".to_string()),
            category_id: Some(EVENT_OCCURRENCE_CATEGORY),
            ..Default::default()
        }]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(fragment.where_sql, "(event_name = %(p1)s)");
        assert_eq!(fragment.where_params.get("p1"), Some(&json!("purchase")));
        assert!(fragment.having_sql.is_empty());
    }

    #[test]
    fn event_occurrence_with_value_is_scoped_to_the_event() {
        let tree = ConditionTree(vec![vec![ConditionRow {
            field_id: Some(7),
            field_name: Some("purchase".to_string()),
            category_id: Some(EVENT_OCCURRENCE_CATEGORY),
            operator: Some(5),
            value: Some(json!("/done")),
            ..Default::default()
        }]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(
            fragment.where_sql,
            "((event_name = %(p1)s AND (page_path = %(p2)s)))"
        );
        assert_eq!(fragment.where_params.get("p1"), Some(&json!("purchase")));
        assert_eq!(fragment.where_params.get("p2"), Some(&json!("/done")));
    }

    #[test]
    fn count_rows_route_to_having() {
        let tree = ConditionTree(vec![vec![ConditionRow {
            field_name: Some("purchase".to_string()),
            category_id: Some(EVENT_OCCURRENCE_CATEGORY),
            operator: Some(8),
            value: Some(json!("2")),
            value_kind: ValueKind::Count,
            ..Default::default()
        }]]);
        let fragment = compile(&tree, &StaticResolver);
        assert!(fragment.where_sql.is_empty());
        assert_eq!(
            fragment.having_sql,
            "(countIf(event_name = %(p1)s) >= %(p2)s)"
        );
        assert_eq!(fragment.having_params.get("p1"), Some(&json!("purchase")));
        assert_eq!(fragment.having_params.get("p2"), Some(&json!(2)));
    }

    #[test]
    fn count_row_without_raw_name_counts_non_null() {
        let tree = ConditionTree(vec![vec![ConditionRow {
            field_id: Some(7),
            operator: Some(6),
            value: Some(json!(1)),
            value_kind: ValueKind::Count,
            ..Default::default()
        }]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(
            fragment.having_sql,
            "(countIf(isNotNull(page_path)) > %(p1)s)"
        );
    }

    #[test]
    fn count_row_with_unparseable_value_is_dropped() {
        let tree = ConditionTree(vec![vec![ConditionRow {
            field_id: Some(7),
            operator: Some(6),
            value: Some(json!("often")),
            value_kind: ValueKind::Count,
            ..Default::default()
        }]]);
        assert_eq!(compile(&tree, &StaticResolver), CompiledFragment::default());
    }

    #[test]
    fn visitor_kind_values_are_remapped() {
        let tree = ConditionTree(vec![vec![row(11, 5, json!("new"))]]);
        let fragment = compile(&tree, &StaticResolver);
        assert_eq!(fragment.where_sql, "(visitor_kind = %(p1)s)");
        assert_eq!(fragment.where_params.get("p1"), Some(&json!(1)));
    }
}
