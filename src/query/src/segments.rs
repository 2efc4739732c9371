use common::query::funnel::Segment;

use crate::condition;
use crate::fragment::rename_params;
use crate::fragment::Params;
use crate::provider::FieldResolver;

/// A named cohort compiled to a boolean SQL expression.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentCase {
    pub key: String,
    pub condition: String,
}

/// Compiles named cohorts into boolean "segment cases". The reserved `ALL`
/// cohort is skipped entirely; parameter keys are namespaced `g{i}_`,
/// counting only compiled segments in input order.
pub fn compile_segments(
    segments: &[Segment],
    resolver: &dyn FieldResolver,
) -> (Vec<SegmentCase>, Params) {
    let mut cases = Vec::with_capacity(segments.len());
    let mut params = Params::new();
    for segment in segments {
        if segment.is_catch_all() {
            continue;
        }
        let fragment = condition::compile(&segment.condition, resolver);
        let (expr, segment_params) = fragment.into_boolean_expr();
        let (expr, segment_params) =
            rename_params(&expr, &segment_params, &format!("g{}_", cases.len() + 1));
        cases.push(SegmentCase {
            key: segment.name.clone(),
            condition: expr,
        });
        params.extend(segment_params);
    }
    (cases, params)
}

#[cfg(test)]
mod tests {
    use common::query::ConditionRow;
    use common::query::ConditionTree;
    use common::types::COLUMN_EVENT;
    use serde_json::json;

    use super::*;

    struct EventResolver;

    impl FieldResolver for EventResolver {
        fn resolve(&self, _row: &ConditionRow) -> Option<String> {
            Some(COLUMN_EVENT.to_string())
        }
    }

    fn segment(name: &str, condition: ConditionTree) -> Segment {
        Segment {
            name: name.to_string(),
            condition,
        }
    }

    fn eq_tree(value: &str) -> ConditionTree {
        ConditionTree(vec![vec![ConditionRow {
            operator: Some(5),
            value: Some(json!(value)),
            ..Default::default()
        }]])
    }

    #[test]
    fn catch_all_is_never_compiled() {
        for reserved in ["ALL", "all", "All"] {
            let segments = vec![
                segment(reserved, eq_tree("visit")),
                segment("Power Users", eq_tree("purchase")),
            ];
            let (cases, params) = compile_segments(&segments, &EventResolver);
            assert_eq!(cases.len(), 1);
            assert_eq!(cases[0].key, "Power Users");
            // The first compiled segment gets g1_ even when ALL came first.
            assert_eq!(cases[0].condition, "(event_name = %(g1_p1)s)");
            assert_eq!(params.get("g1_p1"), Some(&json!("purchase")));
        }
    }

    #[test]
    fn segment_params_merge_without_collisions() {
        let segments = vec![
            segment("Buyers", eq_tree("purchase")),
            segment("Browsers", eq_tree("visit")),
        ];
        let (cases, params) = compile_segments(&segments, &EventResolver);
        assert_eq!(cases[0].condition, "(event_name = %(g1_p1)s)");
        assert_eq!(cases[1].condition, "(event_name = %(g2_p1)s)");
        assert_eq!(params.len(), 2);
    }
}
