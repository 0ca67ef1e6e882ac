use std::collections::BTreeSet;

use crate::error::{invalid_query, OrmResult};
use crate::query::{FilterOperator, QueryCondition};

/// Checks the arity restrictions the backing store imposes on combinable filters.
///
/// At most one `array-contains` condition is allowed, and every range operator
/// (`<`, `<=`, `>`, `>=`) must target the same field. Ordering and limit
/// directives are not counted.
pub fn validate_conditions(conditions: &[QueryCondition]) -> OrmResult<()> {
    let mut array_contains = 0usize;
    let mut range_fields = BTreeSet::new();

    for condition in conditions {
        let QueryCondition::Filter(filter) = condition else {
            continue;
        };
        if filter.operator() == FilterOperator::ArrayContains {
            array_contains += 1;
        } else if filter.operator().is_range() {
            range_fields.insert(filter.field());
        }
    }

    if array_contains > 1 {
        return Err(invalid_query(
            "only one array-membership condition is allowed",
        ));
    }
    if range_fields.len() > 1 {
        let fields = range_fields.into_iter().collect::<Vec<_>>().join(", ");
        return Err(invalid_query(format!(
            "range comparisons are only allowed on one field per query (found: {fields})"
        )));
    }
    Ok(())
}
