use crate::error::{invalid_query, OrmResult};
use crate::query::{validate_conditions, FieldFilter, OrderBy, QueryCondition};

/// Result cap applied when a condition list carries no limit directive.
pub const DEFAULT_QUERY_LIMIT: u32 = 1000;

/// Fully resolved query against one collection, ready for a remote store.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    collection: String,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: u32,
}

impl QueryDefinition {
    /// Validates `conditions` and translates them into filters, sort keys and a limit.
    ///
    /// Filters keep their order, every ordering directive becomes a sort key and
    /// the first limit directive wins; without one the query is capped at
    /// [`DEFAULT_QUERY_LIMIT`].
    pub fn build(collection: impl Into<String>, conditions: &[QueryCondition]) -> OrmResult<Self> {
        validate_conditions(conditions)?;

        let mut filters = Vec::new();
        let mut order_by = Vec::new();
        let mut limit = None;
        for condition in conditions {
            match condition {
                QueryCondition::Filter(filter) => filters.push(filter.clone()),
                QueryCondition::OrderBy(order) => order_by.push(order.clone()),
                QueryCondition::Limit(count) => {
                    if limit.is_none() {
                        limit = Some(*count);
                    }
                }
            }
        }

        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit == 0 {
            return Err(invalid_query("Query limit must be greater than zero"));
        }

        Ok(Self {
            collection: collection.into(),
            filters,
            order_by,
            limit,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
