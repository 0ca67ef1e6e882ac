use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::error::{invalid_query, OrmError, OrmResult};
use crate::value::FieldValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
}

impl FilterOperator {
    const ALL: [FilterOperator; 6] = [
        FilterOperator::LessThan,
        FilterOperator::LessThanOrEqual,
        FilterOperator::Equal,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterThanOrEqual,
        FilterOperator::ArrayContains,
    ];

    /// Operator as written in a condition tuple.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Equal => "==",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::ArrayContains => "array-contains",
        }
    }

    /// Operator name used by the Firestore REST `runQuery` endpoint.
    pub fn rest_name(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::Equal => "EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
        }
    }

    /// `<`, `<=`, `>` and `>=`.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = OrmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        FilterOperator::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| invalid_query(format!("Unsupported query operator '{value}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "asc",
            OrderDirection::Descending => "desc",
        }
    }

    pub fn rest_name(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = OrmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(OrderDirection::Ascending),
            "desc" | "descending" => Ok(OrderDirection::Descending),
            other => Err(invalid_query(format!("Unsupported order direction '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    operator: FilterOperator,
    value: FieldValue,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: Option<OrderDirection>,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Option<OrderDirection>) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Direction as requested by the caller, if any.
    pub fn requested_direction(&self) -> Option<OrderDirection> {
        self.direction
    }

    /// Direction applied to the query; ascending unless stated otherwise.
    pub fn direction(&self) -> OrderDirection {
        self.direction.unwrap_or(OrderDirection::Ascending)
    }
}

/// One element of a query condition list.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryCondition {
    Filter(FieldFilter),
    OrderBy(OrderBy),
    Limit(u32),
}

impl QueryCondition {
    pub fn filter(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FieldValue>,
    ) -> Self {
        QueryCondition::Filter(FieldFilter::new(field, operator, value.into()))
    }

    /// Builds a filter from the textual operator form (`"<"`, `"array-contains"`, ...).
    pub fn parse_filter(
        field: impl Into<String>,
        operator: &str,
        value: impl Into<FieldValue>,
    ) -> OrmResult<Self> {
        Ok(Self::filter(field, operator.parse()?, value))
    }

    pub fn order_by(field: impl Into<String>, direction: Option<OrderDirection>) -> Self {
        QueryCondition::OrderBy(OrderBy::new(field, direction))
    }

    pub fn limit(count: u32) -> Self {
        QueryCondition::Limit(count)
    }

    /// Parses a single condition from its JSON form:
    ///
    /// - `["age", ">", 5]`
    /// - `{"limit": 50}`
    /// - `{"orderBy": "age", "direction": "desc"}` (direction optional)
    pub fn from_json(value: &JsonValue) -> OrmResult<Self> {
        match value {
            JsonValue::Array(parts) => {
                let [field, operator, operand] = parts.as_slice() else {
                    return Err(invalid_query(format!(
                        "Filter conditions need exactly three elements, got {}",
                        parts.len()
                    )));
                };
                let field = field
                    .as_str()
                    .ok_or_else(|| invalid_query("Filter field name must be a string"))?;
                let operator = operator
                    .as_str()
                    .ok_or_else(|| invalid_query("Filter operator must be a string"))?;
                Self::parse_filter(field, operator, FieldValue::from_json(operand))
            }
            JsonValue::Object(object) => {
                if let Some(limit) = object.get("limit") {
                    let count = limit
                        .as_u64()
                        .filter(|count| *count > 0)
                        .and_then(|count| u32::try_from(count).ok())
                        .ok_or_else(|| {
                            invalid_query(format!("Invalid limit directive: {limit}"))
                        })?;
                    return Ok(Self::limit(count));
                }
                if let Some(field) = object.get("orderBy") {
                    let field = field
                        .as_str()
                        .ok_or_else(|| invalid_query("orderBy must name a field"))?;
                    let direction = match object.get("direction") {
                        None | Some(JsonValue::Null) => None,
                        Some(JsonValue::String(direction)) => Some(direction.parse()?),
                        Some(other) => {
                            return Err(invalid_query(format!("Invalid order direction: {other}")))
                        }
                    };
                    return Ok(Self::order_by(field, direction));
                }
                Err(invalid_query(format!("Unrecognized query directive: {value}")))
            }
            other => Err(invalid_query(format!("Unrecognized query condition: {other}"))),
        }
    }

    /// Parses a JSON array of conditions.
    pub fn list_from_json(value: &JsonValue) -> OrmResult<Vec<Self>> {
        value
            .as_array()
            .ok_or_else(|| invalid_query("Query conditions must be a JSON array"))?
            .iter()
            .map(Self::from_json)
            .collect()
    }
}
