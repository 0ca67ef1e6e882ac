//! Query conditions, their validation, and translation into remote query definitions.

mod builder;
mod condition;
mod validator;

pub use builder::{QueryDefinition, DEFAULT_QUERY_LIMIT};
pub use condition::{FieldFilter, FilterOperator, OrderBy, OrderDirection, QueryCondition};
pub use validator::validate_conditions;
