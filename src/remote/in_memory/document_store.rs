use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::OrmResult;
use crate::query::{FieldFilter, FilterOperator, OrderBy, OrderDirection, QueryDefinition};
use crate::remote::{DocumentSnapshot, DocumentStore};
use crate::value::{FieldMap, FieldValue, ValueKind};

const AUTO_ID_LENGTH: usize = 20;

type Collections = BTreeMap<String, BTreeMap<String, FieldMap>>;

/// Process-local document store that evaluates queries the way the managed
/// service does for flat documents.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `collection/key`, replacing any existing document.
    pub fn insert(&self, collection: &str, key: &str, data: FieldMap) {
        let mut store = self.collections.lock().unwrap();
        store
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), data);
    }

    pub fn document(&self, collection: &str, key: &str) -> Option<FieldMap> {
        let store = self.collections.lock().unwrap();
        store.get(collection).and_then(|docs| docs.get(key)).cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        let store = self.collections.lock().unwrap();
        store.get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, collection: &str, key: &str) -> OrmResult<DocumentSnapshot> {
        Ok(DocumentSnapshot::new(
            collection,
            key,
            self.document(collection, key),
        ))
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        data: FieldMap,
        merge: bool,
    ) -> OrmResult<DocumentSnapshot> {
        let mut store = self.collections.lock().unwrap();
        let documents = store.entry(collection.to_string()).or_default();
        let stored = if merge {
            let fields = documents.entry(key.to_string()).or_default();
            fields.extend(data);
            fields.clone()
        } else {
            documents.insert(key.to_string(), data.clone());
            data
        };
        Ok(DocumentSnapshot::new(collection, key, Some(stored)))
    }

    async fn add_document(&self, collection: &str, data: FieldMap) -> OrmResult<DocumentSnapshot> {
        let mut store = self.collections.lock().unwrap();
        let documents = store.entry(collection.to_string()).or_default();
        let key = loop {
            let candidate = auto_id();
            if !documents.contains_key(&candidate) {
                break candidate;
            }
        };
        documents.insert(key.clone(), data.clone());
        Ok(DocumentSnapshot::new(collection, key, Some(data)))
    }

    async fn run_query(&self, query: &QueryDefinition) -> OrmResult<Vec<DocumentSnapshot>> {
        let store = self.collections.lock().unwrap();
        let Some(documents) = store.get(query.collection()) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<DocumentSnapshot> = documents
            .iter()
            .filter(|(_, data)| satisfies_filters(data, query.filters()))
            .filter(|(_, data)| has_order_fields(data, query.order_by()))
            .map(|(key, data)| DocumentSnapshot::new(query.collection(), key, Some(data.clone())))
            .collect();

        matches.sort_by(|left, right| compare_snapshots(left, right, query.order_by()));
        matches.truncate(query.limit() as usize);
        Ok(matches)
    }
}

fn auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

fn satisfies_filters(data: &FieldMap, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|filter| match find_field(data, filter.field()) {
        Some(value) => evaluate_filter(filter, value),
        None => false,
    })
}

// Ordering on a field excludes documents that lack it.
fn has_order_fields(data: &FieldMap, order_by: &[OrderBy]) -> bool {
    order_by
        .iter()
        .all(|order| find_field(data, order.field()).is_some())
}

fn evaluate_filter(filter: &FieldFilter, value: &FieldValue) -> bool {
    let ordering = compare_values(value, filter.value());
    match filter.operator() {
        FilterOperator::Equal => ordering == Some(Ordering::Equal),
        FilterOperator::LessThan => ordering == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => {
            matches!(ordering, Some(Ordering::Less) | Some(Ordering::Equal))
        }
        FilterOperator::GreaterThan => ordering == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater) | Some(Ordering::Equal))
        }
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(values) => values
                .iter()
                .any(|candidate| compare_values(candidate, filter.value()) == Some(Ordering::Equal)),
            _ => false,
        },
    }
}

fn find_field<'a>(data: &'a FieldMap, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        match current.kind() {
            ValueKind::Map(child) => current = child.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn compare_snapshots(left: &DocumentSnapshot, right: &DocumentSnapshot, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left_value = left.data().and_then(|data| find_field(data, order.field()));
        let right_value = right.data().and_then(|data| find_field(data, order.field()));
        let mut ordering = match (left_value, right_value) {
            (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.key().cmp(right.key())
}

fn compare_values(left: &FieldValue, right: &FieldValue) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => Some(a.cmp(b)),
        (ValueKind::Array(_), ValueKind::Array(_)) | (ValueKind::Map(_), ValueKind::Map(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}
