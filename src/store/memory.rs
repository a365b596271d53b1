use super::{Direction, Document, DocumentStore, FieldValue, Query, StoreError, StoreResult};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // fixtures: { "<collection>": [ { "id": "...", ... } ] }
    pub fn from_json(value: &serde_json::Value) -> anyhow::Result<Self> {
        let store = Self::new();
        let collections = value
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("seed file must be a JSON object of collections"))?;
        for (name, docs) in collections {
            let docs = docs
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("collection {name} must be an array"))?;
            for (index, raw) in docs.iter().enumerate() {
                let object = raw
                    .as_object()
                    .ok_or_else(|| anyhow::anyhow!("{name}[{index}] must be an object"))?;
                let id = object
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| anyhow::anyhow!("{name}[{index}] is missing a string id"))?;
                let fields = object
                    .iter()
                    .filter(|(key, _)| key.as_str() != "id")
                    .map(|(key, value)| (key.clone(), json_to_field(value)))
                    .collect();
                store.insert(
                    name,
                    Document {
                        id: id.to_string(),
                        fields,
                    },
                );
            }
        }
        Ok(store)
    }

    pub fn insert(&self, collection: &str, doc: Document) {
        let mut guard = match self.collections.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let docs = guard.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::Relaxed);
    }
}

fn json_to_field(value: &serde_json::Value) -> FieldValue {
    match value {
        serde_json::Value::Null => FieldValue::Null,
        serde_json::Value::Bool(b) => FieldValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Double(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => FieldValue::String(s.clone()),
        serde_json::Value::Array(items) => FieldValue::Array(items.iter().map(json_to_field).collect()),
        serde_json::Value::Object(map) => FieldValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_field(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

fn rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Null => 0,
        FieldValue::Bool(_) => 1,
        FieldValue::Integer(_) | FieldValue::Double(_) => 2,
        FieldValue::Timestamp(_) => 3,
        FieldValue::String(_) => 4,
        FieldValue::Array(_) => 5,
        FieldValue::Map(_) => 6,
    }
}

// Cross-type ordering follows type rank, then value within a type
fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(y),
        (FieldValue::Integer(x), FieldValue::Double(y)) => (*x as f64).total_cmp(y),
        (FieldValue::Double(x), FieldValue::Integer(y)) => x.total_cmp(&(*y as f64)),
        (FieldValue::Double(x), FieldValue::Double(y)) => x.total_cmp(y),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => x.cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// Documents missing the sort field sort last in both directions
fn compare_docs(a: &Document, b: &Document, field: &str, direction: Direction) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => match direction {
            Direction::Ascending => compare_values(x, y),
            Direction::Descending => compare_values(y, x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn run_query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        if self.unavailable.load(AtomicOrdering::Relaxed) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        let guard = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))?;
        let mut docs: Vec<Document> = guard
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| query.filters.iter().all(|f| f.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(guard);

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| compare_docs(a, b, field, *direction));
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
