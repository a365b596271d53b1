// Firestore REST backend (documents:runQuery)
use super::{Direction, Document, DocumentStore, FieldValue, Filter, Query, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

pub struct FirestoreStore {
    client: reqwest::Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents:runQuery",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn run_query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut request = self
            .client
            .post(self.run_query_url())
            .json(&encode_query(query));
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message: String = message.chars().take(512).collect();
            return Err(match status.as_u16() {
                502..=504 => StoreError::Unavailable(format!("{status}: {message}")),
                code => StoreError::Rejected { status: code, message },
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_run_query_response(&body)
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}

pub(crate) fn encode_query(query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert("from".into(), json!([{ "collectionId": query.collection }]));

    let mut filters: Vec<Value> = query.filters.iter().map(encode_filter).collect();
    match filters.len() {
        0 => {}
        1 => {
            structured.insert("where".into(), filters.remove(0));
        }
        _ => {
            structured.insert(
                "where".into(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field }, "direction": direction }]),
        );
    }
    if let Some(limit) = query.limit {
        structured.insert("limit".into(), json!(limit));
    }
    json!({ "structuredQuery": Value::Object(structured) })
}

fn encode_filter(filter: &Filter) -> Value {
    let (field, op, value) = match filter {
        Filter::Eq(field, value) => (field, "EQUAL", encode_value(value)),
        Filter::In(field, values) => (
            field,
            "IN",
            json!({ "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() } }),
        ),
    };
    json!({ "fieldFilter": { "field": { "fieldPath": field }, "op": op, "value": value } })
}

pub(crate) fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        FieldValue::Integer(n) => json!({ "integerValue": n.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        FieldValue::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        FieldValue::Map(fields) => {
            let fields: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn decode_error(what: &str, raw: &Value) -> StoreError {
    StoreError::Decode(format!("{what}: {raw}"))
}

pub(crate) fn decode_value(raw: &Value) -> StoreResult<FieldValue> {
    let object = raw.as_object().ok_or_else(|| decode_error("value is not an object", raw))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| decode_error("empty value", raw))?;

    let value = match kind.as_str() {
        "nullValue" => FieldValue::Null,
        "booleanValue" => FieldValue::Bool(
            inner.as_bool().ok_or_else(|| decode_error("bad booleanValue", raw))?,
        ),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            FieldValue::Integer(parsed.ok_or_else(|| decode_error("bad integerValue", raw))?)
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<f64>().ok(),
                other => other.as_f64(),
            };
            FieldValue::Double(parsed.ok_or_else(|| decode_error("bad doubleValue", raw))?)
        }
        "stringValue" | "referenceValue" | "bytesValue" => FieldValue::String(
            inner
                .as_str()
                .ok_or_else(|| decode_error("bad string value", raw))?
                .to_string(),
        ),
        "timestampValue" => {
            let text = inner.as_str().ok_or_else(|| decode_error("bad timestampValue", raw))?;
            let parsed = DateTime::parse_from_rfc3339(text)
                .map_err(|_| decode_error("bad timestampValue", raw))?;
            FieldValue::Timestamp(parsed.with_timezone(&Utc))
        }
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<StoreResult<Vec<_>>>()?,
                // empty arrays come back without "values"
                None => Vec::new(),
                Some(_) => return Err(decode_error("bad arrayValue", raw)),
            };
            FieldValue::Array(values)
        }
        "mapValue" => FieldValue::Map(decode_fields(inner.get("fields"))?),
        "geoPointValue" => {
            let mut point = BTreeMap::new();
            for axis in ["latitude", "longitude"] {
                let v = inner.get(axis).and_then(Value::as_f64).unwrap_or_default();
                point.insert(axis.to_string(), FieldValue::Double(v));
            }
            FieldValue::Map(point)
        }
        _ => return Err(decode_error("unsupported value type", raw)),
    };
    Ok(value)
}

fn decode_fields(raw: Option<&Value>) -> StoreResult<BTreeMap<String, FieldValue>> {
    match raw {
        None => Ok(BTreeMap::new()),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
            .collect(),
        Some(other) => Err(decode_error("fields is not an object", other)),
    }
}

pub(crate) fn decode_document(raw: &Value) -> StoreResult<Document> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| decode_error("document without name", raw))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    Ok(Document {
        id,
        fields: decode_fields(raw.get("fields"))?,
    })
}

// runQuery streams back one item per result; items without "document" only carry readTime
fn decode_run_query_response(body: &Value) -> StoreResult<Vec<Document>> {
    let items = body
        .as_array()
        .ok_or_else(|| decode_error("runQuery response is not an array", body))?;
    items
        .iter()
        .filter_map(|item| item.get("document"))
        .map(decode_document)
        .collect()
}
