//! Decoding of store-returned metadata documents.
//!
//! The store reports index keys, validators and time-series options as raw
//! documents whose numeric values may arrive as int, long or double, and
//! whose index keys may use non-directional markers such as `"2dsphere"`.
//! Nothing here fails a read because of an unexpected value kind: entries
//! that cannot be represented are skipped and reported as [`Warning`]s.

use crate::error::Result;
use crate::resource::{Granularity, IndexKey, TimeSeries, ValidationAction, ValidationLevel};
use crate::Error;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary used for index keys whose order is not a number.
pub const NON_NUMERIC_KEY_ORDER: &str = "non-numeric index key order";

/// A non-fatal condition found while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
}

impl Warning {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            field: None,
            detail: detail.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.detail)
    }
}

/// Name of a BSON value's kind, as the store's `$type` spells it.
pub fn kind_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Binary(_) => "binData",
        Bson::RegularExpression(_) => "regex",
        Bson::Timestamp(_) => "timestamp",
        _ => "other",
    }
}

/// Coerce an int, long or finite double to i64.
pub fn coerce_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        // 1.0 / -1.0 come back as doubles from some drivers
        Bson::Double(v) if v.is_finite() => Some(*v as i64),
        _ => None,
    }
}

/// Read a flag that older servers may have stored as a number.
pub fn coerce_bool(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        other => coerce_i64(other).map(|n| n != 0),
    }
}

/// Decode an index key document into ordered `(field, direction)` pairs.
///
/// Order of entries is the compound index's field precedence and is kept
/// exactly as the store reports it.
pub fn decode_key_order(keys: &Document) -> (Vec<IndexKey>, Vec<Warning>) {
    let mut decoded = Vec::with_capacity(keys.len());
    let mut warnings = Vec::new();

    for (field, value) in keys {
        match coerce_i64(value) {
            Some(order) => decoded.push(IndexKey::new(field.clone(), order)),
            None => {
                tracing::warn!(field = %field, kind = kind_name(value), "skipping non-numeric index key");
                warnings.push(
                    Warning::new(
                        NON_NUMERIC_KEY_ORDER,
                        format!(
                            "field {field:?} has unsupported type {} (value {value}), skipping",
                            kind_name(value)
                        ),
                    )
                    .with_field(field.clone()),
                );
            }
        }
    }

    (decoded, warnings)
}

/// Build the ordered key document sent to the store.
pub fn encode_key_order(keys: &[IndexKey]) -> Document {
    let mut doc = Document::new();
    for key in keys {
        doc.insert(key.field.clone(), direction(key.order));
    }
    doc
}

fn direction(order: i64) -> Bson {
    match i32::try_from(order) {
        Ok(v) => Bson::Int32(v),
        Err(_) => Bson::Int64(order),
    }
}

// ============================================================================
// Extended JSON
// ============================================================================

/// Parse extended-JSON text (canonical or relaxed) into a document.
pub fn parse_document(field: &str, text: &str) -> Result<Document> {
    let invalid = |reason: String| Error::InvalidExtendedJson {
        field: field.to_string(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    match Bson::try_from(value).map_err(|e| invalid(e.to_string()))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(invalid(format!("expected an object, got {}", kind_name(&other)))),
    }
}

/// Render a document as canonical, compact extended-JSON.
///
/// Key order is preserved, so canonical compact input renders back to the
/// same bytes.
pub fn render_document(doc: &Document) -> String {
    Bson::Document(doc.clone())
        .into_canonical_extjson()
        .to_string()
}

/// Whether `text` parses to a document equal to `observed`.
pub fn same_document(text: &str, observed: &Document) -> bool {
    parse_document("document", text)
        .map(|doc| &doc == observed)
        .unwrap_or(false)
}

/// Compare two optional extended-JSON texts by meaning where possible.
///
/// Texts that both parse are compared as documents; otherwise the raw text
/// decides.
pub fn equivalent_text(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            match (parse_document("a", a), parse_document("b", b)) {
                (Ok(a), Ok(b)) => a == b,
                _ => a == b,
            }
        }
        _ => false,
    }
}

/// Pick the text to record for a document the store reported.
///
/// Keeps the host's text when it means the same thing, so formatting alone
/// never shows up as drift.
pub fn reconcile_text(recorded: Option<&str>, observed: Option<&Document>) -> Option<String> {
    match (recorded, observed) {
        (_, None) => None,
        (Some(text), Some(doc)) if same_document(text, doc) => Some(text.to_string()),
        (_, Some(doc)) => Some(render_document(doc)),
    }
}

// ============================================================================
// Collection options
// ============================================================================

/// Validation settings decoded from a collection's options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatorSettings {
    /// The validator document, as a host would write it.
    pub validator: Option<Document>,
    pub level: ValidationLevel,
    pub action: ValidationAction,
}

impl ValidatorSettings {
    /// Canonical extended-JSON text of the validator.
    pub fn validator_text(&self) -> Option<String> {
        self.validator.as_ref().map(render_document)
    }
}

/// Decode validator, validation level and validation action.
///
/// A `{"$jsonSchema": body}` wrapper is unwrapped to `body`. Missing
/// sub-fields decode to `None` or the store default, never to an error.
pub fn decode_validator(options: &Document) -> (ValidatorSettings, Vec<Warning>) {
    let mut settings = ValidatorSettings::default();
    let mut warnings = Vec::new();

    match options.get("validator") {
        Some(Bson::Document(doc)) if doc.is_empty() => {}
        Some(Bson::Document(doc)) => settings.validator = Some(unwrap_json_schema(doc)),
        Some(other) => warnings.push(
            Warning::new(
                "unexpected validator",
                format!("validator has type {}, ignoring", kind_name(other)),
            )
            .with_field("validator"),
        ),
        None => {}
    }

    if let Some(Bson::String(level)) = options.get("validationLevel") {
        match level.parse::<ValidationLevel>() {
            Ok(level) => settings.level = level,
            Err(e) => warnings.push(Warning::new("unknown validation level", e.to_string())),
        }
    }

    if let Some(Bson::String(action)) = options.get("validationAction") {
        match action.parse::<ValidationAction>() {
            Ok(action) => settings.action = action,
            Err(e) => warnings.push(Warning::new("unknown validation action", e.to_string())),
        }
    }

    (settings, warnings)
}

fn unwrap_json_schema(validator: &Document) -> Document {
    if validator.len() == 1 {
        if let Ok(body) = validator.get_document("$jsonSchema") {
            return body.clone();
        }
    }
    validator.clone()
}

/// Wrap a validator body for the store.
pub fn wrap_json_schema(body: Document) -> Document {
    let mut wrapper = Document::new();
    wrapper.insert("$jsonSchema", body);
    wrapper
}

/// Decode the time-series sub-document of a collection's options.
///
/// Optional sub-fields the store does not report decode to `None`.
pub fn decode_time_series(options: &Document) -> (Option<TimeSeries>, Vec<Warning>) {
    let mut warnings = Vec::new();

    let Ok(ts) = options.get_document("timeseries") else {
        return (None, warnings);
    };

    let time_field = match ts.get_str("timeField") {
        Ok(field) => field.to_string(),
        Err(_) => {
            warnings.push(
                Warning::new("missing time field", "time-series options carry no timeField")
                    .with_field("timeSeries.timeField"),
            );
            String::new()
        }
    };

    let mut decoded = TimeSeries::new(time_field);
    decoded.meta_field = ts.get_str("metaField").ok().map(str::to_string);
    decoded.granularity = match ts.get_str("granularity") {
        Ok(raw) => match raw.parse::<Granularity>() {
            Ok(g) => Some(g),
            Err(e) => {
                warnings.push(Warning::new("unknown granularity", e.to_string()));
                None
            }
        },
        Err(_) => None,
    };
    decoded.bucket_max_span_seconds = ts.get("bucketMaxSpanSeconds").and_then(coerce_i64);
    decoded.bucket_rounding_seconds = ts.get("bucketRoundingSeconds").and_then(coerce_i64);
    decoded.expire_after_seconds = options.get("expireAfterSeconds").and_then(coerce_i64);

    (Some(decoded), warnings)
}

// ============================================================================
// Index specifications
// ============================================================================

/// An index specification as reported by `listIndexes`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedIndex {
    pub name: Option<String>,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
    pub sparse: bool,
    pub ttl_seconds: Option<i64>,
    pub partial_filter_expression: Option<Document>,
    pub background: Option<bool>,
    pub warnings: Vec<Warning>,
}

/// Decode one index specification document.
pub fn decode_index_spec(spec: &Document) -> DecodedIndex {
    let mut decoded = DecodedIndex {
        name: spec.get_str("name").ok().map(str::to_string),
        unique: spec.get("unique").and_then(coerce_bool).unwrap_or(false),
        sparse: spec.get("sparse").and_then(coerce_bool).unwrap_or(false),
        ttl_seconds: spec.get("expireAfterSeconds").and_then(coerce_i64),
        partial_filter_expression: spec.get_document("partialFilterExpression").ok().cloned(),
        background: spec.get("background").and_then(coerce_bool),
        ..DecodedIndex::default()
    };

    match spec.get_document("key") {
        Ok(keys) => {
            let (keys, warnings) = decode_key_order(keys);
            decoded.keys = keys;
            decoded.warnings = warnings;
        }
        Err(_) => decoded.warnings.push(
            Warning::new("missing index keys", "index specification has no key document")
                .with_field("keys"),
        ),
    }

    decoded
}

/// Find an index specification by name.
pub fn find_index<'a>(specs: &'a [Document], name: &str) -> Option<&'a Document> {
    specs
        .iter()
        .find(|spec| spec.get_str("name").map(|n| n == name).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn key_order_is_preserved() {
        let (keys, warnings) = decode_key_order(&doc! { "a": 1, "b": -1 });
        assert_eq!(keys, vec![IndexKey::new("a", 1), IndexKey::new("b", -1)]);
        assert!(warnings.is_empty());

        let (keys, _) = decode_key_order(&doc! { "z": 1, "a": -1, "m": 1 });
        let fields: Vec<_> = keys.iter().map(|k| k.field.as_str()).collect();
        assert_eq!(fields, vec!["z", "a", "m"]);
    }

    #[test]
    fn non_numeric_keys_are_skipped_with_warning() {
        let (keys, warnings) = decode_key_order(&doc! { "a": 1, "loc": "2dsphere" });
        assert_eq!(keys, vec![IndexKey::new("a", 1)]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].summary, NON_NUMERIC_KEY_ORDER);
        assert_eq!(warnings[0].field.as_deref(), Some("loc"));
        assert!(warnings[0].detail.contains("string"));
    }

    #[test]
    fn numeric_encodings_are_coerced() {
        let (keys, _) = decode_key_order(&doc! { "x": 1.0 });
        assert_eq!(keys, vec![IndexKey::new("x", 1)]);

        let (keys, _) = decode_key_order(&doc! { "a": 1_i64, "b": -1.0, "c": -1_i32 });
        assert_eq!(
            keys,
            vec![
                IndexKey::new("a", 1),
                IndexKey::new("b", -1),
                IndexKey::new("c", -1)
            ]
        );

        assert_eq!(coerce_i64(&Bson::Double(f64::NAN)), None);
    }

    #[test]
    fn key_document_encoding_keeps_order() {
        let keys = vec![IndexKey::new("email", 1), IndexKey::new("created", -1)];
        let doc = encode_key_order(&keys);
        let fields: Vec<_> = doc.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["email", "created"]);
        assert_eq!(doc.get("email"), Some(&Bson::Int32(1)));
    }

    #[test]
    fn canonical_text_round_trips_byte_identical() {
        let text = r#"{"bsonType":"object","required":["createdAt"],"properties":{"createdAt":{"bsonType":"date"},"count":{"minimum":{"$numberLong":"10"}},"ref":{"enum":[{"$oid":"5f1d7e3b2c8b4a0012345678"}]}}}"#;
        let body = parse_document("validator", text).unwrap();
        let options = doc! { "validator": wrap_json_schema(body) };

        let (settings, warnings) = decode_validator(&options);
        assert!(warnings.is_empty());
        assert_eq!(settings.validator_text().as_deref(), Some(text));

        // rendering is idempotent
        let again = parse_document("validator", &settings.validator_text().unwrap()).unwrap();
        assert_eq!(render_document(&again), text);
    }

    #[test]
    fn relaxed_input_is_accepted() {
        let doc = parse_document("filter", r#"{"age": {"$gt": 21}}"#).unwrap();
        assert_eq!(doc, doc! { "age": { "$gt": 21 } });
    }

    #[test]
    fn malformed_text_is_rejected() {
        let err = parse_document("validator", "{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidExtendedJson { ref field, .. } if field == "validator"));

        let err = parse_document("validator", "[1, 2]").unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn validator_absence_decodes_to_defaults() {
        let (settings, warnings) = decode_validator(&Document::new());
        assert_eq!(settings, ValidatorSettings::default());
        assert!(warnings.is_empty());

        let (settings, _) = decode_validator(&doc! {
            "validationLevel": "moderate",
            "validationAction": "warn",
        });
        assert!(settings.validator.is_none());
        assert_eq!(settings.level, ValidationLevel::Moderate);
        assert_eq!(settings.action, ValidationAction::Warn);
    }

    #[test]
    fn query_validators_are_not_unwrapped() {
        let options = doc! { "validator": { "age": { "$gte": 0 } } };
        let (settings, _) = decode_validator(&options);
        assert_eq!(settings.validator, Some(doc! { "age": { "$gte": 0 } }));
    }

    #[test]
    fn time_series_missing_fields_are_none() {
        let options = doc! { "timeseries": { "timeField": "ts" } };
        let (ts, warnings) = decode_time_series(&options);
        let ts = ts.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ts.time_field, "ts");
        assert_eq!(ts.meta_field, None);
        assert_eq!(ts.granularity, None);
        assert_eq!(ts.bucket_max_span_seconds, None);
        assert_eq!(ts.expire_after_seconds, None);

        let options = doc! {
            "timeseries": {
                "timeField": "ts",
                "metaField": "sensor",
                "granularity": "minutes",
                "bucketMaxSpanSeconds": 86400,
            },
            "expireAfterSeconds": 3600_i64,
        };
        let (ts, _) = decode_time_series(&options);
        let ts = ts.unwrap();
        assert_eq!(ts.meta_field.as_deref(), Some("sensor"));
        assert_eq!(ts.granularity, Some(Granularity::Minutes));
        assert_eq!(ts.bucket_max_span_seconds, Some(86400));
        assert_eq!(ts.expire_after_seconds, Some(3600));

        assert_eq!(decode_time_series(&Document::new()).0, None);
    }

    #[test]
    fn index_spec_decoding() {
        let spec = doc! {
            "v": 2,
            "key": { "email": 1, "loc": "2dsphere" },
            "name": "email_loc",
            "unique": true,
            "expireAfterSeconds": 60,
            "partialFilterExpression": { "active": true },
        };
        let decoded = decode_index_spec(&spec);
        assert_eq!(decoded.name.as_deref(), Some("email_loc"));
        assert_eq!(decoded.keys, vec![IndexKey::new("email", 1)]);
        assert!(decoded.unique);
        assert!(!decoded.sparse);
        assert_eq!(decoded.ttl_seconds, Some(60));
        assert_eq!(decoded.partial_filter_expression, Some(doc! { "active": true }));
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn recorded_text_survives_equal_reads() {
        let observed = doc! { "active": true };
        assert_eq!(
            reconcile_text(Some(r#"{ "active" : true }"#), Some(&observed)).as_deref(),
            Some(r#"{ "active" : true }"#)
        );
        assert_eq!(
            reconcile_text(Some(r#"{"active":false}"#), Some(&observed)).as_deref(),
            Some(r#"{"active":true}"#)
        );
        assert_eq!(reconcile_text(Some("{}"), None), None);
    }

    #[test]
    fn equivalence_ignores_formatting() {
        assert!(equivalent_text(Some(r#"{"a":1}"#), Some(r#"{ "a": 1 }"#)));
        assert!(!equivalent_text(Some(r#"{"a":1}"#), Some(r#"{"a":2}"#)));
        assert!(!equivalent_text(Some(r#"{"a":1}"#), None));
        assert!(equivalent_text(None, None));
    }
}
