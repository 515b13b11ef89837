//! Managed resource models.
//!
//! These are the records the host hands to a driver (desired state) and
//! gets back from it (recorded state). Field names serialize in camelCase,
//! which is also the attribute naming used by the change classifier.

use crate::classify::Classify;
use crate::error::Result;
use crate::identity::{self, Shape};
use crate::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the marker collection that keeps an otherwise empty database alive.
pub const PLACEHOLDER_COLLECTION: &str = "__tf_placeholder";

/// The three kinds of managed objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Database,
    Collection,
    Index,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Database => write!(f, "database"),
            ResourceKind::Collection => write!(f, "collection"),
            ResourceKind::Index => write!(f, "index"),
        }
    }
}

/// Behaviour shared by every managed model.
pub trait Resource:
    Classify + Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: ResourceKind;

    /// The identity string naming this instance.
    fn identity(&self) -> String;

    /// Seed a recorded state from an import identity. Fields the identity
    /// does not carry take their defaults until the next read.
    fn from_identity(id: &str) -> Result<Self>;
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResource {
    pub name: String,
    #[serde(default = "default_true")]
    pub keep_placeholder: bool,
}

impl DatabaseResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keep_placeholder: true,
        }
    }

    pub fn with_placeholder(mut self, keep: bool) -> Self {
        self.keep_placeholder = keep;
        self
    }
}

impl Resource for DatabaseResource {
    const KIND: ResourceKind = ResourceKind::Database;

    fn identity(&self) -> String {
        identity::encode(&[&self.name])
    }

    fn from_identity(id: &str) -> Result<Self> {
        let mut parts = identity::decode(id, Shape::Database)?.into_iter();
        let name = parts.next().unwrap_or_default();
        Ok(Self::new(name))
    }
}

// ============================================================================
// Collection
// ============================================================================

/// How strictly the validator is applied to existing documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Off,
    #[default]
    Strict,
    Moderate,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

impl FromStr for ValidationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(ValidationLevel::Off),
            "strict" => Ok(ValidationLevel::Strict),
            "moderate" => Ok(ValidationLevel::Moderate),
            other => Err(Error::validation(
                "validationLevel",
                format!("expected one of off, strict, moderate, got {other:?}"),
            )),
        }
    }
}

/// What the store does with a document that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAction {
    #[default]
    Error,
    Warn,
}

impl ValidationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationAction::Error => "error",
            ValidationAction::Warn => "warn",
        }
    }
}

impl FromStr for ValidationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "error" => Ok(ValidationAction::Error),
            "warn" => Ok(ValidationAction::Warn),
            other => Err(Error::validation(
                "validationAction",
                format!("expected one of error, warn, got {other:?}"),
            )),
        }
    }
}

/// Bucketing granularity of a time-series collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Seconds,
    Minutes,
    Hours,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Seconds => "seconds",
            Granularity::Minutes => "minutes",
            Granularity::Hours => "hours",
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seconds" => Ok(Granularity::Seconds),
            "minutes" => Ok(Granularity::Minutes),
            "hours" => Ok(Granularity::Hours),
            other => Err(Error::validation(
                "timeSeries.granularity",
                format!("expected one of seconds, minutes, hours, got {other:?}"),
            )),
        }
    }
}

/// Time-series options. Fixed once the collection exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub time_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_max_span_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_rounding_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<i64>,
}

impl TimeSeries {
    pub fn new(time_field: impl Into<String>) -> Self {
        Self {
            time_field: time_field.into(),
            meta_field: None,
            granularity: None,
            bucket_max_span_seconds: None,
            bucket_rounding_seconds: None,
            expire_after_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResource {
    pub database: String,
    pub name: String,
    /// Extended-JSON body of the `$jsonSchema` validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default)]
    pub validation_level: ValidationLevel,
    #[serde(default)]
    pub validation_action: ValidationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<TimeSeries>,
}

impl CollectionResource {
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            validator: None,
            validation_level: ValidationLevel::default(),
            validation_action: ValidationAction::default(),
            time_series: None,
        }
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn with_time_series(mut self, time_series: TimeSeries) -> Self {
        self.time_series = Some(time_series);
        self
    }

    /// The validator text, treating an empty string as unset.
    pub fn validator_text(&self) -> Option<&str> {
        self.validator.as_deref().filter(|v| !v.trim().is_empty())
    }
}

impl Resource for CollectionResource {
    const KIND: ResourceKind = ResourceKind::Collection;

    fn identity(&self) -> String {
        identity::encode(&[&self.database, &self.name])
    }

    fn from_identity(id: &str) -> Result<Self> {
        let mut parts = identity::decode(id, Shape::Collection)?.into_iter();
        let database = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        Ok(Self::new(database, name))
    }
}

// ============================================================================
// Index
// ============================================================================

/// One component of a compound index key, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexKey {
    pub field: String,
    pub order: i64,
}

impl IndexKey {
    pub fn new(field: impl Into<String>, order: i64) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResource {
    pub database: String,
    pub collection: String,
    pub name: String,
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_filter_expression: Option<String>,
    /// Deprecated by the store since 4.2; still sent when set.
    #[serde(default = "default_true")]
    pub background: bool,
}

impl IndexResource {
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        name: impl Into<String>,
        keys: Vec<IndexKey>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            name: name.into(),
            keys,
            unique: false,
            sparse: false,
            ttl_seconds: None,
            partial_filter_expression: None,
            background: true,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_ttl(mut self, seconds: i64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    pub fn with_partial_filter(mut self, expression: impl Into<String>) -> Self {
        self.partial_filter_expression = Some(expression.into());
        self
    }

    /// The partial filter text, treating an empty string as unset.
    pub fn partial_filter_text(&self) -> Option<&str> {
        self.partial_filter_expression
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

impl Resource for IndexResource {
    const KIND: ResourceKind = ResourceKind::Index;

    fn identity(&self) -> String {
        identity::encode(&[&self.database, &self.collection, &self.name])
    }

    fn from_identity(id: &str) -> Result<Self> {
        let mut parts = identity::decode(id, Shape::Index)?.into_iter();
        let database = parts.next().unwrap_or_default();
        let collection = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        Ok(Self::new(database, collection, name, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let db: DatabaseResource = serde_json::from_value(json!({"name": "app"})).unwrap();
        assert!(db.keep_placeholder);

        let coll: CollectionResource =
            serde_json::from_value(json!({"database": "app", "name": "users"})).unwrap();
        assert_eq!(coll.validation_level, ValidationLevel::Strict);
        assert_eq!(coll.validation_action, ValidationAction::Error);
        assert!(coll.time_series.is_none());

        let idx: IndexResource = serde_json::from_value(json!({
            "database": "app",
            "collection": "users",
            "name": "users_email",
            "keys": [{"field": "email", "order": 1}]
        }))
        .unwrap();
        assert!(idx.background);
        assert!(!idx.unique);
        assert_eq!(idx.keys, vec![IndexKey::new("email", 1)]);
    }

    #[test]
    fn enums_use_store_spelling() {
        let coll = CollectionResource {
            validation_level: ValidationLevel::Moderate,
            validation_action: ValidationAction::Warn,
            ..CollectionResource::new("app", "users")
        };
        let value = serde_json::to_value(&coll).unwrap();
        assert_eq!(value["validationLevel"], "moderate");
        assert_eq!(value["validationAction"], "warn");

        assert_eq!("hours".parse::<Granularity>().unwrap(), Granularity::Hours);
        assert!("daily".parse::<Granularity>().is_err());
        assert!("loud".parse::<ValidationAction>().is_err());
    }

    #[test]
    fn import_seeds_identity_fields() {
        let idx = IndexResource::from_identity(" app/users/users_email ").unwrap();
        assert_eq!(idx.database, "app");
        assert_eq!(idx.collection, "users");
        assert_eq!(idx.name, "users_email");
        assert!(idx.keys.is_empty());

        let coll = CollectionResource::from_identity("app/users").unwrap();
        assert_eq!(coll.identity(), "app/users");

        assert!(DatabaseResource::from_identity("").is_err());
    }

    #[test]
    fn empty_validator_counts_as_unset() {
        let coll = CollectionResource::new("app", "users").with_validator("  ");
        assert_eq!(coll.validator_text(), None);
    }
}
