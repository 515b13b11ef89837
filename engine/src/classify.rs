//! Field-level change classification.
//!
//! Given a desired and a recorded model, decide for every attribute whether
//! the difference is irrelevant, can be applied in place, or forces the
//! object to be destroyed and recreated. The store enforces these
//! immutabilities itself; classifying first means the engine never issues
//! an update the store would reject.
//!
//! | Resource   | Field                                          | On change     |
//! |------------|------------------------------------------------|---------------|
//! | Database   | name                                           | Replace       |
//! | Database   | keepPlaceholder                                | UpdateInPlace |
//! | Collection | database, name, timeSeries.*                   | Replace       |
//! | Collection | validator, validationLevel, validationAction   | UpdateInPlace |
//! | Index      | every attribute                                | Replace       |
//!
//! Time-series granularity and bucket sizes are defaulted by the store when
//! not given, so an unset desired value matches any recorded one.

use crate::decode::equivalent_text;
use crate::resource::{CollectionResource, DatabaseResource, IndexResource, ResourceKind};
use serde::{Deserialize, Serialize};

/// Outcome for one attribute. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Unchanged,
    UpdateInPlace,
    Replace,
}

/// The verdict a change to `field` of `kind` receives.
///
/// Attributes not listed as mutable are treated as immutable.
pub fn policy(kind: ResourceKind, field: &str) -> Verdict {
    match (kind, field) {
        (ResourceKind::Database, "keepPlaceholder") => Verdict::UpdateInPlace,
        (ResourceKind::Collection, "validator" | "validationLevel" | "validationAction") => {
            Verdict::UpdateInPlace
        }
        _ => Verdict::Replace,
    }
}

/// Verdict for one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub verdict: Verdict,
}

/// Per-field verdicts for one desired/recorded pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub kind: Option<ResourceKind>,
    pub changes: Vec<FieldChange>,
}

impl ChangeSet {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind: Some(kind),
            changes: Vec::new(),
        }
    }

    fn record(&mut self, field: &str, changed: bool) {
        let verdict = match (changed, self.kind) {
            (false, _) => Verdict::Unchanged,
            (true, Some(kind)) => policy(kind, field),
            (true, None) => Verdict::Replace,
        };
        self.changes.push(FieldChange {
            field: field.to_string(),
            verdict,
        });
    }

    /// Verdict for a field. A parent such as `timeSeries` takes the most
    /// severe verdict of its sub-fields.
    pub fn verdict(&self, field: &str) -> Verdict {
        let nested = format!("{field}.");
        self.changes
            .iter()
            .filter(|c| c.field == field || c.field.starts_with(&nested))
            .map(|c| c.verdict)
            .max()
            .unwrap_or(Verdict::Unchanged)
    }

    /// The most severe verdict across all fields.
    pub fn overall(&self) -> Verdict {
        self.changes
            .iter()
            .map(|c| c.verdict)
            .max()
            .unwrap_or(Verdict::Unchanged)
    }

    pub fn is_unchanged(&self) -> bool {
        self.overall() == Verdict::Unchanged
    }

    pub fn requires_replace(&self) -> bool {
        self.overall() == Verdict::Replace
    }

    /// Fields whose change forces a replace.
    pub fn replace_fields(&self) -> Vec<String> {
        self.fields_with(Verdict::Replace)
    }

    /// Fields that changed and can be updated in place.
    pub fn in_place_fields(&self) -> Vec<String> {
        self.fields_with(Verdict::UpdateInPlace)
    }

    /// Whether a field changed at all.
    pub fn is_changed(&self, field: &str) -> bool {
        self.verdict(field) != Verdict::Unchanged
    }

    fn fields_with(&self, verdict: Verdict) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.verdict == verdict)
            .map(|c| c.field.clone())
            .collect()
    }
}

/// Compare a desired model against the recorded one.
pub trait Classify {
    fn classify(&self, recorded: &Self) -> ChangeSet;
}

impl Classify for DatabaseResource {
    fn classify(&self, recorded: &Self) -> ChangeSet {
        let mut changes = ChangeSet::new(ResourceKind::Database);
        changes.record("name", self.name != recorded.name);
        changes.record(
            "keepPlaceholder",
            self.keep_placeholder != recorded.keep_placeholder,
        );
        changes
    }
}

impl Classify for CollectionResource {
    fn classify(&self, recorded: &Self) -> ChangeSet {
        let mut changes = ChangeSet::new(ResourceKind::Collection);
        changes.record("database", self.database != recorded.database);
        changes.record("name", self.name != recorded.name);
        changes.record(
            "validator",
            !equivalent_text(self.validator_text(), recorded.validator_text()),
        );
        changes.record(
            "validationLevel",
            self.validation_level != recorded.validation_level,
        );
        changes.record(
            "validationAction",
            self.validation_action != recorded.validation_action,
        );

        match (&self.time_series, &recorded.time_series) {
            (Some(desired), Some(recorded)) => {
                changes.record("timeSeries.timeField", desired.time_field != recorded.time_field);
                changes.record("timeSeries.metaField", desired.meta_field != recorded.meta_field);
                changes.record(
                    "timeSeries.granularity",
                    overrides(&desired.granularity, &recorded.granularity),
                );
                changes.record(
                    "timeSeries.bucketMaxSpanSeconds",
                    overrides(
                        &desired.bucket_max_span_seconds,
                        &recorded.bucket_max_span_seconds,
                    ),
                );
                changes.record(
                    "timeSeries.bucketRoundingSeconds",
                    overrides(
                        &desired.bucket_rounding_seconds,
                        &recorded.bucket_rounding_seconds,
                    ),
                );
                changes.record(
                    "timeSeries.expireAfterSeconds",
                    desired.expire_after_seconds != recorded.expire_after_seconds,
                );
            }
            (desired, recorded) => {
                changes.record("timeSeries", desired.is_some() != recorded.is_some());
            }
        }

        changes
    }
}

/// Whether a desired setting the store fills in by default differs from
/// what was recorded. Unset means "whatever the store chose".
fn overrides<T: PartialEq>(desired: &Option<T>, recorded: &Option<T>) -> bool {
    desired.is_some() && desired != recorded
}

impl Classify for IndexResource {
    fn classify(&self, recorded: &Self) -> ChangeSet {
        let mut changes = ChangeSet::new(ResourceKind::Index);
        changes.record("database", self.database != recorded.database);
        changes.record("collection", self.collection != recorded.collection);
        changes.record("name", self.name != recorded.name);
        changes.record("keys", self.keys != recorded.keys);
        changes.record("unique", self.unique != recorded.unique);
        changes.record("sparse", self.sparse != recorded.sparse);
        changes.record("ttlSeconds", self.ttl_seconds != recorded.ttl_seconds);
        changes.record(
            "partialFilterExpression",
            !equivalent_text(self.partial_filter_text(), recorded.partial_filter_text()),
        );
        changes.record("background", self.background != recorded.background);
        changes
    }
}
