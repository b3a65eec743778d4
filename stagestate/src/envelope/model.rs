//! The per-run state envelope handed from stage to stage.

use super::status;
use crate::core::{Category, Reference};
use crate::errors::StateError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

fn default_status() -> String {
    status::INITIALIZED.to_string()
}

// Producers may write `null` for an empty map and for unset entries.
fn references_or_empty<'de, D>(deserializer: D) -> Result<HashMap<String, Reference>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<Reference>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, reference)| reference.map(|reference| (name, reference)))
        .collect())
}

fn status_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_status))
}

fn summary_or_empty<'de, D>(deserializer: D) -> Result<serde_json::Map<String, serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Named references, a status label and a free-form summary for one run.
///
/// Wire format:
///
/// ```json
/// {
///   "verificationId": "verif-123",
///   "s3References": {"processing_metadata": {"bucket": "state", "key": "...", "size": 7}},
///   "status": "INITIALIZED",
///   "summary": {}
/// }
/// ```
///
/// `s3References`, `status` and `summary` may be absent or `null`; null
/// entries inside `s3References` are dropped.
///
/// `Clone` is a deep copy: references and summary values are owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "verificationId")]
    run_id: String,
    #[serde(rename = "s3References", default, deserialize_with = "references_or_empty")]
    references: HashMap<String, Reference>,
    #[serde(default = "default_status", deserialize_with = "status_or_default")]
    status: String,
    #[serde(default, deserialize_with = "summary_or_empty")]
    summary: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// Creates an empty envelope for a run with status `INITIALIZED`.
    pub fn new(run_id: impl Into<String>) -> Result<Self, StateError> {
        let run_id = run_id.into();
        if run_id.is_empty() {
            return Err(StateError::validation("new_envelope", "run id is required"));
        }
        Ok(Self {
            run_id,
            references: HashMap::new(),
            status: default_status(),
            summary: serde_json::Map::new(),
        })
    }

    /// Generates a fresh run identifier of the form `verif-<uuid>`.
    #[must_use]
    pub fn generate_run_id() -> String {
        format!("verif-{}", Uuid::new_v4().simple())
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Adds or replaces a named reference.
    pub fn add_reference(&mut self, name: impl Into<String>, reference: Reference) {
        self.references.insert(name.into(), reference);
    }

    /// Returns a reference by name.
    #[must_use]
    pub fn get_reference(&self, name: &str) -> Option<&Reference> {
        self.references.get(name)
    }

    /// Returns true if a reference with this name exists.
    #[must_use]
    pub fn has_reference(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    /// All named references.
    #[must_use]
    pub const fn references(&self) -> &HashMap<String, Reference> {
        &self.references
    }

    /// Replaces every reference at once.
    pub fn set_references(&mut self, references: HashMap<String, Reference>) {
        self.references = references;
    }

    /// Updates the status label.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// The status label.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Sets one summary entry.
    pub fn add_summary(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.summary.insert(key.into(), value);
    }

    /// Returns one summary entry.
    #[must_use]
    pub fn get_summary(&self, key: &str) -> Option<&serde_json::Value> {
        self.summary.get(key)
    }

    /// Merges entries into the summary, overwriting existing keys.
    pub fn merge_summary(&mut self, entries: serde_json::Map<String, serde_json::Value>) {
        self.summary.extend(entries);
    }

    /// The whole summary map.
    #[must_use]
    pub const fn summary(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.summary
    }

    /// Distinct categories of all references whose path is a well-formed key.
    #[must_use]
    pub fn list_categories(&self) -> BTreeSet<Category> {
        self.references
            .values()
            .filter_map(Reference::category)
            .collect()
    }

    /// The references stored under one category.
    #[must_use]
    pub fn references_by_category(&self, category: Category) -> HashMap<String, Reference> {
        self.references
            .iter()
            .filter(|(_, reference)| reference.category() == Some(category))
            .map(|(name, reference)| (name.clone(), reference.clone()))
            .collect()
    }

    /// Checks the run id and every contained reference.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.run_id.is_empty() {
            return Err(StateError::validation("validate_envelope", "run id is required"));
        }
        let mut names: Vec<&String> = self.references.keys().collect();
        names.sort();
        for name in names {
            if !self.references[name].is_valid() {
                return Err(StateError::validation(
                    "validate_envelope",
                    format!("invalid reference '{name}': missing bucket or key"),
                ));
            }
        }
        Ok(())
    }

    /// Serializes to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec(self).map_err(|e| StateError::internal("serialize_envelope", e.to_string()))
    }

    /// Deserializes from JSON bytes without validating.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        serde_json::from_slice(bytes)
            .map_err(|e| StateError::deserialization("deserialize_envelope", e.to_string()))
    }

    /// Decodes an orchestrator payload and validates it.
    ///
    /// This is the one place an untrusted envelope enters the crate.
    pub fn load(input: &serde_json::Value) -> Result<Self, StateError> {
        let envelope: Self = serde_json::from_value(input.clone())
            .map_err(|e| StateError::deserialization("load_envelope", e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Like [`Self::load`], from raw bytes.
    pub fn load_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let envelope = Self::from_bytes(bytes)?;
        envelope.validate()?;
        Ok(envelope)
    }
}
