// crates/governance-core/src/core/schema.rs
// ============================================================================
// Module: Class Schema Registry
// Description: Per-class JSON Schema validation for artifact payloads.
// Purpose: Validate payloads once at ingest against a fixed schema registry.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Each artifact class carries a fixed payload schema, keyed by
//! `(class, schema_version)` and compiled once at startup. Validation happens
//! exactly once, at proposal ingest; failures surface as `SCHEMA_VIOLATION`
//! with JSON pointer paths. Schemas are intentionally permissive about
//! additional properties so producers can evolve payloads without a registry
//! release, but every class's required skeleton is enforced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use jsonschema::Validator;
use serde_json::Value;
use serde_json::json;

use crate::core::artifact::ArtifactClass;
use crate::core::error::GovernanceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current schema version for every class.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// SECTION: Schema Registry
// ============================================================================

/// Compiled per-class payload validators.
///
/// # Invariants
/// - Every [`ArtifactClass`] has exactly one validator at [`SCHEMA_VERSION`].
pub struct SchemaRegistry {
    /// Compiled validators keyed by class and schema version.
    validators: BTreeMap<(ArtifactClass, u32), Validator>,
}

impl SchemaRegistry {
    /// Builds the registry, compiling every class schema.
    ///
    /// # Errors
    ///
    /// Returns a `SCHEMA_VIOLATION` [`GovernanceError`] when a schema fails to
    /// compile; this indicates a programming error in the embedded schemas.
    pub fn new() -> Result<Self, GovernanceError> {
        let mut validators = BTreeMap::new();
        for class in ArtifactClass::ALL {
            let schema = class_schema(class);
            let validator = jsonschema::validator_for(&schema).map_err(|err| {
                GovernanceError::schema_violation(format!(
                    "schema for class {class} failed to compile: {err}"
                ))
            })?;
            validators.insert((class, SCHEMA_VERSION), validator);
        }
        Ok(Self {
            validators,
        })
    }

    /// Validates a payload against its class schema.
    ///
    /// # Errors
    ///
    /// Returns a `SCHEMA_VIOLATION` [`GovernanceError`] carrying the first
    /// validation failure with its JSON pointer.
    pub fn validate(&self, class: ArtifactClass, payload: &Value) -> Result<(), GovernanceError> {
        let validator = self.validators.get(&(class, SCHEMA_VERSION)).ok_or_else(|| {
            GovernanceError::schema_violation(format!("no schema registered for class {class}"))
        })?;
        if let Some(error) = validator.iter_errors(payload).next() {
            return Err(GovernanceError::schema_violation(format!(
                "payload for class {class} is invalid: {error}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry").field("classes", &self.validators.len()).finish()
    }
}

// ============================================================================
// SECTION: Class Schemas
// ============================================================================

/// Returns the payload schema for a class at the current schema version.
fn class_schema(class: ArtifactClass) -> Value {
    match class {
        ArtifactClass::KosSnapshot => json!({
            "type": "object",
            "required": ["scheme", "concept_count"],
            "properties": {
                "scheme": {"type": "string", "minLength": 1},
                "concept_count": {"type": "integer", "minimum": 0},
                "source_uri": {"type": "string"},
            },
        }),
        ArtifactClass::CoveragePlan => json!({
            "type": "object",
            "required": ["strata"],
            "properties": {
                "strata": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["concept_id", "quota"],
                        "properties": {
                            "concept_id": {"type": "string", "minLength": 1},
                            "quota": {"type": "integer", "minimum": 0},
                        },
                    },
                },
            },
        }),
        ArtifactClass::Mapping => json!({
            "type": "object",
            "required": ["entries"],
            "properties": {
                "entries": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["source", "target"],
                        "properties": {
                            "source": {"type": "string", "minLength": 1},
                            "target": {"type": "string", "minLength": 1},
                            "confidence_bp": {"type": "integer", "minimum": 0, "maximum": 10000},
                        },
                    },
                },
            },
        }),
        ArtifactClass::Overlay => json!({
            "type": "object",
            "required": ["base_scheme", "additions"],
            "properties": {
                "base_scheme": {"type": "string", "minLength": 1},
                "additions": {"type": "array", "items": {"type": "object"}},
            },
        }),
        ArtifactClass::AuditCertificate => json!({
            "type": "object",
            "required": ["subject_artifact_id", "verdict"],
            "properties": {
                "subject_artifact_id": {"type": "string", "minLength": 1},
                "verdict": {"type": "string", "enum": ["pass", "fail"]},
                "findings": {"type": "array", "items": {"type": "object"}},
            },
        }),
        ArtifactClass::EvalSuite => json!({
            "type": "object",
            "required": ["slices"],
            "properties": {
                "slices": {"type": "array", "items": {"type": "object"}},
            },
        }),
        ArtifactClass::PromptPack => json!({
            "type": "object",
            "required": ["templates"],
            "properties": {
                "templates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["template_id", "body"],
                        "properties": {
                            "template_id": {"type": "string", "minLength": 1},
                            "body": {"type": "string"},
                        },
                    },
                },
            },
        }),
        ArtifactClass::RunBundle => json!({
            "type": "object",
            "required": ["run_id"],
            "properties": {
                "run_id": {"type": "string", "minLength": 1},
                "stages": {"type": "array", "items": {"type": "object"}},
            },
        }),
        ArtifactClass::ReleaseManifest => json!({
            "type": "object",
            "required": ["readiness_gates"],
            "properties": {
                "rollback_rehearsal_at": {"type": "integer"},
                "readiness_gates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["gate_id", "status"],
                        "properties": {
                            "gate_id": {"type": "string", "minLength": 1},
                            "status": {"type": "string", "minLength": 1},
                        },
                    },
                },
            },
        }),
    }
}
