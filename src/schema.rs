//! Response contracts for the structured stages.
//!
//! Each stage names one [`SchemaName`]. The same descriptor is sent with the
//! request (so the model is asked to produce exactly that shape) and used to
//! validate the reply before it is deserialized into a typed result.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaName {
    FitsResult,
    StyleResult,
    CompetenciesResult,
    CoverageResult,
    EvidenceResult,
    WriteResult,
}

impl SchemaName {
    pub const ALL: [SchemaName; 6] = [
        SchemaName::FitsResult,
        SchemaName::StyleResult,
        SchemaName::CompetenciesResult,
        SchemaName::CoverageResult,
        SchemaName::EvidenceResult,
        SchemaName::WriteResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaName::FitsResult => "fits_result",
            SchemaName::StyleResult => "style_result",
            SchemaName::CompetenciesResult => "competencies_result",
            SchemaName::CoverageResult => "coverage_result",
            SchemaName::EvidenceResult => "evidence_result",
            SchemaName::WriteResult => "write_result",
        }
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown schema: {}", s))
    }
}

/// Declared type tree of a schema (the JSON Schema subset the stages need).
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object {
        properties: Vec<(&'static str, SchemaNode)>,
        required: Vec<&'static str>,
        additional_properties: bool,
    },
    Array(Box<SchemaNode>),
    String {
        allowed: Option<Vec<&'static str>>,
    },
    Boolean,
}

impl SchemaNode {
    /// Closed object: every property required, nothing undeclared accepted.
    fn strict_object(properties: Vec<(&'static str, SchemaNode)>) -> Self {
        let required = properties.iter().map(|(name, _)| *name).collect();
        SchemaNode::Object {
            properties,
            required,
            additional_properties: false,
        }
    }

    fn string() -> Self {
        SchemaNode::String { allowed: None }
    }

    fn enumeration(values: &[&'static str]) -> Self {
        SchemaNode::String {
            allowed: Some(values.to_vec()),
        }
    }

    fn array(items: SchemaNode) -> Self {
        SchemaNode::Array(Box::new(items))
    }

    fn to_json(&self) -> Value {
        match self {
            SchemaNode::Object {
                properties,
                required,
                additional_properties,
            } => {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, node)| (name.to_string(), node.to_json()))
                    .collect();
                json!({
                    "type": "object",
                    "properties": props,
                    "required": required,
                    "additionalProperties": additional_properties,
                })
            }
            SchemaNode::Array(items) => json!({
                "type": "array",
                "items": items.to_json(),
            }),
            SchemaNode::String { allowed: None } => json!({"type": "string"}),
            SchemaNode::String {
                allowed: Some(values),
            } => json!({"type": "string", "enum": values}),
            SchemaNode::Boolean => json!({"type": "boolean"}),
        }
    }
}

/// Compiled validators, one per schema, built on first use.
fn validators() -> &'static HashMap<SchemaName, Result<Validator, String>> {
    static VALIDATORS: OnceLock<HashMap<SchemaName, Result<Validator, String>>> = OnceLock::new();
    VALIDATORS.get_or_init(|| {
        SchemaName::ALL
            .into_iter()
            .map(|name| {
                let compiled = jsonschema::validator_for(&describe(name).to_json_schema())
                    .map_err(|e| e.to_string());
                (name, compiled)
            })
            .collect()
    })
}

/// Field path of a validation error in `a.b[1].c` form. Missing and
/// undeclared properties are reported at the property, not its parent.
fn violation_path(error: &ValidationError<'_>) -> String {
    let mut path = pointer_to_path(&error.instance_path.to_string());
    let property = match &error.kind {
        ValidationErrorKind::Required { property } => property.as_str().map(str::to_string),
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected.first().cloned(),
        _ => None,
    };
    if let Some(property) = property {
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(&property);
    }
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path
    }
}

fn pointer_to_path(pointer: &str) -> String {
    let mut path = String::new();
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() {
            path.push('[');
            path.push_str(&segment);
            path.push(']');
        } else {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&segment);
        }
    }
    path
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    name: SchemaName,
    root: SchemaNode,
}

impl SchemaDescriptor {
    pub fn name(&self) -> SchemaName {
        self.name
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Required top-level fields, in declaration order.
    pub fn required_fields(&self) -> &[&'static str] {
        match &self.root {
            SchemaNode::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// JSON Schema document sent to the model as the output format.
    pub fn to_json_schema(&self) -> Value {
        self.root.to_json()
    }

    /// Structural validation of an already parsed value. The error names the
    /// first missing, undeclared or mistyped field.
    pub fn validate(&self, value: &Value) -> Result<(), PipelineError> {
        let validator = match validators().get(&self.name) {
            Some(Ok(validator)) => validator,
            Some(Err(reason)) => {
                let reason = format!("invalid schema: {}", reason);
                return Err(self.violation("<schema>".to_string(), reason));
            }
            None => {
                let reason = "no compiled validator".to_string();
                return Err(self.violation("<schema>".to_string(), reason));
            }
        };

        match validator.iter_errors(value).next() {
            Some(error) => Err(self.violation(violation_path(&error), error.to_string())),
            None => Ok(()),
        }
    }

    fn violation(&self, field: String, reason: String) -> PipelineError {
        PipelineError::SchemaViolation {
            schema: self.name.to_string(),
            field,
            reason,
        }
    }

    /// Two-phase parse: syntax, then structure, then the typed value.
    pub fn parse<T: DeserializeOwned>(&self, raw: &str) -> Result<T, PipelineError> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| PipelineError::MalformedOutput {
                schema: self.name.to_string(),
                reason: e.to_string(),
            })?;

        self.validate(&value)?;

        serde_json::from_value(value)
            .map_err(|e| self.violation("<root>".to_string(), e.to_string()))
    }
}

/// A typed stage result bound to the schema it is parsed with.
pub trait StageOutput: DeserializeOwned {
    const SCHEMA: SchemaName;
}

pub fn parse<T: StageOutput>(raw: &str) -> Result<T, PipelineError> {
    describe(T::SCHEMA).parse(raw)
}

pub fn describe(name: SchemaName) -> SchemaDescriptor {
    let root = match name {
        SchemaName::FitsResult => SchemaNode::strict_object(vec![
            ("fit", SchemaNode::enumeration(&["fit", "weak_fit", "no_fit"])),
            ("reason", SchemaNode::string()),
        ]),
        SchemaName::StyleResult => SchemaNode::strict_object(vec![
            ("language", SchemaNode::string()),
            ("perspective", SchemaNode::string()),
            ("tense", SchemaNode::string()),
            ("tone", SchemaNode::string()),
            ("sentence_length", SchemaNode::string()),
            ("uses_references", SchemaNode::Boolean),
        ]),
        SchemaName::CompetenciesResult => SchemaNode::strict_object(vec![(
            "competencies",
            SchemaNode::array(SchemaNode::strict_object(vec![
                ("id", SchemaNode::string()),
                ("description", SchemaNode::string()),
            ])),
        )]),
        SchemaName::CoverageResult => SchemaNode::strict_object(vec![(
            "coverage",
            SchemaNode::array(SchemaNode::strict_object(vec![
                ("id", SchemaNode::string()),
                (
                    "status",
                    SchemaNode::enumeration(&["covered", "partial", "none"]),
                ),
                ("reason", SchemaNode::string()),
            ])),
        )]),
        SchemaName::EvidenceResult => SchemaNode::strict_object(vec![(
            "competencies",
            SchemaNode::array(SchemaNode::strict_object(vec![
                ("competency_id", SchemaNode::string()),
                ("summary", SchemaNode::string()),
            ])),
        )]),
        SchemaName::WriteResult => {
            SchemaNode::strict_object(vec![("evidence", SchemaNode::string())])
        }
    };
    SchemaDescriptor { name, root }
}
