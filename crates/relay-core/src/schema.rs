//! Payload schemas and validation.
//!
//! Handlers never see raw JSON. Each inbound payload type declares a
//! [`Schema`]; [`Schema::validate`] checks every field, collects all
//! violations into one readable reason, and only then deserializes.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Maximum byte length of any string field.
pub const MAX_STRING_LENGTH: usize = 8192;

/// Separator between individual field violations.
const VIOLATION_SEPARATOR: &str = "; ";

/// Shape a single field must have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Non-empty string.
    Text,
    /// Integer greater than zero.
    PositiveInt,
    /// Non-empty array of non-empty strings.
    TextList,
}

/// One named field of an object schema.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldRule {
    /// JSON key.
    pub name: &'static str,
    /// Expected shape.
    pub kind: FieldKind,
    /// Whether the key must be present and non-null.
    pub required: bool,
}

/// Schema descriptor for an inbound payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Schema {
    /// A JSON object with the listed fields. Extra keys are ignored.
    Object(Vec<FieldRule>),
    /// A bare non-empty string.
    Text,
}

/// Result of validating an untyped payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Validation<T> {
    /// The payload matched and was narrowed to `T`.
    Valid(T),
    /// The payload was rejected.
    Invalid(String),
}

impl<T> Validation<T> {
    /// Whether validation succeeded.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Convert into a `Result`, the error being the joined reason.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Valid(data) => Ok(data),
            Self::Invalid(reason) => Err(reason),
        }
    }
}

/// An inbound payload type with its schema.
pub trait Payload: DeserializeOwned {
    /// Schema every raw payload is checked against.
    fn schema() -> Schema;
}

impl Schema {
    /// Empty object schema.
    pub fn object() -> Self {
        Self::Object(Vec::new())
    }

    /// Add a required field.
    #[must_use]
    pub fn required(self, name: &'static str, kind: FieldKind) -> Self {
        self.field(name, kind, true)
    }

    /// Add an optional field.
    #[must_use]
    pub fn optional(self, name: &'static str, kind: FieldKind) -> Self {
        self.field(name, kind, false)
    }

    fn field(mut self, name: &'static str, kind: FieldKind, required: bool) -> Self {
        if let Self::Object(fields) = &mut self {
            fields.push(FieldRule {
                name,
                kind,
                required,
            });
        }
        self
    }

    /// Every violation found in `input`, in field order.
    pub fn violations(&self, input: &Value) -> Vec<String> {
        match self {
            Self::Text => check_text(input)
                .err()
                .map(|msg| vec![format!("payload: {msg}")])
                .unwrap_or_default(),
            Self::Object(fields) => {
                let Some(object) = input.as_object() else {
                    return vec![format!(
                        "payload: expected object, received {}",
                        type_name(input)
                    )];
                };
                let mut out = Vec::new();
                for rule in fields {
                    match object.get(rule.name) {
                        None | Some(Value::Null) => {
                            if rule.required {
                                out.push(format!("{}: Required", rule.name));
                            }
                        }
                        Some(value) => check_field(rule, value, &mut out),
                    }
                }
                out
            }
        }
    }

    /// Check `input` and narrow it to `T`.
    pub fn validate<T: DeserializeOwned>(&self, input: &Value) -> Validation<T> {
        let violations = self.violations(input);
        if !violations.is_empty() {
            return Validation::Invalid(violations.join(VIOLATION_SEPARATOR));
        }
        match serde_json::from_value(input.clone()) {
            Ok(data) => Validation::Valid(data),
            Err(e) => Validation::Invalid(format!("payload: {e}")),
        }
    }
}

fn check_field(rule: &FieldRule, value: &Value, out: &mut Vec<String>) {
    match rule.kind {
        FieldKind::Text => {
            if let Err(msg) = check_text(value) {
                out.push(format!("{}: {msg}", rule.name));
            }
        }
        FieldKind::PositiveInt => {
            if !value.as_u64().is_some_and(|n| n > 0) {
                out.push(format!(
                    "{}: expected positive integer, received {}",
                    rule.name,
                    type_name(value)
                ));
            }
        }
        FieldKind::TextList => {
            let Some(items) = value.as_array() else {
                out.push(format!(
                    "{}: expected array, received {}",
                    rule.name,
                    type_name(value)
                ));
                return;
            };
            if items.is_empty() {
                out.push(format!("{}: must contain at least 1 element", rule.name));
            }
            for (i, item) in items.iter().enumerate() {
                if let Err(msg) = check_text(item) {
                    out.push(format!("{}[{i}]: {msg}", rule.name));
                }
            }
        }
    }
}

fn check_text(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) if s.is_empty() => Err("must not be empty".into()),
        Value::String(s) if s.len() > MAX_STRING_LENGTH => Err(format!(
            "exceeds maximum length of {MAX_STRING_LENGTH} bytes"
        )),
        Value::String(_) => Ok(()),
        other => Err(format!("expected string, received {}", type_name(other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(n) if n.as_i64().is_some_and(|n| n < 0) => "negative number",
        Value::Number(n) if n.as_u64() == Some(0) => "zero",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
