//! Request payloads for creating and updating operations.
//!
//! Bodies are deserialized with `serde` and checked with `validator`; the
//! failures of both are translated into [`FieldError`]s carrying a location
//! such as `["body", "name"]`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_path_to_error::Segment;
use validator::{Validate, ValidationError, ValidationErrors};

/// One segment of a [`FieldError`] location, e.g. `["body", "name"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LocSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for LocSegment {
    fn from(key: &str) -> Self {
        LocSegment::Key(key.to_string())
    }
}

impl From<usize> for LocSegment {
    fn from(index: usize) -> Self {
        LocSegment::Index(index)
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Machine-readable error kind (`missing`, `string_type`, ...).
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub loc: Vec<LocSegment>,
    pub msg: String,
    /// The offending input, when there is one to show.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Extra context, e.g. the decoder message of `json_invalid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx: Option<Value>,
}

impl FieldError {
    #[must_use]
    pub fn new(kind: &'static str, loc: Vec<LocSegment>, msg: impl Into<String>) -> Self {
        Self {
            kind,
            loc,
            msg: msg.into(),
            input: None,
            ctx: None,
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn with_ctx(mut self, ctx: Value) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Required field is absent.
    #[must_use]
    pub fn missing(loc: Vec<LocSegment>) -> Self {
        Self::new("missing", loc, "Field required")
    }

    /// Path parameter could not be parsed as an integer.
    #[must_use]
    pub fn int_parsing(loc: Vec<LocSegment>, input: &str) -> Self {
        Self::new(
            "int_parsing",
            loc,
            "Input should be a valid integer, unable to parse string as an integer",
        )
        .with_input(Value::String(input.to_string()))
    }
}

/// A request payload with a validated wire form.
pub trait Payload: Sized {
    /// What the JSON body deserializes into before validation.
    type Body: DeserializeOwned + Validate;

    /// Body fields in declaration order; validation errors are reported in this order.
    const FIELDS: &'static [&'static str];

    /// Converts a body that passed validation.
    fn from_body(body: Self::Body) -> Self;
}

/// Parses and validates a raw request body.
///
/// # Errors
///
/// - an empty body is a `missing` `body`
/// - malformed JSON is `json_invalid` at the byte offset of the failure
/// - anything but an object is `model_attributes_type`
/// - a field of the wrong type is `string_type` (deserialization stops there)
/// - otherwise every failed validation rule is reported
pub fn parse_body<T: Payload>(raw: &[u8]) -> Result<T, Vec<FieldError>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(vec![
            FieldError::missing(vec!["body".into()]).with_input(Value::Null)
        ]);
    }

    let value: Value = serde_json::from_slice(raw).map_err(|e| vec![json_invalid(raw, &e)])?;
    if !value.is_object() {
        return Err(vec![FieldError::new(
            "model_attributes_type",
            vec!["body".into()],
            "Input should be a valid dictionary or object to extract fields from",
        )
        .with_input(value)]);
    }

    let body: T::Body =
        serde_path_to_error::deserialize(&value).map_err(|e| vec![type_error(&value, &e)])?;
    body.validate()
        .map_err(|errors| validation_errors::<T>(&value, &errors))?;

    Ok(T::from_body(body))
}

fn json_invalid(raw: &[u8], err: &serde_json::Error) -> FieldError {
    let offset = byte_offset(raw, err.line(), err.column());
    FieldError::new(
        "json_invalid",
        vec!["body".into(), offset.into()],
        "JSON decode error",
    )
    .with_input(json!({}))
    .with_ctx(json!({ "error": err.to_string() }))
}

/// Converts serde_json's 1-based line/column into a byte offset.
fn byte_offset(raw: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = raw
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    line_start + column.saturating_sub(1)
}

fn type_error(body: &Value, err: &serde_path_to_error::Error<serde_json::Error>) -> FieldError {
    let mut loc = vec![LocSegment::from("body")];
    let mut input = body;
    for segment in err.path().iter() {
        match segment {
            Segment::Map { key } => {
                loc.push(key.as_str().into());
                input = &input[key.as_str()];
            }
            Segment::Seq { index } => {
                loc.push((*index).into());
                input = &input[*index];
            }
            Segment::Enum { .. } | Segment::Unknown => {}
        }
    }
    FieldError::new("string_type", loc, "Input should be a valid string").with_input(input.clone())
}

fn validation_errors<T: Payload>(body: &Value, errors: &ValidationErrors) -> Vec<FieldError> {
    let by_field = errors.field_errors();
    let mut out = Vec::new();
    for field in T::FIELDS {
        let Some(failures) = by_field.get(*field) else {
            continue;
        };
        out.extend(failures.iter().map(|f| field_error(body, field, f)));
    }
    out
}

fn field_error(body: &Value, field: &str, failure: &ValidationError) -> FieldError {
    let loc = vec![LocSegment::from("body"), LocSegment::from(field)];
    match failure.code.as_ref() {
        "required" => FieldError::missing(loc).with_input(body.clone()),
        "length" => FieldError::new(
            "string_too_short",
            loc,
            "String should have at least 1 character",
        )
        .with_input(body[field].clone())
        .with_ctx(json!({ "min_length": 1 })),
        code => FieldError::new(
            "value_error",
            loc,
            failure.message.as_deref().unwrap_or(code).to_string(),
        )
        .with_input(body[field].clone()),
    }
}

/// Payload of a create request. Both fields must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub name: String,
    pub description: String,
}

/// Wire form of [`NewOperation`]. Fields are optional here so that every
/// absent one is reported, not just the first.
#[derive(Debug, Deserialize, Validate)]
pub struct NewOperationBody {
    #[validate(required, length(min = 1))]
    pub name: Option<String>,
    #[validate(required)]
    pub description: Option<String>,
}

impl Payload for NewOperation {
    type Body = NewOperationBody;
    const FIELDS: &'static [&'static str] = &["name", "description"];

    fn from_body(body: NewOperationBody) -> Self {
        NewOperation {
            name: body.name.unwrap_or_default(),
            description: body.description.unwrap_or_default(),
        }
    }
}

/// Payload of an update request.
///
/// Each field is either present with a value or absent; absent fields are
/// left untouched by the update. A JSON `null` counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct OperationPatch {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Payload for OperationPatch {
    type Body = OperationPatch;
    const FIELDS: &'static [&'static str] = &["name", "description"];

    fn from_body(body: OperationPatch) -> Self {
        body
    }
}
