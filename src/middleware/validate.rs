use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// JSON type a field must have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JsonType {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl JsonType {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool   => "boolean",
            Self::Array  => "array",
            Self::Object => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool   => value.is_boolean(),
            Self::Array  => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Checks for one body field. Lengths count characters for strings and
/// elements for arrays.
#[derive(Clone, Debug, Default)]
pub struct FieldRule {
    pub required: bool,
    pub kind: Option<JsonType>,
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl FieldRule {
    pub fn required() -> Self {
        Self { required: true, ..Self::default() }
    }

    pub fn optional() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: JsonType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }
}

/// Field name → rule, checked in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.push((name.to_owned(), rule));
        self
    }

    /// Returns one message per violated rule. An unstructured body has no
    /// fields, so only `required` rules can fail on it.
    pub fn check(&self, body: Option<&Value>) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, rule) in &self.fields {
            let value = body.and_then(|b| b.get(name)).filter(|v| !is_blank(v));
            let Some(value) = value else {
                if rule.required {
                    errors.push(format!("{name} is required"));
                }
                continue;
            };
            if let Some(kind) = rule.kind.filter(|k| !k.accepts(value)) {
                errors.push(format!("{name} must be of type {}", kind.name()));
            }
            let len = length(value);
            if let (Some(min), Some(len)) = (rule.min, len) {
                if len < min {
                    errors.push(format!("{name} must be at least {min} characters"));
                }
            }
            if let (Some(max), Some(len)) = (rule.max, len) {
                if len > max {
                    errors.push(format!("{name} must be at most {max} characters"));
                }
            }
        }
        errors
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

/// Parses the body (if nobody did yet) and answers `400` with
/// `{"error": [messages]}` when it breaks the schema.
pub fn validate(schema: Schema) -> impl Middleware {
    let schema = Arc::new(schema);
    move |mut req: Request, next: Next| {
        let schema = Arc::clone(&schema);
        async move {
            let body = req.body().await.to_json();
            let errors = schema.check(body.as_ref());
            if !errors.is_empty() {
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .json(&serde_json::json!({ "error": errors }));
            }
            next.run(req).await
        }
    }
}
