use std::collections::BTreeMap;

use wire::{FieldError, Value};

/// The shape a single field must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Bool,
    Array,
    Object,
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Integer => matches!(value, Value::Int(_)),
            FieldKind::Float => matches!(value, Value::Float(_) | Value::Int(_)),
            FieldKind::String => matches!(value, Value::Str(_)),
            FieldKind::Bool => matches!(value, Value::Bool(_)),
            FieldKind::Array => matches!(value, Value::Array(_)),
            FieldKind::Object => matches!(value, Value::Object(_)),
            FieldKind::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Bool => "bool",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSchema {
    pub fn required(kind: FieldKind) -> Self {
        Self { kind, required: true }
    }

    pub fn optional(kind: FieldKind) -> Self {
        Self { kind, required: false }
    }
}

/// A minimal object-shape validator for method params.
///
/// This intentionally does not chase a general-purpose schema language —
/// params are always a flat-ish object and the dispatcher only needs
/// presence/type checks with a field-level error list.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn validate(&self, params: Option<&Value>) -> Result<(), Vec<FieldError>> {
        let object = params.and_then(Value::as_object);
        let mut errors = Vec::new();
        for (name, field) in &self.fields {
            match object.and_then(|obj| obj.get(name)) {
                Some(value) if field.kind.matches(value) => {}
                Some(_) => errors.push(FieldError {
                    field: name.clone(),
                    message: format!("expected {}", field.kind.name()),
                }),
                None if field.required => errors.push(FieldError {
                    field: name.clone(),
                    message: "required".to_owned(),
                }),
                None => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_field_is_an_error() {
        let schema = Schema::new().field("n", FieldSchema::required(FieldKind::Integer));
        let errors = schema.validate(Some(&Value::object([]))).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "n");
    }

    #[test]
    fn wrong_type_is_an_error() {
        let schema = Schema::new().field("n", FieldSchema::required(FieldKind::Integer));
        let params = Value::object([("n".to_owned(), Value::Str("x".to_owned()))]);
        let errors = schema.validate(Some(&params)).unwrap_err();
        assert_eq!(errors[0].message, "expected integer");
    }

    #[test]
    fn valid_params_pass() {
        let schema = Schema::new().field("n", FieldSchema::required(FieldKind::Integer));
        let params = Value::object([("n".to_owned(), Value::Int(5))]);
        assert!(schema.validate(Some(&params)).is_ok());
    }

    #[test]
    fn optional_field_absent_is_fine() {
        let schema = Schema::new().field("n", FieldSchema::optional(FieldKind::Integer));
        assert!(schema.validate(Some(&Value::object([]))).is_ok());
    }

    #[test]
    fn no_params_against_required_schema_fails() {
        let schema = Schema::new().field("n", FieldSchema::required(FieldKind::Integer));
        assert!(schema.validate(None).is_err());
    }
}
