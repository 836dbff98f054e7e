//! Json schema validation of request bodies.

use crate::error::{DispatchError, FieldError};
use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Compiles schemas once and checks documents against them.
#[derive(Default)]
pub struct SchemaValidator {
    cache: RwLock<HashMap<String, Arc<Validator>>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `instance` against `schema`, reporting every violation.
    pub fn validate(&self, schema: &Value, instance: &Value) -> Result<(), DispatchError> {
        let validator = self.validator_for(schema)?;

        let errors: Vec<FieldError> = validator
            .iter_errors(instance)
            .map(|error| {
                let mut loc = vec!["body".to_owned()];
                loc.extend(pointer_segments(&error.instance_path.to_string()));

                let kind = match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        loc.push(property.as_str().map_or_else(|| property.to_string(), str::to_owned));
                        "missing"
                    }
                    ValidationErrorKind::Type { .. } => "type_error",
                    _ => "value_error",
                };

                FieldError::new(kind, loc, error.to_string())
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(DispatchError::bad_request(errors)) }
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validator_for(&self, schema: &Value) -> Result<Arc<Validator>, DispatchError> {
        let key = schema.to_string();
        if let Some(validator) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(validator));
        }

        let validator = Arc::new(
            jsonschema::validator_for(schema)
                .map_err(|e| DispatchError::invalid_arguments(format!("invalid json schema: {e}")))?,
        );
        debug!(schema = %key, "compiled json schema");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(key).or_insert(validator)))
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").field("schemas", &self.len()).finish()
    }
}

/// Splits a json pointer such as `/items/0/name` into its unescaped segments.
fn pointer_segments(pointer: &str) -> impl Iterator<Item = String> + '_ {
    pointer.split('/').skip(1).map(|segment| segment.replace("~1", "/").replace("~0", "~"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn valid_document() {
        let validator = SchemaValidator::new();
        validator.validate(&schema(), &json!({"name": "a", "tags": ["x"]})).unwrap();
        validator.validate(&schema(), &json!({"name": "b"})).unwrap();
        assert_eq!(validator.len(), 1);
    }

    #[test]
    fn one_error_per_violation() {
        let validator = SchemaValidator::new();
        let Err(DispatchError::BadRequest { errors }) = validator.validate(&schema(), &json!({"tags": ["x", 1]}))
        else {
            panic!("expected a bad request");
        };

        assert_eq!(errors.len(), 2);
        let missing = errors.iter().find(|error| error.kind == "missing").unwrap();
        assert_eq!(missing.loc, vec!["body", "name"]);
        let wrong_type = errors.iter().find(|error| error.kind == "type_error").unwrap();
        assert_eq!(wrong_type.loc, vec!["body", "tags", "1"]);
    }

    #[test]
    fn pointer_unescaping() {
        assert_eq!(pointer_segments("/a~1b/c~0d").collect::<Vec<_>>(), vec!["a/b", "c~d"]);
        assert_eq!(pointer_segments("").count(), 0);
    }
}
