use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::AttributeEquality;
use crate::AttributeMap;
use crate::AttributeSchema;
use crate::AttributeValue;
use crate::ValidationConfig;
use crate::ValidationError;

/// Validates incoming deltas against the configured attribute schemas and
/// supplies the per-attribute equality rule for pending tracking.
///
/// Rules are held behind an [`ArcSwap`] so a configuration reload can swap
/// them without pausing in-flight reconciliations.
pub struct AttributeValidator {
    rules: ArcSwap<ValidationConfig>,
}

impl AttributeValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            rules: ArcSwap::from_pointee(config),
        }
    }

    /// Replaces the active rule set. In-flight checks keep the snapshot
    /// they started with.
    pub fn swap_rules(&self, config: ValidationConfig) {
        self.rules.store(Arc::new(config));
    }

    /// Checks a whole delta. Empty deltas are rejected before any
    /// per-attribute rule runs.
    pub fn check_delta(&self, delta: &AttributeMap) -> std::result::Result<(), ValidationError> {
        if delta.is_empty() {
            return Err(ValidationError::EmptyDelta);
        }

        let rules = self.rules.load();
        for (name, value) in delta {
            match rules.schema_of(name) {
                Some(schema) => check_attribute(name, value, schema)?,
                None if rules.strict => {
                    return Err(ValidationError::UnknownAttribute { name: name.clone() });
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl AttributeEquality for AttributeValidator {
    fn converged(&self, name: &str, desired: &AttributeValue, reported: &AttributeValue) -> bool {
        let rules = self.rules.load();
        match (rules.schema_of(name), desired, reported) {
            (
                Some(AttributeSchema::Number { tolerance, .. }),
                AttributeValue::Number(want),
                AttributeValue::Number(have),
            ) => (want - have).abs() <= *tolerance,
            _ => desired == reported,
        }
    }
}

fn check_attribute(
    name: &str,
    value: &AttributeValue,
    schema: &AttributeSchema,
) -> std::result::Result<(), ValidationError> {
    match (schema, value) {
        (AttributeSchema::Number { min, max, .. }, AttributeValue::Number(n)) => {
            let lo = min.unwrap_or(f64::NEG_INFINITY);
            let hi = max.unwrap_or(f64::INFINITY);
            if !n.is_finite() || *n < lo || *n > hi {
                return Err(ValidationError::OutOfRange {
                    name: name.to_string(),
                    value: *n,
                    min: lo,
                    max: hi,
                });
            }
            Ok(())
        }
        (AttributeSchema::Bool, AttributeValue::Bool(_)) => Ok(()),
        (AttributeSchema::Text { max_len, allowed }, AttributeValue::Text(s)) => {
            if let Some(limit) = max_len {
                if s.len() > *limit {
                    return Err(ValidationError::TooLong {
                        name: name.to_string(),
                        max_len: *limit,
                    });
                }
            }
            if let Some(values) = allowed {
                if !values.iter().any(|v| v == s) {
                    return Err(ValidationError::NotAllowed {
                        name: name.to_string(),
                        value: s.clone(),
                    });
                }
            }
            Ok(())
        }
        (schema, _) => Err(ValidationError::TypeMismatch {
            name: name.to_string(),
            expected: expected_type(schema),
        }),
    }
}

fn expected_type(schema: &AttributeSchema) -> &'static str {
    match schema {
        AttributeSchema::Number { .. } => "number",
        AttributeSchema::Bool => "bool",
        AttributeSchema::Text { .. } => "text",
    }
}
