use std::collections::HashMap;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Attribute validation rules. These are deployment configuration, not
/// engine code: operators describe each attribute's type, range and
/// equality tolerance in the config file.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ValidationConfig {
    /// When true, attributes without a schema entry are rejected.
    /// When false, unknown attributes pass through unvalidated.
    #[serde(default)]
    pub strict: bool,

    /// Per-attribute schemas keyed by attribute name
    #[serde(default)]
    pub attributes: HashMap<String, AttributeSchema>,
}

/// Schema for a single attribute.
///
/// `tolerance` doubles as the equality rule for pending tracking: a
/// reported number within `tolerance` of the desired value counts as
/// converged. Non-numeric attributes always compare exactly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeSchema {
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        tolerance: f64,
    },
    Bool,
    Text {
        #[serde(default)]
        max_len: Option<usize>,
        /// Restricts the value to a fixed set (enum-style attributes)
        #[serde(default)]
        allowed: Option<Vec<String>>,
    },
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, schema) in &self.attributes {
            if let AttributeSchema::Number { min, max, tolerance } = schema {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(Error::Config(ConfigError::Message(format!(
                            "validation.attributes.{name}: min {lo} exceeds max {hi}"
                        ))));
                    }
                }
                if *tolerance < 0.0 {
                    return Err(Error::Config(ConfigError::Message(format!(
                        "validation.attributes.{name}: tolerance must be non-negative"
                    ))));
                }
            }
        }
        Ok(())
    }

    pub fn schema_of(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }
}
