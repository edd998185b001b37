//! # Variant Attributes
//!
//! Typed per-variant attributes (color, size, material, ...) validated
//! against a registry of attribute definitions instead of free-form data.
//!
//! ```text
//! Registry                              Variant "TEE-RED-M"
//! ┌──────────┬─────────┬──────────┐     ┌──────────┬──────────────────┐
//! │ code     │ kind    │ options  │     │ color    │ Choice("red")    │ ✓
//! │ color    │ choice  │ red,blue │     │ size     │ Choice("M")      │ ✓
//! │ size     │ choice  │ S,M,L    │     │ cotton   │ Decimal(9500)    │ ✓
//! │ cotton   │ decimal │          │     │ glitter  │ Boolean(true)    │ ✗ unknown
//! └──────────┴─────────┴──────────┘     └──────────┴──────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::validate_name;

/// Attribute values keyed by attribute code.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// The type of values an attribute accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Text,
    Integer,
    /// Fixed-point with two decimals (9500 = 95.00).
    Decimal,
    Boolean,
    /// One of the definition's `options`.
    Choice,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Text => "text",
            AttributeKind::Integer => "integer",
            AttributeKind::Decimal => "decimal",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Choice => "choice",
        };
        f.write_str(name)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    /// Hundredths (9500 = 95.00).
    Decimal(i64),
    Boolean(bool),
    Choice(String),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Text(_) => AttributeKind::Text,
            AttributeValue::Integer(_) => AttributeKind::Integer,
            AttributeValue::Decimal(_) => AttributeKind::Decimal,
            AttributeValue::Boolean(_) => AttributeKind::Boolean,
            AttributeValue::Choice(_) => AttributeKind::Choice,
        }
    }
}

/// Declares an attribute that variants may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Stable key, e.g. `color`.
    pub code: String,
    /// Display name, e.g. `Color`.
    pub name: String,
    pub kind: AttributeKind,
    /// Allowed values for `Choice` attributes; empty otherwise.
    pub options: Vec<String>,
}

impl AttributeDefinition {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AttributeKind) -> Self {
        AttributeDefinition {
            code: code.into(),
            name: name.into(),
            kind,
            options: Vec::new(),
        }
    }

    /// Creates a `Choice` attribute with its options.
    pub fn choice<I, S>(code: impl Into<String>, name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeDefinition {
            code: code.into(),
            name: name.into(),
            kind: AttributeKind::Choice,
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks the definition itself.
    pub fn validate(&self) -> CoreResult<()> {
        let code_ok = !self.code.is_empty()
            && self.code.len() <= 50
            && self
                .code
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !code_ok {
            return Err(ValidationError::InvalidFormat {
                field: "code".to_string(),
                reason: "must be 1-50 lowercase letters, digits or underscores".to_string(),
            }
            .into());
        }

        validate_name("name", &self.name)?;

        match (self.kind, self.options.is_empty()) {
            (AttributeKind::Choice, true) => Err(ValidationError::Required {
                field: "options".to_string(),
            }
            .into()),
            (AttributeKind::Choice, false) => Ok(()),
            (_, false) => Err(ValidationError::InvalidFormat {
                field: "options".to_string(),
                reason: format!("{} attributes take no options", self.kind),
            }
            .into()),
            (_, true) => Ok(()),
        }
    }

    /// Checks a single value against this definition.
    pub fn check(&self, value: &AttributeValue) -> CoreResult<()> {
        if value.kind() != self.kind {
            return Err(CoreError::InvalidAttribute {
                code: self.code.clone(),
                reason: format!("expected {}, got {}", self.kind, value.kind()),
            });
        }

        match value {
            AttributeValue::Choice(choice) if !self.options.contains(choice) => {
                Err(CoreError::InvalidAttribute {
                    code: self.code.clone(),
                    reason: format!("'{}' is not one of {:?}", choice, self.options),
                })
            }
            AttributeValue::Text(text) if text.trim().is_empty() => {
                Err(CoreError::InvalidAttribute {
                    code: self.code.clone(),
                    reason: "text must not be empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// The set of known attribute definitions.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    definitions: BTreeMap<String, AttributeDefinition>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        AttributeRegistry::default()
    }

    /// Adds or replaces a definition after validating it.
    pub fn register(&mut self, definition: AttributeDefinition) -> CoreResult<()> {
        definition.validate()?;
        self.definitions.insert(definition.code.clone(), definition);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&AttributeDefinition> {
        self.definitions.get(code)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Validates every entry of `attributes`.
    ///
    /// Unknown codes, kind mismatches and out-of-options choices fail with
    /// `InvalidAttribute`.
    pub fn validate(&self, attributes: &AttributeMap) -> CoreResult<()> {
        for (code, value) in attributes {
            let definition = self.get(code).ok_or_else(|| CoreError::InvalidAttribute {
                code: code.clone(),
                reason: "unknown attribute".to_string(),
            })?;
            definition.check(value)?;
        }
        Ok(())
    }
}

impl FromIterator<AttributeDefinition> for AttributeRegistry {
    /// Builds a registry without validating (for trusted, stored definitions).
    fn from_iter<T: IntoIterator<Item = AttributeDefinition>>(iter: T) -> Self {
        AttributeRegistry {
            definitions: iter.into_iter().map(|d| (d.code.clone(), d)).collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AttributeRegistry {
        let mut registry = AttributeRegistry::new();
        registry
            .register(AttributeDefinition::choice("color", "Color", ["red", "blue"]))
            .unwrap();
        registry
            .register(AttributeDefinition::choice("size", "Size", ["S", "M", "L"]))
            .unwrap();
        registry
            .register(AttributeDefinition::new("cotton_pct", "Cotton %", AttributeKind::Decimal))
            .unwrap();
        registry
    }

    #[test]
    fn test_valid_attributes() {
        let mut attrs = AttributeMap::new();
        attrs.insert("color".into(), AttributeValue::Choice("red".into()));
        attrs.insert("size".into(), AttributeValue::Choice("M".into()));
        attrs.insert("cotton_pct".into(), AttributeValue::Decimal(9500));

        assert!(registry().validate(&attrs).is_ok());
    }

    #[test]
    fn test_unknown_attribute() {
        let mut attrs = AttributeMap::new();
        attrs.insert("glitter".into(), AttributeValue::Boolean(true));

        let err = registry().validate(&attrs).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAttribute { code, .. } if code == "glitter"));
    }

    #[test]
    fn test_kind_mismatch_and_bad_choice() {
        let registry = registry();

        let mut attrs = AttributeMap::new();
        attrs.insert("cotton_pct".into(), AttributeValue::Text("lots".into()));
        assert!(registry.validate(&attrs).is_err());

        let mut attrs = AttributeMap::new();
        attrs.insert("color".into(), AttributeValue::Choice("green".into()));
        assert!(registry.validate(&attrs).is_err());
    }

    #[test]
    fn test_definition_validation() {
        assert!(AttributeDefinition::new("Color", "Color", AttributeKind::Text)
            .validate()
            .is_err());
        assert!(AttributeDefinition::new("color", "Color", AttributeKind::Choice)
            .validate()
            .is_err());

        let mut text = AttributeDefinition::new("material", "Material", AttributeKind::Text);
        text.options.push("wool".into());
        assert!(text.validate().is_err());
    }

    #[test]
    fn test_value_serialization_is_tagged() {
        let json = serde_json::to_string(&AttributeValue::Choice("red".into())).unwrap();
        assert_eq!(json, r#"{"type":"choice","value":"red"}"#);

        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttributeValue::Choice("red".into()));
    }
}
