//! Schema types and builders
//!
//! A schema describes the attributes of one entity kind: their types, which
//! ones the user declares and which the server computes, validators, and how
//! to compare a declared value with the value read back.

use crate::error::Result;
use crate::types::{AttributePath, Diagnostics, Dynamic, DynamicValue};
use crate::validator::{ConfigValidator, Validator};
use std::collections::HashMap;
use std::sync::Arc;

/// Returns true when the declared and actual values should be treated as equal
pub type DiffSuppressFn = fn(declared: &Dynamic, actual: &Dynamic) -> bool;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    /// Whether `value` has the shape of this type. Null always matches.
    pub fn accepts(&self, value: &Dynamic) -> bool {
        match (self, value) {
            (_, Dynamic::Null) => true,
            (AttributeType::String, Dynamic::String(_)) => true,
            (AttributeType::Number, Dynamic::Number(_)) => true,
            (AttributeType::Bool, Dynamic::Bool(_)) => true,
            (AttributeType::List(elem), Dynamic::List(items))
            | (AttributeType::Set(elem), Dynamic::List(items)) => {
                items.iter().all(|item| elem.accepts(item))
            }
            (AttributeType::Map(elem), Dynamic::Map(entries)) => {
                entries.values().all(|item| elem.accepts(item))
            }
            (AttributeType::Object(fields), Dynamic::Map(entries)) => {
                entries.iter().all(|(key, item)| {
                    fields
                        .get(key)
                        .is_some_and(|field_type| field_type.accepts(item))
                })
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
    pub config_validators: Vec<Arc<dyn ConfigValidator>>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub attributes: Vec<Attribute>,
    pub description: String,
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.iter().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.block.attributes.iter()
    }

    /// Check declared configuration against this schema. Runs before any
    /// remote call so failures here never touch the remote side.
    pub fn validate(&self, config: &DynamicValue) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for attr in &self.block.attributes {
            let path = AttributePath::new(&attr.name);
            let value = config.get(&path).unwrap_or(&Dynamic::Null);

            if value.is_null() {
                if attr.required {
                    diags.add_error(format!("{} is required", attr.name), None::<String>);
                }
                continue;
            }

            if !attr.r#type.accepts(value) {
                diags.add_error(
                    format!("{} has the wrong type", attr.name),
                    Some(format!("Expected {:?}, got {}", attr.r#type, value.type_name())),
                );
                continue;
            }

            for validator in &attr.validators {
                validator.validate(value, &attr.name, &mut diags);
            }
        }

        for validator in &self.config_validators {
            validator.validate(config, &mut diags);
        }

        diags
    }

    /// Fill attributes the declaration leaves unset with their defaults
    pub fn apply_defaults(&self, declared: &DynamicValue) -> Result<DynamicValue> {
        let mut filled = declared.clone();
        for attr in &self.block.attributes {
            let Some(default) = &attr.default else {
                continue;
            };
            let path = AttributePath::new(&attr.name);
            if filled.get(&path).map_or(true, Dynamic::is_null) {
                filled.set_value(&path, default.clone())?;
            }
        }
        Ok(filled)
    }
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    /// Changing the value cannot be applied in place
    pub force_new: bool,
    /// Value assumed when the declaration leaves the attribute unset
    pub default: Option<Dynamic>,
    pub validators: Vec<Arc<dyn Validator>>,
    pub diff_suppress: Option<DiffSuppressFn>,
}

impl Attribute {
    /// Set by the server only, never declared
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.required && !self.optional
    }

    /// Compare a declared value with one read back from the server
    pub fn equivalent(&self, declared: &Dynamic, actual: &Dynamic) -> bool {
        if let Some(suppress) = self.diff_suppress {
            if suppress(declared, actual) {
                return true;
            }
        }

        if is_blank(declared) && is_blank(actual) {
            return true;
        }

        match (&self.r#type, declared, actual) {
            (AttributeType::Set(_), Dynamic::List(a), Dynamic::List(b)) => same_elements(a, b),
            _ => declared == actual,
        }
    }

    /// Whether applying `declared` would move the attribute away from
    /// `prior`. Leaving an attribute out of the declaration clears it back
    /// to its default, except for computed ones, which the server keeps.
    pub fn differs(&self, declared: Option<&Dynamic>, prior: Option<&Dynamic>) -> bool {
        let prior = prior.unwrap_or(&Dynamic::Null);
        match declared.filter(|value| !value.is_null()) {
            Some(next) => !self.equivalent(next, prior),
            None if self.computed => false,
            None => !self.equivalent(self.default.as_ref().unwrap_or(&Dynamic::Null), prior),
        }
    }
}

/// Null and empty values all mean "nothing there"
fn is_blank(value: &Dynamic) -> bool {
    match value {
        Dynamic::Null | Dynamic::Bool(false) => true,
        Dynamic::String(s) => s.is_empty(),
        Dynamic::List(items) => items.is_empty(),
        Dynamic::Map(entries) => entries.is_empty(),
        _ => false,
    }
}

fn same_elements(a: &[Dynamic], b: &[Dynamic]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left: Vec<String> = a.iter().map(ToString::to_string).collect();
    let mut right: Vec<String> = b.iter().map(ToString::to_string).collect();
    left.sort();
    right.sort();
    left == right
}

// Manual Debug implementation since validators don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field("force_new", &self.force_new)
            .field("default", &self.default)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field("diff_suppress", &self.diff_suppress.is_some())
            .finish()
    }
}

/// Treats two JSON documents as equal when they parse to the same value
pub fn suppress_equivalent_json(declared: &Dynamic, actual: &Dynamic) -> bool {
    match (declared.as_str(), actual.as_str()) {
        (Some(a), Some(b)) => {
            match (
                serde_json::from_str::<serde_json::Value>(a),
                serde_json::from_str::<serde_json::Value>(b),
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    }
}

/// AttributeBuilder provides fluent API for building attributes
/// ALWAYS use this instead of constructing Attribute directly
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                force_new: false,
                default: None,
                validators: Vec::new(),
                diff_suppress: None,
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden, never compared after a write)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.attribute.force_new = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Dynamic>) -> Self {
        self.attribute.default = Some(value.into());
        self
    }

    pub fn validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.attribute.validators.push(Arc::from(validator));
        self
    }

    pub fn diff_suppress(mut self, suppress: DiffSuppressFn) -> Self {
        self.attribute.diff_suppress = Some(suppress);
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block {
                    attributes: Vec::new(),
                    description: String::new(),
                },
                config_validators: Vec::new(),
            },
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    /// Add a validator that sees the whole configuration
    pub fn config_validator(mut self, validator: Box<dyn ConfigValidator>) -> Self {
        self.schema.config_validators.push(Arc::from(validator));
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl std::default::Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
