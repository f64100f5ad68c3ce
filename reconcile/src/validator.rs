use crate::types::{AttributePath, Diagnostics, Dynamic, DynamicValue};
use std::fmt;

pub trait Validator: Send + Sync {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics);
}

/// Validation across attributes, run against the whole declared configuration
pub trait ConfigValidator: Send + Sync + fmt::Debug {
    fn validate(&self, config: &DynamicValue, diagnostics: &mut Diagnostics);
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for StringLengthValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Some(s) = value.as_str() {
            let length = s.chars().count();
            if let Some(min) = self.min {
                if length < min {
                    diagnostics.add_error(
                        format!("{} must have minimum length of {}", attribute_path, min),
                        Some(format!("Got length {}", length)),
                    );
                }
            }
            if let Some(max) = self.max {
                if length > max {
                    diagnostics.add_error(
                        format!("{} must have maximum length of {}", attribute_path, max),
                        Some(format!("Got length {}", length)),
                    );
                }
            }
        }
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl Validator for StringPatternValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Some(s) = value.as_str() {
            if !self.pattern.is_match(s) {
                diagnostics.add_error(
                    format!("{} must match {}", attribute_path, self.description),
                    Some(format!("Value '{}' does not match pattern", s)),
                );
            }
        }
    }
}

pub struct StringInSliceValidator {
    pub allowed: Vec<String>,
}

impl StringInSliceValidator {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringInSliceValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Some(s) = value.as_str() {
            if !self.allowed.iter().any(|allowed| allowed == s) {
                diagnostics.add_error(
                    format!(
                        "{} must be one of [{}]",
                        attribute_path,
                        self.allowed.join(", ")
                    ),
                    Some(format!("Got '{}'", s)),
                );
            }
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for NumberRangeValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Some(n) = value.as_number() {
            if let Some(min) = self.min {
                if n < min {
                    diagnostics.add_error(
                        format!("{} must be at least {}", attribute_path, min),
                        Some(format!("Got {}", n)),
                    );
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    diagnostics.add_error(
                        format!("{} must be at most {}", attribute_path, max),
                        Some(format!("Got {}", n)),
                    );
                }
            }
        }
    }
}

/// Rejects numbers with a fractional part
pub struct WholeNumberValidator;

impl Validator for WholeNumberValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Some(n) = value.as_number() {
            if n.fract() != 0.0 {
                diagnostics.add_error(
                    format!("{} must be a whole number", attribute_path),
                    Some(format!("Got {}", n)),
                );
            }
        }
    }
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for ListLengthValidator {
    fn validate(&self, value: &Dynamic, attribute_path: &str, diagnostics: &mut Diagnostics) {
        if let Dynamic::List(items) = value {
            if let Some(min) = self.min {
                if items.len() < min {
                    diagnostics.add_error(
                        format!("{} must have at least {} items", attribute_path, min),
                        Some(format!("Got {} items", items.len())),
                    );
                }
            }
            if let Some(max) = self.max {
                if items.len() > max {
                    diagnostics.add_error(
                        format!("{} must have at most {} items", attribute_path, max),
                        Some(format!("Got {} items", items.len())),
                    );
                }
            }
        }
    }
}

/// At most one of the named attributes may be set.
///
/// Zero and the empty string count as unset, since the platform uses them
/// to mean "not configured".
#[derive(Debug)]
pub struct MutuallyExclusive {
    pub attributes: Vec<String>,
}

impl MutuallyExclusive {
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

pub(crate) fn is_set(value: &Dynamic) -> bool {
    match value {
        Dynamic::Null => false,
        Dynamic::Number(n) => *n > 0.0,
        Dynamic::String(s) => !s.is_empty(),
        Dynamic::List(items) => !items.is_empty(),
        _ => true,
    }
}

impl ConfigValidator for MutuallyExclusive {
    fn validate(&self, config: &DynamicValue, diagnostics: &mut Diagnostics) {
        let set: Vec<&str> = self
            .attributes
            .iter()
            .filter(|name| config.get(&AttributePath::new(name)).is_some_and(is_set))
            .map(String::as_str)
            .collect();

        if set.len() > 1 {
            diagnostics.add_error(
                format!("Only one of {} can be set", self.attributes.join(", ")),
                Some(format!("Found values for {}", set.join(" and "))),
            );
        }
    }
}
