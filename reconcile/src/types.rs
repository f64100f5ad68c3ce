//! Declared-state value model
//!
//! Declared configuration and local state are both trees of Dynamic values
//! addressed by AttributePath.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dynamic represents a configuration or state value of any type
/// IMPORTANT: Always use type-safe accessors instead of matching directly
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// Explicit null value
    Null,
    Bool(bool),
    /// All numbers are f64
    Number(f64),
    String(String),
    /// Ordered, allows duplicates
    List(Vec<Dynamic>),
    /// Objects are represented as Maps
    Map(HashMap<String, Dynamic>),
}

impl Dynamic {
    pub fn is_null(&self) -> bool {
        matches!(self, Dynamic::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dynamic::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Dynamic::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dynamic::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Dynamic]> {
        match self {
            Dynamic::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Dynamic>> {
        match self {
            Dynamic::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::Number(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
        }
    }

    /// Build a list of strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dynamic::List(
            items
                .into_iter()
                .map(|s| Dynamic::String(s.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::String(value.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(value: String) -> Self {
        Dynamic::String(value)
    }
}

impl From<bool> for Dynamic {
    fn from(value: bool) -> Self {
        Dynamic::Bool(value)
    }
}

impl From<f64> for Dynamic {
    fn from(value: f64) -> Self {
        Dynamic::Number(value)
    }
}

impl From<i64> for Dynamic {
    fn from(value: i64) -> Self {
        Dynamic::Number(value as f64)
    }
}

impl Serialize for Dynamic {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Dynamic::Null => serializer.serialize_unit(),
            Dynamic::Bool(b) => serializer.serialize_bool(*b),
            Dynamic::Number(n) => {
                // Whole numbers round-trip as integers so ids and counters stay readable
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Dynamic::String(s) => serializer.serialize_str(s),
            Dynamic::List(l) => l.serialize(serializer),
            Dynamic::Map(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct DynamicVisitor;

        impl<'de> Visitor<'de> for DynamicVisitor {
            type Value = Dynamic;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a valid Dynamic value")
            }

            fn visit_unit<E>(self) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Null)
            }

            fn visit_none<E>(self) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Null)
            }

            fn visit_bool<E>(self, value: bool) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_f64<E>(self, value: f64) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::Number(value))
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::String(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> std::result::Result<Dynamic, E>
            where
                E: de::Error,
            {
                Ok(Dynamic::String(value))
            }

            fn visit_seq<V>(self, mut seq: V) -> std::result::Result<Dynamic, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(elem) = seq.next_element()? {
                    vec.push(elem);
                }
                Ok(Dynamic::List(vec))
            }

            fn visit_map<V>(self, mut map: V) -> std::result::Result<Dynamic, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut hashmap = HashMap::new();
                while let Some((key, value)) = map.next_entry()? {
                    hashmap.insert(key, value);
                }
                Ok(Dynamic::Map(hashmap))
            }
        }

        deserializer.deserialize_any(DynamicVisitor)
    }
}

/// DynamicValue wraps the root of a declared configuration or state tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicValue {
    pub value: Dynamic,
}

impl DynamicValue {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn null() -> Self {
        Self {
            value: Dynamic::Null,
        }
    }

    /// An empty object, the usual starting point for state
    pub fn empty_object() -> Self {
        Self {
            value: Dynamic::Map(HashMap::new()),
        }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Dynamic)>,
        K: Into<String>,
    {
        Self {
            value: Dynamic::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn encode_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.value)
            .map_err(|e| ReconcileError::Encoding(format!("json encoding failed: {}", e)))
    }

    pub fn decode_json(data: &[u8]) -> Result<Self> {
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::null());
        }
        let value = serde_json::from_slice(data)
            .map_err(|e| ReconcileError::Decoding(format!("json decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    /// Raw lookup; missing attributes and type mismatches along the path give None
    pub fn get(&self, path: &AttributePath) -> Option<&Dynamic> {
        self.navigate_path(path).ok()
    }

    /// Type-safe accessors - ALWAYS use these instead of pattern matching
    pub fn get_string(&self, path: &AttributePath) -> Result<String> {
        let value = self.navigate_path(path)?;
        match value {
            Dynamic::String(s) => Ok(s.clone()),
            _ => Err(Self::mismatch(path, "string", value)),
        }
    }

    pub fn get_number(&self, path: &AttributePath) -> Result<f64> {
        let value = self.navigate_path(path)?;
        match value {
            Dynamic::Number(n) => Ok(*n),
            _ => Err(Self::mismatch(path, "number", value)),
        }
    }

    pub fn get_bool(&self, path: &AttributePath) -> Result<bool> {
        let value = self.navigate_path(path)?;
        match value {
            Dynamic::Bool(b) => Ok(*b),
            _ => Err(Self::mismatch(path, "bool", value)),
        }
    }

    pub fn get_list(&self, path: &AttributePath) -> Result<Vec<Dynamic>> {
        let value = self.navigate_path(path)?;
        match value {
            Dynamic::List(l) => Ok(l.clone()),
            _ => Err(Self::mismatch(path, "list", value)),
        }
    }

    pub fn get_map(&self, path: &AttributePath) -> Result<HashMap<String, Dynamic>> {
        let value = self.navigate_path(path)?;
        match value {
            Dynamic::Map(m) => Ok(m.clone()),
            _ => Err(Self::mismatch(path, "map", value)),
        }
    }

    /// Optional accessors treat missing and null alike
    pub fn get_optional_string(&self, path: &AttributePath) -> Result<Option<String>> {
        match self.get(path) {
            None | Some(Dynamic::Null) => Ok(None),
            Some(_) => self.get_string(path).map(Some),
        }
    }

    pub fn get_optional_number(&self, path: &AttributePath) -> Result<Option<f64>> {
        match self.get(path) {
            None | Some(Dynamic::Null) => Ok(None),
            Some(_) => self.get_number(path).map(Some),
        }
    }

    pub fn get_optional_bool(&self, path: &AttributePath) -> Result<Option<bool>> {
        match self.get(path) {
            None | Some(Dynamic::Null) => Ok(None),
            Some(_) => self.get_bool(path).map(Some),
        }
    }

    /// A list of strings; missing or null reads as empty
    pub fn get_string_list(&self, path: &AttributePath) -> Result<Vec<String>> {
        match self.get(path) {
            None | Some(Dynamic::Null) => Ok(Vec::new()),
            Some(_) => self
                .get_list(path)?
                .iter()
                .map(|item| match item {
                    Dynamic::String(s) => Ok(s.clone()),
                    other => Err(Self::mismatch(path, "string", other)),
                })
                .collect(),
        }
    }

    /// Type-safe setters - Use for building state/config objects
    pub fn set_string(&mut self, path: &AttributePath, value: String) -> Result<()> {
        self.set_value(path, Dynamic::String(value))
    }

    pub fn set_number(&mut self, path: &AttributePath, value: f64) -> Result<()> {
        self.set_value(path, Dynamic::Number(value))
    }

    pub fn set_bool(&mut self, path: &AttributePath, value: bool) -> Result<()> {
        self.set_value(path, Dynamic::Bool(value))
    }

    pub fn set_list(&mut self, path: &AttributePath, value: Vec<Dynamic>) -> Result<()> {
        self.set_value(path, Dynamic::List(value))
    }

    pub fn set_map(&mut self, path: &AttributePath, value: HashMap<String, Dynamic>) -> Result<()> {
        self.set_value(path, Dynamic::Map(value))
    }

    pub fn set_null(&mut self, path: &AttributePath) -> Result<()> {
        self.set_value(path, Dynamic::Null)
    }

    /// Writes null when the remote value is absent
    pub fn set_optional_string(&mut self, path: &AttributePath, value: Option<String>) -> Result<()> {
        self.set_value(path, value.map(Dynamic::String).unwrap_or(Dynamic::Null))
    }

    pub fn set_optional_number(&mut self, path: &AttributePath, value: Option<f64>) -> Result<()> {
        self.set_value(path, value.map(Dynamic::Number).unwrap_or(Dynamic::Null))
    }

    pub fn set_optional_bool(&mut self, path: &AttributePath, value: Option<bool>) -> Result<()> {
        self.set_value(path, value.map(Dynamic::Bool).unwrap_or(Dynamic::Null))
    }

    pub fn set_value(&mut self, path: &AttributePath, new_value: Dynamic) -> Result<()> {
        if path.steps.is_empty() {
            self.value = new_value;
            return Ok(());
        }

        // For non-empty paths, ensure we have a map at the root
        if !matches!(self.value, Dynamic::Map(_)) {
            self.value = Dynamic::Map(HashMap::new());
        }

        let mut current = &mut self.value;
        let last_idx = path.steps.len() - 1;

        for (idx, step) in path.steps.iter().enumerate() {
            if idx == last_idx {
                return match (current, step) {
                    (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                    | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                        m.insert(name.clone(), new_value);
                        Ok(())
                    }
                    (Dynamic::List(l), AttributePathStep::ElementKeyInt(i)) => {
                        match l.get_mut(*i as usize) {
                            Some(slot) => {
                                *slot = new_value;
                                Ok(())
                            }
                            None => Err(ReconcileError::AttributeNotFound(path.to_string())),
                        }
                    }
                    _ => Err(ReconcileError::AttributeNotFound(path.to_string())),
                };
            }

            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                    let next = match path.steps.get(idx + 1) {
                        Some(AttributePathStep::ElementKeyInt(_)) => Dynamic::List(Vec::new()),
                        _ => Dynamic::Map(HashMap::new()),
                    };
                    let slot = m.entry(name.clone()).or_insert(Dynamic::Null);
                    if slot.is_null() {
                        *slot = next;
                    }
                    slot
                }
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(i)) => l
                    .get_mut(*i as usize)
                    .ok_or_else(|| ReconcileError::AttributeNotFound(path.to_string()))?,
                _ => return Err(ReconcileError::AttributeNotFound(path.to_string())),
            };
        }

        Err(ReconcileError::AttributeNotFound(path.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Dynamic::Null)
    }

    fn navigate_path<'a>(&'a self, path: &AttributePath) -> Result<&'a Dynamic> {
        let mut current = &self.value;

        for step in &path.steps {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .get(name)
                    .ok_or_else(|| ReconcileError::AttributeNotFound(path.to_string()))?,
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(i)) => l
                    .get(*i as usize)
                    .ok_or_else(|| ReconcileError::AttributeNotFound(path.to_string()))?,
                _ => return Err(ReconcileError::AttributeNotFound(path.to_string())),
            };
        }

        Ok(current)
    }

    fn mismatch(path: &AttributePath, expected: &str, actual: &Dynamic) -> ReconcileError {
        ReconcileError::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }
}

impl Default for DynamicValue {
    fn default() -> Self {
        Self::empty_object()
    }
}

/// AttributePath represents a path to an attribute within a DynamicValue
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub steps: Vec<AttributePathStep>,
}

impl AttributePath {
    pub fn new(name: &str) -> Self {
        Self {
            steps: vec![AttributePathStep::AttributeName(name.to_string())],
        }
    }

    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.steps
            .push(AttributePathStep::AttributeName(name.to_string()));
        self
    }

    pub fn index(mut self, idx: i64) -> Self {
        self.steps.push(AttributePathStep::ElementKeyInt(idx));
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.steps
            .push(AttributePathStep::ElementKeyString(key.to_string()));
        self
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                AttributePathStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                AttributePathStep::AttributeName(name) => write!(f, ".{}", name)?,
                AttributePathStep::ElementKeyString(key) => write!(f, "[\"{}\"]", key)?,
                AttributePathStep::ElementKeyInt(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// Individual step in an AttributePath
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributePathStep {
    /// Access attribute by name in object/map
    AttributeName(String),
    /// Access element by string key (for maps)
    ElementKeyString(String),
    /// Access element by integer index (for lists)
    ElementKeyInt(i64),
}

/// Diagnostic represents a warning or error found while validating
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = Some(path);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.summary)
        } else {
            write!(f, "{} ({})", self.summary, self.detail)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Diagnostics collects validation findings, split by severity
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: Option<impl Into<String>>) {
        self.errors.push(Diagnostic::error(
            summary,
            detail.map(Into::into).unwrap_or_default(),
        ));
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: Option<impl Into<String>>) {
        self.warnings.push(Diagnostic::warning(
            summary,
            detail.map(Into::into).unwrap_or_default(),
        ));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Error => self.errors.push(diagnostic),
            DiagnosticSeverity::Warning => self.warnings.push(diagnostic),
        }
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Turn collected errors into a terminal validation failure for `kind`
    pub fn into_result(self, kind: &str) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(ReconcileError::Validation {
            kind: kind.to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_value_string_access() {
        let mut dv = DynamicValue::empty_object();
        dv.set_string(&AttributePath::new("name"), "test".to_string())
            .unwrap();

        let result = dv.get_string(&AttributePath::new("name")).unwrap();
        assert_eq!(result, "test");
    }

    #[test]
    fn dynamic_value_nested_access() {
        let mut dv = DynamicValue::empty_object();
        let path = AttributePath::new("target").attribute("id");
        dv.set_string(&path, "flow-1".to_string()).unwrap();

        assert_eq!(dv.get_string(&path).unwrap(), "flow-1");
        assert_eq!(path.to_string(), "target.id");
    }

    #[test]
    fn optional_accessors_treat_null_as_absent() {
        let mut dv = DynamicValue::empty_object();
        dv.set_null(&AttributePath::new("description")).unwrap();

        assert_eq!(
            dv.get_optional_string(&AttributePath::new("description"))
                .unwrap(),
            None
        );
        assert_eq!(
            dv.get_optional_number(&AttributePath::new("missing")).unwrap(),
            None
        );
        assert!(dv
            .get_string_list(&AttributePath::new("missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn accessor_reports_type_mismatch_with_path() {
        let dv = DynamicValue::from_pairs([("enabled", Dynamic::String("yes".to_string()))]);

        let err = dv.get_bool(&AttributePath::new("enabled")).unwrap_err();
        match err {
            ReconcileError::TypeMismatch {
                path,
                expected,
                actual,
            } => {
                assert_eq!(path, "enabled");
                assert_eq!(expected, "bool");
                assert_eq!(actual, "string");
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn whole_numbers_encode_as_integers() {
        let dv = DynamicValue::from_pairs([
            ("event_ttl_seconds", Dynamic::Number(15.0)),
            ("ratio", Dynamic::Number(0.5)),
        ]);

        let json: serde_json::Value = serde_json::from_slice(&dv.encode_json().unwrap()).unwrap();
        assert_eq!(json["event_ttl_seconds"], serde_json::json!(15));
        assert_eq!(json["ratio"], serde_json::json!(0.5));
    }

    #[test]
    fn empty_document_decodes_as_null() {
        assert!(DynamicValue::decode_json(b"  ").unwrap().is_null());
    }

    #[test]
    fn diagnostics_fold_into_validation_error() {
        let mut diags = Diagnostics::new();
        diags.add_error("name is required", None::<String>);
        diags.add_error("delay_by_seconds must be at most 900", Some("Got 901"));

        let err = diags.into_result("genesyscloud_team").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("name is required"));
        assert!(message.contains("Got 901"));
    }
}
