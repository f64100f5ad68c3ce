//! Post-write convergence check
//!
//! After a create or update, the entity is read back and flattened into
//! state. `ConsistencyCheck` compares that state with what the write
//! declared and reports the first attribute that did not take effect. Drift
//! discovered by a plain refresh is never checked.

use crate::error::Inconsistency;
use crate::schema::{Attribute, Schema};
use crate::types::{AttributePath, Dynamic, DynamicValue};

#[derive(Debug, Clone)]
pub struct ConsistencyCheck {
    expectations: Vec<(Attribute, Dynamic)>,
}

impl ConsistencyCheck {
    /// Capture the declared values the write is expected to establish.
    /// Sensitive and server-computed attributes are skipped, as are
    /// attributes the declaration leaves null. Empty and zero values are
    /// still checked.
    pub fn new(declared: &DynamicValue, schema: &Schema) -> Self {
        let expectations = schema
            .attributes()
            .filter(|attr| !attr.sensitive && !attr.is_computed_only())
            .filter_map(|attr| {
                declared
                    .get(&AttributePath::new(&attr.name))
                    .filter(|value| !value.is_null())
                    .map(|value| (attr.clone(), value.clone()))
            })
            .collect();

        Self { expectations }
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn check(&self, state: &DynamicValue) -> Result<(), Inconsistency> {
        for (attr, expected) in &self.expectations {
            let actual = state
                .get(&AttributePath::new(&attr.name))
                .cloned()
                .unwrap_or(Dynamic::Null);

            if !attr.equivalent(expected, &actual) {
                tracing::debug!(
                    "Attribute {} not yet consistent: expected {}, found {}",
                    attr.name,
                    expected,
                    actual
                );
                return Err(Inconsistency {
                    attribute: attr.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}
