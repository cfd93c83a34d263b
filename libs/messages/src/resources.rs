//! Named scalar resource vectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// A vector of named scalar resources, e.g. `cpus:1;mem:1024`.
///
/// Missing resources read as zero. Subtraction saturates: a resource whose
/// value reaches zero (or would go below it) is dropped from the vector, so
/// an executor with no launched tasks holds an empty vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources(BTreeMap<String, f64>);

impl Resources {
    /// An empty resource vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `name:value;name:value` specification.
    ///
    /// Empty segments are skipped, so trailing separators are harmless.
    pub fn parse(s: &str) -> Result<Self, MessageError> {
        let mut scalars = BTreeMap::new();

        for part in s.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let Some((name, value)) = part.split_once(':') else {
                return Err(MessageError::InvalidResources(format!(
                    "missing ':' in {part:?}"
                )));
            };

            let value: f64 = value.trim().parse().map_err(|_| {
                MessageError::InvalidResources(format!("bad scalar in {part:?}"))
            })?;

            if value < 0.0 {
                return Err(MessageError::InvalidResources(format!(
                    "negative scalar in {part:?}"
                )));
            }

            if value > 0.0 {
                scalars.insert(name.trim().to_string(), value);
            }
        }

        Ok(Self(scalars))
    }

    /// Returns the scalar value for `name`, or zero if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    /// True if no resources are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds another vector into this one.
    pub fn add(&mut self, other: &Resources) {
        for (name, value) in &other.0 {
            *self.0.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    /// Subtracts another vector from this one, saturating at zero.
    pub fn subtract(&mut self, other: &Resources) {
        for (name, value) in &other.0 {
            if let Some(current) = self.0.get_mut(name) {
                *current -= value;
                if *current <= 0.0 {
                    self.0.remove(name);
                }
            }
        }
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl std::fmt::Display for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{name}:{value}")?;
            first = false;
        }
        Ok(())
    }
}
