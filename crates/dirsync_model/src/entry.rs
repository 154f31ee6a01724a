//! Entries and attribute-level changes.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, multi-valued attribute.
///
/// Attribute ids are normalized to lowercase; values compare
/// case-insensitively but keep their original form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    id: String,
    values: Vec<String>,
}

impl Attribute {
    /// Creates an empty attribute with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into().to_ascii_lowercase(),
            values: Vec::new(),
        }
    }

    /// Creates an attribute with the given values.
    pub fn with_values<I, S>(id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attr = Self::new(id);
        for v in values {
            attr.add_value(v);
        }
        attr
    }

    /// Returns the attribute id (lowercase).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the attribute values.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Returns the first value, if any.
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Returns true if the attribute holds the given value.
    pub fn contains_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.eq_ignore_ascii_case(value))
    }

    /// Adds a value unless an equal one is already present.
    ///
    /// Returns true if the value was added.
    pub fn add_value(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();

        if self.contains_value(&value) {
            return false;
        }

        self.values.push(value);
        true
    }

    /// Removes a value if present. Returns true if something was removed.
    pub fn remove_value(&mut self, value: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|v| !v.eq_ignore_ascii_case(value));
        before != self.values.len()
    }

    /// Returns true if the attribute has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// A single attribute-level change, the unit of a modify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeChange {
    /// Add the given values to the attribute (created if absent).
    Add(Attribute),
    /// Remove the given values, or the whole attribute if no values given.
    Remove(Attribute),
    /// Replace the attribute wholesale, or remove it if no values given.
    Replace(Attribute),
}

impl AttributeChange {
    /// Returns the attribute this change targets.
    pub fn attribute(&self) -> &Attribute {
        match self {
            AttributeChange::Add(a) | AttributeChange::Remove(a) | AttributeChange::Replace(a) => a,
        }
    }
}

/// A directory entry: a DN plus a set of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    /// Creates an entry with no attributes.
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the entry's DN.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Replaces the entry's DN. Used by structural operations.
    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Returns the attribute with the given id, if present.
    pub fn get(&self, id: &str) -> Option<&Attribute> {
        self.attributes.get(&id.to_ascii_lowercase())
    }

    /// Returns true if the entry has an attribute with the given id.
    pub fn has(&self, id: &str) -> bool {
        self.attributes.contains_key(&id.to_ascii_lowercase())
    }

    /// Inserts or replaces an attribute.
    pub fn put(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.id().to_string(), attribute);
    }

    /// Convenience: puts an attribute built from id and values.
    pub fn put_values<I, S>(&mut self, id: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.put(Attribute::with_values(id, values));
    }

    /// Removes the attribute with the given id.
    pub fn remove(&mut self, id: &str) -> Option<Attribute> {
        self.attributes.remove(&id.to_ascii_lowercase())
    }

    /// Iterates over the entry's attributes in id order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Returns the number of attributes.
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Returns a copy of this entry restricted to the given attribute ids.
    ///
    /// An empty id list means all attributes.
    pub fn projected(&self, ids: &[String]) -> Entry {
        if ids.is_empty() {
            return self.clone();
        }

        let mut out = Entry::new(self.dn.clone());

        for id in ids {
            if let Some(attr) = self.get(id) {
                out.put(attr.clone());
            }
        }

        out
    }

    /// Applies a list of changes to this entry in order.
    pub fn apply_changes(&mut self, changes: &[AttributeChange]) {
        for change in changes {
            match change {
                AttributeChange::Add(attr) => {
                    let existing = self
                        .attributes
                        .entry(attr.id().to_string())
                        .or_insert_with(|| Attribute::new(attr.id()));
                    for v in attr.values() {
                        existing.add_value(v.clone());
                    }
                }
                AttributeChange::Remove(attr) => {
                    if attr.is_empty() {
                        self.attributes.remove(attr.id());
                    } else if let Some(existing) = self.attributes.get_mut(attr.id()) {
                        for v in attr.values() {
                            existing.remove_value(v);
                        }
                        if existing.is_empty() {
                            self.attributes.remove(attr.id());
                        }
                    }
                }
                AttributeChange::Replace(attr) => {
                    if attr.is_empty() {
                        self.attributes.remove(attr.id());
                    } else {
                        self.put(attr.clone());
                    }
                }
            }
        }
    }
}
