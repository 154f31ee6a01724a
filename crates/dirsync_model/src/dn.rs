//! Distinguished names.
//!
//! A `Dn` addresses an entry in the tree as a sequence of `Rdn`
//! components, leaf first, e.g. `uid=1,ou=people,dc=example`.
//! Attribute ids are normalized to lowercase on parse; values keep
//! their original case but compare case-insensitively.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A single relative distinguished name component, `id=value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rdn {
    id: String,
    value: String,
}

impl Rdn {
    /// Creates an RDN from an attribute id and value.
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_ascii_lowercase(),
            value: value.into().trim().to_string(),
        }
    }

    /// Parses an RDN from an `id=value` string.
    pub fn parse(s: &str) -> StoreResult<Self> {
        let (id, value) = s
            .split_once('=')
            .ok_or_else(|| StoreError::InvalidDn(format!("missing '=' in rdn: {s}")))?;

        let id = id.trim();
        let value = value.trim();

        if id.is_empty() || value.is_empty() {
            return Err(StoreError::InvalidDn(format!("empty rdn component: {s}")));
        }

        Ok(Self::new(id, value))
    }

    /// Returns the attribute id (lowercase).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }

    fn norm(&self) -> (&str, String) {
        (&self.id, self.value.to_ascii_lowercase())
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.norm() == other.norm()
    }
}

impl Eq for Rdn {}

impl PartialOrd for Rdn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rdn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm().cmp(&other.norm())
    }
}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (id, value) = self.norm();
        id.hash(state);
        value.hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, self.value)
    }
}

/// A distinguished name: the full path of an entry, leaf RDN first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dn {
    components: Vec<Rdn>,
}

impl Dn {
    /// Parses a DN from its string form, e.g. `uid=1,ou=people,dc=example`.
    pub fn parse(s: &str) -> StoreResult<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(StoreError::InvalidDn("empty dn".into()));
        }

        let components = s
            .split(',')
            .map(Rdn::parse)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self { components })
    }

    /// Builds a DN from components, leaf first.
    pub fn from_rdns(components: Vec<Rdn>) -> Self {
        Self { components }
    }

    /// Returns the leaf RDN.
    pub fn rdn(&self) -> &Rdn {
        // components is never empty: parse rejects "" and from_rdns callers
        // always pass at least one component
        &self.components[0]
    }

    /// Returns the parent DN, or `None` for a single-component DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.components.len() <= 1 {
            return None;
        }

        Some(Dn {
            components: self.components[1..].to_vec(),
        })
    }

    /// Returns the DN of a child entry with the given RDN.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(rdn);
        components.extend(self.components.iter().cloned());
        Dn { components }
    }

    /// Returns a copy of this DN moved under a new parent.
    pub fn under(&self, new_parent: &Dn) -> Dn {
        new_parent.child(self.rdn().clone())
    }

    /// Returns a copy of this DN with the leaf RDN replaced.
    pub fn with_rdn(&self, new_rdn: Rdn) -> Dn {
        let mut components = self.components.clone();
        components[0] = new_rdn;
        Dn { components }
    }

    /// Returns the number of RDN components.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Returns true if `self` is a proper descendant of `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        let n = ancestor.components.len();

        self.components.len() > n && self.components[self.components.len() - n..] == ancestor.components[..]
    }

    /// Returns true if `self` equals `base` or descends from it.
    pub fn is_under(&self, base: &Dn) -> bool {
        self == base || self.is_descendant_of(base)
    }

    /// Rewrites this DN after its ancestor `old_base` moved to `new_base`.
    ///
    /// Used when a subtree move has to re-key descendant entries.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Dn {
        debug_assert!(self.is_under(old_base));

        let keep = self.components.len() - old_base.components.len();
        let mut components = self.components[..keep].to_vec();
        components.extend(new_base.components.iter().cloned());
        Dn { components }
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Dn {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn parse_and_display() {
        let d = dn("uid=1, ou=People ,dc=example");
        assert_eq!(d.to_string(), "uid=1,ou=People,dc=example");
        assert_eq!(d.rdn().id(), "uid");
        assert_eq!(d.rdn().value(), "1");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Dn::parse("").is_err());
        assert!(Dn::parse("uid").is_err());
        assert!(Dn::parse("uid=,dc=x").is_err());
    }

    #[test]
    fn case_insensitive_equality() {
        assert_eq!(dn("OU=People,DC=Example"), dn("ou=people,dc=example"));

        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(dn("ou=People,dc=example"));
        assert!(set.contains(&dn("OU=PEOPLE,DC=EXAMPLE")));
    }

    #[test]
    fn parent_and_child() {
        let d = dn("uid=1,ou=people,dc=example");
        assert_eq!(d.parent().unwrap(), dn("ou=people,dc=example"));
        assert!(dn("dc=example").parent().is_none());

        let c = dn("ou=people,dc=example").child(Rdn::new("uid", "2"));
        assert_eq!(c, dn("uid=2,ou=people,dc=example"));
    }

    #[test]
    fn descendant_checks() {
        let base = dn("ou=people,dc=example");
        assert!(dn("uid=1,ou=people,dc=example").is_descendant_of(&base));
        assert!(dn("cn=a,uid=1,ou=people,dc=example").is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(base.is_under(&base));
        assert!(!dn("uid=1,ou=groups,dc=example").is_descendant_of(&base));
    }

    #[test]
    fn rebase_after_move() {
        let old_base = dn("ou=people,dc=example");
        let new_base = dn("ou=people,ou=archive,dc=example");
        let d = dn("cn=a,uid=1,ou=people,dc=example");

        assert_eq!(
            d.rebase(&old_base, &new_base),
            dn("cn=a,uid=1,ou=people,ou=archive,dc=example")
        );
    }

    #[test]
    fn with_rdn_and_under() {
        let d = dn("uid=1,ou=people,dc=example");
        assert_eq!(
            d.with_rdn(Rdn::new("uid", "one")),
            dn("uid=one,ou=people,dc=example")
        );
        assert_eq!(
            d.under(&dn("ou=archive,dc=example")),
            dn("uid=1,ou=archive,dc=example")
        );
    }
}
