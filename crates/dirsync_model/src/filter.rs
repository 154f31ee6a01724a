//! Search filters and scopes.

use crate::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far below the search base a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The base entry only.
    Object,
    /// Direct children of the base, excluding the base itself.
    OneLevel,
    /// The base entry and every descendant.
    Subtree,
}

/// Alias dereferencing policy for searches.
///
/// The replication engine itself always searches with `Never`; the other
/// variants exist because the configuration surface forwards the policy
/// to the provider verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AliasDerefMode {
    /// Never dereference aliases.
    Never,
    /// Dereference while searching below the base.
    Searching,
    /// Dereference while locating the base.
    Finding,
    /// Always dereference.
    Always,
}

/// A search filter over entry attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches entries that have the attribute at all.
    Present(String),
    /// Matches entries where the attribute holds the value.
    Equality(String, String),
    /// Matches when every sub-filter matches.
    And(Vec<Filter>),
    /// Matches when any sub-filter matches.
    Or(Vec<Filter>),
    /// Matches when the sub-filter does not.
    Not(Box<Filter>),
}

impl Filter {
    /// The match-everything filter used for full-tree listings.
    pub fn present(id: impl Into<String>) -> Self {
        Filter::Present(id.into().to_ascii_lowercase())
    }

    /// An equality filter on the given attribute.
    pub fn eq(id: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equality(id.into().to_ascii_lowercase(), value.into())
    }

    /// Evaluates the filter against an entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::Present(id) => entry.has(id),
            Filter::Equality(id, value) => entry
                .get(id)
                .map(|attr| attr.contains_value(value))
                .unwrap_or(false),
            Filter::And(subs) => subs.iter().all(|f| f.matches(entry)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(entry)),
            Filter::Not(sub) => !sub.matches(entry),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Present(id) => write!(f, "({id}=*)"),
            Filter::Equality(id, value) => write!(f, "({id}={value})"),
            Filter::And(subs) => {
                write!(f, "(&")?;
                for sub in subs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Or(subs) => {
                write!(f, "(|")?;
                for sub in subs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Not(sub) => write!(f, "(!{sub})"),
        }
    }
}
