//! Qualified Names and Attribute Maps
//!
//! A qualified name is a (namespace URI, local name) pair. It is the only
//! dispatch key used anywhere in the crate: import handlers, export
//! attribute keys and generator lookups all go through it. The textual
//! prefix an input document happened to use is resolved away before a
//! name is built.

use std::fmt;

/// A namespace-qualified element or attribute name.
///
/// Ordering puts names without a namespace before namespaced ones, then
/// compares lexicographically. The stable generator relies on this
/// ordering to sort attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    uri: Option<String>,
    local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn new(local: impl Into<String>) -> Self {
        QName {
            uri: None,
            local: local.into(),
        }
    }

    /// A name qualified by a namespace URI.
    ///
    /// An empty URI means "no namespace" (the `xmlns=""` undeclaration
    /// form), so it collapses to a plain name.
    pub fn in_ns(uri: impl Into<String>, local: impl Into<String>) -> Self {
        let uri = uri.into();
        QName {
            uri: if uri.is_empty() { None } else { Some(uri) },
            local: local.into(),
        }
    }

    /// The namespace URI, if any.
    #[inline]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// The local part of the name.
    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    /// Clark notation: `{uri}local` for namespaced names, bare local
    /// otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Split a raw tag or attribute name at the colon.
///
/// Returns `(prefix, local)`; no colon means no prefix. A trailing or
/// leading colon is tolerated and treated as no prefix, matching how the
/// rest of the crate degrades on malformed input.
pub fn split_prefix(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => (Some(prefix), local),
        _ => (None, name),
    }
}

/// An insertion-ordered attribute map keyed by qualified name.
///
/// Insertion order is preserved so the base generator can reproduce the
/// order attributes were produced in; setting an existing key replaces
/// its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    items: Vec<(QName, String)>,
}

impl Attributes {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Attributes { items: Vec::new() }
    }

    /// Set an attribute in no namespace.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_qname(QName::new(name), value.into());
    }

    /// Set a namespace-qualified attribute.
    pub fn set_ns(
        &mut self,
        uri: impl Into<String>,
        local: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.set_qname(QName::in_ns(uri, local), value.into());
    }

    /// Set an attribute under an already-built qualified name.
    pub fn set_qname(&mut self, name: QName, value: String) {
        for (existing, slot) in &mut self.items {
            if *existing == name {
                *slot = value;
                return;
            }
        }
        self.items.push((name, value));
    }

    /// Look up an attribute in no namespace.
    pub fn get(&self, local: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(name, _)| name.uri().is_none() && name.local_name() == local)
            .map(|(_, value)| value.as_str())
    }

    /// Look up a namespace-qualified attribute.
    pub fn get_ns(&self, uri: &str, local: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(name, _)| name.uri() == Some(uri) && name.local_name() == local)
            .map(|(_, value)| value.as_str())
    }

    /// Look up by qualified name.
    pub fn get_qname(&self, name: &QName) -> Option<&str> {
        self.items
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of attributes.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no attributes are present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.items.iter().map(|(name, value)| (name, value.as_str()))
    }

    /// Entries sorted by qualified name, for stable output.
    pub fn sorted(&self) -> Vec<(&QName, &str)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

impl FromIterator<(QName, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (QName, String)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in iter {
            attrs.set_qname(name, value);
        }
        attrs
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Attributes {
    /// Plain (no-namespace) attributes from name/value pairs.
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in pairs {
            attrs.set(name, value);
        }
        attrs
    }
}
