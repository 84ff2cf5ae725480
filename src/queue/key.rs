//! Object keys carried by the retry dispatcher.
//!
//! Work items are raw strings. With the default [`KeyFormat::NamespacedName`] they
//! take the form `namespace/name` (namespaced objects) or `name` (cluster-scoped
//! objects) and anything else is a malformed item. [`KeyFormat::Opaque`] accepts
//! any non-empty string as-is.

use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;

/// Parsed `namespace/name` identity of the object a work item refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    /// Key of a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Namespace, `None` for cluster-scoped objects.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ObjectKey {
    type Err = DispatchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || DispatchError::InvalidKey {
            key: raw.to_string(),
        };
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok(Self::cluster(name)),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Ok(Self::namespaced(ns, name))
            }
            _ => Err(invalid()),
        }
    }
}

/// How a dispatcher turns raw work items into [`ObjectKey`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyFormat {
    /// `namespace/name` or `name`, as parsed by `ObjectKey`'s `FromStr`.
    #[default]
    NamespacedName,
    /// Any non-empty string, kept whole as a cluster-scoped name.
    Opaque,
}

impl KeyFormat {
    /// Parses `raw` under this format.
    pub fn parse(self, raw: &str) -> Result<ObjectKey, DispatchError> {
        match self {
            KeyFormat::NamespacedName => raw.parse(),
            KeyFormat::Opaque if raw.is_empty() => Err(DispatchError::InvalidKey {
                key: String::new(),
            }),
            KeyFormat::Opaque => Ok(ObjectKey::cluster(raw)),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}
