//! Static property registries for structured object model nodes.
//!
//! Every structured node kind declares a [`Schema`]: an ordered table of
//! properties, each with a known [`PropertyKind`] and a `restricted` flag.
//! Restricted properties are only visible to callers that explicitly ask for
//! the restricted view (properties maintained by the control server itself
//! rather than by the firmware).

use std::fmt;

/// Property registry of one structured node kind.
pub struct Schema {
    /// Type name, used for diagnostics only
    pub name: &'static str,
    /// Declared properties in serialization order
    pub properties: &'static [PropertyDef],
}

impl Schema {
    /// Find the position of a property (case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Look up a property definition (case-insensitive).
    pub fn property(&self, name: &str) -> Option<&'static PropertyDef> {
        self.position(name).map(|i| &self.properties[i])
    }
}

// Schemas are statics, so identity is the only meaningful equality.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema({})", self.name)
    }
}

/// A single registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDef {
    /// JSON property name (camelCase, case preserved on output)
    pub name: &'static str,
    /// Declared kind of the property value
    pub kind: PropertyKind,
    /// Only visible when the restricted view is requested
    pub restricted: bool,
}

impl PropertyDef {
    pub const fn scalar(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Scalar)
    }

    pub const fn structured(name: &'static str, schema: &'static Schema) -> Self {
        Self::new(name, PropertyKind::Structured(schema))
    }

    pub const fn list(name: &'static str, element: ElementKind) -> Self {
        Self::new(name, PropertyKind::List(element))
    }

    pub const fn map(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Map)
    }

    pub const fn blob(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Blob)
    }

    /// Mark this property as restricted.
    pub const fn restricted(self) -> Self {
        Self {
            restricted: true,
            ..self
        }
    }

    const fn new(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            restricted: false,
        }
    }
}

/// Statically known kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// String, number, boolean or null
    Scalar,
    /// Nested structured node
    Structured(&'static Schema),
    /// Ordered list with a declared element kind
    List(ElementKind),
    /// Open string-keyed map
    Map,
    /// Pre-serialized JSON fragment
    Blob,
}

impl PropertyKind {
    /// Whether a filter or lookup may descend below a property of this kind.
    pub fn is_descendable(&self) -> bool {
        !matches!(self, PropertyKind::Scalar)
    }
}

/// Declared element kind of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Scalar,
    Structured(&'static Schema),
    List,
}

impl ElementKind {
    /// Lists of scalars are never partially projected.
    pub fn is_container(&self) -> bool {
        !matches!(self, ElementKind::Scalar)
    }
}
