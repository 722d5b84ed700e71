//! # Faceting Definitions
//!
//! A `FacetingDefinition` is an immutable, recursive tree node describing how
//! far an entity graph should be materialized:
//!
//! ```text
//! { class_type, populated, children: { field_key -> FacetingDefinition } }
//! ```
//!
//! - `populated = false`: the entity is reduced to its reference form and
//!   `children` is ignored (and must be empty).
//! - `populated = true`: each entry of `children` governs one nested field.
//!   Fields with no entry are left exactly as provided.
//!
//! Definitions are plain data. They are shared read-only by concurrent
//! populate calls and may be loaded from JSON or TOML.

use crate::types::{ClassType, FacetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative description of how deep to populate an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetingDefinition {
    /// Name of the type this node governs.
    class_type: String,
    /// Whether the governed entity keeps (or gains) its data.
    populated: bool,
    /// Nested definitions keyed by field name.
    #[serde(default)]
    children: BTreeMap<String, FacetingDefinition>,
}

impl FacetingDefinition {
    /// Start building a definition for the given class type.
    #[must_use]
    pub fn builder(class_type: impl Into<String>) -> FacetingDefinitionBuilder {
        FacetingDefinitionBuilder {
            class_type: class_type.into(),
            populated: false,
            children: BTreeMap::new(),
        }
    }

    /// A childless definition that populates `class_type`.
    #[must_use]
    pub fn populated(class_type: ClassType) -> Self {
        Self {
            class_type: class_type.as_str().to_string(),
            populated: true,
            children: BTreeMap::new(),
        }
    }

    /// A populated definition with the given children.
    ///
    /// Populated nodes may carry any children, so this cannot fail.
    #[must_use]
    pub fn populated_with<K, I>(class_type: ClassType, children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FacetingDefinition)>,
    {
        Self {
            class_type: class_type.as_str().to_string(),
            populated: true,
            children: children
                .into_iter()
                .map(|(key, child)| (key.into(), child))
                .collect(),
        }
    }

    /// A definition that reduces `class_type` to its reference form.
    #[must_use]
    pub fn unpopulated(class_type: ClassType) -> Self {
        Self {
            class_type: class_type.as_str().to_string(),
            populated: false,
            children: BTreeMap::new(),
        }
    }

    /// Name of the governed class type, as written.
    #[must_use]
    pub fn class_type(&self) -> &str {
        &self.class_type
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// All nested definitions.
    #[must_use]
    pub fn children(&self) -> &BTreeMap<String, FacetingDefinition> {
        &self.children
    }

    /// The nested definition for `key`, if any.
    #[must_use]
    pub fn child(&self, key: &str) -> Option<&FacetingDefinition> {
        self.children.get(key)
    }

    /// Nesting depth of this tree; a childless node has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .values()
            .map(FacetingDefinition::depth)
            .max()
            .unwrap_or(0)
    }

    /// Check the shape of this tree and every subtree.
    ///
    /// Deserialized definitions bypass the builder, so loaders call this
    /// before handing a tree to the engine.
    pub fn check_shape(&self) -> Result<(), FacetError> {
        if !self.populated && !self.children.is_empty() {
            return Err(FacetError::ChildrenWithoutData(self.class_type.clone()));
        }
        self.children
            .values()
            .try_for_each(FacetingDefinition::check_shape)
    }
}

/// Builder for [`FacetingDefinition`].
#[derive(Debug, Clone)]
pub struct FacetingDefinitionBuilder {
    class_type: String,
    populated: bool,
    children: BTreeMap<String, FacetingDefinition>,
}

impl FacetingDefinitionBuilder {
    #[must_use]
    pub fn populated(mut self, populated: bool) -> Self {
        self.populated = populated;
        self
    }

    /// Add (or replace) the nested definition for `key`.
    #[must_use]
    pub fn child(mut self, key: impl Into<String>, definition: FacetingDefinition) -> Self {
        self.children.insert(key.into(), definition);
        self
    }

    /// Finish the definition.
    ///
    /// # Errors
    ///
    /// Returns `FacetError::ChildrenWithoutData` if the definition is not
    /// populated but declares children.
    pub fn build(self) -> Result<FacetingDefinition, FacetError> {
        let definition = FacetingDefinition {
            class_type: self.class_type,
            populated: self.populated,
            children: self.children,
        };
        if !definition.populated && !definition.children.is_empty() {
            return Err(FacetError::ChildrenWithoutData(definition.class_type));
        }
        Ok(definition)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate a definition against the class type a resolver expects.
///
/// # Errors
///
/// - `MissingDefinition` when no definition was supplied
/// - `ClassTypeMismatch` when the definition governs another type
pub fn validate(
    definition: Option<&FacetingDefinition>,
    expected: ClassType,
) -> Result<&FacetingDefinition, FacetError> {
    let definition = definition.ok_or(FacetError::MissingDefinition(expected))?;
    if definition.class_type != expected.as_str() {
        return Err(FacetError::ClassTypeMismatch {
            expected,
            found: definition.class_type.clone(),
        });
    }
    Ok(definition)
}

/// Validate a definition for a value object that has no reference form.
///
/// # Errors
///
/// Everything [`validate`] returns, plus `ParentNotPopulated` when the
/// definition asks for the value to be stripped.
pub fn require_populated(
    definition: Option<&FacetingDefinition>,
    expected: ClassType,
) -> Result<&FacetingDefinition, FacetError> {
    let definition = validate(definition, expected)?;
    if !definition.populated {
        return Err(FacetError::ParentNotPopulated(expected));
    }
    Ok(definition)
}

/// Parse the class type a definition names.
///
/// # Errors
///
/// Returns `UnregisteredClassType` for names outside [`ClassType::ALL`].
pub fn class_type_of(definition: &FacetingDefinition) -> Result<ClassType, FacetError> {
    definition.class_type.parse()
}

// =============================================================================
// TESTS
// =============================================================================
