//! Composite-key type forge.
//!
//! Manufactures one nominal [`EntityType`] per distinct, order-sensitive field
//! shape and hands back the same type for every later request with that shape.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::types::{validate_shape, EntityType, FieldDescriptor, ShapeError};

static GLOBAL_FORGE: OnceLock<TypeForge> = OnceLock::new();

/// Shape-keyed cache of forged composite types.
///
/// Lookup and insert happen under one lock, so concurrent requests for the
/// same shape always observe a single type.
pub struct TypeForge {
    types: Mutex<HashMap<Vec<FieldDescriptor>, EntityType>>,
}

impl TypeForge {
    /// Create an isolated forge. Most callers want [`TypeForge::global`].
    pub fn new() -> Self {
        Self {
            types: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide forge. Types forged here live for the whole process.
    pub fn global() -> &'static TypeForge {
        GLOBAL_FORGE.get_or_init(TypeForge::new)
    }

    /// Resolve the composite type for `fields`, forging it on first use.
    ///
    /// # Arguments
    ///
    /// * `fields` - Ordered `(name, type)` pairs; at least one, names unique
    ///
    /// # Returns
    ///
    /// * `Ok(EntityType)` - A default-constructible type with one settable
    ///   property per field, in the same order
    /// * `Err(ShapeError)` - The shape is empty or has duplicate/blank names
    pub fn forge(&self, fields: &[FieldDescriptor]) -> Result<EntityType, ShapeError> {
        validate_shape(fields)?;

        let mut types = self.types.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = types.get(fields) {
            tracing::trace!("Composite type {} reused", existing.name());
            return Ok(existing.clone());
        }

        let name = format!("CompositeKey{}", types.len() + 1);
        let forged = EntityType::builder(name)
            .composite()
            .properties(fields.iter().cloned())
            .build()?;

        tracing::debug!(
            "Forged composite type {} ({}) for fields [{}]",
            forged.name(),
            forged.handle(),
            describe(fields)
        );

        types.insert(fields.to_vec(), forged.clone());
        Ok(forged)
    }

    /// Number of distinct shapes forged so far.
    pub fn len(&self) -> usize {
        self.types.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeForge {
    fn default() -> Self {
        Self::new()
    }
}

/// Forge (or reuse) a composite type in the process-wide forge.
pub fn forge_composite_type(fields: &[FieldDescriptor]) -> Result<EntityType, ShapeError> {
    TypeForge::global().forge(fields)
}

fn describe(fields: &[FieldDescriptor]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.name, f.ty))
        .collect::<Vec<_>>()
        .join(", ")
}
