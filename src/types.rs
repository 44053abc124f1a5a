//! Runtime type model for entities discovered at runtime.
//!
//! Entity types are nominal: two types with identical property tables are still
//! distinct unless they share a [`TypeHandle`]. Property tables are ordered, so
//! slot positions are stable for the lifetime of a type.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::Record;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`EntityType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeHandle(u64);

impl TypeHandle {
    fn next() -> Self {
        TypeHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared type of a field or column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int16,
    Int32,
    Int64,
    Double,
    String,
    /// Signed duration (`[-][d.]h:mm:ss[.fffffff]` in text form)
    TimeSpan,
    /// Timestamp without offset
    DateTime,
    /// Timestamp carrying its own UTC offset
    DateTimeOffset,
    Guid,
    /// Nested nominal type
    Entity(EntityType),
}

impl FieldType {
    /// Returns the entity type if this is a nominal record type.
    pub fn as_entity(&self) -> Option<&EntityType> {
        match self {
            FieldType::Entity(ty) => Some(ty),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int16 => write!(f, "int16"),
            FieldType::Int32 => write!(f, "int32"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Double => write!(f, "double"),
            FieldType::String => write!(f, "string"),
            FieldType::TimeSpan => write!(f, "timespan"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::DateTimeOffset => write!(f, "datetimeoffset"),
            FieldType::Guid => write!(f, "guid"),
            FieldType::Entity(ty) => write!(f, "{}", ty.name()),
        }
    }
}

/// A `(name, type)` pair describing one field of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl From<&PropertyInfo> for FieldDescriptor {
    fn from(property: &PropertyInfo) -> Self {
        Self::new(property.name(), property.field_type().clone())
    }
}

/// Error raised when a type, selector or initializer shape is invalid.
///
/// Shape errors are always raised while building, never while invoking.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeError {
    NoFields,
    InvalidFieldName {
        name: String,
    },
    DuplicateField {
        name: String,
    },
    UnknownProperty {
        type_name: String,
        property: String,
    },
    ForeignProperty {
        type_name: String,
        property: String,
    },
    PropertyTypeMismatch {
        type_name: String,
        property: String,
        expected: FieldType,
        actual: FieldType,
    },
    NotAnEntity {
        actual: FieldType,
    },
    UnboundParameter {
        name: String,
    },
    ParameterPosition {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::NoFields => write!(f, "At least one field is required"),
            ShapeError::InvalidFieldName { name } => {
                write!(f, "Invalid field name '{}'", name)
            }
            ShapeError::DuplicateField { name } => {
                write!(f, "Field '{}' appears more than once", name)
            }
            ShapeError::UnknownProperty { type_name, property } => {
                write!(f, "Type '{}' has no property '{}'", type_name, property)
            }
            ShapeError::ForeignProperty { type_name, property } => {
                write!(
                    f,
                    "Property '{}' is not declared by type '{}'",
                    property, type_name
                )
            }
            ShapeError::PropertyTypeMismatch {
                type_name,
                property,
                expected,
                actual,
            } => write!(
                f,
                "Property '{}.{}' has type {}, got {}",
                type_name, property, expected, actual
            ),
            ShapeError::NotAnEntity { actual } => {
                write!(f, "Expected an entity type, got {}", actual)
            }
            ShapeError::UnboundParameter { name } => {
                write!(f, "Parameter '{}' is not declared by the lambda", name)
            }
            ShapeError::ParameterPosition {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Parameter '{}' declared at position {} but listed at {}",
                name, actual, expected
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// A property declared by an [`EntityType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyInfo {
    declaring: TypeHandle,
    slot: usize,
    name: String,
    ty: FieldType,
}

impl PropertyInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Ordinal position of the property within its declaring type.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn declaring_type(&self) -> TypeHandle {
        self.declaring
    }
}

struct EntityTypeInner {
    handle: TypeHandle,
    name: String,
    composite: bool,
    properties: IndexMap<String, PropertyInfo>,
}

/// A nominal record type known only at runtime.
///
/// Cloning is cheap; clones share identity. Equality and hashing use the
/// [`TypeHandle`] only.
#[derive(Clone)]
pub struct EntityType {
    inner: Arc<EntityTypeInner>,
}

impl EntityType {
    /// Start declaring a new entity type.
    ///
    /// # Example
    ///
    /// ```
    /// use shadowdb::{EntityType, FieldType};
    ///
    /// let person = EntityType::builder("Person")
    ///     .property("Id", FieldType::Int32)
    ///     .property("Name", FieldType::String)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(person.property_count(), 2);
    /// assert_eq!(person.property("Name").unwrap().slot(), 1);
    /// ```
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            composite: false,
            fields: Vec::new(),
        }
    }

    pub fn handle(&self) -> TypeHandle {
        self.inner.handle
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True for types manufactured by the composite-key forge.
    pub fn is_composite(&self) -> bool {
        self.inner.composite
    }

    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.inner.properties.get(name)
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyInfo> {
        self.inner.properties.values()
    }

    pub fn property_at(&self, slot: usize) -> Option<&PropertyInfo> {
        self.inner.properties.get_index(slot).map(|(_, p)| p)
    }

    pub fn property_count(&self) -> usize {
        self.inner.properties.len()
    }

    #[cfg(test)]
    pub(crate) fn live_references(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Field shape of this type: its properties as `(name, type)` pairs, in order.
    pub fn shape(&self) -> Vec<FieldDescriptor> {
        self.properties().map(FieldDescriptor::from).collect()
    }

    /// Default construction: every member starts out null.
    pub fn new_instance(&self) -> Record {
        Record::new(self)
    }

    /// Check that `property` is readable from this type and return this type's
    /// own descriptor for it.
    ///
    /// The property must be declared by this type (not merely share a name)
    /// and carry the same declared type.
    pub fn resolve(&self, property: &PropertyInfo) -> Result<&PropertyInfo, ShapeError> {
        let own = self
            .property(property.name())
            .ok_or_else(|| ShapeError::UnknownProperty {
                type_name: self.name().to_string(),
                property: property.name().to_string(),
            })?;

        if property.declaring_type() != self.handle() {
            return Err(ShapeError::ForeignProperty {
                type_name: self.name().to_string(),
                property: property.name().to_string(),
            });
        }

        if own.field_type() != property.field_type() {
            return Err(ShapeError::PropertyTypeMismatch {
                type_name: self.name().to_string(),
                property: property.name().to_string(),
                expected: own.field_type().clone(),
                actual: property.field_type().clone(),
            });
        }

        Ok(own)
    }

    /// Look up several properties by name, preserving the requested order.
    pub fn properties_named(&self, names: &[&str]) -> Result<Vec<PropertyInfo>, ShapeError> {
        names
            .iter()
            .map(|name| {
                self.property(name)
                    .cloned()
                    .ok_or_else(|| ShapeError::UnknownProperty {
                        type_name: self.name().to_string(),
                        property: name.to_string(),
                    })
            })
            .collect()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.handle.hash(state);
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("handle", &self.inner.handle)
            .field("name", &self.inner.name)
            .field("properties", &self.inner.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`EntityType`].
pub struct EntityTypeBuilder {
    name: String,
    composite: bool,
    fields: Vec<FieldDescriptor>,
}

impl EntityTypeBuilder {
    pub fn property(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor::new(name, ty));
        self
    }

    pub fn properties<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = FieldDescriptor>,
    {
        self.fields.extend(fields);
        self
    }

    pub(crate) fn composite(mut self) -> Self {
        self.composite = true;
        self
    }

    /// Validate the property list and allocate a fresh type handle.
    pub fn build(self) -> Result<EntityType, ShapeError> {
        validate_shape(&self.fields)?;

        let handle = TypeHandle::next();
        let properties = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(slot, field)| {
                let info = PropertyInfo {
                    declaring: handle,
                    slot,
                    name: field.name.clone(),
                    ty: field.ty,
                };
                (field.name, info)
            })
            .collect();

        Ok(EntityType {
            inner: Arc::new(EntityTypeInner {
                handle,
                name: self.name,
                composite: self.composite,
                properties,
            }),
        })
    }
}

/// Reject empty shapes, blank names and duplicate names.
pub(crate) fn validate_shape(fields: &[FieldDescriptor]) -> Result<(), ShapeError> {
    if fields.is_empty() {
        return Err(ShapeError::NoFields);
    }

    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ShapeError::InvalidFieldName {
                name: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ShapeError::DuplicateField {
                name: field.name.clone(),
            });
        }
    }

    Ok(())
}
