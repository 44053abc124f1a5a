//! Table and column metadata handed to data loaders.

use crate::types::{EntityType, FieldDescriptor, FieldType, ShapeError};

/// A column: name plus declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    name: String,
    ty: FieldType,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }
}

/// A table: name plus ordered columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    name: String,
    columns: Vec<ColumnDescription>,
}

impl TableDescription {
    pub fn new<I>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnDescription>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Declare an entity type whose properties mirror the columns, in order.
    pub fn to_entity_type(&self) -> Result<EntityType, ShapeError> {
        EntityType::builder(self.name.clone())
            .properties(
                self.columns
                    .iter()
                    .map(|c| FieldDescriptor::new(c.name.clone(), c.ty.clone())),
            )
            .build()
    }
}
