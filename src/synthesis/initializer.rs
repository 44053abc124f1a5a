//! Initializer synthesis: `(v1, .., vn) -> instance` constructors.

use std::fmt;

use crate::synthesis::expression::{
    CompiledLambda, Expression, InvocationError, LambdaExpression, MemberBinding,
    ParameterExpression,
};
use crate::types::{EntityType, FieldType, PropertyInfo, ShapeError};
use crate::value::{Record, Value};

/// Build `(p0, .., pn) => new T { P0 = p0, .., Pn = pn }`.
///
/// One parameter is declared per property, with the property's type, in the
/// order given. An empty property list yields a plain default construction.
pub fn create_initializer_expression(
    target: &EntityType,
    properties: &[PropertyInfo],
) -> Result<LambdaExpression, ShapeError> {
    let parameters: Vec<ParameterExpression> = properties
        .iter()
        .enumerate()
        .map(|(position, property)| {
            ParameterExpression::new(
                parameter_name(property.name(), position),
                property.field_type().clone(),
                position,
            )
        })
        .collect();

    let bindings = properties
        .iter()
        .zip(&parameters)
        .map(|(property, parameter)| {
            MemberBinding::bind(property.clone(), Expression::parameter(parameter))
        })
        .collect();

    // member_init resolves each property against the target and rejects duplicates
    let body = Expression::member_init(target, bindings)?;
    LambdaExpression::new(body, parameters)
}

fn parameter_name(property: &str, position: usize) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_lowercase(), chars.as_str()),
        None => format!("p{}", position),
    }
}

/// Compiled constructor for a target entity type.
#[derive(Clone)]
pub struct Initializer {
    target: EntityType,
    expression: LambdaExpression,
    compiled: CompiledLambda,
}

impl Initializer {
    /// Construct an instance from positional arguments.
    ///
    /// Arguments must match the synthesized property list in count, order and
    /// type; null is accepted for any property.
    pub fn invoke(&self, args: &[Value]) -> Result<Record, InvocationError> {
        match self.compiled.invoke(args)? {
            Value::Record(record) => Ok(record),
            _ => Err(InvocationError::NotAnInstance {
                expected: self.target.name().to_string(),
                member: String::from("<new>"),
            }),
        }
    }

    pub fn target_type(&self) -> &EntityType {
        &self.target
    }

    /// Declared parameter types, in order.
    pub fn parameter_types(&self) -> Vec<FieldType> {
        self.expression
            .parameters()
            .iter()
            .map(|p| p.field_type().clone())
            .collect()
    }

    pub fn expression(&self) -> &LambdaExpression {
        &self.expression
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initializer")
            .field("expression", &self.expression.to_string())
            .finish()
    }
}

/// Build and compile an initializer for `properties` of `target`.
pub fn create_initializer(
    target: &EntityType,
    properties: &[PropertyInfo],
) -> Result<Initializer, ShapeError> {
    let expression = create_initializer_expression(target, properties)?;
    let compiled = expression.compile();

    Ok(Initializer {
        target: target.clone(),
        expression,
        compiled,
    })
}

/// Initializer over every property of `target`, in declaration order.
pub fn create_full_initializer(target: &EntityType) -> Result<Initializer, ShapeError> {
    let properties: Vec<PropertyInfo> = target.properties().cloned().collect();
    create_initializer(target, &properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn customer() -> EntityType {
        EntityType::builder("Customer")
            .property("Id", FieldType::Guid)
            .property("Name", FieldType::String)
            .property("Active", FieldType::Bool)
            .build()
            .unwrap()
    }

    #[test]
    fn test_assigns_arguments_positionally() {
        let ty = customer();
        let props = ty.properties_named(&["Name", "Id"]).unwrap();
        let init = create_initializer(&ty, &props).unwrap();

        assert_eq!(
            init.expression().to_string(),
            "(name, id) => new Customer { Name = name, Id = id }"
        );

        let id = Uuid::new_v4();
        let record = init.invoke(&[Value::from("Zed"), Value::from(id)]).unwrap();

        assert_eq!(record.get("Name"), Some(&Value::from("Zed")));
        assert_eq!(record.get("Id"), Some(&Value::Guid(id)));
        assert_eq!(record.get("Active"), Some(&Value::Null));
    }

    #[test]
    fn test_full_initializer() {
        let ty = customer();
        let init = create_full_initializer(&ty).unwrap();

        assert_eq!(
            init.parameter_types(),
            vec![FieldType::Guid, FieldType::String, FieldType::Bool]
        );

        let record = init
            .invoke(&[Value::Guid(Uuid::nil()), Value::from("A"), Value::from(true)])
            .unwrap();
        assert_eq!(record.get("Active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_empty_property_list_default_constructs() {
        let ty = customer();
        let init = create_initializer(&ty, &[]).unwrap();

        assert_eq!(init.invoke(&[]).unwrap(), ty.new_instance());
    }

    #[test]
    fn test_argument_mismatch_fails_at_invocation() {
        let ty = customer();
        let init = create_full_initializer(&ty).unwrap();

        assert!(matches!(
            init.invoke(&[Value::Null]),
            Err(InvocationError::ArgumentCount { expected: 3, actual: 1 })
        ));
        assert!(matches!(
            init.invoke(&[Value::from("x"), Value::from("A"), Value::from(true)]),
            Err(InvocationError::ArgumentType { position: 0, .. })
        ));
    }

    #[test]
    fn test_shape_errors_at_synthesis() {
        let ty = customer();
        let other = customer();
        let name = ty.property("Name").unwrap().clone();

        assert!(matches!(
            create_initializer(&ty, &[name.clone(), name]),
            Err(ShapeError::DuplicateField { .. })
        ));
        assert!(matches!(
            create_initializer(&ty, &[other.property("Name").unwrap().clone()]),
            Err(ShapeError::ForeignProperty { .. })
        ));
    }
}
