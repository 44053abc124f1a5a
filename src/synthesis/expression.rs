//! Typed expression IR and its closure compiler.
//!
//! Expressions are built as data ([`Expression`], [`LambdaExpression`]), type
//! checked while being built, and compiled once into a tree of closures
//! ([`CompiledLambda`]) that can be invoked any number of times from any
//! thread.

use std::fmt;
use std::sync::Arc;

use crate::types::{EntityType, FieldType, PropertyInfo, ShapeError};
use crate::value::{Value, ValueError};

/// Error raised while invoking a compiled lambda.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationError {
    ArgumentCount {
        expected: usize,
        actual: usize,
    },
    ArgumentType {
        position: usize,
        expected: FieldType,
        actual: Option<FieldType>,
    },
    NullReference {
        member: String,
    },
    NotAnInstance {
        expected: String,
        member: String,
    },
    Assignment(ValueError),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::ArgumentCount { expected, actual } => {
                write!(f, "Expected {} arguments, got {}", expected, actual)
            }
            InvocationError::ArgumentType {
                position,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "Argument {} must be {}, got {}",
                    position, expected, actual
                ),
                None => write!(f, "Argument {} must be {}", position, expected),
            },
            InvocationError::NullReference { member } => {
                write!(f, "Cannot read '{}' from a null instance", member)
            }
            InvocationError::NotAnInstance { expected, member } => {
                write!(f, "Cannot read '{}': value is not a {}", member, expected)
            }
            InvocationError::Assignment(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<ValueError> for InvocationError {
    fn from(err: ValueError) -> Self {
        InvocationError::Assignment(err)
    }
}

/// A formal parameter of a lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterExpression {
    name: String,
    ty: FieldType,
    position: usize,
}

impl ParameterExpression {
    pub fn new(name: impl Into<String>, ty: FieldType, position: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            position,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// Assignment of an expression to a member inside a [`Expression::MemberInit`].
#[derive(Debug, Clone)]
pub struct MemberBinding {
    pub property: PropertyInfo,
    pub value: Expression,
}

impl MemberBinding {
    pub fn bind(property: PropertyInfo, value: Expression) -> Self {
        Self { property, value }
    }
}

/// Expression tree node.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Reference to a lambda parameter
    Parameter(ParameterExpression),
    /// `target.property`
    Property {
        target: Box<Expression>,
        property: PropertyInfo,
    },
    /// Default construction of an entity type
    New(EntityType),
    /// `new T { A = .., B = .. }`: default construction, then member assignment
    MemberInit {
        ty: EntityType,
        bindings: Vec<MemberBinding>,
    },
}

impl Expression {
    pub fn parameter(parameter: &ParameterExpression) -> Self {
        Expression::Parameter(parameter.clone())
    }

    /// Property read. `target` must be typed as an entity declaring `name`.
    pub fn property(target: Expression, name: &str) -> Result<Self, ShapeError> {
        let target_type = target.field_type();
        let entity = target_type
            .as_entity()
            .ok_or_else(|| ShapeError::NotAnEntity {
                actual: target_type.clone(),
            })?;

        let property = entity
            .property(name)
            .cloned()
            .ok_or_else(|| ShapeError::UnknownProperty {
                type_name: entity.name().to_string(),
                property: name.to_string(),
            })?;

        Ok(Expression::Property {
            target: Box::new(target),
            property,
        })
    }

    pub fn new_instance(ty: &EntityType) -> Self {
        Expression::New(ty.clone())
    }

    /// Member initialization. Every binding must target a distinct property of
    /// `ty` and carry a value of that property's type.
    pub fn member_init(ty: &EntityType, bindings: Vec<MemberBinding>) -> Result<Self, ShapeError> {
        let mut bound = Vec::with_capacity(bindings.len());

        for binding in &bindings {
            let own = ty.resolve(&binding.property)?;

            if bound.contains(&own.slot()) {
                return Err(ShapeError::DuplicateField {
                    name: own.name().to_string(),
                });
            }
            bound.push(own.slot());

            let value_type = binding.value.field_type();
            if &value_type != own.field_type() {
                return Err(ShapeError::PropertyTypeMismatch {
                    type_name: ty.name().to_string(),
                    property: own.name().to_string(),
                    expected: own.field_type().clone(),
                    actual: value_type,
                });
            }
        }

        Ok(Expression::MemberInit {
            ty: ty.clone(),
            bindings,
        })
    }

    /// Static type of the expression.
    pub fn field_type(&self) -> FieldType {
        match self {
            Expression::Parameter(p) => p.ty.clone(),
            Expression::Property { property, .. } => property.field_type().clone(),
            Expression::New(ty) | Expression::MemberInit { ty, .. } => {
                FieldType::Entity(ty.clone())
            }
        }
    }

    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a ParameterExpression>) {
        match self {
            Expression::Parameter(p) => out.push(p),
            Expression::Property { target, .. } => target.collect_parameters(out),
            Expression::New(_) => {}
            Expression::MemberInit { bindings, .. } => {
                for binding in bindings {
                    binding.value.collect_parameters(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Parameter(p) => write!(f, "{}", p.name),
            Expression::Property { target, property } => {
                write!(f, "{}.{}", target, property.name())
            }
            Expression::New(ty) => write!(f, "new {}()", ty.name()),
            Expression::MemberInit { ty, bindings } if bindings.is_empty() => {
                write!(f, "new {} {{ }}", ty.name())
            }
            Expression::MemberInit { ty, bindings } => {
                write!(f, "new {} {{ ", ty.name())?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", binding.property.name(), binding.value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// A lambda: formal parameters plus a body.
#[derive(Debug, Clone)]
pub struct LambdaExpression {
    parameters: Vec<ParameterExpression>,
    body: Expression,
}

impl LambdaExpression {
    /// Build a lambda, checking that parameters are listed by position and
    /// that the body only references declared parameters.
    pub fn new(body: Expression, parameters: Vec<ParameterExpression>) -> Result<Self, ShapeError> {
        for (index, parameter) in parameters.iter().enumerate() {
            if parameter.position != index {
                return Err(ShapeError::ParameterPosition {
                    name: parameter.name.clone(),
                    expected: index,
                    actual: parameter.position,
                });
            }
        }

        let mut referenced = Vec::new();
        body.collect_parameters(&mut referenced);
        for parameter in referenced {
            if parameters.get(parameter.position) != Some(parameter) {
                return Err(ShapeError::UnboundParameter {
                    name: parameter.name.clone(),
                });
            }
        }

        Ok(Self { parameters, body })
    }

    pub fn parameters(&self) -> &[ParameterExpression] {
        &self.parameters
    }

    pub fn body(&self) -> &Expression {
        &self.body
    }

    pub fn return_type(&self) -> FieldType {
        self.body.field_type()
    }

    /// Compile the tree into closures.
    pub fn compile(&self) -> CompiledLambda {
        CompiledLambda {
            parameters: self.parameters.iter().map(|p| p.ty.clone()).collect(),
            eval: compile_node(&self.body),
        }
    }
}

impl fmt::Display for LambdaExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameters.as_slice() {
            [single] => write!(f, "{} => {}", single.name, self.body),
            params => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "({}) => {}", names.join(", "), self.body)
            }
        }
    }
}

type Eval = Arc<dyn Fn(&[Value]) -> Result<Value, InvocationError> + Send + Sync>;

/// Executable form of a [`LambdaExpression`].
#[derive(Clone)]
pub struct CompiledLambda {
    parameters: Vec<FieldType>,
    eval: Eval,
}

impl CompiledLambda {
    /// Invoke with positional arguments.
    ///
    /// Argument count and types are checked against the declared parameters
    /// before the body runs.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvocationError> {
        if args.len() != self.parameters.len() {
            return Err(InvocationError::ArgumentCount {
                expected: self.parameters.len(),
                actual: args.len(),
            });
        }

        for (position, (arg, ty)) in args.iter().zip(&self.parameters).enumerate() {
            if !arg.is_assignable_to(ty) {
                return Err(InvocationError::ArgumentType {
                    position,
                    expected: ty.clone(),
                    actual: arg.field_type(),
                });
            }
        }

        (self.eval)(args)
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl fmt::Debug for CompiledLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledLambda")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

fn compile_node(expr: &Expression) -> Eval {
    match expr {
        Expression::Parameter(p) => {
            let position = p.position;
            let arity = position + 1;
            Arc::new(move |args: &[Value]| {
                args.get(position)
                    .cloned()
                    .ok_or(InvocationError::ArgumentCount {
                        expected: arity,
                        actual: args.len(),
                    })
            })
        }
        Expression::Property { target, property } => {
            let target = compile_node(target);
            let property = property.clone();
            Arc::new(move |args: &[Value]| match target(args)? {
                Value::Record(record)
                    if record.entity_type().handle() == property.declaring_type() =>
                {
                    Ok(record.get_slot(property.slot()).cloned().unwrap_or(Value::Null))
                }
                Value::Null => Err(InvocationError::NullReference {
                    member: property.name().to_string(),
                }),
                _ => Err(InvocationError::NotAnInstance {
                    expected: format!("type {}", property.declaring_type()),
                    member: property.name().to_string(),
                }),
            })
        }
        Expression::New(ty) => {
            let ty = ty.clone();
            Arc::new(move |_: &[Value]| Ok(Value::Record(ty.new_instance())))
        }
        Expression::MemberInit { ty, bindings } => {
            let ty = ty.clone();
            let bindings: Vec<(PropertyInfo, Eval)> = bindings
                .iter()
                .map(|b| (b.property.clone(), compile_node(&b.value)))
                .collect();
            Arc::new(move |args: &[Value]| {
                let mut instance = ty.new_instance();
                for (property, eval) in &bindings {
                    instance.set_property(property, eval(args)?)?;
                }
                Ok(Value::Record(instance))
            })
        }
    }
}
