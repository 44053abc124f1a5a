//! Selector synthesis: `entity -> projection` functions over runtime types.
//!
//! A one-field selector reads the property directly (`x => x.A`). A
//! multi-field selector projects into a forged composite type
//! (`x => new CompositeKeyN { A = x.A, B = x.B }`).
//!
//! Selector bodies are produced by templates specialized per
//! `(source type, result type)` pair. Resolving a template is the expensive
//! step, so resolved templates are memoized process-wide.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::synthesis::expression::{
    CompiledLambda, Expression, InvocationError, LambdaExpression, MemberBinding,
    ParameterExpression,
};
use crate::synthesis::forge::forge_composite_type;
use crate::types::{
    EntityType, FieldDescriptor, FieldType, PropertyInfo, ShapeError, TypeHandle,
};
use crate::value::{Record, Value};

/// Builds the lambda for one `(source, result)` specialization.
///
/// Templates never hold the source type; it is passed in on every call.
trait SelectorTemplate: Send + Sync {
    fn instantiate(
        &self,
        source: &EntityType,
        fields: &[PropertyInfo],
    ) -> Result<LambdaExpression, ShapeError>;
}

/// `x => x.Field`
struct SingleFieldSelector;

impl SelectorTemplate for SingleFieldSelector {
    fn instantiate(
        &self,
        source: &EntityType,
        fields: &[PropertyInfo],
    ) -> Result<LambdaExpression, ShapeError> {
        let x = ParameterExpression::new("x", FieldType::Entity(source.clone()), 0);
        let field = fields.first().ok_or(ShapeError::NoFields)?;
        let body = Expression::property(Expression::parameter(&x), field.name())?;
        LambdaExpression::new(body, vec![x])
    }
}

/// `x => new T { F1 = x.F1, F2 = x.F2, .. }`
struct MultipleFieldSelector {
    result: EntityType,
}

impl SelectorTemplate for MultipleFieldSelector {
    fn instantiate(
        &self,
        source: &EntityType,
        fields: &[PropertyInfo],
    ) -> Result<LambdaExpression, ShapeError> {
        let x = ParameterExpression::new("x", FieldType::Entity(source.clone()), 0);

        let bindings = fields
            .iter()
            .map(|field| {
                let member = self.result.property(field.name()).cloned().ok_or_else(|| {
                    ShapeError::UnknownProperty {
                        type_name: self.result.name().to_string(),
                        property: field.name().to_string(),
                    }
                })?;
                let value = Expression::property(Expression::parameter(&x), field.name())?;
                Ok(MemberBinding::bind(member, value))
            })
            .collect::<Result<Vec<_>, ShapeError>>()?;

        let body = Expression::member_init(&self.result, bindings)?;
        LambdaExpression::new(body, vec![x])
    }
}

/// `(source, result, multi-field)`; the flag keeps a nested entity property
/// and a composite projection of the same type apart.
type SpecializationKey = (TypeHandle, FieldType, bool);

static SPECIALIZATIONS: OnceLock<Mutex<HashMap<SpecializationKey, Arc<dyn SelectorTemplate>>>> =
    OnceLock::new();

fn specializations() -> &'static Mutex<HashMap<SpecializationKey, Arc<dyn SelectorTemplate>>> {
    SPECIALIZATIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve (once) the template for `(source, result)`.
fn specialize(
    source: &EntityType,
    result: &FieldType,
    multiple: bool,
) -> Arc<dyn SelectorTemplate> {
    let key = (source.handle(), result.clone(), multiple);
    let mut cache = specializations()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(template) = cache.get(&key) {
        tracing::trace!("Selector specialization {} -> {} reused", source.name(), result);
        return Arc::clone(template);
    }

    let template: Arc<dyn SelectorTemplate> = match result {
        FieldType::Entity(composite) if multiple => Arc::new(MultipleFieldSelector {
            result: composite.clone(),
        }),
        _ => Arc::new(SingleFieldSelector),
    };

    tracing::debug!("Resolved selector specialization {} -> {}", source.name(), result);
    cache.insert(key, Arc::clone(&template));
    template
}

/// Number of `(source, result)` specializations resolved so far.
pub fn dispatch_cache_len() -> usize {
    specializations()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

/// Validate `fields` against `source`, returning the source's own descriptors.
fn resolve_fields(
    source: &EntityType,
    fields: &[PropertyInfo],
) -> Result<Vec<PropertyInfo>, ShapeError> {
    if fields.is_empty() {
        return Err(ShapeError::NoFields);
    }

    let mut resolved: Vec<PropertyInfo> = Vec::with_capacity(fields.len());
    for field in fields {
        if resolved.iter().any(|p| p.name() == field.name()) {
            return Err(ShapeError::DuplicateField {
                name: field.name().to_string(),
            });
        }
        resolved.push(source.resolve(field)?.clone());
    }
    Ok(resolved)
}

/// Build the selector lambda for `fields` of `source`.
///
/// # Arguments
///
/// * `source` - Entity type the selector reads from
/// * `fields` - Properties of `source`, in projection order
///
/// # Returns
///
/// * `Ok(LambdaExpression)` - `x => x.A` for one field, or a member-init of
///   the forged composite type for several
/// * `Err(ShapeError)` - No fields, duplicate fields, or a field that is not
///   readable from `source`
pub fn create_selector_expression(
    source: &EntityType,
    fields: &[PropertyInfo],
) -> Result<LambdaExpression, ShapeError> {
    let fields = resolve_fields(source, fields)?;

    if let [single] = fields.as_slice() {
        let result = single.field_type().clone();
        return specialize(source, &result, false).instantiate(source, &fields);
    }

    let shape: Vec<FieldDescriptor> = fields.iter().map(FieldDescriptor::from).collect();
    let composite = forge_composite_type(&shape)?;
    let result = FieldType::Entity(composite);

    specialize(source, &result, true).instantiate(source, &fields)
}

/// Compiled projection from an entity to a single value or a composite key.
#[derive(Clone)]
pub struct Selector {
    source: EntityType,
    expression: LambdaExpression,
    compiled: CompiledLambda,
}

impl Selector {
    /// Apply the selector to an instance of its source type.
    pub fn select(&self, entity: &Record) -> Result<Value, InvocationError> {
        self.compiled.invoke(&[Value::Record(entity.clone())])
    }

    pub fn source_type(&self) -> &EntityType {
        &self.source
    }

    /// Type of the projection: the property type, or the composite key type.
    pub fn result_type(&self) -> FieldType {
        self.expression.return_type()
    }

    pub fn expression(&self) -> &LambdaExpression {
        &self.expression
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("expression", &self.expression.to_string())
            .finish()
    }
}

/// Build and compile a selector for `fields` of `source`.
pub fn create_selector(
    source: &EntityType,
    fields: &[PropertyInfo],
) -> Result<Selector, ShapeError> {
    let expression = create_selector_expression(source, fields)?;
    let compiled = expression.compile();

    Ok(Selector {
        source: source.clone(),
        expression,
        compiled,
    })
}

/// Same as [`create_selector`], naming the fields instead of passing descriptors.
pub fn create_selector_for(source: &EntityType, names: &[&str]) -> Result<Selector, ShapeError> {
    let fields = source.properties_named(names)?;
    create_selector(source, &fields)
}
