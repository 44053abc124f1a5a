//! Runtime expression synthesis.
//!
//! Given entity types and property lists discovered at runtime, this module
//! manufactures compiled selectors (`entity -> projection`) and initializers
//! (`(v1, .., vn) -> instance`), forging composite key types when a
//! projection spans several fields.

pub mod expression;
pub mod forge;
pub mod initializer;
pub mod selector;

// Re-export key types
pub use expression::{
    CompiledLambda, Expression, InvocationError, LambdaExpression, MemberBinding,
    ParameterExpression,
};
pub use forge::{forge_composite_type, TypeForge};
pub use initializer::{
    create_full_initializer, create_initializer, create_initializer_expression, Initializer,
};
pub use selector::{
    create_selector, create_selector_expression, create_selector_for, dispatch_cache_len, Selector,
};
