//! # shadowdb: runtime support for an in-memory relational backend
//!
//! shadowdb executes mapped queries against in-memory tables. This crate holds
//! the pieces that have to work against entity types discovered at runtime:
//!
//! - **Composite key forge**: one nominal record type per distinct field shape,
//!   cached for the life of the process
//! - **Selector synthesis**: compiled `entity -> value` or
//!   `entity -> composite key` projections
//! - **Initializer synthesis**: compiled `(v1, .., vn) -> entity` constructors
//! - **Value conversion**: locale-independent parsing of CSV cell tokens
//! - **Table loading**: CSV directories exposed as lazily read row sequences
//!
//! ## Example: composite key selector
//!
//! ```
//! use shadowdb::{create_selector_for, EntityType, FieldType, Value};
//!
//! let order = EntityType::builder("Order")
//!     .property("Region", FieldType::String)
//!     .property("Number", FieldType::Int32)
//!     .build()
//!     .unwrap();
//!
//! let key = create_selector_for(&order, &["Region", "Number"]).unwrap();
//!
//! let row = order
//!     .new_instance()
//!     .with("Region", "EU").unwrap()
//!     .with("Number", 7).unwrap();
//!
//! let projected = key.select(&row).unwrap();
//! let projected = projected.as_record().unwrap();
//! assert_eq!(projected.get("Number"), Some(&Value::Int32(7)));
//! ```

// Core modules
pub mod types;
pub mod value;

// Expression synthesis over runtime types
pub mod synthesis;

// Text to value conversion and table loading
pub mod conversion;
pub mod loader;

// In-memory SQL function emulation
pub mod functions;

// Re-export key types
pub use types::{
    EntityType, EntityTypeBuilder, FieldDescriptor, FieldType, PropertyInfo, ShapeError,
    TypeHandle,
};
pub use value::{Record, Value, ValueError};

pub use synthesis::{
    create_full_initializer, create_initializer, create_initializer_expression, create_selector,
    create_selector_expression, create_selector_for, dispatch_cache_len, forge_composite_type,
    Initializer, InvocationError, LambdaExpression, Selector, TypeForge,
};

pub use conversion::{convert, CsvValueConverter, FormatError, ValueConverter};

pub use loader::{
    ColumnDescription, CsvDataLoader, CsvLoaderConfig, DataLoader, LoaderError, TableDataLoader,
    TableDataLoaderFactory, TableDescription,
};

pub use functions::FunctionError;
