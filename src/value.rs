//! Runtime values and record instances.
//!
//! [`Value`] is the boxed representation every synthesized function consumes
//! and produces. [`Record`] is an instance of an [`EntityType`] with one slot
//! per declared property.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{EntityType, FieldType, PropertyInfo};

/// A runtime value
///
/// Equality is structural and total: doubles compare by value with every NaN
/// equal to itself and `-0.0 == 0.0`, so values (and records holding them)
/// can key hash maps.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    TimeSpan(Duration),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Guid(Uuid),
    Record(Record),
}

impl Value {
    /// Runtime type of the value, `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => FieldType::Bool,
            Value::Int16(_) => FieldType::Int16,
            Value::Int32(_) => FieldType::Int32,
            Value::Int64(_) => FieldType::Int64,
            Value::Double(_) => FieldType::Double,
            Value::String(_) => FieldType::String,
            Value::TimeSpan(_) => FieldType::TimeSpan,
            Value::DateTime(_) => FieldType::DateTime,
            Value::DateTimeOffset(_) => FieldType::DateTimeOffset,
            Value::Guid(_) => FieldType::Guid,
            Value::Record(record) => FieldType::Entity(record.entity_type().clone()),
        };
        Some(ty)
    }

    /// Null is assignable to every type; anything else must match exactly.
    pub fn is_assignable_to(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (Value::Null, _) => true,
            (Value::Record(record), FieldType::Entity(entity)) => record.entity_type() == entity,
            (value, ty) => value.field_type().as_ref() == Some(ty),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(i) => Some(i64::from(*i)),
            Value::Int32(i) => Some(i64::from(*i)),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Bit pattern used for double equality and hashing.
fn double_key(d: f64) -> u64 {
    if d == 0.0 {
        0
    } else if d.is_nan() {
        f64::NAN.to_bits()
    } else {
        d.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => double_key(*a) == double_key(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int16(i) => i.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Double(d) => double_key(*d).hash(state),
            Value::String(s) => s.hash(state),
            Value::TimeSpan(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::DateTimeOffset(dt) => dt.hash(state),
            Value::Guid(g) => g.hash(state),
            Value::Record(record) => record.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int16(i) => write!(f, "{}", i),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::TimeSpan(d) => write!(f, "{}", format_time_span(d)),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::DateTimeOffset(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Guid(g) => write!(f, "{}", g.hyphenated()),
            Value::Record(record) => write!(f, "{:?}", record),
        }
    }
}

/// Render a duration in `[-][d.]hh:mm:ss[.fffffff]` form.
pub fn format_time_span(duration: &Duration) -> String {
    let sign = if *duration < Duration::zero() { "-" } else { "" };
    let abs = duration.abs();

    let total_seconds = abs.num_seconds();
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    let ticks = abs.subsec_nanos() / 100;

    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int16(i) => serializer.serialize_i16(*i),
            Value::Int32(i) => serializer.serialize_i32(*i),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::TimeSpan(d) => serializer.serialize_str(&format_time_span(d)),
            Value::DateTime(dt) => dt.serialize(serializer),
            Value::DateTimeOffset(dt) => dt.serialize(serializer),
            Value::Guid(g) => g.serialize(serializer),
            Value::Record(record) => record.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Int16(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::TimeSpan(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTimeOffset(dt)
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Value::Guid(g)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Error raised when assigning a member of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    UnknownMember {
        type_name: String,
        member: String,
    },
    ForeignMember {
        type_name: String,
        member: String,
    },
    TypeMismatch {
        type_name: String,
        member: String,
        expected: FieldType,
        actual: Option<FieldType>,
    },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::UnknownMember { type_name, member } => {
                write!(f, "Type '{}' has no member '{}'", type_name, member)
            }
            ValueError::ForeignMember { type_name, member } => {
                write!(f, "Member '{}' does not belong to type '{}'", member, type_name)
            }
            ValueError::TypeMismatch {
                type_name,
                member,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "Cannot assign {} to '{}.{}' of type {}",
                    actual, type_name, member, expected
                ),
                None => write!(
                    f,
                    "Cannot assign null to '{}.{}' of type {}",
                    type_name, member, expected
                ),
            },
        }
    }
}

impl std::error::Error for ValueError {}

/// An instance of an [`EntityType`].
///
/// Slots are shared copy-on-write, so cloning a record (for example to pass it
/// as a [`Value`] argument) does not copy its members.
#[derive(Clone)]
pub struct Record {
    ty: EntityType,
    slots: Arc<Vec<Value>>,
}

impl Record {
    /// Default-construct an instance: all members null.
    pub fn new(ty: &EntityType) -> Self {
        Self {
            ty: ty.clone(),
            slots: Arc::new(vec![Value::Null; ty.property_count()]),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let property = self.ty.property(name)?;
        self.slots.get(property.slot())
    }

    pub fn get_slot(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot)
    }

    /// Member values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.slots
    }

    /// Assign a member by name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let property = self
            .ty
            .property(name)
            .cloned()
            .ok_or_else(|| ValueError::UnknownMember {
                type_name: self.ty.name().to_string(),
                member: name.to_string(),
            })?;
        self.set_property(&property, value.into())
    }

    /// Assign a member through its property descriptor.
    ///
    /// The descriptor must come from this record's own type.
    pub fn set_property(
        &mut self,
        property: &PropertyInfo,
        value: Value,
    ) -> Result<(), ValueError> {
        if property.declaring_type() != self.ty.handle() {
            return Err(ValueError::ForeignMember {
                type_name: self.ty.name().to_string(),
                member: property.name().to_string(),
            });
        }

        if !value.is_assignable_to(property.field_type()) {
            return Err(ValueError::TypeMismatch {
                type_name: self.ty.name().to_string(),
                member: property.name().to_string(),
                expected: property.field_type().clone(),
                actual: value.field_type(),
            });
        }

        Arc::make_mut(&mut self.slots)[property.slot()] = value;
        Ok(())
    }

    /// Builder-style assignment, for constructing fixtures.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ValueError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Convert the record to a JSON object keyed by member name.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.slots == other.slots
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.slots.hash(state);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.ty.name());
        for (property, value) in self.ty.properties().zip(self.slots.iter()) {
            out.field(property.name(), value);
        }
        out.finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (property, value) in self.ty.properties().zip(self.slots.iter()) {
            map.serialize_entry(property.name(), value)?;
        }
        map.end()
    }
}
