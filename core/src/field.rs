//! Field records and the message view abstraction.

use crate::value::{PrimitiveValue, ValueType};
use std::fmt;

/// A full field value, which is either a primitive value or a nested
/// message.
///
/// `I` is the concrete type used for nested messages, which should
/// implement [`FudgeMsgView`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value<I> {
    /// A primitive value.
    Primitive(PrimitiveValue),
    /// A nested message.
    Message(I),
}

impl<I> Value<I> {
    /// Whether this value is a nested message.
    #[inline]
    pub fn is_message(&self) -> bool {
        matches!(self, Value::Message(_))
    }

    /// Retrieve the primitive value, if this is one.
    pub fn primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            Value::Message(_) => None,
        }
    }

    /// Retrieve the nested message, if this is one.
    pub fn message(&self) -> Option<&I> {
        match self {
            Value::Primitive(_) => None,
            Value::Message(m) => Some(m),
        }
    }

    /// Retrieve the kind of primitive value held,
    /// or `None` for a nested message.
    pub fn value_type(&self) -> Option<ValueType> {
        self.primitive().map(PrimitiveValue::value_type)
    }
}

impl<I> From<PrimitiveValue> for Value<I> {
    fn from(v: PrimitiveValue) -> Self {
        Value::Primitive(v)
    }
}

/// An immutable record of a single message field.
///
/// A field carries a wire type identifier, a value, and optionally a name,
/// an ordinal, or both. Anonymous fields (neither name nor ordinal) are
/// permitted. The type identifier is kept alongside the value so that
/// fields of unknown or custom wire types survive a decode/encode
/// round trip unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<I> {
    name: Option<String>,
    ordinal: Option<i16>,
    type_id: u8,
    value: Value<I>,
}

impl<I> Field<I> {
    /// Create a field from its parts.
    pub fn new(
        name: Option<String>,
        ordinal: Option<i16>,
        type_id: u8,
        value: Value<I>,
    ) -> Self {
        Field {
            name,
            ordinal,
            type_id,
            value,
        }
    }

    /// The field name, if any.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The field ordinal, if any.
    #[inline]
    pub fn ordinal(&self) -> Option<i16> {
        self.ordinal
    }

    /// The wire type identifier.
    #[inline]
    pub fn type_id(&self) -> u8 {
        self.type_id
    }

    /// The field value.
    #[inline]
    pub fn value(&self) -> &Value<I> {
        &self.value
    }

    /// Whether the field carries neither name nor ordinal.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none() && self.ordinal.is_none()
    }

    /// Deconstruct the field into its parts.
    pub fn into_parts(self) -> (Option<String>, Option<i16>, u8, Value<I>) {
        (self.name, self.ordinal, self.type_id, self.value)
    }
}

impl<I> fmt::Display for Field<I> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.ordinal, self.name.as_deref()) {
            (Some(ord), Some(name)) => write!(f, "field {ord}/{name:?}"),
            (Some(ord), None) => write!(f, "field {ord}"),
            (None, Some(name)) => write!(f, "field {name:?}"),
            (None, None) => f.write_str("anonymous field"),
        }
    }
}

/// A read-only view over an ordered sequence of fields.
///
/// The binary and JSON writers accept this view only; holding a message by
/// shared reference is what freezes it for the duration of a write.
pub trait FudgeMsgView: Sized {
    /// The number of fields in the message.
    fn len(&self) -> usize;

    /// Whether the message has no fields.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the fields in wire order.
    fn fields(&self) -> std::slice::Iter<'_, Field<Self>>;
}
