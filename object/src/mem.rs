//! An in-memory Fudge message container.

use fudge_core::field::{Field, FudgeMsgView, Value};
use fudge_core::header::MAX_FIELD_COUNT;
use fudge_core::time::{FudgeDate, FudgeDateTime, FudgeTime};
use fudge_core::value::PrimitiveValue;
use fudge_encoding::dictionary::{standard, standard_shared, TypeDictionary};
use snafu::{ensure, Backtrace, Snafu};
use std::fmt;
use std::sync::Arc;

/// A field held by an in-memory message.
pub type InMemField = Field<InMemFudgeMsg>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while mutating a message.
pub enum Error {
    /// The message is full: the wire cannot count more fields.
    #[snafu(display("message already holds {MAX_FIELD_COUNT} fields"))]
    CapacityExceeded {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Message mutation result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An in-memory Fudge message: an ordered sequence of fields.
///
/// A message is not a map. Field order is preserved exactly, and duplicate
/// names and ordinals are legal; the `fields_by_*` accessors therefore
/// return iterators rather than single fields.
///
/// The adders consult the wire-type dictionary so that integers land in
/// the narrowest standard integer type and byte arrays take their
/// fixed-length wire type up front. Mutation is exclusive (`&mut self`);
/// writers only ever see a message behind a shared reference, which is
/// what freezes it for the duration of a write.
#[derive(Clone)]
pub struct InMemFudgeMsg {
    fields: Vec<InMemField>,
    dict: Arc<TypeDictionary>,
}

impl Default for InMemFudgeMsg {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for InMemFudgeMsg {
    /// Structural equality: two messages are equal when their field
    /// sequences are; the dictionary they were built with is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for InMemFudgeMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InMemFudgeMsg")
            .field("fields", &self.fields)
            .finish()
    }
}

impl InMemFudgeMsg {
    /// Create an empty message bound to the standard dictionary.
    pub fn new() -> Self {
        Self::new_with_dictionary(standard_shared())
    }

    /// Create an empty message bound to the given dictionary.
    pub fn new_with_dictionary(dict: Arc<TypeDictionary>) -> Self {
        InMemFudgeMsg {
            fields: Vec::new(),
            dict,
        }
    }

    /// Append a prebuilt field, verifying the field-count ceiling.
    pub fn add_field(&mut self, field: InMemField) -> Result<()> {
        ensure!(self.fields.len() < MAX_FIELD_COUNT, CapacityExceededSnafu);
        self.fields.push(field);
        Ok(())
    }

    /// Append a primitive value under its best-matching wire type:
    /// integers are narrowed and byte arrays take their fixed-length
    /// variant.
    pub fn add_value(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: PrimitiveValue,
    ) -> Result<()> {
        let declared = self.dict.by_value(&value).id;
        // resolution by value cannot mismatch, so minimize only narrows
        let (wire_type, minimized) = match self.dict.minimize(declared, &value) {
            Ok((wire_type, minimized)) => (wire_type, minimized.into_owned()),
            Err(_) => {
                tracing::warn!(type_id = declared, "value did not minimize, keeping its declared type");
                (self.dict.by_value(&value), value)
            }
        };
        self.add_field(Field::new(
            name.map(str::to_owned),
            ordinal,
            wire_type.id,
            Value::Primitive(minimized),
        ))
    }

    /// Append a null-valued field, represented by the indicator type.
    pub fn add_indicator(&mut self, name: Option<&str>, ordinal: Option<i16>) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Indicator)
    }

    /// Append a boolean field.
    pub fn add_boolean(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: bool,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Boolean(value))
    }

    /// Append an integer field; the value is narrowed on entry.
    pub fn add_long(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: i64,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Long(value))
    }

    /// Append a single precision field.
    pub fn add_float(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: f32,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Float(value))
    }

    /// Append a double precision field.
    pub fn add_double(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: f64,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Double(value))
    }

    /// Append a string field.
    pub fn add_string(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Str(value.into()))
    }

    /// Append a byte-array field under its best-matching wire type.
    pub fn add_byte_array(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: &[u8],
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::ByteArray(value.into()))
    }

    /// Append a date field.
    pub fn add_date(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: FudgeDate,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Date(value))
    }

    /// Append a time field.
    pub fn add_time(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: FudgeTime,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::Time(value))
    }

    /// Append a date-time field.
    pub fn add_datetime(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: FudgeDateTime,
    ) -> Result<()> {
        self.add_value(name, ordinal, PrimitiveValue::DateTime(value))
    }

    /// Append a nested message field.
    pub fn add_message(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        value: InMemFudgeMsg,
    ) -> Result<()> {
        self.add_field(Field::new(
            name.map(str::to_owned),
            ordinal,
            standard::SUB_MESSAGE,
            Value::Message(value),
        ))
    }

    /// The field at the given position, if any.
    pub fn get(&self, index: usize) -> Option<&InMemField> {
        self.fields.get(index)
    }

    /// All fields bearing the given name, in message order.
    pub fn fields_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a InMemField> + 'a {
        self.fields.iter().filter(move |f| f.name() == Some(name))
    }

    /// The first field bearing the given name.
    pub fn first_by_name<'a>(&'a self, name: &'a str) -> Option<&'a InMemField> {
        self.fields_by_name(name).next()
    }

    /// All fields bearing the given ordinal, in message order.
    pub fn fields_by_ordinal(&self, ordinal: i16) -> impl Iterator<Item = &InMemField> + '_ {
        self.fields
            .iter()
            .filter(move |f| f.ordinal() == Some(ordinal))
    }

    /// The first field bearing the given ordinal.
    pub fn first_by_ordinal(&self, ordinal: i16) -> Option<&InMemField> {
        self.fields_by_ordinal(ordinal).next()
    }

    /// Remove and return the field at the given position.
    pub fn remove(&mut self, index: usize) -> Option<InMemField> {
        if index < self.fields.len() {
            Some(self.fields.remove(index))
        } else {
            None
        }
    }

    /// Remove every field bearing the given name; returns how many were
    /// removed.
    pub fn remove_by_name(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| f.name() != Some(name));
        before - self.fields.len()
    }

    /// Keep only the fields for which the predicate holds.
    pub fn retain(&mut self, f: impl FnMut(&InMemField) -> bool) {
        self.fields.retain(f);
    }

    /// Iterate over the fields in message order.
    pub fn iter(&self) -> std::slice::Iter<'_, InMemField> {
        self.fields.iter()
    }

    /// The dictionary this message narrows values through.
    pub fn dictionary(&self) -> &Arc<TypeDictionary> {
        &self.dict
    }
}

impl FudgeMsgView for InMemFudgeMsg {
    fn len(&self) -> usize {
        self.fields.len()
    }

    fn fields(&self) -> std::slice::Iter<'_, InMemField> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a InMemFudgeMsg {
    type Item = &'a InMemField;
    type IntoIter = std::slice::Iter<'a, InMemField>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adders_narrow_integers_on_entry() {
        let mut msg = InMemFudgeMsg::new();
        let cases: [(i64, u8, PrimitiveValue); 6] = [
            (0, standard::BYTE, PrimitiveValue::Byte(0)),
            (-128, standard::BYTE, PrimitiveValue::Byte(-128)),
            (-129, standard::SHORT, PrimitiveValue::Short(-129)),
            (32768, standard::INT, PrimitiveValue::Int(32768)),
            (
                (1 << 31) - 1,
                standard::INT,
                PrimitiveValue::Int(i32::MAX),
            ),
            (1 << 31, standard::LONG, PrimitiveValue::Long(1 << 31)),
        ];
        for (i, (value, _, _)) in cases.iter().enumerate() {
            msg.add_long(None, Some(i as i16), *value).unwrap();
        }
        for (i, (_, type_id, stored)) in cases.iter().enumerate() {
            let field = msg.get(i).unwrap();
            assert_eq!(field.type_id(), *type_id);
            assert_eq!(field.value().primitive(), Some(stored));
        }
    }

    #[test]
    fn byte_arrays_narrow_to_fixed_types_on_entry() {
        let mut msg = InMemFudgeMsg::new();
        msg.add_byte_array(None, None, &[0u8; 20]).unwrap();
        msg.add_byte_array(None, None, &[0u8; 21]).unwrap();
        msg.add_byte_array(None, None, &[0u8; 512]).unwrap();
        assert_eq!(msg.get(0).unwrap().type_id(), standard::BYTE_ARRAY_20);
        assert_eq!(msg.get(1).unwrap().type_id(), standard::BYTE_ARRAY);
        assert_eq!(msg.get(2).unwrap().type_id(), standard::BYTE_ARRAY_512);
    }

    #[test]
    fn duplicate_names_are_legal_and_ordered() {
        let mut msg = InMemFudgeMsg::new();
        msg.add_long(Some("x"), None, 1).unwrap();
        msg.add_string(Some("x"), None, "two").unwrap();
        msg.add_long(Some("y"), Some(1), 3).unwrap();
        assert_eq!(msg.fields_by_name("x").count(), 2);
        assert_eq!(
            msg.first_by_name("x").unwrap().value().primitive(),
            Some(&PrimitiveValue::Byte(1))
        );
        assert_eq!(msg.first_by_ordinal(1).unwrap().name(), Some("y"));
    }

    #[test]
    fn removal_by_name_drops_every_occurrence() {
        let mut msg = InMemFudgeMsg::new();
        msg.add_long(Some("x"), None, 1).unwrap();
        msg.add_long(Some("y"), None, 2).unwrap();
        msg.add_long(Some("x"), None, 3).unwrap();
        assert_eq!(msg.remove_by_name("x"), 2);
        assert_eq!(msg.len(), 1);
        assert_eq!(msg.get(0).unwrap().name(), Some("y"));
    }

    #[test]
    fn the_field_count_ceiling_is_enforced() {
        let mut msg = InMemFudgeMsg::new();
        for _ in 0..MAX_FIELD_COUNT {
            msg.add_indicator(None, None).unwrap();
        }
        let err = msg.add_indicator(None, None).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
        assert_eq!(msg.len(), MAX_FIELD_COUNT);
    }
}
