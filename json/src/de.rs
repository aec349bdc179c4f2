//! JSON to Fudge deserialization.
//!
//! [`JsonStreamReader`] walks a parsed JSON document and produces the same
//! element sequence as the binary pull parser. Two lookahead queues per
//! nesting level, one of field keys and one of values, let a heterogeneous
//! array expand into repeated fields sharing its key without disturbing
//! the order of the entries around it, and let envelope keys be recognized
//! by name wherever they appear at the top level.

use crate::JsonSettings;
use fudge_core::field::{Field, Value as FieldValue};
use fudge_core::header::EnvelopeHeader;
use fudge_core::value::PrimitiveValue;
use fudge_encoding::dictionary::standard;
use fudge_object::{FudgeMsgEnvelope, InMemFudgeMsg};
use fudge_parser::stream::StreamElement;
use num_traits::NumCast;
use serde_json::{Map, Value};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::collections::VecDeque;
use std::io::Read;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while reading Fudge content from JSON.
pub enum Error {
    /// The document is not syntactically valid JSON.
    #[snafu(display("could not parse JSON document"))]
    ParseJson {
        /// The parsing failure.
        source: serde_json::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The top level of the document is not a JSON object.
    #[snafu(display("a Fudge message must be a JSON object"))]
    NotAnObject {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// An envelope key carries something other than a number in range.
    #[snafu(display("envelope key {key:?} does not hold a number in range"))]
    EnvelopeValue {
        /// The offending key.
        key: String,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The decoded message cannot be represented: its field count is at
    /// the ceiling.
    #[snafu(display("decoded message exceeds the field-count ceiling"))]
    BuildMessage {
        /// The mutation failure.
        source: fudge_object::mem::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// JSON deserialization result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The identity of a field, as read from its JSON key: a key parsing as a
/// 16-bit integer is an ordinal, the empty key marks an anonymous field,
/// and anything else is a name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldKey {
    name: Option<String>,
    ordinal: Option<i16>,
}

impl FieldKey {
    fn parse(key: &str) -> Self {
        if key.is_empty() {
            return FieldKey {
                name: None,
                ordinal: None,
            };
        }
        match key.parse::<i16>() {
            Ok(ordinal) => FieldKey {
                name: None,
                ordinal: Some(ordinal),
            },
            Err(_) => FieldKey {
                name: Some(key.to_owned()),
                ordinal: None,
            },
        }
    }
}

/// The lookahead queues of one nesting level. Keys and values travel in
/// lockstep; expanding an array pushes several entries back to the front.
#[derive(Debug, Default)]
struct Frame {
    names: VecDeque<FieldKey>,
    /// the value paired with each queued key, and whether it arrived
    /// through repeated-field expansion
    values: VecDeque<(Value, bool)>,
}

impl Frame {
    fn from_object(map: Map<String, Value>) -> Self {
        let mut frame = Frame::default();
        for (key, value) in map {
            frame.names.push_back(FieldKey::parse(&key));
            frame.values.push_back((value, false));
        }
        frame
    }
}

/// A reader producing the binary pull parser's element sequence from a
/// JSON document.
///
/// Construction consumes and validates the whole document; iteration
/// itself cannot fail, so the items are bare [`StreamElement`]s.
#[derive(Debug)]
pub struct JsonStreamReader {
    pending_envelope: Option<EnvelopeHeader>,
    frames: Vec<Frame>,
}

impl JsonStreamReader {
    /// Create a reader over a JSON string with the default envelope keys.
    pub fn from_str(s: &str) -> Result<Self> {
        Self::from_str_with(s, JsonSettings::default())
    }

    /// Create a reader over a JSON string with the given envelope keys.
    pub fn from_str_with(s: &str, settings: JsonSettings) -> Result<Self> {
        Self::from_value_with(serde_json::from_str(s).context(ParseJsonSnafu)?, settings)
    }

    /// Create a reader over a parsed JSON value with the given envelope
    /// keys.
    ///
    /// Envelope keys are recognized by name anywhere at the top level;
    /// every other entry passes through the lookahead queues in document
    /// order.
    pub fn from_value_with(value: Value, settings: JsonSettings) -> Result<Self> {
        let Value::Object(map) = value else {
            return NotAnObjectSnafu.fail();
        };
        let mut header = EnvelopeHeader::default();
        let mut root = Frame::default();
        for (key, value) in map {
            if settings.is_envelope_key(&key) {
                let number = value.as_i64().context(EnvelopeValueSnafu { key: &key })?;
                if key == settings.processing_directives_field {
                    header.processing_directives =
                        NumCast::from(number).context(EnvelopeValueSnafu { key: &key })?;
                } else if key == settings.schema_version_field {
                    header.schema_version =
                        NumCast::from(number).context(EnvelopeValueSnafu { key: &key })?;
                } else {
                    header.taxonomy_id =
                        NumCast::from(number).context(EnvelopeValueSnafu { key: &key })?;
                }
            } else {
                root.names.push_back(FieldKey::parse(&key));
                root.values.push_back((value, false));
            }
        }
        Ok(JsonStreamReader {
            pending_envelope: Some(header),
            frames: vec![root],
        })
    }
}

/// The narrowest standard integer field for a wide value.
fn narrowed(value: i64) -> (u8, PrimitiveValue) {
    if let Some(v) = <i8 as NumCast>::from(value) {
        (standard::BYTE, PrimitiveValue::Byte(v))
    } else if let Some(v) = <i16 as NumCast>::from(value) {
        (standard::SHORT, PrimitiveValue::Short(v))
    } else if let Some(v) = <i32 as NumCast>::from(value) {
        (standard::INT, PrimitiveValue::Int(v))
    } else {
        (standard::LONG, PrimitiveValue::Long(value))
    }
}

/// The field form of a JSON number: the narrowest standard integer type
/// for integral values, double precision for everything else.
fn number_field(n: &serde_json::Number) -> (u8, PrimitiveValue) {
    if let Some(i) = n.as_i64() {
        narrowed(i)
    } else {
        (
            standard::DOUBLE,
            PrimitiveValue::Double(n.as_f64().unwrap_or_default()),
        )
    }
}

/// Recognize an array of homogeneous numbers as the narrowest primitive
/// array: int, then long, then double. An empty array is an empty int
/// array. Returns `None` for anything else.
fn primitive_array(items: &[Value]) -> Option<(u8, PrimitiveValue)> {
    if !items.iter().all(Value::is_number) {
        return None;
    }
    if items
        .iter()
        .all(|v| v.as_i64().and_then(<i32 as NumCast>::from).is_some())
    {
        let values = items.iter().filter_map(Value::as_i64).map(|v| v as i32);
        return Some((standard::INT_ARRAY, PrimitiveValue::IntArray(values.collect())));
    }
    if items.iter().all(|v| v.as_i64().is_some()) {
        let values = items.iter().filter_map(Value::as_i64);
        return Some((
            standard::LONG_ARRAY,
            PrimitiveValue::LongArray(values.collect()),
        ));
    }
    let values = items.iter().filter_map(Value::as_f64);
    Some((
        standard::DOUBLE_ARRAY,
        PrimitiveValue::DoubleArray(values.collect()),
    ))
}

fn simple(key: FieldKey, type_id: u8, value: PrimitiveValue) -> StreamElement {
    StreamElement::SimpleField {
        name: key.name,
        ordinal: key.ordinal,
        type_id,
        value,
    }
}

impl Iterator for JsonStreamReader {
    type Item = StreamElement;

    fn next(&mut self) -> Option<StreamElement> {
        if let Some(header) = self.pending_envelope.take() {
            return Some(StreamElement::MessageEnvelope { header });
        }
        loop {
            let frame = self.frames.last_mut()?;
            let (key, value, expanded) =
                match (frame.names.pop_front(), frame.values.pop_front()) {
                    (Some(key), Some((value, expanded))) => (key, value, expanded),
                    _ => {
                        // level exhausted
                        self.frames.pop();
                        if self.frames.is_empty() {
                            return None;
                        }
                        return Some(StreamElement::SubmessageFieldEnd);
                    }
                };
            match value {
                Value::Null => {
                    return Some(simple(key, standard::INDICATOR, PrimitiveValue::Indicator))
                }
                Value::Bool(v) => {
                    return Some(simple(key, standard::BOOLEAN, PrimitiveValue::Boolean(v)))
                }
                Value::Number(n) => {
                    let (type_id, value) = number_field(&n);
                    return Some(simple(key, type_id, value));
                }
                Value::String(s) => {
                    return Some(simple(key, standard::STRING, PrimitiveValue::Str(s)))
                }
                Value::Object(map) => {
                    self.frames.push(Frame::from_object(map));
                    return Some(StreamElement::SubmessageFieldStart {
                        name: key.name,
                        ordinal: key.ordinal,
                        type_id: standard::SUB_MESSAGE,
                    });
                }
                Value::Array(items) => {
                    if let Some((type_id, value)) = primitive_array(&items) {
                        return Some(simple(key, type_id, value));
                    }
                    if expanded {
                        // an array nested inside a repeated-field
                        // expansion has no field form; its JSON source
                        // survives as a string
                        tracing::warn!(
                            elements = items.len(),
                            "nested array has no Fudge form, keeping its JSON source"
                        );
                        let source = Value::Array(items).to_string();
                        return Some(simple(key, standard::STRING, PrimitiveValue::Str(source)));
                    }
                    // a heterogeneous array collapses to repeated fields,
                    // one per element, all sharing this key
                    if let Some(frame) = self.frames.last_mut() {
                        for item in items.into_iter().rev() {
                            frame.names.push_front(key.clone());
                            frame.values.push_front((item, true));
                        }
                    }
                }
            }
        }
    }
}

/// Deserialize a whole message, with its envelope, from a JSON string.
pub fn from_str(s: &str) -> Result<FudgeMsgEnvelope> {
    from_value_with(
        serde_json::from_str(s).context(ParseJsonSnafu)?,
        JsonSettings::default(),
    )
}

/// Deserialize a whole message from a JSON byte slice.
pub fn from_slice(slice: &[u8]) -> Result<FudgeMsgEnvelope> {
    from_value_with(
        serde_json::from_slice(slice).context(ParseJsonSnafu)?,
        JsonSettings::default(),
    )
}

/// Deserialize a whole message from a JSON byte reader.
pub fn from_reader<R: Read>(reader: R) -> Result<FudgeMsgEnvelope> {
    from_value_with(
        serde_json::from_reader(reader).context(ParseJsonSnafu)?,
        JsonSettings::default(),
    )
}

/// Deserialize a whole message from a parsed JSON value.
pub fn from_value(value: Value) -> Result<FudgeMsgEnvelope> {
    from_value_with(value, JsonSettings::default())
}

/// Deserialize a whole message from a parsed JSON value with the given
/// envelope keys.
pub fn from_value_with(value: Value, settings: JsonSettings) -> Result<FudgeMsgEnvelope> {
    let mut reader = JsonStreamReader::from_value_with(value, settings)?;
    let header = match reader.next() {
        Some(StreamElement::MessageEnvelope { header }) => header,
        _ => EnvelopeHeader::default(),
    };

    let mut current = InMemFudgeMsg::new();
    let mut pending: Vec<(FieldKeyParts, InMemFudgeMsg)> = Vec::new();

    for element in reader {
        match element {
            StreamElement::SimpleField {
                name,
                ordinal,
                type_id,
                value,
            } => {
                current
                    .add_field(Field::new(name, ordinal, type_id, FieldValue::Primitive(value)))
                    .context(BuildMessageSnafu)?;
            }
            StreamElement::SubmessageFieldStart {
                name,
                ordinal,
                type_id,
            } => {
                let parent = std::mem::replace(&mut current, InMemFudgeMsg::new());
                pending.push(((name, ordinal, type_id), parent));
            }
            StreamElement::SubmessageFieldEnd => {
                if let Some(((name, ordinal, type_id), parent)) = pending.pop() {
                    let inner = std::mem::replace(&mut current, parent);
                    current
                        .add_field(Field::new(name, ordinal, type_id, FieldValue::Message(inner)))
                        .context(BuildMessageSnafu)?;
                }
            }
            StreamElement::MessageEnvelope { .. } => {}
        }
    }

    Ok(FudgeMsgEnvelope {
        header,
        message: current,
    })
}

/// The header parts of a field that framed a nested message.
type FieldKeyParts = (Option<String>, Option<i16>, u8);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn elements(json: &str) -> Vec<StreamElement> {
        JsonStreamReader::from_str(json).unwrap().collect()
    }

    fn named(name: &str, type_id: u8, value: PrimitiveValue) -> StreamElement {
        StreamElement::SimpleField {
            name: Some(name.into()),
            ordinal: None,
            type_id,
            value,
        }
    }

    #[test]
    fn homogeneous_number_array_is_an_int_array() {
        assert_eq!(
            elements(r#"{"x":[1,2,3]}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                named(
                    "x",
                    standard::INT_ARRAY,
                    PrimitiveValue::IntArray([1, 2, 3].as_ref().into())
                ),
            ]
        );
    }

    #[test]
    fn number_arrays_narrow_int_long_double() {
        assert_eq!(
            elements(r#"{"a":[1,4000000000],"b":[1,2.5]}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                named(
                    "a",
                    standard::LONG_ARRAY,
                    PrimitiveValue::LongArray([1, 4_000_000_000].as_ref().into())
                ),
                named(
                    "b",
                    standard::DOUBLE_ARRAY,
                    PrimitiveValue::DoubleArray([1.0, 2.5].as_ref().into())
                ),
            ]
        );
    }

    #[test]
    fn heterogeneous_array_collapses_to_repeated_fields() {
        assert_eq!(
            elements(r#"{"x":[1,"two",3]}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                named("x", standard::BYTE, PrimitiveValue::Byte(1)),
                named("x", standard::STRING, PrimitiveValue::Str("two".into())),
                named("x", standard::BYTE, PrimitiveValue::Byte(3)),
            ]
        );
    }

    #[test]
    fn nested_array_in_an_expansion_keeps_its_json_source() {
        assert_eq!(
            elements(r#"{"x":[1,[2,"a"]]}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                named("x", standard::BYTE, PrimitiveValue::Byte(1)),
                named(
                    "x",
                    standard::STRING,
                    PrimitiveValue::Str(r#"[2,"a"]"#.into())
                ),
            ]
        );
    }

    #[test]
    fn envelope_keys_are_recognized_by_name_not_position() {
        assert_eq!(
            elements(r#"{"a":1,"fudgeSchemaVersion":2,"b":true,"fudgeTaxonomy":4}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 2, 4)
                },
                named("a", standard::BYTE, PrimitiveValue::Byte(1)),
                named("b", standard::BOOLEAN, PrimitiveValue::Boolean(true)),
            ]
        );
    }

    #[test]
    fn envelope_keys_can_be_renamed() {
        let settings: JsonSettings =
            serde_json::from_str(r#"{"schemaVersionField":"v"}"#).unwrap();
        let reader =
            JsonStreamReader::from_str_with(r#"{"v":9,"fudgeSchemaVersion":"x"}"#, settings)
                .unwrap();
        let out: Vec<StreamElement> = reader.collect();
        assert_eq!(
            out,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 9, 0)
                },
                named(
                    "fudgeSchemaVersion",
                    standard::STRING,
                    PrimitiveValue::Str("x".into())
                ),
            ]
        );
    }

    #[test]
    fn null_decodes_as_the_indicator() {
        assert_eq!(
            elements(r#"{"gone":null}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                named("gone", standard::INDICATOR, PrimitiveValue::Indicator),
            ]
        );
    }

    #[test]
    fn ordinal_keys_decode_as_ordinals() {
        assert_eq!(
            elements(r#"{"7":1.5,"32768":true}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: Some(7),
                    type_id: standard::DOUBLE,
                    value: PrimitiveValue::Double(1.5),
                },
                // too wide for an ordinal, so it stays a name
                named("32768", standard::BOOLEAN, PrimitiveValue::Boolean(true)),
            ]
        );
    }

    #[test]
    fn objects_nest_as_submessages() {
        assert_eq!(
            elements(r#"{"outer":{"inner":{"alive":true}},"after":1}"#),
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::default()
                },
                StreamElement::SubmessageFieldStart {
                    name: Some("outer".into()),
                    ordinal: None,
                    type_id: standard::SUB_MESSAGE,
                },
                StreamElement::SubmessageFieldStart {
                    name: Some("inner".into()),
                    ordinal: None,
                    type_id: standard::SUB_MESSAGE,
                },
                named("alive", standard::BOOLEAN, PrimitiveValue::Boolean(true)),
                StreamElement::SubmessageFieldEnd,
                StreamElement::SubmessageFieldEnd,
                named("after", standard::BYTE, PrimitiveValue::Byte(1)),
            ]
        );
    }

    #[test]
    fn top_level_scalar_is_refused() {
        assert!(matches!(
            JsonStreamReader::from_str("3"),
            Err(Error::NotAnObject { .. })
        ));
    }

    #[test]
    fn envelope_value_out_of_range_is_refused() {
        assert!(matches!(
            JsonStreamReader::from_str(r#"{"fudgeSchemaVersion":300}"#),
            Err(Error::EnvelopeValue { .. })
        ));
    }

    #[test]
    fn named_only_message_round_trips_through_json() {
        let mut inner = InMemFudgeMsg::new();
        inner.add_boolean(Some("alive"), None, true).unwrap();

        let mut msg = InMemFudgeMsg::new();
        msg.add_string(Some("symbol"), None, "XAU").unwrap();
        msg.add_long(Some("quantity"), None, 150).unwrap();
        msg.add_double(Some("price"), None, 101.25).unwrap();
        msg.add_indicator(Some("absent"), None).unwrap();
        msg.add_message(Some("detail"), None, inner).unwrap();

        let text = crate::ser::to_string(&msg).unwrap();
        let back = from_str(&text).unwrap().message;
        assert_eq!(back, msg);
    }
}
