//! Fudge to JSON serialization.

use crate::{FudgeJson, JsonSettings};
use fudge_core::field::{FudgeMsgView, Value as FieldValue};
use fudge_core::header::EnvelopeHeader;
use fudge_core::value::PrimitiveValue;
use fudge_object::{FudgeMsgEnvelope, InMemFudgeMsg};
use fudge_parser::stream::StreamElement;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::collections::HashSet;
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while rendering Fudge content as JSON.
pub enum Error {
    /// A floating point value has no JSON number representation.
    #[snafu(display("non-finite number {value} has no JSON form"))]
    NonFiniteNumber {
        /// The offending value.
        value: f64,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The JSON document could not be written out.
    #[snafu(display("could not write JSON document"))]
    WriteJson {
        /// The serialization failure.
        source: serde_json::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// An element arrived outside any open document.
    #[snafu(display("no document is open; a message envelope must come first"))]
    NoDocument {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A sub-message bracket did not match.
    #[snafu(display("sub-message end without a matching start"))]
    UnbalancedBracket {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The document was finished with sub-messages still open.
    #[snafu(display("document finished with {depth} sub-messages still open"))]
    UnclosedSubmessage {
        /// How many brackets were left open.
        depth: usize,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// JSON serialization result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The JSON key of a field: its name, or its ordinal as a decimal string,
/// or the empty string for an anonymous field.
fn key_for(name: Option<&str>, ordinal: Option<i16>) -> String {
    match (name, ordinal) {
        (Some(name), _) => name.to_owned(),
        (None, Some(ordinal)) => ordinal.to_string(),
        (None, None) => String::new(),
    }
}

/// Render a primitive value as a JSON value. A null-valued (indicator)
/// field becomes JSON null; byte and numeric arrays become arrays of
/// numbers; date and time values render as strings, which is the closest
/// shape JSON has for them.
fn primitive_to_value(value: &PrimitiveValue) -> Result<Value> {
    fn finite(v: f64) -> Result<Value> {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .context(NonFiniteNumberSnafu { value: v })
    }

    Ok(match value {
        PrimitiveValue::Indicator => Value::Null,
        PrimitiveValue::Boolean(v) => json!(*v),
        PrimitiveValue::Byte(v) => json!(*v),
        PrimitiveValue::Short(v) => json!(*v),
        PrimitiveValue::Int(v) => json!(*v),
        PrimitiveValue::Long(v) => json!(*v),
        PrimitiveValue::Float(v) => finite(f64::from(*v))?,
        PrimitiveValue::Double(v) => finite(*v)?,
        PrimitiveValue::ByteArray(items) => Value::Array(items.iter().map(|v| json!(*v)).collect()),
        PrimitiveValue::Str(v) => json!(v),
        PrimitiveValue::ShortArray(items) => {
            Value::Array(items.iter().map(|v| json!(*v)).collect())
        }
        PrimitiveValue::IntArray(items) => Value::Array(items.iter().map(|v| json!(*v)).collect()),
        PrimitiveValue::LongArray(items) => Value::Array(items.iter().map(|v| json!(*v)).collect()),
        PrimitiveValue::FloatArray(items) => {
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                out.push(finite(f64::from(*v))?);
            }
            Value::Array(out)
        }
        PrimitiveValue::DoubleArray(items) => {
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                out.push(finite(*v)?);
            }
            Value::Array(out)
        }
        PrimitiveValue::Date(v) => json!(v.to_string()),
        PrimitiveValue::Time(v) => json!(v.to_string()),
        PrimitiveValue::DateTime(v) => json!(v.to_string()),
    })
}

/// One JSON object under construction.
#[derive(Debug, Default)]
struct Level {
    map: Map<String, Value>,
    /// keys that already collapsed into a repeated-field array
    collapsed: HashSet<String>,
}

impl Level {
    /// Insert an entry. A JSON object cannot carry two entries with one
    /// key, so fields sharing a key collapse into one array at the key's
    /// first position.
    fn insert(&mut self, key: String, value: Value) {
        if let Some(existing) = self.map.get_mut(&key) {
            if self.collapsed.contains(&key) {
                if let Value::Array(items) = existing {
                    items.push(value);
                }
            } else {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
                self.collapsed.insert(key);
            }
        } else {
            self.map.insert(key, value);
        }
    }
}

/// Render a message tree as a JSON object, collapsing repeated keys.
pub fn message_to_value<M>(msg: &M) -> Result<Value>
where
    M: FudgeMsgView,
{
    let mut level = Level::default();
    for field in msg.fields() {
        let key = key_for(field.name(), field.ordinal());
        let value = match field.value() {
            FieldValue::Primitive(value) => primitive_to_value(value)?,
            FieldValue::Message(inner) => message_to_value(inner)?,
        };
        level.insert(key, value);
    }
    Ok(Value::Object(level.map))
}

/// Render a whole envelope: the envelope keys, then the message entries.
/// Zero-valued envelope metadata is left out.
pub(crate) fn envelope_to_value<M>(
    header: EnvelopeHeader,
    msg: &M,
    settings: &JsonSettings,
) -> Result<Value>
where
    M: FudgeMsgView,
{
    let mut map = Map::new();
    if header.processing_directives != 0 {
        map.insert(
            settings.processing_directives_field.clone(),
            json!(header.processing_directives),
        );
    }
    if header.schema_version != 0 {
        map.insert(
            settings.schema_version_field.clone(),
            json!(header.schema_version),
        );
    }
    if header.taxonomy_id != 0 {
        map.insert(settings.taxonomy_field.clone(), json!(header.taxonomy_id));
    }
    let Value::Object(fields) = message_to_value(msg)? else {
        // message_to_value always builds an object
        return Ok(Value::Object(map));
    };
    map.extend(fields);
    Ok(Value::Object(map))
}

/// A writer rendering a stream of [`StreamElement`]s as JSON documents,
/// one per message envelope.
///
/// Because a JSON object cannot carry duplicate keys, the writer buffers
/// one whole document and collapses fields sharing a key into an array at
/// the key's first position. The document reaches the sink when the
/// message is [`finish`](Self::finish)ed, or implicitly when the next
/// envelope begins.
#[derive(Debug)]
pub struct JsonStreamWriter<W: Write> {
    to: W,
    settings: JsonSettings,
    /// the document under construction, root level first
    levels: Vec<Level>,
    /// the field keys that opened the nested levels
    open_keys: Vec<String>,
}

impl<W> JsonStreamWriter<W>
where
    W: Write,
{
    /// Create a writer over the given sink with the default envelope keys.
    pub fn new(to: W) -> Self {
        Self::new_with(to, JsonSettings::default())
    }

    /// Create a writer over the given sink with the given envelope keys.
    pub fn new_with(to: W, settings: JsonSettings) -> Self {
        JsonStreamWriter {
            to,
            settings,
            levels: Vec::new(),
            open_keys: Vec::new(),
        }
    }

    /// Feed one stream element.
    pub fn write(&mut self, element: StreamElement) -> Result<()> {
        match element {
            StreamElement::MessageEnvelope { header } => {
                if !self.levels.is_empty() {
                    self.finish()?;
                }
                let mut root = Level::default();
                if header.processing_directives != 0 {
                    root.map.insert(
                        self.settings.processing_directives_field.clone(),
                        json!(header.processing_directives),
                    );
                }
                if header.schema_version != 0 {
                    root.map.insert(
                        self.settings.schema_version_field.clone(),
                        json!(header.schema_version),
                    );
                }
                if header.taxonomy_id != 0 {
                    root.map
                        .insert(self.settings.taxonomy_field.clone(), json!(header.taxonomy_id));
                }
                self.levels.push(root);
                Ok(())
            }
            StreamElement::SimpleField {
                name,
                ordinal,
                value,
                ..
            } => {
                let rendered = primitive_to_value(&value)?;
                let key = key_for(name.as_deref(), ordinal);
                let level = self.levels.last_mut().context(NoDocumentSnafu)?;
                level.insert(key, rendered);
                Ok(())
            }
            StreamElement::SubmessageFieldStart { name, ordinal, .. } => {
                ensure!(!self.levels.is_empty(), NoDocumentSnafu);
                self.open_keys.push(key_for(name.as_deref(), ordinal));
                self.levels.push(Level::default());
                Ok(())
            }
            StreamElement::SubmessageFieldEnd => {
                ensure!(self.levels.len() > 1, UnbalancedBracketSnafu);
                let key = self.open_keys.pop().context(UnbalancedBracketSnafu)?;
                let closed = match self.levels.pop() {
                    Some(level) => Value::Object(level.map),
                    None => return UnbalancedBracketSnafu.fail(),
                };
                let parent = self.levels.last_mut().context(UnbalancedBracketSnafu)?;
                parent.insert(key, closed);
                Ok(())
            }
        }
    }

    /// Write the buffered document to the sink and reset for the next one.
    pub fn finish(&mut self) -> Result<()> {
        ensure!(
            self.open_keys.is_empty(),
            UnclosedSubmessageSnafu {
                depth: self.open_keys.len()
            }
        );
        let root = match self.levels.pop() {
            Some(level) => Value::Object(level.map),
            None => return NoDocumentSnafu.fail(),
        };
        serde_json::to_writer(&mut self.to, &root).context(WriteJsonSnafu)
    }

    /// Render one whole message wrapped in an envelope and write it out.
    pub fn write_message<M>(&mut self, msg: &M, header: EnvelopeHeader) -> Result<()>
    where
        M: FudgeMsgView,
    {
        let document = envelope_to_value(header, msg, &self.settings)?;
        serde_json::to_writer(&mut self.to, &document).context(WriteJsonSnafu)
    }

    /// Recover the underlying sink.
    pub fn into_inner(self) -> W {
        self.to
    }
}

impl<'a> From<&'a InMemFudgeMsg> for FudgeJson<&'a InMemFudgeMsg> {
    fn from(value: &'a InMemFudgeMsg) -> Self {
        Self(value)
    }
}

impl Serialize for FudgeJson<&'_ InMemFudgeMsg> {
    /// Serializes the message as a JSON object with one entry per field,
    /// collapsing fields that share a key into an array.
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = message_to_value(self.0).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'a> From<&'a FudgeMsgEnvelope> for FudgeJson<&'a FudgeMsgEnvelope> {
    fn from(value: &'a FudgeMsgEnvelope) -> Self {
        Self(value)
    }
}

impl Serialize for FudgeJson<&'_ FudgeMsgEnvelope> {
    /// Serializes the envelope metadata under the default keys, followed
    /// by the message entries.
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = envelope_to_value(self.0.header, &self.0.message, &JsonSettings::default())
            .map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

/// Serialize a piece of Fudge data as a string of JSON.
pub fn to_string<'a, T>(data: &'a T) -> std::result::Result<String, serde_json::Error>
where
    FudgeJson<&'a T>: From<&'a T> + Serialize,
{
    serde_json::to_string(&FudgeJson::from(data))
}

/// Serialize a piece of Fudge data as a pretty-printed string of JSON.
pub fn to_string_pretty<'a, T>(data: &'a T) -> std::result::Result<String, serde_json::Error>
where
    FudgeJson<&'a T>: From<&'a T> + Serialize,
{
    serde_json::to_string_pretty(&FudgeJson::from(data))
}

/// Serialize a piece of Fudge data as a serde JSON value.
pub fn to_value<'a, T>(data: &'a T) -> std::result::Result<Value, serde_json::Error>
where
    FudgeJson<&'a T>: From<&'a T> + Serialize,
{
    serde_json::to_value(FudgeJson::from(data))
}

/// Serialize a piece of Fudge data to a vector of bytes.
pub fn to_vec<'a, T>(data: &'a T) -> std::result::Result<Vec<u8>, serde_json::Error>
where
    FudgeJson<&'a T>: From<&'a T> + Serialize,
{
    serde_json::to_vec(&FudgeJson::from(data))
}

/// Serialize a piece of Fudge data to a byte writer.
pub fn to_writer<'a, W, T>(writer: W, data: &'a T) -> std::result::Result<(), serde_json::Error>
where
    FudgeJson<&'a T>: From<&'a T> + Serialize,
    W: Write,
{
    serde_json::to_writer(writer, &FudgeJson::from(data))
}
