//! The stream writer: serializing fields and whole message trees with
//! correct framing.
//!
//! Framing is length-prefixed, so the writer precomputes the encoded size
//! of every nested message before emitting the field prefix that frames
//! it. Integer and byte-array narrowing and taxonomy substitution are
//! applied here, unconditionally, so that any well-formed message tree
//! produces a conforming byte stream.

use crate::stateful::encode::{self, StatefulEncoder};
use fudge_core::field::{Field, FudgeMsgView, Value};
use fudge_core::header::{EnvelopeHeader, MAX_FIELD_COUNT};
use fudge_core::taxonomy::{Taxonomy, TaxonomyResolver};
use fudge_core::value::PrimitiveValue;
use fudge_encoding::dictionary::{self, TypeDictionary};
use fudge_encoding::encode::{encoded_field_header_len, encoded_value_len};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while writing stream content.
pub enum Error {
    /// The underlying content could not be encoded.
    #[snafu(context(false))]
    Encode {
        /// The encoding failure, with its stream position.
        #[snafu(backtrace)]
        source: encode::Error,
    },
    /// A field's declared type cannot carry its value.
    #[snafu(display("could not resolve a wire type for a field"))]
    ResolveType {
        /// The dictionary failure.
        source: dictionary::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A header could not be sized.
    #[snafu(display("could not size a field header"))]
    SizeHeader {
        /// The sizing failure.
        #[snafu(backtrace)]
        source: fudge_encoding::encode::Error,
    },
    /// A message holds more fields than the wire can count.
    #[snafu(display("message holds {count} fields, above the {MAX_FIELD_COUNT} ceiling"))]
    CapacityExceeded {
        /// The actual field count.
        count: usize,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A message's encoded form does not fit an envelope length field.
    #[snafu(display("message encodes to {size} bytes, beyond the envelope maximum"))]
    MessageTooLarge {
        /// The encoded size.
        size: u64,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A nested message value was declared under a non-message wire type.
    #[snafu(display("wire type {type_id} does not frame a nested message"))]
    NotSubmessage {
        /// The offending type identifier.
        type_id: u8,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A sub-message end had no matching start.
    #[snafu(display("sub-message end without a matching start"))]
    UnbalancedBracket {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Stream writing result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Substitute a field name with its taxonomy ordinal, when the field has a
/// name, no ordinal, and the taxonomy resolves the name.
fn substituted<'n>(
    taxonomy: Option<&dyn Taxonomy>,
    name: Option<&'n str>,
    ordinal: Option<i16>,
) -> (Option<&'n str>, Option<i16>) {
    if ordinal.is_none() {
        if let (Some(name), Some(taxonomy)) = (name, taxonomy) {
            if let Some(ordinal) = taxonomy.ordinal_of(name) {
                return (None, Some(ordinal));
            }
        }
    }
    (name, ordinal)
}

/// The encoded size of one field, prefix and payload included, under the
/// given dictionary and optional taxonomy.
pub fn encoded_field_len<M>(
    dict: &TypeDictionary,
    taxonomy: Option<&dyn Taxonomy>,
    field: &Field<M>,
) -> Result<u64>
where
    M: FudgeMsgView,
{
    let (name, ordinal) = substituted(taxonomy, field.name(), field.ordinal());
    match field.value() {
        Value::Message(inner) => {
            ensure!(
                dict.by_id(field.type_id())
                    .is_some_and(|t| t.kind.is_message()),
                NotSubmessageSnafu {
                    type_id: field.type_id()
                }
            );
            let payload = encoded_message_len(dict, taxonomy, inner)?;
            ensure!(payload <= u64::from(u32::MAX), MessageTooLargeSnafu { size: payload });
            let header = encoded_field_header_len(ordinal, name, Some(payload as u32))
                .context(SizeHeaderSnafu)?;
            Ok(u64::from(header) + payload)
        }
        Value::Primitive(value) => {
            let (wire_type, value) = dict
                .minimize(field.type_id(), value)
                .context(ResolveTypeSnafu)?;
            let payload = encoded_value_len(&value);
            let explicit = if wire_type.fixed_width().is_some() {
                None
            } else {
                Some(payload)
            };
            let header = encoded_field_header_len(ordinal, name, explicit)
                .context(SizeHeaderSnafu)?;
            Ok(u64::from(header) + u64::from(payload))
        }
    }
}

/// The encoded size of a message's fields, in bytes, under the given
/// dictionary and optional taxonomy. The envelope header is not counted.
pub fn encoded_message_len<M>(
    dict: &TypeDictionary,
    taxonomy: Option<&dyn Taxonomy>,
    msg: &M,
) -> Result<u64>
where
    M: FudgeMsgView,
{
    ensure!(
        msg.len() <= MAX_FIELD_COUNT,
        CapacityExceededSnafu { count: msg.len() }
    );
    let mut total = 0u64;
    for field in msg.fields() {
        total += encoded_field_len(dict, taxonomy, field)?;
    }
    Ok(total)
}

/// A stateful device for serializing Fudge content in sequential order,
/// the counterpart of the stream reader.
///
/// The writer owns its transport. [`close`](Self::close) flushes it exactly
/// once; closing again is a no-op.
#[derive(Debug)]
pub struct FudgeStreamWriter<W: Write> {
    encoder: StatefulEncoder<W>,
    dict: Arc<TypeDictionary>,
    resolver: Option<Arc<dyn TaxonomyResolver>>,
    /// taxonomy named by the envelope currently being written
    taxonomy_id: i16,
    open_submessages: usize,
    closed: bool,
}

impl<W> FudgeStreamWriter<W>
where
    W: Write,
{
    /// Create a writer over the given sink with the standard type
    /// dictionary and no taxonomy substitution.
    pub fn new(to: W) -> Self {
        Self::new_with(to, fudge_encoding::dictionary::standard_shared(), None)
    }

    /// Create a writer over the given sink, resolving wire types through
    /// `dict` and substituting names through the resolver's taxonomies.
    pub fn new_with(
        to: W,
        dict: Arc<TypeDictionary>,
        resolver: Option<Arc<dyn TaxonomyResolver>>,
    ) -> Self {
        FudgeStreamWriter {
            encoder: StatefulEncoder::new(to),
            dict,
            resolver,
            taxonomy_id: 0,
            open_submessages: 0,
            closed: false,
        }
    }

    /// The dictionary this writer resolves wire types through.
    pub fn dictionary(&self) -> &TypeDictionary {
        &self.dict
    }

    /// The number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.encoder.position()
    }

    /// The taxonomy named by the current envelope, when one resolves.
    fn taxonomy(&self) -> Option<&dyn Taxonomy> {
        if self.taxonomy_id == 0 {
            return None;
        }
        self.resolver.as_deref()?.taxonomy_for(self.taxonomy_id)
    }

    /// Write an envelope header framing `payload_len` bytes of fields.
    ///
    /// The taxonomy named by the header is used to substitute field names
    /// until the next envelope.
    pub fn write_envelope_header(
        &mut self,
        header: EnvelopeHeader,
        payload_len: u32,
    ) -> Result<()> {
        self.taxonomy_id = header.taxonomy_id;
        self.encoder.encode_envelope_header(header, payload_len)?;
        Ok(())
    }

    /// Write one field carrying a primitive value, applying narrowing and
    /// taxonomy substitution.
    pub fn write_simple_field(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        type_id: u8,
        value: &PrimitiveValue,
    ) -> Result<()> {
        let (name, ordinal) = substituted(self.taxonomy(), name, ordinal);
        let (wire_type, value) = self
            .dict
            .minimize(type_id, value)
            .context(ResolveTypeSnafu)?;
        let explicit = if wire_type.fixed_width().is_some() {
            None
        } else {
            Some(encoded_value_len(&value))
        };
        self.encoder
            .encode_field_header(wire_type.id, ordinal, name, explicit)?;
        self.encoder.encode_value(wire_type.kind, &value)?;
        Ok(())
    }

    /// Open a sub-message field framing `payload_len` bytes of nested
    /// content. The length must be known up front; compute it with
    /// [`encoded_message_len`].
    pub fn write_submessage_start(
        &mut self,
        name: Option<&str>,
        ordinal: Option<i16>,
        payload_len: u32,
    ) -> Result<()> {
        let (name, ordinal) = substituted(self.taxonomy(), name, ordinal);
        self.encoder.encode_field_header(
            dictionary::standard::SUB_MESSAGE,
            ordinal,
            name,
            Some(payload_len),
        )?;
        self.open_submessages += 1;
        Ok(())
    }

    /// Close the innermost open sub-message field. Frame lengths are
    /// explicit, so nothing reaches the wire; the writer only checks the
    /// bracketing.
    pub fn write_submessage_end(&mut self) -> Result<()> {
        ensure!(self.open_submessages > 0, UnbalancedBracketSnafu);
        self.open_submessages -= 1;
        Ok(())
    }

    /// Write one field of a message tree, recursing into nested messages.
    pub fn write_field<M>(&mut self, field: &Field<M>) -> Result<()>
    where
        M: FudgeMsgView,
    {
        match field.value() {
            Value::Primitive(value) => {
                self.write_simple_field(field.name(), field.ordinal(), field.type_id(), value)
            }
            Value::Message(inner) => {
                ensure!(
                    self.dict
                        .by_id(field.type_id())
                        .is_some_and(|t| t.kind.is_message()),
                    NotSubmessageSnafu {
                        type_id: field.type_id()
                    }
                );
                let payload = encoded_message_len(&self.dict, self.taxonomy(), inner)?;
                ensure!(
                    payload <= u64::from(u32::MAX),
                    MessageTooLargeSnafu { size: payload }
                );
                let (name, ordinal) =
                    substituted(self.taxonomy(), field.name(), field.ordinal());
                self.encoder.encode_field_header(
                    field.type_id(),
                    ordinal,
                    name,
                    Some(payload as u32),
                )?;
                self.write_message_fields(inner)
            }
        }
    }

    /// Write every field of a message, in order.
    pub fn write_message_fields<M>(&mut self, msg: &M) -> Result<()>
    where
        M: FudgeMsgView,
    {
        ensure!(
            msg.len() <= MAX_FIELD_COUNT,
            CapacityExceededSnafu { count: msg.len() }
        );
        for field in msg.fields() {
            self.write_field(field)?;
        }
        Ok(())
    }

    /// Write a whole message wrapped in an envelope: the payload size is
    /// precomputed, the envelope header emitted, and the tree walked.
    pub fn write_message<M>(&mut self, msg: &M, header: EnvelopeHeader) -> Result<()>
    where
        M: FudgeMsgView,
    {
        self.taxonomy_id = header.taxonomy_id;
        let payload = encoded_message_len(&self.dict, self.taxonomy(), msg)?;
        ensure!(
            payload <= u64::from(i32::MAX as u32 - fudge_core::header::ENVELOPE_HEADER_LEN),
            MessageTooLargeSnafu { size: payload }
        );
        self.write_envelope_header(header, payload as u32)?;
        self.write_message_fields(msg)
    }

    /// Flush the underlying transport. The first call releases buffered
    /// content; closing an already closed writer is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.encoder.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Recover the underlying sink.
    pub fn into_inner(self) -> W {
        self.encoder.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fudge_core::taxonomy::{MapTaxonomy, MapTaxonomyResolver};

    fn writer_for(out: &mut Vec<u8>) -> FudgeStreamWriter<&mut Vec<u8>> {
        FudgeStreamWriter::new(out)
    }

    #[test]
    fn named_indicator_field_message_is_fifteen_bytes() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 0), 7)
            .unwrap();
        writer
            .write_simple_field(Some("flag"), None, 0, &PrimitiveValue::Indicator)
            .unwrap();
        writer.close().unwrap();
        #[rustfmt::skip]
        static GROUND_TRUTH: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0F,
            0x20, 0x00, 0x04, b'f', b'l', b'a', b'g',
        ];
        assert_eq!(out, GROUND_TRUTH);
    }

    #[test]
    fn ordinal_int_field_matches_wire_form() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 0), 8)
            .unwrap();
        writer
            .write_simple_field(None, Some(5), 4, &PrimitiveValue::Int(0x01020304))
            .unwrap();
        #[rustfmt::skip]
        static GROUND_TRUTH: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
            0x40, 0x04, 0x00, 0x05, 0x01, 0x02, 0x03, 0x04,
        ];
        assert_eq!(out, GROUND_TRUTH);
    }

    #[test]
    fn integers_are_narrowed_unconditionally() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 0), 4)
            .unwrap();
        writer
            .write_simple_field(None, None, 5, &PrimitiveValue::Long(300))
            .unwrap();
        assert_eq!(&out[8..], &[0x00, 0x03, 0x01, 0x2C]);
    }

    #[test]
    fn byte_arrays_take_their_fixed_length_type() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 0), 0)
            .unwrap();
        writer
            .write_simple_field(None, None, 15, &PrimitiveValue::ByteArray([0u8; 8].as_ref().into()))
            .unwrap();
        // type 9 is the fixed eight-byte array: no length field on the wire
        assert_eq!(&out[8..10], &[0x00, 0x09]);
        assert_eq!(out.len(), 8 + 2 + 8);
    }

    #[test]
    fn submessage_bracketing_produces_exact_frames() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 0), 6)
            .unwrap();
        writer.write_submessage_start(None, None, 3).unwrap();
        writer
            .write_simple_field(None, None, 1, &PrimitiveValue::Boolean(true))
            .unwrap();
        writer.write_submessage_end().unwrap();
        #[rustfmt::skip]
        static GROUND_TRUTH: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0E,
            0x08, 0x15, 0x03,
            0x00, 0x01, 0x01,
        ];
        assert_eq!(out, GROUND_TRUTH);
    }

    #[test]
    fn unbalanced_end_is_refused() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        let err = writer.write_submessage_end().unwrap_err();
        assert!(matches!(err, Error::UnbalancedBracket { .. }));
    }

    #[test]
    fn taxonomy_substitutes_names_for_ordinals() {
        let mut resolver = MapTaxonomyResolver::new();
        resolver.insert(
            4,
            Arc::new(MapTaxonomy::from_pairs([(7, "price")]).unwrap()),
        );
        let mut out = Vec::new();
        let mut writer = FudgeStreamWriter::new_with(
            &mut out,
            Arc::new(TypeDictionary::standard()),
            Some(Arc::new(resolver)),
        );
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 4), 5)
            .unwrap();
        writer
            .write_simple_field(Some("price"), None, 4, &PrimitiveValue::Int(1))
            .unwrap();
        // the name is gone; ordinal 7 and a narrowed byte value remain
        assert_eq!(&out[8..], &[0x40, 0x02, 0x00, 0x07, 0x01]);
    }

    #[test]
    fn field_with_name_and_ordinal_keeps_both() {
        let mut resolver = MapTaxonomyResolver::new();
        resolver.insert(
            4,
            Arc::new(MapTaxonomy::from_pairs([(7, "price")]).unwrap()),
        );
        let mut out = Vec::new();
        let mut writer = FudgeStreamWriter::new_with(
            &mut out,
            Arc::new(TypeDictionary::standard()),
            Some(Arc::new(resolver)),
        );
        writer
            .write_envelope_header(EnvelopeHeader::new(0, 0, 4), 11)
            .unwrap();
        writer
            .write_simple_field(Some("price"), Some(9), 4, &PrimitiveValue::Int(1))
            .unwrap();
        assert_eq!(
            &out[8..],
            &[0x60, 0x02, 0x00, 0x09, 0x05, b'p', b'r', b'i', b'c', b'e', 0x01]
        );
    }

    #[test]
    fn close_is_idempotent() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn mismatched_declaration_is_refused() {
        let mut out = Vec::new();
        let mut writer = writer_for(&mut out);
        let err = writer
            .write_simple_field(None, None, 4, &PrimitiveValue::Str("x".into()))
            .unwrap_err();
        assert!(matches!(err, Error::ResolveType { .. }));
    }
}
