//! The pull parser: reading Fudge content sequentially as stream elements.

use crate::stateful::decode::{self, StatefulDecoder};
use crate::stream::StreamElement;
use fudge_core::header::EnvelopeHeader;
use fudge_core::taxonomy::{Taxonomy, TaxonomyResolver};
use fudge_encoding::dictionary::{TypeDictionary, WireTypeKind};
use snafu::{Backtrace, Snafu};
use std::io::Read;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while pulling elements out of a stream.
pub enum Error {
    /// The underlying content could not be decoded. This covers transport
    /// failures, truncation, and malformed headers or payloads.
    #[snafu(context(false))]
    Decode {
        /// The decoding failure, with its stream position.
        #[snafu(backtrace)]
        source: decode::Error,
    },
    /// A length field disagrees with the enclosing frame.
    #[snafu(display(
        "content at position {position} overruns its enclosing frame by {excess} bytes"
    ))]
    FramingViolation {
        /// The byte offset at which the overrun was detected.
        position: u64,
        /// By how many bytes the content overruns the frame.
        excess: u64,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Stream reading result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A pull parser decoding a byte source into a stream of
/// [`StreamElement`]s.
///
/// The reader is an [`Iterator`]; each call to `next` blocks on the
/// underlying source until one whole element is available. Nested message
/// brackets are strictly LIFO, enforced through a stack of frame end
/// offsets. After the outermost frame closes the reader returns to its
/// initial state and will read the next envelope from the same source, if
/// there is one.
///
/// The reader owns its transport; dropping the reader releases it.
#[derive(Debug)]
pub struct FudgeStreamReader<S> {
    decoder: StatefulDecoder<S>,
    resolver: Option<Arc<dyn TaxonomyResolver>>,
    /// envelope metadata of the message being read, kept for the accessors
    envelope: Option<EnvelopeHeader>,
    /// absolute end offsets of the open frames, outermost first
    frames: Vec<u64>,
    peeked: Option<Result<StreamElement>>,
    /// fuse the iteration process if true
    hard_break: bool,
}

impl<S> FudgeStreamReader<S>
where
    S: Read,
{
    /// Create a reader over the given source with the standard type
    /// dictionary and no taxonomy resolution.
    pub fn new(source: S) -> Self {
        Self::new_with(source, fudge_encoding::dictionary::standard_shared(), None)
    }

    /// Create a reader over the given source, resolving wire types through
    /// `dict` and, when a resolver is given, recovering field names from
    /// the taxonomy named by each envelope.
    pub fn new_with(
        source: S,
        dict: Arc<TypeDictionary>,
        resolver: Option<Arc<dyn TaxonomyResolver>>,
    ) -> Self {
        FudgeStreamReader {
            decoder: StatefulDecoder::new(source, dict),
            resolver,
            envelope: None,
            frames: Vec::new(),
            peeked: None,
            hard_break: false,
        }
    }

    /// The envelope metadata of the message currently being read.
    pub fn envelope_header(&self) -> Option<EnvelopeHeader> {
        self.envelope
    }

    /// The processing directives of the current envelope.
    pub fn processing_directives(&self) -> Option<u8> {
        self.envelope.map(|e| e.processing_directives)
    }

    /// The schema version of the current envelope.
    pub fn schema_version(&self) -> Option<u8> {
        self.envelope.map(|e| e.schema_version)
    }

    /// The taxonomy identifier of the current envelope.
    pub fn taxonomy_id(&self) -> Option<i16> {
        self.envelope.map(|e| e.taxonomy_id)
    }

    /// The number of bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.decoder.position()
    }

    /// The number of bytes left in the outermost frame of the message
    /// being read, or `None` when no message is open.
    ///
    /// `Some(0)` means the current message is fully consumed from the
    /// transport; only pending nested-message end brackets, if any, remain
    /// to be pulled. Whole-message consumers use this to stop without
    /// blocking on the next envelope.
    pub fn remaining_in_message(&self) -> Option<u64> {
        self.frames
            .first()
            .map(|end| end.saturating_sub(self.decoder.position()))
    }

    /// Whether another element can be pulled from the stream.
    ///
    /// This reads ahead by one element; the element is handed out by the
    /// following call to `next`.
    pub fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.advance();
        }
        self.peeked.is_some()
    }

    /// The taxonomy for the current envelope, when one can be resolved.
    fn taxonomy(&self) -> Option<&dyn Taxonomy> {
        let envelope = self.envelope?;
        if !envelope.has_taxonomy() {
            return None;
        }
        self.resolver.as_deref()?.taxonomy_for(envelope.taxonomy_id)
    }

    fn advance(&mut self) -> Option<Result<StreamElement>> {
        if self.hard_break {
            return None;
        }
        loop {
            let Some(&frame_end) = self.frames.last() else {
                // initial state: an envelope header or the end of the
                // stream is expected
                match self.decoder.decode_envelope_header() {
                    Ok(None) => {
                        self.hard_break = true;
                        return None;
                    }
                    Ok(Some((header, payload_len))) => {
                        self.envelope = Some(header);
                        self.frames
                            .push(self.decoder.position() + u64::from(payload_len));
                        return Some(Ok(StreamElement::MessageEnvelope { header }));
                    }
                    Err(e) => {
                        self.hard_break = true;
                        return Some(Err(e.into()));
                    }
                }
            };

            let position = self.decoder.position();
            if position == frame_end {
                self.frames.pop();
                if self.frames.is_empty() {
                    // outermost frame closed: back to the initial state
                    continue;
                }
                return Some(Ok(StreamElement::SubmessageFieldEnd));
            }

            let element = self.read_field(frame_end);
            if element.is_err() {
                self.hard_break = true;
            }
            return Some(element);
        }
    }

    /// Decode one field inside the frame ending at `frame_end`: either a
    /// materialized simple field or the opening bracket of a nested
    /// message.
    fn read_field(&mut self, frame_end: u64) -> Result<StreamElement> {
        let decoded = self.decoder.decode_field_header()?;
        let after_header = self.decoder.position();
        if after_header > frame_end {
            return FramingViolationSnafu {
                position: after_header,
                excess: after_header - frame_end,
            }
            .fail();
        }
        let payload_end = after_header + u64::from(decoded.header.length);
        if payload_end > frame_end {
            return FramingViolationSnafu {
                position: after_header,
                excess: payload_end - frame_end,
            }
            .fail();
        }

        let type_id = decoded.header.type_id;
        let ordinal = decoded.header.ordinal;
        let mut name = decoded.header.name;
        if name.is_none() {
            if let (Some(ordinal), Some(taxonomy)) = (ordinal, self.taxonomy()) {
                name = taxonomy.name_of(ordinal).map(str::to_owned);
            }
        }

        match decoded.wire_type {
            Some(wire_type) if wire_type.kind.is_message() => {
                self.frames.push(payload_end);
                Ok(StreamElement::SubmessageFieldStart {
                    name,
                    ordinal,
                    type_id,
                })
            }
            Some(wire_type) => {
                let value = self.decoder.read_value(wire_type.kind, decoded.header.length)?;
                Ok(StreamElement::SimpleField {
                    name,
                    ordinal,
                    type_id,
                    value,
                })
            }
            None => {
                tracing::warn!(
                    type_id,
                    length = decoded.header.length,
                    "unknown wire type, preserving payload as opaque bytes"
                );
                let value = self
                    .decoder
                    .read_value(WireTypeKind::Opaque, decoded.header.length)?;
                Ok(StreamElement::SimpleField {
                    name,
                    ordinal,
                    type_id,
                    value,
                })
            }
        }
    }
}

impl<S> Iterator for FudgeStreamReader<S>
where
    S: Read,
{
    type Item = Result<StreamElement>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(peeked) = self.peeked.take() {
            return Some(peeked);
        }
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fudge_core::taxonomy::{MapTaxonomy, MapTaxonomyResolver};
    use fudge_core::value::PrimitiveValue;

    fn validate_stream_reader<I>(data: &[u8], ground_truth: I)
    where
        I: IntoIterator<Item = StreamElement>,
    {
        let mut reader = FudgeStreamReader::new(data);

        for gt_element in ground_truth {
            let element = reader
                .next()
                .expect("stream ended early")
                .expect("should parse without an error");
            assert_eq!(element, gt_element);
        }

        assert_eq!(
            reader.by_ref().count(),
            0,
            "unexpected number of elements remaining"
        );
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn empty_envelope() {
        static DATA: &[u8] = &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];

        validate_stream_reader(
            DATA,
            vec![StreamElement::MessageEnvelope {
                header: EnvelopeHeader::new(0, 0, 0),
            }],
        );
    }

    #[test]
    fn ordinal_int_field() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, // envelope, total 16
            0x40, 0x04, 0x00, 0x05, // int field, ordinal 5
            0x01, 0x02, 0x03, 0x04, // value
        ];

        validate_stream_reader(
            DATA,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 0, 0),
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: Some(5),
                    type_id: 4,
                    value: PrimitiveValue::Int(0x01020304),
                },
            ],
        );
    }

    #[test]
    fn submessage_bracketing() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0E, // envelope, total 14
            0x08, 0x15, 0x03, // sub-message field, 3 payload bytes
            0x00, 0x01, 0x01, // boolean field, true
        ];

        validate_stream_reader(
            DATA,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 0, 0),
                },
                StreamElement::SubmessageFieldStart {
                    name: None,
                    ordinal: None,
                    type_id: 21,
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: None,
                    type_id: 1,
                    value: PrimitiveValue::Boolean(true),
                },
                StreamElement::SubmessageFieldEnd,
            ],
        );
    }

    #[test]
    fn empty_submessage_closes_immediately() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0B, // envelope, total 11
            0x08, 0x15, 0x00, // sub-message field, empty
        ];

        validate_stream_reader(
            DATA,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 0, 0),
                },
                StreamElement::SubmessageFieldStart {
                    name: None,
                    ordinal: None,
                    type_id: 21,
                },
                StreamElement::SubmessageFieldEnd,
            ],
        );
    }

    #[test]
    fn unknown_wire_type_payload_is_preserved() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x11, // envelope, total 17
            0x08, 0xC8, 0x03, // type 200, 3 payload bytes
            0xAA, 0xBB, 0xCC,
            0x00, 0x01, 0x01, // boolean field after it
        ];

        validate_stream_reader(
            DATA,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 0, 0),
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: None,
                    type_id: 200,
                    value: PrimitiveValue::ByteArray([0xAA, 0xBB, 0xCC].as_ref().into()),
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: None,
                    type_id: 1,
                    value: PrimitiveValue::Boolean(true),
                },
            ],
        );
    }

    #[test]
    fn truncated_stream_is_an_error_after_the_envelope() {
        // envelope claims 100 bytes in total, but only half the content is
        // supplied
        let mut data = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64];
        data.extend_from_slice(&[0x28, 0x10, 0x04, b'd', b'a', b't', b'a', 0x50]);
        data.extend_from_slice(&[0u8; 34]);

        let mut reader = FudgeStreamReader::new(&data[..]);
        assert!(matches!(
            reader.next(),
            Some(Ok(StreamElement::MessageEnvelope { .. }))
        ));
        let err = reader.next().expect("an element is due").unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                source: decode::Error::Truncated { .. },
                ..
            }
        ));
        assert!(reader.next().is_none(), "the reader must fuse after a hard error");
    }

    #[test]
    fn payload_crossing_the_frame_is_a_framing_violation() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, // envelope, total 12
            0x08, 0x10, 0xC8, // string field claiming 200 bytes
            0x00,
        ];

        let mut reader = FudgeStreamReader::new(DATA);
        reader.next().expect("envelope").expect("envelope parses");
        let err = reader.next().expect("an element is due").unwrap_err();
        assert!(matches!(err, Error::FramingViolation { .. }));
    }

    #[test]
    fn taxonomy_recovers_names_on_decode() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10, // envelope, taxonomy 4
            0x40, 0x04, 0x00, 0x07, // int field, ordinal 7
            0x00, 0x00, 0x00, 0x2A,
        ];

        let mut resolver = MapTaxonomyResolver::new();
        resolver.insert(
            4,
            Arc::new(MapTaxonomy::from_pairs([(7, "price")]).unwrap()),
        );
        let mut reader = FudgeStreamReader::new_with(
            DATA,
            Arc::new(TypeDictionary::standard()),
            Some(Arc::new(resolver)),
        );

        reader.next().expect("envelope").expect("envelope parses");
        assert_eq!(reader.taxonomy_id(), Some(4));
        let field = reader.next().expect("field").expect("field parses");
        assert_eq!(
            field,
            StreamElement::SimpleField {
                name: Some("price".into()),
                ordinal: Some(7),
                type_id: 4,
                value: PrimitiveValue::Int(42),
            }
        );

        // without a resolver the ordinal stands alone
        let mut plain = FudgeStreamReader::new(DATA);
        plain.next().expect("envelope").expect("envelope parses");
        let field = plain.next().expect("field").expect("field parses");
        assert_eq!(
            field,
            StreamElement::SimpleField {
                name: None,
                ordinal: Some(7),
                type_id: 4,
                value: PrimitiveValue::Int(42),
            }
        );
    }

    #[test]
    fn two_envelopes_back_to_back() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08,
            0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0B,
            0x00, 0x01, 0x01,
        ];

        validate_stream_reader(
            DATA,
            vec![
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 1, 0),
                },
                StreamElement::MessageEnvelope {
                    header: EnvelopeHeader::new(0, 2, 0),
                },
                StreamElement::SimpleField {
                    name: None,
                    ordinal: None,
                    type_id: 1,
                    value: PrimitiveValue::Boolean(true),
                },
            ],
        );
    }

    #[test]
    fn has_next_peeks_without_losing_elements() {
        static DATA: &[u8] = &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
        let mut reader = FudgeStreamReader::new(DATA);
        assert!(reader.has_next());
        assert!(reader.has_next());
        assert!(matches!(
            reader.next(),
            Some(Ok(StreamElement::MessageEnvelope { .. }))
        ));
        assert!(!reader.has_next());
        assert!(reader.next().is_none());
    }
}
