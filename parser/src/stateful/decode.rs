//! A stateful decoding abstraction which tracks the byte position of the
//! underlying source, so that structural errors can report where in the
//! stream they were detected.

use fudge_core::header::EnvelopeHeader;
use fudge_core::value::PrimitiveValue;
use fudge_encoding::decode::{self, DecodedFieldHeader};
use fudge_encoding::dictionary::{TypeDictionary, WireTypeKind};
use snafu::{Backtrace, Snafu};
use std::io::Read;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while decoding stream content at a known position.
pub enum Error {
    /// The stream ended in the middle of an envelope or a field.
    #[snafu(display("stream ended prematurely at position {position}"))]
    Truncated {
        /// The byte offset at which the missing data was expected.
        position: u64,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// Could not decode an envelope header.
    #[snafu(display("could not decode envelope header at position {position}"))]
    DecodeEnvelope {
        /// The byte offset of the envelope header.
        position: u64,
        /// The decoding failure.
        #[snafu(backtrace)]
        source: decode::Error,
    },
    /// Could not decode a field header.
    #[snafu(display("could not decode field header at position {position}"))]
    DecodeFieldHeader {
        /// The byte offset of the field header.
        position: u64,
        /// The decoding failure.
        #[snafu(backtrace)]
        source: decode::Error,
    },
    /// Could not decode a field value.
    #[snafu(display("could not decode field value at position {position}"))]
    DecodeValue {
        /// The byte offset of the value payload.
        position: u64,
        /// The decoding failure.
        #[snafu(backtrace)]
        source: decode::Error,
    },
}

/// Stateful decode result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether a decoding failure actually means the source ran dry.
fn is_truncation(e: &decode::Error) -> bool {
    match e {
        decode::Error::TruncatedEnvelope { .. } => true,
        decode::Error::ReadBytes { source, .. } => {
            source.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// A stateful abstraction over the Fudge content reading process.
///
/// The decoder assumes it was constructed at the beginning of its source,
/// so its position equals the number of bytes read so far.
#[derive(Debug)]
pub struct StatefulDecoder<S> {
    from: S,
    dict: Arc<TypeDictionary>,
    position: u64,
}

impl<S> StatefulDecoder<S>
where
    S: Read,
{
    /// Create a decoder over the given source, resolving wire types
    /// through the given dictionary.
    pub fn new(from: S, dict: Arc<TypeDictionary>) -> Self {
        StatefulDecoder {
            from,
            dict,
            position: 0,
        }
    }

    /// The known position of the source, in bytes read.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The dictionary this decoder resolves wire types through.
    #[inline]
    pub fn dictionary(&self) -> &TypeDictionary {
        &self.dict
    }

    /// Decode the next envelope header, or detect a clean end of stream.
    pub fn decode_envelope_header(&mut self) -> Result<Option<(EnvelopeHeader, u32)>> {
        let position = self.position;
        match decode::decode_envelope_header(&mut self.from) {
            Ok(None) => Ok(None),
            Ok(Some((header, payload_len))) => {
                self.position += u64::from(fudge_core::header::ENVELOPE_HEADER_LEN);
                Ok(Some((header, payload_len)))
            }
            Err(e) if is_truncation(&e) => TruncatedSnafu { position }.fail(),
            Err(source) => Err(Error::DecodeEnvelope { position, source }),
        }
    }

    /// Decode the next field header.
    pub fn decode_field_header(&mut self) -> Result<DecodedFieldHeader> {
        let position = self.position;
        match decode::decode_field_header(&mut self.from, &self.dict) {
            Ok(decoded) => {
                self.position += u64::from(decoded.encoded_len);
                Ok(decoded)
            }
            Err(e) if is_truncation(&e) => TruncatedSnafu { position }.fail(),
            Err(source) => Err(Error::DecodeFieldHeader { position, source }),
        }
    }

    /// Eagerly read the following payload as a primitive value of the
    /// given kind.
    pub fn read_value(&mut self, kind: WireTypeKind, length: u32) -> Result<PrimitiveValue> {
        let position = self.position;
        match decode::decode_value(kind, length, &mut self.from) {
            Ok(value) => {
                self.position += u64::from(length);
                Ok(value)
            }
            Err(e) if is_truncation(&e) => TruncatedSnafu { position }.fail(),
            Err(source) => Err(Error::DecodeValue { position, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_advances_through_a_field() {
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, // envelope, 8 payload bytes
            0x40, 0x04, 0x00, 0x05, // int field, ordinal 5
            0x01, 0x02, 0x03, 0x04, // value
        ];
        let mut decoder = StatefulDecoder::new(DATA, Arc::new(TypeDictionary::standard()));
        let (_, payload) = decoder.decode_envelope_header().unwrap().unwrap();
        assert_eq!(payload, 8);
        assert_eq!(decoder.position(), 8);
        let header = decoder.decode_field_header().unwrap();
        assert_eq!(decoder.position(), 12);
        let value = decoder
            .read_value(header.wire_type.unwrap().kind, header.header.length)
            .unwrap();
        assert_eq!(value, PrimitiveValue::Int(0x01020304));
        assert_eq!(decoder.position(), 16);
    }

    #[test]
    fn premature_end_is_reported_as_truncation() {
        static DATA: &[u8] = &[0x40, 0x04, 0x00];
        let mut decoder = StatefulDecoder::new(DATA, Arc::new(TypeDictionary::standard()));
        let err = decoder.decode_field_header().unwrap_err();
        assert!(matches!(err, Error::Truncated { position: 0, .. }));
    }
}
