//! Decoding primitives: envelope headers, field headers and primitive
//! values out of a byte source.
//!
//! These functions are stateless; they do not know where in the stream they
//! are. The stateful parser wraps them and attaches byte positions to the
//! errors they surface.

use crate::dictionary::{TypeDictionary, WireType, WireTypeKind};
use crate::prefix::FieldPrefix;
use byteordered::byteorder::{BigEndian, ByteOrder};
use fudge_core::header::{EnvelopeHeader, FieldHeader, ENVELOPE_HEADER_LEN};
use fudge_core::time::{FudgeDate, FudgeDateTime, FudgeTime};
use fudge_core::value::{PrimitiveValue, C};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::Read;

/// Marker for a time value carrying no UTC offset.
pub(crate) const NO_OFFSET: i8 = i8::MIN;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error produced while decoding wire content.
pub enum Error {
    /// Could not read bytes from the source.
    #[snafu(display("could not read from source"))]
    ReadBytes {
        /// The underlying transport failure.
        source: std::io::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The source ended inside an envelope header.
    #[snafu(display("stream ended {got} bytes into an envelope header"))]
    TruncatedEnvelope {
        /// How many of the eight header bytes were present.
        got: usize,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The envelope's total length field is impossible.
    #[snafu(display("envelope declares a total length of {length}"))]
    BadEnvelopeLength {
        /// The declared total length.
        length: i32,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A field of an unknown wire type has no advertised length to skip by.
    #[snafu(display("unknown wire type {type_id} with implicit width"))]
    UnknownTypeWidth {
        /// The unresolvable type identifier.
        type_id: u8,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A variable-width wire type arrived without a length field.
    #[snafu(display("variable-width wire type {type_id} framed without a length"))]
    MissingLength {
        /// The offending type identifier.
        type_id: u8,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A fixed-width payload arrived with a conflicting explicit length.
    #[snafu(display("wire type expects {expected} payload bytes, got {got}"))]
    FixedLengthMismatch {
        /// The width implied by the wire type.
        expected: u32,
        /// The length that arrived.
        got: u32,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// An array payload is not a whole number of elements.
    #[snafu(display("payload of {length} bytes is not a whole number of {element}-byte elements"))]
    UnalignedArray {
        /// The payload length.
        length: u32,
        /// The element width.
        element: u32,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A name or string payload is not valid UTF-8.
    #[snafu(display("text payload is not valid UTF-8"))]
    InvalidUtf8 {
        /// The conversion failure.
        source: std::string::FromUtf8Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A packed date or time has components out of range.
    #[snafu(display("packed date/time is out of range"))]
    InvalidDateTime {
        /// The validation failure.
        source: fudge_core::time::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A value read was requested for a nested message type.
    #[snafu(display("attempted to read a sub-message as a primitive value"))]
    NonPrimitiveType {
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Decode result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A decoded field header together with what the dictionary knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFieldHeader {
    /// The raw prefix byte, decoded.
    pub prefix: FieldPrefix,
    /// The header contents with the payload length resolved.
    pub header: FieldHeader,
    /// The dictionary's view of the type identifier; `None` when unknown.
    pub wire_type: Option<WireType>,
    /// How many bytes the header itself occupied on the wire.
    pub encoded_len: u32,
}

/// Fill `buf`, tolerating an end of stream: returns the number of bytes
/// actually read, which is less than the buffer size only at end of input.
fn read_full<S: Read>(src: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context(ReadBytesSnafu),
        }
    }
    Ok(filled)
}

fn read_exact<S: Read>(src: &mut S, buf: &mut [u8]) -> Result<()> {
    src.read_exact(buf).context(ReadBytesSnafu)
}

/// Decode a message envelope header.
///
/// Returns `None` on a clean end of stream (no bytes left); an end of
/// stream part way through the header is [`Error::TruncatedEnvelope`].
/// On success, the returned length is that of the payload, with the
/// eight header bytes already discounted.
pub fn decode_envelope_header<S: Read>(src: &mut S) -> Result<Option<(EnvelopeHeader, u32)>> {
    let mut buf = [0u8; ENVELOPE_HEADER_LEN as usize];
    let got = read_full(src, &mut buf)?;
    if got == 0 {
        return Ok(None);
    }
    ensure!(got == buf.len(), TruncatedEnvelopeSnafu { got });

    let header = EnvelopeHeader {
        processing_directives: buf[0],
        schema_version: buf[1],
        taxonomy_id: BigEndian::read_i16(&buf[2..4]),
    };
    let total = BigEndian::read_i32(&buf[4..8]);
    ensure!(
        total >= ENVELOPE_HEADER_LEN as i32,
        BadEnvelopeLengthSnafu { length: total }
    );
    Ok(Some((header, total as u32 - ENVELOPE_HEADER_LEN)))
}

/// Decode one field header: prefix byte, type identifier, optional ordinal
/// and name, and the payload length (explicit or resolved through the
/// dictionary).
pub fn decode_field_header<S: Read>(
    src: &mut S,
    dict: &TypeDictionary,
) -> Result<DecodedFieldHeader> {
    let mut b2 = [0u8; 2];
    read_exact(src, &mut b2)?;
    let prefix = FieldPrefix::from_byte(b2[0]);
    let type_id = b2[1];
    let mut encoded_len = 2u32;

    let ordinal = if prefix.has_ordinal {
        read_exact(src, &mut b2)?;
        encoded_len += 2;
        Some(BigEndian::read_i16(&b2))
    } else {
        None
    };

    let name = if prefix.has_name {
        let mut len = [0u8; 1];
        read_exact(src, &mut len)?;
        let mut raw = vec![0u8; usize::from(len[0])];
        read_exact(src, &mut raw)?;
        encoded_len += 1 + u32::from(len[0]);
        Some(String::from_utf8(raw).context(InvalidUtf8Snafu)?)
    } else {
        None
    };

    let wire_type = dict.by_id(type_id);
    let length = if prefix.implicit_width() {
        let wire_type = wire_type.context(UnknownTypeWidthSnafu { type_id })?;
        wire_type
            .fixed_width()
            .context(MissingLengthSnafu { type_id })?
    } else {
        let mut b4 = [0u8; 4];
        let width = usize::from(prefix.var_width);
        read_exact(src, &mut b4[..width])?;
        encoded_len += prefix.var_width as u32;
        match width {
            1 => u32::from(b4[0]),
            2 => u32::from(BigEndian::read_u16(&b4[..2])),
            _ => BigEndian::read_u32(&b4),
        }
    };

    Ok(DecodedFieldHeader {
        prefix,
        header: FieldHeader {
            type_id,
            ordinal,
            name,
            length,
        },
        wire_type,
        encoded_len,
    })
}

/// Decode a primitive value payload of the given kind and length.
///
/// Sub-message kinds are not primitive values and are refused; the stream
/// reader handles their framing itself.
pub fn decode_value<S: Read>(
    kind: WireTypeKind,
    length: u32,
    src: &mut S,
) -> Result<PrimitiveValue> {
    if let Some(expected) = kind.fixed_width() {
        ensure!(
            expected == length,
            FixedLengthMismatchSnafu {
                expected,
                got: length
            }
        );
    }
    match kind {
        WireTypeKind::Indicator => Ok(PrimitiveValue::Indicator),
        WireTypeKind::Boolean => {
            let mut b = [0u8; 1];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Boolean(b[0] != 0))
        }
        WireTypeKind::Byte => {
            let mut b = [0u8; 1];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Byte(b[0] as i8))
        }
        WireTypeKind::Short => {
            let mut b = [0u8; 2];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Short(BigEndian::read_i16(&b)))
        }
        WireTypeKind::Int => {
            let mut b = [0u8; 4];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Int(BigEndian::read_i32(&b)))
        }
        WireTypeKind::Long => {
            let mut b = [0u8; 8];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Long(BigEndian::read_i64(&b)))
        }
        WireTypeKind::Float => {
            let mut b = [0u8; 4];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Float(BigEndian::read_f32(&b)))
        }
        WireTypeKind::Double => {
            let mut b = [0u8; 8];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Double(BigEndian::read_f64(&b)))
        }
        WireTypeKind::FixedByteArray(_) | WireTypeKind::ByteArray | WireTypeKind::Opaque => {
            let mut raw = vec![0u8; length as usize];
            read_exact(src, &mut raw)?;
            Ok(PrimitiveValue::ByteArray(C::from_vec(raw)))
        }
        WireTypeKind::String => {
            let mut raw = vec![0u8; length as usize];
            read_exact(src, &mut raw)?;
            Ok(PrimitiveValue::Str(
                String::from_utf8(raw).context(InvalidUtf8Snafu)?,
            ))
        }
        WireTypeKind::ShortArray => {
            let raw = read_array_payload(src, length, 2)?;
            Ok(PrimitiveValue::ShortArray(
                raw.chunks_exact(2).map(BigEndian::read_i16).collect(),
            ))
        }
        WireTypeKind::IntArray => {
            let raw = read_array_payload(src, length, 4)?;
            Ok(PrimitiveValue::IntArray(
                raw.chunks_exact(4).map(BigEndian::read_i32).collect(),
            ))
        }
        WireTypeKind::LongArray => {
            let raw = read_array_payload(src, length, 8)?;
            Ok(PrimitiveValue::LongArray(
                raw.chunks_exact(8).map(BigEndian::read_i64).collect(),
            ))
        }
        WireTypeKind::FloatArray => {
            let raw = read_array_payload(src, length, 4)?;
            Ok(PrimitiveValue::FloatArray(
                raw.chunks_exact(4).map(BigEndian::read_f32).collect(),
            ))
        }
        WireTypeKind::DoubleArray => {
            let raw = read_array_payload(src, length, 8)?;
            Ok(PrimitiveValue::DoubleArray(
                raw.chunks_exact(8).map(BigEndian::read_f64).collect(),
            ))
        }
        WireTypeKind::Date => {
            let mut b = [0u8; 4];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Date(unpack_date(&b)?))
        }
        WireTypeKind::Time => {
            let mut b = [0u8; 8];
            read_exact(src, &mut b)?;
            Ok(PrimitiveValue::Time(unpack_time(&b)?))
        }
        WireTypeKind::DateTime => {
            let mut b = [0u8; 12];
            read_exact(src, &mut b)?;
            let date = unpack_date(&b[..4])?;
            let time = unpack_time(&b[4..])?;
            Ok(PrimitiveValue::DateTime(FudgeDateTime::new(date, time)))
        }
        WireTypeKind::SubMessage => NonPrimitiveTypeSnafu.fail(),
    }
}

fn read_array_payload<S: Read>(src: &mut S, length: u32, element: u32) -> Result<Vec<u8>> {
    ensure!(
        length % element == 0,
        UnalignedArraySnafu { length, element }
    );
    let mut raw = vec![0u8; length as usize];
    read_exact(src, &mut raw)?;
    Ok(raw)
}

fn unpack_date(b: &[u8]) -> Result<FudgeDate> {
    let packed = BigEndian::read_i32(b);
    let year = packed >> 9;
    let month = ((packed >> 5) & 0x0F) as u8;
    let day = (packed & 0x1F) as u8;
    FudgeDate::new(year, month, day).context(InvalidDateTimeSnafu)
}

fn unpack_time(b: &[u8]) -> Result<FudgeTime> {
    let first = BigEndian::read_u32(&b[..4]);
    let nanos = BigEndian::read_u32(&b[4..8]);
    let raw_offset = (first >> 24) as u8 as i8;
    let offset = if raw_offset == NO_OFFSET {
        None
    } else {
        Some(raw_offset)
    };
    let seconds_of_day = first & 0x1FFFF;
    FudgeTime::new(seconds_of_day, nanos, offset).context(InvalidDateTimeSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::standard;

    #[test]
    fn envelope_decoding() {
        static DATA: &[u8] = &[0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10];
        let mut cursor = DATA;
        let (header, payload) = decode_envelope_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header, EnvelopeHeader::new(0, 1, 4));
        assert_eq!(payload, 8);
    }

    #[test]
    fn envelope_clean_end_of_stream() {
        let mut cursor: &[u8] = &[];
        assert!(decode_envelope_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn envelope_truncation_is_an_error() {
        let mut cursor: &[u8] = &[0x00, 0x00, 0x00];
        let err = decode_envelope_header(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::TruncatedEnvelope { got: 3, .. }));
    }

    #[test]
    fn envelope_length_below_header_size_is_an_error() {
        let mut cursor: &[u8] = &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07];
        let err = decode_envelope_header(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::BadEnvelopeLength { length: 7, .. }));
    }

    #[test]
    fn field_header_with_ordinal_and_implicit_width() {
        static DATA: &[u8] = &[0x40, 0x04, 0x00, 0x05];
        let mut cursor = DATA;
        let dict = TypeDictionary::standard();
        let decoded = decode_field_header(&mut cursor, &dict).unwrap();
        assert_eq!(decoded.header.type_id, standard::INT);
        assert_eq!(decoded.header.ordinal, Some(5));
        assert_eq!(decoded.header.name, None);
        assert_eq!(decoded.header.length, 4);
        assert_eq!(decoded.encoded_len, 4);
    }

    #[test]
    fn field_header_with_name_and_explicit_length() {
        static DATA: &[u8] = &[0x28, 0x10, 0x03, b'f', b'o', b'o', 0x02, b'h', b'i'];
        let mut cursor = DATA;
        let dict = TypeDictionary::standard();
        let decoded = decode_field_header(&mut cursor, &dict).unwrap();
        assert_eq!(decoded.header.name.as_deref(), Some("foo"));
        assert_eq!(decoded.header.length, 2);
        assert_eq!(decoded.encoded_len, 7);
        let value =
            decode_value(decoded.wire_type.unwrap().kind, decoded.header.length, &mut cursor)
                .unwrap();
        assert_eq!(value, PrimitiveValue::Str("hi".into()));
    }

    #[test]
    fn unknown_type_with_implicit_width_is_fatal() {
        static DATA: &[u8] = &[0x00, 0xC8];
        let mut cursor = DATA;
        let dict = TypeDictionary::standard();
        let err = decode_field_header(&mut cursor, &dict).unwrap_err();
        assert!(matches!(err, Error::UnknownTypeWidth { type_id: 200, .. }));
    }

    #[test]
    fn array_alignment_is_checked() {
        let mut cursor: &[u8] = &[0x00, 0x01, 0x02];
        let err = decode_value(WireTypeKind::ShortArray, 3, &mut cursor).unwrap_err();
        assert!(matches!(
            err,
            Error::UnalignedArray {
                length: 3,
                element: 2,
                ..
            }
        ));
    }
}
