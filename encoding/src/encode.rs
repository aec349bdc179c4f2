//! Encoding primitives: envelope headers, field headers and primitive
//! values onto a byte sink.

use crate::decode::NO_OFFSET;
use crate::dictionary::WireTypeKind;
use crate::prefix::{var_width_for, FieldPrefix};
use byteordered::byteorder::{BigEndian, ByteOrder};
use fudge_core::header::{EnvelopeHeader, ENVELOPE_HEADER_LEN};
use fudge_core::time::{FudgeDate, FudgeTime};
use fudge_core::value::{PrimitiveValue, ValueType};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error produced while encoding wire content.
pub enum Error {
    /// Could not write bytes to the sink.
    #[snafu(display("could not write to sink"))]
    WriteBytes {
        /// The underlying transport failure.
        source: std::io::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A field name exceeds the 255 bytes its length field can carry.
    #[snafu(display("field name of {length} UTF-8 bytes exceeds 255"))]
    NameTooLong {
        /// The encoded name length.
        length: usize,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A payload exceeds the widest length field.
    #[snafu(display("payload does not fit a length field"))]
    PayloadTooLong {
        /// The width selection failure.
        source: crate::prefix::VarWidthError,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A value was paired with a wire type kind that cannot carry it.
    #[snafu(display("value of kind {value:?} cannot be encoded as {kind:?}"))]
    ValueKindMismatch {
        /// The payload shape requested.
        kind: WireTypeKind,
        /// The kind of value supplied.
        value: ValueType,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Encode result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

fn write_all<W: Write>(to: &mut W, bytes: &[u8]) -> Result<()> {
    to.write_all(bytes).context(WriteBytesSnafu)
}

/// Encode a message envelope header. `payload_len` counts the fields only;
/// the eight header bytes are added here.
pub fn encode_envelope_header<W: Write>(
    to: &mut W,
    header: EnvelopeHeader,
    payload_len: u32,
) -> Result<()> {
    let mut buf = [0u8; ENVELOPE_HEADER_LEN as usize];
    buf[0] = header.processing_directives;
    buf[1] = header.schema_version;
    BigEndian::write_i16(&mut buf[2..4], header.taxonomy_id);
    BigEndian::write_u32(&mut buf[4..8], payload_len + ENVELOPE_HEADER_LEN);
    write_all(to, &buf)
}

/// Encode one field header. `payload` is `None` for a type whose width is
/// implicit, and the payload length for everything else. Returns the
/// number of bytes written.
pub fn encode_field_header<W: Write>(
    to: &mut W,
    type_id: u8,
    ordinal: Option<i16>,
    name: Option<&str>,
    payload: Option<u32>,
) -> Result<u32> {
    let var_width = match payload {
        None => 0,
        Some(len) => var_width_for(u64::from(len)).context(PayloadTooLongSnafu)?,
    };
    let prefix = FieldPrefix {
        fixed_width: false,
        has_ordinal: ordinal.is_some(),
        has_name: name.is_some(),
        var_width,
    };
    let mut written = 2u32;
    write_all(to, &[prefix.to_byte(), type_id])?;
    if let Some(ordinal) = ordinal {
        let mut b = [0u8; 2];
        BigEndian::write_i16(&mut b, ordinal);
        write_all(to, &b)?;
        written += 2;
    }
    if let Some(name) = name {
        let raw = name.as_bytes();
        ensure!(raw.len() <= usize::from(u8::MAX), NameTooLongSnafu { length: raw.len() });
        write_all(to, &[raw.len() as u8])?;
        write_all(to, raw)?;
        written += 1 + raw.len() as u32;
    }
    if let Some(len) = payload {
        let mut b = [0u8; 4];
        match var_width {
            1 => {
                b[0] = len as u8;
                write_all(to, &b[..1])?;
            }
            2 => {
                BigEndian::write_u16(&mut b[..2], len as u16);
                write_all(to, &b[..2])?;
            }
            _ => {
                BigEndian::write_u32(&mut b, len);
                write_all(to, &b)?;
            }
        }
        written += u32::from(var_width);
    }
    Ok(written)
}

/// The number of bytes [`encode_field_header`] would write.
pub fn encoded_field_header_len(
    ordinal: Option<i16>,
    name: Option<&str>,
    payload: Option<u32>,
) -> Result<u32> {
    let mut len = 2u32;
    if ordinal.is_some() {
        len += 2;
    }
    if let Some(name) = name {
        let raw = name.len();
        ensure!(raw <= usize::from(u8::MAX), NameTooLongSnafu { length: raw });
        len += 1 + raw as u32;
    }
    if let Some(payload) = payload {
        len += u32::from(var_width_for(u64::from(payload)).context(PayloadTooLongSnafu)?);
    }
    Ok(len)
}

/// Encode a primitive value payload under the given kind.
pub fn encode_value<W: Write>(
    to: &mut W,
    kind: WireTypeKind,
    value: &PrimitiveValue,
) -> Result<()> {
    let mismatch = || {
        ValueKindMismatchSnafu {
            kind,
            value: value.value_type(),
        }
        .build()
    };
    match (kind, value) {
        (WireTypeKind::Indicator, PrimitiveValue::Indicator) => Ok(()),
        (WireTypeKind::Boolean, PrimitiveValue::Boolean(v)) => {
            write_all(to, &[u8::from(*v)])
        }
        (WireTypeKind::Byte, PrimitiveValue::Byte(v)) => write_all(to, &[*v as u8]),
        (WireTypeKind::Short, PrimitiveValue::Short(v)) => {
            let mut b = [0u8; 2];
            BigEndian::write_i16(&mut b, *v);
            write_all(to, &b)
        }
        (WireTypeKind::Int, PrimitiveValue::Int(v)) => {
            let mut b = [0u8; 4];
            BigEndian::write_i32(&mut b, *v);
            write_all(to, &b)
        }
        (WireTypeKind::Long, PrimitiveValue::Long(v)) => {
            let mut b = [0u8; 8];
            BigEndian::write_i64(&mut b, *v);
            write_all(to, &b)
        }
        (WireTypeKind::Float, PrimitiveValue::Float(v)) => {
            let mut b = [0u8; 4];
            BigEndian::write_f32(&mut b, *v);
            write_all(to, &b)
        }
        (WireTypeKind::Double, PrimitiveValue::Double(v)) => {
            let mut b = [0u8; 8];
            BigEndian::write_f64(&mut b, *v);
            write_all(to, &b)
        }
        (
            WireTypeKind::FixedByteArray(_) | WireTypeKind::ByteArray | WireTypeKind::Opaque,
            PrimitiveValue::ByteArray(bytes),
        ) => write_all(to, bytes),
        (WireTypeKind::String, PrimitiveValue::Str(s)) => write_all(to, s.as_bytes()),
        (WireTypeKind::ShortArray, PrimitiveValue::ShortArray(items)) => {
            let mut b = [0u8; 2];
            for v in items {
                BigEndian::write_i16(&mut b, *v);
                write_all(to, &b)?;
            }
            Ok(())
        }
        (WireTypeKind::IntArray, PrimitiveValue::IntArray(items)) => {
            let mut b = [0u8; 4];
            for v in items {
                BigEndian::write_i32(&mut b, *v);
                write_all(to, &b)?;
            }
            Ok(())
        }
        (WireTypeKind::LongArray, PrimitiveValue::LongArray(items)) => {
            let mut b = [0u8; 8];
            for v in items {
                BigEndian::write_i64(&mut b, *v);
                write_all(to, &b)?;
            }
            Ok(())
        }
        (WireTypeKind::FloatArray, PrimitiveValue::FloatArray(items)) => {
            let mut b = [0u8; 4];
            for v in items {
                BigEndian::write_f32(&mut b, *v);
                write_all(to, &b)?;
            }
            Ok(())
        }
        (WireTypeKind::DoubleArray, PrimitiveValue::DoubleArray(items)) => {
            let mut b = [0u8; 8];
            for v in items {
                BigEndian::write_f64(&mut b, *v);
                write_all(to, &b)?;
            }
            Ok(())
        }
        (WireTypeKind::Date, PrimitiveValue::Date(date)) => {
            let mut b = [0u8; 4];
            pack_date(&mut b, *date);
            write_all(to, &b)
        }
        (WireTypeKind::Time, PrimitiveValue::Time(time)) => {
            let mut b = [0u8; 8];
            pack_time(&mut b, *time);
            write_all(to, &b)
        }
        (WireTypeKind::DateTime, PrimitiveValue::DateTime(dt)) => {
            let mut b = [0u8; 12];
            pack_date(&mut b[..4], dt.date);
            pack_time(&mut b[4..], dt.time);
            write_all(to, &b)
        }
        _ => Err(mismatch()),
    }
}

/// The number of payload bytes [`encode_value`] produces for this value.
pub fn encoded_value_len(value: &PrimitiveValue) -> u32 {
    match value {
        PrimitiveValue::Indicator => 0,
        PrimitiveValue::Boolean(_) | PrimitiveValue::Byte(_) => 1,
        PrimitiveValue::Short(_) => 2,
        PrimitiveValue::Int(_) | PrimitiveValue::Float(_) => 4,
        PrimitiveValue::Long(_) | PrimitiveValue::Double(_) => 8,
        PrimitiveValue::ByteArray(bytes) => bytes.len() as u32,
        PrimitiveValue::Str(s) => s.len() as u32,
        PrimitiveValue::ShortArray(items) => items.len() as u32 * 2,
        PrimitiveValue::IntArray(items) => items.len() as u32 * 4,
        PrimitiveValue::LongArray(items) => items.len() as u32 * 8,
        PrimitiveValue::FloatArray(items) => items.len() as u32 * 4,
        PrimitiveValue::DoubleArray(items) => items.len() as u32 * 8,
        PrimitiveValue::Date(_) => 4,
        PrimitiveValue::Time(_) => 8,
        PrimitiveValue::DateTime(_) => 12,
    }
}

fn pack_date(b: &mut [u8], date: FudgeDate) {
    let packed =
        (date.year() << 9) | (i32::from(date.month()) << 5) | i32::from(date.day());
    BigEndian::write_i32(b, packed);
}

fn pack_time(b: &mut [u8], time: FudgeTime) {
    let offset = time.offset().unwrap_or(NO_OFFSET);
    let first = (u32::from(offset as u8) << 24) | time.seconds_of_day();
    BigEndian::write_u32(&mut b[..4], first);
    BigEndian::write_u32(&mut b[4..8], time.nanos());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_field_header, decode_value};
    use crate::dictionary::{standard, TypeDictionary};
    use fudge_core::time::FudgeDateTime;

    #[test]
    fn named_indicator_field_header_is_three_plus_name_bytes() {
        let mut out = Vec::new();
        let written =
            encode_field_header(&mut out, standard::INDICATOR, None, Some("flag"), None).unwrap();
        assert_eq!(written, 7);
        assert_eq!(out, &[0x20, 0x00, 0x04, b'f', b'l', b'a', b'g']);
    }

    #[test]
    fn ordinal_int_field_header_matches_wire_form() {
        let mut out = Vec::new();
        encode_field_header(&mut out, standard::INT, Some(5), None, None).unwrap();
        assert_eq!(out, &[0x40, 0x04, 0x00, 0x05]);
    }

    #[test]
    fn header_round_trip_with_explicit_length() {
        let mut out = Vec::new();
        let written =
            encode_field_header(&mut out, standard::STRING, Some(-2), Some("sym"), Some(300))
                .unwrap();
        assert_eq!(written, encoded_field_header_len(Some(-2), Some("sym"), Some(300)).unwrap());
        let dict = TypeDictionary::standard();
        let mut cursor = &out[..];
        let decoded = decode_field_header(&mut cursor, &dict).unwrap();
        assert_eq!(decoded.header.ordinal, Some(-2));
        assert_eq!(decoded.header.name.as_deref(), Some("sym"));
        assert_eq!(decoded.header.length, 300);
        assert_eq!(decoded.encoded_len, written);
    }

    #[test]
    fn long_names_are_refused() {
        let name = "n".repeat(256);
        let mut out = Vec::new();
        let err =
            encode_field_header(&mut out, standard::STRING, None, Some(&name), Some(0)).unwrap_err();
        assert!(matches!(err, Error::NameTooLong { length: 256, .. }));
    }

    #[test]
    fn value_kind_mismatch_is_refused() {
        let mut out = Vec::new();
        let err = encode_value(&mut out, WireTypeKind::Int, &PrimitiveValue::Str("x".into()))
            .unwrap_err();
        assert!(matches!(err, Error::ValueKindMismatch { .. }));
    }

    #[test]
    fn datetime_payload_round_trip() {
        let date = FudgeDate::new(-44, 3, 15).unwrap();
        let time = FudgeTime::new(12 * 3600 + 34 * 60 + 56, 789, Some(8)).unwrap();
        let value = PrimitiveValue::DateTime(FudgeDateTime::new(date, time));
        let mut out = Vec::new();
        encode_value(&mut out, WireTypeKind::DateTime, &value).unwrap();
        assert_eq!(out.len(), 12);
        let mut cursor = &out[..];
        let back = decode_value(WireTypeKind::DateTime, 12, &mut cursor).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn offset_free_time_round_trip() {
        let value = PrimitiveValue::Time(FudgeTime::new(1, 0, None).unwrap());
        let mut out = Vec::new();
        encode_value(&mut out, WireTypeKind::Time, &value).unwrap();
        let mut cursor = &out[..];
        assert_eq!(decode_value(WireTypeKind::Time, 8, &mut cursor).unwrap(), value);
    }
}
