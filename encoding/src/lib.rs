#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! Fudge encoding and decoding primitives.
//!
//! This crate knows the shape of bytes on the wire: the wire-type
//! dictionary with its narrowing rules, the field prefix byte, and the
//! big-endian codecs for envelope headers, field headers and primitive
//! values. It is deliberately stateless; position tracking and stream
//! structure live one level up, in `fudge-parser`.

pub mod decode;
pub mod dictionary;
pub mod encode;
pub mod prefix;

pub use decode::{decode_envelope_header, decode_field_header, decode_value, DecodedFieldHeader};
pub use dictionary::{standard, standard_shared, TypeDictionary, WireType, WireTypeKind};
pub use encode::{
    encode_envelope_header, encode_field_header, encode_value, encoded_field_header_len,
    encoded_value_len,
};
pub use prefix::FieldPrefix;
