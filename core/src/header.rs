//! Message envelope and field header types.
//!
//! These are plain data carriers shared by the binary codecs and the stream
//! machines: the envelope header that frames a whole message on the wire,
//! and the decoded form of a single field's header.

use std::fmt;

/// The size in bytes of an encoded message envelope header.
pub const ENVELOPE_HEADER_LEN: u32 = 8;

/// The ceiling on the number of fields a single message may carry.
pub const MAX_FIELD_COUNT: usize = 0x7FFF;

/// The metadata carried by a message envelope.
///
/// The envelope appears only at the root of a byte stream; sub-messages are
/// framed as regular fields. The total length is not retained here, as it is
/// a property of the encoded form and is recomputed on write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Processing directive flags. No directives are currently assigned.
    pub processing_directives: u8,
    /// The schema version of the message payload, as assigned by the sender.
    pub schema_version: u8,
    /// The identifier of the taxonomy used to encode the payload,
    /// or 0 when no taxonomy applies.
    pub taxonomy_id: i16,
}

impl EnvelopeHeader {
    /// Create an envelope header from its parts.
    pub fn new(processing_directives: u8, schema_version: u8, taxonomy_id: i16) -> Self {
        EnvelopeHeader {
            processing_directives,
            schema_version,
            taxonomy_id,
        }
    }

    /// Whether the envelope names a taxonomy.
    #[inline]
    pub fn has_taxonomy(&self) -> bool {
        self.taxonomy_id != 0
    }
}

impl fmt::Display for EnvelopeHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "envelope(directives={}, version={}, taxonomy={})",
            self.processing_directives, self.schema_version, self.taxonomy_id
        )
    }
}

/// The decoded header of a single field.
///
/// `length` is the resolved payload length in bytes: for variable-width
/// types it is the value of the wire length field, for fixed-width types
/// the width implied by the type identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    /// The wire type identifier.
    pub type_id: u8,
    /// The field ordinal, when transmitted.
    pub ordinal: Option<i16>,
    /// The field name, when transmitted.
    pub name: Option<String>,
    /// The resolved payload length in bytes.
    pub length: u32,
}

impl FieldHeader {
    /// Whether this field was transmitted with neither name nor ordinal.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none() && self.ordinal.is_none()
    }
}
