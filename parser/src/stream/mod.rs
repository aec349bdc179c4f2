//! Interpretation of Fudge content as a stream of elements.
//!
//! An encoded message unfolds into a flat sequence: the envelope, then one
//! element per field, with the fields of a nested message bracketed by a
//! start and an end element. The same sequence is produced by the binary
//! reader here and by the JSON surface, so consumers can be written against
//! the elements alone.

use fudge_core::header::EnvelopeHeader;
use fudge_core::value::PrimitiveValue;
use std::fmt;

pub mod read;
pub mod write;

pub use self::read::FudgeStreamReader;
pub use self::write::FudgeStreamWriter;

/// One element of a Fudge content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamElement {
    /// The envelope opening a top-level message.
    MessageEnvelope {
        /// The envelope metadata.
        header: EnvelopeHeader,
    },
    /// A field carrying a primitive value.
    SimpleField {
        /// The field name, when transmitted or recovered from a taxonomy.
        name: Option<String>,
        /// The field ordinal, when transmitted.
        ordinal: Option<i16>,
        /// The wire type identifier.
        type_id: u8,
        /// The materialized value.
        value: PrimitiveValue,
    },
    /// The opening bracket of a field whose value is a nested message.
    SubmessageFieldStart {
        /// The field name, when transmitted or recovered from a taxonomy.
        name: Option<String>,
        /// The field ordinal, when transmitted.
        ordinal: Option<i16>,
        /// The wire type identifier.
        type_id: u8,
    },
    /// The closing bracket of a nested message field.
    SubmessageFieldEnd,
}

impl StreamElement {
    /// Whether this element opens a nested message.
    pub fn is_submessage_start(&self) -> bool {
        matches!(self, StreamElement::SubmessageFieldStart { .. })
    }

    /// Whether this element closes a nested message.
    pub fn is_submessage_end(&self) -> bool {
        matches!(self, StreamElement::SubmessageFieldEnd)
    }
}

impl fmt::Display for StreamElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamElement::SimpleField { value, .. } => {
                write!(f, "SimpleField({:?})", value.value_type())
            }
            other => write!(f, "{other:?}"),
        }
    }
}
