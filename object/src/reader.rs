//! Reassembling stream elements into whole message trees.

use crate::mem::InMemFudgeMsg;
use crate::FudgeMsgEnvelope;
use fudge_core::field::{Field, Value};
use fudge_core::taxonomy::TaxonomyResolver;
use fudge_encoding::dictionary::TypeDictionary;
use fudge_parser::stream::read::{self, FudgeStreamReader};
use fudge_parser::stream::StreamElement;
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Read;
use std::sync::Arc;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while reassembling messages from a stream.
pub enum Error {
    /// The underlying element stream failed.
    #[snafu(context(false))]
    ReadStream {
        /// The stream reading failure.
        #[snafu(backtrace)]
        source: read::Error,
    },
    /// An element arrived that is impossible at this point of the stream.
    #[snafu(display("unexpected stream element: {element}"))]
    UnexpectedElement {
        /// A description of the offending element.
        element: String,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A decoded message cannot be represented: its field count is at the
    /// ceiling.
    #[snafu(display("decoded message exceeds the field-count ceiling"))]
    Capacity {
        /// The mutation failure.
        source: crate::mem::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

/// Message reading result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A frame of the reassembly stack: the header parts of the field that
/// opened a nested message, and the parent it will be appended to.
type PendingFrame = (Option<String>, Option<i16>, u8, InMemFudgeMsg);

/// A reader that hides stream-element management, handing out whole
/// messages.
///
/// Each call to [`next_message`](Self::next_message) consumes exactly one
/// envelope and its fields from the underlying stream; the transport is
/// not touched beyond the end of that envelope, so further messages can
/// arrive later.
#[derive(Debug)]
pub struct MessageReader<S> {
    stream: FudgeStreamReader<S>,
    dict: Arc<TypeDictionary>,
}

impl<S> MessageReader<S>
where
    S: Read,
{
    /// Create a message reader with the standard dictionary and no
    /// taxonomy resolution.
    pub fn new(source: S) -> Self {
        Self::new_with(source, fudge_encoding::dictionary::standard_shared(), None)
    }

    /// Create a message reader resolving wire types through `dict` and
    /// field names through the given taxonomy resolver.
    pub fn new_with(
        source: S,
        dict: Arc<TypeDictionary>,
        resolver: Option<Arc<dyn TaxonomyResolver>>,
    ) -> Self {
        MessageReader {
            stream: FudgeStreamReader::new_with(source, Arc::clone(&dict), resolver),
            dict,
        }
    }

    /// Read the next whole message, or `None` at a clean end of stream.
    pub fn next_message(&mut self) -> Result<Option<FudgeMsgEnvelope>> {
        let header = match self.stream.next() {
            None => return Ok(None),
            Some(element) => match element? {
                StreamElement::MessageEnvelope { header } => header,
                other => {
                    return UnexpectedElementSnafu {
                        element: other.to_string(),
                    }
                    .fail()
                }
            },
        };

        let mut current = self.empty_message();
        let mut pending: Vec<PendingFrame> = Vec::new();

        // the message is complete once its outer frame is consumed and
        // every nested bracket has closed; checking up front keeps the
        // reader from blocking on the envelope of a message yet to come
        while !(pending.is_empty() && self.stream.remaining_in_message() == Some(0)) {
            let Some(element) = self.stream.next() else {
                // the pull parser reports truncation itself before its
                // frames run dry
                break;
            };
            match element? {
                StreamElement::SimpleField {
                    name,
                    ordinal,
                    type_id,
                    value,
                } => {
                    current
                        .add_field(Field::new(name, ordinal, type_id, Value::Primitive(value)))
                        .context(CapacitySnafu)?;
                }
                StreamElement::SubmessageFieldStart {
                    name,
                    ordinal,
                    type_id,
                } => {
                    let parent = std::mem::replace(&mut current, self.empty_message());
                    pending.push((name, ordinal, type_id, parent));
                }
                StreamElement::SubmessageFieldEnd => {
                    let Some((name, ordinal, type_id, parent)) = pending.pop() else {
                        return UnexpectedElementSnafu {
                            element: StreamElement::SubmessageFieldEnd.to_string(),
                        }
                        .fail();
                    };
                    let inner = std::mem::replace(&mut current, parent);
                    current
                        .add_field(Field::new(name, ordinal, type_id, Value::Message(inner)))
                        .context(CapacitySnafu)?;
                }
                other @ StreamElement::MessageEnvelope { .. } => {
                    return UnexpectedElementSnafu {
                        element: other.to_string(),
                    }
                    .fail()
                }
            }
        }

        Ok(Some(FudgeMsgEnvelope {
            header,
            message: current,
        }))
    }

    fn empty_message(&self) -> InMemFudgeMsg {
        InMemFudgeMsg::new_with_dictionary(Arc::clone(&self.dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fudge_core::field::FudgeMsgView;
    use fudge_core::header::EnvelopeHeader;
    use fudge_core::value::PrimitiveValue;

    #[test]
    fn consecutive_messages_come_out_one_at_a_time() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0E,
            0x40, 0x03, 0x00, 0x01, 0x00, 0x2A, // short 42, ordinal 1
            0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08,
        ];

        let mut reader = MessageReader::new(DATA);

        let first = reader.next_message().unwrap().unwrap();
        assert_eq!(first.header, EnvelopeHeader::new(0, 1, 0));
        assert_eq!(
            first.message.get(0).unwrap().value().primitive(),
            Some(&PrimitiveValue::Short(42))
        );

        let second = reader.next_message().unwrap().unwrap();
        assert_eq!(second.header, EnvelopeHeader::new(0, 2, 0));
        assert!(second.message.is_empty());

        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn nested_messages_are_reassembled() {
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x15, // total 21
            0x28, 0x15, 0x03, b'i', b'n', b'n', 0x06, // sub-message "inn", 6 bytes
            0x08, 0x15, 0x03, // anonymous nested sub-message, 3 bytes
            0x00, 0x01, 0x01, // boolean true
        ];

        let mut reader = MessageReader::new(DATA);
        let envelope = reader.next_message().unwrap().unwrap();
        let outer = envelope.message;
        let inner = outer
            .first_by_name("inn")
            .and_then(|f| f.value().message())
            .expect("nested message");
        let innermost = inner
            .get(0)
            .and_then(|f| f.value().message())
            .expect("doubly nested message");
        assert_eq!(
            innermost.get(0).unwrap().value().primitive(),
            Some(&PrimitiveValue::Boolean(true))
        );
    }
}
