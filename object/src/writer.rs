//! Wrapping message trees in envelopes and emitting them.

use fudge_core::field::FudgeMsgView;
use fudge_core::header::EnvelopeHeader;
use fudge_core::taxonomy::TaxonomyResolver;
use fudge_encoding::dictionary::TypeDictionary;
use fudge_parser::stream::write::{FudgeStreamWriter, Result};
use std::io::Write;
use std::sync::Arc;

/// A writer that hides stream management, taking whole message trees.
///
/// The writer owns its transport. [`close`](Self::close) flushes it
/// exactly once; closing again is a no-op.
#[derive(Debug)]
pub struct MessageWriter<W: Write> {
    stream: FudgeStreamWriter<W>,
    /// processing directives stamped on outgoing envelopes
    directives: u8,
    /// taxonomy identifier stamped on outgoing envelopes
    taxonomy_id: i16,
}

impl<W> MessageWriter<W>
where
    W: Write,
{
    /// Create a message writer with the standard dictionary and no
    /// taxonomy substitution.
    pub fn new(to: W) -> Self {
        Self::new_with(to, fudge_encoding::dictionary::standard_shared(), None, 0)
    }

    /// Create a message writer resolving wire types through `dict` and
    /// substituting names through the resolver's taxonomy `taxonomy_id`.
    pub fn new_with(
        to: W,
        dict: Arc<TypeDictionary>,
        resolver: Option<Arc<dyn TaxonomyResolver>>,
        taxonomy_id: i16,
    ) -> Self {
        MessageWriter {
            stream: FudgeStreamWriter::new_with(to, dict, resolver),
            directives: 0,
            taxonomy_id,
        }
    }

    /// Write one message wrapped in an envelope carrying the given schema
    /// version.
    pub fn write_message<M>(&mut self, msg: &M, schema_version: u8) -> Result<()>
    where
        M: FudgeMsgView,
    {
        self.stream.write_message(
            msg,
            EnvelopeHeader::new(self.directives, schema_version, self.taxonomy_id),
        )
    }

    /// Flush the underlying transport once; further calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        self.stream.close()
    }

    /// Recover the underlying sink.
    pub fn into_inner(self) -> W {
        self.stream.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::InMemFudgeMsg;

    #[test]
    fn several_messages_share_one_transport() {
        let mut writer = MessageWriter::new(Vec::new());
        let mut msg = InMemFudgeMsg::new();
        msg.add_long(Some("n"), None, 1).unwrap();
        writer.write_message(&msg, 1).unwrap();
        writer.write_message(&msg, 2).unwrap();
        writer.close().unwrap();
        let bytes = writer.into_inner();

        // two envelopes, versions 1 and 2, identical payloads
        assert_eq!(bytes.len() % 2, 0);
        let (first, second) = bytes.split_at(bytes.len() / 2);
        assert_eq!(first[1], 1);
        assert_eq!(second[1], 2);
        assert_eq!(&first[2..], &second[2..]);
    }
}
