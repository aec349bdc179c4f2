#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! A high-level API for building, reading and manipulating Fudge messages
//! as in-memory trees.
//!
//! The usual entry point is a [`FudgeContext`]: a process-wide bundle of
//! the wire-type dictionary, the taxonomy resolver and the default
//! settings. The context hands out [`InMemFudgeMsg`] containers and moves
//! whole messages to and from bytes:
//!
//! ```
//! use fudge_object::FudgeContext;
//!
//! let ctx = FudgeContext::default();
//! let mut msg = ctx.new_message();
//! msg.add_string(Some("symbol"), None, "XAU")?;
//! msg.add_long(Some("quantity"), None, 150)?;
//!
//! let bytes = ctx.to_bytes(&msg)?;
//! let decoded = ctx.from_bytes(&bytes)?;
//! assert_eq!(decoded.message, msg);
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```

pub mod mapping;
pub mod mem;
pub mod reader;
pub mod writer;

use fudge_core::header::EnvelopeHeader;
use fudge_core::taxonomy::TaxonomyResolver;
use fudge_encoding::dictionary::{standard_shared, TypeDictionary};
use snafu::{OptionExt, ResultExt, Snafu};
use std::io::{Read, Write};
use std::sync::Arc;

pub use mem::{InMemField, InMemFudgeMsg};
pub use reader::MessageReader;
pub use writer::MessageWriter;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised by the context-level conveniences.
pub enum Error {
    /// A message could not be written.
    #[snafu(display("could not write message"))]
    WriteMessage {
        /// The stream writing failure.
        #[snafu(backtrace)]
        source: fudge_parser::stream::write::Error,
    },
    /// A message could not be read.
    #[snafu(display("could not read message"))]
    ReadMessage {
        /// The stream reading failure.
        #[snafu(backtrace)]
        source: reader::Error,
    },
    /// The byte stream held no message at all.
    #[snafu(display("no message in stream"))]
    NoMessage,
}

/// Context-level result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A whole decoded message along with the envelope that framed it.
#[derive(Debug, Clone, PartialEq)]
pub struct FudgeMsgEnvelope {
    /// The envelope metadata.
    pub header: EnvelopeHeader,
    /// The reassembled message tree.
    pub message: InMemFudgeMsg,
}

/// The process-level configuration of a Fudge system: the wire-type
/// dictionary, the taxonomy resolver and the default envelope settings.
///
/// A context is cheap to clone and safe to share; construct it once, then
/// treat it as immutable.
#[derive(Debug, Clone)]
pub struct FudgeContext {
    dict: Arc<TypeDictionary>,
    resolver: Option<Arc<dyn TaxonomyResolver>>,
    taxonomy_id: i16,
    schema_version: u8,
}

impl Default for FudgeContext {
    fn default() -> Self {
        FudgeContext {
            dict: standard_shared(),
            resolver: None,
            taxonomy_id: 0,
            schema_version: 0,
        }
    }
}

impl FudgeContext {
    /// Create a context with the standard dictionary and no taxonomies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the wire-type dictionary.
    pub fn with_dictionary(mut self, dict: Arc<TypeDictionary>) -> Self {
        self.dict = dict;
        self
    }

    /// Attach a taxonomy resolver and the taxonomy identifier to stamp on
    /// outgoing envelopes.
    pub fn with_taxonomy(
        mut self,
        resolver: Arc<dyn TaxonomyResolver>,
        taxonomy_id: i16,
    ) -> Self {
        self.resolver = Some(resolver);
        self.taxonomy_id = taxonomy_id;
        self
    }

    /// Set the schema version stamped on outgoing envelopes.
    pub fn with_schema_version(mut self, schema_version: u8) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// The wire-type dictionary of this context.
    pub fn dictionary(&self) -> &Arc<TypeDictionary> {
        &self.dict
    }

    /// The taxonomy resolver of this context, if any.
    pub fn taxonomy_resolver(&self) -> Option<&Arc<dyn TaxonomyResolver>> {
        self.resolver.as_ref()
    }

    /// Create an empty mutable message bound to this context's dictionary.
    pub fn new_message(&self) -> InMemFudgeMsg {
        InMemFudgeMsg::new_with_dictionary(Arc::clone(&self.dict))
    }

    /// Create a message reader over the given byte source.
    pub fn reader<S: Read>(&self, source: S) -> MessageReader<S> {
        MessageReader::new_with(source, Arc::clone(&self.dict), self.resolver.clone())
    }

    /// Create a message writer over the given byte sink.
    pub fn writer<W: Write>(&self, to: W) -> MessageWriter<W> {
        MessageWriter::new_with(
            to,
            Arc::clone(&self.dict),
            self.resolver.clone(),
            self.taxonomy_id,
        )
    }

    /// Encode a whole message into a fresh byte vector.
    pub fn to_bytes<M>(&self, msg: &M) -> Result<Vec<u8>>
    where
        M: fudge_core::field::FudgeMsgView,
    {
        let mut writer = self.writer(Vec::new());
        writer
            .write_message(msg, self.schema_version)
            .context(WriteMessageSnafu)?;
        writer.close().context(WriteMessageSnafu)?;
        Ok(writer.into_inner())
    }

    /// Decode the first message of a byte slice.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<FudgeMsgEnvelope> {
        self.reader(bytes)
            .next_message()
            .context(ReadMessageSnafu)?
            .context(NoMessageSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fudge_core::field::FudgeMsgView;
    use fudge_core::taxonomy::{MapTaxonomy, MapTaxonomyResolver};
    use fudge_core::value::PrimitiveValue;

    #[test]
    fn whole_message_round_trip() {
        let ctx = FudgeContext::default();
        let mut inner = ctx.new_message();
        inner.add_boolean(Some("alive"), None, true).unwrap();

        let mut msg = ctx.new_message();
        msg.add_string(Some("symbol"), None, "XAU").unwrap();
        msg.add_long(None, Some(2), 42).unwrap();
        msg.add_indicator(Some("absent"), None).unwrap();
        msg.add_message(Some("detail"), None, inner).unwrap();

        let bytes = ctx.to_bytes(&msg).unwrap();
        let decoded = ctx.from_bytes(&bytes).unwrap();
        assert_eq!(decoded.header, EnvelopeHeader::new(0, 0, 0));
        assert_eq!(decoded.message, msg);
    }

    #[test]
    fn duplicate_names_round_trip_in_order(){
        let ctx = FudgeContext::default();
        let mut msg = ctx.new_message();
        msg.add_long(Some("x"), None, 1).unwrap();
        msg.add_long(Some("x"), None, 2).unwrap();
        msg.add_long(Some("x"), None, 3).unwrap();

        let decoded = ctx.from_bytes(&ctx.to_bytes(&msg).unwrap()).unwrap().message;
        let values: Vec<i64> = decoded
            .fields_by_name("x")
            .map(|f| f.value().primitive().unwrap().to_i64().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn taxonomy_substitution_round_trips_with_and_without_resolver() {
        let taxonomy = Arc::new(MapTaxonomy::from_pairs([(7, "price")]).unwrap());
        let mut resolver = MapTaxonomyResolver::new();
        resolver.insert(4, taxonomy);
        let resolver = Arc::new(resolver);

        let ctx = FudgeContext::default().with_taxonomy(resolver.clone(), 4);
        let mut msg = ctx.new_message();
        msg.add_double(Some("price"), None, 101.25).unwrap();

        let bytes = ctx.to_bytes(&msg).unwrap();

        // decoding without the taxonomy yields the ordinal alone
        let plain = FudgeContext::default().from_bytes(&bytes).unwrap().message;
        let field = plain.get(0).unwrap();
        assert_eq!(field.name(), None);
        assert_eq!(field.ordinal(), Some(7));

        // decoding with it recovers the name as well
        let resolved = ctx.from_bytes(&bytes).unwrap().message;
        let field = resolved.get(0).unwrap();
        assert_eq!(field.name(), Some("price"));
        assert_eq!(field.ordinal(), Some(7));
        assert_eq!(
            field.value().primitive(),
            Some(&PrimitiveValue::Double(101.25))
        );
    }

    #[test]
    fn unknown_type_payloads_survive_a_round_trip() {
        // a stream carrying type 200 with an advertised 3-byte payload
        #[rustfmt::skip]
        static DATA: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0E,
            0x08, 0xC8, 0x03, 0xAA, 0xBB, 0xCC,
        ];
        let ctx = FudgeContext::default();
        let decoded = ctx.from_bytes(DATA).unwrap().message;
        let field = decoded.get(0).unwrap();
        assert_eq!(field.type_id(), 200);

        let bytes = ctx.to_bytes(&decoded).unwrap();
        assert_eq!(bytes, DATA);
    }

    #[test]
    fn empty_stream_has_no_message() {
        let ctx = FudgeContext::default();
        assert!(matches!(ctx.from_bytes(&[]), Err(Error::NoMessage { .. })));
    }

    #[test]
    fn empty_message_encodes_to_the_bare_envelope() {
        let ctx = FudgeContext::default();
        let msg = ctx.new_message();
        let bytes = ctx.to_bytes(&msg).unwrap();
        assert_eq!(bytes, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08]);
        let decoded = ctx.from_bytes(&bytes).unwrap().message;
        assert!(decoded.is_empty());
    }
}
