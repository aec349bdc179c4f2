//! A stateful encoding abstraction tracking the number of bytes written.

use fudge_core::header::EnvelopeHeader;
use fudge_core::value::PrimitiveValue;
use fudge_encoding::dictionary::WireTypeKind;
use fudge_encoding::encode;
use snafu::Snafu;
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while encoding stream content at a known position.
pub enum Error {
    /// Could not encode an envelope header.
    #[snafu(display("could not encode envelope header at position {position}"))]
    EncodeEnvelope {
        /// The byte offset of the envelope header.
        position: u64,
        /// The encoding failure.
        #[snafu(backtrace)]
        source: encode::Error,
    },
    /// Could not encode a field header.
    #[snafu(display("could not encode field header at position {position}"))]
    EncodeFieldHeader {
        /// The byte offset of the field header.
        position: u64,
        /// The encoding failure.
        #[snafu(backtrace)]
        source: encode::Error,
    },
    /// Could not encode a field value.
    #[snafu(display("could not encode field value at position {position}"))]
    EncodeValue {
        /// The byte offset of the value payload.
        position: u64,
        /// The encoding failure.
        #[snafu(backtrace)]
        source: encode::Error,
    },
    /// Could not flush the underlying sink.
    #[snafu(display("could not flush sink at position {position}"))]
    Flush {
        /// The number of bytes written before the flush.
        position: u64,
        /// The underlying transport failure.
        source: std::io::Error,
    },
}

/// Stateful encode result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A stateful abstraction over the Fudge content writing process.
#[derive(Debug)]
pub struct StatefulEncoder<W> {
    to: W,
    position: u64,
}

impl<W> StatefulEncoder<W>
where
    W: Write,
{
    /// Create an encoder over the given sink.
    pub fn new(to: W) -> Self {
        StatefulEncoder { to, position: 0 }
    }

    /// The number of bytes written so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Encode an envelope header framing `payload_len` bytes of fields.
    pub fn encode_envelope_header(
        &mut self,
        header: EnvelopeHeader,
        payload_len: u32,
    ) -> Result<()> {
        let position = self.position;
        encode::encode_envelope_header(&mut self.to, header, payload_len)
            .map_err(|source| Error::EncodeEnvelope { position, source })?;
        self.position += u64::from(fudge_core::header::ENVELOPE_HEADER_LEN);
        Ok(())
    }

    /// Encode a field header. `payload` is `None` for implicit-width types.
    pub fn encode_field_header(
        &mut self,
        type_id: u8,
        ordinal: Option<i16>,
        name: Option<&str>,
        payload: Option<u32>,
    ) -> Result<u32> {
        let position = self.position;
        let written = encode::encode_field_header(&mut self.to, type_id, ordinal, name, payload)
            .map_err(|source| Error::EncodeFieldHeader { position, source })?;
        self.position += u64::from(written);
        Ok(written)
    }

    /// Encode a primitive value payload.
    pub fn encode_value(&mut self, kind: WireTypeKind, value: &PrimitiveValue) -> Result<()> {
        let position = self.position;
        encode::encode_value(&mut self.to, kind, value)
            .map_err(|source| Error::EncodeValue { position, source })?;
        self.position += u64::from(encode::encoded_value_len(value));
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        let position = self.position;
        self.to.flush().map_err(|source| Error::Flush { position, source })
    }

    /// Recover the underlying sink.
    pub fn into_inner(self) -> W {
        self.to
    }
}
