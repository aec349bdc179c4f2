#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! A middle-level streaming reader and writer of Fudge messages.
//!
//! The heart of this crate is the interpretation of an encoded message as a
//! stream of elements: the envelope, simple fields, and the brackets of
//! nested messages. [`stream::read::FudgeStreamReader`] pulls elements out
//! of any byte source; [`stream::write::FudgeStreamWriter`] turns fields
//! and whole message trees back into bytes. The `stateful` layer underneath
//! tracks byte positions so that every error can say where in the stream it
//! happened.

pub mod stateful;
pub mod stream;

pub use stream::read::FudgeStreamReader;
pub use stream::write::FudgeStreamWriter;
pub use stream::StreamElement;
