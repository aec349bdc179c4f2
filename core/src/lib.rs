#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! This is the core Fudge library, containing the concepts, data structures
//! and traits specific to Fudge message content: typed fields, primitive
//! values, the message envelope, and the taxonomy abstraction.
//!
//! A Fudge message is an ordered sequence of fields. Each field carries a
//! wire type identifier, a value, and optionally a name, an ordinal, or
//! both. Messages nest: a field's value may itself be a message.

pub mod field;
pub mod header;
pub mod taxonomy;
pub mod time;
pub mod value;

pub use field::{Field, FudgeMsgView, Value};
pub use header::{EnvelopeHeader, FieldHeader, ENVELOPE_HEADER_LEN, MAX_FIELD_COUNT};
pub use taxonomy::{MapTaxonomy, MapTaxonomyResolver, Taxonomy, TaxonomyResolver};
pub use time::{FudgeDate, FudgeDateTime, FudgeTime};
pub use value::{CastValueError, PrimitiveValue, ValueType, C};
