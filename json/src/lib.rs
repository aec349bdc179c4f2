#![deny(trivial_casts, trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! Fudge message serialization to and from JSON.
//!
//! The JSON rendering is a faithful second surface of the binary shape: a
//! message becomes a JSON object with one entry per field, sub-messages
//! nest as objects, and the reader produces exactly the same
//! [`StreamElement`](fudge_parser::StreamElement) sequence as the binary
//! pull parser. Envelope metadata travels under configurable keys.
//!
//! What JSON cannot express is documented rather than invented: repeated
//! field keys collapse into arrays on write and expand back into repeated
//! fields on read; single precision numbers widen to double precision;
//! date and time values render as strings.

mod de;
mod ser;

use serde::Deserialize;

pub use de::{
    from_reader, from_slice, from_str, from_value, from_value_with, Error as DeError,
    JsonStreamReader,
};
pub use ser::{
    message_to_value, to_string, to_string_pretty, to_value, to_vec, to_writer, Error as SerError,
    JsonStreamWriter,
};

/// The envelope key names used by the JSON rendering.
///
/// The defaults match the standard Fudge JSON form; hosts may override
/// them through configuration:
///
/// ```
/// # use fudge_json::JsonSettings;
/// let settings: JsonSettings = serde_json::from_str(
///     r#"{ "taxonomyField": "taxonomy" }"#,
/// )?;
/// assert_eq!(settings.taxonomy_field, "taxonomy");
/// assert_eq!(settings.schema_version_field, "fudgeSchemaVersion");
/// # Result::<(), serde_json::Error>::Ok(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonSettings {
    /// The key carrying the envelope's processing directives.
    pub processing_directives_field: String,
    /// The key carrying the envelope's schema version.
    pub schema_version_field: String,
    /// The key carrying the envelope's taxonomy identifier.
    pub taxonomy_field: String,
}

impl Default for JsonSettings {
    fn default() -> Self {
        JsonSettings {
            processing_directives_field: "fudgeProcessingDirectives".to_owned(),
            schema_version_field: "fudgeSchemaVersion".to_owned(),
            taxonomy_field: "fudgeTaxonomy".to_owned(),
        }
    }
}

impl JsonSettings {
    /// Whether the given key is one of the envelope keys.
    pub fn is_envelope_key(&self, key: &str) -> bool {
        key == self.processing_directives_field
            || key == self.schema_version_field
            || key == self.taxonomy_field
    }
}

/// A wrapper type for Fudge data that serializes through its JSON
/// rendering rather than any derived form.
#[derive(Debug, Clone, PartialEq)]
pub struct FudgeJson<T>(pub T);

impl<T> FudgeJson<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}
