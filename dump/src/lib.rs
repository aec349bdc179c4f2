//! Fudge message dumping library.
//!
//! This is a helper library for printing the contents of Fudge messages
//! in a human readable way, for diagnostics and debugging. There is no
//! round-trip promise: the dump is for eyes, not parsers.
//!
//! # Examples
//!
//! The quickest way to inspect a message is [`dump_message`], which
//! prints to standard output:
//!
//! ```no_run
//! use fudge_object::FudgeContext;
//! use fudge_dump::dump_message;
//!
//! let ctx = FudgeContext::default();
//! let mut msg = ctx.new_message();
//! msg.add_string(Some("symbol"), None, "XAU")?;
//! dump_message(&msg)?;
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```
//!
//! See the [`DumpOptions`] builder for the knobs:
//!
//! ```no_run
//! # use fudge_object::FudgeContext;
//! use fudge_dump::DumpOptions;
//!
//! # let ctx = FudgeContext::default();
//! # let msg = ctx.new_message();
//! let mut options = DumpOptions::new();
//! options.max_value_width(60).indent_width(4).dump_message(&msg)?;
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```

use fudge_core::field::{Field, FudgeMsgView, Value};
use std::io::{stdout, Result as IoResult, Write};

/// An enum of all supported output formats for dumping Fudge messages.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DumpFormat {
    /// The main dump format adopted by the project: one line per field
    /// with its ordinal, name, wire type identifier and value, indented
    /// by nesting depth.
    ///
    /// Note that this format is not stabilized, and may change with
    /// subsequent versions of the crate.
    #[default]
    Main,
    /// The JSON rendering, as produced by the `fudge-json` crate.
    Json,
}

/// Options and flags to configure how to dump a Fudge message.
///
/// This is a builder which exposes the options available for printing a
/// message tree in a readable way; finish with
/// [`dump_message`](Self::dump_message) or
/// [`dump_message_to`](Self::dump_message_to).
#[derive(Debug, Clone)]
pub struct DumpOptions {
    format: DumpFormat,
    indent_width: usize,
    max_value_width: Option<usize>,
    max_depth: Option<u32>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            format: DumpFormat::Main,
            indent_width: 2,
            max_value_width: None,
            max_depth: None,
        }
    }
}

impl DumpOptions {
    /// Create the default dumping options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format.
    pub fn format(&mut self, format: DumpFormat) -> &mut Self {
        self.format = format;
        self
    }

    /// Set the number of spaces per nesting level.
    pub fn indent_width(&mut self, width: usize) -> &mut Self {
        self.indent_width = width;
        self
    }

    /// Truncate rendered values to at most this many characters.
    pub fn max_value_width(&mut self, width: usize) -> &mut Self {
        self.max_value_width = Some(width);
        self
    }

    /// Stop recursing into sub-messages below this depth.
    pub fn max_depth(&mut self, depth: u32) -> &mut Self {
        self.max_depth = Some(depth);
        self
    }

    /// Dump a message to standard output.
    pub fn dump_message<M>(&self, msg: &M) -> IoResult<()>
    where
        M: FudgeMsgView,
    {
        let out = stdout();
        self.dump_message_to(&mut out.lock(), msg)
    }

    /// Dump a message to the given writer.
    pub fn dump_message_to<W, M>(&self, to: &mut W, msg: &M) -> IoResult<()>
    where
        W: Write,
        M: FudgeMsgView,
    {
        match self.format {
            DumpFormat::Main => self.dump_level(to, msg, 0),
            DumpFormat::Json => {
                let value = fudge_json::message_to_value(msg)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(to, "{value:#}")
            }
        }
    }

    fn dump_level<W, M>(&self, to: &mut W, msg: &M, depth: u32) -> IoResult<()>
    where
        W: Write,
        M: FudgeMsgView,
    {
        for field in msg.fields() {
            self.dump_field(to, field, depth)?;
        }
        Ok(())
    }

    fn dump_field<W, M>(&self, to: &mut W, field: &Field<M>, depth: u32) -> IoResult<()>
    where
        W: Write,
        M: FudgeMsgView,
    {
        let pad = self.indent_width * depth as usize;
        let ordinal = field
            .ordinal()
            .map(|o| o.to_string())
            .unwrap_or_default();
        let name = field.name().unwrap_or_default();

        match field.value() {
            Value::Message(inner) => {
                writeln!(
                    to,
                    "{:pad$}{ordinal}, {name}, {}, submessage",
                    "",
                    field.type_id(),
                )?;
                if self.max_depth.map_or(true, |max| depth < max) {
                    self.dump_level(to, inner, depth + 1)?;
                }
                Ok(())
            }
            Value::Primitive(value) => {
                let mut rendered = value.to_string();
                if let Some(max) = self.max_value_width {
                    if rendered.chars().count() > max {
                        rendered = rendered.chars().take(max).collect::<String>() + "...";
                    }
                }
                writeln!(
                    to,
                    "{:pad$}{ordinal}, {name}, {}, {rendered}",
                    "",
                    field.type_id(),
                )
            }
        }
    }
}

/// Dump a message to standard output with the default options.
pub fn dump_message<M>(msg: &M) -> IoResult<()>
where
    M: FudgeMsgView,
{
    DumpOptions::new().dump_message(msg)
}

/// Dump a message to the given writer with the default options.
pub fn dump_message_to<W, M>(to: &mut W, msg: &M) -> IoResult<()>
where
    W: Write,
    M: FudgeMsgView,
{
    DumpOptions::new().dump_message_to(to, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fudge_object::FudgeContext;

    fn sample() -> fudge_object::InMemFudgeMsg {
        let ctx = FudgeContext::default();
        let mut inner = ctx.new_message();
        inner.add_boolean(Some("alive"), None, true).unwrap();
        let mut msg = ctx.new_message();
        msg.add_string(Some("symbol"), None, "XAU").unwrap();
        msg.add_long(None, Some(2), 42).unwrap();
        msg.add_message(Some("detail"), None, inner).unwrap();
        msg
    }

    #[test]
    fn main_format_lines_up_fields_by_depth() {
        let mut out = Vec::new();
        dump_message_to(&mut out, &sample()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            concat!(
                ", symbol, 16, \"XAU\"\n",
                "2, , 2, 42\n",
                ", detail, 21, submessage\n",
                "  , alive, 1, true\n",
            )
        );
    }

    #[test]
    fn depth_cap_elides_nested_content() {
        let mut out = Vec::new();
        DumpOptions::new()
            .max_depth(0)
            .dump_message_to(&mut out, &sample())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("submessage"));
        assert!(!text.contains("alive"));
    }

    #[test]
    fn long_values_are_truncated() {
        let ctx = FudgeContext::default();
        let mut msg = ctx.new_message();
        msg.add_string(Some("blurb"), None, "a".repeat(100)).unwrap();
        let mut out = Vec::new();
        DumpOptions::new()
            .max_value_width(10)
            .dump_message_to(&mut out, &msg)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.trim_end().ends_with("..."));
    }

    #[test]
    fn json_format_delegates_to_the_json_rendering() {
        let mut out = Vec::new();
        DumpOptions::new()
            .format(DumpFormat::Json)
            .dump_message_to(&mut out, &sample())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["symbol"], "XAU");
        assert_eq!(value["detail"]["alive"], true);
    }
}
