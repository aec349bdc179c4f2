//! The seam for object-graph mapping layers.
//!
//! The core engine moves message trees; turning domain objects into
//! messages and back is the business of an external mapping layer. These
//! traits fix the interface that layer programs against: a pair of
//! conversion traits for types that know their own message form, and a
//! capability pair for builders registered against a type elsewhere.
//! Reflection-driven implementations are deliberately out of scope here.

use crate::mem::InMemFudgeMsg;
use crate::FudgeContext;
use fudge_core::field::FudgeMsgView;
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// An error raised while mapping between objects and messages.
pub enum Error {
    /// A field did not have the shape the mapping expected.
    #[snafu(display("field {index} does not have the expected shape: {expected}"))]
    UnexpectedShape {
        /// The position of the offending field.
        index: usize,
        /// What the mapping expected to find there.
        expected: &'static str,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// The message could not hold the mapped fields.
    #[snafu(display("mapped object does not fit in a message"))]
    Build {
        /// The mutation failure.
        source: crate::mem::Error,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
    /// A failure specific to the mapping implementation.
    #[snafu(display("{message}"))]
    Mapping {
        /// The implementation's description of the failure.
        message: String,
        /// Trace of the failure.
        backtrace: Backtrace,
    },
}

impl Error {
    /// Create an implementation-specific mapping failure.
    pub fn mapping(message: impl Into<String>) -> Self {
        MappingSnafu {
            message: message.into(),
        }
        .build()
    }
}

/// Object mapping result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A type that can render itself as a Fudge message, one field per
/// serializable property.
pub trait ToFudgeMsg {
    /// Build a message encoding this object's properties by name.
    fn to_fudge_msg(&self, ctx: &FudgeContext) -> Result<InMemFudgeMsg>;
}

/// A type that can be rebuilt from a Fudge message by matching field
/// names to its properties.
pub trait FromFudgeMsg: Sized {
    /// Produce an instance from the given message. Values may be
    /// recursive messages.
    fn from_fudge_msg(msg: &InMemFudgeMsg, ctx: &FudgeContext) -> Result<Self>;
}

/// The capability pair of a mapping builder registered for `T`: one
/// provider that can move `T` in both directions.
pub trait MsgBuilder<T> {
    /// Build a message from an object.
    fn build_message(&self, obj: &T, ctx: &FudgeContext) -> Result<InMemFudgeMsg>;

    /// Build an object from a message.
    fn build_object(&self, msg: &InMemFudgeMsg, ctx: &FudgeContext) -> Result<T>;
}

/// The builder for types that implement the conversion traits themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdMsgBuilder;

impl<T> MsgBuilder<T> for StdMsgBuilder
where
    T: ToFudgeMsg + FromFudgeMsg,
{
    fn build_message(&self, obj: &T, ctx: &FudgeContext) -> Result<InMemFudgeMsg> {
        obj.to_fudge_msg(ctx)
    }

    fn build_object(&self, msg: &InMemFudgeMsg, ctx: &FudgeContext) -> Result<T> {
        T::from_fudge_msg(msg, ctx)
    }
}

/// Lists render as a message with one anonymous sub-message field per
/// element; the reverse direction rebuilds the list and the caller
/// coerces it to whatever array form it needs.
impl<T> ToFudgeMsg for Vec<T>
where
    T: ToFudgeMsg,
{
    fn to_fudge_msg(&self, ctx: &FudgeContext) -> Result<InMemFudgeMsg> {
        let mut msg = ctx.new_message();
        for item in self {
            let element = item.to_fudge_msg(ctx)?;
            msg.add_message(None, None, element).context(BuildSnafu)?;
        }
        Ok(msg)
    }
}

impl<T> FromFudgeMsg for Vec<T>
where
    T: FromFudgeMsg,
{
    fn from_fudge_msg(msg: &InMemFudgeMsg, ctx: &FudgeContext) -> Result<Self> {
        msg.fields()
            .enumerate()
            .map(|(index, field)| {
                let element = field.value().message().context(UnexpectedShapeSnafu {
                    index,
                    expected: "a sub-message element",
                })?;
                T::from_fudge_msg(element, ctx)
            })
            .collect()
    }
}
