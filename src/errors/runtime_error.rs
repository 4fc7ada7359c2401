use thiserror::Error;

/// Errors surfaced to the host. Display strings match the wording scripts
/// would see from a stock Lua 5.2 interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("attempt to perform arithmetic on a {0} value")]
    InvalidArithmetic(&'static str),
    #[error("attempt to compare {0} with {1}")]
    InvalidCompare(&'static str, &'static str),
    #[error("attempt to concatenate a {0} value")]
    InvalidConcat(&'static str),
    #[error("attempt to index a {0} value")]
    InvalidIndex(&'static str),
    #[error("table index is nil")]
    NilTableKey,
    #[error("table index is NaN")]
    NanTableKey,
    #[error("invalid key to 'next'")]
    InvalidNextKey,
    #[error("position out of bounds")]
    PositionOutOfBounds,
    #[error("'__index' chain too long; possible loop")]
    MetatableChainTooLong,
    #[error("attempt to yield from outside a coroutine")]
    YieldFromOutside,
    /// Internal signal used to unwind abandoned coroutine threads. Never
    /// reported to a resumer.
    #[error("orphaned thread")]
    OrphanedThread,
    #[error("cannot convert {from} to {to}")]
    ConversionFailed {
        from: &'static str,
        to: &'static str,
    },
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}
