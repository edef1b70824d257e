use thiserror::Error;

/// Errors raised by the tokenizer, tree, filter and forest layers.
///
/// These are programming/data errors the core refuses to paper over; the
/// façade is the only layer allowed to catch [`CoreError::External`] and
/// [`CoreError::RedirectAbuse`] and downgrade them to a failed prediction.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("structural violation: {0}")]
    StructuralViolation(String),

    #[error("external classifier or fetch failed: {0}")]
    External(String),

    #[error("redirect chain aborted: {0}")]
    RedirectAbuse(String),
}

impl CoreError {
    pub fn usage(msg: impl Into<String>) -> Self {
        CoreError::Usage(msg.into())
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        CoreError::StructuralViolation(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
